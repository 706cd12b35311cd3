//! Shared helpers for the core integration tests.

// Each integration test is its own crate and may not use every helper.
#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

/// Render a version 1 status log as the daemon writes it.
///
/// `clients` are `(common name, bytes received, bytes sent)`.
pub fn status_log(updated: &str, clients: &[(&str, u64, u64)]) -> String {
    let mut out = String::from("OpenVPN CLIENT LIST\n");
    out.push_str(&format!("Updated,{updated}\n"));
    out.push_str("Common Name,Real Address,Bytes Received,Bytes Sent,Connected Since\n");
    for (i, (name, received, sent)) in clients.iter().enumerate() {
        out.push_str(&format!(
            "{name},203.0.113.{}:{},{received},{sent},2023-05-01 09:00:00\n",
            i + 1,
            50000 + i
        ));
    }
    out.push_str("ROUTING TABLE\n");
    out.push_str("Virtual Address,Common Name,Real Address,Last Ref\n");
    for (i, (name, _, _)) in clients.iter().enumerate() {
        out.push_str(&format!(
            "10.8.0.{},{name},203.0.113.{}:{},{updated}\n",
            i + 6,
            i + 1,
            50000 + i
        ));
    }
    out.push_str("GLOBAL STATS\nMax bcast/mcast queue length,0\nEND\n");
    out
}

/// Replace `path` the way log rotators do: write a sibling, then rename.
pub fn replace_file(path: &Path, contents: &str) {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, contents).expect("temp status log should be writable");
    std::fs::rename(&tmp, path).expect("rename over status log should succeed");
}

/// Poll `check` until it returns true or `limit` passes.
pub async fn eventually(limit: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

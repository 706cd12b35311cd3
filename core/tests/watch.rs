//! End-to-end tests: a real status log on disk driven through the
//! filesystem watcher, the rate engine and a disconnect sink.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{eventually, replace_file, status_log};
use ovpnstat_core::sink::ChannelSink;
use ovpnstat_core::{DisconnectRecord, StatsService, WatchConfig};
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;

const WAIT: Duration = Duration::from_secs(5);

fn service_for(dir: &TempDir) -> (StatsService, UnboundedReceiver<DisconnectRecord>) {
    let config = WatchConfig {
        status_log_path: dir.path().join("openvpn-status.log"),
        debounce_ms: 50,
    };
    let (sink, records) = ChannelSink::new();
    (StatsService::from_config(config, Arc::new(sink)), records)
}

// ── Seeding ─────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn start_seeds_from_existing_log() {
    let dir = TempDir::new().unwrap();
    let (service, _records) = service_for(&dir);
    std::fs::write(
        &service.config().status_log_path,
        status_log("2023-05-01 10:00:00", &[("alice", 2000, 1000), ("bob", 10, 20)]),
    )
    .unwrap();

    let handle = service.start().expect("service should start");
    let snap = handle
        .registry()
        .current_snapshot()
        .expect("initial pass should store a snapshot");
    assert_eq!(snap.clients.len(), 2);
    assert_eq!(snap.routes.len(), 2);
    assert!(handle.registry().speed_stats().is_empty());
}

// ── Rates and disconnects ───────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rewrite_updates_rates_and_reports_disconnect() {
    let dir = TempDir::new().unwrap();
    let (service, mut records) = service_for(&dir);
    let path = service.config().status_log_path.clone();
    std::fs::write(
        &path,
        status_log("2023-05-01 10:00:00", &[("alice", 2000, 1000), ("bob", 10, 20)]),
    )
    .unwrap();
    let handle = service.start().expect("service should start");
    let registry = Arc::clone(handle.registry());

    std::fs::write(
        &path,
        status_log("2023-05-01 10:00:10", &[("alice", 2400, 3000)]),
    )
    .unwrap();

    assert!(
        eventually(WAIT, || registry.connected_clients().len() == 1).await,
        "rewrite was not picked up"
    );
    let stats = registry.speed_stats();
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].common_name, "alice");
    assert!((stats[0].tx - 200.0).abs() < 1e-9);
    assert!((stats[0].rx - 40.0).abs() < 1e-9);

    let record = tokio::time::timeout(WAIT, records.recv())
        .await
        .expect("disconnect should be reported")
        .expect("sink channel should stay open");
    assert_eq!(record.common_name, "bob");
    assert_eq!(record.bytes_received, 10);
    assert_eq!(record.bytes_sent, 20);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn replaced_file_is_still_watched() {
    let dir = TempDir::new().unwrap();
    let (service, _records) = service_for(&dir);
    let path = service.config().status_log_path.clone();
    std::fs::write(&path, status_log("2023-05-01 10:00:00", &[("alice", 0, 0)])).unwrap();
    let handle = service.start().expect("service should start");
    let registry = Arc::clone(handle.registry());

    replace_file(
        &path,
        &status_log("2023-05-01 10:00:05", &[("alice", 500, 500), ("carol", 50, 25)]),
    );
    assert!(
        eventually(WAIT, || registry.speed_stats().len() == 2).await,
        "replacement was not picked up"
    );

    replace_file(
        &path,
        &status_log("2023-05-01 10:00:10", &[("carol", 100, 75)]),
    );
    assert!(
        eventually(WAIT, || {
            let stats = registry.speed_stats();
            stats.len() == 1 && stats[0].common_name == "carol"
        })
        .await,
        "second replacement was not picked up"
    );
    let stats = registry.speed_stats();
    assert!((stats[0].tx - 10.0).abs() < 1e-9);
    assert!((stats[0].rx - 10.0).abs() < 1e-9);
}

// ── Shutdown ────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_stops_watching() {
    let dir = TempDir::new().unwrap();
    let (service, _records) = service_for(&dir);
    let path = service.config().status_log_path.clone();
    std::fs::write(&path, status_log("2023-05-01 10:00:00", &[("alice", 0, 0)])).unwrap();
    let handle = service.start().expect("service should start");

    assert!(handle.shutdown());
    assert!(
        eventually(WAIT, || !handle.is_running()).await,
        "watch loop kept running after shutdown"
    );

    std::fs::write(&path, status_log("2023-05-01 10:00:10", &[])).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(handle.registry().connected_clients().len(), 1);
}

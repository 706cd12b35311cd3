//! File-watch loop.
//!
//! The status log's parent directory is watched with `notify`; the
//! callback forwards events for the log file into a tokio channel and
//! [`run_watch_loop`] debounces them into reprocessing passes.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::errors::CoreError;
use crate::sink::{DisconnectRecord, DisconnectSink};
use crate::stats::{PassOutcome, StatsRegistry};
use crate::status::SnapshotSource;

const EVENT_BUFFER: usize = 100;

pub type WatchEvents = mpsc::Receiver<notify::Result<Event>>;

/// Start watching `path` for writes.
///
/// The parent directory is watched so the watch survives the daemon
/// replacing the file. Dropping the returned watcher closes the channel.
pub fn watch_status_log(path: &Path) -> Result<(RecommendedWatcher, WatchEvents), CoreError> {
    let file_name = path
        .file_name()
        .ok_or_else(|| CoreError::Config(format!("not a file path: {}", path.display())))?
        .to_os_string();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        let relevant = match &res {
            Ok(event) => touches(event, &file_name),
            Err(_) => true,
        };
        // A full buffer already holds a pending write; dropping is fine.
        if relevant && tx.try_send(res).is_err() {
            debug!("Watch event dropped, channel full or closed");
        }
    })?;
    watcher.watch(&dir, RecursiveMode::NonRecursive)?;

    info!("Watching {} for status log updates", path.display());
    Ok((watcher, rx))
}

fn touches(event: &Event, file_name: &OsStr) -> bool {
    event.paths.iter().any(|p| p.file_name() == Some(file_name))
}

fn is_write(event: &Event) -> bool {
    matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
}

/// Debounce write notifications and run one pass per quiet period.
///
/// Every write pushes the deadline out by the registry's debounce
/// interval. Runs until the event channel closes.
pub async fn run_watch_loop(
    mut events: WatchEvents,
    registry: Arc<StatsRegistry>,
    source: Arc<dyn SnapshotSource>,
    sink: Arc<dyn DisconnectSink>,
) {
    let debounce = registry.debounce();
    let mut deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(Ok(event)) => {
                    if is_write(&event) {
                        deadline = Some(Instant::now() + debounce);
                    }
                }
                Some(Err(e)) => warn!("Status log watch error: {}", e),
                None => break,
            },
            _ = wait_until(deadline) => {
                deadline = None;
                run_pass(&registry, source.as_ref(), sink.as_ref()).await;
            }
        }
    }

    info!("Status log watcher stopped");
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// One reprocessing pass. Disconnects go to the sink only after
/// [`StatsRegistry::refresh`] has released its lock.
pub(crate) async fn run_pass(
    registry: &StatsRegistry,
    source: &dyn SnapshotSource,
    sink: &dyn DisconnectSink,
) {
    match in_place(|| registry.refresh(source)) {
        Ok(PassOutcome::Updated { disconnected }) => {
            let until = Utc::now();
            for session in disconnected {
                info!("Client '{}' disconnected", session.common_name);
                sink.record(DisconnectRecord::closing(session, until)).await;
            }
        }
        Ok(PassOutcome::Seeded) => debug!("Statistics seeded"),
        Ok(PassOutcome::Throttled) => {}
        Err(e) => warn!("Failed to read status log: {}", e),
    }
}

/// Run blocking work (file reads under the registry lock) without parking
/// the other tasks queued on this worker. Only the multi-threaded runtime
/// can hand its worker off; elsewhere `f` runs directly.
pub(crate) fn in_place<R>(f: impl FnOnce() -> R) -> R {
    match Handle::try_current().map(|h| h.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(f),
        _ => f(),
    }
}

//! Caller-owned entry point: wires source, registry, watcher and sink.

use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use notify::RecommendedWatcher;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::WatchConfig;
use crate::errors::CoreError;
use crate::sink::DisconnectSink;
use crate::stats::{PassOutcome, StatsRegistry};
use crate::status::{Snapshot, SnapshotSource, StatusFile};
use crate::watcher::{in_place, run_watch_loop, watch_status_log};

/// Owns the statistics engine for one status log.
///
/// Nothing runs until [`start`](Self::start) is called. Starting is
/// one-shot: every call after the first returns the outcome of the first.
pub struct StatsService {
    config: WatchConfig,
    source: Arc<dyn SnapshotSource>,
    sink: Arc<dyn DisconnectSink>,
    started: OnceLock<Result<WatchHandle, CoreError>>,
}

impl StatsService {
    pub fn new(
        config: WatchConfig,
        source: Arc<dyn SnapshotSource>,
        sink: Arc<dyn DisconnectSink>,
    ) -> Self {
        Self {
            config,
            source,
            sink,
            started: OnceLock::new(),
        }
    }

    /// Service reading the status log named in `config`.
    pub fn from_config(config: WatchConfig, sink: Arc<dyn DisconnectSink>) -> Self {
        let source = Arc::new(StatusFile::new(config.status_log_path.clone()));
        Self::new(config, source, sink)
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    /// Start watching. Must be called from within a tokio runtime.
    ///
    /// The first call installs the watch, seeds the registry with an
    /// initial pass and spawns the watch loop. Concurrent callers block
    /// until that finishes and all observe the same result.
    pub fn start(&self) -> Result<&WatchHandle, &CoreError> {
        self.started.get_or_init(|| self.init()).as_ref()
    }

    /// The handle, if [`start`](Self::start) has succeeded.
    pub fn handle(&self) -> Option<&WatchHandle> {
        self.started.get().and_then(|r| r.as_ref().ok())
    }

    /// Parse the status log right now, bypassing the registry.
    pub fn connection_list(&self) -> Result<Snapshot, CoreError> {
        self.source.fetch()
    }

    fn init(&self) -> Result<WatchHandle, CoreError> {
        self.config.validate()?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| CoreError::Other(format!("no tokio runtime: {}", e)))?;

        // Watch before seeding so a write during the first read is not lost.
        let (watcher, events) = watch_status_log(&self.config.status_log_path)?;

        let registry = Arc::new(StatsRegistry::new(self.config.debounce()));
        match in_place(|| registry.refresh(self.source.as_ref())) {
            Ok(PassOutcome::Seeded) => info!(
                "Seeded statistics with {} clients",
                registry.connected_clients().len()
            ),
            Ok(_) => {}
            Err(e) => warn!("Initial status log read failed: {}", e),
        }

        let task = runtime.spawn(run_watch_loop(
            events,
            Arc::clone(&registry),
            Arc::clone(&self.source),
            Arc::clone(&self.sink),
        ));

        info!(
            "Statistics service started for {}",
            self.config.status_log_path.display()
        );
        Ok(WatchHandle {
            registry,
            watcher: Mutex::new(Some(watcher)),
            task,
        })
    }
}

/// A running watch.
pub struct WatchHandle {
    registry: Arc<StatsRegistry>,
    watcher: Mutex<Option<RecommendedWatcher>>,
    task: JoinHandle<()>,
}

impl WatchHandle {
    pub fn registry(&self) -> &Arc<StatsRegistry> {
        &self.registry
    }

    /// Release the filesystem watch. The loop drains what is queued and
    /// exits. Returns `false` if already shut down.
    pub fn shutdown(&self) -> bool {
        let watcher = self
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match watcher {
            Some(watcher) => {
                drop(watcher);
                info!("Statistics watch released");
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle")
            .field("registry", &self.registry)
            .field("running", &self.is_running())
            .finish()
    }
}

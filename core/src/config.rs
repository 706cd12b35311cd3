use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::CoreError;

/// Status-log watcher settings.
///
/// - `status_log_path`: the file the daemon's `status` directive writes.
/// - `debounce_ms`: quiet period after the last write notification before
///   the log is re-read; also the minimum spacing between two passes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchConfig {
    #[serde(default = "default_status_log_path")]
    pub status_log_path: PathBuf,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            status_log_path: default_status_log_path(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl WatchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Reject values the watcher cannot run with.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.status_log_path.as_os_str().is_empty() {
            return Err(CoreError::Config("statusLogPath must not be empty".into()));
        }
        if self.status_log_path.file_name().is_none() {
            return Err(CoreError::Config(format!(
                "statusLogPath must name a file: {}",
                self.status_log_path.display()
            )));
        }
        if self.debounce_ms == 0 {
            return Err(CoreError::Config("debounceMs must be at least 1".into()));
        }
        Ok(())
    }
}

fn default_status_log_path() -> PathBuf {
    PathBuf::from("/var/log/openvpn/openvpn-status.log")
}

fn default_debounce_ms() -> u64 {
    100
}

//! Agent configuration loaded from `config.json`.

use std::path::{Path, PathBuf};

use anyhow::Context;
use ovpnstat_core::WatchConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

const CONFIG_FILE: &str = "config.json";
const HISTORY_FILE: &str = "history.jsonl";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    #[serde(default)]
    pub watch: WatchConfig,
    /// Where disconnect records are appended. Defaults to
    /// `history.jsonl` beside the config file.
    #[serde(default)]
    pub history_path: Option<PathBuf>,
    /// Common names whose disconnects are archived.
    #[serde(default)]
    pub users: Vec<String>,
}

impl AgentConfig {
    /// Load from `explicit` if given, otherwise from the default location.
    ///
    /// Returns the config and the path it was (or would have been) read from.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<(Self, PathBuf)> {
        let path = explicit
            .map(Path::to_path_buf)
            .unwrap_or_else(|| config_dir().join(CONFIG_FILE));
        let config = Self::load_from(&path)?;
        Ok((config, path))
    }

    /// A missing file yields the defaults; an unreadable or corrupt one is
    /// an error.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No config file at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        config
            .watch
            .validate()
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        debug!(
            "Loaded config from {} ({} users)",
            path.display(),
            config.users.len()
        );
        Ok(config)
    }

    /// Resolve the history file relative to the config file's directory.
    pub fn history_path(&self, config_path: &Path) -> PathBuf {
        match &self.history_path {
            Some(p) if p.is_absolute() => p.clone(),
            Some(p) => config_base(config_path).join(p),
            None => config_base(config_path).join(HISTORY_FILE),
        }
    }
}

fn config_base(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// `$XDG_CONFIG_HOME/ovpnstat-agent`, else `~/.config/ovpnstat-agent`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("ovpnstat-agent");
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".config").join("ovpnstat-agent");
    }
    PathBuf::from(".config").join("ovpnstat-agent")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_gives_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = AgentConfig::load_from(&tmp.path().join("config.json")).unwrap();
        assert_eq!(config, AgentConfig::default());
        assert_eq!(config.watch.debounce_ms, 100);
    }

    #[test]
    fn explicit_path_is_used() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("agent.json");
        std::fs::write(
            &path,
            r#"{
                "watch": {"statusLogPath": "/run/openvpn/server.status", "debounceMs": 250},
                "users": ["alice", "bob"]
            }"#,
        )
        .unwrap();

        let (config, used) = AgentConfig::load(Some(&path)).unwrap();
        assert_eq!(used, path);
        assert_eq!(
            config.watch.status_log_path,
            PathBuf::from("/run/openvpn/server.status")
        );
        assert_eq!(config.watch.debounce_ms, 250);
        assert_eq!(config.users, vec!["alice", "bob"]);
    }

    #[test]
    fn corrupt_file_names_path() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = AgentConfig::load_from(&path).unwrap_err();
        assert!(err.to_string().contains(&path.display().to_string()));
    }

    #[test]
    fn invalid_watch_settings_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, r#"{"watch": {"debounceMs": 0}}"#).unwrap();

        let err = AgentConfig::load_from(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("debounceMs must be at least 1"));
    }

    #[test]
    fn history_path_resolution() {
        let config_path = Path::new("/etc/ovpnstat/config.json");

        let config = AgentConfig::default();
        assert_eq!(
            config.history_path(config_path),
            PathBuf::from("/etc/ovpnstat/history.jsonl")
        );

        let config = AgentConfig {
            history_path: Some(PathBuf::from("archive/disconnects.jsonl")),
            ..Default::default()
        };
        assert_eq!(
            config.history_path(config_path),
            PathBuf::from("/etc/ovpnstat/archive/disconnects.jsonl")
        );

        let config = AgentConfig {
            history_path: Some(PathBuf::from("/var/lib/ovpnstat/history.jsonl")),
            ..Default::default()
        };
        assert_eq!(
            config.history_path(config_path),
            PathBuf::from("/var/lib/ovpnstat/history.jsonl")
        );
    }
}

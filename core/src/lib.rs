//! OpenVPN status-log statistics engine.
//!
//! Parses the daemon's `status` file, keeps a per-client rate table up to
//! date as the file is rewritten and reports clients that disconnect.

pub mod config;
pub mod errors;
pub mod rates;
pub mod service;
pub mod sink;
pub mod stats;
pub mod status;
pub mod watcher;

pub use config::WatchConfig;
pub use errors::{CoreError, ParseError};
pub use rates::{compute_rates, SpeedStat};
pub use service::{StatsService, WatchHandle};
pub use sink::{DisconnectRecord, DisconnectSink};
pub use stats::{PassOutcome, StatsRegistry};
pub use status::{ClientSession, RoutingEntry, Snapshot, SnapshotSource, StatusFile};

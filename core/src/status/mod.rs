//! OpenVPN status log: record types, parser and snapshot sources.

pub mod parser;
pub mod source;
pub mod timestamp;
pub mod types;

pub use parser::{parse_status_log, parse_status_log_report, ParseFault, ParseReport};
pub use source::{SnapshotSource, StatusFile};
pub use timestamp::{parse_timestamp, zero_timestamp};
pub use types::{ClientSession, RoutingEntry, Snapshot};

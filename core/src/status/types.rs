//! Parsed status-log records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One connected peer from the `CLIENT LIST` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSession {
    pub common_name: String,
    pub real_address: String,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub connected_since: DateTime<Utc>,
}

/// One row of the `ROUTING TABLE` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingEntry {
    pub virtual_address: String,
    pub common_name: String,
    pub real_address: String,
    pub last_ref: DateTime<Utc>,
}

/// The result of one parse of the status log.
///
/// `generated_at` is the timestamp the daemon wrote into the header line,
/// not the wall-clock time of the read. It is the Unix epoch when the log
/// had no usable header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub clients: Vec<ClientSession>,
    pub routes: Vec<RoutingEntry>,
    pub generated_at: DateTime<Utc>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            clients: Vec::new(),
            routes: Vec::new(),
            generated_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

impl Snapshot {
    /// Look up a client by common name. The last matching entry wins, so a
    /// name listed twice resolves to its latest line.
    pub fn client(&self, common_name: &str) -> Option<&ClientSession> {
        self.clients
            .iter()
            .rev()
            .find(|c| c.common_name == common_name)
    }
}

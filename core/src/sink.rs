//! Disconnect notifications for the persistence layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::status::ClientSession;

/// Final usage of a client that dropped out of the status log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectRecord {
    pub common_name: String,
    pub real_address: String,
    pub connected_since: DateTime<Utc>,
    pub connected_until: DateTime<Utc>,
    pub bytes_received: u64,
    pub bytes_sent: u64,
}

impl DisconnectRecord {
    /// Close out `session` at `until`.
    pub fn closing(session: ClientSession, until: DateTime<Utc>) -> Self {
        Self {
            common_name: session.common_name,
            real_address: session.real_address,
            connected_since: session.connected_since,
            connected_until: until,
            bytes_received: session.bytes_received,
            bytes_sent: session.bytes_sent,
        }
    }
}

/// Receives a record for every client that disconnects.
///
/// Delivery is fire-and-forget: implementations log their own failures
/// and never report them back. The watch loop calls this outside the
/// statistics lock, so a slow sink does not hold back readers.
#[async_trait::async_trait]
pub trait DisconnectSink: Send + Sync {
    async fn record(&self, record: DisconnectRecord);
}

/// Discards every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

#[async_trait::async_trait]
impl DisconnectSink for NullSink {
    async fn record(&self, record: DisconnectRecord) {
        debug!("Dropping disconnect record for '{}'", record.common_name);
    }
}

/// Forwards records into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<DisconnectRecord>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DisconnectRecord>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait::async_trait]
impl DisconnectSink for ChannelSink {
    async fn record(&self, record: DisconnectRecord) {
        if self.tx.send(record).is_err() {
            debug!("Disconnect channel closed, record dropped");
        }
    }
}

//! Disconnect history archive.
//!
//! Every disconnect of a known user is appended to a JSON Lines file, one
//! [`DisconnectRecord`] per line. Unknown users are skipped. Reads go
//! through [`HistoryQuery`] for individual records and [`SummaryQuery`] for
//! per-user totals.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use ovpnstat_core::{DisconnectRecord, DisconnectSink};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Filters, ordering and paging for archived records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryQuery {
    /// Exact common name.
    pub common_name: Option<String>,
    /// Substring of the real address.
    pub real_address: Option<String>,
    /// Keep sessions that connected at or after this instant.
    pub start: Option<DateTime<Utc>>,
    /// Keep sessions that ended at or before this instant.
    pub end: Option<DateTime<Utc>>,
    pub newest_first: bool,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl HistoryQuery {
    pub fn for_user(common_name: impl Into<String>) -> Self {
        Self {
            common_name: Some(common_name.into()),
            ..Default::default()
        }
    }

    fn matches(&self, record: &DisconnectRecord) -> bool {
        self.common_name
            .as_deref()
            .map_or(true, |name| record.common_name == name)
            && self
                .real_address
                .as_deref()
                .map_or(true, |addr| record.real_address.contains(addr))
            && self.start.map_or(true, |start| record.connected_since >= start)
            && self.end.map_or(true, |end| record.connected_until <= end)
    }
}

/// Window and name filter for [`HistoryStore::summarize`]. Both bounds are
/// exclusive and apply to the connect time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SummaryQuery {
    /// Substring of the common name.
    pub name_contains: Option<String>,
    pub after: Option<DateTime<Utc>>,
    pub before: Option<DateTime<Utc>>,
}

impl SummaryQuery {
    fn matches(&self, record: &DisconnectRecord) -> bool {
        self.name_contains
            .as_deref()
            .map_or(true, |part| record.common_name.contains(part))
            && self.after.map_or(true, |after| record.connected_since > after)
            && self.before.map_or(true, |before| record.connected_since < before)
    }
}

/// Totals for one common name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistorySummary {
    pub common_name: String,
    pub connection_count: u64,
    pub total_bytes_received: u64,
    pub total_bytes_sent: u64,
    pub total_bytes: u64,
    pub avg_connection_duration_secs: f64,
    /// Most recent connect time.
    pub last_connection: DateTime<Utc>,
}

/// Group records by common name, sorted by name.
pub fn summarize<'a>(
    records: impl IntoIterator<Item = &'a DisconnectRecord>,
) -> Vec<HistorySummary> {
    let mut groups: BTreeMap<&str, (HistorySummary, i64)> = BTreeMap::new();

    for record in records {
        let duration = (record.connected_until - record.connected_since).num_seconds();
        let (summary, total_secs) = groups
            .entry(record.common_name.as_str())
            .or_insert_with(|| {
                (
                    HistorySummary {
                        common_name: record.common_name.clone(),
                        connection_count: 0,
                        total_bytes_received: 0,
                        total_bytes_sent: 0,
                        total_bytes: 0,
                        avg_connection_duration_secs: 0.0,
                        last_connection: record.connected_since,
                    },
                    0,
                )
            });

        summary.connection_count += 1;
        summary.total_bytes_received = summary
            .total_bytes_received
            .saturating_add(record.bytes_received);
        summary.total_bytes_sent = summary.total_bytes_sent.saturating_add(record.bytes_sent);
        summary.total_bytes = summary
            .total_bytes
            .saturating_add(record.bytes_received)
            .saturating_add(record.bytes_sent);
        summary.last_connection = summary.last_connection.max(record.connected_since);
        *total_secs = total_secs.saturating_add(duration);
    }

    groups
        .into_values()
        .map(|(mut summary, total_secs)| {
            summary.avg_connection_duration_secs =
                total_secs as f64 / summary.connection_count as f64;
            summary
        })
        .collect()
}

pub struct HistoryStore {
    path: PathBuf,
    users: HashSet<String>,
    // Serializes appends so lines never interleave.
    write_lock: Mutex<()>,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>, users: impl IntoIterator<Item = String>) -> Self {
        Self {
            path: path.into(),
            users: users.into_iter().collect(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn knows(&self, common_name: &str) -> bool {
        self.users.contains(common_name)
    }

    /// Append one record.
    pub async fn append(&self, record: &DisconnectRecord) -> Result<(), HistoryError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| self.io_error(e))?;
            }
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.io_error(e))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| self.io_error(e))?;
        file.flush().await.map_err(|e| self.io_error(e))?;
        Ok(())
    }

    /// Read the records matching `query`, ordered by connect time (oldest
    /// first unless `newest_first`), then paged.
    pub async fn load(
        &self,
        query: &HistoryQuery,
    ) -> Result<Vec<DisconnectRecord>, HistoryError> {
        let mut records: Vec<DisconnectRecord> = self
            .read_all()
            .await?
            .into_iter()
            .filter(|r| query.matches(r))
            .collect();

        // Stable, so records with equal connect times keep archive order.
        records.sort_by_key(|r| r.connected_since);
        if query.newest_first {
            records.reverse();
        }

        Ok(records
            .into_iter()
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .collect())
    }

    /// Per-user totals over the records matching `query`.
    pub async fn summarize(
        &self,
        query: &SummaryQuery,
    ) -> Result<Vec<HistorySummary>, HistoryError> {
        let records = self.read_all().await?;
        Ok(summarize(records.iter().filter(|r| query.matches(r))))
    }

    /// Every archived record in file order.
    ///
    /// A missing file is an empty history. Lines that do not parse are
    /// skipped with a warning.
    async fn read_all(&self) -> Result<Vec<DisconnectRecord>, HistoryError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No history file at {}", self.path.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(self.io_error(e)),
        };

        let mut records = Vec::new();
        for (index, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<DisconnectRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(
                    "Skipping corrupt history line {} in {}: {}",
                    index + 1,
                    self.path.display(),
                    e
                ),
            }
        }
        Ok(records)
    }

    fn io_error(&self, source: std::io::Error) -> HistoryError {
        HistoryError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait::async_trait]
impl DisconnectSink for HistoryStore {
    async fn record(&self, record: DisconnectRecord) {
        if !self.knows(&record.common_name) {
            info!("User {} not found, disconnect not archived", record.common_name);
            return;
        }
        match self.append(&record).await {
            Ok(()) => debug!("Archived disconnect of {}", record.common_name),
            Err(e) => warn!("Failed to archive disconnect of {}: {}", record.common_name, e),
        }
    }
}

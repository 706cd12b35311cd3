use chrono::{DateTime, Utc};
use ovpnstat_core::{ClientSession, DisconnectRecord, RoutingEntry, SpeedStat};
use serde::{Deserialize, Serialize};

use crate::state::history::HistorySummary;

// ── initialize ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct InitializeParams {
    pub protocol_version: String,
    pub client: String,
    pub client_version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Capabilities {
    pub methods: Vec<String>,
    pub debounce_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitializeResult {
    pub protocol_version: String,
    pub agent_version: String,
    pub capabilities: Capabilities,
}

// ── stats.speed ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct SpeedStatsResult {
    pub stats: Vec<SpeedStat>,
}

// ── stats.clients ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct ClientsResult {
    pub generated_at: DateTime<Utc>,
    pub clients: Vec<ClientSession>,
    pub routes: Vec<RoutingEntry>,
}

// ── stats.history ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryParams {
    #[serde(default)]
    pub common_name: Option<String>,
    #[serde(default)]
    pub real_address: Option<String>,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sort_order: SortOrder,
    /// `0` means no limit.
    #[serde(default)]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryResult {
    pub records: Vec<DisconnectRecord>,
}

// ── stats.summary ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SummaryParams {
    /// Matches any common name containing this text.
    #[serde(default)]
    pub common_name: Option<String>,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryResult {
    pub summaries: Vec<HistorySummary>,
}

// ── health.check ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    pub status: String,
    pub uptime_secs: u64,
    pub active_clients: u32,
}

use std::sync::Arc;
use std::time::Instant;

use ovpnstat_core::StatsRegistry;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::protocol::errors;
use crate::protocol::messages::{JsonRpcErrorResponse, JsonRpcRequest, JsonRpcResponse};
use crate::protocol::methods::{
    Capabilities, ClientsResult, HealthCheckResult, HistoryParams, HistoryResult,
    InitializeParams, InitializeResult, SortOrder, SpeedStatsResult, SummaryParams,
    SummaryResult,
};
use crate::state::history::{HistoryError, HistoryQuery, HistoryStore, SummaryQuery};

/// The agent's protocol version.
const AGENT_PROTOCOL_VERSION: &str = "0.1.0";

const METHODS: &[&str] = &[
    "stats.speed",
    "stats.clients",
    "stats.history",
    "stats.summary",
    "health.check",
];

/// Routes JSON-RPC requests to the statistics registry and the
/// disconnect history.
pub struct Dispatcher {
    registry: Arc<StatsRegistry>,
    history: Arc<HistoryStore>,
    initialized: bool,
    start_time: Instant,
}

/// The result of dispatching a request: either a success or error response.
pub enum DispatchResult {
    Success(JsonRpcResponse),
    Error(JsonRpcErrorResponse),
}

impl DispatchResult {
    /// Serialize the result to a JSON `Value`.
    pub fn to_json(&self) -> Value {
        let value = match self {
            Self::Success(resp) => serde_json::to_value(resp),
            Self::Error(resp) => serde_json::to_value(resp),
        };
        value.unwrap_or_default()
    }

    fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self::Error(JsonRpcErrorResponse::new(id, code, message))
    }

    fn success<T: Serialize>(id: Value, result: T) -> Self {
        match serde_json::to_value(result) {
            Ok(value) => Self::Success(JsonRpcResponse::new(id, value)),
            Err(e) => Self::error(id, errors::INTERNAL_ERROR, format!("Serialization failed: {e}")),
        }
    }
}

impl Dispatcher {
    pub fn new(registry: Arc<StatsRegistry>, history: Arc<HistoryStore>) -> Self {
        Self {
            registry,
            history,
            initialized: false,
            start_time: Instant::now(),
        }
    }

    /// Dispatch a parsed JSON-RPC request to the appropriate handler.
    pub async fn dispatch(&mut self, request: JsonRpcRequest) -> DispatchResult {
        let id = request.id.clone();
        let method = request.method.as_str();

        debug!("Dispatching method: {}", method);

        if method == "initialize" {
            return self.handle_initialize(request);
        }

        if !self.initialized {
            return DispatchResult::error(
                id,
                errors::NOT_INITIALIZED,
                "Agent not initialized, call 'initialize' first",
            );
        }

        match method {
            "stats.speed" => self.handle_speed(request),
            "stats.clients" => self.handle_clients(request),
            "stats.history" => self.handle_history(request).await,
            "stats.summary" => self.handle_summary(request).await,
            "health.check" => self.handle_health_check(request),
            _ => {
                warn!("Unknown method: {}", method);
                DispatchResult::error(
                    id,
                    errors::METHOD_NOT_FOUND,
                    format!("Method not found: {method}"),
                )
            }
        }
    }

    fn handle_initialize(&mut self, request: JsonRpcRequest) -> DispatchResult {
        let id = request.id.clone();

        let params: InitializeParams = match serde_json::from_value(request.params) {
            Ok(p) => p,
            Err(e) => {
                return DispatchResult::error(
                    id,
                    errors::INVALID_PARAMS,
                    format!("Invalid initialize params: {e}"),
                );
            }
        };

        // Only major version 0 is spoken.
        let major = params
            .protocol_version
            .split('.')
            .next()
            .and_then(|s| s.parse::<u32>().ok());
        if major != Some(0) {
            return DispatchResult::error(
                id,
                errors::VERSION_NOT_SUPPORTED,
                format!(
                    "Unsupported protocol version: {} (agent supports 0.x)",
                    params.protocol_version
                ),
            );
        }

        debug!(
            "Initialized by {} {}",
            params.client, params.client_version
        );
        self.initialized = true;

        DispatchResult::success(
            id,
            InitializeResult {
                protocol_version: AGENT_PROTOCOL_VERSION.to_string(),
                agent_version: env!("CARGO_PKG_VERSION").to_string(),
                capabilities: Capabilities {
                    methods: METHODS.iter().map(|m| m.to_string()).collect(),
                    debounce_ms: self.registry.debounce().as_millis() as u64,
                },
            },
        )
    }

    fn handle_speed(&self, request: JsonRpcRequest) -> DispatchResult {
        DispatchResult::success(
            request.id,
            SpeedStatsResult {
                stats: self.registry.speed_stats(),
            },
        )
    }

    fn handle_clients(&self, request: JsonRpcRequest) -> DispatchResult {
        match self.registry.current_snapshot() {
            Some(snapshot) => DispatchResult::success(
                request.id,
                ClientsResult {
                    generated_at: snapshot.generated_at,
                    clients: snapshot.clients,
                    routes: snapshot.routes,
                },
            ),
            None => DispatchResult::error(
                request.id,
                errors::NO_SNAPSHOT,
                "The status log has not been read yet",
            ),
        }
    }

    async fn handle_history(&self, request: JsonRpcRequest) -> DispatchResult {
        let id = request.id.clone();

        let params: HistoryParams = match optional_params(request.params) {
            Ok(p) => p,
            Err(e) => {
                return DispatchResult::error(
                    id,
                    errors::INVALID_PARAMS,
                    format!("Invalid stats.history params: {e}"),
                );
            }
        };

        let query = HistoryQuery {
            common_name: params.common_name,
            real_address: params.real_address,
            start: params.start_date,
            end: params.end_date,
            newest_first: params.sort_order == SortOrder::Desc,
            offset: params.offset,
            limit: (params.limit > 0).then_some(params.limit),
        };

        match self.history.load(&query).await {
            Ok(records) => DispatchResult::success(id, HistoryResult { records }),
            Err(e) => self.history_unavailable(id, e),
        }
    }

    async fn handle_summary(&self, request: JsonRpcRequest) -> DispatchResult {
        let id = request.id.clone();

        let params: SummaryParams = match optional_params(request.params) {
            Ok(p) => p,
            Err(e) => {
                return DispatchResult::error(
                    id,
                    errors::INVALID_PARAMS,
                    format!("Invalid stats.summary params: {e}"),
                );
            }
        };

        let query = SummaryQuery {
            name_contains: params.common_name.filter(|name| !name.is_empty()),
            after: params.start_date,
            before: params.end_date,
        };

        match self.history.summarize(&query).await {
            Ok(summaries) => DispatchResult::success(id, SummaryResult { summaries }),
            Err(e) => self.history_unavailable(id, e),
        }
    }

    fn history_unavailable(&self, id: Value, e: HistoryError) -> DispatchResult {
        warn!("Failed to read history: {}", e);
        DispatchResult::Error(
            JsonRpcErrorResponse::new(
                id,
                errors::HISTORY_UNAVAILABLE,
                format!("History unavailable: {e}"),
            )
            .with_data(serde_json::json!({
                "path": self.history.path().display().to_string()
            })),
        )
    }

    fn handle_health_check(&self, request: JsonRpcRequest) -> DispatchResult {
        let active = self.registry.connected_clients().len();

        DispatchResult::success(
            request.id,
            HealthCheckResult {
                status: "ok".to_string(),
                uptime_secs: self.start_time.elapsed().as_secs(),
                active_clients: u32::try_from(active).unwrap_or(u32::MAX),
            },
        )
    }
}

/// Missing (`null`) params mean all defaults.
fn optional_params<T: DeserializeOwned + Default>(params: Value) -> serde_json::Result<T> {
    if params.is_null() {
        Ok(T::default())
    } else {
        serde_json::from_value(params)
    }
}

//! JSON-RPC 2.0 message types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An incoming request. `params` and `id` default to `null` when absent.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub id: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    pub result: Value,
    pub id: Value,
}

impl JsonRpcResponse {
    pub fn new(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            result,
            id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcErrorResponse {
    pub jsonrpc: &'static str,
    pub error: JsonRpcError,
    pub id: Value,
}

impl JsonRpcErrorResponse {
    pub fn new(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            error: JsonRpcError {
                code,
                message: message.into(),
                data: None,
            },
            id,
        }
    }

    /// Attach structured detail to the error.
    pub fn with_data(mut self, data: Value) -> Self {
        self.error.data = Some(data);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserialize_request() {
        let json_str = r#"{"jsonrpc":"2.0","method":"stats.history","params":{"common_name":"alice"},"id":1}"#;
        let req: JsonRpcRequest = serde_json::from_str(json_str).unwrap();
        assert_eq!(req.jsonrpc, "2.0");
        assert_eq!(req.method, "stats.history");
        assert_eq!(req.id, json!(1));
        assert_eq!(req.params["common_name"], "alice");
    }

    #[test]
    fn deserialize_request_without_params() {
        let json_str = r#"{"jsonrpc":"2.0","method":"stats.speed","id":5}"#;
        let req: JsonRpcRequest = serde_json::from_str(json_str).unwrap();
        assert_eq!(req.method, "stats.speed");
        assert!(req.params.is_null());
    }

    #[test]
    fn serialize_success_response() {
        let resp = JsonRpcResponse::new(json!(1), json!({"status": "ok"}));
        let parsed = serde_json::to_value(&resp).unwrap();
        assert_eq!(parsed["jsonrpc"], "2.0");
        assert_eq!(parsed["result"]["status"], "ok");
        assert_eq!(parsed["id"], 1);
        assert!(parsed.get("error").is_none());
    }

    #[test]
    fn serialize_error_response() {
        let resp = JsonRpcErrorResponse::new(json!(2), -32601, "Method not found");
        let parsed = serde_json::to_value(&resp).unwrap();
        assert_eq!(parsed["error"]["code"], -32601);
        assert_eq!(parsed["error"]["message"], "Method not found");
        assert!(parsed["error"].get("data").is_none());
        assert_eq!(parsed["id"], 2);
    }

    #[test]
    fn serialize_error_response_with_data() {
        let resp = JsonRpcErrorResponse::new(json!("req-3"), -32015, "History unavailable")
            .with_data(json!({"path": "/tmp/history.jsonl"}));
        let parsed = serde_json::to_value(&resp).unwrap();
        assert_eq!(parsed["error"]["data"]["path"], "/tmp/history.jsonl");
        assert_eq!(parsed["id"], "req-3");
    }
}

//! JSON-RPC 2.0 envelope types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Method not found.
pub const ERR_METHOD_NOT_FOUND: i64 = -32601;
/// Invalid parameters.
pub const ERR_INVALID_PARAMS: i64 = -32602;
/// Internal error.
pub const ERR_INTERNAL: i64 = -32603;

/// An incoming request.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub id: Value,
}

/// A structured error object.
#[derive(Debug, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

/// An outgoing response.
#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    pub id: Value,
}

impl RpcResponse {
    /// A success response.
    pub fn ok(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            result: Some(result),
            error: None,
            id,
        }
    }

    /// An error response.
    pub fn err(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
            id,
        }
    }
}

/// Method-level outcome, mapped onto the envelope by the dispatcher.
pub type MethodResult = Result<Value, (i64, String)>;

/// Shorthand for an invalid-params failure.
pub fn invalid_params(message: impl Into<String>) -> (i64, String) {
    (ERR_INVALID_PARAMS, message.into())
}

/// Shorthand for an internal failure.
pub fn internal_error(message: impl Into<String>) -> (i64, String) {
    (ERR_INTERNAL, message.into())
}

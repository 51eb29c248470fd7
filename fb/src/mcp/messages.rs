//! JSON-RPC 2.0 message types for the MCP stdio transport
//!
//! One message per line in both directions.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::dispatch::{DispatchError, ErrorKind, render_remote_error};

pub const JSONRPC_VERSION: &str = "2.0";

/// MCP protocol revision we speak
pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub const SERVER_NAME: &str = env!("CARGO_PKG_NAME");
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// JSON-RPC error codes
pub mod codes {
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
}

/// An incoming request or notification
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,

    /// Absent for notifications
    #[serde(default)]
    pub id: Option<Value>,

    pub method: String,

    #[serde(default)]
    pub params: Value,
}

impl JsonRpcRequest {
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(codes::METHOD_NOT_FOUND, format!("Unknown method: {}", method))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(codes::INVALID_PARAMS, message).with_kind(ErrorKind::InvalidRequest)
    }

    fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.data = Some(json!({ "kind": kind.as_str() }));
        self
    }

    /// Shape a failed `tools/call` of `name`
    pub fn from_dispatch(name: &str, err: &DispatchError) -> Self {
        let kind = err.kind();
        let code = match kind {
            ErrorKind::InvalidRequest => codes::INVALID_PARAMS,
            _ => codes::INTERNAL_ERROR,
        };

        let message = match err {
            DispatchError::RemoteExecution { message, traceback } => {
                render_remote_error(name, message, traceback.as_deref())
            }
            DispatchError::UnknownTool { .. } | DispatchError::InvalidArguments(_) => err.to_string(),
            other => format!("Failed to execute command '{}': {}", name, other),
        };

        let mut data = json!({ "kind": kind.as_str() });
        if let DispatchError::RemoteExecution {
            traceback: Some(traceback),
            ..
        } = err.root()
        {
            data["traceback"] = json!(traceback);
        }

        Self {
            code,
            message,
            data: Some(data),
        }
    }
}

/// An outgoing response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// `tools/call` result carrying one text block
pub fn text_content(text: impl Into<String>) -> Value {
    json!({ "content": [{ "type": "text", "text": text.into() }] })
}

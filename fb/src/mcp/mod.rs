//! Model Context Protocol front end
//!
//! Speaks the tool-calling subset of MCP over stdio and forwards every
//! `tools/call` to a [`ToolInvoker`](crate::dispatch::ToolInvoker).

mod messages;
mod server;

pub use messages::{
    JSONRPC_VERSION, JsonRpcError, JsonRpcRequest, JsonRpcResponse, PROTOCOL_VERSION, SERVER_NAME, SERVER_VERSION,
    codes, text_content,
};
pub use server::McpServer;

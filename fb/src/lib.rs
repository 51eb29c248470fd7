//! fusionbridge - drive a CAD host add-in through a pair of shared files
//!
//! The host cannot be reached over a network or in-process API. It watches a
//! command file and answers in a response file; this crate owns that exchange
//! and exposes it as MCP tools.
//!
//! # Architecture
//!
//! - **coerce**: best-effort numeric argument normalization
//! - **channel**: atomic command writes and response polling
//! - **dispatch**: CommandDispatcher, macro expansion and the serializing actor
//! - **catalog**: embedded tool descriptors
//! - **mcp**: JSON-RPC over stdio
//! - **config** / **cli**: YAML configuration and command line

pub mod catalog;
pub mod channel;
pub mod cli;
pub mod coerce;
pub mod config;
pub mod dispatch;
pub mod mcp;

pub use catalog::{ToolCatalog, ToolDescriptor};
pub use channel::{ChannelPaths, CompletionMode, PollTiming};
pub use config::Config;
pub use dispatch::{
    CommandDispatcher, DispatchError, DispatchResult, DispatcherConfig, DispatcherHandle, ErrorKind, ToolInvoker,
};
pub use mcp::McpServer;

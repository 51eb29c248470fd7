//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

/// fusionbridge - file-channel bridge between MCP clients and the CAD host
#[derive(Parser)]
#[command(
    name = "fb",
    about = "Bridges MCP tool calls to the CAD host add-in through shared files",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Log to stderr instead of the log file
    #[arg(long = "log-stderr", global = true)]
    pub log_stderr: bool,

    /// Subcommand to execute (defaults to `serve`)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve MCP over stdin/stdout
    Serve,

    /// Dispatch one tool call and print the outcome
    Call {
        /// Tool name, e.g. create_box
        tool: String,

        /// Tool arguments as a JSON object
        #[arg(short, long, default_value = "{}")]
        args: String,

        /// Override the response timeout
        #[arg(short, long)]
        timeout_ms: Option<u64>,
    },

    /// List the tools in the catalog
    Tools {
        /// Print only tool names
        #[arg(long)]
        names: bool,
    },

    /// Show the resolved command and response paths
    Paths,
}

/// Where the log file lives
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    let path = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fusionbridge")
        .join("logs")
        .join("fusionbridge.log");
    debug!(?path, "get_log_path: returning path");
    path
}

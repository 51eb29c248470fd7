//! fusionbridge - MCP bridge to the CAD host add-in
//!
//! CLI entry point: serves MCP over stdio or runs one-off commands.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use fusionbridge::catalog::ToolCatalog;
use fusionbridge::channel::CompletionMode;
use fusionbridge::cli::{Cli, Command, get_log_path};
use fusionbridge::config::Config;
use fusionbridge::dispatch::{CommandDispatcher, DispatcherHandle};
use fusionbridge::mcp::McpServer;

fn parse_level(s: &str) -> tracing::Level {
    match s.to_uppercase().as_str() {
        "TRACE" => tracing::Level::TRACE,
        "DEBUG" => tracing::Level::DEBUG,
        "INFO" => tracing::Level::INFO,
        "WARN" | "WARNING" => tracing::Level::WARN,
        "ERROR" => tracing::Level::ERROR,
        _ => {
            eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
            tracing::Level::INFO
        }
    }
}

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>, to_stderr: bool) -> Result<()> {
    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = cli_log_level
        .or(config_log_level)
        .map(parse_level)
        .unwrap_or(tracing::Level::INFO);
    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

    if to_stderr {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .init();
    } else {
        // stdout carries the protocol, so logs go to a file
        let log_path = get_log_path();
        let log_dir = log_path.parent().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
        fs::create_dir_all(&log_dir).context("Failed to create log directory")?;
        let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

        tracing_subscriber::fmt()
            .with_writer(log_file)
            .with_ansi(false)
            .with_env_filter(filter)
            .init();
    }

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

/// A panic leaves the channel in an unknown state; log it and exit
fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        error!(%panic_info, "Panic, exiting");
        default_hook(panic_info);
        std::process::exit(1);
    }));
}

fn build_dispatcher(config: &Config, catalog: Arc<ToolCatalog>) -> CommandDispatcher {
    CommandDispatcher::new(config.channel.paths(), config.channel.timing(), &config.dispatch)
        .with_catalog(catalog)
        .with_response_timeout(config.channel.response_timeout())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    setup_logging(cli.log_level.as_deref(), config.log_level.as_deref(), cli.log_stderr)
        .context("Failed to setup logging")?;
    install_panic_hook();

    info!(
        command_path = %config.channel.command_path.display(),
        response_path = %config.channel.response_path.display(),
        "fusionbridge loaded config"
    );

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => cmd_serve(&config).await,
        Command::Call { tool, args, timeout_ms } => cmd_call(&config, &tool, &args, timeout_ms).await,
        Command::Tools { names } => cmd_tools(names),
        Command::Paths => cmd_paths(&config),
    }
}

async fn cmd_serve(config: &Config) -> Result<()> {
    debug!("cmd_serve: called");
    let catalog = Arc::new(ToolCatalog::embedded()?);
    let dispatcher = build_dispatcher(config, catalog.clone());
    let handle = DispatcherHandle::spawn(dispatcher, config.dispatch.queue_capacity);
    let server = McpServer::new(Arc::new(handle.clone()), catalog);

    tokio::select! {
        result = server.serve_stdio() => {
            result?;
        }
        _ = shutdown_signal() => {
            info!("Signal received, shutting down");
        }
    }

    // the actor may already be gone if every handle was dropped
    let _ = handle.shutdown().await;
    info!("fusionbridge exiting");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    debug!("shutdown_signal: setting up signal handlers");
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => warn!("SIGINT received"),
                    _ = sigterm.recv() => warn!("SIGTERM received"),
                }
                return;
            }
            Err(e) => warn!(error = %e, "Failed to install SIGTERM handler"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    warn!("SIGINT received");
}

async fn cmd_call(config: &Config, tool: &str, args: &str, timeout_ms: Option<u64>) -> Result<()> {
    debug!(%tool, ?timeout_ms, "cmd_call: called");
    let catalog = Arc::new(ToolCatalog::embedded()?);
    let mut args: Value = serde_json::from_str(args).context("--args is not valid JSON")?;
    catalog.normalize_arguments(tool, &mut args);

    let mut dispatcher = build_dispatcher(config, catalog);
    let timeout = timeout_ms
        .map(std::time::Duration::from_millis)
        .unwrap_or_else(|| config.channel.response_timeout());

    match dispatcher.dispatch_with_timeout(tool, args, timeout).await {
        Ok(result) => {
            println!("{} {}", "✓".green(), result.render_text());
            Ok(())
        }
        Err(e) => {
            eprintln!("{} [{}] {}", "✗".red(), e.kind().to_string().yellow(), e);
            std::process::exit(1);
        }
    }
}

fn cmd_tools(names_only: bool) -> Result<()> {
    debug!(names_only, "cmd_tools: called");
    let catalog = ToolCatalog::embedded()?;
    for tool in catalog.descriptors() {
        if names_only {
            println!("{}", tool.name);
        } else {
            println!("{}  {}", tool.name.cyan(), tool.description.dimmed());
        }
    }
    Ok(())
}

fn cmd_paths(config: &Config) -> Result<()> {
    debug!("cmd_paths: called");
    let paths = config.channel.paths();
    println!("{}  {}", "command ".bold(), paths.command.display());
    println!("{}  {}", "response".bold(), paths.response.display());
    if config.channel.completion == CompletionMode::Marker {
        println!("{}  {}", "marker  ".bold(), paths.marker().display());
    }
    println!("{}  {}", "log     ".bold(), get_log_path().display());
    Ok(())
}

//! CommandDispatcher - drives one command through the file channel
//!
//! Every leaf dispatch runs the same sequence: clear the response file,
//! publish the command, wait for the host, then classify what came back.
//! `execute_macro` is expanded here into a run of leaf dispatches.

use serde_json::{Value, json};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::macros::{MACRO_TOOL, MacroCommand, MacroGuard};
use super::{DispatchError, DispatchResult, DispatcherConfig, ErrorKind};
use crate::catalog::ToolCatalog;
use crate::channel::{
    AtomicCommandWriter, ChannelPaths, CommandEnvelope, DEFAULT_RESPONSE_TIMEOUT, PollTiming, ResponseChannel,
    ResponseEnvelope,
};

type MacroFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, DispatchError>> + Send + 'a>>;

/// Where the current dispatch is in the exchange with the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPhase {
    Idle,
    ResponseCleared,
    CommandWritten,
    AwaitingResponse,
    Succeeded,
    Failed(ErrorKind),
}

/// Owns the channel paths and sends commands through them one at a time
#[derive(Debug)]
pub struct CommandDispatcher {
    paths: ChannelPaths,
    writer: AtomicCommandWriter,
    responses: ResponseChannel,
    response_timeout: Duration,
    guard: MacroGuard,
    catalog: Option<Arc<ToolCatalog>>,
    phase: DispatchPhase,
}

impl CommandDispatcher {
    pub fn new(paths: ChannelPaths, timing: PollTiming, config: &DispatcherConfig) -> Self {
        debug!(
            command = %paths.command.display(),
            response = %paths.response.display(),
            "CommandDispatcher::new: called"
        );
        Self {
            writer: AtomicCommandWriter::new(paths.command.clone()),
            responses: ResponseChannel::new(&paths, timing),
            paths,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            guard: MacroGuard::new(config.max_macro_depth),
            catalog: None,
            phase: DispatchPhase::Idle,
        }
    }

    /// Reject tool names the catalog does not list
    pub fn with_catalog(mut self, catalog: Arc<ToolCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn paths(&self) -> &ChannelPaths {
        &self.paths
    }

    pub fn phase(&self) -> DispatchPhase {
        self.phase
    }

    pub fn response_timeout(&self) -> Duration {
        self.response_timeout
    }

    /// Send `name` with `args` to the host and wait for its answer
    pub async fn dispatch(&mut self, name: &str, args: Value) -> Result<DispatchResult, DispatchError> {
        self.dispatch_with_timeout(name, args, self.response_timeout).await
    }

    /// Like [`dispatch`](Self::dispatch) with a one-off response timeout
    pub async fn dispatch_with_timeout(
        &mut self,
        name: &str,
        args: Value,
        timeout: Duration,
    ) -> Result<DispatchResult, DispatchError> {
        let dispatch_id = Uuid::now_v7();
        info!(%dispatch_id, tool = %name, "Dispatching command");
        // a cancelled dispatch may have left macros on the guard
        self.guard.reset();

        let outcome = if name == MACRO_TOOL {
            self.dispatch_macro(args, timeout).await
        } else {
            self.dispatch_leaf(name, args, timeout).await.map(|r| r.result)
        };

        match &outcome {
            Ok(_) => info!(%dispatch_id, tool = %name, "Command completed"),
            Err(e) => warn!(%dispatch_id, tool = %name, kind = %e.kind(), error = %e, "Command failed"),
        }
        outcome.map(|result| DispatchResult::new(name, result))
    }

    async fn dispatch_macro(&mut self, args: Value, timeout: Duration) -> Result<Value, DispatchError> {
        let command = MacroCommand::parse(&args)?;
        let catalog = self.catalog.clone();
        let is_known = move |name: &str| catalog.as_ref().is_none_or(|c| c.contains(name));
        self.guard.validate(&command, &is_known)?;
        self.run_macro(command, timeout).await
    }

    fn run_macro(&mut self, command: MacroCommand, timeout: Duration) -> MacroFuture<'_> {
        Box::pin(async move {
            self.guard.enter(&command.id)?;
            debug!(macro_id = %command.id, depth = self.guard.depth(), steps = command.steps.len(), "CommandDispatcher::run_macro: called");

            let mut results = Vec::with_capacity(command.steps.len());
            let mut failure = None;
            for (i, step) in command.steps.into_iter().enumerate() {
                let step_no = i + 1;
                let outcome = if step.is_macro() {
                    match MacroCommand::parse(&step.arguments) {
                        Ok(nested) => self.run_macro(nested, timeout).await,
                        Err(e) => Err(e),
                    }
                } else {
                    self.dispatch_leaf(&step.tool_name, step.arguments, timeout)
                        .await
                        .map(|r| r.result)
                };

                match outcome {
                    Ok(result) => results.push(json!({
                        "step": step_no,
                        "tool_name": step.tool_name,
                        "result": result,
                    })),
                    Err(e) => {
                        info!(step = step_no, tool = %step.tool_name, "Macro step failed, aborting remaining steps");
                        failure = Some(DispatchError::MacroStepFailed {
                            step: step_no,
                            tool_name: step.tool_name,
                            source: Box::new(e),
                        });
                        break;
                    }
                }
            }

            self.guard.exit();
            match failure {
                Some(e) => Err(e),
                None => Ok(json!({ "steps": results })),
            }
        })
    }

    async fn dispatch_leaf(&mut self, name: &str, args: Value, timeout: Duration) -> Result<DispatchResult, DispatchError> {
        if let Some(catalog) = &self.catalog {
            if !catalog.contains(name) {
                return Err(DispatchError::UnknownTool { name: name.to_string() });
            }
        }

        self.phase = DispatchPhase::Idle;
        let outcome = self.exchange(name, args, timeout).await;
        self.phase = match &outcome {
            Ok(_) => DispatchPhase::Succeeded,
            Err(e) => DispatchPhase::Failed(e.kind()),
        };
        debug!(phase = ?self.phase, "CommandDispatcher::dispatch_leaf: finished");
        outcome.map(|result| DispatchResult::new(name, result))
    }

    async fn exchange(&mut self, name: &str, args: Value, timeout: Duration) -> Result<Value, DispatchError> {
        self.responses.clear().await;
        self.advance(DispatchPhase::ResponseCleared);

        let envelope = CommandEnvelope::new(name, args);
        self.writer.publish(&envelope).await?;
        self.advance(DispatchPhase::CommandWritten);

        self.advance(DispatchPhase::AwaitingResponse);
        let raw = self.responses.await_update(timeout).await?;

        ResponseEnvelope::parse(&raw)?.into_result()
    }

    fn advance(&mut self, next: DispatchPhase) {
        debug!(from = ?self.phase, to = ?next, "CommandDispatcher::advance: called");
        self.phase = next;
    }
}

//! DispatcherHandle - actor that owns the CommandDispatcher
//!
//! Callers from any task send requests through a bounded queue; the actor
//! runs them one at a time, so the clear/write/await sequence never
//! interleaves on the shared files.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use super::{CommandDispatcher, DispatchError, DispatchResult};

/// Reply to a dispatch request
pub type DispatchResponse = Result<DispatchResult, DispatchError>;

/// Requests sent to the dispatcher actor
#[derive(Debug)]
pub enum DispatchRequest {
    Dispatch {
        name: String,
        args: Value,
        timeout: Option<Duration>,
        reply: oneshot::Sender<DispatchResponse>,
    },

    Shutdown,
}

/// Anything that can run a named tool with JSON arguments
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn invoke(&self, name: &str, args: Value) -> DispatchResponse;
}

/// Handle to send requests to the dispatcher actor
#[derive(Debug, Clone)]
pub struct DispatcherHandle {
    tx: mpsc::Sender<DispatchRequest>,
}

impl DispatcherHandle {
    /// Spawn the actor task around `dispatcher`
    pub fn spawn(dispatcher: CommandDispatcher, queue_capacity: usize) -> Self {
        debug!(queue_capacity, "DispatcherHandle::spawn: called");
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        tokio::spawn(actor_loop(dispatcher, rx));
        info!("Dispatcher spawned");
        Self { tx }
    }

    pub async fn dispatch(&self, name: &str, args: Value) -> DispatchResponse {
        self.send(name, args, None).await
    }

    pub async fn dispatch_with_timeout(&self, name: &str, args: Value, timeout: Duration) -> DispatchResponse {
        self.send(name, args, Some(timeout)).await
    }

    async fn send(&self, name: &str, args: Value, timeout: Option<Duration>) -> DispatchResponse {
        debug!(%name, "DispatcherHandle::send: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(DispatchRequest::Dispatch {
                name: name.to_string(),
                args,
                timeout,
                reply: reply_tx,
            })
            .await
            .map_err(|_| DispatchError::ChannelClosed)?;
        reply_rx.await.map_err(|_| DispatchError::ChannelClosed)?
    }

    /// Stop the actor once the request in flight finishes
    ///
    /// Requests queued after the shutdown are answered with `Cancelled`.
    pub async fn shutdown(&self) -> Result<(), DispatchError> {
        debug!("DispatcherHandle::shutdown: called");
        self.tx
            .send(DispatchRequest::Shutdown)
            .await
            .map_err(|_| DispatchError::ChannelClosed)
    }
}

#[async_trait]
impl ToolInvoker for DispatcherHandle {
    async fn invoke(&self, name: &str, args: Value) -> DispatchResponse {
        self.dispatch(name, args).await
    }
}

async fn actor_loop(mut dispatcher: CommandDispatcher, mut rx: mpsc::Receiver<DispatchRequest>) {
    debug!("actor_loop: called");

    while let Some(request) = rx.recv().await {
        match request {
            DispatchRequest::Dispatch {
                name,
                args,
                timeout,
                mut reply,
            } => {
                if reply.is_closed() {
                    debug!(%name, "actor_loop: caller gone before start, skipping");
                    continue;
                }

                let timeout = timeout.unwrap_or_else(|| dispatcher.response_timeout());
                // the published command cannot be retracted; only the wait is cut short
                let outcome = tokio::select! {
                    outcome = dispatcher.dispatch_with_timeout(&name, args, timeout) => outcome,
                    _ = reply.closed() => {
                        info!(%name, "Caller went away, dispatch cancelled");
                        continue;
                    }
                };
                let _ = reply.send(outcome);
            }

            DispatchRequest::Shutdown => {
                info!("Dispatcher shutting down");
                rx.close();
                cancel_queued(&mut rx);
                break;
            }
        }
    }

    debug!("actor_loop: exited");
}

/// Answer every request still queued behind a shutdown with `Cancelled`
fn cancel_queued(rx: &mut mpsc::Receiver<DispatchRequest>) {
    let mut cancelled = 0;
    while let Ok(request) = rx.try_recv() {
        if let DispatchRequest::Dispatch { name, reply, .. } = request {
            debug!(%name, "cancel_queued: cancelling");
            let _ = reply.send(Err(DispatchError::Cancelled));
            cancelled += 1;
        }
    }
    if cancelled > 0 {
        info!(cancelled, "Cancelled queued dispatches at shutdown");
    }
}

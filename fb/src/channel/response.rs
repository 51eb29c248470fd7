//! ResponseChannel - clears and polls the host's response file
//!
//! The host truncates and rewrites the response file in place, so a stat or
//! read can fail or see partial content at any moment. Those races are
//! "not ready yet", never errors; only the deadline ends a wait.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::{ChannelPaths, CompletionMode, PollTiming};
use crate::dispatch::DispatchError;

/// Default time to wait for the host
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_millis(60_000);

/// Reader side of the file channel
#[derive(Debug, Clone)]
pub struct ResponseChannel {
    path: PathBuf,
    marker: PathBuf,
    timing: PollTiming,
}

impl ResponseChannel {
    pub fn new(paths: &ChannelPaths, timing: PollTiming) -> Self {
        Self {
            path: paths.response.clone(),
            marker: paths.marker(),
            timing,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn timing(&self) -> PollTiming {
        self.timing
    }

    /// Truncate the response file so the next non-empty content is a fresh answer
    ///
    /// Failures are logged and swallowed: a missing response file reads the
    /// same as "not answered yet".
    pub async fn clear(&self) {
        debug!(path = %self.path.display(), "ResponseChannel::clear: called");
        if let Err(e) = tokio::fs::write(&self.path, "").await {
            warn!(path = %self.path.display(), error = %e, "Failed to clear response file");
        }

        if self.timing.completion == CompletionMode::Marker {
            match tokio::fs::remove_file(&self.marker).await {
                Ok(()) => debug!("ResponseChannel::clear: removed stale marker"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(marker = %self.marker.display(), error = %e, "Failed to remove completion marker"),
            }
        }
    }

    /// Poll until a complete response appears or `timeout` elapses
    ///
    /// Returns the trimmed response text. Dropping the future stops polling.
    pub async fn await_update(&self, timeout: Duration) -> Result<String, DispatchError> {
        debug!(timeout_ms = timeout.as_millis() as u64, "ResponseChannel::await_update: called");
        let started = Instant::now();
        let deadline = started + timeout;

        let mut ticker = tokio::time::interval(self.timing.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = tokio::time::sleep_until(deadline) => break,
            }

            let attempt = match self.timing.completion {
                CompletionMode::Settle => self.try_read_settled().await,
                CompletionMode::Marker => self.try_read_marked().await,
            };
            if let Some(content) = attempt {
                debug!(len = content.len(), "ResponseChannel::await_update: response ready");
                return Ok(content);
            }

            if Instant::now() >= deadline {
                break;
            }
        }

        let elapsed = started.elapsed();
        info!(elapsed_ms = elapsed.as_millis() as u64, "Timed out waiting for host response");
        Err(DispatchError::ResponseTimeout { elapsed })
    }

    /// Non-empty file whose size holds steady across the settle delay
    async fn try_read_settled(&self) -> Option<String> {
        let before = tokio::fs::metadata(&self.path).await.ok()?.len();
        if before == 0 {
            return None;
        }

        tokio::time::sleep(self.timing.settle_delay).await;

        let bytes = tokio::fs::read(&self.path).await.ok()?;
        if bytes.len() as u64 != before {
            debug!(before, after = bytes.len(), "ResponseChannel::try_read_settled: still being written");
            return None;
        }

        let content = String::from_utf8_lossy(&bytes).trim().to_string();
        if content.is_empty() { None } else { Some(content) }
    }

    /// Response is complete once the host has created the marker
    ///
    /// The marker stays in place until the response itself is non-empty.
    async fn try_read_marked(&self) -> Option<String> {
        tokio::fs::metadata(&self.marker).await.ok()?;

        let bytes = tokio::fs::read(&self.path).await.ok()?;
        let content = String::from_utf8_lossy(&bytes).trim().to_string();
        if content.is_empty() {
            debug!("ResponseChannel::try_read_marked: marker present, response still empty");
            return None;
        }

        if let Err(e) = tokio::fs::remove_file(&self.marker).await {
            warn!(marker = %self.marker.display(), error = %e, "Failed to remove completion marker");
        }
        Some(content)
    }
}

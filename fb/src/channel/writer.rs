//! AtomicCommandWriter - publishes commands with temp-write + rename
//!
//! The host polls the command file; a direct write would let it observe a
//! half-written command. Writing to a unique sibling and renaming over the
//! target gives the host an all-or-nothing view.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

use super::CommandEnvelope;
use crate::dispatch::DispatchError;

/// Total attempts before giving up
pub const MAX_WRITE_ATTEMPTS: u32 = 3;

/// Base unit for the exponential backoff
const BACKOFF_BASE: Duration = Duration::from_millis(100);

/// Delay after failed attempt `attempt` (1-based): 200ms, 400ms, ...
pub fn backoff_delay(attempt: u32) -> Duration {
    BACKOFF_BASE * 2u32.pow(attempt)
}

/// Writes command envelopes to a fixed path
#[derive(Debug)]
pub struct AtomicCommandWriter {
    path: PathBuf,
    seq: AtomicU64,
}

impl AtomicCommandWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            seq: AtomicU64::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialize and publish `envelope`, retrying with backoff
    pub async fn publish(&self, envelope: &CommandEnvelope) -> Result<(), DispatchError> {
        debug!(command = %envelope.command, path = %self.path.display(), "AtomicCommandWriter::publish: called");
        let body = envelope
            .to_pretty_json()
            .map_err(|e| DispatchError::InvalidArguments(format!("parameters are not serializable: {}", e)))?;

        let mut attempt = 1;
        loop {
            match self.write_once(&body).await {
                Ok(()) => {
                    debug!(attempt, "AtomicCommandWriter::publish: command file written");
                    return Ok(());
                }
                Err(e) if attempt < MAX_WRITE_ATTEMPTS => {
                    let delay = backoff_delay(attempt);
                    warn!(attempt, error = %e, delay_ms = delay.as_millis() as u64, "Command write failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Command write failed, giving up");
                    return Err(DispatchError::WriteFailure {
                        path: self.path.clone(),
                        attempts: attempt,
                        source: e,
                    });
                }
            }
        }
    }

    async fn write_once(&self, body: &str) -> std::io::Result<()> {
        let temp = self.temp_path();
        debug!(temp = %temp.display(), "AtomicCommandWriter::write_once: writing temp file");
        let result = match tokio::fs::write(&temp, body).await {
            Ok(()) => tokio::fs::rename(&temp, &self.path).await,
            Err(e) => Err(e),
        };

        // a failed write may still have created a partial temp file
        if result.is_err() {
            match tokio::fs::remove_file(&temp).await {
                Ok(()) => debug!(temp = %temp.display(), "AtomicCommandWriter::write_once: removed temp file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => debug!(error = %e, "AtomicCommandWriter::write_once: temp cleanup failed"),
            }
        }
        result
    }

    /// `<path>.tmp.<unix-nanos>.<pid>.<seq>`
    fn temp_path(&self) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let mut name = self.path.as_os_str().to_os_string();
        name.push(format!(".tmp.{}.{}.{}", nanos, std::process::id(), seq));
        PathBuf::from(name)
    }
}

//! File channel shared with the host add-in
//!
//! The host watches one command file and answers through one response file.
//! Nothing else connects the two processes, so this module owns every read
//! and write of those paths:
//!
//! - [`AtomicCommandWriter`] publishes a command with temp-write + rename
//! - [`ResponseChannel`] clears and polls the response file
//! - [`CommandEnvelope`] / [`ResponseEnvelope`] are the on-disk formats

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

mod envelope;
mod response;
mod writer;

pub use envelope::{CommandEnvelope, ResponseEnvelope, ResponseStatus};
pub use response::{DEFAULT_RESPONSE_TIMEOUT, ResponseChannel};
pub use writer::{AtomicCommandWriter, MAX_WRITE_ATTEMPTS, backoff_delay};

/// File name the host reads commands from
pub const COMMAND_FILE_NAME: &str = "fusion_command.txt";

/// File name the host writes responses to
pub const RESPONSE_FILE_NAME: &str = "fusion_response.txt";

/// Suffix of the completion marker written next to the response in marker mode
pub const MARKER_SUFFIX: &str = ".done";

/// The command/response path pair, fixed for the lifetime of a dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelPaths {
    pub command: PathBuf,
    pub response: PathBuf,
}

impl ChannelPaths {
    pub fn new(command: impl Into<PathBuf>, response: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            response: response.into(),
        }
    }

    /// Both files inside one directory, using the host's file names
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self::new(dir.join(COMMAND_FILE_NAME), dir.join(RESPONSE_FILE_NAME))
    }

    /// `<home>/Documents`, where the host add-in looks by default
    pub fn default_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Documents")
    }

    /// Completion marker path used in [`CompletionMode::Marker`]
    pub fn marker(&self) -> PathBuf {
        let mut name = self.response.as_os_str().to_os_string();
        name.push(MARKER_SUFFIX);
        PathBuf::from(name)
    }
}

impl Default for ChannelPaths {
    fn default() -> Self {
        Self::in_dir(Self::default_dir())
    }
}

/// How the response channel decides a response is complete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionMode {
    /// Non-empty file whose size is unchanged across the settle delay
    #[default]
    Settle,
    /// The host touches `<response>.done` once the response is fully written
    Marker,
}

/// Timing for response polling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTiming {
    pub poll_interval: Duration,
    pub settle_delay: Duration,
    pub completion: CompletionMode,
}

impl Default for PollTiming {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            settle_delay: Duration::from_millis(50),
            completion: CompletionMode::Settle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_dir_uses_host_file_names() {
        let paths = ChannelPaths::in_dir("/tmp/x");
        assert_eq!(paths.command, PathBuf::from("/tmp/x/fusion_command.txt"));
        assert_eq!(paths.response, PathBuf::from("/tmp/x/fusion_response.txt"));
    }

    #[test]
    fn test_default_paths_live_in_documents() {
        let paths = ChannelPaths::default();
        assert!(paths.command.ends_with("Documents/fusion_command.txt"));
        assert!(paths.response.ends_with("Documents/fusion_response.txt"));
    }

    #[test]
    fn test_marker_path_appends_suffix() {
        let paths = ChannelPaths::in_dir("/tmp/x");
        assert_eq!(paths.marker(), PathBuf::from("/tmp/x/fusion_response.txt.done"));
    }

    #[test]
    fn test_completion_mode_serde() {
        let mode: CompletionMode = serde_yaml::from_str("marker").unwrap();
        assert_eq!(mode, CompletionMode::Marker);
        assert_eq!(serde_yaml::to_string(&CompletionMode::Settle).unwrap().trim(), "settle");
    }
}

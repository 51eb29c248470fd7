//! Dispatcher configuration

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Dispatcher configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Deepest allowed nesting of `execute_macro`
    #[serde(rename = "max-macro-depth", default = "default_max_macro_depth")]
    pub max_macro_depth: usize,

    /// Requests that may wait behind the one in flight
    #[serde(rename = "queue-capacity", default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_max_macro_depth() -> usize {
    10
}

fn default_queue_capacity() -> usize {
    64
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        debug!("DispatcherConfig::default: called");
        Self {
            max_macro_depth: default_max_macro_depth(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

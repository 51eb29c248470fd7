//! Dispatch error types

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Coarse classification callers can match on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    WriteFailure,
    ResponseTimeout,
    MalformedResponse,
    RemoteExecutionError,
    MacroDepthExceeded,
    InvalidRequest,
    Cancelled,
    DispatchFailure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::WriteFailure => "write_failure",
            ErrorKind::ResponseTimeout => "response_timeout",
            ErrorKind::MalformedResponse => "malformed_response",
            ErrorKind::RemoteExecutionError => "remote_execution_error",
            ErrorKind::MacroDepthExceeded => "macro_depth_exceeded",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::DispatchFailure => "dispatch_failure",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while dispatching a command to the host
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Failed to write command file {} after {attempts} attempts: {source}", .path.display())]
    WriteFailure {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("Timeout waiting for host response ({}ms)", .elapsed.as_millis())]
    ResponseTimeout { elapsed: Duration },

    #[error("Received malformed response from host ({reason}): {raw}")]
    MalformedResponse { reason: String, raw: String },

    #[error("{message}")]
    RemoteExecution { message: String, traceback: Option<String> },

    #[error("Macro nesting rejected at depth {depth} (max {max}): {reason}")]
    MacroDepthExceeded { depth: usize, max: usize, reason: String },

    #[error("Macro step {step} ('{tool_name}') failed: {source}")]
    MacroStepFailed {
        step: usize,
        tool_name: String,
        #[source]
        source: Box<DispatchError>,
    },

    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Dispatch cancelled")]
    Cancelled,

    #[error("Dispatcher channel closed")]
    ChannelClosed,
}

impl DispatchError {
    /// The kind callers should branch on; macro step failures report the step's kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::WriteFailure { .. } => ErrorKind::WriteFailure,
            DispatchError::ResponseTimeout { .. } => ErrorKind::ResponseTimeout,
            DispatchError::MalformedResponse { .. } => ErrorKind::MalformedResponse,
            DispatchError::RemoteExecution { .. } => ErrorKind::RemoteExecutionError,
            DispatchError::MacroDepthExceeded { .. } => ErrorKind::MacroDepthExceeded,
            DispatchError::MacroStepFailed { source, .. } => source.kind(),
            DispatchError::UnknownTool { .. } | DispatchError::InvalidArguments(_) => ErrorKind::InvalidRequest,
            DispatchError::Cancelled => ErrorKind::Cancelled,
            DispatchError::ChannelClosed => ErrorKind::DispatchFailure,
        }
    }

    /// The innermost error, unwrapping macro step failures
    pub fn root(&self) -> &DispatchError {
        match self {
            DispatchError::MacroStepFailed { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.kind() == ErrorKind::ResponseTimeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_names_elapsed() {
        let err = DispatchError::ResponseTimeout {
            elapsed: Duration::from_millis(60_000),
        };
        assert!(err.to_string().contains("60000ms"));
        assert!(err.is_timeout());
    }

    #[test]
    fn test_write_failure_message() {
        let err = DispatchError::WriteFailure {
            path: PathBuf::from("/tmp/cmd.txt"),
            attempts: 3,
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let msg = err.to_string();
        assert!(msg.contains("/tmp/cmd.txt"));
        assert!(msg.contains("3 attempts"));
        assert!(msg.contains("denied"));
        assert_eq!(err.kind(), ErrorKind::WriteFailure);
    }

    #[test]
    fn test_macro_step_failure_reports_inner_kind() {
        let err = DispatchError::MacroStepFailed {
            step: 2,
            tool_name: "create_box".to_string(),
            source: Box::new(DispatchError::RemoteExecution {
                message: "boom".to_string(),
                traceback: None,
            }),
        };
        assert_eq!(err.kind(), ErrorKind::RemoteExecutionError);
        assert!(err.to_string().contains("boom"));
        assert!(matches!(err.root(), DispatchError::RemoteExecution { .. }));
    }

    #[test]
    fn test_kind_strings() {
        assert_eq!(ErrorKind::MacroDepthExceeded.to_string(), "macro_depth_exceeded");
        assert_eq!(DispatchError::ChannelClosed.kind(), ErrorKind::DispatchFailure);
        assert_eq!(
            DispatchError::UnknownTool { name: "x".into() }.kind(),
            ErrorKind::InvalidRequest
        );
    }
}

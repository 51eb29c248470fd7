//! Wire types for the command and response files
//!
//! The command file carries a pretty-printed JSON object; the host answers in
//! the response file. Response content is untrusted: the shape is checked
//! before any optional field is read.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::dispatch::DispatchError;

/// One tool invocation as written to the command file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub command: String,
    pub parameters: Value,
    pub timestamp: String,
}

impl CommandEnvelope {
    /// Build an envelope stamped with the current UTC time
    ///
    /// Null or missing arguments become an empty object.
    pub fn new(command: impl Into<String>, parameters: Value) -> Self {
        let parameters = match parameters {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
        Self {
            command: command.into(),
            parameters,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    /// Canonical on-disk encoding
    pub fn to_pretty_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Outcome reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// The host's reply to the most recent command
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseEnvelope {
    pub status: ResponseStatus,
    pub result: Option<Value>,
    pub message: Option<String>,
    pub traceback: Option<String>,
}

impl ResponseEnvelope {
    /// Parse and validate raw response text
    ///
    /// Anything that is not a JSON object with a `"success"`/`"error"` string
    /// status is malformed. Optional fields of the wrong type are dropped.
    pub fn parse(raw: &str) -> Result<Self, DispatchError> {
        debug!(len = raw.len(), "ResponseEnvelope::parse: called");
        let value: Value = serde_json::from_str(raw).map_err(|e| malformed(format!("invalid JSON: {}", e), raw))?;

        let Value::Object(mut map) = value else {
            return Err(malformed("response is not a JSON object", raw));
        };

        let status = match map.get("status") {
            Some(Value::String(s)) if s == "success" => ResponseStatus::Success,
            Some(Value::String(s)) if s == "error" => ResponseStatus::Error,
            Some(Value::String(s)) => return Err(malformed(format!("unknown status '{}'", s), raw)),
            Some(_) => return Err(malformed("status is not a string", raw)),
            None => return Err(malformed("missing status", raw)),
        };

        let result = match map.remove("result") {
            None | Some(Value::Null) => None,
            Some(v) => Some(v),
        };

        Ok(Self {
            status,
            result,
            message: take_string(&mut map, "message"),
            traceback: take_string(&mut map, "traceback"),
        })
    }

    /// Convert an error status into a remote execution error
    pub fn into_result(self) -> Result<Value, DispatchError> {
        match self.status {
            ResponseStatus::Success => Ok(self.result.unwrap_or(Value::Null)),
            ResponseStatus::Error => Err(DispatchError::RemoteExecution {
                message: self.message.unwrap_or_else(|| "Unknown error".to_string()),
                traceback: self.traceback,
            }),
        }
    }
}

fn take_string(map: &mut Map<String, Value>, key: &str) -> Option<String> {
    match map.remove(key) {
        Some(Value::String(s)) => Some(s),
        _ => None,
    }
}

fn malformed(reason: impl Into<String>, raw: &str) -> DispatchError {
    DispatchError::MalformedResponse {
        reason: reason.into(),
        raw: raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_command_envelope_null_parameters_become_object() {
        let env = CommandEnvelope::new("create_box", Value::Null);
        assert_eq!(env.parameters, json!({}));
        assert!(env.timestamp.ends_with('Z'));
    }

    #[test]
    fn test_command_envelope_field_order_on_disk() {
        let env = CommandEnvelope::new("create_box", json!({"width": 10}));
        let text = env.to_pretty_json().unwrap();
        let command_at = text.find("\"command\"").unwrap();
        let params_at = text.find("\"parameters\"").unwrap();
        let ts_at = text.find("\"timestamp\"").unwrap();
        assert!(command_at < params_at && params_at < ts_at);
        assert!(text.contains("\n  \"command\": \"create_box\""));
    }

    #[test]
    fn test_parse_success_with_result() {
        let resp = ResponseEnvelope::parse(r#"{"status":"success","result":{"a":1}}"#).unwrap();
        assert_eq!(resp.status, ResponseStatus::Success);
        assert_eq!(resp.into_result().unwrap()["a"], json!(1));
    }

    #[test]
    fn test_parse_success_without_result() {
        let resp = ResponseEnvelope::parse(r#"{"status":"success"}"#).unwrap();
        assert_eq!(resp.into_result().unwrap(), Value::Null);
    }

    #[test]
    fn test_parse_error_carries_message_and_traceback() {
        let resp =
            ResponseEnvelope::parse(r#"{"status":"error","message":"boom","traceback":"line 1\nline 2"}"#).unwrap();
        match resp.into_result() {
            Err(DispatchError::RemoteExecution { message, traceback }) => {
                assert_eq!(message, "boom");
                assert_eq!(traceback.as_deref(), Some("line 1\nline 2"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_bad_shapes() {
        for raw in [
            "not json",
            "[1,2,3]",
            r#"{"result":1}"#,
            r#"{"status":1}"#,
            r#"{"status":"pending"}"#,
        ] {
            let err = ResponseEnvelope::parse(raw).unwrap_err();
            match err {
                DispatchError::MalformedResponse { raw: got, .. } => assert_eq!(got, raw),
                other => panic!("unexpected: {:?}", other),
            }
        }
    }

    #[test]
    fn test_parse_drops_mistyped_optional_fields() {
        let resp = ResponseEnvelope::parse(r#"{"status":"error","message":42,"traceback":null}"#).unwrap();
        assert_eq!(resp.message, None);
        assert_eq!(resp.traceback, None);
    }
}

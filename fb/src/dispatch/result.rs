//! Dispatch results and their text rendering

use serde::Serialize;
use serde_json::Value;

/// Outcome of a successful dispatch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchResult {
    pub name: String,
    pub result: Value,
}

impl DispatchResult {
    pub fn new(name: impl Into<String>, result: Value) -> Self {
        Self {
            name: name.into(),
            result,
        }
    }

    /// Human-readable summary returned to tool callers
    pub fn render_text(&self) -> String {
        let mut text = format!("Fusion 360 command '{}' executed successfully.", self.name);
        if let Some(body) = render_value(&self.result) {
            text.push_str("\n\n**Result:**\n```\n");
            text.push_str(&body);
            text.push_str("\n```");
        }
        text
    }
}

/// Text for an error the host reported
pub fn render_remote_error(name: &str, message: &str, traceback: Option<&str>) -> String {
    format!(
        "Fusion 360 Error for '{}': {}\n\nTraceback:\n{}",
        name,
        message,
        traceback.unwrap_or("N/A")
    )
}

/// Falsy results (null, false, 0, "") render nothing
fn render_value(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        Value::String(s) => Some(s.clone()),
        Value::Object(_) | Value::Array(_) => serde_json::to_string_pretty(value).ok(),
        other => Some(other.to_string()),
    }
}

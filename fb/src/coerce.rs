//! Best-effort numeric coercion for tool arguments
//!
//! Callers hand us whatever the client sent: numbers, numeric strings, empty
//! strings, nulls. These helpers never fail; anything unusable falls back to
//! the supplied default and everything else is clamped into range.

use serde_json::{Map, Value};
use tracing::debug;

/// Convert `value` to a finite `f64` clamped into `[min, max]`
///
/// Returns `default` when the value is absent, null, blank, not number-like,
/// or converts to a non-finite number.
pub fn to_number(value: Option<&Value>, default: f64, min: f64, max: f64) -> f64 {
    let parsed = match value {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::Bool(b)) => Some(if *b { 1.0 } else { 0.0 }),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() { None } else { trimmed.parse::<f64>().ok() }
        }
        Some(Value::Array(_)) | Some(Value::Object(_)) => None,
    };

    match parsed {
        Some(n) if n.is_finite() => n.max(min).min(max),
        _ => {
            debug!(?value, default, "to_number: unusable value, using default");
            default
        }
    }
}

/// Convert `value` to an integer, rounding half away from zero
pub fn to_integer(value: Option<&Value>, default: i64, min: i64, max: i64) -> i64 {
    let n = to_number(value, default as f64, min as f64, max as f64);
    // `as` saturates at the i64 bounds
    n.round() as i64
}

/// A numeric argument field with its fallback and bounds
#[derive(Debug, Clone, PartialEq)]
pub struct NumericField {
    pub name: String,
    pub integer: bool,
    pub default: f64,
    pub min: f64,
    pub max: f64,
}

impl NumericField {
    /// An unbounded floating-point field
    pub fn number(name: impl Into<String>, default: f64) -> Self {
        Self {
            name: name.into(),
            integer: false,
            default,
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
        }
    }

    /// An unbounded integer field
    pub fn integer(name: impl Into<String>, default: i64) -> Self {
        Self {
            name: name.into(),
            integer: true,
            default: default as f64,
            min: i64::MIN as f64,
            max: i64::MAX as f64,
        }
    }

    pub fn with_bounds(mut self, min: f64, max: f64) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    fn coerce(&self, value: Option<&Value>) -> Value {
        if self.integer {
            let min = self.min.max(i64::MIN as f64) as i64;
            let max = self.max.min(i64::MAX as f64) as i64;
            Value::from(to_integer(value, self.default.round() as i64, min, max))
        } else {
            let n = to_number(value, self.default, self.min, self.max);
            // keep `10` as `10` rather than rewriting it to `10.0`
            if let Some(Value::Number(original)) = value {
                if original.as_f64() == Some(n) {
                    return Value::Number(original.clone());
                }
            }
            serde_json::Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
        }
    }
}

/// Normalize the named numeric fields present in an argument object
///
/// Fields missing from `arguments` are left missing so the host applies its
/// own defaults. Non-object arguments are returned untouched.
pub fn coerce_number_fields(arguments: &mut Value, fields: &[NumericField]) -> usize {
    let Some(map) = arguments.as_object_mut() else {
        return 0;
    };
    coerce_in_map(map, fields)
}

fn coerce_in_map(map: &mut Map<String, Value>, fields: &[NumericField]) -> usize {
    let mut touched = 0;
    for field in fields {
        if let Some(slot) = map.get_mut(&field.name) {
            let coerced = field.coerce(Some(slot));
            if *slot != coerced {
                debug!(field = %field.name, from = %slot, to = %coerced, "coerce_number_fields: normalized");
                *slot = coerced;
                touched += 1;
            }
        }
    }
    touched
}

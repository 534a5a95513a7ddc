//! Payload normalization into [`CanonicalNotification`].
//!
//! Upstream payloads are schema-less: keys vary in casing and naming, fields go
//! missing, and values arrive with the wrong type. Extraction is total; every
//! field ends in a value or its fallback, and nothing here returns an error.

use serde_json::{Number, Value};
use shared::{
    domain::{CanonicalNotification, DEFAULT_TITLE},
    error::ErrorKind,
    protocol::{MESSAGE_KEYS, PRIORITY_KEYS, TITLE_KEYS},
};
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Number(Number),
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        FieldValue::Text(value.into())
    }

    pub fn into_text(self) -> String {
        match self {
            FieldValue::Text(text) => text,
            FieldValue::Number(number) => number.to_string(),
        }
    }

    /// Integer priority. Numeric text is parsed; fractions truncate toward
    /// zero; anything unparsable yields 0.
    pub fn to_priority(&self) -> i64 {
        match self {
            FieldValue::Number(number) => number_to_priority(number),
            FieldValue::Text(text) => {
                let text = text.trim();
                if let Ok(value) = text.parse::<i64>() {
                    return value;
                }
                match text.parse::<f64>() {
                    Ok(value) if value.is_finite() => value.trunc() as i64,
                    _ => 0,
                }
            }
        }
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Number(Number::from(value))
    }
}

fn number_to_priority(number: &Number) -> i64 {
    if let Some(value) = number.as_i64() {
        return value;
    }
    if number.as_u64().is_some() {
        return i64::MAX;
    }
    match number.as_f64() {
        // `as` saturates at the i64 bounds.
        Some(value) if value.is_finite() => value.trunc() as i64,
        _ => 0,
    }
}

/// Returns the first usable value among `candidate_keys`, or `fallback`.
///
/// The first key present with a non-null value wins outright. Blank text is
/// treated as missing and yields `fallback` without consulting later keys.
/// Booleans become `true`/`false`; arrays and objects become compact JSON.
pub fn extract_field(payload: &Value, candidate_keys: &[&str], fallback: FieldValue) -> FieldValue {
    let Value::Object(map) = payload else {
        return fallback;
    };

    let Some(value) = candidate_keys
        .iter()
        .find_map(|key| map.get(*key).filter(|value| !value.is_null()))
    else {
        return fallback;
    };

    match value {
        Value::String(text) if text.trim().is_empty() => fallback,
        Value::String(text) => FieldValue::Text(text.clone()),
        Value::Number(number) => FieldValue::Number(number.clone()),
        Value::Bool(flag) => FieldValue::Text(flag.to_string()),
        other => FieldValue::Text(other.to_string()),
    }
}

#[derive(Debug, Clone)]
pub struct PayloadNormalizer {
    fallback_title: String,
}

impl Default for PayloadNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_TITLE)
    }
}

impl PayloadNormalizer {
    pub fn new(fallback_title: impl Into<String>) -> Self {
        Self {
            fallback_title: fallback_title.into(),
        }
    }

    pub fn normalize(&self, payload: &Value) -> CanonicalNotification {
        if !payload.is_object() {
            debug!(
                kind = ?ErrorKind::MalformedPayload,
                payload_type = json_type_name(payload),
                "payload is not an object; using defaults"
            );
        }

        let title = extract_field(
            payload,
            TITLE_KEYS,
            FieldValue::text(self.fallback_title.as_str()),
        )
        .into_text();
        let message = extract_field(payload, MESSAGE_KEYS, FieldValue::text("")).into_text();
        let priority = extract_field(payload, PRIORITY_KEYS, FieldValue::from(0)).to_priority();

        CanonicalNotification {
            title,
            message,
            priority,
        }
    }
}

/// Unwraps an upstream frame of the form `{"messages": [first, ...]}` to its
/// first message. Any other frame passes through unchanged.
pub fn unwrap_envelope(frame: Value) -> Value {
    match frame.get("messages").and_then(Value::as_array) {
        Some(messages) if !messages.is_empty() => messages[0].clone(),
        _ => frame,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
#[path = "tests/normalizer_tests.rs"]
mod tests;

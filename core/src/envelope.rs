//! The `{code, message, data}` wrapper every API response uses.
//!
//! # Design
//! Parsing is deliberately tolerant: only bytes that are not JSON at all are
//! rejected. Absent fields take zero values (`code` 0, empty `message`, empty
//! object `data`), and scalars of the wrong type are coerced the way a
//! dynamic JSON accessor with defaults would coerce them. Keeping that
//! leniency inside this module means it can be tightened later without
//! touching the pipeline.

use serde_json::{Map, Value};

use crate::error::RequestError;

/// One decoded response envelope. `code == 0` is the only success value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub code: i64,
    pub message: String,
    pub data: Value,
}

impl Envelope {
    /// Parse raw response bytes. Fails with `RequestError::Decode` only when
    /// the bytes are not JSON.
    pub fn parse(bytes: &[u8]) -> Result<Self, RequestError> {
        let root: Value = serde_json::from_slice(bytes).map_err(|e| {
            tracing::warn!(error = %e, "decode failure: response body is not JSON");
            RequestError::Decode
        })?;
        Ok(Self::from_value(root))
    }

    /// Extract the envelope fields from an already-parsed document. A root
    /// that is not an object behaves as if every field were absent.
    pub fn from_value(root: Value) -> Self {
        let code = root.get("code").map(int_value).unwrap_or(0);
        let message = root.get("message").map(string_value).unwrap_or_default();
        let data = match root {
            Value::Object(mut fields) => fields.remove("data"),
            _ => None,
        }
        .unwrap_or_else(|| Value::Object(Map::new()));
        Self {
            code,
            message,
            data,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == 0
    }
}

fn int_value(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        Value::Bool(b) => i64::from(*b),
        _ => 0,
    }
}

fn string_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

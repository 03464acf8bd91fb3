//! Typed decoding of the envelope's `data` payload.
//!
//! # Design
//! Decoding is plain `serde`: every required field of `T` must be present
//! with a compatible type, unknown fields are ignored, and `Option` or
//! `#[serde(default)]` fields fall back to their default. The payload is
//! re-encoded to canonical JSON bytes first so the typed layer sees exactly
//! what a direct decode of `data` would see.
//!
//! `DecodeOptions` is the optional decoder configuration a caller can pass
//! per request. Its only knob today is the key strategy.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::RequestError;

/// How object keys in the payload are matched against field names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KeyStrategy {
    /// Keys are used exactly as received.
    #[default]
    UseDefaultKeys,
    /// `snake_case` keys are rewritten to `camelCase` before decoding.
    ConvertFromSnakeCase,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeOptions {
    pub key_strategy: KeyStrategy,
}

impl DecodeOptions {
    pub fn snake_case() -> Self {
        Self {
            key_strategy: KeyStrategy::ConvertFromSnakeCase,
        }
    }
}

/// Decode `data` into `T`. Any mismatch yields `RequestError::Decode`; the
/// serde error itself is only logged.
pub fn decode<T: DeserializeOwned>(data: Value, options: &DecodeOptions) -> Result<T, RequestError> {
    let data = match options.key_strategy {
        KeyStrategy::UseDefaultKeys => data,
        KeyStrategy::ConvertFromSnakeCase => convert_keys(data),
    };
    let raw = serde_json::to_vec(&data).map_err(|e| {
        tracing::warn!(error = %e, "decode failure: payload could not be re-encoded");
        RequestError::Decode
    })?;
    serde_json::from_slice(&raw).map_err(|e| {
        tracing::warn!(
            error = %e,
            target_type = std::any::type_name::<T>(),
            "decode failure"
        );
        RequestError::Decode
    })
}

fn convert_keys(value: Value) -> Value {
    match value {
        Value::Object(fields) => Value::Object(
            fields
                .into_iter()
                .map(|(key, value)| (snake_to_camel(&key), convert_keys(value)))
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(convert_keys).collect()),
        other => other,
    }
}

/// `up_mid` -> `upMid`. Leading and trailing underscores are preserved.
fn snake_to_camel(key: &str) -> String {
    let trimmed = key.trim_matches('_');
    if trimmed.is_empty() || !trimmed.contains('_') {
        return key.to_string();
    }
    let leading = &key[..key.len() - key.trim_start_matches('_').len()];
    let trailing = &key[key.trim_end_matches('_').len()..];

    let mut out = String::with_capacity(key.len());
    out.push_str(leading);
    for (i, part) in trimmed.split('_').filter(|p| !p.is_empty()).enumerate() {
        if i == 0 {
            out.push_str(part);
            continue;
        }
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(&chars.as_str().to_lowercase());
        }
    }
    out.push_str(trailing);
    out
}

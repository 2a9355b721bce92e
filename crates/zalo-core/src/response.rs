//! Response envelopes and the double-decoding contract.
//!
//! Every service response is an outer JSON envelope
//! `{"error_code", "error_message", "data"}` whose `data` is an encoded
//! payload. That payload decodes to an inner envelope of the same shape,
//! whose `data` may in turn be JSON serialized into a string. All of that
//! is unwrapped here and nowhere else.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::envelope::{self, SecretKey};
use crate::error::{ZaloError, ZaloResult};
use crate::protocol::MISSING_DATA_CODE;

/// Maximum number of times a JSON-in-a-string value is re-parsed.
pub const MAX_UNWRAP_DEPTH: usize = 2;

/// The outer JSON envelope of every response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub error_code: i64,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

impl ResponseEnvelope {
    /// Parse a response body. A body that is not an envelope is a transport
    /// failure, not a protocol one.
    pub fn parse(body: &str) -> ZaloResult<Self> {
        serde_json::from_str(body)
            .map_err(|e| ZaloError::Transport(format!("malformed response body: {e}")))
    }

    pub fn is_success(&self) -> bool {
        self.error_code == 0
    }

    /// Human-readable failure reason: `error_message`, else the diagnostic
    /// `data`, else a placeholder.
    pub fn diagnostic(&self) -> String {
        diagnostic(self.error_message.as_deref(), self.data.as_ref())
    }
}

/// Unwrap a response envelope into its decoded data.
///
/// - outer `error_code != 0` → [`ZaloError::Protocol`] with that code
/// - outer success without data → protocol error [`MISSING_DATA_CODE`]
/// - `data` that does not decode under `secret` → [`ZaloError::Decode`]
/// - inner `error_code != 0` → [`ZaloError::Protocol`] with the inner code
///
/// On success returns the inner `data` (or the whole inner map when it has
/// none), with JSON-in-a-string re-parsed up to [`MAX_UNWRAP_DEPTH`] times.
pub fn unwrap_envelope(envelope: ResponseEnvelope, secret: &SecretKey) -> ZaloResult<Value> {
    if !envelope.is_success() {
        return Err(ZaloError::protocol(envelope.error_code, envelope.diagnostic()));
    }

    let payload = match envelope.data {
        Some(Value::String(s)) if !s.is_empty() => s,
        Some(Value::Null) | None => {
            return Err(ZaloError::protocol(MISSING_DATA_CODE, "data is missing"))
        }
        Some(Value::String(_)) => {
            return Err(ZaloError::protocol(MISSING_DATA_CODE, "data is empty"))
        }
        Some(_) => {
            return Err(ZaloError::Decode(
                "expected an encoded string in data".into(),
            ))
        }
    };

    let mut inner = envelope::decode(&payload, secret)?;

    let inner_code = inner
        .get("error_code")
        .and_then(Value::as_i64)
        .unwrap_or(0);
    if inner_code != 0 {
        let message = diagnostic(
            inner.get("error_message").and_then(Value::as_str),
            inner.get("data"),
        );
        return Err(ZaloError::protocol(inner_code, message));
    }

    let value = match inner.remove("data") {
        Some(data) if !data.is_null() => data,
        _ => Value::Object(inner),
    };

    Ok(reparse_json_strings(value, MAX_UNWRAP_DEPTH))
}

/// Re-parse a value while it is a string holding a JSON container or a
/// quoted string, at most `depth` times. Plain text is left alone, so ids
/// such as `"0"` stay strings.
pub fn reparse_json_strings(mut value: Value, depth: usize) -> Value {
    for _ in 0..depth {
        let parsed = match &value {
            Value::String(s) if looks_like_json(s) => serde_json::from_str::<Value>(s).ok(),
            _ => None,
        };
        match parsed {
            Some(next) => value = next,
            None => break,
        }
    }
    value
}

fn looks_like_json(s: &str) -> bool {
    matches!(s.trim_start().chars().next(), Some('{' | '[' | '"'))
}

fn diagnostic(message: Option<&str>, data: Option<&Value>) -> String {
    if let Some(m) = message.filter(|m| !m.is_empty()) {
        return m.to_string();
    }
    match data {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Null) | None => "unknown error".to_string(),
        Some(other) => other.to_string(),
    }
}

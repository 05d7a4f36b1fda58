//! Response envelope handling.
//!
//! The backend answers either with the raw payload or with
//! `{ "success": true, "data": ... }`. Envelopes may be nested; they are
//! unwrapped until the payload is reached. A body shaped like the error
//! contract is an error even when it arrived with a 2xx status.

use serde_json::Value;

use crate::error::ErrorBody;

/// Status assigned to error-shaped bodies that carry no `statusCode`.
const DEFAULT_PROMOTED_STATUS: u16 = 400;

/// Unwrap `{ success, data }` envelopes.
///
/// # Errors
///
/// Returns the decoded error body if the payload, or any envelope level, is
/// error-shaped.
pub fn unwrap_envelope(mut value: Value) -> Result<Value, ErrorBody> {
    loop {
        if let Some(status) = error_status(&value) {
            return Err(ErrorBody::from_value(status, value));
        }
        match value {
            Value::Object(mut map)
                if map.get("success") == Some(&Value::Bool(true)) && map.contains_key("data") =>
            {
                value = map.remove("data").unwrap_or(Value::Null);
            }
            other => return Ok(other),
        }
    }
}

/// Status of an error-shaped body, or `None` for a success payload.
///
/// Error-shaped means `success: false`, or a numeric `statusCode` of at
/// least 400 accompanied by a `message`.
#[must_use]
pub fn error_status(value: &Value) -> Option<u16> {
    let Value::Object(map) = value else {
        return None;
    };
    let status_code = map
        .get("statusCode")
        .and_then(Value::as_u64)
        .and_then(|s| u16::try_from(s).ok());

    if map.get("success") == Some(&Value::Bool(false)) {
        return Some(status_code.filter(|s| *s >= 400).unwrap_or(DEFAULT_PROMOTED_STATUS));
    }
    match status_code {
        Some(status) if status >= 400 && map.contains_key("message") => Some(status),
        _ => None,
    }
}

/// Parse a response body into JSON.
///
/// Empty bodies become `null`; non-JSON text is kept as a string.
#[must_use]
pub fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

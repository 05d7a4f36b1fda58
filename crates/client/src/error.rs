//! Normalised request errors.
//!
//! Every failure surfaced by the executor is an [`ApiError`]. Variants carry
//! the decoded error body where the backend sent one, so callers can show
//! field-level validation messages.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use shopfront_core::IdentityKind;

/// Error message as sent by the backend: a single string or one entry per
/// invalid field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorMessage {
    /// One human-readable message.
    Single(String),
    /// Per-field messages, kept as a collection.
    Fields(Vec<String>),
}

impl ErrorMessage {
    /// All messages as a list.
    #[must_use]
    pub fn as_list(&self) -> Vec<&str> {
        match self {
            Self::Single(s) => vec![s.as_str()],
            Self::Fields(fields) => fields.iter().map(String::as_str).collect(),
        }
    }
}

impl fmt::Display for ErrorMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(s) => f.write_str(s),
            Self::Fields(fields) => f.write_str(&fields.join("; ")),
        }
    }
}

/// Decoded error response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorBody {
    /// HTTP status, or the body's `statusCode` for promoted 2xx errors.
    pub status: u16,
    /// Backend message, if any.
    pub message: Option<ErrorMessage>,
    /// Raw response body.
    pub data: Option<Value>,
}

impl ErrorBody {
    /// Body with only a status.
    #[must_use]
    pub const fn status_only(status: u16) -> Self {
        Self {
            status,
            message: None,
            data: None,
        }
    }

    /// Decode the error contract `{ statusCode, message, ... }` from a body.
    ///
    /// Unknown shapes keep the raw body in `data` and no message.
    #[must_use]
    pub fn from_value(status: u16, body: Value) -> Self {
        let message = body
            .get("message")
            .or_else(|| body.get("error"))
            .and_then(|m| serde_json::from_value::<ErrorMessage>(m.clone()).ok());
        let data = (!body.is_null()).then_some(body);
        Self {
            status,
            message,
            data,
        }
    }

    /// Decode from a raw response body, tolerating non-JSON text.
    #[must_use]
    pub fn from_text(status: u16, text: &str) -> Self {
        if text.trim().is_empty() {
            return Self::status_only(status);
        }
        match serde_json::from_str::<Value>(text) {
            Ok(value) => Self::from_value(status, value),
            Err(_) => Self {
                status,
                message: Some(ErrorMessage::Single(text.trim().to_string())),
                data: None,
            },
        }
    }
}

impl fmt::Display for ErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{} ({})", message, self.status),
            None => write!(f, "status {}", self.status),
        }
    }
}

/// Errors returned by the request executor.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// No response was received.
    #[error("Network error: {0}")]
    Network(String),

    /// The request did not complete within its timeout.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Authentication is required and no usable credential exists.
    #[error("Authentication required: {0}")]
    AuthRequired(ErrorBody),

    /// The session expired and could not be refreshed.
    #[error("Session expired for {identity} identity: {body}")]
    AuthExpired {
        /// Identity whose session expired.
        identity: IdentityKind,
        /// Decoded 401 body.
        body: ErrorBody,
    },

    /// The backend rejected the credential outright.
    #[error("Authentication failed for {identity} identity: {body}")]
    AuthFailed {
        /// Identity that was rejected.
        identity: IdentityKind,
        /// Decoded 401 body.
        body: ErrorBody,
    },

    /// The identity lacks permission.
    #[error("Forbidden: {0}")]
    Forbidden(ErrorBody),

    /// The resource does not exist.
    #[error("Not found: {0}")]
    NotFound(ErrorBody),

    /// The request was rejected as invalid.
    #[error("Validation error: {0}")]
    Validation(ErrorBody),

    /// Too many requests.
    #[error("Rate limited: {body}")]
    RateLimited {
        /// Decoded 429 body.
        body: ErrorBody,
        /// Parsed `Retry-After` header.
        retry_after: Option<Duration>,
    },

    /// The backend failed.
    #[error("Server error: {0}")]
    Server(ErrorBody),

    /// A refreshed credential was rejected again; the session was cleared.
    #[error("Session invalid: refreshed credential was rejected again")]
    SessionInvalidLoop,

    /// A successful response could not be decoded into the requested type.
    #[error("Decode error: {message}")]
    Decode {
        /// HTTP status of the undecodable response.
        status: u16,
        /// Decoder message.
        message: String,
    },
}

impl ApiError {
    /// Classify a non-2xx response (other than 401, which depends on the
    /// request's identity).
    #[must_use]
    pub fn from_status(body: ErrorBody, retry_after: Option<Duration>) -> Self {
        match body.status {
            403 => Self::Forbidden(body),
            404 => Self::NotFound(body),
            429 => Self::RateLimited { body, retry_after },
            s if s >= 500 => Self::Server(body),
            _ => Self::Validation(body),
        }
    }

    /// HTTP status. `0` when no response was received.
    #[must_use]
    pub const fn status(&self) -> u16 {
        match self {
            Self::Network(_) | Self::Timeout(_) => 0,
            Self::SessionInvalidLoop => 401,
            Self::Decode { status, .. } => *status,
            Self::AuthRequired(body)
            | Self::AuthExpired { body, .. }
            | Self::AuthFailed { body, .. }
            | Self::Forbidden(body)
            | Self::NotFound(body)
            | Self::Validation(body)
            | Self::RateLimited { body, .. }
            | Self::Server(body) => body.status,
        }
    }

    /// Backend message, or a description of the failure.
    #[must_use]
    pub fn message(&self) -> String {
        self.body()
            .and_then(|b| b.message.as_ref())
            .map_or_else(|| self.to_string(), ToString::to_string)
    }

    /// Raw error body, if the backend sent one.
    #[must_use]
    pub fn data(&self) -> Option<&Value> {
        self.body().and_then(|b| b.data.as_ref())
    }

    /// Decoded error body, if any.
    #[must_use]
    pub const fn body(&self) -> Option<&ErrorBody> {
        match self {
            Self::Network(_) | Self::Timeout(_) | Self::SessionInvalidLoop | Self::Decode { .. } => {
                None
            }
            Self::AuthRequired(body)
            | Self::AuthExpired { body, .. }
            | Self::AuthFailed { body, .. }
            | Self::Forbidden(body)
            | Self::NotFound(body)
            | Self::Validation(body)
            | Self::RateLimited { body, .. }
            | Self::Server(body) => Some(body),
        }
    }

    /// Whether this error concerns authentication (any 401 outcome).
    #[must_use]
    pub const fn is_auth(&self) -> bool {
        matches!(
            self,
            Self::AuthRequired(_)
                | Self::AuthExpired { .. }
                | Self::AuthFailed { .. }
                | Self::SessionInvalidLoop
        )
    }
}

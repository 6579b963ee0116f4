//! Typed error taxonomy for the resource client.

use serde_json::Value;
use thiserror::Error;

/// Errors surfaced by any call against the remote resource store.
///
/// `Unauthorized` is kept distinct from every other non-success response
/// because it triggers forced session teardown upstream.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ApiError {
    /// Transport failure or timeout: no usable response was received.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The credential was missing or rejected (HTTP 401).
    #[error("credential missing or rejected")]
    Unauthorized,

    /// The referenced resource does not exist (HTTP 404, or local lookup).
    #[error("resource not found")]
    NotFound,

    /// The server rejected the input, optionally naming the offending field.
    #[error("{message}")]
    Validation {
        field: Option<String>,
        message: String,
    },

    /// Any other non-success response.
    #[error("server error {status}: {}", .message.as_deref().unwrap_or("no detail"))]
    Server {
        status: u16,
        message: Option<String>,
    },
}

impl ApiError {
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }
}

/// Map a non-2xx status and its raw body to a typed error.
///
/// 400 bodies are parsed in the two shapes the API emits: a field map
/// (`{"username": ["already taken"]}`) or a plain `{"detail": "..."}`. Field
/// messages pass through verbatim so forms can show them inline.
#[must_use]
pub fn error_for_status(status: u16, body: &str) -> ApiError {
    match status {
        401 => ApiError::Unauthorized,
        404 => ApiError::NotFound,
        400 => {
            let (field, message) = parse_validation_body(body);
            ApiError::Validation {
                field,
                message: message.unwrap_or_else(|| "invalid request".to_string()),
            }
        }
        _ => ApiError::Server {
            status,
            message: parse_detail(body),
        },
    }
}

fn parse_detail(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value.get("detail")?.as_str().map(str::to_string)
}

fn parse_validation_body(body: &str) -> (Option<String>, Option<String>) {
    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) else {
        return (None, None);
    };

    if let Some(detail) = map.get("detail").and_then(Value::as_str) {
        return (None, Some(detail.to_string()));
    }

    // Field map shape: take the first field with a usable message.
    for (field, value) in &map {
        let message = match value {
            Value::String(s) => Some(s.clone()),
            Value::Array(items) => items.first().and_then(Value::as_str).map(str::to_string),
            _ => None,
        };
        if let Some(message) = message {
            return (Some(field.clone()), Some(message));
        }
    }

    (None, None)
}

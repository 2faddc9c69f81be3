//! Error types for talking to the OptoCom backend.
//!
//! CSV problems are not errors here: they are reported as data through
//! [`crate::validator::ValidationReport`]. This module only covers transport,
//! backend and auth failures, plus local token storage.

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

/// Errors returned by [`crate::api::OptoComClient`] and the session layer.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The bearer token is missing, expired or was rejected with a 401.
    #[error("Not authenticated: token missing, expired or rejected")]
    Unauthorized,

    /// The backend answered with a non-success status.
    #[error("Backend returned {status}: {}", .detail.as_deref().unwrap_or("no detail"))]
    Backend {
        status: StatusCode,
        detail: Option<String>,
    },

    /// The request never produced a response (DNS, connect, timeout, ...).
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response body did not match the expected JSON shape.
    #[error("Failed to decode backend response: {0}")]
    Decode(String),

    /// Reading or writing the local token file failed.
    #[error("Token storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// The caller supplied something unusable (bad base URL, bad file name).
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl ClientError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ClientError::Unauthorized)
    }

    /// A 404 on a per-date listing means "no records", not a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::Backend { status, .. } if *status == StatusCode::NOT_FOUND)
    }

    /// Message to show the user: the backend's `detail` when it sent one,
    /// otherwise the caller's fallback.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            ClientError::Backend {
                detail: Some(detail),
                ..
            } => detail.clone(),
            _ => fallback.to_string(),
        }
    }
}

/// Pull a human-readable `detail` out of an error body.
///
/// The backend sends either `{"detail": "text"}` or a list of field errors
/// `{"detail": [{"loc": ["body", "age"], "msg": "..."}]}`. Lists are
/// rendered as `body.age: msg; ...`.
pub fn extract_detail(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    match value.get("detail")? {
        Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
        Value::Array(entries) => {
            let parts: Vec<String> = entries.iter().filter_map(field_error).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join("; "))
            }
        }
        _ => None,
    }
}

fn field_error(entry: &Value) -> Option<String> {
    let msg = entry.get("msg")?.as_str()?;
    let loc = entry
        .get("loc")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .map(|p| match p {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(".")
        })
        .unwrap_or_default();

    if loc.is_empty() {
        Some(msg.to_string())
    } else {
        Some(format!("{}: {}", loc, msg))
    }
}

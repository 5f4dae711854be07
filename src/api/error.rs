//! Error taxonomy for calls against the school backend.

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(
        "Cannot connect to backend server at {base_url}. \
         Check that the backend is running and that the API URL is correct."
    )]
    Unreachable {
        base_url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Session expired. Please login again.")]
    SessionExpired,

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("{message}")]
    Server { status: u16, message: String },

    #[error("Unexpected response from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Server { status, .. } => Some(*status),
            ApiError::SessionExpired | ApiError::InvalidCredentials(_) => {
                Some(StatusCode::UNAUTHORIZED.as_u16())
            }
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND.as_u16())
    }

    /// Stable label for log fields.
    pub fn label(&self) -> &'static str {
        match self {
            ApiError::Unreachable { .. } => "unreachable",
            ApiError::SessionExpired => "session_expired",
            ApiError::InvalidCredentials(_) => "invalid_credentials",
            ApiError::Server { .. } => "server",
            ApiError::Decode { .. } => "decode",
            ApiError::Transport(_) => "transport",
            ApiError::Config(_) => "config",
        }
    }
}

/// Pulls the human message out of an error body: `message`, `error`, or
/// `error.message`, falling back to the status code.
pub fn extract_message(status: StatusCode, body: &str) -> String {
    let fallback = || format!("Request failed with status {}", status.as_u16());
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return fallback();
    };

    value
        .get("message")
        .and_then(|m| m.as_str())
        .or_else(|| value.get("error").and_then(|e| e.as_str()))
        .or_else(|| {
            value
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
        })
        .filter(|m| !m.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(fallback)
}

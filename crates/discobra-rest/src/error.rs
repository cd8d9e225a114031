//! REST error types

use discobra_core::ModelError;

/// REST call errors
#[derive(Debug, thiserror::Error)]
pub enum RestError {
    /// The API answered with a status the method does not accept
    #[error("API error {status}: {message}")]
    Api {
        status: u16,
        /// Discord JSON error code, when the body carried one
        code: Option<u64>,
        message: String,
    },

    /// Transport-level failure (connect, TLS, timeout)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The body was not valid JSON
    #[error("Invalid response body: {0}")]
    InvalidBody(#[source] serde_json::Error),

    /// The body did not match the expected entity schema
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("Invalid token: {0}")]
    InvalidToken(String),
}

/// Result type alias for REST calls
pub type RestResult<T> = Result<T, RestError>;

impl RestError {
    /// Build an `Api` error from a rejected status and its body
    pub fn from_response(status: u16, body: &serde_json::Value) -> Self {
        let message = body
            .get("message")
            .and_then(serde_json::Value::as_str)
            .map_or_else(|| format!("unexpected status {status}"), str::to_string);
        let code = body.get("code").and_then(serde_json::Value::as_u64);
        Self::Api {
            status,
            code,
            message,
        }
    }

    /// Get the HTTP status for API errors
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        self.status() == Some(429)
    }

    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status().is_some_and(|s| s >= 500)
    }
}

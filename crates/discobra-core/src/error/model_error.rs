//! Model errors - failures turning raw payloads into entity schemas

use thiserror::Error;

/// Domain layer errors
#[derive(Debug, Error)]
pub enum ModelError {
    /// Payload did not match the entity schema
    #[error("Failed to decode {kind}: {source}")]
    Decode {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// Payload was absent where an entity was required
    #[error("Missing {kind} payload")]
    MissingPayload { kind: &'static str },
}

impl ModelError {
    /// Get the entity kind that failed to decode
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Decode { kind, .. } | Self::MissingPayload { kind } => kind,
        }
    }
}

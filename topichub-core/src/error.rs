//! Error types for registry operations

use thiserror::Error;

/// Registry error types
#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown identity: {0}")]
    UnknownIdentity(String),

    #[error("identity {identity} is already subscribed to topic {topic}")]
    AlreadySubscribed { identity: String, topic: String },

    #[error("identity {identity} has no subscription to topic {topic}")]
    NotSubscribed { identity: String, topic: String },

    #[error("failed to create channel for topic {topic}: {reason}")]
    ChannelCreateFailed { topic: String, reason: String },

    /// Non-fatal: bookkeeping removal proceeds even when the provider-side
    /// delete fails.
    #[error("failed to delete channel {reference}: {reason}")]
    ChannelDeleteFailed { reference: String, reason: String },

    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("failed to decode replication payload: {0}")]
    DecodeFailed(String),

    #[error("identity generation exhausted after {attempts} attempts")]
    IdentityGenerationExhausted { attempts: u32 },

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Wrap a provider-level transient failure.
    pub fn provider(err: impl std::fmt::Display) -> Self {
        Self::ProviderUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::DecodeFailed(err.to_string())
    }
}

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, Error>;

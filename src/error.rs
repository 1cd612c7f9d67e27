//! Host agent discovery error types.
//!
//! # Error Classification
//!
//! None of these errors are fatal to the hosting process:
//!
//! - **Transient unreachability**: `Network`, `Protocol`, `UnexpectedIdentity`
//!   are retried by the state machine (unbounded for host lookup, bounded for
//!   announce and readiness)
//! - **Environment unavailability**: `Gateway`, `Introspection` degrade to
//!   best-available data or a rescheduled lookup
//! - **Setup**: `Config` is only surfaced while loading configuration

use thiserror::Error;

/// Discovery and handshake errors.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// Transport call failed before a response arrived.
    #[error("Network error: {0}")]
    Network(String),

    /// Host agent answered, but not the way the protocol expects.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A service answered on the candidate host without the agent identity marker.
    #[error("Unexpected identity from {host}: {found:?}")]
    UnexpectedIdentity {
        /// Host that was probed.
        host: String,
        /// Identity header value, if any was present.
        found: Option<String>,
    },

    /// Default gateway could not be resolved.
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// Kernel process metadata was missing or malformed.
    #[error("Introspection error: {0}")]
    Introspection(String),

    /// The discovery task is no longer running.
    #[error("Discovery stopped")]
    Stopped,

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for discovery operations
pub type Result<T> = std::result::Result<T, DiscoveryError>;

impl From<reqwest::Error> for DiscoveryError {
    fn from(err: reqwest::Error) -> Self {
        DiscoveryError::Network(err.to_string())
    }
}

impl From<toml::de::Error> for DiscoveryError {
    fn from(err: toml::de::Error) -> Self {
        DiscoveryError::Config(err.to_string())
    }
}

//! Error types for the sync engine
//!
//! This module defines all error types used throughout the crate.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for sync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the sync engine
#[derive(Error, Debug)]
pub enum Error {
    /// A client name could not be turned into a DNS label
    #[error("Invalid hostname: {0}")]
    InvalidHostname(String),

    /// Rate limiting or temporary unavailability of an upstream API
    ///
    /// This is the only variant retried by the retry decorators.
    #[error("Transient upstream error ({origin}): {message}")]
    TransientUpstream {
        /// Collaborator that produced the error
        origin: String,
        /// Error message
        message: String,
        /// Server-provided hint for when to retry
        retry_after: Option<Duration>,
    },

    /// Permanent upstream failure (bad request, unexpected payload, ...)
    #[error("Upstream error ({origin}): {message}")]
    Upstream {
        /// Collaborator that produced the error
        origin: String,
        /// Error message
        message: String,
    },

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// A single add/delete against the DNS record store failed
    #[error("Mutation of {domain} failed: {message}")]
    Mutation {
        /// Domain the mutation targeted
        domain: String,
        /// Error message
        message: String,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A sync pass is already running
    #[error("A sync pass is already in progress")]
    SyncInProgress,

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an invalid hostname error
    pub fn invalid_hostname(msg: impl Into<String>) -> Self {
        Self::InvalidHostname(msg.into())
    }

    /// Create a transient upstream error without a retry hint
    pub fn transient(origin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TransientUpstream {
            origin: origin.into(),
            message: message.into(),
            retry_after: None,
        }
    }

    /// Create a transient upstream error carrying a `Retry-After` hint
    pub fn rate_limited(
        origin: impl Into<String>,
        message: impl Into<String>,
        retry_after: Option<Duration>,
    ) -> Self {
        Self::TransientUpstream {
            origin: origin.into(),
            message: message.into(),
            retry_after,
        }
    }

    /// Create a permanent upstream error
    pub fn upstream(origin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Upstream {
            origin: origin.into(),
            message: message.into(),
        }
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a mutation error
    pub fn mutation(domain: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Mutation {
            domain: domain.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Whether a retry of the same call may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientUpstream { .. })
    }

    /// Server-provided retry hint, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::TransientUpstream { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(Error::transient("meraki", "503").is_transient());
        assert!(
            Error::rate_limited("meraki", "429", Some(Duration::from_secs(2))).is_transient()
        );
        assert!(!Error::upstream("meraki", "400").is_transient());
        assert!(!Error::auth("bad key").is_transient());
        assert!(!Error::mutation("a.lan", "boom").is_transient());
    }

    #[test]
    fn retry_after_is_exposed_for_rate_limits() {
        let err = Error::rate_limited("meraki", "429", Some(Duration::from_secs(7)));
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
        assert_eq!(Error::transient("meraki", "502").retry_after(), None);
    }

    #[test]
    fn display_includes_origin() {
        let err = Error::upstream("pihole", "bad payload");
        assert_eq!(err.to_string(), "Upstream error (pihole): bad payload");
    }
}

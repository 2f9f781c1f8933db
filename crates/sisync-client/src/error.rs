//! SIS client error types.
//!
//! The variants follow the failure taxonomy of the sync path: auth failures
//! are recoverable per course, transport/protocol errors abort only the
//! in-flight fetch, and consistency errors guard against silently truncated
//! paginated datasets.

use thiserror::Error;

/// Error that can occur while talking to the SIS API.
#[derive(Debug, Error)]
pub enum SisError {
    /// No access token could be obtained, or the token endpoint rejected us.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The transport produced no usable response (network failure, empty body).
    #[error("transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The remote answered with a structured error or an unrecognisable body.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Pagination ended with a claimed total that does not match what we got.
    #[error("pagination returned {actual} records but the service reported {expected}")]
    Consistency { expected: usize, actual: usize },

    /// The client was constructed with unusable settings.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Persisted token state could not be read or written.
    #[error("token store error: {0}")]
    TokenStore(String),
}

impl SisError {
    /// Create a transport error without an underlying source.
    pub fn transport(message: impl Into<String>) -> Self {
        SisError::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Create a transport error preserving the underlying cause.
    pub fn transport_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        SisError::Transport {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Whether retrying the same call later could reasonably succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, SisError::Transport { .. })
    }
}

impl From<reqwest::Error> for SisError {
    fn from(e: reqwest::Error) -> Self {
        SisError::transport_with_source(format!("request failed: {e}"), e)
    }
}

/// Result type for SIS client operations.
pub type SisResult<T> = Result<T, SisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_are_transient() {
        assert!(SisError::transport("connection reset").is_transient());
        assert!(!SisError::Auth("bad client".into()).is_transient());
        assert!(!SisError::Consistency {
            expected: 10,
            actual: 9
        }
        .is_transient());
    }

    #[test]
    fn consistency_display_names_both_counts() {
        let err = SisError::Consistency {
            expected: 120,
            actual: 119,
        };
        let text = err.to_string();
        assert!(text.contains("120"));
        assert!(text.contains("119"));
    }
}

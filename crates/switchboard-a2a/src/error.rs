//! Error types for switchboard-a2a

use thiserror::Error;

/// Protocol client error type
#[derive(Debug, Error)]
pub enum Error {
    /// Could not reach the remote agent
    #[error("network error: {0}")]
    Network(String),

    /// Remote agent answered with a non-success HTTP status
    #[error("http status {status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body (truncated)
        message: String,
    },

    /// Payload could not be decoded
    #[error("malformed payload: {0}")]
    Malformed(String),

    /// Remote agent reported a JSON-RPC error
    #[error("remote error {code}: {message}")]
    Remote {
        /// JSON-RPC error code
        code: i64,
        /// Error message from the agent
        message: String,
    },

    /// Client could not be constructed
    #[error("client configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Whether opening the call again might succeed.
    ///
    /// Connection failures and 5xx/429 responses are transient; decoding
    /// errors and 4xx answers are not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Network(_) => true,
            Error::Status { status, .. } => *status == 429 || *status >= 500,
            Error::Malformed(_) | Error::Remote { .. } | Error::Configuration(_) => false,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Network(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Malformed(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::Network("refused".into()).is_retryable());
        assert!(Error::Status {
            status: 503,
            message: String::new()
        }
        .is_retryable());
        assert!(Error::Status {
            status: 429,
            message: String::new()
        }
        .is_retryable());
        assert!(!Error::Status {
            status: 404,
            message: String::new()
        }
        .is_retryable());
        assert!(!Error::Malformed("bad json".into()).is_retryable());
    }
}

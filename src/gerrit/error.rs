//! Gerrit REST errors.

use thiserror::Error;

use crate::retry::Retriable;

/// Errors talking to Gerrit.
#[derive(Debug, Error)]
pub enum GerritError {
    /// The request never produced a response (DNS, TLS, timeout, ...).
    #[error("Gerrit request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Gerrit answered with a non-success status.
    #[error("Gerrit returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body was not the JSON we expected.
    #[error("malformed Gerrit response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl Retriable for GerritError {
    /// Timeouts, refused connections, 429 and 5xx.
    fn is_transient(&self) -> bool {
        match self {
            GerritError::Http(e) => e.is_timeout() || e.is_connect(),
            GerritError::Status { status, .. } => *status == 429 || (500..600).contains(status),
            GerritError::Decode(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_transient() {
        let err = GerritError::Status {
            status: 503,
            body: "Service Unavailable".to_string(),
        };
        assert!(err.is_transient());
    }

    #[test]
    fn client_errors_are_permanent() {
        let err = GerritError::Status {
            status: 409,
            body: "change is closed".to_string(),
        };
        assert!(!err.is_transient());
        assert_eq!(err.to_string(), "Gerrit returned HTTP 409: change is closed");
    }
}

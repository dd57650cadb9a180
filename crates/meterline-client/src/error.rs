//! Client error types.

/// Errors that can occur when using the meterline client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// HTTP transport failed (connection, TLS, timeout). Always retryable.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server returned a non-success status.
    #[error("API error: HTTP {status}: {payload}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error payload: the JSON body if it parsed, else the raw text.
        payload: serde_json::Value,
    },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Local I/O error while preparing a request body.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid client configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Malformed caller input, rejected before enqueue.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The client was built with `send = false`; blocking calls have no
    /// response to return.
    #[error("sending is disabled for this client")]
    SendDisabled,
}

impl ClientError {
    /// Whether a delivery that failed with this error may be retried.
    ///
    /// Transport errors, HTTP 429, and HTTP 5xx are retryable; any other
    /// API status is fatal, as are local errors.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn api(status: u16) -> ClientError {
        ClientError::Api {
            status,
            payload: json!("boom"),
        }
    }

    #[test]
    fn server_errors_are_retryable() {
        assert!(api(500).is_retryable());
        assert!(api(503).is_retryable());
    }

    #[test]
    fn rate_limit_is_retryable() {
        assert!(api(429).is_retryable());
    }

    #[test]
    fn other_client_errors_are_fatal() {
        assert!(!api(400).is_retryable());
        assert!(!api(401).is_retryable());
        assert!(!api(404).is_retryable());
    }

    #[test]
    fn local_errors_are_fatal() {
        assert!(!ClientError::Configuration("bad".into()).is_retryable());
        assert!(!ClientError::SendDisabled.is_retryable());
    }
}

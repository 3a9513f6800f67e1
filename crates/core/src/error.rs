/// Domain-level failures that never involve a remote round trip.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Mapping failed for {entity}: {reason}")]
    Mapping { entity: &'static str, reason: String },

    #[error("Invariant violated: {0}")]
    Invariant(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure of a single call against the source or target API.
///
/// [`ApiError::is_retryable`] separates transient failures (rate limiting,
/// server errors, network trouble) from client errors that must surface to
/// the enclosing task immediately.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The connection failed or was reset before a response arrived.
    #[error("Network error: {0}")]
    Network(String),

    /// The request did not complete within the client timeout.
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// The remote answered with a non-success status code.
    #[error("API error ({status}): {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The response body could not be decoded into the expected shape.
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// The call was rejected locally before any request was sent.
    #[error("Invalid request: {0}")]
    Request(String),

    /// Every retry was spent on transient failures.
    #[error("Giving up after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Total number of calls made.
        attempts: u32,
        /// Error returned by the final call.
        last: Box<ApiError>,
    },
}

impl ApiError {
    /// Whether the call may succeed if repeated after a pause.
    ///
    /// 408, 429 and every 5xx are transient, as are network and timeout
    /// failures. All other statuses (400 and 403 included) are final.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::Status { status, .. } => *status == 408 || *status == 429 || *status >= 500,
            Self::Decode(_) | Self::Request(_) | Self::RetriesExhausted { .. } => false,
        }
    }

    /// HTTP status code carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::RetriesExhausted { last, .. } => last.status(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> ApiError {
        ApiError::Status {
            status: code,
            body: String::new(),
        }
    }

    #[test]
    fn rate_limit_and_server_errors_are_retryable() {
        assert!(status(429).is_retryable());
        assert!(status(500).is_retryable());
        assert!(status(503).is_retryable());
        assert!(status(408).is_retryable());
    }

    #[test]
    fn client_errors_are_final() {
        assert!(!status(400).is_retryable());
        assert!(!status(403).is_retryable());
        assert!(!status(404).is_retryable());
    }

    #[test]
    fn transport_errors_are_retryable() {
        assert!(ApiError::Network("connection reset".into()).is_retryable());
        assert!(ApiError::Timeout("30s".into()).is_retryable());
        assert!(!ApiError::Decode("bad json".into()).is_retryable());
    }

    #[test]
    fn exhausted_error_reports_last_status() {
        let err = ApiError::RetriesExhausted {
            attempts: 6,
            last: Box::new(status(502)),
        };
        assert_eq!(err.status(), Some(502));
        assert!(!err.is_retryable());
        assert_eq!(
            err.to_string(),
            "Giving up after 6 attempts: API error (502): "
        );
    }
}

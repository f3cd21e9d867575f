//! Error types for Consilium.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConsiliumError {
    #[error("Classification error: {0}")]
    Classification(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("Responder error: {0}")]
    Responder(String),

    #[error("Synthesis error: {0}")]
    Synthesis(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after_ms: Option<u64>,
    },

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Backend error{}: {message}", .status.map(|s| format!(" {s}")).unwrap_or_default())]
    Backend {
        status: Option<u16>,
        message: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ConsiliumError {
    /// Map an HTTP status and body from an inference or storage backend
    /// onto the typed failure it represents.
    pub fn from_status(status: u16, body: impl Into<String>, retry_after_ms: Option<u64>) -> Self {
        let message = body.into();
        match status {
            401 | 403 => Self::Auth(format!("{status}: {message}")),
            429 => Self::RateLimited {
                message,
                retry_after_ms,
            },
            408 | 504 => Self::Timeout(format!("{status}: {message}")),
            _ => Self::Backend {
                status: Some(status),
                message,
            },
        }
    }

    /// Whether a caller may reasonably try the same call again.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Timeout(_) => true,
            Self::Backend { status, .. } => match status {
                Some(code) => *code >= 500,
                // Connection-level failures carry no status.
                None => true,
            },
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ConsiliumError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert!(matches!(
            ConsiliumError::from_status(401, "nope", None),
            ConsiliumError::Auth(_)
        ));
        assert!(matches!(
            ConsiliumError::from_status(429, "slow down", Some(2000)),
            ConsiliumError::RateLimited {
                retry_after_ms: Some(2000),
                ..
            }
        ));
        assert!(matches!(
            ConsiliumError::from_status(504, "gateway", None),
            ConsiliumError::Timeout(_)
        ));
        assert!(matches!(
            ConsiliumError::from_status(500, "boom", None),
            ConsiliumError::Backend {
                status: Some(500),
                ..
            }
        ));
    }

    #[test]
    fn transient_classification() {
        assert!(ConsiliumError::from_status(503, "unavailable", None).is_transient());
        assert!(ConsiliumError::from_status(429, "", None).is_transient());
        assert!(ConsiliumError::Timeout("read".into()).is_transient());
        assert!(!ConsiliumError::from_status(400, "bad request", None).is_transient());
        assert!(!ConsiliumError::Auth("401".into()).is_transient());
        assert!(!ConsiliumError::Config("x".into()).is_transient());
    }

    #[test]
    fn backend_display_includes_status() {
        let err = ConsiliumError::from_status(502, "bad gateway", None);
        assert_eq!(err.to_string(), "Backend error 502: bad gateway");

        let err = ConsiliumError::Backend {
            status: None,
            message: "connection refused".into(),
        };
        assert_eq!(err.to_string(), "Backend error: connection refused");
    }
}

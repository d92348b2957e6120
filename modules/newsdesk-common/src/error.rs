use thiserror::Error;

/// Result type alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, NewsdeskError>;

#[derive(Error, Debug)]
pub enum NewsdeskError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Upstream HTTP {status}: {message}")]
    UpstreamHttp { status: u16, message: String },

    #[error("Upstream timeout: {0}")]
    UpstreamTimeout(String),

    #[error("Upstream connect error: {0}")]
    UpstreamConnect(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Task cancelled")]
    Cancelled,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl NewsdeskError {
    /// Whether a retry at the task level has a chance of succeeding.
    pub fn is_retryable(&self) -> bool {
        match self {
            NewsdeskError::UpstreamTimeout(_)
            | NewsdeskError::UpstreamConnect(_)
            | NewsdeskError::BackendUnavailable(_) => true,
            NewsdeskError::UpstreamHttp { status, .. } => *status >= 500 || *status == 403,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_and_connects_are_retryable() {
        assert!(NewsdeskError::UpstreamTimeout("t".into()).is_retryable());
        assert!(NewsdeskError::UpstreamConnect("c".into()).is_retryable());
        assert!(NewsdeskError::BackendUnavailable("llm".into()).is_retryable());
    }

    #[test]
    fn server_errors_retryable_client_errors_not() {
        assert!(NewsdeskError::UpstreamHttp { status: 502, message: "bad gateway".into() }
            .is_retryable());
        assert!(NewsdeskError::UpstreamHttp { status: 403, message: "forbidden".into() }
            .is_retryable());
        assert!(!NewsdeskError::UpstreamHttp { status: 404, message: "gone".into() }
            .is_retryable());
        assert!(!NewsdeskError::Parse("truncated".into()).is_retryable());
        assert!(!NewsdeskError::Cancelled.is_retryable());
    }
}

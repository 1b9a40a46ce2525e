use thiserror::Error;

#[derive(Debug, Error)]
pub enum TimelineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Archive access forbidden")]
    Forbidden,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Archive responded with HTTP {status}")]
    Http { status: u16 },

    #[error("Archive RPC error: {0}")]
    Rpc(String),

    #[error("Malformed archive response: {0}")]
    Malformed(String),

    #[error("Request timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("Request cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Camera '{id}' not found")]
    CameraNotFound { id: String },
}

impl TimelineError {
    /// Authorization failures revoke timeline access and are never retried.
    pub fn is_forbidden(&self) -> bool {
        matches!(self, TimelineError::Forbidden)
    }

    /// Cancellation is expected during filter teardown and is not logged.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TimelineError::Cancelled)
    }
}

impl From<reqwest::Error> for TimelineError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            if status == reqwest::StatusCode::FORBIDDEN {
                return TimelineError::Forbidden;
            }
            return TimelineError::Http { status: status.as_u16() };
        }
        if e.is_decode() {
            return TimelineError::Malformed(e.to_string());
        }
        TimelineError::Transport(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TimelineError>;

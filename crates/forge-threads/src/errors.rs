use forge_hitl::HitlError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ThreadClientError {
    #[error("client not configured: {0}")]
    NotConfigured(String),

    #[error("resource not found: {resource} ({id})")]
    NotFound { resource: &'static str, id: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("http request failed: {0}")]
    Http(String),

    #[error("decode failed: {0}")]
    Decode(String),

    #[error("stream failed: {0}")]
    Stream(String),

    #[error("backend failure: {0}")]
    Backend(String),

    #[error("run cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type ThreadClientResult<T> = Result<T, ThreadClientError>;

impl From<ThreadClientError> for HitlError {
    fn from(error: ThreadClientError) -> Self {
        match error {
            ThreadClientError::Cancelled => HitlError::Cancelled,
            other => HitlError::Transport(other.to_string()),
        }
    }
}

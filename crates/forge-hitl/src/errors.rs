use thiserror::Error;

/// Errors surfaced by the interrupt composer.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum HitlError {
    #[error("no valid submit action available")]
    NoValidSubmission,
    #[error("no interrupt is loaded")]
    NoActiveInterrupt,
    #[error("action not allowed: {0}")]
    NotAllowed(String),
    #[error("transport failure: {0}")]
    Transport(String),
    /// The remote run was stopped before it confirmed the response.
    #[error("submission cancelled before completion")]
    Cancelled,
}

impl HitlError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Remote failures and cancelled runs leave drafts untouched and can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Cancelled)
    }
}

use thiserror::Error;

/// Failure taxonomy for story operations.
#[derive(Debug, Error)]
pub enum StoryError {
    #[error("Not found")]
    NotFound,

    #[error("Forbidden")]
    Forbidden,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl StoryError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }
}

pub type StoryResult<T> = Result<T, StoryError>;

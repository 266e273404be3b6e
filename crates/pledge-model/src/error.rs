use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid concurrency limit: {0}")]
    InvalidLimit(String),

    #[error("invalid retry policy: {0}")]
    InvalidRetry(String),

    #[error("invalid backoff strategy: {0}")]
    InvalidBackoff(String),
}

pub type ModelResult<T> = Result<T, ModelError>;

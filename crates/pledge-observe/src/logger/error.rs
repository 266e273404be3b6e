use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("invalid log format: {0} (expected: text|compact|json)")]
    InvalidFormat(String),

    #[error("invalid log filter: {0}")]
    InvalidFilter(String),

    #[error("invalid timestamp mode: {0} (expected: utc|local|off)")]
    InvalidTimestamps(String),

    #[error("logger already initialized")]
    AlreadyInitialized,
}

pub type LoggerResult<T> = Result<T, LoggerError>;

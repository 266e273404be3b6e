mod error;
pub use error::{ModelError, ModelResult};

mod strategy;
pub use strategy::{BackoffStrategy, ConcurrencyLimit, RetryPolicy};

/// Timeout expressed in milliseconds.
pub type TimeoutMs = u64;

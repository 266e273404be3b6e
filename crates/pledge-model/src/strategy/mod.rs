mod backoff;
pub use backoff::BackoffStrategy;

mod limit;
pub use limit::ConcurrencyLimit;

mod retry;
pub use retry::RetryPolicy;

pub mod adapt;
pub mod context;
pub mod deferred;
pub mod error;
pub mod limit;
pub mod metrics;
pub mod race;
pub mod request;
pub mod retry;
pub mod serial;

pub use context::CoordContext;
pub use error::{CallError, CallbackError, LimitError, RaceError, RetryError, TimedOut};

pub mod prelude {
    pub use crate::adapt::{NodeCallback, async_find, async_find_map, denodeify, lastly, next_tick, sleep};
    pub use crate::context::CoordContext;
    pub use crate::deferred::{Deferred, DeferredHandle};
    pub use crate::error::{CallError, CallbackError, LimitError, RaceError, RetryError, TimedOut};
    pub use crate::limit::{Bounded, filter, filter_keyed, some};
    pub use crate::metrics::{MetricsBackend, MetricsHandle, TaskOutcome};
    pub use crate::race::{TimeoutRace, trigger_after_wait, try_with_timeout, with_deadline, with_timeout};
    pub use crate::request::{RequestHandle, RequestOutcome, RequestSerializer};
    pub use crate::retry::{Retry, retry_limit};
    pub use crate::serial::{SerializedCall, SlotFuture};
}

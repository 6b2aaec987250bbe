//! Monitor based thread coordination primitives.
//!
//! Every component in this crate follows the same shape: a mutex guarding a
//! small piece of shared state, paired with a condition variable that callers
//! park on until a predicate over that state holds. Two of them also own a
//! background actor thread with an explicit start/stop lifecycle:
//!
//! - [`BoundedQueue`]: fixed capacity FIFO, producers block when full and
//!   consumers block when empty.
//! - [`TokenBucketLimiter`]: a token reservoir refilled one token per
//!   interval by a ticker thread, callers block until a token is granted.
//! - [`DeferredScheduler`]: a deadline ordered heap of callbacks executed by
//!   a dispatcher thread that sleeps exactly until the next deadline.
//!
//! # Examples
//!
//! ```no_run
//! use foundation_monitors::{BoundedQueue, DeferredScheduler, TokenBucketLimiter};
//! use std::time::Duration;
//!
//! let queue = BoundedQueue::new(5).expect("valid capacity");
//! queue.enqueue(1);
//! assert_eq!(queue.dequeue(), 1);
//!
//! let limiter = TokenBucketLimiter::new(1, Duration::from_secs(1)).expect("valid config");
//! limiter.start().expect("should start ticker");
//! limiter.acquire();
//!
//! let scheduler = DeferredScheduler::new();
//! scheduler.start().expect("should start dispatcher");
//! scheduler.submit("hello", Duration::from_millis(10), |ctx| {
//!     tracing::info!("{} fired at {:?}", ctx.name, ctx.fired_at);
//!     Ok(())
//! });
//! ```

pub mod config;
pub mod deferred;
pub mod errors;
pub mod limiter;
pub mod queue;
pub mod synca;

pub use config::{BucketConfig, MonitorsConfig, QueueConfig, SchedulerConfig};
pub use deferred::{
    ActionContext, ActionHandle, ActionId, CallbackError, CallbackResult, DeferredScheduler,
    ErrorSink, TracingErrorSink,
};
pub use errors::{ConfigError, EnqueueError, LifecycleError, MonitorError, MonitorResult};
pub use limiter::TokenBucketLimiter;
pub use queue::BoundedQueue;

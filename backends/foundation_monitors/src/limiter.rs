//! Token bucket rate limiter refilled by a background ticker thread.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{self, Instant};

use crate::config::BucketConfig;
use crate::errors::{ConfigError, LifecycleError};
use crate::synca::{
    deadline_after, lock_recover, wait_recover, wait_timeout_recover, BackgroundActor, OnSignal,
};

const DEFAULT_TICKER_NAME: &str = "token_bucket_ticker";

/// [`TokenBucketLimiter`] grants at most `capacity` tokens in a burst and
/// then one token per `refill_interval`.
///
/// Refill is discrete: a ticker thread adds exactly one token per interval
/// (when the bucket is not already full) and wakes one waiting caller, so
/// over any window `T` no more than `capacity + ceil(T / refill_interval)`
/// acquisitions succeed.
///
/// Construction only validates the configuration, the ticker runs between
/// [`TokenBucketLimiter::start`] and [`TokenBucketLimiter::stop`] (or drop).
/// Until it is started no token is ever added.
pub struct TokenBucketLimiter {
    shared: Arc<Shared>,
    actor: BackgroundActor,
    refill_interval: time::Duration,
}

struct Shared {
    bucket: Mutex<Bucket>,

    /// parks callers waiting for a token.
    available: Condvar,

    /// parks the ticker between ticks, only `stop` notifies it.
    ticker: Condvar,

    capacity: usize,
}

struct Bucket {
    tokens: usize,
}

impl core::fmt::Debug for TokenBucketLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucketLimiter")
            .field("tokens", &self.available())
            .field("capacity", &self.shared.capacity)
            .field("refill_interval", &self.refill_interval)
            .field("running", &self.actor.is_running())
            .finish()
    }
}

// --- constructors

impl TokenBucketLimiter {
    /// Creates an empty bucket holding at most `capacity` tokens and
    /// refilled with one token every `refill_interval` once started.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `capacity` or `refill_interval` is zero.
    pub fn new(capacity: usize, refill_interval: time::Duration) -> Result<Self, ConfigError> {
        Self::from_config(&BucketConfig::new(capacity, refill_interval))
    }

    /// Like [`TokenBucketLimiter::new`] with `initial_tokens` available
    /// before the first tick.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the bucket can not be built.
    pub fn with_initial_tokens(
        capacity: usize,
        refill_interval: time::Duration,
        initial_tokens: usize,
    ) -> Result<Self, ConfigError> {
        let mut config = BucketConfig::new(capacity, refill_interval);
        config.initial_tokens = initial_tokens;
        Self::from_config(&config)
    }

    /// # Errors
    ///
    /// Returns the first violation reported by [`BucketConfig::validate`].
    pub fn from_config(config: &BucketConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let ticker_name = config
            .thread_name
            .clone()
            .unwrap_or_else(|| String::from(DEFAULT_TICKER_NAME));

        Ok(Self {
            refill_interval: config.refill_interval,
            actor: BackgroundActor::new(ticker_name),
            shared: Arc::new(Shared {
                bucket: Mutex::new(Bucket {
                    tokens: config.initial_tokens,
                }),
                available: Condvar::new(),
                ticker: Condvar::new(),
                capacity: config.capacity,
            }),
        })
    }
}

// --- lifecycle

impl TokenBucketLimiter {
    /// Spawns the ticker. The first token is added immediately, then one
    /// per `refill_interval`.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::AlreadyRunning`] if the ticker is running
    /// or [`LifecycleError::FailedStart`] if its thread can not be spawned.
    pub fn start(&self) -> Result<(), LifecycleError> {
        let shared = self.shared.clone();
        let refill_interval = self.refill_interval;
        self.actor
            .spawn(move |kill_signal| run_ticker(&shared, refill_interval, &kill_signal))
    }

    /// Stops and joins the ticker. Tokens already in the bucket stay
    /// available, callers blocked in [`TokenBucketLimiter::acquire`] keep
    /// waiting until the limiter is started again.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::ActorPanicked`] if the ticker panicked.
    pub fn stop(&self) -> Result<(), LifecycleError> {
        self.actor.stop(|| {
            drop(lock_recover(&self.shared.bucket));
            self.shared.ticker.notify_all();
        })
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.actor.is_running()
    }
}

impl Drop for TokenBucketLimiter {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            tracing::error!("Failed to stop token bucket ticker: {}", err);
        }
    }
}

// --- acquisition

impl TokenBucketLimiter {
    /// Blocks until a token is available and takes it.
    pub fn acquire(&self) {
        let mut bucket = lock_recover(&self.shared.bucket);
        while bucket.tokens == 0 {
            bucket = wait_recover(&self.shared.available, bucket);
        }

        self.take_token(bucket);
    }

    /// Takes a token only if one is available right now.
    #[must_use]
    pub fn try_acquire(&self) -> bool {
        let bucket = lock_recover(&self.shared.bucket);
        if bucket.tokens == 0 {
            return false;
        }

        self.take_token(bucket);
        true
    }

    /// Waits at most `timeout` for a token, returns whether one was taken.
    #[must_use]
    pub fn acquire_timeout(&self, timeout: time::Duration) -> bool {
        let bucket = lock_recover(&self.shared.bucket);
        let (bucket, _) = self
            .shared
            .available
            .wait_timeout_while(bucket, timeout, |bucket| bucket.tokens == 0)
            .unwrap_or_else(PoisonError::into_inner);

        if bucket.tokens == 0 {
            return false;
        }

        self.take_token(bucket);
        true
    }

    fn take_token(&self, mut bucket: std::sync::MutexGuard<'_, Bucket>) {
        bucket.tokens -= 1;
        let left = bucket.tokens;
        drop(bucket);

        // a token is still there, so let another parked caller have it.
        if left > 0 {
            self.shared.available.notify_one();
        }
    }
}

// --- introspection

impl TokenBucketLimiter {
    /// Number of tokens currently in the bucket.
    #[must_use]
    pub fn available(&self) -> usize {
        lock_recover(&self.shared.bucket).tokens
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    #[must_use]
    pub fn refill_interval(&self) -> time::Duration {
        self.refill_interval
    }
}

fn run_ticker(shared: &Shared, refill_interval: time::Duration, kill_signal: &OnSignal) {
    let span = tracing::trace_span!("TokenBucketLimiter::run_ticker");
    let _enter = span.enter();

    let mut next_tick = Instant::now();
    let mut bucket = lock_recover(&shared.bucket);
    loop {
        if kill_signal.probe() {
            tracing::debug!("Ticker received kill signal");
            break;
        }

        let now = Instant::now();
        if let Some(remaining) = next_tick
            .checked_duration_since(now)
            .filter(|remaining| !remaining.is_zero())
        {
            let (guard, _) = wait_timeout_recover(&shared.ticker, bucket, remaining);
            bucket = guard;
            continue;
        }

        if bucket.tokens < shared.capacity {
            bucket.tokens += 1;
            tracing::trace!("Ticker added token, bucket now at {}", bucket.tokens);
        }
        shared.available.notify_one();

        // ticks missed during a stall are dropped rather than replayed,
        // replaying them would grant a burst above the refill rate.
        next_tick = deadline_after(next_tick, refill_interval);
        if next_tick <= now {
            next_tick = deadline_after(now, refill_interval);
        }
    }
}

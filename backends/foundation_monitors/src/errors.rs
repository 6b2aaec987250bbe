use derive_more::derive::From;

/// `ConfigError` is raised when a component is constructed (or a
/// configuration file is loaded) with values that can never produce a
/// usable component. It is always fatal to construction.
#[derive(Debug, From)]
pub enum ConfigError {
    /// A queue or bucket was given a capacity of zero, the value names
    /// the component that rejected it.
    #[from(ignore)]
    ZeroCapacity(&'static str),

    /// A token bucket was given a zero refill interval.
    #[from(ignore)]
    ZeroRefillInterval,

    /// A token bucket was asked to start with more tokens than it can hold.
    #[from(ignore)]
    InitialTokensAboveCapacity { initial: usize, capacity: usize },

    IOError(std::io::Error),

    DeserializationFailed(toml::de::Error),
}

impl std::error::Error for ConfigError {}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// `LifecycleError` covers start/stop failures of background actors
/// (the limiter ticker and the scheduler dispatcher).
#[derive(Debug, From)]
pub enum LifecycleError {
    /// `start` was called on an actor whose thread is still alive.
    #[from(ignore)]
    AlreadyRunning(String),

    /// The OS refused to spawn the actor thread.
    FailedStart(std::io::Error),

    /// The actor thread panicked, surfaced when it gets joined.
    #[from(ignore)]
    ActorPanicked(String),
}

impl std::error::Error for LifecycleError {}

impl core::fmt::Display for LifecycleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Debug, From)]
pub enum MonitorError {
    Config(ConfigError),
    Lifecycle(LifecycleError),
}

impl std::error::Error for MonitorError {}

impl core::fmt::Display for MonitorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(inner) => write!(f, "MonitorError::Config({inner})"),
            Self::Lifecycle(inner) => write!(f, "MonitorError::Lifecycle({inner})"),
        }
    }
}

pub type MonitorResult<T> = std::result::Result<T, MonitorError>;

/// `EnqueueError` is returned by the non-blocking and timed enqueue
/// variants of [`crate::BoundedQueue`], it always hands the rejected
/// item back to the caller.
pub enum EnqueueError<T> {
    /// The queue was full at the time of the call.
    Full(T),

    /// The queue stayed full for the whole timeout.
    TimedOut(T),
}

impl<T> EnqueueError<T> {
    /// Returns the item that could not be enqueued.
    pub fn into_inner(self) -> T {
        match self {
            Self::Full(item) | Self::TimedOut(item) => item,
        }
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        matches!(self, Self::Full(_))
    }

    #[must_use]
    pub fn is_timed_out(&self) -> bool {
        matches!(self, Self::TimedOut(_))
    }
}

impl<T> core::fmt::Debug for EnqueueError<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full(_) => write!(f, "EnqueueError::Full(..)"),
            Self::TimedOut(_) => write!(f, "EnqueueError::TimedOut(..)"),
        }
    }
}

impl<T> core::fmt::Display for EnqueueError<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl<T> std::error::Error for EnqueueError<T> {}

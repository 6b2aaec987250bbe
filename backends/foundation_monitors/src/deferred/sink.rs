use std::any::Any;

use super::ActionId;

pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// What a deferred callback returns, `Err` is reported to the scheduler's
/// [`ErrorSink`] and never retried.
pub type CallbackResult = std::result::Result<(), BoxedError>;

/// `CallbackError` describes a deferred callback that did not complete.
#[derive(Debug)]
pub enum CallbackError {
    /// The callback returned an error.
    Failed {
        id: ActionId,
        name: String,
        error: BoxedError,
    },

    /// The callback panicked, `payload` is the panic message when it was
    /// a string.
    Panicked {
        id: ActionId,
        name: String,
        payload: String,
    },
}

impl CallbackError {
    #[must_use]
    pub fn id(&self) -> ActionId {
        match self {
            Self::Failed { id, .. } | Self::Panicked { id, .. } => *id,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Failed { name, .. } | Self::Panicked { name, .. } => name,
        }
    }

    pub(crate) fn from_panic(id: ActionId, name: String, payload: &(dyn Any + Send)) -> Self {
        let payload = if let Some(message) = payload.downcast_ref::<&str>() {
            (*message).to_string()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            String::from("<non-string panic payload>")
        };

        Self::Panicked { id, name, payload }
    }
}

impl std::error::Error for CallbackError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Failed { error, .. } => Some(error.as_ref()),
            Self::Panicked { .. } => None,
        }
    }
}

impl core::fmt::Display for CallbackError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed { id, name, error } => {
                write!(f, "deferred action {name}#{id} failed: {error}")
            }
            Self::Panicked { id, name, payload } => {
                write!(f, "deferred action {name}#{id} panicked: {payload}")
            }
        }
    }
}

/// [`ErrorSink`] receives every [`CallbackError`] raised on the dispatcher
/// thread. Implementations must not block for long, the dispatcher waits
/// for `report` before moving on to the next action.
pub trait ErrorSink: Send + Sync {
    fn report(&self, error: CallbackError);
}

impl<F> ErrorSink for F
where
    F: Fn(CallbackError) + Send + Sync,
{
    fn report(&self, error: CallbackError) {
        self(error);
    }
}

/// Default sink, logs every failure at error level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn report(&self, error: CallbackError) {
        tracing::error!(
            action_id = error.id(),
            action_name = error.name(),
            "{}",
            error
        );
    }
}

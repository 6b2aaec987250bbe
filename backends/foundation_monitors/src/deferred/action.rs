use std::cmp::Ordering;
use std::time::{Duration, Instant};

use super::CallbackResult;

/// Monotonic submission counter, doubles as the tie-breaker between equal
/// deadlines.
pub type ActionId = u64;

pub(crate) type BoxedCallback = Box<dyn FnOnce(&ActionContext) -> CallbackResult + Send + 'static>;

/// [`ActionContext`] describes the action a callback is running for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionContext {
    pub id: ActionId,
    pub name: String,
    pub submitted_at: Instant,

    /// `submitted_at + delay`, the earliest instant the action may run.
    pub deadline: Instant,

    /// When the dispatcher picked the action up, never before `deadline`.
    pub fired_at: Instant,
}

impl ActionContext {
    /// How long after its deadline the action actually fired.
    #[must_use]
    pub fn lateness(&self) -> Duration {
        self.fired_at.saturating_duration_since(self.deadline)
    }
}

/// Returned by [`crate::DeferredScheduler::submit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionHandle {
    id: ActionId,
    name: String,
    deadline: Instant,
}

impl ActionHandle {
    #[must_use]
    pub fn id(&self) -> ActionId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

pub(crate) struct DeferredAction {
    pub(crate) id: ActionId,
    pub(crate) name: String,
    pub(crate) submitted_at: Instant,
    pub(crate) deadline: Instant,
    pub(crate) callback: BoxedCallback,
}

impl DeferredAction {
    pub(crate) fn handle(&self) -> ActionHandle {
        ActionHandle {
            id: self.id,
            name: self.name.clone(),
            deadline: self.deadline,
        }
    }

    pub(crate) fn into_context(self, fired_at: Instant) -> (ActionContext, BoxedCallback) {
        let context = ActionContext {
            id: self.id,
            name: self.name,
            submitted_at: self.submitted_at,
            deadline: self.deadline,
            fired_at,
        };
        (context, self.callback)
    }

    fn key(&self) -> (Instant, ActionId) {
        (self.deadline, self.id)
    }
}

impl core::fmt::Debug for DeferredAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredAction")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

impl PartialEq for DeferredAction {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for DeferredAction {}

impl PartialOrd for DeferredAction {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DeferredAction {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use super::action::DeferredAction;
use super::{
    ActionContext, ActionHandle, ActionId, CallbackError, CallbackResult, ErrorSink,
    TracingErrorSink,
};
use crate::config::SchedulerConfig;
use crate::errors::LifecycleError;
use crate::synca::{
    deadline_after, lock_recover, wait_recover, wait_timeout_recover, BackgroundActor, OnSignal,
};

const DEFAULT_DISPATCHER_NAME: &str = "deferred_dispatcher";

/// [`DeferredScheduler`] runs callbacks no earlier than their deadline, in
/// `(deadline, submission)` order, one at a time on a dedicated
/// dispatcher thread.
///
/// The dispatcher sleeps exactly until the earliest pending deadline and
/// is woken by every [`DeferredScheduler::submit`], so a new action with
/// a nearer deadline is never held back by a longer sleep. Callbacks run
/// outside the scheduler lock, a slow callback delays the actions after
/// it but never blocks submitters.
///
/// Failing callbacks (an `Err` result or a panic) are handed to the
/// scheduler's [`ErrorSink`] and the dispatcher moves on.
pub struct DeferredScheduler {
    shared: Arc<Shared>,
    actor: BackgroundActor,
}

struct Shared {
    state: Mutex<SchedulerState>,
    event: Condvar,
    sink: Arc<dyn ErrorSink>,
}

#[derive(Default)]
struct SchedulerState {
    actions: BinaryHeap<Reverse<DeferredAction>>,
    next_sequence: ActionId,
}

impl Default for DeferredScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for DeferredScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredScheduler")
            .field("dispatcher", &self.actor.name())
            .field("pending", &self.pending())
            .field("running", &self.actor.is_running())
            .finish()
    }
}

impl DeferredScheduler {
    /// Creates a stopped scheduler reporting failures to
    /// [`TracingErrorSink`].
    #[must_use]
    pub fn new() -> Self {
        Self::build(DEFAULT_DISPATCHER_NAME, Arc::new(TracingErrorSink))
    }

    #[must_use]
    pub fn with_error_sink(sink: impl ErrorSink + 'static) -> Self {
        Self::build(DEFAULT_DISPATCHER_NAME, Arc::new(sink))
    }

    #[must_use]
    pub fn from_config(config: &SchedulerConfig) -> Self {
        let name = config
            .thread_name
            .as_deref()
            .unwrap_or(DEFAULT_DISPATCHER_NAME);
        Self::build(name, Arc::new(TracingErrorSink))
    }

    fn build(name: &str, sink: Arc<dyn ErrorSink>) -> Self {
        Self {
            actor: BackgroundActor::new(name),
            shared: Arc::new(Shared {
                state: Mutex::new(SchedulerState::default()),
                event: Condvar::new(),
                sink,
            }),
        }
    }

    /// Spawns the dispatcher, actions submitted while stopped become
    /// eligible right away.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::AlreadyRunning`] if the dispatcher is
    /// running or [`LifecycleError::FailedStart`] if its thread can not be
    /// spawned.
    pub fn start(&self) -> Result<(), LifecycleError> {
        let shared = self.shared.clone();
        self.actor
            .spawn(move |kill_signal| run_dispatcher(&shared, &kill_signal))
    }

    /// Stops the dispatcher after the callback it is running (if any)
    /// returns. Pending actions are kept for the next [`start`].
    ///
    /// Calling `stop` from inside a callback signals the dispatcher
    /// without waiting for it. The scheduler keeps reporting running, and
    /// refuses a new [`start`], until that callback has returned and the
    /// dispatcher has exited.
    ///
    /// [`start`]: DeferredScheduler::start
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::ActorPanicked`] if the dispatcher thread
    /// panicked outside a callback.
    pub fn stop(&self) -> Result<(), LifecycleError> {
        self.actor.stop(|| {
            drop(lock_recover(&self.shared.state));
            self.shared.event.notify_all();
        })
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.actor.is_running()
    }

    /// Number of actions waiting for their deadline (or for a dispatcher).
    #[must_use]
    pub fn pending(&self) -> usize {
        lock_recover(&self.shared.state).actions.len()
    }

    /// Schedules `callback` to run once `delay` has elapsed. Never blocks
    /// on the dispatcher and never fails, a zero delay makes the action
    /// eligible immediately and a delay past the representable clock
    /// range (e.g. `Duration::MAX`) keeps it pending indefinitely.
    pub fn submit<F>(&self, name: impl Into<String>, delay: Duration, callback: F) -> ActionHandle
    where
        F: FnOnce(&ActionContext) -> CallbackResult + Send + 'static,
    {
        let submitted_at = Instant::now();
        let deadline = deadline_after(submitted_at, delay);

        let mut state = lock_recover(&self.shared.state);
        let id = state.next_sequence;
        state.next_sequence += 1;

        let action = DeferredAction {
            id,
            name: name.into(),
            submitted_at,
            deadline,
            callback: Box::new(callback),
        };
        let handle = action.handle();

        tracing::debug!(
            "Submitted action {}#{} due in {:?}",
            handle.name(),
            handle.id(),
            delay
        );

        state.actions.push(Reverse(action));
        drop(state);

        // the new action may be the nearest deadline, the dispatcher
        // re-checks the heap whatever the reason it woke.
        self.shared.event.notify_all();
        handle
    }
}

impl Drop for DeferredScheduler {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            tracing::error!("Failed to stop deferred dispatcher: {}", err);
        }
    }
}

fn run_dispatcher(shared: &Shared, kill_signal: &OnSignal) {
    let span = tracing::trace_span!("DeferredScheduler::run_dispatcher");
    let _enter = span.enter();

    let mut state = lock_recover(&shared.state);
    loop {
        if kill_signal.probe() {
            tracing::debug!("Dispatcher received kill signal");
            break;
        }

        let Some(deadline) = state.actions.peek().map(|Reverse(next)| next.deadline) else {
            state = wait_recover(&shared.event, state);
            continue;
        };

        let now = Instant::now();
        let remaining = deadline.saturating_duration_since(now);
        if !remaining.is_zero() {
            let (guard, _) = wait_timeout_recover(&shared.event, state, remaining);
            state = guard;
            continue;
        }

        let Some(Reverse(action)) = state.actions.pop() else {
            continue;
        };

        drop(state);
        execute(shared.sink.as_ref(), action);
        state = lock_recover(&shared.state);
    }
}

fn execute(sink: &dyn ErrorSink, action: DeferredAction) {
    let (context, callback) = action.into_context(Instant::now());

    let span = tracing::trace_span!("DeferredScheduler::execute", id = context.id, name = %context.name);
    let _enter = span.enter();

    tracing::trace!(
        "Executing action, {:?} after its deadline",
        context.lateness()
    );

    let failure = match panic::catch_unwind(AssertUnwindSafe(|| callback(&context))) {
        Ok(Ok(())) => return,
        Ok(Err(error)) => CallbackError::Failed {
            id: context.id,
            name: context.name,
            error,
        },
        Err(payload) => CallbackError::from_panic(context.id, context.name, &*payload),
    };

    if panic::catch_unwind(AssertUnwindSafe(|| sink.report(failure))).is_err() {
        tracing::error!("Error sink panicked while reporting a callback failure");
    }
}

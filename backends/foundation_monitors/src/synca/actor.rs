// Implements the owned background thread used by the limiter ticker and
// the scheduler dispatcher.

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use super::{lock_recover, OnSignal, RunOnDrop};
use crate::errors::LifecycleError;

/// [`BackgroundActor`] owns at most one named thread at a time together
/// with the kill signal that thread polls.
///
/// The actor body receives the kill signal and must probe it every time it
/// re-acquires the lock of the component it serves. [`BackgroundActor::stop`]
/// raises the signal, runs the caller supplied wake function (which must
/// take the component lock and notify the condition the body parks on) and
/// then joins the thread.
///
/// An actor can be started again once stopped.
#[derive(Debug)]
pub struct BackgroundActor {
    name: String,
    running: Mutex<Option<Running>>,
}

/// Every spawn gets a fresh kill signal, so a thread detached by a stop
/// from its own callback can never be revived by a later restart.
#[derive(Debug)]
struct Running {
    handle: JoinHandle<()>,
    kill_signal: Arc<OnSignal>,
}

impl BackgroundActor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            running: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `is_running` is true while a spawned thread has not yet exited.
    pub fn is_running(&self) -> bool {
        lock_recover(&self.running)
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    /// `spawn` starts `body` on a new thread named after the actor.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::AlreadyRunning`] if a previous thread is
    /// still alive and [`LifecycleError::FailedStart`] if the OS refused
    /// to create the thread.
    pub fn spawn<F>(&self, body: F) -> Result<(), LifecycleError>
    where
        F: FnOnce(Arc<OnSignal>) + Send + 'static,
    {
        let span = tracing::trace_span!("BackgroundActor::spawn", actor = %self.name);
        let _enter = span.enter();

        let mut running = lock_recover(&self.running);
        if let Some(existing) = running.take() {
            if !existing.handle.is_finished() {
                *running = Some(existing);
                return Err(LifecycleError::AlreadyRunning(self.name.clone()));
            }

            // exited without being stopped, so reap it before reuse.
            if existing.handle.join().is_err() {
                tracing::warn!("Actor {} had panicked before restart", self.name);
            }
        }

        let kill_signal = Arc::new(OnSignal::new());
        let thread_signal = kill_signal.clone();
        let thread_name = self.name.clone();
        let handle = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                let span = tracing::trace_span!("BackgroundActor::thread", actor = %thread_name);
                let _enter = span.enter();
                let _exit = RunOnDrop::new(|| {
                    tracing::debug!("Actor {} has stopped running", thread_name);
                });

                tracing::info!("Starting actor {}", thread_name);
                body(thread_signal);
            })?;

        *running = Some(Running {
            handle,
            kill_signal,
        });
        Ok(())
    }

    /// `stop` delivers the kill signal, calls `wake` so a parked body
    /// observes it and joins the thread. Stopping an actor that is not
    /// running is a no-op.
    ///
    /// When called from the actor's own thread (e.g. from a scheduled
    /// callback) the thread is signalled but not joined, it exits once the
    /// current iteration returns to its loop. Until it has exited the actor
    /// still reports running and [`BackgroundActor::spawn`] refuses to
    /// start a second thread.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::ActorPanicked`] if the thread panicked.
    pub fn stop<W: FnOnce()>(&self, wake: W) -> Result<(), LifecycleError> {
        let span = tracing::trace_span!("BackgroundActor::stop", actor = %self.name);
        let _enter = span.enter();

        let mut slot = lock_recover(&self.running);
        let Some(running) = slot.take() else {
            return Ok(());
        };

        running.kill_signal.turn_on();

        if running.handle.thread().id() == thread::current().id() {
            tracing::debug!("Actor {} asked to stop from its own thread", self.name);
            *slot = Some(running);
            drop(slot);
            wake();
            return Ok(());
        }

        drop(slot);
        wake();

        running
            .handle
            .join()
            .map_err(|_| LifecycleError::ActorPanicked(self.name.clone()))
    }
}

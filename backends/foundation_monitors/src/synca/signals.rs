use std::sync::atomic::{AtomicUsize, Ordering};

/// Indicates the underlying signal to be set.
const SET: usize = 1;

/// Indicates the underlying signal was not set.
const UNSET: usize = 0;

/// `OnSignal` is a one bit flag shared between a background actor and
/// whoever owns it. The owner flips it on to ask the actor to exit and
/// the actor probes it every time it reacquires its component lock.
///
/// The flag by itself does not wake anybody, raising it must be followed
/// by a notify on the condition variable the actor is parked on.
#[derive(Debug)]
pub struct OnSignal {
    state: AtomicUsize,
}

impl Default for OnSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl OnSignal {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: AtomicUsize::new(UNSET),
        }
    }

    /// `turn_on` flips the state from UNSET to SET.
    #[inline]
    pub fn turn_on(&self) -> bool {
        self.state
            .compare_exchange(UNSET, SET, Ordering::SeqCst, Ordering::Relaxed)
            .is_ok()
    }

    /// probe returns true when the state is SET else false.
    #[inline]
    pub fn probe(&self) -> bool {
        self.state.load(Ordering::Acquire) == SET
    }
}

#[cfg(test)]
mod test_on_signal {
    use super::OnSignal;

    #[test]
    fn starts_unset() {
        let signal = OnSignal::new();
        assert!(!signal.probe());
    }

    #[test]
    fn turns_on_only_once() {
        let signal = OnSignal::default();

        assert!(signal.turn_on());
        assert!(!signal.turn_on());
        assert!(signal.probe());
    }
}

mod actor;
mod drops;
mod signals;

pub use actor::*;
pub use drops::*;
pub use signals::*;

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError, WaitTimeoutResult};
use std::time::{self, Instant};

// Component state is only ever mutated by code that cannot panic mid-update
// (callbacks run outside the lock), so a poisoned lock still guards a
// consistent value and we keep using it.

pub(crate) fn lock_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn wait_recover<'a, T>(event: &Condvar, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
    event.wait(guard).unwrap_or_else(PoisonError::into_inner)
}

/// `deadline_after` is `from + after`, clamped to the latest instant the
/// platform can represent instead of overflowing. A clamped deadline is
/// far enough away to behave as "never".
pub(crate) fn deadline_after(from: Instant, after: time::Duration) -> Instant {
    let mut step = after;
    loop {
        if let Some(deadline) = from.checked_add(step) {
            return deadline;
        }
        step /= 2;
    }
}

pub(crate) fn wait_timeout_recover<'a, T>(
    event: &Condvar,
    guard: MutexGuard<'a, T>,
    timeout: time::Duration,
) -> (MutexGuard<'a, T>, WaitTimeoutResult) {
    event
        .wait_timeout(guard, timeout)
        .unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod test_deadline_after {
    use std::time::Duration;

    use super::*;

    #[test]
    fn adds_representable_durations_exactly() {
        let now = Instant::now();
        assert_eq!(deadline_after(now, Duration::from_secs(5)), now + Duration::from_secs(5));
        assert_eq!(deadline_after(now, Duration::ZERO), now);
    }

    #[test]
    fn clamps_instead_of_overflowing() {
        let now = Instant::now();
        let deadline = deadline_after(now, Duration::MAX);

        assert!(deadline > now + Duration::from_secs(365 * 24 * 60 * 60));
    }
}

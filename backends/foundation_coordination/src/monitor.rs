// Implements the lock + condition pair every primitive keeps its state in.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use crate::cancel::{CancellationToken, Waker};
use crate::errors::CoordinationError;

/// Outcome of an aborted wait: the re-acquired guard, so the caller can undo
/// partial state under the lock, plus the reason.
pub(crate) type Aborted<'a, S> = (MutexGuard<'a, S>, CoordinationError);

/// `Monitor` owns a primitive's state behind a single mutex and the
/// condition variable its waiters sleep on.
pub(crate) struct Monitor<S> {
    state: Mutex<S>,
    ready: Condvar,
}

impl<S> Monitor<S> {
    pub(crate) fn new(state: S) -> Self {
        Self {
            state: Mutex::new(state),
            ready: Condvar::new(),
        }
    }

    /// A panicking observer must not wedge every other actor, so poisoning
    /// is ignored; state is only mutated before observers are called.
    pub(crate) fn lock(&self) -> MutexGuard<'_, S> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn notify_one(&self) {
        self.ready.notify_one();
    }

    pub(crate) fn notify_all(&self) {
        self.ready.notify_all();
    }

    /// Blocks once on the condition variable.
    ///
    /// The token and deadline are checked before sleeping while the lock is
    /// still held. Callers re-check their predicate after every `Ok`.
    pub(crate) fn wait<'a>(
        &'a self,
        guard: MutexGuard<'a, S>,
        token: Option<&CancellationToken>,
        deadline: Option<Instant>,
    ) -> Result<MutexGuard<'a, S>, Aborted<'a, S>> {
        if token.is_some_and(CancellationToken::is_cancelled) {
            return Err((guard, CoordinationError::Cancelled));
        }

        match deadline {
            None => Ok(self
                .ready
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner)),
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return Err((guard, CoordinationError::TimedOut));
                }
                Ok(self
                    .ready
                    .wait_timeout(guard, deadline - now)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0)
            }
        }
    }
}

impl<S: Send> Waker for Monitor<S> {
    fn wake(&self) {
        // Taking the lock orders this wake after any waiter that already
        // checked its token but has not yet parked.
        drop(self.lock());
        self.ready.notify_all();
    }
}

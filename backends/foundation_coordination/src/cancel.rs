//! Cancellation tokens for blocking coordination waits.
//!
//! A [`CancellationToken`] is shared between whoever may abort a piece of
//! work and the actors doing it. Primitives register a [`Waker`] for as long
//! as they block on behalf of a token, so [`CancellationToken::cancel`] wakes
//! sleeping threads directly instead of relying on polling.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::errors::{CoordinationError, CoordinationResult};

/// Something that can be nudged awake when the token it waits on is cancelled.
pub trait Waker: Send + Sync {
    fn wake(&self);
}

struct TokenState {
    cancelled: bool,
    next_waker: u64,
    wakers: Vec<(u64, Arc<dyn Waker>)>,
}

struct TokenInner {
    state: Mutex<TokenState>,

    /// Wakes threads parked in [`CancellationToken::sleep`].
    signal: Condvar,
}

impl TokenInner {
    fn lock(&self) -> MutexGuard<'_, TokenState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// `CancellationToken` signals external abort of blocked waits.
///
/// Cloning is cheap and every clone observes the same cancellation.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TokenInner {
                state: Mutex::new(TokenState {
                    cancelled: false,
                    next_waker: 0,
                    wakers: Vec::new(),
                }),
                signal: Condvar::new(),
            }),
        }
    }

    /// Cancels the token and wakes everything currently blocked on it.
    ///
    /// Calling it more than once is a no-op.
    pub fn cancel(&self) {
        let wakers = {
            let mut state = self.inner.lock();
            if state.cancelled {
                return;
            }
            state.cancelled = true;
            std::mem::take(&mut state.wakers)
        };

        tracing::debug!("Cancellation requested, waking {} waiters", wakers.len());
        self.inner.signal.notify_all();
        for (_, waker) in wakers {
            waker.wake();
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.lock().cancelled
    }

    /// Returns [`CoordinationError::Cancelled`] once the token was cancelled.
    ///
    /// # Errors
    ///
    /// Fails with `Cancelled` when [`Self::cancel`] has been called.
    pub fn check(&self) -> CoordinationResult<()> {
        if self.is_cancelled() {
            return Err(CoordinationError::Cancelled);
        }
        Ok(())
    }

    /// Sleeps for `duration` unless the token is cancelled first.
    ///
    /// A duration too large to add to the current instant, such as
    /// `Duration::MAX`, sleeps until cancellation.
    ///
    /// # Errors
    ///
    /// Fails with `Cancelled` if the token is or becomes cancelled before the
    /// duration elapses.
    pub fn sleep(&self, duration: Duration) -> CoordinationResult<()> {
        let deadline = Instant::now().checked_add(duration);
        let mut state = self.inner.lock();
        loop {
            if state.cancelled {
                return Err(CoordinationError::Cancelled);
            }

            let Some(deadline) = deadline else {
                state = self
                    .inner
                    .signal
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
                continue;
            };

            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }

            state = self
                .inner
                .signal
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Registers `waker` to be woken on cancellation until the returned
    /// registration is dropped.
    ///
    /// If the token is already cancelled the waker is not stored; callers
    /// must check the token after registering and before blocking.
    pub fn register(&self, waker: Arc<dyn Waker>) -> WakerRegistration<'_> {
        let mut state = self.inner.lock();
        let id = state.next_waker;
        state.next_waker += 1;
        if !state.cancelled {
            state.wakers.push((id, waker));
        }
        WakerRegistration { token: self, id }
    }

    fn deregister(&self, id: u64) {
        self.inner.lock().wakers.retain(|(entry, _)| *entry != id);
    }

    #[cfg(test)]
    fn registered(&self) -> usize {
        self.inner.lock().wakers.len()
    }
}

/// Keeps a [`Waker`] attached to its token; detaches it on drop.
#[must_use = "the waker is detached as soon as the registration is dropped"]
pub struct WakerRegistration<'a> {
    token: &'a CancellationToken,
    id: u64,
}

impl Drop for WakerRegistration<'_> {
    fn drop(&mut self) {
        self.token.deregister(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    struct CountingWaker(AtomicUsize);

    impl Waker for CountingWaker {
        fn wake(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// WHY: Fresh tokens must not abort anything
    /// WHAT: A new token reports not cancelled and `check` passes
    #[test]
    fn test_new_token_is_live() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.check().is_ok());
    }

    /// WHY: Every clone shares one cancellation flag
    /// WHAT: Cancelling a clone is visible through the original
    #[test]
    fn test_clone_shares_cancellation() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
        assert_eq!(token.check(), Err(CoordinationError::Cancelled));
    }

    /// WHY: Cancellation must reach registered waiters exactly once
    /// WHAT: `cancel` wakes registered wakers, repeated cancels do nothing
    #[test]
    fn test_cancel_wakes_registered_wakers() {
        let token = CancellationToken::new();
        let waker = Arc::new(CountingWaker(AtomicUsize::new(0)));

        let registration = token.register(waker.clone());
        token.cancel();
        token.cancel();
        drop(registration);

        assert_eq!(waker.0.load(Ordering::SeqCst), 1);
    }

    /// WHY: Finished waits must not leave wakers behind
    /// WHAT: Dropping the registration detaches the waker
    #[test]
    fn test_registration_detaches_on_drop() {
        let token = CancellationToken::new();
        let waker = Arc::new(CountingWaker(AtomicUsize::new(0)));

        {
            let _registration = token.register(waker.clone());
            assert_eq!(token.registered(), 1);
        }

        assert_eq!(token.registered(), 0);
        token.cancel();
        assert_eq!(waker.0.load(Ordering::SeqCst), 0);
    }

    /// WHY: Service times are modelled as cancellable sleeps
    /// WHAT: Sleep completes normally on a live token
    #[test]
    fn test_sleep_completes() {
        let token = CancellationToken::new();
        let started = Instant::now();
        assert!(token.sleep(Duration::from_millis(20)).is_ok());
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    /// WHY: Cancellation must cut sleeps short
    /// WHAT: A long sleep returns `Cancelled` soon after `cancel`
    #[test]
    #[ntest::timeout(5000)]
    fn test_sleep_aborts_on_cancel() {
        let token = CancellationToken::new();
        let sleeper = token.clone();

        let handle = thread::spawn(move || sleeper.sleep(Duration::from_secs(60)));
        thread::sleep(Duration::from_millis(50));
        token.cancel();

        let result = handle.join().expect("sleeper should join");
        assert_eq!(result, Err(CoordinationError::Cancelled));
    }

    /// WHY: `Duration::MAX` is how callers ask to wait forever
    /// WHAT: An unrepresentable deadline neither panics nor outlives cancellation
    #[test]
    #[ntest::timeout(5000)]
    fn test_sleep_forever_until_cancelled() {
        let cancelled = CancellationToken::new();
        cancelled.cancel();
        assert_eq!(cancelled.sleep(Duration::MAX), Err(CoordinationError::Cancelled));

        let token = CancellationToken::new();
        let sleeper = token.clone();
        let handle = thread::spawn(move || sleeper.sleep(Duration::MAX));
        thread::sleep(Duration::from_millis(50));
        token.cancel();

        let result = handle.join().expect("sleeper should join");
        assert_eq!(result, Err(CoordinationError::Cancelled));
    }
}

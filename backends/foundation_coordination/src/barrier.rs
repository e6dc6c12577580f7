//! Phase barrier for N-way rendezvous.
//!
//! The barrier releases a phase once exactly `cohort_size` participants have
//! arrived. Exactly one participant per phase (the last to arrive) observes
//! itself as leader.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cancel::CancellationToken;
use crate::errors::{CoordinationError, CoordinationResult};
use crate::events::{ActorId, CoordinationEvent, EventKind, EventObserver, NoopObserver};
use crate::monitor::Monitor;

#[derive(Debug)]
struct BarrierState {
    arrived: usize,
    phase: u64,
}

/// Result of a completed arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseArrival {
    phase: u64,
    is_leader: bool,
}

impl PhaseArrival {
    /// The phase this participant was released from, counted from 0.
    #[must_use]
    pub fn phase(&self) -> u64 {
        self.phase
    }

    /// Returns `true` for the participant that completed the cohort.
    #[must_use]
    pub fn is_leader(&self) -> bool {
        self.is_leader
    }
}

/// `PhaseBarrier` blocks a fixed cohort of participants until all of them
/// have arrived, then releases them together and starts the next phase.
///
/// Clones share the same barrier.
///
/// # Examples
///
/// ```
/// use foundation_coordination::{ActorId, PhaseBarrier};
/// use std::thread;
///
/// let barrier = PhaseBarrier::new(3);
/// let handles: Vec<_> = (0..3)
///     .map(|i| {
///         let barrier = barrier.clone();
///         thread::spawn(move || barrier.arrive(ActorId::runner(i)))
///     })
///     .collect();
///
/// let leaders = handles
///     .into_iter()
///     .map(|handle| handle.join().unwrap())
///     .filter(|arrival| arrival.is_leader())
///     .count();
/// assert_eq!(leaders, 1);
/// ```
#[derive(Clone)]
pub struct PhaseBarrier {
    cohort_size: usize,
    monitor: Arc<Monitor<BarrierState>>,
    observer: Arc<dyn EventObserver>,
}

impl core::fmt::Debug for PhaseBarrier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.monitor.lock();
        f.debug_struct("PhaseBarrier")
            .field("cohort_size", &self.cohort_size)
            .field("arrived", &state.arrived)
            .field("phase", &state.phase)
            .finish()
    }
}

impl PhaseBarrier {
    /// # Panics
    ///
    /// Panics if `cohort_size` is 0.
    #[must_use]
    pub fn new(cohort_size: usize) -> Self {
        Self::with_observer(cohort_size, Arc::new(NoopObserver))
    }

    /// # Panics
    ///
    /// Panics if `cohort_size` is 0.
    #[must_use]
    pub fn with_observer(cohort_size: usize, observer: Arc<dyn EventObserver>) -> Self {
        assert!(cohort_size > 0, "barrier cohort size must be > 0");
        Self {
            cohort_size,
            monitor: Arc::new(Monitor::new(BarrierState {
                arrived: 0,
                phase: 0,
            })),
            observer,
        }
    }

    #[must_use]
    pub fn cohort_size(&self) -> usize {
        self.cohort_size
    }

    /// The phase currently accepting arrivals.
    #[must_use]
    pub fn phase(&self) -> u64 {
        self.monitor.lock().phase
    }

    /// Participants blocked in the current phase.
    #[must_use]
    pub fn waiting(&self) -> usize {
        self.monitor.lock().arrived
    }

    /// Blocks until the whole cohort has arrived in the current phase.
    ///
    /// If fewer than `cohort_size` participants ever arrive this never
    /// returns; use [`Self::arrive_with`] or [`Self::arrive_timeout`] when
    /// that must be bounded.
    pub fn arrive(&self, participant: ActorId) -> PhaseArrival {
        match self.await_phase(participant, None, None) {
            Ok(arrival) => arrival,
            Err(err) => unreachable!("unbounded arrival cannot be aborted: {err}"),
        }
    }

    /// Like [`Self::arrive`] but gives up when `token` is cancelled.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` if the token is cancelled before the phase is
    /// released. The participant's arrival is withdrawn so the phase still
    /// needs a full cohort.
    pub fn arrive_with(
        &self,
        participant: ActorId,
        token: &CancellationToken,
    ) -> CoordinationResult<PhaseArrival> {
        self.await_phase(participant, Some(token), None)
    }

    /// Like [`Self::arrive`] but gives up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `TimedOut` if the phase is not released in time; the arrival
    /// is withdrawn. A timeout past the representable range never expires.
    pub fn arrive_timeout(
        &self,
        participant: ActorId,
        timeout: Duration,
    ) -> CoordinationResult<PhaseArrival> {
        self.await_phase(participant, None, Instant::now().checked_add(timeout))
    }

    fn await_phase(
        &self,
        participant: ActorId,
        token: Option<&CancellationToken>,
        deadline: Option<Instant>,
    ) -> CoordinationResult<PhaseArrival> {
        let _registration = token.map(|token| token.register(self.monitor.clone()));

        let mut state = self.monitor.lock();
        if token.is_some_and(CancellationToken::is_cancelled) {
            self.emit(participant, EventKind::Cancelled);
            return Err(CoordinationError::Cancelled);
        }

        let phase = state.phase;
        state.arrived += 1;
        self.emit(participant, EventKind::Arrived);

        if state.arrived == self.cohort_size {
            state.arrived = 0;
            state.phase = state.phase.wrapping_add(1);
            self.emit(participant, EventKind::PhaseReleased { phase });
            drop(state);

            self.monitor.notify_all();
            return Ok(PhaseArrival {
                phase,
                is_leader: true,
            });
        }

        tracing::debug!("{participant} waiting for phase {phase} to fill");
        while state.phase == phase {
            state = match self.monitor.wait(state, token, deadline) {
                Ok(state) => state,
                Err((mut state, err)) => {
                    state.arrived = state.arrived.checked_sub(1).ok_or_else(|| {
                        tracing::error!("barrier arrival count underflow in phase {phase}");
                        CoordinationError::InvariantViolation("barrier arrivals underflow")
                    })?;
                    self.emit(participant, EventKind::Cancelled);
                    return Err(err);
                }
            };
        }

        Ok(PhaseArrival {
            phase,
            is_leader: false,
        })
    }

    fn emit(&self, actor: ActorId, kind: EventKind) {
        self.observer.observe(&CoordinationEvent::now(actor, kind));
    }
}

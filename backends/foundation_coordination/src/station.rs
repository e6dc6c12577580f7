//! Bounded station: a counting semaphore with a fixed service time.
//!
//! At most `capacity` occupants hold the station at once. Admission hands
//! out an [`OccupancyPermit`] whose drop returns the slot, so the slot is
//! released on every exit path: normal departure, cancellation, or unwind.
//! Waiters are not served in any particular order.

use std::sync::Arc;
use std::time::Duration;

use crate::cancel::CancellationToken;
use crate::errors::{CoordinationError, CoordinationResult};
use crate::events::{ActorId, CoordinationEvent, EventKind, EventObserver, NoopObserver};
use crate::monitor::Monitor;

#[derive(Debug)]
struct StationState {
    occupants: usize,
    admissions: u64,
}

/// `BoundedStation` admits at most `capacity` concurrent occupants, each
/// holding its slot for `service_time`.
///
/// Clones share the same station.
#[derive(Clone)]
pub struct BoundedStation {
    capacity: usize,
    service_time: Duration,
    monitor: Arc<Monitor<StationState>>,
    observer: Arc<dyn EventObserver>,
}

impl core::fmt::Debug for BoundedStation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.monitor.lock();
        f.debug_struct("BoundedStation")
            .field("capacity", &self.capacity)
            .field("service_time", &self.service_time)
            .field("occupants", &state.occupants)
            .field("admissions", &state.admissions)
            .finish()
    }
}

impl BoundedStation {
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    #[must_use]
    pub fn new(capacity: usize, service_time: Duration) -> Self {
        Self::with_observer(capacity, service_time, Arc::new(NoopObserver))
    }

    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    #[must_use]
    pub fn with_observer(
        capacity: usize,
        service_time: Duration,
        observer: Arc<dyn EventObserver>,
    ) -> Self {
        assert!(capacity > 0, "station capacity must be > 0");
        Self {
            capacity,
            service_time,
            monitor: Arc::new(Monitor::new(StationState {
                occupants: 0,
                admissions: 0,
            })),
            observer,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn service_time(&self) -> Duration {
        self.service_time
    }

    #[must_use]
    pub fn occupants(&self) -> usize {
        self.monitor.lock().occupants
    }

    #[must_use]
    pub fn available(&self) -> usize {
        self.capacity.saturating_sub(self.occupants())
    }

    /// Total admissions since construction.
    #[must_use]
    pub fn admissions(&self) -> u64 {
        self.monitor.lock().admissions
    }

    /// Waits for a slot, holds it for the service time, then leaves.
    ///
    /// # Errors
    ///
    /// Only `InvariantViolation`, which indicates a bug.
    pub fn occupy(&self, customer: ActorId) -> CoordinationResult<()> {
        let permit = self.admit(customer)?;
        std::thread::sleep(self.service_time);
        permit.release()
    }

    /// Like [`Self::occupy`] but abortable through `token`, both while
    /// waiting and during service.
    ///
    /// # Errors
    ///
    /// `Cancelled` if the token fires before service completes. The slot is
    /// returned whenever it was taken.
    pub fn occupy_with(&self, customer: ActorId, token: &CancellationToken) -> CoordinationResult<()> {
        let permit = self.admit_with(customer, token)?;
        if let Err(err) = token.sleep(self.service_time) {
            permit.abandon()?;
            return Err(err);
        }
        permit.release()
    }

    /// Waits for a free slot and returns the permit holding it.
    ///
    /// # Errors
    ///
    /// Only `InvariantViolation`, which indicates a bug.
    pub fn admit(&self, customer: ActorId) -> CoordinationResult<OccupancyPermit> {
        self.acquire(customer, None)
    }

    /// Like [`Self::admit`] but abortable through `token`.
    ///
    /// # Errors
    ///
    /// `Cancelled` if the token fires before a slot is granted; no slot is
    /// held in that case.
    pub fn admit_with(
        &self,
        customer: ActorId,
        token: &CancellationToken,
    ) -> CoordinationResult<OccupancyPermit> {
        self.acquire(customer, Some(token))
    }

    fn acquire(
        &self,
        customer: ActorId,
        token: Option<&CancellationToken>,
    ) -> CoordinationResult<OccupancyPermit> {
        let _registration = token.map(|token| token.register(self.monitor.clone()));

        let mut state = self.monitor.lock();
        if token.is_some_and(CancellationToken::is_cancelled) {
            self.emit(customer, EventKind::Cancelled);
            return Err(CoordinationError::Cancelled);
        }
        self.emit(customer, EventKind::Arrived);

        while state.occupants >= self.capacity {
            state = match self.monitor.wait(state, token, None) {
                Ok(state) => state,
                Err((state, err)) => {
                    self.emit(customer, EventKind::Cancelled);
                    let slot_free = state.occupants < self.capacity;
                    drop(state);

                    // A release may have picked us to wake; pass it on.
                    if slot_free {
                        self.monitor.notify_one();
                    }
                    return Err(err);
                }
            };
        }

        state.occupants += 1;
        state.admissions += 1;
        if state.occupants > self.capacity {
            tracing::error!("station holds {} occupants over capacity {}", state.occupants, self.capacity);
            state.occupants -= 1;
            return Err(CoordinationError::InvariantViolation("occupants above capacity"));
        }
        self.emit(customer, EventKind::Admitted);

        Ok(OccupancyPermit {
            station: self.clone(),
            customer,
            released: false,
        })
    }

    fn release(&self, customer: ActorId, kind: EventKind) -> CoordinationResult<()> {
        let mut state = self.monitor.lock();
        state.occupants = state.occupants.checked_sub(1).ok_or_else(|| {
            tracing::error!("{customer} released a slot the station never granted");
            CoordinationError::InvariantViolation("occupants underflow")
        })?;
        self.emit(customer, kind);
        drop(state);

        self.monitor.notify_one();
        Ok(())
    }

    fn emit(&self, actor: ActorId, kind: EventKind) {
        self.observer.observe(&CoordinationEvent::now(actor, kind));
    }
}

/// One held slot of a [`BoundedStation`]. Dropping it vacates the slot.
#[must_use = "the slot is released as soon as the permit is dropped"]
pub struct OccupancyPermit {
    station: BoundedStation,
    customer: ActorId,
    released: bool,
}

impl core::fmt::Debug for OccupancyPermit {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("OccupancyPermit")
            .field("customer", &self.customer)
            .field("released", &self.released)
            .finish()
    }
}

impl OccupancyPermit {
    #[must_use]
    pub fn customer(&self) -> ActorId {
        self.customer
    }

    /// Vacates the slot after normal service.
    ///
    /// # Errors
    ///
    /// Only `InvariantViolation`, which indicates a bug.
    pub fn release(mut self) -> CoordinationResult<()> {
        self.released = true;
        self.station.release(self.customer, EventKind::Departed)
    }

    /// Vacates the slot after service was cut short.
    ///
    /// # Errors
    ///
    /// Only `InvariantViolation`, which indicates a bug.
    pub fn abandon(mut self) -> CoordinationResult<()> {
        self.released = true;
        self.station.release(self.customer, EventKind::Cancelled)
    }
}

impl Drop for OccupancyPermit {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let kind = if std::thread::panicking() {
            EventKind::Cancelled
        } else {
            EventKind::Departed
        };
        if let Err(err) = self.station.release(self.customer, kind) {
            tracing::error!("failed to release slot of {}: {err}", self.customer);
        }
    }
}

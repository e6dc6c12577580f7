//! Actor identities and the lifecycle events primitives report.
//!
//! Every primitive holds one [`EventObserver`] and reports transitions to it
//! while its internal lock is held. Event order therefore matches the order
//! of state transitions, which is what [`EventLog`] relies on to reconstruct
//! admission intervals. Observers must stay cheap and must never call back
//! into the primitive that reports to them.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// The kind of actor taking part in a simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Runner,
    Customer,
    Car,
    Train,
}

impl core::fmt::Display for ActorRole {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::Runner => "runner",
            Self::Customer => "customer",
            Self::Car => "car",
            Self::Train => "train",
        };
        f.write_str(name)
    }
}

/// Identifies an actor for logging; it carries no behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorId {
    role: ActorRole,
    index: usize,
}

impl ActorId {
    #[must_use]
    pub const fn new(role: ActorRole, index: usize) -> Self {
        Self { role, index }
    }

    #[must_use]
    pub const fn runner(index: usize) -> Self {
        Self::new(ActorRole::Runner, index)
    }

    #[must_use]
    pub const fn customer(index: usize) -> Self {
        Self::new(ActorRole::Customer, index)
    }

    #[must_use]
    pub const fn car(index: usize) -> Self {
        Self::new(ActorRole::Car, index)
    }

    #[must_use]
    pub const fn train(index: usize) -> Self {
        Self::new(ActorRole::Train, index)
    }

    #[must_use]
    pub const fn role(&self) -> ActorRole {
        self.role
    }

    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }
}

impl core::fmt::Display for ActorId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} #{}", self.role, self.index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// The actor reached the primitive and may now block.
    Arrived,
    /// The actor was let into the guarded section.
    Admitted,
    /// The actor left the guarded section normally.
    Departed,
    /// The actor gave up, either while waiting or while holding its slot.
    Cancelled,
    /// The actor completed a barrier cohort and released `phase`.
    PhaseReleased { phase: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinationEvent {
    pub at: Instant,
    pub actor: ActorId,
    pub kind: EventKind,
}

impl CoordinationEvent {
    #[must_use]
    pub fn now(actor: ActorId, kind: EventKind) -> Self {
        Self {
            at: Instant::now(),
            actor,
            kind,
        }
    }
}

pub trait EventObserver: Send + Sync {
    fn observe(&self, event: &CoordinationEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl EventObserver for NoopObserver {
    fn observe(&self, _event: &CoordinationEvent) {}
}

/// Prints human readable progress lines through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl EventObserver for TracingObserver {
    fn observe(&self, event: &CoordinationEvent) {
        let actor = event.actor;
        match event.kind {
            EventKind::Arrived => tracing::info!("{actor} arrived and is waiting"),
            EventKind::Admitted => tracing::info!("{actor} admitted"),
            EventKind::Departed => tracing::info!("{actor} departed"),
            EventKind::Cancelled => tracing::info!("{actor} cancelled"),
            EventKind::PhaseReleased { phase } => {
                tracing::info!("{actor} completed the cohort, releasing phase {phase}");
            }
        }
    }
}

/// Forwards every event to each observer in order.
#[derive(Default, Clone)]
pub struct FanOut {
    observers: Vec<Arc<dyn EventObserver>>,
}

impl FanOut {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, observer: Arc<dyn EventObserver>) -> Self {
        self.observers.push(observer);
        self
    }
}

impl EventObserver for FanOut {
    fn observe(&self, event: &CoordinationEvent) {
        for observer in &self.observers {
            observer.observe(event);
        }
    }
}

/// An event as stored by [`EventLog`], numbered in arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedEvent {
    pub sequence: u64,
    pub event: CoordinationEvent,
}

/// The stretch between an actor's admission and its exit, in log sequence
/// numbers. `end` is exclusive of anything recorded after the exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionInterval {
    pub actor: ActorId,
    pub start: u64,
    pub end: u64,
    pub admitted_at: Instant,
    pub exited_at: Instant,
}

/// Records every event it observes.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<RecordedEvent>>,
}

impl EventLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Counts recorded events matching `kind`, optionally restricted to `role`.
    #[must_use]
    pub fn count(&self, kind: EventKind, role: Option<ActorRole>) -> usize {
        self.events()
            .iter()
            .filter(|recorded| recorded.event.kind == kind)
            .filter(|recorded| role.is_none_or(|role| recorded.event.actor.role() == role))
            .count()
    }

    /// Pairs each admission with the same actor's next exit.
    ///
    /// Exits are `Departed` or `Cancelled` events; admissions without an
    /// exit yet are left out.
    #[must_use]
    pub fn intervals(&self) -> Vec<AdmissionInterval> {
        let events = self.events();
        let mut open: Vec<RecordedEvent> = Vec::new();
        let mut intervals = Vec::new();

        for recorded in events {
            match recorded.event.kind {
                EventKind::Admitted => open.push(recorded),
                EventKind::Departed | EventKind::Cancelled => {
                    let Some(position) = open
                        .iter()
                        .position(|admitted| admitted.event.actor == recorded.event.actor)
                    else {
                        continue;
                    };
                    let admitted = open.swap_remove(position);
                    intervals.push(AdmissionInterval {
                        actor: recorded.event.actor,
                        start: admitted.sequence,
                        end: recorded.sequence,
                        admitted_at: admitted.event.at,
                        exited_at: recorded.event.at,
                    });
                }
                EventKind::Arrived | EventKind::PhaseReleased { .. } => {}
            }
        }

        intervals.sort_by_key(|interval| interval.start);
        intervals
    }

    #[must_use]
    pub fn intervals_for(&self, role: ActorRole) -> Vec<AdmissionInterval> {
        self.intervals()
            .into_iter()
            .filter(|interval| interval.actor.role() == role)
            .collect()
    }
}

impl EventObserver for EventLog {
    fn observe(&self, event: &CoordinationEvent) {
        let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        let sequence = events.len() as u64;
        events.push(RecordedEvent {
            sequence,
            event: *event,
        });
    }
}

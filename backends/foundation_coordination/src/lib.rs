//! Blocking coordination primitives and the simulations built on them.
//!
//! - [`PhaseBarrier`]: releases a fixed cohort together, phase after phase.
//! - [`BoundedStation`]: admits at most `capacity` occupants, each for a
//!   fixed service time.
//! - [`ExclusionGate`]: a crossing where cars share and trains go alone,
//!   with trains given priority over new cars.
//!
//! Each primitive keeps its state behind one internal lock and is shared
//! between actor threads by cloning the handle. Blocking operations come in
//! a plain form and a `_with` form taking a [`CancellationToken`]; whatever
//! an aborted caller held is released before the error is returned.
//!
//! # Examples
//!
//! ```rust
//! use foundation_coordination::{ActorId, BoundedStation, CancellationToken};
//! use std::thread;
//! use std::time::Duration;
//!
//! let station = BoundedStation::new(2, Duration::from_millis(5));
//! let token = CancellationToken::new();
//!
//! let handles: Vec<_> = (0..4)
//!     .map(|index| {
//!         let station = station.clone();
//!         let token = token.clone();
//!         thread::spawn(move || station.occupy_with(ActorId::customer(index), &token))
//!     })
//!     .collect();
//!
//! for handle in handles {
//!     handle.join().unwrap().unwrap();
//! }
//! assert_eq!(station.admissions(), 4);
//! ```

pub mod barrier;
pub mod cancel;
mod errors;
pub mod events;
pub mod gate;
mod monitor;
pub mod simulations;
pub mod station;

pub use barrier::{PhaseArrival, PhaseBarrier};
pub use cancel::{CancellationToken, Waker, WakerRegistration};
pub use errors::{CoordinationError, CoordinationResult};
pub use events::{
    ActorId, ActorRole, AdmissionInterval, CoordinationEvent, EventKind, EventLog, EventObserver,
    FanOut, NoopObserver, RecordedEvent, TracingObserver,
};
pub use gate::{CarPass, ExclusionGate, GateMode, TrainPass};
pub use simulations::{SimulationError, SimulationResult};
pub use station::{BoundedStation, OccupancyPermit};

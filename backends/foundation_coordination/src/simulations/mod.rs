//! Demo drivers: one thread per actor against one primitive each.
//!
//! Every driver joins all of its workers before returning, whatever the
//! outcome of each worker.

pub mod crossing;
pub mod gas_station;
pub mod race;

use std::thread::JoinHandle;

use crate::errors::CoordinationError;
use crate::events::ActorId;

pub use crossing::{CrossingConfig, CrossingReport};
pub use gas_station::{StationConfig, StationReport};
pub use race::{RaceConfig, RaceReport};

// region -- SimulationError

pub type SimulationResult<T> = core::result::Result<T, SimulationError>;

#[derive(Debug, derive_more::From)]
pub enum SimulationError {
    Coordination(CoordinationError),

    #[from(ignore)]
    WorkerPanicked(ActorId),
}

impl std::error::Error for SimulationError {}

impl core::fmt::Display for SimulationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

// --- end region: SimulationError

/// Joins every worker, keeping each actor's own outcome.
///
/// A panicked worker is reported only after all others were joined.
pub(crate) fn join_actors<T>(
    workers: Vec<(ActorId, JoinHandle<Result<T, CoordinationError>>)>,
) -> SimulationResult<Vec<(ActorId, Result<T, CoordinationError>)>> {
    let mut outcomes = Vec::with_capacity(workers.len());
    let mut panicked = None;

    for (actor, handle) in workers {
        match handle.join() {
            Ok(outcome) => outcomes.push((actor, outcome)),
            Err(_) => {
                tracing::error!("{actor} panicked");
                panicked.get_or_insert(actor);
            }
        }
    }

    match panicked {
        Some(actor) => Err(SimulationError::WorkerPanicked(actor)),
        None => Ok(outcomes),
    }
}

/// Splits outcomes into completed and cancelled counts, surfacing any other
/// failure.
pub(crate) fn tally<T>(
    outcomes: &[(ActorId, Result<T, CoordinationError>)],
) -> SimulationResult<(usize, usize)> {
    let mut completed = 0;
    let mut cancelled = 0;
    for (actor, outcome) in outcomes {
        match outcome {
            Ok(_) => completed += 1,
            Err(CoordinationError::Cancelled) => cancelled += 1,
            Err(err) => {
                tracing::error!("{actor} failed: {err}");
                return Err((*err).into());
            }
        }
    }
    Ok((completed, cancelled))
}

//! Customers queue for a gas station with a fixed number of pumps.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::{join_actors, tally, SimulationResult};
use crate::cancel::CancellationToken;
use crate::errors::CoordinationResult;
use crate::events::{ActorId, EventObserver};
use crate::station::BoundedStation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    pub pumps: usize,
    pub customers: usize,
    pub refuel_ms: u64,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            pumps: 2,
            customers: 10,
            refuel_ms: 2000,
        }
    }
}

impl StationConfig {
    #[must_use]
    pub fn refuel_time(&self) -> Duration {
        Duration::from_millis(self.refuel_ms)
    }

    /// Lower bound on the run time: customers are served in rounds of
    /// `pumps`, each round lasting one refuel.
    #[must_use]
    pub fn minimum_duration(&self) -> Duration {
        let rounds = self.customers.div_ceil(self.pumps.max(1));
        self.refuel_time()
            .checked_mul(u32::try_from(rounds).unwrap_or(u32::MAX))
            .unwrap_or(Duration::MAX)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StationReport {
    pub served: usize,
    pub cancelled: usize,
    pub elapsed: Duration,
}

/// Sends every customer through the station once.
///
/// # Errors
///
/// A panicked customer or an internal invariant failure. Cancelled
/// customers are counted in the report instead.
///
/// # Panics
///
/// Panics if `config.pumps` is 0.
pub fn run(
    config: &StationConfig,
    observer: Arc<dyn EventObserver>,
    token: &CancellationToken,
) -> SimulationResult<StationReport> {
    let started = Instant::now();
    let station = BoundedStation::with_observer(config.pumps, config.refuel_time(), observer);

    let workers = (0..config.customers)
        .map(|index| {
            let customer = ActorId::customer(index);
            let station = station.clone();
            let token = token.clone();
            let handle = thread::spawn(move || -> CoordinationResult<()> {
                station.occupy_with(customer, &token)
            });
            (customer, handle)
        })
        .collect();

    let (served, cancelled) = tally(&join_actors(workers)?)?;

    tracing::info!("Gas station closed: {served} refuelled, {cancelled} left early");
    Ok(StationReport {
        served,
        cancelled,
        elapsed: started.elapsed(),
    })
}

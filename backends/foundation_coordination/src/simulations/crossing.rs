//! Cars and trains share a railroad crossing.
//!
//! Car `i` shows up after `(i - 1) * car_interval_ms`, train `j` after
//! `(j - 1) * train_interval_ms`, each on its own thread.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::{join_actors, tally, SimulationResult};
use crate::cancel::CancellationToken;
use crate::errors::CoordinationResult;
use crate::events::{ActorId, ActorRole, EventObserver};
use crate::gate::ExclusionGate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossingConfig {
    pub cars: usize,
    pub trains: usize,
    pub car_interval_ms: u64,
    pub train_interval_ms: u64,
    pub car_crossing_ms: u64,
    pub train_crossing_ms: u64,
}

impl Default for CrossingConfig {
    fn default() -> Self {
        Self {
            cars: 20,
            trains: 3,
            car_interval_ms: 200,
            train_interval_ms: 4000,
            car_crossing_ms: 100,
            train_crossing_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrossingReport {
    pub cars_crossed: usize,
    pub trains_crossed: usize,
    pub cancelled: usize,
    pub elapsed: Duration,
}

/// Runs all cars and trains over one crossing.
///
/// # Errors
///
/// A panicked actor or an internal invariant failure. Cancelled actors are
/// counted in the report instead.
pub fn run(
    config: &CrossingConfig,
    observer: Arc<dyn EventObserver>,
    token: &CancellationToken,
) -> SimulationResult<CrossingReport> {
    let started = Instant::now();
    let gate = ExclusionGate::with_observer(observer);

    let spawn_actor = |actor: ActorId, delay: Duration, crossing: Duration| {
        let gate = gate.clone();
        let token = token.clone();
        let handle = thread::spawn(move || -> CoordinationResult<()> {
            token.sleep(delay)?;
            match actor.role() {
                ActorRole::Train => gate.cross_as_train(actor, crossing, &token),
                _ => gate.cross_as_car(actor, crossing, &token),
            }
        });
        (actor, handle)
    };

    let cars: Vec<_> = (1..=config.cars)
        .map(|index| {
            spawn_actor(
                ActorId::car(index),
                Duration::from_millis(config.car_interval_ms.saturating_mul(index as u64 - 1)),
                Duration::from_millis(config.car_crossing_ms),
            )
        })
        .collect();
    let trains: Vec<_> = (1..=config.trains)
        .map(|index| {
            spawn_actor(
                ActorId::train(index),
                Duration::from_millis(config.train_interval_ms.saturating_mul(index as u64 - 1)),
                Duration::from_millis(config.train_crossing_ms),
            )
        })
        .collect();

    let car_outcomes = join_actors(cars);
    let train_outcomes = join_actors(trains);
    let (cars_crossed, cars_cancelled) = tally(&car_outcomes?)?;
    let (trains_crossed, trains_cancelled) = tally(&train_outcomes?)?;

    tracing::info!("Crossing closed: {cars_crossed} cars and {trains_crossed} trains crossed");
    Ok(CrossingReport {
        cars_crossed,
        trains_crossed,
        cancelled: cars_cancelled + trains_cancelled,
        elapsed: started.elapsed(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventLog, NoopObserver};

    fn quick_config() -> CrossingConfig {
        CrossingConfig {
            cars: 8,
            trains: 2,
            car_interval_ms: 5,
            train_interval_ms: 20,
            car_crossing_ms: 10,
            train_crossing_ms: 15,
        }
    }

    /// WHY: Every actor eventually gets across
    /// WHAT: All cars and trains of a quick run complete
    #[test]
    #[ntest::timeout(10000)]
    fn test_everyone_crosses() {
        let log = Arc::new(EventLog::new());

        let report = run(&quick_config(), log.clone(), &CancellationToken::new())
            .expect("crossing should run");

        assert_eq!(report.cars_crossed, 8);
        assert_eq!(report.trains_crossed, 2);
        assert_eq!(report.cancelled, 0);
        assert_eq!(log.intervals_for(ActorRole::Car).len(), 8);
        assert_eq!(log.intervals_for(ActorRole::Train).len(), 2);
    }

    /// WHY: A closed crossing must release everyone waiting on it
    /// WHAT: A pre-cancelled run counts every actor as cancelled
    #[test]
    #[ntest::timeout(10000)]
    fn test_cancelled_run_counts_everyone() {
        let token = CancellationToken::new();
        token.cancel();

        let report =
            run(&quick_config(), Arc::new(NoopObserver), &token).expect("cancellation is not a failure");

        assert_eq!(report.cars_crossed + report.trains_crossed, 0);
        assert_eq!(report.cancelled, 10);
    }

    /// WHY: Intervals come from user settings and may be absurdly large
    /// WHAT: Huge arrival intervals delay later actors instead of overflowing
    #[test]
    #[ntest::timeout(10000)]
    fn test_huge_intervals_wait_until_cancelled() {
        let config = CrossingConfig {
            car_interval_ms: u64::MAX,
            train_interval_ms: u64::MAX,
            ..quick_config()
        };
        let token = CancellationToken::new();
        let canceller = token.clone();
        let closer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            canceller.cancel();
        });

        let report = run(&config, Arc::new(NoopObserver), &token).expect("cancellation is not a failure");
        closer.join().expect("closer should join");

        assert_eq!(report.cars_crossed, 1);
        assert_eq!(report.trains_crossed, 1);
        assert_eq!(report.cancelled, 8);
    }
}

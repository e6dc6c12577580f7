//! Runners race in legs; every leg starts only once all runners are on the
//! start line.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::{join_actors, SimulationResult};
use crate::barrier::PhaseBarrier;
use crate::cancel::CancellationToken;
use crate::errors::CoordinationResult;
use crate::events::{ActorId, EventObserver};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaceConfig {
    pub runners: usize,
    pub legs: usize,
    /// Running time of the fastest runner per leg.
    pub leg_ms: u64,
    /// Extra running time per runner index.
    pub stagger_ms: u64,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            runners: 5,
            legs: 1,
            leg_ms: 100,
            stagger_ms: 20,
        }
    }
}

impl RaceConfig {
    #[must_use]
    pub fn leg_time(&self, runner: usize) -> Duration {
        Duration::from_millis(
            self.leg_ms
                .saturating_add(self.stagger_ms.saturating_mul(runner as u64)),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RaceReport {
    pub runners: usize,
    pub phases_completed: u64,
    /// Leaders observed across all phases; one per phase.
    pub leaders: usize,
    pub elapsed: Duration,
}

/// Runs the race to completion.
///
/// # Errors
///
/// Any runner failing fails the race, cancellation included, since a leg
/// cannot start without a full field.
pub fn run(
    config: &RaceConfig,
    observer: Arc<dyn EventObserver>,
    token: &CancellationToken,
) -> SimulationResult<RaceReport> {
    let started = Instant::now();
    let start_line = PhaseBarrier::with_observer(config.runners.max(1), observer);

    let workers = (0..config.runners)
        .map(|index| {
            let runner = ActorId::runner(index);
            let start_line = start_line.clone();
            let token = token.clone();
            let config = *config;
            let handle = thread::spawn(move || -> CoordinationResult<usize> {
                let mut leaders = 0;
                for leg in 0..config.legs {
                    if start_line.arrive_with(runner, &token)?.is_leader() {
                        leaders += 1;
                    }
                    tracing::info!("{runner} started leg {leg}");
                    token.sleep(config.leg_time(index))?;
                    tracing::info!("{runner} finished leg {leg}");
                }
                Ok(leaders)
            });
            (runner, handle)
        })
        .collect();

    let mut leaders = 0;
    for (_, outcome) in join_actors(workers)? {
        leaders += outcome?;
    }

    tracing::info!("Race finished");
    Ok(RaceReport {
        runners: config.runners,
        phases_completed: start_line.phase(),
        leaders,
        elapsed: started.elapsed(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CoordinationError;
    use crate::events::{EventKind, EventLog, NoopObserver};
    use crate::simulations::SimulationError;

    /// WHY: Slower runners take longer per leg
    /// WHAT: Leg time grows by the stagger per runner index
    #[test]
    fn test_leg_time_staggers() {
        let config = RaceConfig::default();
        assert_eq!(config.leg_time(0), Duration::from_millis(100));
        assert_eq!(config.leg_time(4), Duration::from_millis(180));

        let slow = RaceConfig {
            leg_ms: u64::MAX - 10,
            stagger_ms: u64::MAX / 2,
            ..RaceConfig::default()
        };
        assert_eq!(slow.leg_time(3), Duration::from_millis(u64::MAX));
    }

    /// WHY: Every leg is one barrier phase with a single leader
    /// WHAT: Three legs of four runners produce three phases and three leaders
    #[test]
    #[ntest::timeout(10000)]
    fn test_race_runs_every_leg() {
        let log = Arc::new(EventLog::new());
        let config = RaceConfig {
            runners: 4,
            legs: 3,
            leg_ms: 5,
            stagger_ms: 2,
        };

        let report = run(&config, log.clone(), &CancellationToken::new()).expect("race should finish");

        assert_eq!(report.phases_completed, 3);
        assert_eq!(report.leaders, 3);
        assert_eq!(log.count(EventKind::Arrived, None), 12);
    }

    /// WHY: Cancelling a race must not leave runners parked at the line
    /// WHAT: A cancelled race returns Cancelled after joining every runner
    #[test]
    #[ntest::timeout(10000)]
    fn test_cancelled_race_fails() {
        let token = CancellationToken::new();
        token.cancel();

        let result = run(&RaceConfig::default(), Arc::new(NoopObserver), &token);

        assert!(matches!(
            result,
            Err(SimulationError::Coordination(CoordinationError::Cancelled))
        ));
    }
}

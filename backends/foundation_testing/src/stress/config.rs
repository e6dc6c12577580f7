//! Stress run configuration.

use core::time::Duration;

/// Configuration for a stress run against a coordination primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StressConfig {
    /// Number of actor threads to spawn
    actors: usize,
    /// Operations each actor performs
    rounds: usize,
    /// Optional wall-clock limit after which actors stop early
    duration: Option<Duration>,
    /// Hold every actor at a start line so the first round is contended
    synchronized_start: bool,
}

impl StressConfig {
    /// Creates a configuration with default values.
    ///
    /// Defaults:
    /// - `actors`: 8
    /// - `rounds`: 100
    /// - `duration`: None (no time limit)
    /// - `synchronized_start`: true
    #[must_use]
    pub const fn new() -> Self {
        Self {
            actors: 8,
            rounds: 100,
            duration: None,
            synchronized_start: true,
        }
    }

    #[must_use]
    pub const fn actors(mut self, count: usize) -> Self {
        self.actors = count;
        self
    }

    #[must_use]
    pub const fn rounds(mut self, count: usize) -> Self {
        self.rounds = count;
        self
    }

    /// Stops actors once `duration` has elapsed, even mid-way through
    /// their rounds.
    #[must_use]
    pub const fn duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    #[must_use]
    pub const fn staggered_start(mut self) -> Self {
        self.synchronized_start = false;
        self
    }

    #[must_use]
    pub const fn get_actors(&self) -> usize {
        self.actors
    }

    #[must_use]
    pub const fn get_rounds(&self) -> usize {
        self.rounds
    }

    #[must_use]
    pub const fn get_duration(&self) -> Option<Duration> {
        self.duration
    }

    #[must_use]
    pub const fn is_synchronized_start(&self) -> bool {
        self.synchronized_start
    }
}

impl Default for StressConfig {
    fn default() -> Self {
        Self::new()
    }
}

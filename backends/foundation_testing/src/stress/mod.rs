//! Stress harness for coordination primitives.
//!
//! Spawns one thread per actor, optionally holds them at a start line so the
//! first round is contended, and classifies each operation as completed,
//! aborted (an expected early exit such as cancellation) or failed.

use core::time::Duration;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex, PoisonError};
use std::thread;
use std::time::Instant;

pub mod config;

pub use config::StressConfig;

/// How a single stress operation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    /// The operation gave up as it is allowed to, e.g. on cancellation.
    Aborted,
    /// The operation broke a guarantee; the message describes how.
    Failed(String),
}

/// Result of a stress run.
#[derive(Debug, Clone)]
pub struct StressResult {
    pub completed: usize,
    pub aborted: usize,
    pub failed: usize,
    /// The first failure message, if any.
    pub first_failure: Option<String>,
    pub duration: Duration,
    pub actors: usize,
}

impl StressResult {
    #[must_use]
    pub const fn total_operations(&self) -> usize {
        self.completed + self.aborted + self.failed
    }

    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// Base stress harness.
pub struct StressHarness {
    config: StressConfig,
}

impl StressHarness {
    #[must_use]
    pub const fn new(config: StressConfig) -> Self {
        Self { config }
    }

    /// Runs `operation(actor, round)` for every actor and round.
    ///
    /// # Examples
    ///
    /// ```
    /// use foundation_testing::stress::{Outcome, StressConfig, StressHarness};
    /// use std::sync::atomic::{AtomicUsize, Ordering};
    /// use std::sync::Arc;
    ///
    /// let counter = Arc::new(AtomicUsize::new(0));
    /// let harness = StressHarness::new(StressConfig::new().actors(4).rounds(25));
    ///
    /// let counter_clone = Arc::clone(&counter);
    /// let result = harness.run(move |_actor, _round| {
    ///     counter_clone.fetch_add(1, Ordering::Relaxed);
    ///     Outcome::Completed
    /// });
    ///
    /// assert_eq!(counter.load(Ordering::Relaxed), 100);
    /// assert_eq!(result.completed, 100);
    /// assert!(result.is_clean());
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if any actor thread panics.
    pub fn run<F>(self, operation: F) -> StressResult
    where
        F: Fn(usize, usize) -> Outcome + Send + Sync + 'static,
    {
        let actors = self.config.get_actors();
        let rounds = self.config.get_rounds();
        let deadline = self.config.get_duration().and_then(|limit| Instant::now().checked_add(limit));
        let operation = Arc::new(operation);

        let completed = Arc::new(AtomicUsize::new(0));
        let aborted = Arc::new(AtomicUsize::new(0));
        let failures = Arc::new(Mutex::new(Vec::<String>::new()));
        let stop = Arc::new(AtomicBool::new(false));
        let start_line = self
            .config
            .is_synchronized_start()
            .then(|| Arc::new(Barrier::new(actors)));

        tracing::debug!("Stress run with {actors} actors x {rounds} rounds");
        let started = Instant::now();

        let handles: Vec<_> = (0..actors)
            .map(|actor| {
                let operation = Arc::clone(&operation);
                let completed = Arc::clone(&completed);
                let aborted = Arc::clone(&aborted);
                let failures = Arc::clone(&failures);
                let stop = Arc::clone(&stop);
                let start_line = start_line.clone();

                thread::spawn(move || {
                    if let Some(start_line) = start_line {
                        start_line.wait();
                    }

                    for round in 0..rounds {
                        if stop.load(Ordering::Acquire)
                            || deadline.is_some_and(|deadline| Instant::now() >= deadline)
                        {
                            stop.store(true, Ordering::Release);
                            break;
                        }

                        match operation(actor, round) {
                            Outcome::Completed => {
                                completed.fetch_add(1, Ordering::Relaxed);
                            }
                            Outcome::Aborted => {
                                aborted.fetch_add(1, Ordering::Relaxed);
                            }
                            Outcome::Failed(message) => {
                                tracing::error!("actor {actor} round {round} failed: {message}");
                                failures
                                    .lock()
                                    .unwrap_or_else(PoisonError::into_inner)
                                    .push(message);
                            }
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().expect("Actor panicked during stress run");
        }

        let failures = failures.lock().unwrap_or_else(PoisonError::into_inner);
        StressResult {
            completed: completed.load(Ordering::Relaxed),
            aborted: aborted.load(Ordering::Relaxed),
            failed: failures.len(),
            first_failure: failures.first().cloned(),
            duration: started.elapsed(),
            actors,
        }
    }
}

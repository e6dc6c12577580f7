//! Stress and invariant-checking tools for the coordination primitives.
//!
//! This crate provides:
//! - **Stress harness**: one thread per actor, contended start, outcome tally
//! - **Concurrency probe**: per-lane occupancy limits and lane exclusions
//! - **Intervals**: overlap checks over recorded admission intervals
//!
//! # Examples
//!
//! ```rust
//! use foundation_testing::{ConcurrencyProbe, Outcome, StressConfig, StressHarness};
//!
//! let probe = ConcurrencyProbe::new().limit("section", 8);
//! let harness = StressHarness::new(StressConfig::new().actors(4).rounds(50));
//!
//! let probe_clone = probe.clone();
//! let result = harness.run(move |_actor, _round| {
//!     let _inside = probe_clone.enter("section");
//!     Outcome::Completed
//! });
//!
//! assert_eq!(result.completed, 200);
//! assert!(probe.violations().is_empty());
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)] // Common for testing crates

pub mod intervals;
pub mod probe;
pub mod stress;

// Re-export commonly used items
pub use intervals::{first_overlap, peak_overlap, Span};
pub use probe::{ConcurrencyProbe, ProbeGuard};
pub use stress::{Outcome, StressConfig, StressHarness, StressResult};

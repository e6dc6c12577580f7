//! Occupancy probe for checking coordination invariants from the outside.
//!
//! Test actors enter a named lane right after a primitive admits them and
//! leave it right before they release. The probe tracks current and peak
//! occupancy per lane and records a violation whenever a lane exceeds its
//! limit or two lanes declared exclusive are occupied together.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default, Clone, Copy)]
struct LaneStats {
    current: usize,
    peak: usize,
    entries: usize,
}

#[derive(Debug, Default)]
struct ProbeState {
    lanes: HashMap<&'static str, LaneStats>,
    limits: HashMap<&'static str, usize>,
    exclusions: Vec<(&'static str, &'static str)>,
    violations: Vec<String>,
}

impl ProbeState {
    fn occupied(&self, lane: &str) -> bool {
        self.lanes.get(lane).is_some_and(|stats| stats.current > 0)
    }
}

/// `ConcurrencyProbe` records lane occupancy shared across actor threads.
///
/// # Examples
///
/// ```
/// use foundation_testing::ConcurrencyProbe;
///
/// let probe = ConcurrencyProbe::new().limit("pump", 2).exclusive("car", "train");
/// {
///     let _first = probe.enter("pump");
///     let _second = probe.enter("pump");
/// }
/// assert_eq!(probe.peak("pump"), 2);
/// assert!(probe.violations().is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConcurrencyProbe {
    state: Arc<Mutex<ProbeState>>,
}

impl ConcurrencyProbe {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps how many actors may occupy `lane` at once.
    #[must_use]
    pub fn limit(self, lane: &'static str, max: usize) -> Self {
        self.lock().limits.insert(lane, max);
        self
    }

    /// Declares that `first` and `second` must never be occupied together.
    #[must_use]
    pub fn exclusive(self, first: &'static str, second: &'static str) -> Self {
        self.lock().exclusions.push((first, second));
        self
    }

    /// Marks one actor inside `lane` until the guard drops.
    pub fn enter(&self, lane: &'static str) -> ProbeGuard {
        let mut state = self.lock();

        let conflicts: Vec<&'static str> = state
            .exclusions
            .iter()
            .filter_map(|&(first, second)| {
                if first == lane {
                    Some(second)
                } else if second == lane {
                    Some(first)
                } else {
                    None
                }
            })
            .filter(|other| state.occupied(other))
            .collect();
        for other in conflicts {
            state
                .violations
                .push(format!("{lane} entered while {other} was occupied"));
        }

        let stats = state.lanes.entry(lane).or_default();
        stats.current += 1;
        stats.entries += 1;
        stats.peak = stats.peak.max(stats.current);
        let current = stats.current;

        let limit = state.limits.get(lane).copied();
        if let Some(max) = limit {
            if current > max {
                state
                    .violations
                    .push(format!("{lane} holds {current} actors, limit is {max}"));
            }
        }

        ProbeGuard {
            probe: self.clone(),
            lane,
        }
    }

    #[must_use]
    pub fn current(&self, lane: &'static str) -> usize {
        self.lock().lanes.get(lane).map_or(0, |stats| stats.current)
    }

    #[must_use]
    pub fn peak(&self, lane: &'static str) -> usize {
        self.lock().lanes.get(lane).map_or(0, |stats| stats.peak)
    }

    /// Total number of times `lane` was entered.
    #[must_use]
    pub fn entries(&self, lane: &'static str) -> usize {
        self.lock().lanes.get(lane).map_or(0, |stats| stats.entries)
    }

    #[must_use]
    pub fn violations(&self) -> Vec<String> {
        self.lock().violations.clone()
    }

    fn leave(&self, lane: &'static str) {
        let mut state = self.lock();
        let left = state.lanes.get_mut(lane).is_some_and(|stats| {
            if stats.current == 0 {
                return false;
            }
            stats.current -= 1;
            true
        });
        if !left {
            state
                .violations
                .push(format!("{lane} left more often than entered"));
        }
    }

    fn lock(&self) -> MutexGuard<'_, ProbeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Occupancy of one lane; leaves the lane on drop.
#[must_use = "the lane is left as soon as the guard is dropped"]
pub struct ProbeGuard {
    probe: ConcurrencyProbe,
    lane: &'static str,
}

impl Drop for ProbeGuard {
    fn drop(&mut self) {
        self.probe.leave(self.lane);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_violation_is_recorded() {
        let probe = ConcurrencyProbe::new().limit("pump", 1);

        let first = probe.enter("pump");
        let second = probe.enter("pump");
        drop((first, second));

        assert_eq!(probe.peak("pump"), 2);
        assert_eq!(probe.current("pump"), 0);
        assert_eq!(probe.entries("pump"), 2);
        assert_eq!(probe.violations().len(), 1);
    }

    #[test]
    fn test_exclusive_lanes_conflict_both_ways() {
        let probe = ConcurrencyProbe::new().exclusive("car", "train");

        {
            let _car = probe.enter("car");
            let _train = probe.enter("train");
        }
        {
            let _train = probe.enter("train");
            let _car = probe.enter("car");
        }
        {
            let _car = probe.enter("car");
        }
        let _train = probe.enter("train");

        assert_eq!(probe.violations().len(), 2);
    }
}

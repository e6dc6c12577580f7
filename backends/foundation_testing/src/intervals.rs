//! Helpers for reasoning about recorded occupancy intervals.
//!
//! Intervals are half-open `[start, end)` ranges over any ordered clock,
//! usually event sequence numbers, so touching intervals do not overlap.

/// A half-open `[start, end)` stretch of occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Span {
    pub start: u64,
    pub end: u64,
}

impl Span {
    #[must_use]
    pub const fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Finds the first pair where a span of `left` overlaps a span of `right`.
#[must_use]
pub fn first_overlap(left: &[Span], right: &[Span]) -> Option<(Span, Span)> {
    left.iter()
        .flat_map(|a| right.iter().map(move |b| (*a, *b)))
        .find(|(a, b)| a.overlaps(b))
}

/// Largest number of spans covering a single instant.
#[must_use]
pub fn peak_overlap(spans: &[Span]) -> usize {
    let mut edges: Vec<(u64, i64)> = spans
        .iter()
        .flat_map(|span| [(span.start, 1), (span.end, -1)])
        .collect();
    // Ends sort before starts at the same instant.
    edges.sort_unstable();

    let mut current: i64 = 0;
    let mut peak: i64 = 0;
    for (_, delta) in edges {
        current += delta;
        peak = peak.max(current);
    }
    usize::try_from(peak).unwrap_or(0)
}

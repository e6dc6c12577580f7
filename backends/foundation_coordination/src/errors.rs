// region -- CoordinationError

pub type CoordinationResult<T> = core::result::Result<T, CoordinationError>;

/// Failures surfaced by the blocking operations of the coordination primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinationError {
    /// A blocked wait was aborted through its [`crate::CancellationToken`].
    Cancelled,

    /// A bounded wait ran out of time before it could complete.
    TimedOut,

    /// Internal state failed its consistency check. Never expected; tests
    /// assert that no operation returns it.
    InvariantViolation(&'static str),
}

// --- region: Custom methods

impl CoordinationError {
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    #[must_use]
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Self::InvariantViolation(_))
    }
}

// --- end region: Custom methods

// --- region: Error & Display boilerplate

impl std::error::Error for CoordinationError {}

impl core::fmt::Display for CoordinationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

// --- end region: Error & Display boilerplate

// --- end region: CoordinationError

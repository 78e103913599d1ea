// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use ::std::time::{
    Duration,
    Instant,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// An absolute point in monotonic time after which waiting is no longer useful, or "unreachable" when a wait is
/// unbounded. Deadlines are plain values: they are computed once, passed around by copy, and compared against the
/// clock at every suspension point.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Deadline(Option<Instant>);

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl Deadline {
    /// Creates a deadline that never passes.
    pub fn unreachable() -> Self {
        Self(None)
    }

    /// Creates a deadline at the given point in time.
    pub fn at(time_point: Instant) -> Self {
        Self(Some(time_point))
    }

    /// Creates a deadline that passes after `duration` from now.
    pub fn from_duration(duration: Duration) -> Self {
        Self::at(Instant::now() + duration)
    }

    /// Checks whether this deadline can ever pass.
    pub fn is_reachable(&self) -> bool {
        self.0.is_some()
    }

    /// Returns the underlying time point, unless the deadline is unreachable.
    pub fn time_point(&self) -> Option<Instant> {
        self.0
    }

    /// Checks whether this deadline has already passed.
    pub fn passed(&self) -> bool {
        match self.0 {
            Some(time_point) => time_point <= Instant::now(),
            None => false,
        }
    }

    /// Returns the sooner of two deadlines. An unreachable deadline never wins.
    pub fn earliest(self, other: Deadline) -> Deadline {
        match (self.0, other.0) {
            (Some(a), Some(b)) => Deadline(Some(a.min(b))),
            (Some(a), None) => Deadline(Some(a)),
            (None, b) => Deadline(b),
        }
    }

    /// Returns the time remaining until this deadline, if it is reachable. Saturates to zero once passed.
    pub fn time_left(&self) -> Option<Duration> {
        self.0.map(|time_point| time_point.saturating_duration_since(Instant::now()))
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================

#[cfg(test)]
mod tests {
    use super::Deadline;
    use ::anyhow::Result;
    use ::std::time::{
        Duration,
        Instant,
    };

    #[test]
    fn unreachable_deadline_never_passes() -> Result<()> {
        let deadline: Deadline = Deadline::unreachable();
        crate::ensure_eq!(deadline.is_reachable(), false);
        crate::ensure_eq!(deadline.passed(), false);
        crate::ensure_eq!(deadline.time_point(), None);
        Ok(())
    }

    #[test]
    fn deadline_in_the_past_has_passed() -> Result<()> {
        let deadline: Deadline = Deadline::at(Instant::now() - Duration::from_millis(1));
        crate::ensure_eq!(deadline.is_reachable(), true);
        crate::ensure_eq!(deadline.passed(), true);
        Ok(())
    }

    #[test]
    fn earliest_picks_the_sooner_deadline() -> Result<()> {
        let now: Instant = Instant::now();
        let sooner: Deadline = Deadline::at(now + Duration::from_secs(1));
        let later: Deadline = Deadline::at(now + Duration::from_secs(2));
        crate::ensure_eq!(sooner.earliest(later), sooner);
        crate::ensure_eq!(later.earliest(sooner), sooner);
        Ok(())
    }

    #[test]
    fn earliest_ignores_unreachable_deadlines() -> Result<()> {
        let reachable: Deadline = Deadline::from_duration(Duration::from_secs(1));
        let unreachable: Deadline = Deadline::unreachable();
        crate::ensure_eq!(reachable.earliest(unreachable), reachable);
        crate::ensure_eq!(unreachable.earliest(reachable), reachable);
        crate::ensure_eq!(unreachable.earliest(unreachable), unreachable);
        Ok(())
    }
}

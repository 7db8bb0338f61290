//! Simulation clock and per-step memoization.
//!
//! The clock mirrors the engine's time. It has a single writer, the step
//! loop, which calls [`SimulationClock::sync`] once after every engine step.
//! Everything else reads it.
//!
//! # Design Principles
//!
//! - Time never moves backwards; a regressing engine time is an error.
//! - The step counter uses checked arithmetic (no silent overflow).
//! - Values derived from engine state are cached for at most one step via
//!   [`StepCache`], keyed by the time they were computed at.

use phasebridge_types::SimTime;

/// Errors that can occur during clock operations.
#[derive(Debug, thiserror::Error)]
pub enum ClockError {
    /// The engine reported a time earlier than the last synchronised time.
    #[error("simulated time went backwards: {current} -> {requested}")]
    TimeWentBackwards {
        /// Time the clock was at.
        current: SimTime,
        /// Time the engine reported.
        requested: SimTime,
    },

    /// Step counter would overflow.
    #[error("step counter overflow: cannot advance beyond u64::MAX")]
    StepOverflow,
}

/// Clock tracking the simulation's current time and step count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulationClock {
    /// Time of the most recent engine step.
    now: SimTime,

    /// Number of engine steps synchronised so far.
    step: u64,
}

impl SimulationClock {
    /// Create a clock at time zero, step zero.
    pub const fn new() -> Self {
        Self {
            now: SimTime::ZERO,
            step: 0,
        }
    }

    /// Record that the engine has completed a step and is now at `time`.
    /// Returns the new step number.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::TimeWentBackwards`] if `time` is earlier than
    /// the current time, or [`ClockError::StepOverflow`] if the step counter
    /// would exceed `u64::MAX`.
    pub fn sync(&mut self, time: SimTime) -> Result<u64, ClockError> {
        if time < self.now {
            return Err(ClockError::TimeWentBackwards {
                current: self.now,
                requested: time,
            });
        }
        self.step = self.step.checked_add(1).ok_or(ClockError::StepOverflow)?;
        self.now = time;
        Ok(self.step)
    }

    /// Current simulated time.
    pub const fn now(&self) -> SimTime {
        self.now
    }

    /// Number of engine steps synchronised so far.
    pub const fn step(&self) -> u64 {
        self.step
    }

    /// Return to time zero for a new session.
    pub const fn reset(&mut self) {
        self.now = SimTime::ZERO;
        self.step = 0;
    }
}

/// A value derived from engine state, valid only at the simulated time it
/// was computed at.
///
/// Reading the cache at a different time behaves as if it were empty, so
/// stale values can never leak across steps.
#[derive(Debug, Clone)]
pub struct StepCache<T> {
    entry: Option<(SimTime, T)>,
}

impl<T> Default for StepCache<T> {
    fn default() -> Self {
        Self { entry: None }
    }
}

impl<T> StepCache<T> {
    /// An empty cache.
    pub const fn new() -> Self {
        Self { entry: None }
    }

    /// The cached value, if it was computed at `now`.
    pub fn get(&self, now: SimTime) -> Option<&T> {
        match &self.entry {
            Some((at, value)) if *at == now => Some(value),
            _ => None,
        }
    }

    /// The cached value for `now`, computing and storing it with `compute`
    /// when the cache is empty or stale.
    ///
    /// # Errors
    ///
    /// Propagates the error of `compute`; the cache is left empty.
    pub fn get_or_try_insert_with<E>(
        &mut self,
        now: SimTime,
        compute: impl FnOnce() -> Result<T, E>,
    ) -> Result<&T, E> {
        let entry = match self.entry.take() {
            Some((at, value)) if at == now => (at, value),
            _ => (now, compute()?),
        };
        Ok(&self.entry.insert(entry).1)
    }

    /// Drop the cached value.
    pub fn invalidate(&mut self) {
        self.entry = None;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn t(secs: rust_decimal::Decimal) -> SimTime {
        SimTime::from_secs(secs)
    }

    #[test]
    fn clock_starts_at_zero() {
        let clock = SimulationClock::new();
        assert_eq!(clock.now(), SimTime::ZERO);
        assert_eq!(clock.step(), 0);
    }

    #[test]
    fn sync_advances_time_and_step() {
        let mut clock = SimulationClock::new();
        assert_eq!(clock.sync(t(dec!(0.1))).unwrap(), 1);
        assert_eq!(clock.sync(t(dec!(0.2))).unwrap(), 2);
        assert_eq!(clock.now(), t(dec!(0.2)));
    }

    #[test]
    fn sync_accepts_same_time() {
        let mut clock = SimulationClock::new();
        clock.sync(t(dec!(1))).unwrap();
        assert!(clock.sync(t(dec!(1))).is_ok());
    }

    #[test]
    fn sync_rejects_time_going_backwards() {
        let mut clock = SimulationClock::new();
        clock.sync(t(dec!(5))).unwrap();
        let err = clock.sync(t(dec!(4.9))).unwrap_err();
        assert!(matches!(err, ClockError::TimeWentBackwards { .. }));
        assert_eq!(clock.now(), t(dec!(5)));
        assert_eq!(clock.step(), 1);
    }

    #[test]
    fn reset_returns_to_zero() {
        let mut clock = SimulationClock::new();
        clock.sync(t(dec!(12))).unwrap();
        clock.reset();
        assert_eq!(clock, SimulationClock::new());
    }

    #[test]
    fn step_cache_computes_once_per_time() {
        let mut cache = StepCache::new();
        let mut calls = 0_u32;
        for _ in 0..3 {
            let value = cache
                .get_or_try_insert_with(t(dec!(1)), || {
                    calls = calls.saturating_add(1);
                    Ok::<_, ()>(42)
                })
                .unwrap();
            assert_eq!(*value, 42);
        }
        assert_eq!(calls, 1);
    }

    #[test]
    fn step_cache_goes_stale_when_time_moves() {
        let mut cache = StepCache::new();
        cache
            .get_or_try_insert_with(t(dec!(1)), || Ok::<_, ()>("first"))
            .unwrap();
        assert_eq!(cache.get(t(dec!(1))), Some(&"first"));
        assert_eq!(cache.get(t(dec!(2))), None);
        let value = cache
            .get_or_try_insert_with(t(dec!(2)), || Ok::<_, ()>("second"))
            .unwrap();
        assert_eq!(*value, "second");
    }

    #[test]
    fn step_cache_stays_empty_on_error() {
        let mut cache: StepCache<u8> = StepCache::new();
        let result = cache.get_or_try_insert_with(t(dec!(1)), || Err("engine down"));
        assert_eq!(result, Err("engine down"));
        assert_eq!(cache.get(t(dec!(1))), None);
        cache.invalidate();
    }
}

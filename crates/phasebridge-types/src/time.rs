//! Simulated time.
//!
//! The engine advances in fixed steps of (usually) fractional seconds.
//! Floating-point accumulation would drift the scheduler off the step grid,
//! so simulated time is a fixed-point [`Decimal`] number of seconds.

use core::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Decimal places kept when a scheduled time is re-armed.
pub const SIM_TIME_DECIMALS: u32 = 3;

/// A point on the simulation timeline, in seconds since the session began.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[serde(transparent)]
#[ts(export, export_to = "bindings/")]
pub struct SimTime(#[ts(as = "String")] Decimal);

impl SimTime {
    /// The start of the session.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// A time point `secs` seconds into the session.
    pub const fn from_secs(secs: Decimal) -> Self {
        Self(secs)
    }

    /// Seconds since the session began.
    pub const fn secs(self) -> Decimal {
        self.0
    }

    /// The time `duration` seconds later, or `None` on overflow.
    pub fn checked_add(self, duration: Decimal) -> Option<Self> {
        self.0.checked_add(duration).map(Self)
    }

    /// Seconds elapsed from `earlier` to `self`, or `None` on overflow.
    ///
    /// The result is negative when `earlier` is actually later.
    pub fn checked_since(self, earlier: Self) -> Option<Decimal> {
        self.0.checked_sub(earlier.0)
    }

    /// This time rounded to [`SIM_TIME_DECIMALS`] places.
    pub fn rounded(self) -> Self {
        Self(self.0.round_dp(SIM_TIME_DECIMALS))
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0.normalize())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn rounding_keeps_three_places() {
        let t = SimTime::from_secs(dec!(10.00049));
        assert_eq!(t.rounded(), SimTime::from_secs(dec!(10.000)));
        let t = SimTime::from_secs(dec!(0.1) + dec!(0.2));
        assert_eq!(t.rounded().secs(), dec!(0.3));
    }

    #[test]
    fn since_is_signed() {
        let a = SimTime::from_secs(dec!(4.5));
        let b = SimTime::from_secs(dec!(6));
        assert_eq!(b.checked_since(a), Some(dec!(1.5)));
        assert_eq!(a.checked_since(b), Some(dec!(-1.5)));
    }

    #[test]
    fn display_is_normalized() {
        assert_eq!(SimTime::from_secs(dec!(12.500)).to_string(), "12.5s");
        assert_eq!(SimTime::ZERO.to_string(), "0s");
    }
}

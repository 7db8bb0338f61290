//! Signal program representations.
//!
//! Two views of the same traffic light:
//!
//! - the engine view: a [`ProgramLogic`] is an ordered list of
//!   [`RawSubphase`]s, each a [`SignalState`] (one colour per connection)
//!   held for a duration;
//! - the canonical view: ordered [`CanonicalPhase`]s, each a set of
//!   movements with a green / yellow / all-red [`PhaseTiming`].

use std::collections::BTreeSet;

use core::fmt;
use core::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{LightColor, Movement};
use crate::ids::{ConnectionIndex, ProgramId};

// ---------------------------------------------------------------------------
// Engine view
// ---------------------------------------------------------------------------

/// Error returned when a signal state string contains a character that is
/// not a light colour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidSignalState {
    /// The offending state string.
    pub state: String,
    /// Character position of the first invalid colour.
    pub position: usize,
}

impl fmt::Display for InvalidSignalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid signal state {:?}: unknown colour at position {}",
            self.state, self.position
        )
    }
}

impl std::error::Error for InvalidSignalState {}

/// Colours shown to every connection of a traffic light at one instant.
///
/// Position `i` is the colour of [`ConnectionIndex`] `i`. Serialized in the
/// engine's string form (`"GGrryy"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SignalState(Vec<LightColor>);

impl SignalState {
    /// A state of `width` connections, all red.
    pub fn all_red(width: usize) -> Self {
        Self(vec![LightColor::Red; width])
    }

    /// A state of `width` connections where connections in `active` show
    /// `color` and all others are red.
    pub fn with_active(width: usize, active: &BTreeSet<ConnectionIndex>, color: LightColor) -> Self {
        Self(
            (0..width)
                .map(|i| {
                    if active.iter().any(|c| c.as_usize() == i) {
                        color
                    } else {
                        LightColor::Red
                    }
                })
                .collect(),
        )
    }

    /// Number of connections covered by this state.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the state covers no connection at all.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Colour of one connection, if the state covers it.
    pub fn color(&self, connection: ConnectionIndex) -> Option<LightColor> {
        self.0.get(connection.as_usize()).copied()
    }

    /// Whether any connection shows `color`.
    pub fn contains(&self, color: LightColor) -> bool {
        self.0.contains(&color)
    }

    /// Connections that are not red (green or yellow).
    pub fn released_connections(&self) -> BTreeSet<ConnectionIndex> {
        self.0
            .iter()
            .enumerate()
            .filter(|(_, color)| **color != LightColor::Red)
            .filter_map(|(i, _)| u16::try_from(i).ok().map(ConnectionIndex))
            .collect()
    }

    /// Colours in connection order.
    pub fn colors(&self) -> &[LightColor] {
        &self.0
    }
}

impl FromStr for SignalState {
    type Err = InvalidSignalState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.chars()
            .enumerate()
            .map(|(position, c)| {
                LightColor::from_char(c).ok_or_else(|| InvalidSignalState {
                    state: s.to_owned(),
                    position,
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

impl TryFrom<String> for SignalState {
    type Error = InvalidSignalState;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SignalState> for String {
    fn from(state: SignalState) -> Self {
        state.to_string()
    }
}

impl fmt::Display for SignalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.iter().try_for_each(|c| write!(f, "{}", c.as_char()))
    }
}

/// One engine subphase: a signal state held for `duration` seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct RawSubphase {
    /// Colours shown during the subphase.
    #[ts(as = "String")]
    pub state: SignalState,
    /// How long the state is held, in seconds.
    #[ts(as = "String")]
    pub duration: Decimal,
}

impl RawSubphase {
    /// Construct a subphase.
    pub const fn new(state: SignalState, duration: Decimal) -> Self {
        Self { state, duration }
    }
}

/// A complete signal program as the engine stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ProgramLogic {
    /// Engine program id.
    pub program_id: ProgramId,
    /// Subphases in execution order; the program cycles through them.
    pub subphases: Vec<RawSubphase>,
}

impl ProgramLogic {
    /// Sum of all subphase durations, or `None` on overflow.
    pub fn cycle_length(&self) -> Option<Decimal> {
        self.subphases
            .iter()
            .try_fold(Decimal::ZERO, |acc, s| acc.checked_add(s.duration))
    }
}

// ---------------------------------------------------------------------------
// Canonical view
// ---------------------------------------------------------------------------

/// Error returned when two incomplete timings cannot be merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingMergeError {
    /// The slot that neither timing provides.
    pub missing: LightColor,
}

impl fmt::Display for TimingMergeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "neither timing provides a {:?} interval", self.missing)
    }
}

impl std::error::Error for TimingMergeError {}

/// Green, yellow, and all-red durations of one canonical phase, each
/// possibly not yet known while a program is being reconstructed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct PhaseTiming {
    /// Green interval in seconds.
    #[ts(as = "Option<String>")]
    pub green: Option<Decimal>,
    /// Yellow interval in seconds.
    #[ts(as = "Option<String>")]
    pub yellow: Option<Decimal>,
    /// All-red clearance in seconds.
    #[ts(as = "Option<String>")]
    pub all_red: Option<Decimal>,
}

impl PhaseTiming {
    /// A timing with only the slot matching `status` set.
    pub fn arbitrary_init(duration: Decimal, status: LightColor) -> Self {
        let mut timing = Self::default();
        timing.set(status, duration);
        timing
    }

    /// Set the slot matching `status`.
    pub const fn set(&mut self, status: LightColor, duration: Decimal) {
        match status {
            LightColor::Green => self.green = Some(duration),
            LightColor::Yellow => self.yellow = Some(duration),
            LightColor::Red => self.all_red = Some(duration),
        }
    }

    /// Whether both green and yellow are known.
    pub const fn is_complete(&self) -> bool {
        self.green.is_some() && self.yellow.is_some()
    }

    /// Fill this timing's missing green (or, failing that, its missing
    /// yellow) from `other`, and adopt `other`'s all-red if this one has
    /// none.
    ///
    /// Fails without modifying `self` when `other` lacks the slot needed.
    pub fn integrate_instance(&mut self, other: &Self) -> Result<(), TimingMergeError> {
        if self.green.is_none() {
            self.green = Some(other.green.ok_or(TimingMergeError {
                missing: LightColor::Green,
            })?);
        } else if self.yellow.is_none() {
            self.yellow = Some(other.yellow.ok_or(TimingMergeError {
                missing: LightColor::Yellow,
            })?);
        }
        if self.all_red.is_none() {
            self.all_red = other.all_red;
        }
        Ok(())
    }

    /// Default a missing all-red to zero.
    #[must_use]
    pub fn with_all_red_default(mut self) -> Self {
        self.all_red.get_or_insert(Decimal::ZERO);
        self
    }

    /// Green + yellow + all-red, treating missing slots as zero.
    pub fn total(&self) -> Option<Decimal> {
        [self.green, self.yellow, self.all_red]
            .into_iter()
            .flatten()
            .try_fold(Decimal::ZERO, Decimal::checked_add)
    }
}

/// One phase of a canonical, movement-oriented signal timing plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct CanonicalPhase {
    /// Position in the cycle, starting at 1.
    pub order: u32,
    /// Movements released (green then yellow) during this phase.
    #[ts(as = "Vec<String>")]
    pub movements: BTreeSet<Movement>,
    /// Interval durations.
    pub timing: PhaseTiming,
}

/// Cycle length of a canonical plan: the sum of every phase's timing.
pub fn cycle_length(phases: &[CanonicalPhase]) -> Option<Decimal> {
    phases
        .iter()
        .try_fold(Decimal::ZERO, |acc, p| acc.checked_add(p.timing.total()?))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn signal_state_parses_any_case_and_renders_canonically() {
        let state: SignalState = "GgyYrR".parse().unwrap();
        assert_eq!(state.len(), 6);
        assert_eq!(state.to_string(), "GGyyrr");
        assert_eq!(
            state.released_connections(),
            [0, 1, 2, 3].into_iter().map(ConnectionIndex).collect()
        );
    }

    #[test]
    fn signal_state_rejects_unknown_colours() {
        let err = "GGoR".parse::<SignalState>().unwrap_err();
        assert_eq!(err.position, 2);
    }

    #[test]
    fn signal_state_serializes_as_string() {
        let state: SignalState = "Gyr".parse().unwrap();
        let json = serde_json::to_string(&state).unwrap();
        assert_eq!(json, "\"Gyr\"");
        let back: SignalState = serde_json::from_str("\"gYR\"").unwrap();
        assert_eq!(back, state);
        assert!(serde_json::from_str::<SignalState>("\"Gx\"").is_err());
    }

    #[test]
    fn with_active_marks_only_listed_connections() {
        let active = [1, 3].into_iter().map(ConnectionIndex).collect();
        let state = SignalState::with_active(5, &active, LightColor::Yellow);
        assert_eq!(state.to_string(), "ryryr");
        assert_eq!(SignalState::all_red(3).to_string(), "rrr");
    }

    #[test]
    fn integrate_fills_green_from_other() {
        let mut trailing = PhaseTiming::arbitrary_init(dec!(3), LightColor::Yellow);
        let leading = PhaseTiming {
            green: Some(dec!(30)),
            yellow: None,
            all_red: Some(dec!(2)),
        };
        trailing.integrate_instance(&leading).unwrap();
        assert_eq!(trailing.green, Some(dec!(30)));
        assert_eq!(trailing.yellow, Some(dec!(3)));
        assert_eq!(trailing.all_red, Some(dec!(2)));
    }

    #[test]
    fn integrate_fills_yellow_when_green_present() {
        let mut last = PhaseTiming::arbitrary_init(dec!(27), LightColor::Green);
        let first = PhaseTiming::arbitrary_init(dec!(3), LightColor::Yellow);
        last.integrate_instance(&first).unwrap();
        assert!(last.is_complete());
        assert_eq!(last.all_red, None);
    }

    #[test]
    fn integrate_fails_when_other_lacks_slot() {
        let mut last = PhaseTiming::arbitrary_init(dec!(27), LightColor::Green);
        let first = PhaseTiming::arbitrary_init(dec!(2), LightColor::Red);
        let err = last.integrate_instance(&first).unwrap_err();
        assert_eq!(err.missing, LightColor::Yellow);
        assert_eq!(last.yellow, None);
        assert_eq!(last.all_red, None);
    }

    #[test]
    fn existing_all_red_is_kept_on_merge() {
        let mut last = PhaseTiming {
            green: Some(dec!(20)),
            yellow: None,
            all_red: Some(dec!(1)),
        };
        let first = PhaseTiming {
            green: None,
            yellow: Some(dec!(3)),
            all_red: Some(dec!(4)),
        };
        last.integrate_instance(&first).unwrap();
        assert_eq!(last.all_red, Some(dec!(1)));
    }

    #[test]
    fn cycle_length_sums_all_slots() {
        let phases = vec![
            CanonicalPhase {
                order: 1,
                movements: BTreeSet::new(),
                timing: PhaseTiming {
                    green: Some(dec!(30)),
                    yellow: Some(dec!(3)),
                    all_red: Some(dec!(2)),
                },
            },
            CanonicalPhase {
                order: 2,
                movements: BTreeSet::new(),
                timing: PhaseTiming::arbitrary_init(dec!(25), LightColor::Green)
                    .with_all_red_default(),
            },
        ];
        assert_eq!(cycle_length(&phases), Some(dec!(60)));
    }
}

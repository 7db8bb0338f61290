//! Reconstruction of canonical phases from an engine signal program.
//!
//! An engine program is a flat cycle of subphases: typically a green
//! subphase, then its yellow, then an optional all-red, for each phase. The
//! extractor walks the cycle once, opening a new phase at every green
//! subphase and attaching yellow and red subphases to the phase before them.
//!
//! Programs do not always start with a green subphase. When the cycle opens
//! on the yellow or all-red tail of the last phase, that leading fragment is
//! merged into the last phase, so the result always consists of complete
//! phases.

use std::collections::BTreeSet;

use phasebridge_types::{ConnectionIndex, LightColor, PhaseTiming, RawSubphase, SignalState};

use crate::error::ExtractError;

/// Colours that classify a subphase, highest priority first. A subphase
/// showing none of them is red (all-red clearance).
///
/// Yellow wins over green: a subphase where some connections turn yellow
/// while others stay green ends the running phase.
pub const STATUS_PRIORITY: [LightColor; 2] = [LightColor::Yellow, LightColor::Green];

/// Classify a subphase by the colours it shows.
pub fn classify(state: &SignalState) -> LightColor {
    STATUS_PRIORITY
        .into_iter()
        .find(|color| state.contains(*color))
        .unwrap_or(LightColor::Red)
}

/// One reconstructed phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPhase {
    /// Interval durations, all-red defaulted to zero.
    pub timing: PhaseTiming,
    /// Connections not red during the phase's opening subphase.
    pub connections: BTreeSet<ConnectionIndex>,
    /// Indices of the subphases making up this phase. Leading subphases
    /// merged into the last phase come after its own.
    pub subphases: Vec<usize>,
}

impl ExtractedPhase {
    fn open(index: usize, subphase: &RawSubphase, status: LightColor) -> Self {
        Self {
            timing: PhaseTiming::arbitrary_init(subphase.duration, status),
            connections: subphase.state.released_connections(),
            subphases: vec![index],
        }
    }
}

/// Group `subphases` into complete canonical phases, in cycle order.
///
/// # Errors
///
/// Returns [`ExtractError::Empty`] for an empty program, and
/// [`ExtractError::NoAnchorPhase`] or [`ExtractError::Merge`] when a leading
/// fragment cannot be merged into a complete last phase, and
/// [`ExtractError::IncompletePhase`] when any other phase lacks its green or
/// yellow.
pub fn extract(subphases: &[RawSubphase]) -> Result<Vec<ExtractedPhase>, ExtractError> {
    let mut iter = subphases.iter().enumerate();
    let Some((first_index, first)) = iter.next() else {
        return Err(ExtractError::Empty);
    };
    let mut phases = vec![ExtractedPhase::open(first_index, first, classify(&first.state))];

    for (index, subphase) in iter {
        let status = classify(&subphase.state);
        if status == LightColor::Green {
            phases.push(ExtractedPhase::open(index, subphase, status));
        } else if let Some(current) = phases.last_mut() {
            current.timing.set(status, subphase.duration);
            current.subphases.push(index);
        }
    }

    let leading_incomplete = phases.first().is_some_and(|p| !p.timing.is_complete());
    if leading_incomplete {
        let leading = phases.remove(0);
        let last = phases.last_mut().ok_or(ExtractError::NoAnchorPhase)?;
        last.timing.integrate_instance(&leading.timing)?;
        last.subphases.extend(leading.subphases);
    }

    let incomplete = phases
        .iter()
        .enumerate()
        .find(|(_, phase)| !phase.timing.is_complete());
    if let Some((position, phase)) = incomplete {
        return Err(ExtractError::IncompletePhase {
            order: position.saturating_add(1),
            missing: if phase.timing.green.is_none() { "green" } else { "yellow" },
        });
    }

    for phase in &mut phases {
        phase.timing = phase.timing.with_all_red_default();
    }
    Ok(phases)
}

/// Position of the phase owning subphase `index`.
pub fn phase_of_subphase(phases: &[ExtractedPhase], index: usize) -> Option<usize> {
    phases.iter().position(|p| p.subphases.contains(&index))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use super::*;

    fn sub(state: &str, duration: Decimal) -> RawSubphase {
        RawSubphase::new(state.parse().unwrap(), duration)
    }

    fn timing(green: Decimal, yellow: Decimal, all_red: Decimal) -> PhaseTiming {
        PhaseTiming {
            green: Some(green),
            yellow: Some(yellow),
            all_red: Some(all_red),
        }
    }

    fn conns(indices: &[u16]) -> BTreeSet<ConnectionIndex> {
        indices.iter().copied().map(ConnectionIndex).collect()
    }

    #[test]
    fn classification_prefers_yellow() {
        assert_eq!(classify(&"GGyr".parse().unwrap()), LightColor::Yellow);
        assert_eq!(classify(&"GGrr".parse().unwrap()), LightColor::Green);
        assert_eq!(classify(&"rrrr".parse().unwrap()), LightColor::Red);
        assert_eq!(classify(&"gyrr".parse().unwrap()), LightColor::Yellow);
    }

    #[test]
    fn green_first_program() {
        let program = [
            sub("GGrr", dec!(30)),
            sub("yyrr", dec!(3)),
            sub("rrrr", dec!(2)),
            sub("rrGG", dec!(25)),
            sub("rryy", dec!(3)),
        ];
        let phases = extract(&program).unwrap();
        assert_eq!(phases.len(), 2);
        assert_eq!(phases[0].timing, timing(dec!(30), dec!(3), dec!(2)));
        assert_eq!(phases[0].connections, conns(&[0, 1]));
        assert_eq!(phases[0].subphases, vec![0, 1, 2]);
        assert_eq!(phases[1].timing, timing(dec!(25), dec!(3), dec!(0)));
        assert_eq!(phases[1].connections, conns(&[2, 3]));
    }

    #[test]
    fn phase_count_matches_green_count() {
        let program = [
            sub("Grrr", dec!(10)),
            sub("yrrr", dec!(3)),
            sub("rGrr", dec!(10)),
            sub("ryrr", dec!(3)),
            sub("rrGr", dec!(10)),
            sub("rryr", dec!(3)),
            sub("rrrG", dec!(10)),
            sub("rrry", dec!(3)),
        ];
        assert_eq!(extract(&program).unwrap().len(), 4);
    }

    #[test]
    fn leading_yellow_merges_into_last_phase() {
        let program = [
            sub("yyrr", dec!(3)),
            sub("rrrr", dec!(2)),
            sub("rrGG", dec!(25)),
            sub("rryy", dec!(4)),
            sub("GGrr", dec!(30)),
        ];
        let phases = extract(&program).unwrap();
        assert_eq!(phases.len(), 2);
        assert_eq!(phases[0].timing, timing(dec!(25), dec!(4), dec!(0)));
        // The last phase has only its green; yellow and all-red come from
        // the leading fragment.
        assert_eq!(phases[1].timing, timing(dec!(30), dec!(3), dec!(2)));
        assert_eq!(phases[1].connections, conns(&[0, 1]));
        assert_eq!(phases[1].subphases, vec![4, 0, 1]);
    }

    #[test]
    fn leading_red_keeps_last_phase_all_red() {
        let program = [
            sub("rrrr", dec!(1)),
            sub("GGrr", dec!(20)),
            sub("yyrr", dec!(3)),
            sub("rrGG", dec!(20)),
            sub("rryy", dec!(3)),
            sub("rrrr", dec!(2)),
        ];
        let phases = extract(&program).unwrap();
        assert_eq!(phases.len(), 2);
        // The trailing all-red is kept; the leading one is not added.
        assert_eq!(phases[1].timing, timing(dec!(20), dec!(3), dec!(2)));
        assert_eq!(phases[1].subphases, vec![3, 4, 5, 0]);
    }

    #[test]
    fn leading_green_without_yellow_is_absorbed() {
        // A green immediately followed by another green never completes;
        // the last phase is already complete and keeps its own timing.
        let program = [
            sub("GGrr", dec!(20)),
            sub("rrGG", dec!(20)),
            sub("rryy", dec!(3)),
        ];
        let phases = extract(&program).unwrap();
        assert_eq!(phases.len(), 1);
        assert_eq!(phases[0].timing, timing(dec!(20), dec!(3), dec!(0)));
        assert_eq!(phases[0].subphases, vec![1, 2, 0]);
    }

    #[test]
    fn unmergeable_fragment_fails() {
        // Neither the leading all-red nor the last phase has a yellow.
        let program = [sub("rrrr", dec!(2)), sub("GGrr", dec!(20))];
        assert!(matches!(extract(&program), Err(ExtractError::Merge { .. })));
    }

    #[test]
    fn phase_without_yellow_fails() {
        // The second phase runs straight into the third without a yellow.
        let program = [
            sub("GGrr", dec!(20)),
            sub("yyrr", dec!(3)),
            sub("rrGr", dec!(10)),
            sub("rrGG", dec!(15)),
            sub("rryy", dec!(3)),
        ];
        assert_eq!(
            extract(&program),
            Err(ExtractError::IncompletePhase {
                order: 2,
                missing: "yellow",
            })
        );
    }

    #[test]
    fn trailing_green_without_yellow_fails() {
        let program = [
            sub("GGrr", dec!(20)),
            sub("yyrr", dec!(3)),
            sub("rrGG", dec!(15)),
        ];
        assert_eq!(
            extract(&program),
            Err(ExtractError::IncompletePhase {
                order: 2,
                missing: "yellow",
            })
        );
    }

    #[test]
    fn program_without_green_fails() {
        let program = [sub("yyrr", dec!(3)), sub("rrrr", dec!(2))];
        assert_eq!(extract(&program), Err(ExtractError::NoAnchorPhase));
        assert_eq!(extract(&[]), Err(ExtractError::Empty));
    }

    #[test]
    fn trailing_all_red_stays_with_its_phase() {
        let program = [
            sub("GGrr", dec!(20)),
            sub("yyrr", dec!(3)),
            sub("rrGG", dec!(15)),
            sub("rrYY", dec!(3)),
            sub("rrrr", dec!(2)),
        ];
        let phases = extract(&program).unwrap();
        assert_eq!(phases.len(), 2);
        assert_eq!(phases[0].timing, timing(dec!(20), dec!(3), dec!(0)));
        assert_eq!(phases[1].timing, timing(dec!(15), dec!(3), dec!(2)));
        assert_eq!(phases[1].connections, conns(&[2, 3]));
    }

    #[test]
    fn leading_all_red_wraps_onto_last_phase() {
        let program = [
            sub("rrrr", dec!(2)),
            sub("rrGG", dec!(15)),
            sub("rrYY", dec!(3)),
            sub("GGrr", dec!(20)),
            sub("yyrr", dec!(3)),
        ];
        let phases = extract(&program).unwrap();
        assert_eq!(phases.len(), 2);
        assert_eq!(phases[0].timing, timing(dec!(15), dec!(3), dec!(0)));
        assert_eq!(phases[1].timing, timing(dec!(20), dec!(3), dec!(2)));
        assert_eq!(phases[1].connections, conns(&[0, 1]));
    }

    #[test]
    fn subphase_ownership_lookup() {
        let program = [
            sub("yyrr", dec!(3)),
            sub("rrGG", dec!(25)),
            sub("rryy", dec!(4)),
            sub("GGrr", dec!(30)),
        ];
        let phases = extract(&program).unwrap();
        assert_eq!(phase_of_subphase(&phases, 0), Some(1));
        assert_eq!(phase_of_subphase(&phases, 2), Some(0));
        assert_eq!(phase_of_subphase(&phases, 9), None);
    }
}

//! Sequential gating of monthly progress records.
//!
//! A month can receive its first evaluation only after every month before it has
//! one. Month 1 is always open until it is recorded. For histories built through
//! the gate (a filled prefix) that is the same as asking for the previous month;
//! for imported histories with a hole, only the hole is open.
//!
//! The gate only reads the set of months already recorded for a student. Editing
//! an existing record is not gated at all.

use std::collections::BTreeSet;
use std::fmt;
use std::num::NonZeroU32;

use crate::error::GateError;
use crate::models::Period;

pub const DEFAULT_TOTAL_MONTHS: u32 = 4;

const DEFAULT_TOTAL: NonZeroU32 = match NonZeroU32::new(DEFAULT_TOTAL_MONTHS) {
    Some(total) => total,
    None => panic!("default month count must be non-zero"),
};

/// Why a month can or cannot be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Allowed,
    AlreadyRecorded,
    PredecessorMissing { missing: Period },
}

impl Eligibility {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Eligibility::Allowed)
    }
}

impl fmt::Display for Eligibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Eligibility::Allowed => f.write_str("open"),
            Eligibility::AlreadyRecorded => f.write_str("already recorded"),
            Eligibility::PredecessorMissing { missing } => {
                write!(f, "month {missing} has not been recorded yet")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthlyProgressGate {
    total: NonZeroU32,
}

impl Default for MonthlyProgressGate {
    fn default() -> Self {
        Self::new(DEFAULT_TOTAL)
    }
}

impl MonthlyProgressGate {
    pub fn new(total: NonZeroU32) -> Self {
        Self { total }
    }

    pub fn with_total(total: u32) -> Result<Self, GateError> {
        NonZeroU32::new(total)
            .map(Self::new)
            .ok_or(GateError::InvalidTotal)
    }

    pub fn total_periods(&self) -> u32 {
        self.total.get()
    }

    fn periods(&self) -> impl Iterator<Item = Period> {
        1..=self.total.get()
    }

    pub fn validate_period(&self, period: Period) -> Result<(), GateError> {
        if (1..=self.total.get()).contains(&period) {
            Ok(())
        } else {
            Err(GateError::InvalidPeriod {
                period,
                total: self.total.get(),
            })
        }
    }

    // Callers validate the range; this is the bare rule.
    fn eligibility(existing: &BTreeSet<Period>, period: Period) -> Eligibility {
        if existing.contains(&period) {
            return Eligibility::AlreadyRecorded;
        }
        match (1..period).find(|earlier| !existing.contains(earlier)) {
            Some(missing) => Eligibility::PredecessorMissing { missing },
            None => Eligibility::Allowed,
        }
    }

    /// Explains whether `requested` may receive its first record.
    pub fn check(
        &self,
        existing: &BTreeSet<Period>,
        requested: Period,
    ) -> Result<Eligibility, GateError> {
        self.validate_period(requested)?;
        Ok(Self::eligibility(existing, requested))
    }

    pub fn can_create(
        &self,
        existing: &BTreeSet<Period>,
        requested: Period,
    ) -> Result<bool, GateError> {
        self.check(existing, requested).map(|e| e.is_allowed())
    }

    /// Every month that could be created right now, ascending.
    pub fn unlocked_periods(&self, existing: &BTreeSet<Period>) -> Vec<Period> {
        self.periods()
            .filter(|&period| Self::eligibility(existing, period).is_allowed())
            .collect()
    }

    pub fn next_period(&self, existing: &BTreeSet<Period>) -> Option<Period> {
        self.periods()
            .find(|&period| Self::eligibility(existing, period).is_allowed())
    }

    pub fn is_complete(&self, existing: &BTreeSet<Period>) -> bool {
        self.periods().all(|period| existing.contains(&period))
    }

    /// Length of the filled prefix `1..=k`.
    pub fn high_water_mark(&self, existing: &BTreeSet<Period>) -> Period {
        self.periods()
            .take_while(|period| existing.contains(period))
            .last()
            .unwrap_or(0)
    }

    /// Months past the filled prefix that are still missing while a later one exists.
    pub fn gaps(&self, existing: &BTreeSet<Period>) -> Vec<Period> {
        let last_recorded = match existing.range(1..=self.total.get()).next_back() {
            Some(&last) => last,
            None => return Vec::new(),
        };
        (1..last_recorded)
            .filter(|period| !existing.contains(period))
            .collect()
    }
}

pub fn can_create(
    existing: &BTreeSet<Period>,
    requested: Period,
    total: u32,
) -> Result<bool, GateError> {
    MonthlyProgressGate::with_total(total)?.can_create(existing, requested)
}

pub fn unlocked_periods(
    existing: &BTreeSet<Period>,
    total: u32,
) -> Result<Vec<Period>, GateError> {
    Ok(MonthlyProgressGate::with_total(total)?.unlocked_periods(existing))
}

pub fn is_complete(existing: &BTreeSet<Period>, total: u32) -> Result<bool, GateError> {
    Ok(MonthlyProgressGate::with_total(total)?.is_complete(existing))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn set(periods: &[Period]) -> BTreeSet<Period> {
        periods.iter().copied().collect()
    }

    fn four_months() -> MonthlyProgressGate {
        MonthlyProgressGate::default()
    }

    #[test]
    fn default_gate_tracks_four_months() {
        assert_eq!(four_months().total_periods(), 4);
    }

    #[test]
    fn zero_months_is_rejected() {
        assert_eq!(
            MonthlyProgressGate::with_total(0),
            Err(GateError::InvalidTotal)
        );
        assert_eq!(can_create(&set(&[]), 1, 0), Err(GateError::InvalidTotal));
    }

    #[test]
    fn empty_history_opens_only_first_month() {
        let gate = four_months();
        let existing = set(&[]);
        assert_eq!(gate.can_create(&existing, 1), Ok(true));
        assert_eq!(gate.can_create(&existing, 2), Ok(false));
        assert_eq!(gate.unlocked_periods(&existing), vec![1]);
    }

    #[test]
    fn first_month_recorded_opens_second() {
        let gate = four_months();
        let existing = set(&[1]);
        assert_eq!(gate.can_create(&existing, 2), Ok(true));
        assert_eq!(gate.can_create(&existing, 1), Ok(false));
        assert_eq!(gate.unlocked_periods(&existing), vec![2]);
    }

    #[test]
    fn two_months_recorded_opens_third_only() {
        let gate = four_months();
        let existing = set(&[1, 2]);
        assert_eq!(gate.can_create(&existing, 3), Ok(true));
        assert_eq!(gate.can_create(&existing, 4), Ok(false));
        assert_eq!(gate.unlocked_periods(&existing), vec![3]);
    }

    #[test]
    fn full_history_is_complete() {
        let gate = four_months();
        let existing = set(&[1, 2, 3, 4]);
        assert!(gate.unlocked_periods(&existing).is_empty());
        assert!(gate.is_complete(&existing));
        assert_eq!(gate.next_period(&existing), None);
        assert_eq!(gate.high_water_mark(&existing), 4);
    }

    #[test]
    fn gap_is_the_only_unlocked_month() {
        let gate = four_months();
        let existing = set(&[1, 3]);
        assert_eq!(gate.unlocked_periods(&existing), vec![2]);
        assert_eq!(gate.can_create(&existing, 4), Ok(false));
        assert_eq!(
            gate.check(&existing, 4),
            Ok(Eligibility::PredecessorMissing { missing: 2 })
        );
        assert_eq!(gate.gaps(&existing), vec![2]);
        assert_eq!(gate.high_water_mark(&existing), 1);
        assert!(!gate.is_complete(&existing));
    }

    #[test]
    fn out_of_range_months_are_invalid() {
        let gate = four_months();
        let existing = set(&[]);
        assert_eq!(
            gate.can_create(&existing, 0),
            Err(GateError::InvalidPeriod { period: 0, total: 4 })
        );
        assert_eq!(
            gate.can_create(&existing, 5),
            Err(GateError::InvalidPeriod { period: 5, total: 4 })
        );
    }

    #[test]
    fn check_explains_locked_months() {
        let gate = four_months();
        assert_eq!(
            gate.check(&set(&[1]), 3),
            Ok(Eligibility::PredecessorMissing { missing: 2 })
        );
        assert_eq!(gate.check(&set(&[1]), 1), Ok(Eligibility::AlreadyRecorded));
        assert_eq!(gate.check(&set(&[1]), 2), Ok(Eligibility::Allowed));
    }

    #[test]
    fn out_of_range_records_are_ignored() {
        let gate = four_months();
        let existing = set(&[1, 2, 3, 4, 9]);
        assert!(gate.is_complete(&existing));
        assert!(gate.unlocked_periods(&existing).is_empty());
        assert!(gate.gaps(&existing).is_empty());
    }

    #[test]
    fn free_functions_match_gate() {
        let existing = set(&[1, 2]);
        assert_eq!(can_create(&existing, 3, 4), Ok(true));
        assert_eq!(unlocked_periods(&existing, 4), Ok(vec![3]));
        assert_eq!(is_complete(&existing, 2), Ok(true));
        assert_eq!(is_complete(&existing, 4), Ok(false));
    }

    #[test]
    fn eligibility_reads_well() {
        assert_eq!(
            Eligibility::PredecessorMissing { missing: 2 }.to_string(),
            "month 2 has not been recorded yet"
        );
    }

    fn arb_history() -> impl Strategy<Value = (u32, BTreeSet<Period>)> {
        (1u32..=12).prop_flat_map(|total| {
            (
                Just(total),
                proptest::collection::btree_set(1..=total, 0..=total as usize),
            )
        })
    }

    proptest! {
        #[test]
        fn prop_empty_history_only_first_month(total in 1u32..=12) {
            let gate = MonthlyProgressGate::with_total(total).unwrap();
            let empty = BTreeSet::new();
            prop_assert_eq!(gate.can_create(&empty, 1), Ok(true));
            for period in 2..=total {
                prop_assert_eq!(gate.can_create(&empty, period), Ok(false));
            }
        }

        #[test]
        fn prop_recorded_months_never_creatable((total, existing) in arb_history()) {
            let gate = MonthlyProgressGate::with_total(total).unwrap();
            for &period in &existing {
                prop_assert_eq!(gate.can_create(&existing, period), Ok(false));
            }
        }

        #[test]
        fn prop_prefix_history_checks_previous_month(total in 1u32..=12, filled in 0u32..=12) {
            let gate = MonthlyProgressGate::with_total(total).unwrap();
            let existing: BTreeSet<Period> = (1..=filled.min(total)).collect();
            for period in 2..=total {
                let expected = existing.contains(&(period - 1)) && !existing.contains(&period);
                prop_assert_eq!(gate.can_create(&existing, period), Ok(expected));
            }
        }

        #[test]
        fn prop_creatable_needs_every_earlier_month((total, existing) in arb_history()) {
            let gate = MonthlyProgressGate::with_total(total).unwrap();
            for period in 1..=total {
                let expected = !existing.contains(&period)
                    && (1..period).all(|earlier| existing.contains(&earlier));
                prop_assert_eq!(gate.can_create(&existing, period), Ok(expected));
            }
        }

        #[test]
        fn prop_only_the_first_hole_is_open((total, existing) in arb_history()) {
            let gate = MonthlyProgressGate::with_total(total).unwrap();
            let first_hole: Vec<Period> = (1..=total)
                .find(|p| !existing.contains(p))
                .into_iter()
                .collect();
            prop_assert_eq!(gate.unlocked_periods(&existing), first_hole);
        }

        #[test]
        fn prop_unlocked_matches_can_create((total, existing) in arb_history()) {
            let gate = MonthlyProgressGate::with_total(total).unwrap();
            let expected: Vec<Period> = (1..=total)
                .filter(|&p| gate.can_create(&existing, p) == Ok(true))
                .collect();
            prop_assert_eq!(gate.unlocked_periods(&existing), expected.clone());
            prop_assert_eq!(gate.next_period(&existing), expected.first().copied());
        }

        #[test]
        fn prop_contiguous_prefix_unlocks_at_most_one(total in 1u32..=12, filled in 0u32..=12) {
            let filled = filled.min(total);
            let gate = MonthlyProgressGate::with_total(total).unwrap();
            let existing: BTreeSet<Period> = (1..=filled).collect();
            let unlocked = gate.unlocked_periods(&existing);
            prop_assert!(unlocked.len() <= 1);
            prop_assert_eq!(gate.high_water_mark(&existing), filled);
            if filled < total {
                prop_assert_eq!(unlocked, vec![filled + 1]);
            }
        }

        #[test]
        fn prop_complete_iff_nothing_unlocked_and_full((total, existing) in arb_history()) {
            let gate = MonthlyProgressGate::with_total(total).unwrap();
            let full = existing.len() == total as usize;
            prop_assert_eq!(
                gate.is_complete(&existing),
                gate.unlocked_periods(&existing).is_empty() && full
            );
            if !full {
                prop_assert!(!gate.unlocked_periods(&existing).is_empty());
            }
        }

        #[test]
        fn prop_boundaries_are_invalid(total in 1u32..=12) {
            let gate = MonthlyProgressGate::with_total(total).unwrap();
            let empty = BTreeSet::new();
            prop_assert_eq!(
                gate.can_create(&empty, 0),
                Err(GateError::InvalidPeriod { period: 0, total })
            );
            prop_assert_eq!(
                gate.can_create(&empty, total + 1),
                Err(GateError::InvalidPeriod { period: total + 1, total })
            );
        }

        #[test]
        fn prop_queries_are_repeatable(
            (total, existing) in arb_history(),
            requested in 0u32..=13,
        ) {
            let gate = MonthlyProgressGate::with_total(total).unwrap();
            prop_assert_eq!(
                gate.can_create(&existing, requested),
                gate.can_create(&existing, requested)
            );
            prop_assert_eq!(gate.unlocked_periods(&existing), gate.unlocked_periods(&existing));
            prop_assert_eq!(gate.is_complete(&existing), gate.is_complete(&existing));
        }
    }
}

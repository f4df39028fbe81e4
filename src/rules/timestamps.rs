use arrow::array::{ArrayRef, BooleanArray};
use std::sync::Arc;

use super::{Rule, RuleOutcome};
use crate::audit::{AuditCategory, AuditEntry, Effect};
use crate::error::Result;
use crate::frame::{
    TrainFrame, ARRIVAL_PLANNED_TIME, DEPARTURE_PLANNED_TIME, LIKELY_FINAL_STATION,
    LIKELY_START_STATION, MISSING_BOTH_TIMES,
};

/// Derive three flags from which planned timestamps are absent.
///
/// A terminal stop has no departure, an origin stop has no arrival, so the
/// absence is kept as information; no row is changed or dropped.
pub struct TimestampFlagRule;

impl Rule for TimestampFlagRule {
    fn name(&self) -> &'static str {
        "Flag missing planned timestamps"
    }

    fn apply(&self, frame: &TrainFrame) -> Result<RuleOutcome> {
        let no_arrival = frame.nulls(ARRIVAL_PLANNED_TIME)?;
        let no_departure = frame.nulls(DEPARTURE_PLANNED_TIME)?;

        let final_station: BooleanArray = no_arrival
            .iter()
            .zip(&no_departure)
            .map(|(a, d)| Some(!*a && *d))
            .collect();
        let start_station: BooleanArray = no_arrival
            .iter()
            .zip(&no_departure)
            .map(|(a, d)| Some(*a && !*d))
            .collect();
        let missing_both: BooleanArray = no_arrival
            .iter()
            .zip(&no_departure)
            .map(|(a, d)| Some(*a && *d))
            .collect();

        let (n_final, n_start, n_both) = (
            final_station.true_count(),
            start_station.true_count(),
            missing_both.true_count(),
        );

        let flagged = frame
            .with_column(LIKELY_FINAL_STATION, Arc::new(final_station) as ArrayRef, false)?
            .with_column(LIKELY_START_STATION, Arc::new(start_station) as ArrayRef, false)?
            .with_column(MISSING_BOTH_TIMES, Arc::new(missing_both) as ArrayRef, false)?;

        let mut outcome = RuleOutcome::new(flagged);
        outcome.push(AuditEntry::counted(
            AuditCategory::Found,
            "Missing arrival_planned_time",
            no_arrival.iter().filter(|n| **n).count(),
        ));
        outcome.push(AuditEntry::counted(
            AuditCategory::Found,
            "Missing departure_planned_time",
            no_departure.iter().filter(|n| **n).count(),
        ));
        outcome.push(AuditEntry::effect(
            AuditCategory::Flagged,
            Effect::FlaggedFinalStation,
            format!("Likely final stations ({})", LIKELY_FINAL_STATION),
            n_final,
        ));
        outcome.push(AuditEntry::effect(
            AuditCategory::Flagged,
            Effect::FlaggedStartStation,
            format!("Likely start stations ({})", LIKELY_START_STATION),
            n_start,
        ));
        outcome.push(AuditEntry::effect(
            AuditCategory::Flagged,
            Effect::FlaggedMissingBoth,
            format!("Both planned times missing ({})", MISSING_BOTH_TIMES),
            n_both,
        ));
        outcome.push(AuditEntry::new(
            AuditCategory::Decision,
            "Flags added instead of deleting rows",
        ));
        Ok(outcome)
    }
}

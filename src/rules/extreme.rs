use arrow::array::{ArrayRef, BooleanArray, Float64Array};
use std::sync::Arc;

use super::{Rule, RuleOutcome};
use crate::audit::{AuditCategory, AuditEntry, Effect};
use crate::error::Result;
use crate::frame::{TrainFrame, DELAY_IN_MIN, IS_CANCELED};

/// A delay above the threshold means the trip never ran as scheduled:
/// mark it canceled and zero the delay.
pub struct ExtremeDelayRule {
    threshold: f64,
}

impl ExtremeDelayRule {
    pub fn new(threshold: f64) -> Self {
        ExtremeDelayRule { threshold }
    }
}

impl Rule for ExtremeDelayRule {
    fn name(&self) -> &'static str {
        "Reclassify extreme delays as cancellations"
    }

    fn apply(&self, frame: &TrainFrame) -> Result<RuleOutcome> {
        let delays = frame.delays()?;
        let canceled = frame.canceled()?;

        let extreme: Vec<bool> = delays
            .iter()
            .map(|d| d.is_some_and(|v| v > self.threshold))
            .collect();
        let hits = extreme.iter().filter(|e| **e).count();

        let mut outcome = if hits == 0 {
            RuleOutcome::new(frame.clone())
        } else {
            let new_delays: Float64Array = delays
                .iter()
                .zip(&extreme)
                .map(|(d, hit)| if *hit { Some(0.0) } else { d })
                .collect();
            let new_canceled: BooleanArray = canceled
                .iter()
                .zip(&extreme)
                .map(|(c, hit)| Some(*hit || c.unwrap_or(false)))
                .collect();
            let updated = frame
                .with_column(DELAY_IN_MIN, Arc::new(new_delays) as ArrayRef, true)?
                .with_column(IS_CANCELED, Arc::new(new_canceled) as ArrayRef, false)?;
            RuleOutcome::new(updated)
        };

        outcome.push(AuditEntry::counted(
            AuditCategory::Found,
            format!("Extreme delays (> {} min)", self.threshold),
            hits,
        ));
        outcome.push(AuditEntry::effect(
            AuditCategory::Fixed,
            Effect::ExtremeReclassified,
            "Marked as canceled with delay 0",
            hits,
        ));
        Ok(outcome)
    }
}

use arrow::array::{ArrayRef, Float64Array};
use std::sync::Arc;

use super::{Rule, RuleOutcome};
use crate::audit::{AuditCategory, AuditEntry, Effect};
use crate::error::Result;
use crate::frame::{TrainFrame, DELAY_IN_MIN};

/// Early arrivals in three bands:
/// - below `min_realistic`: a reporting error, reset to 0
/// - in `[min_realistic, max_negative)`: clamped up to `max_negative`
/// - at or above `max_negative`: kept
pub struct NegativeDelayRule {
    max_negative: f64,
    min_realistic: f64,
}

impl NegativeDelayRule {
    pub fn new(max_negative: f64, min_realistic: f64) -> Self {
        NegativeDelayRule {
            max_negative,
            min_realistic,
        }
    }
}

impl Rule for NegativeDelayRule {
    fn name(&self) -> &'static str {
        "Normalize negative delays"
    }

    fn apply(&self, frame: &TrainFrame) -> Result<RuleOutcome> {
        let delays = frame.delays()?;

        let mut reset = 0usize;
        let mut clamped = 0usize;
        let mut acceptable = 0usize;

        let fixed: Float64Array = delays
            .iter()
            .map(|d| {
                d.map(|v| {
                    if v < self.min_realistic {
                        reset += 1;
                        0.0
                    } else if v < self.max_negative {
                        clamped += 1;
                        self.max_negative
                    } else {
                        if v < 0.0 {
                            acceptable += 1;
                        }
                        v
                    }
                })
            })
            .collect();

        let mut outcome = RuleOutcome::new(if reset + clamped == 0 {
            frame.clone()
        } else {
            frame.with_column(DELAY_IN_MIN, Arc::new(fixed) as ArrayRef, true)?
        });
        outcome.push(AuditEntry::counted(
            AuditCategory::Found,
            format!("Erroneous negative delays (< {} min)", self.min_realistic),
            reset,
        ));
        outcome.push(AuditEntry::counted(
            AuditCategory::Found,
            format!("Unacceptable negative delays (< {} min)", self.max_negative),
            clamped,
        ));
        outcome.push(AuditEntry::counted(
            AuditCategory::Found,
            format!("Acceptable negative delays (>= {} min)", self.max_negative),
            acceptable,
        ));
        outcome.push(AuditEntry::effect(
            AuditCategory::Fixed,
            Effect::DelayReset,
            "Erroneous negative delays reset to 0",
            reset,
        ));
        outcome.push(AuditEntry::effect(
            AuditCategory::Fixed,
            Effect::DelayClamped,
            format!("Clamped to {} min", self.max_negative),
            clamped,
        ));
        Ok(outcome)
    }
}

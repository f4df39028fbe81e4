use arrow::array::{ArrayRef, Float64Array};
use std::sync::Arc;

use super::{Rule, RuleOutcome};
use crate::audit::{AuditCategory, AuditEntry, Effect};
use crate::error::Result;
use crate::frame::{TrainFrame, DELAY_IN_MIN};

/// A canceled train has no delay: force `delay_in_min = 0` on every canceled row.
pub struct CanceledDelayRule;

impl Rule for CanceledDelayRule {
    fn name(&self) -> &'static str {
        "Zero the delay of canceled trains"
    }

    fn apply(&self, frame: &TrainFrame) -> Result<RuleOutcome> {
        let delays = frame.delays()?;
        let canceled = frame.canceled()?;

        let mut positive = 0usize;
        let mut changed = 0usize;
        let fixed: Float64Array = delays
            .iter()
            .zip(canceled.iter())
            .map(|(d, c)| {
                if !c.unwrap_or(false) {
                    return d;
                }
                if d.is_some_and(|v| v > 0.0) {
                    positive += 1;
                }
                if d != Some(0.0) {
                    changed += 1;
                }
                Some(0.0)
            })
            .collect();

        let mut outcome = RuleOutcome::new(if changed == 0 {
            frame.clone()
        } else {
            frame.with_column(DELAY_IN_MIN, Arc::new(fixed) as ArrayRef, true)?
        });
        outcome.push(AuditEntry::counted(
            AuditCategory::Found,
            "Canceled with positive delay",
            positive,
        ));
        outcome.push(AuditEntry::effect(
            AuditCategory::Fixed,
            Effect::CanceledDelayZeroed,
            "Delay of canceled trains set to 0",
            changed,
        ));
        Ok(outcome)
    }
}

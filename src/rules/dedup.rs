use arrow::array::{Array, BooleanArray};
use std::collections::HashMap;

use super::{Rule, RuleOutcome};
use crate::audit::{AuditCategory, AuditEntry, Effect};
use crate::error::Result;
use crate::frame::TrainFrame;

/// Keep one row per non-null `train_line_ride_id`: the one with the latest `time`.
///
/// Ties on `time` go to the earliest row in the input. A null `time` loses
/// to any non-null one. Rows without a ride id are all kept, and the
/// survivors stay in their original order.
pub struct RideDedupRule;

impl RideDedupRule {
    /// Row mask of survivors plus the number of distinct ride ids seen.
    pub fn survivors(frame: &TrainFrame) -> Result<(BooleanArray, usize)> {
        let ids = frame.ride_ids()?;
        let times = frame.times()?;

        let mut best: HashMap<&str, usize> = HashMap::new();
        for row in 0..ids.len() {
            if ids.is_null(row) {
                continue;
            }
            let time_at = |r: usize| times.is_valid(r).then(|| times.value(r));
            best.entry(ids.value(row))
                .and_modify(|kept| {
                    // strictly later wins, so equal times keep the earlier row
                    if time_at(row) > time_at(*kept) {
                        *kept = row;
                    }
                })
                .or_insert(row);
        }

        let keep: BooleanArray = (0..ids.len())
            .map(|row| Some(ids.is_null(row) || best.get(ids.value(row)) == Some(&row)))
            .collect();
        Ok((keep, best.len()))
    }
}

impl Rule for RideDedupRule {
    fn name(&self) -> &'static str {
        "Deduplicate ride ids"
    }

    fn apply(&self, frame: &TrainFrame) -> Result<RuleOutcome> {
        let (keep, distinct) = Self::survivors(frame)?;
        let with_id = frame.num_rows() - frame.ride_ids()?.null_count();
        let duplicates = with_id - distinct;

        let mut outcome = RuleOutcome::new(if duplicates == 0 {
            frame.clone()
        } else {
            frame.filter(&keep)?
        });
        let removed = frame.num_rows() - outcome.frame.num_rows();

        outcome.push(AuditEntry::counted(
            AuditCategory::Found,
            "Duplicate train_line_ride_id rows",
            duplicates,
        ));
        outcome.push(AuditEntry::effect(
            AuditCategory::Fixed,
            Effect::DuplicateRemoved,
            "Older duplicates removed (latest kept)",
            removed,
        ));
        Ok(outcome)
    }
}

use arrow::array::{Array, ArrayRef, StringArray};
use std::sync::Arc;

use super::{Rule, RuleOutcome};
use crate::audit::{AuditCategory, AuditEntry, Effect};
use crate::error::Result;
use crate::frame::{TrainFrame, STATION_NAME, XML_STATION_NAME};

/// Fill absent `station_name` from `xml_station_name`, then from a fixed label.
pub struct StationBackfillRule {
    unknown_label: String,
}

impl StationBackfillRule {
    pub fn new(unknown_label: &str) -> Self {
        StationBackfillRule {
            unknown_label: unknown_label.to_string(),
        }
    }
}

impl Rule for StationBackfillRule {
    fn name(&self) -> &'static str {
        "Backfill missing station names"
    }

    fn apply(&self, frame: &TrainFrame) -> Result<RuleOutcome> {
        let names = frame.strings(STATION_NAME)?;
        let fallback = frame.optional_strings(XML_STATION_NAME)?;

        let mut missing = 0usize;
        let mut from_secondary = 0usize;
        let mut unknown = 0usize;

        let filled: StringArray = names
            .iter()
            .enumerate()
            .map(|(row, name)| {
                if let Some(n) = name {
                    return Some(n.to_string());
                }
                missing += 1;
                let secondary = fallback
                    .as_ref()
                    .filter(|f| f.is_valid(row))
                    .map(|f| f.value(row));
                match secondary {
                    Some(s) => {
                        from_secondary += 1;
                        Some(s.to_string())
                    }
                    None => {
                        unknown += 1;
                        Some(self.unknown_label.clone())
                    }
                }
            })
            .collect();

        let mut outcome = RuleOutcome::new(if missing == 0 {
            frame.clone()
        } else {
            frame.with_column(STATION_NAME, Arc::new(filled) as ArrayRef, false)?
        });
        outcome.push(AuditEntry::counted(
            AuditCategory::Found,
            "Missing station_name",
            missing,
        ));
        outcome.push(AuditEntry::effect(
            AuditCategory::Fixed,
            Effect::StationFromSecondary,
            "Filled from xml_station_name",
            from_secondary,
        ));
        outcome.push(AuditEntry::effect(
            AuditCategory::Fixed,
            Effect::StationUnknown,
            format!("Remaining marked as '{}'", self.unknown_label),
            unknown,
        ));
        Ok(outcome)
    }
}

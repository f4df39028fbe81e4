use arrow::array::{Array, ArrayRef, StringArray};
use arrow::datatypes::DataType;
use std::sync::Arc;

use super::{Rule, RuleOutcome};
use crate::audit::{AuditCategory, AuditEntry, Effect};
use crate::error::Result;
use crate::frame::TrainFrame;

/// Strip leading/trailing whitespace from every string column.
///
/// Runs before everything else so ride ids that only differ by padding
/// collapse into one group for deduplication.
pub struct TrimStringsRule;

impl Rule for TrimStringsRule {
    fn name(&self) -> &'static str {
        "Trim whitespace in string columns"
    }

    fn apply(&self, frame: &TrainFrame) -> Result<RuleOutcome> {
        let schema = frame.batch().schema();
        let string_cols: Vec<String> = schema
            .fields()
            .iter()
            .filter(|f| is_string_type(f.data_type()))
            .map(|f| f.name().clone())
            .collect();

        let mut touched = vec![false; frame.num_rows()];
        let mut changed_cols = 0usize;
        let mut out = frame.clone();

        for name in &string_cols {
            let values = frame.strings(name)?;
            let mut any = false;
            for (row, v) in values.iter().enumerate() {
                if let Some(s) = v {
                    if s.trim().len() != s.len() {
                        touched[row] = true;
                        any = true;
                    }
                }
            }
            if !any {
                continue;
            }
            changed_cols += 1;
            let trimmed: StringArray = values.iter().map(|v| v.map(str::trim)).collect();
            let nullable = trimmed.null_count() > 0;
            out = out.with_column(name, Arc::new(trimmed) as ArrayRef, nullable)?;
        }

        let rows = touched.iter().filter(|t| **t).count();
        let mut outcome = RuleOutcome::new(out);
        outcome.push(AuditEntry::new(
            AuditCategory::Info,
            format!(
                "{} string columns checked, {} had padded values",
                string_cols.len(),
                changed_cols
            ),
        ));
        outcome.push(AuditEntry::effect(
            AuditCategory::Fixed,
            Effect::StringTrimmed,
            "Whitespace trimmed",
            rows,
        ));
        Ok(outcome)
    }
}

/// Plain strings, or dictionary-encoded strings (categorical columns).
fn is_string_type(data_type: &DataType) -> bool {
    match data_type {
        DataType::Utf8 | DataType::LargeUtf8 => true,
        DataType::Dictionary(_, values) => is_string_type(values),
        _ => false,
    }
}

// src/rules/mod.rs

pub mod cancel;
pub mod dedup;
pub mod extreme;
pub mod negative;
pub mod station;
pub mod timestamps;
pub mod trim;

use std::time::Instant;
use tracing::{debug, info, instrument};

use crate::audit::{AuditCategory, AuditEntry, AuditLog};
use crate::config::CleaningConfig;
use crate::error::Result;
use crate::frame::TrainFrame;

pub use cancel::CanceledDelayRule;
pub use dedup::RideDedupRule;
pub use extreme::ExtremeDelayRule;
pub use negative::NegativeDelayRule;
pub use station::StationBackfillRule;
pub use timestamps::TimestampFlagRule;
pub use trim::TrimStringsRule;

/// What one rule produced: the new frame plus the audit entries describing the change.
#[derive(Debug)]
pub struct RuleOutcome {
    pub frame: TrainFrame,
    pub entries: Vec<AuditEntry>,
}

impl RuleOutcome {
    pub fn new(frame: TrainFrame) -> Self {
        RuleOutcome {
            frame,
            entries: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, entry: AuditEntry) {
        self.entries.push(entry);
    }
}

/// One correction step. Never mutates its input.
pub trait Rule {
    /// Heading written to the audit log before the rule's own entries.
    fn name(&self) -> &'static str;

    fn apply(&self, frame: &TrainFrame) -> Result<RuleOutcome>;
}

/// The fixed rule sequence. Later rules rely on earlier ones having run.
///
/// Headings number the six correction rules 1 to 6; the optional trim
/// pre-pass is rule 0.
pub struct RuleEngine {
    rules: Vec<Box<dyn Rule + Send + Sync>>,
    first_number: usize,
}

impl RuleEngine {
    pub fn from_config(cfg: &CleaningConfig) -> Self {
        let t = cfg.thresholds;
        let mut rules: Vec<Box<dyn Rule + Send + Sync>> = Vec::with_capacity(7);
        let first_number = if cfg.trim_strings {
            rules.push(Box::new(TrimStringsRule));
            0
        } else {
            1
        };
        rules.push(Box::new(StationBackfillRule::new(&cfg.unknown_station_label)));
        rules.push(Box::new(NegativeDelayRule::new(
            t.max_negative_delay,
            t.min_realistic_delay,
        )));
        rules.push(Box::new(ExtremeDelayRule::new(t.extreme_delay_threshold)));
        rules.push(Box::new(CanceledDelayRule));
        rules.push(Box::new(RideDedupRule));
        rules.push(Box::new(TimestampFlagRule));
        RuleEngine {
            rules,
            first_number,
        }
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Apply every rule in order, appending each rule's entries to `audit`.
    #[instrument(level = "info", skip_all, fields(rows = frame.num_rows()))]
    pub fn run(&self, frame: TrainFrame, audit: &mut AuditLog) -> Result<TrainFrame> {
        let mut current = frame;
        for (i, rule) in self.rules.iter().enumerate() {
            let start = Instant::now();
            audit.push(AuditEntry::new(
                AuditCategory::Rule,
                format!("{}. {}", self.first_number + i, rule.name()),
            ));
            let outcome = rule.apply(&current)?;
            debug!(
                rule = rule.name(),
                rows_before = current.num_rows(),
                rows_after = outcome.frame.num_rows(),
                elapsed = ?start.elapsed(),
                "rule applied"
            );
            audit.extend(outcome.entries);
            current = outcome.frame;
        }
        info!(rows = current.num_rows(), "all rules applied");
        Ok(current)
    }
}

// src/validate/mod.rs

use arrow::array::Array;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use tracing::instrument;

use crate::audit::{AuditCategory, AuditEntry};
use crate::config::Thresholds;
use crate::error::{CleanError, Result};
use crate::frame::{TrainFrame, STATION_NAME};

/// Post-clean guarantees, each re-derived from the data rather than assumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Invariant {
    DelayAboveFloor,
    CanceledHasNoDelay,
    ExtremeDelayIsCanceled,
    StationNamePresent,
    UniqueRideId,
}

impl Invariant {
    pub const ALL: [Invariant; 5] = [
        Invariant::DelayAboveFloor,
        Invariant::CanceledHasNoDelay,
        Invariant::ExtremeDelayIsCanceled,
        Invariant::StationNamePresent,
        Invariant::UniqueRideId,
    ];
}

/// Result of one invariant check; `threshold` is the bound used, where there is one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvariantCheck {
    pub invariant: Invariant,
    pub threshold: Option<f64>,
    pub violations: usize,
}

impl InvariantCheck {
    pub fn passed(&self) -> bool {
        self.violations == 0
    }

    pub fn describe(&self) -> String {
        match (self.invariant, self.threshold) {
            (Invariant::DelayAboveFloor, Some(t)) => format!("Delays below {} min", t),
            (Invariant::ExtremeDelayIsCanceled, Some(t)) => {
                format!("Delays above {} min not canceled", t)
            }
            (Invariant::DelayAboveFloor, None) => "Delays below floor".to_string(),
            (Invariant::ExtremeDelayIsCanceled, None) => "Extreme delays not canceled".to_string(),
            (Invariant::CanceledHasNoDelay, _) => "Canceled with positive delay".to_string(),
            (Invariant::StationNamePresent, _) => "Null station_name".to_string(),
            (Invariant::UniqueRideId, _) => "Duplicate train_line_ride_id rows".to_string(),
        }
    }

    pub fn to_entry(&self) -> AuditEntry {
        AuditEntry::counted(AuditCategory::Check, self.describe(), self.violations)
    }
}

/// All five checks, always evaluated together.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub rows: usize,
    pub checks: Vec<InvariantCheck>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.checks.iter().all(InvariantCheck::passed)
    }

    pub fn failed(&self) -> impl Iterator<Item = &InvariantCheck> {
        self.checks.iter().filter(|c| !c.passed())
    }

    pub fn violations(&self, invariant: Invariant) -> usize {
        self.checks
            .iter()
            .filter(|c| c.invariant == invariant)
            .map(|c| c.violations)
            .sum()
    }

    /// Turn a failing report into the fatal error, keeping every check.
    pub fn into_result(self) -> Result<Self> {
        if self.is_ok() {
            Ok(self)
        } else {
            Err(CleanError::InvariantViolation(self))
        }
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failed = self.failed().count();
        write!(
            f,
            "{} of {} invariant checks failed over {} rows",
            failed,
            self.checks.len(),
            self.rows
        )?;
        for c in &self.checks {
            write!(
                f,
                "\n  [{}] {}: {}",
                if c.passed() { "ok" } else { "FAIL" },
                c.describe(),
                c.violations
            )?;
        }
        Ok(())
    }
}

/// Re-checks the cleaned frame. Never short-circuits.
#[derive(Debug, Clone, Copy)]
pub struct Validator {
    thresholds: Thresholds,
}

impl Validator {
    pub fn new(thresholds: Thresholds) -> Self {
        Validator { thresholds }
    }

    #[instrument(level = "info", skip_all, fields(rows = frame.num_rows()))]
    pub fn validate(&self, frame: &TrainFrame) -> Result<ValidationReport> {
        let delays = frame.delays()?;
        let canceled = frame.canceled()?;
        let stations = frame.strings(STATION_NAME)?;
        let ids = frame.ride_ids()?;

        let floor = self.thresholds.max_negative_delay;
        let extreme = self.thresholds.extreme_delay_threshold;

        let mut below_floor = 0usize;
        let mut canceled_delayed = 0usize;
        let mut extreme_running = 0usize;
        for (d, c) in delays.iter().zip(canceled.iter()) {
            let is_canceled = c.unwrap_or(false);
            let Some(d) = d else { continue };
            if d < floor {
                below_floor += 1;
            }
            if is_canceled && d > 0.0 {
                canceled_delayed += 1;
            }
            if !is_canceled && d > extreme {
                extreme_running += 1;
            }
        }

        let mut seen: HashMap<&str, usize> = HashMap::new();
        for id in ids.iter().flatten() {
            *seen.entry(id).or_default() += 1;
        }
        let duplicate_rows: usize = seen.values().map(|n| n - 1).sum();

        let checks = vec![
            InvariantCheck {
                invariant: Invariant::DelayAboveFloor,
                threshold: Some(floor),
                violations: below_floor,
            },
            InvariantCheck {
                invariant: Invariant::CanceledHasNoDelay,
                threshold: None,
                violations: canceled_delayed,
            },
            InvariantCheck {
                invariant: Invariant::ExtremeDelayIsCanceled,
                threshold: Some(extreme),
                violations: extreme_running,
            },
            InvariantCheck {
                invariant: Invariant::StationNamePresent,
                threshold: None,
                violations: stations.null_count(),
            },
            InvariantCheck {
                invariant: Invariant::UniqueRideId,
                threshold: None,
                violations: duplicate_rows,
            },
        ];
        Ok(ValidationReport {
            rows: frame.num_rows(),
            checks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::fixtures::{frame, Row};

    fn validator() -> Validator {
        Validator::new(Thresholds::default())
    }

    #[test]
    fn clean_frame_passes_all_checks() {
        let input = frame(&[
            Row {
                delay: Some(-30),
                ride: Some("a"),
                ..Default::default()
            },
            Row {
                delay: Some(180),
                ride: Some("b"),
                ..Default::default()
            },
            Row {
                delay: Some(0),
                canceled: true,
                ..Default::default()
            },
            Row {
                delay: None,
                ..Default::default()
            },
        ]);
        let report = validator().validate(&input).unwrap();
        assert!(report.is_ok(), "{}", report);
        assert_eq!(report.checks.len(), Invariant::ALL.len());
        assert!(report.into_result().is_ok());
    }

    #[test]
    fn every_violation_is_reported_not_just_the_first() {
        let input = frame(&[
            Row {
                delay: Some(-31),
                ..Default::default()
            },
            Row {
                delay: Some(5),
                canceled: true,
                ..Default::default()
            },
            Row {
                delay: Some(181),
                ..Default::default()
            },
            Row {
                station: None,
                ride: Some("dup"),
                ..Default::default()
            },
            Row {
                ride: Some("dup"),
                ..Default::default()
            },
            Row {
                ride: Some("dup"),
                ..Default::default()
            },
        ]);
        let report = validator().validate(&input).unwrap();
        assert_eq!(report.failed().count(), 5);
        assert_eq!(report.violations(Invariant::DelayAboveFloor), 1);
        assert_eq!(report.violations(Invariant::CanceledHasNoDelay), 1);
        assert_eq!(report.violations(Invariant::ExtremeDelayIsCanceled), 1);
        assert_eq!(report.violations(Invariant::StationNamePresent), 1);
        assert_eq!(report.violations(Invariant::UniqueRideId), 2);

        let text = report.to_string();
        assert!(text.starts_with("5 of 5 invariant checks failed over 6 rows"));
        match report.into_result() {
            Err(CleanError::InvariantViolation(r)) => assert_eq!(r.checks.len(), 5),
            other => panic!("expected InvariantViolation, got {:?}", other),
        }
    }

    #[test]
    fn check_entries_carry_counts() {
        let input = frame(&[Row {
            delay: Some(-100),
            ..Default::default()
        }]);
        let report = validator().validate(&input).unwrap();
        let entry = report.checks[0].to_entry();
        assert_eq!(entry.category, AuditCategory::Check);
        assert_eq!(entry.message, "Delays below -30 min");
        assert_eq!(entry.count, Some(1));
    }
}

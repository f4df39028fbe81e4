// src/stats/mod.rs

use serde::Serialize;
use std::fmt;

use crate::audit::{AuditCategory, AuditEntry};
use crate::error::Result;
use crate::frame::TrainFrame;

/// Headline numbers for one snapshot of the dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetStats {
    pub rows: usize,
    pub delay: Option<DelayStats>,
    pub canceled: usize,
}

/// Distribution of `delay_in_min`, ignoring nulls. `std_dev` is the sample deviation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DelayStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl DatasetStats {
    pub fn compute(frame: &TrainFrame) -> Result<Self> {
        let delays = frame.delays()?;
        let canceled = frame.canceled()?.true_count();

        let mut n = 0usize;
        let mut mean = 0.0f64;
        let mut m2 = 0.0f64;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        // Welford, so a few million rows don't lose precision
        for v in delays.iter().flatten() {
            n += 1;
            let delta = v - mean;
            mean += delta / n as f64;
            m2 += delta * (v - mean);
            min = min.min(v);
            max = max.max(v);
        }

        let delay = (n > 0).then(|| DelayStats {
            min,
            max,
            mean,
            std_dev: if n > 1 {
                (m2 / (n - 1) as f64).sqrt()
            } else {
                0.0
            },
        });

        Ok(DatasetStats {
            rows: frame.num_rows(),
            delay,
            canceled,
        })
    }

    /// Share of canceled rows, in percent.
    pub fn cancel_rate(&self) -> f64 {
        if self.rows == 0 {
            0.0
        } else {
            self.canceled as f64 * 100.0 / self.rows as f64
        }
    }

    pub fn to_entry(&self, label: &str) -> AuditEntry {
        AuditEntry::new(AuditCategory::Stats, format!("{}: {}", label, self))
    }
}

impl fmt::Display for DatasetStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} rows", self.rows)?;
        if let Some(d) = &self.delay {
            write!(
                f,
                ", delay min {:.2} / max {:.2} / mean {:.2} / std {:.2} min",
                d.min, d.max, d.mean, d.std_dev
            )?;
        }
        write!(
            f,
            ", {} canceled ({:.2}%)",
            self.canceled,
            self.cancel_rate()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::fixtures::{frame, Row};

    #[test]
    fn delay_distribution_ignores_nulls() {
        let rows: Vec<Row> = [Some(2), Some(4), Some(4), None, Some(4), Some(5), Some(5), Some(7), Some(9)]
            .into_iter()
            .map(|d| Row {
                delay: d,
                canceled: d.is_none(),
                ..Default::default()
            })
            .collect();
        let stats = DatasetStats::compute(&frame(&rows)).unwrap();
        assert_eq!(stats.rows, 9);
        assert_eq!(stats.canceled, 1);
        let d = stats.delay.unwrap();
        assert_eq!(d.min, 2.0);
        assert_eq!(d.max, 9.0);
        assert!((d.mean - 5.0).abs() < 1e-12);
        // sample std of [2,4,4,4,5,5,7,9]
        assert!((d.std_dev - 2.138_089_935).abs() < 1e-6);
        assert!((stats.cancel_rate() - 100.0 / 9.0).abs() < 1e-9);
    }

    #[test]
    fn empty_frame_has_no_delay_stats() {
        let stats = DatasetStats::compute(&frame(&[])).unwrap();
        assert_eq!(stats.rows, 0);
        assert!(stats.delay.is_none());
        assert_eq!(stats.cancel_rate(), 0.0);
        assert_eq!(stats.to_string(), "0 rows, 0 canceled (0.00%)");
    }
}

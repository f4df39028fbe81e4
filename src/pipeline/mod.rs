// src/pipeline/mod.rs

use serde::Serialize;
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};
use tracing::{error, info, info_span};

use crate::audit::{failure_log_path, AuditCategory, AuditEntry, AuditLog, Effect};
use crate::config::{CleaningConfig, Thresholds};
use crate::error::Result;
use crate::export::{write_parquet, ExportReport};
use crate::frame::TrainFrame;
use crate::load::load_frame;
use crate::rules::RuleEngine;
use crate::stats::DatasetStats;
use crate::validate::{ValidationReport, Validator};

/// What a successful run did.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub input: PathBuf,
    pub output: PathBuf,
    pub log: PathBuf,
    pub rows_in: usize,
    pub rows_out: usize,
    pub duplicates_removed: usize,
    /// Rows affected per kind of change, keyed by effect label.
    pub effects: BTreeMap<&'static str, usize>,
    pub before: DatasetStats,
    pub after: DatasetStats,
    pub validation: ValidationReport,
    pub export: ExportReport,
    pub duration_secs: f64,
}

/// One cleaning run. Opened once, threaded through every stage, consumed by `run`.
pub struct CleaningSession {
    config: CleaningConfig,
    input: PathBuf,
    output: PathBuf,
    log: PathBuf,
    audit: AuditLog,
    /// Set once the cleaned file is in place; a later failure removes it.
    exported: bool,
}

impl CleaningSession {
    /// Validate the configuration before anything touches data.
    pub fn open(config: CleaningConfig) -> Result<Self> {
        config.validate()?;
        let input = config.input_path()?.to_path_buf();
        let output = config.output_path()?;
        let log = config.log_path()?;
        Ok(CleaningSession {
            config,
            input,
            output,
            log,
            audit: AuditLog::new(),
            exported: false,
        })
    }

    pub fn config(&self) -> &CleaningConfig {
        &self.config
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn log_path(&self) -> &Path {
        &self.log
    }

    /// Load, clean, validate, export, then persist the audit log.
    ///
    /// On any error the log is written to the `.failed.txt` path instead and
    /// the error is returned unchanged. A dataset already exported by this run
    /// is removed again, so a failed run leaves no output file.
    pub fn run(mut self) -> Result<RunSummary> {
        let span = info_span!("clean", input = %self.input.display());
        let _enter = span.enter();

        match self.execute() {
            Ok(summary) => Ok(summary),
            Err(err) => {
                self.audit.push(AuditEntry::new(
                    AuditCategory::Failed,
                    format!("{}: {}", err.kind(), err),
                ));
                if self.exported {
                    match fs::remove_file(&self.output) {
                        Ok(()) => self.audit.info(format!(
                            "Removed {} written by this run",
                            self.output.display()
                        )),
                        Err(rm_err) => error!(
                            path = %self.output.display(),
                            error = %rm_err,
                            "could not remove exported dataset"
                        ),
                    }
                }
                let failed_path = failure_log_path(&self.log);
                if let Err(log_err) = self.audit.save(&failed_path, true) {
                    error!(error = %log_err, "could not write failure log");
                }
                Err(err)
            }
        }
    }

    fn execute(&mut self) -> Result<RunSummary> {
        self.audit.info(format!("Loading {}", self.input.display()));
        let frame = load_frame(&self.input)?;
        let rows_in = frame.num_rows();
        self.audit.info(format!("Loaded {} rows", rows_in));

        let before = DatasetStats::compute(&frame)?;
        self.audit.push(before.to_entry("Before"));

        let engine = RuleEngine::from_config(&self.config);
        let cleaned = engine.run(frame, &mut self.audit)?;

        let validation = self.validate(&cleaned)?;

        let after = DatasetStats::compute(&cleaned)?;
        self.audit.push(after.to_entry("After"));

        self.audit.push(AuditEntry::new(
            AuditCategory::Export,
            format!("Writing {}", self.output.display()),
        ));
        let compression = self.config.compression.to_parquet()?;
        let export = write_parquet(&cleaned, &self.output, compression)?;
        self.exported = true;
        self.audit.push(AuditEntry::counted(
            AuditCategory::Success,
            format!(
                "Saved {} ({:.1} MB, {})",
                self.output.display(),
                export.megabytes(),
                export.codec
            ),
            cleaned.num_rows(),
        ));

        let duplicates_removed = self.audit.affected(Effect::DuplicateRemoved);
        let effects = Effect::ALL
            .iter()
            .map(|e| (e.label(), self.audit.affected(*e)))
            .collect();

        self.audit.save(&self.log, false)?;
        info!(
            rows_in,
            rows_out = cleaned.num_rows(),
            duplicates_removed,
            log = %self.log.display(),
            "cleaning complete"
        );

        Ok(RunSummary {
            input: self.input.clone(),
            output: self.output.clone(),
            log: self.log.clone(),
            rows_in,
            rows_out: cleaned.num_rows(),
            duplicates_removed,
            effects,
            before,
            after,
            validation,
            export,
            duration_secs: self.audit.elapsed().as_secs_f64(),
        })
    }

    /// Run all five checks, log each one, then fail if any did.
    fn validate(&mut self, frame: &TrainFrame) -> Result<ValidationReport> {
        self.audit.push(AuditEntry::new(
            AuditCategory::Validation,
            "Validating cleaned data",
        ));
        let report = Validator::new(self.config.thresholds).validate(frame)?;
        for check in &report.checks {
            self.audit.push(check.to_entry());
        }
        if report.is_ok() {
            self.audit.push(AuditEntry::new(
                AuditCategory::Success,
                "All invariant checks passed",
            ));
        }
        report.into_result()
    }
}

/// Run the rule sequence and validator on an in-memory frame, without any I/O.
pub fn clean_frame(frame: TrainFrame, config: &CleaningConfig) -> Result<(TrainFrame, AuditLog)> {
    config.thresholds.validate()?;
    let mut audit = AuditLog::new();
    let cleaned = RuleEngine::from_config(config).run(frame, &mut audit)?;
    let report = Validator::new(config.thresholds).validate(&cleaned)?;
    for check in &report.checks {
        audit.push(check.to_entry());
    }
    report.into_result()?;
    Ok((cleaned, audit))
}

/// Load an existing file and run only the five checks. The report is returned
/// even when checks fail; only load errors are `Err`.
pub fn check_file(path: &Path, thresholds: Thresholds) -> Result<ValidationReport> {
    thresholds.validate()?;
    let frame = load_frame(path)?;
    Validator::new(thresholds).validate(&frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CleanError;
    use crate::export::write_parquet;
    use crate::frame::fixtures::{canceled, delays, frame, Row};
    use crate::frame::{STATION_NAME, TRAIN_LINE_RIDE_ID};
    use crate::rules::{Rule, StationBackfillRule};
    use crate::validate::Invariant;
    use anyhow::Result;
    use arrow::array::{Array, BooleanArray};
    use parquet::basic::Compression;
    use std::collections::HashSet;
    use std::fs;
    use tempfile::tempdir;
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    fn init_test_logging() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("info,railclean=debug")),
            )
            .with_test_writer()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }

    /// A messy month: every rule has something to do.
    fn messy() -> Vec<Row> {
        vec![
            Row {
                station: None,
                xml_station: Some("Frankfurt(Main)Hbf"),
                delay: Some(3),
                ..Default::default()
            },
            Row {
                station: None,
                xml_station: None,
                delay: Some(-1500),
                ..Default::default()
            },
            Row {
                delay: Some(-50),
                ride: Some("X"),
                time: Some(10),
                ..Default::default()
            },
            Row {
                delay: Some(250),
                ride: Some("X"),
                time: Some(20),
                ..Default::default()
            },
            Row {
                delay: Some(15),
                canceled: true,
                ride: Some("Y"),
                time: Some(5),
                departure: None,
                ..Default::default()
            },
            Row {
                delay: Some(-10),
                ride: Some("Z"),
                time: Some(1),
                arrival: None,
                ..Default::default()
            },
            Row {
                delay: None,
                ride: None,
                arrival: None,
                departure: None,
                ..Default::default()
            },
        ]
    }

    fn config_for(dir: &Path) -> CleaningConfig {
        CleaningConfig {
            input: Some(dir.join("raw.parquet")),
            ..Default::default()
        }
    }

    #[test]
    fn full_run_writes_dataset_and_log() -> Result<()> {
        init_test_logging();
        let dir = tempdir()?;
        let cfg = config_for(dir.path());
        write_parquet(&frame(&messy()), cfg.input.as_ref().unwrap(), Compression::SNAPPY)?;

        let summary = CleaningSession::open(cfg)?.run()?;
        assert_eq!(summary.rows_in, 7);
        assert_eq!(summary.rows_out, 6);
        assert_eq!(summary.duplicates_removed, 1);
        assert!(summary.validation.is_ok());
        assert_eq!(summary.output, dir.path().join("raw-cleaned.parquet"));

        let out = crate::load::load_frame(&summary.output)?;
        // the later "X" row (250 -> canceled, 0) survives
        assert_eq!(
            delays(&out),
            vec![Some(3.0), Some(0.0), Some(0.0), Some(0.0), Some(-10.0), None]
        );
        assert_eq!(canceled(&out), vec![false, false, true, true, false, false]);

        let log = fs::read_to_string(&summary.log)?;
        assert!(log.starts_with(&"=".repeat(80)));
        assert!(log.contains("FIXED: Older duplicates removed (latest kept) (Affected rows: 1)"));
        assert!(log.contains("CHECK: Null station_name (Affected rows: 0)"));
        assert!(log.contains("Duration: "));
        assert!(!failure_log_path(&summary.log).exists());
        Ok(())
    }

    #[test]
    fn bad_thresholds_fail_before_loading() {
        let mut cfg = config_for(Path::new("/nonexistent"));
        cfg.thresholds.min_realistic_delay = 0.0;
        assert!(matches!(
            CleaningSession::open(cfg),
            Err(CleanError::Config(_))
        ));
    }

    #[test]
    fn output_may_not_overwrite_input() {
        let cfg = CleaningConfig {
            input: Some(PathBuf::from("a.parquet")),
            output: Some(PathBuf::from("a.parquet")),
            ..Default::default()
        };
        assert!(matches!(
            CleaningSession::open(cfg),
            Err(CleanError::Config(_))
        ));
    }

    #[test]
    fn load_failure_writes_failure_log_and_no_output() -> Result<()> {
        let dir = tempdir()?;
        let cfg = config_for(dir.path());
        let session = CleaningSession::open(cfg.clone())?;
        let log = session.log_path().to_path_buf();

        let err = session.run().unwrap_err();
        assert!(matches!(err, CleanError::Load { .. }));
        assert!(!cfg.output_path()?.exists());
        assert!(!log.exists());
        let failed = fs::read_to_string(failure_log_path(&log))?;
        assert!(failed.contains("FAILED: load error"));
        assert!(failed.contains("Status: FAILED"));
        Ok(())
    }

    #[test]
    fn audit_log_failure_removes_exported_dataset() -> Result<()> {
        init_test_logging();
        let dir = tempdir()?;
        // a non-empty directory where the log file should go
        let log_dir = dir.path().join("logdir");
        fs::create_dir_all(log_dir.join("keep"))?;
        let cfg = CleaningConfig {
            log: Some(log_dir.clone()),
            ..config_for(dir.path())
        };
        write_parquet(&frame(&messy()), cfg.input.as_ref().unwrap(), Compression::SNAPPY)?;
        let output = cfg.output_path()?;

        let err = CleaningSession::open(cfg)?.run().unwrap_err();
        assert!(matches!(err, CleanError::Audit { .. }), "{:?}", err);
        assert!(!output.exists(), "failed run left a cleaned dataset behind");
        let failed = fs::read_to_string(failure_log_path(&log_dir))?;
        assert!(failed.contains("Status: FAILED"));
        assert!(failed.contains("written by this run"));
        Ok(())
    }

    #[test]
    fn log_colliding_with_output_is_rejected_at_open() -> Result<()> {
        let dir = tempdir()?;
        let out = dir.path().join("clean.parquet");
        let cfg = CleaningConfig {
            output: Some(out.clone()),
            log: Some(out),
            ..config_for(dir.path())
        };
        assert!(matches!(
            CleaningSession::open(cfg),
            Err(CleanError::Config(_))
        ));
        Ok(())
    }

    #[test]
    fn partial_rule_set_fails_validation_with_full_report() -> Result<()> {
        // backfill alone leaves the duplicate ride in place
        let f = frame(&[
            Row {
                ride: Some("d"),
                ..Default::default()
            },
            Row {
                ride: Some("d"),
                ..Default::default()
            },
        ]);
        let partially = StationBackfillRule::new("Unknown").apply(&f)?.frame;
        let report = Validator::new(Default::default()).validate(&partially)?;
        assert_eq!(report.violations(Invariant::UniqueRideId), 1);
        assert_eq!(report.failed().count(), 1);
        match report.into_result() {
            Err(CleanError::InvariantViolation(r)) => assert_eq!(r.checks.len(), 5),
            other => panic!("expected InvariantViolation, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn check_reports_raw_file_without_failing() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("raw.parquet");
        write_parquet(&frame(&messy()), &path, Compression::SNAPPY)?;

        let report = check_file(&path, Thresholds::default())?;
        assert!(!report.is_ok());
        assert_eq!(report.violations(Invariant::DelayAboveFloor), 2);
        assert_eq!(report.violations(Invariant::CanceledHasNoDelay), 1);
        assert_eq!(report.violations(Invariant::ExtremeDelayIsCanceled), 1);
        assert_eq!(report.violations(Invariant::StationNamePresent), 2);
        assert_eq!(report.violations(Invariant::UniqueRideId), 1);

        let missing = check_file(&dir.path().join("nope.parquet"), Thresholds::default());
        assert!(matches!(missing, Err(CleanError::Load { .. })));
        Ok(())
    }

    #[test]
    fn cleaning_is_idempotent() -> Result<()> {
        let cfg = CleaningConfig::default();
        let (once, _) = clean_frame(frame(&messy()), &cfg)?;
        let (twice, audit) = clean_frame(once.clone(), &cfg)?;
        assert_eq!(once, twice);
        for effect in [
            Effect::StringTrimmed,
            Effect::StationFromSecondary,
            Effect::StationUnknown,
            Effect::DelayReset,
            Effect::DelayClamped,
            Effect::ExtremeReclassified,
            Effect::CanceledDelayZeroed,
            Effect::DuplicateRemoved,
        ] {
            assert_eq!(audit.affected(effect), 0, "{:?} fired on clean data", effect);
        }
        Ok(())
    }

    #[test]
    fn output_satisfies_every_invariant() -> Result<()> {
        let cfg = CleaningConfig::default();
        let t = cfg.thresholds;
        let (out, _) = clean_frame(frame(&messy()), &cfg)?;

        let d = out.delays()?;
        let c = out.canceled()?;
        for (delay, is_canceled) in d.iter().zip(c.iter()) {
            let is_canceled = is_canceled.unwrap();
            if let Some(v) = delay {
                assert!(v >= t.max_negative_delay);
                assert!(v <= t.extreme_delay_threshold || is_canceled);
                if is_canceled {
                    assert_eq!(v, 0.0);
                }
            }
        }
        assert_eq!(out.strings(STATION_NAME)?.null_count(), 0);

        let ids = out.strings(TRAIN_LINE_RIDE_ID)?;
        let mut seen = HashSet::new();
        for id in ids.iter().flatten() {
            assert!(seen.insert(id.to_string()), "ride id {} survived twice", id);
        }
        Ok(())
    }

    #[test]
    fn rows_are_conserved_up_to_dedup() -> Result<()> {
        let input = frame(&messy());
        let rows_in = input.num_rows();
        let (out, audit) = clean_frame(input, &CleaningConfig::default())?;
        assert_eq!(
            rows_in - audit.affected(Effect::DuplicateRemoved),
            out.num_rows()
        );
        Ok(())
    }

    #[test]
    fn logged_counts_match_a_rescan() -> Result<()> {
        let cfg = CleaningConfig::default();
        let t = cfg.thresholds;
        let input = frame(&messy());
        let raw_delays = input.delays()?;
        let raw_stations = input.strings(STATION_NAME)?;

        let expected_reset = raw_delays
            .iter()
            .flatten()
            .filter(|v| *v < t.min_realistic_delay)
            .count();
        let expected_clamped = raw_delays
            .iter()
            .flatten()
            .filter(|v| *v >= t.min_realistic_delay && *v < t.max_negative_delay)
            .count();
        let expected_extreme = raw_delays
            .iter()
            .flatten()
            .filter(|v| *v > t.extreme_delay_threshold)
            .count();
        let expected_missing_station = raw_stations.null_count();

        let (out, audit) = clean_frame(input, &cfg)?;
        assert_eq!(audit.affected(Effect::DelayReset), expected_reset);
        assert_eq!(audit.affected(Effect::DelayClamped), expected_clamped);
        assert_eq!(audit.affected(Effect::ExtremeReclassified), expected_extreme);
        assert_eq!(
            audit.affected(Effect::StationFromSecondary) + audit.affected(Effect::StationUnknown),
            expected_missing_station
        );

        let flags = |name: &str| -> usize {
            out.column(name)
                .unwrap()
                .as_any()
                .downcast_ref::<BooleanArray>()
                .unwrap()
                .true_count()
        };
        assert_eq!(
            audit.affected(Effect::FlaggedMissingBoth),
            flags(crate::frame::MISSING_BOTH_TIMES)
        );
        assert_eq!(
            audit.affected(Effect::FlaggedFinalStation),
            flags(crate::frame::LIKELY_FINAL_STATION)
        );
        Ok(())
    }
}

// src/audit/mod.rs

use chrono::{DateTime, Local};
use serde::Serialize;
use std::{
    fmt,
    fs,
    io::Write,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};
use tempfile::NamedTempFile;
use tracing::{error, info, warn};

use crate::error::{CleanError, Result};

const RULE_WIDTH: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditCategory {
    Info,
    Rule,
    Found,
    Fixed,
    Flagged,
    Decision,
    Stats,
    Validation,
    Check,
    Success,
    Failed,
    Export,
}

impl AuditCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditCategory::Info => "INFO",
            AuditCategory::Rule => "RULE",
            AuditCategory::Found => "FOUND",
            AuditCategory::Fixed => "FIXED",
            AuditCategory::Flagged => "FLAGGED",
            AuditCategory::Decision => "DECISION",
            AuditCategory::Stats => "STATS",
            AuditCategory::Validation => "VALIDATION",
            AuditCategory::Check => "CHECK",
            AuditCategory::Success => "SUCCESS",
            AuditCategory::Failed => "FAILED",
            AuditCategory::Export => "EXPORT",
        }
    }
}

impl fmt::Display for AuditCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a counted change did to the data. Used to total counts per kind of change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    StringTrimmed,
    StationFromSecondary,
    StationUnknown,
    DelayReset,
    DelayClamped,
    ExtremeReclassified,
    CanceledDelayZeroed,
    DuplicateRemoved,
    FlaggedFinalStation,
    FlaggedStartStation,
    FlaggedMissingBoth,
}

impl Effect {
    pub const ALL: [Effect; 11] = [
        Effect::StringTrimmed,
        Effect::StationFromSecondary,
        Effect::StationUnknown,
        Effect::DelayReset,
        Effect::DelayClamped,
        Effect::ExtremeReclassified,
        Effect::CanceledDelayZeroed,
        Effect::DuplicateRemoved,
        Effect::FlaggedFinalStation,
        Effect::FlaggedStartStation,
        Effect::FlaggedMissingBoth,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Effect::StringTrimmed => "string_trimmed",
            Effect::StationFromSecondary => "station_from_secondary",
            Effect::StationUnknown => "station_unknown",
            Effect::DelayReset => "delay_reset",
            Effect::DelayClamped => "delay_clamped",
            Effect::ExtremeReclassified => "extreme_reclassified",
            Effect::CanceledDelayZeroed => "canceled_delay_zeroed",
            Effect::DuplicateRemoved => "duplicate_removed",
            Effect::FlaggedFinalStation => "flagged_final_station",
            Effect::FlaggedStartStation => "flagged_start_station",
            Effect::FlaggedMissingBoth => "flagged_missing_both",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub at: DateTime<Local>,
    pub category: AuditCategory,
    pub message: String,
    pub count: Option<usize>,
    pub effect: Option<Effect>,
}

impl AuditEntry {
    pub fn new(category: AuditCategory, message: impl Into<String>) -> Self {
        AuditEntry {
            at: Local::now(),
            category,
            message: message.into(),
            count: None,
            effect: None,
        }
    }

    pub fn counted(category: AuditCategory, message: impl Into<String>, count: usize) -> Self {
        AuditEntry {
            count: Some(count),
            ..Self::new(category, message)
        }
    }

    /// A counted entry that also contributes to the per-effect totals.
    pub fn effect(
        category: AuditCategory,
        effect: Effect,
        message: impl Into<String>,
        count: usize,
    ) -> Self {
        AuditEntry {
            effect: Some(effect),
            ..Self::counted(category, message, count)
        }
    }
}

impl fmt::Display for AuditEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.at.format("%H:%M:%S"),
            self.category,
            self.message
        )?;
        if let Some(n) = self.count {
            write!(f, " (Affected rows: {})", n)?;
        }
        Ok(())
    }
}

/// Append-only, ordered record of everything a run did.
#[derive(Debug, Clone)]
pub struct AuditLog {
    started_at: DateTime<Local>,
    started: Instant,
    entries: Vec<AuditEntry>,
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditLog {
    pub fn new() -> Self {
        AuditLog {
            started_at: Local::now(),
            started: Instant::now(),
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, entry: AuditEntry) {
        match entry.category {
            AuditCategory::Failed => error!(count = ?entry.count, "{}: {}", entry.category, entry.message),
            AuditCategory::Check if entry.count.unwrap_or(0) > 0 => {
                warn!(count = ?entry.count, "{}: {}", entry.category, entry.message)
            }
            _ => info!(count = ?entry.count, "{}: {}", entry.category, entry.message),
        }
        self.entries.push(entry);
    }

    pub fn extend(&mut self, entries: impl IntoIterator<Item = AuditEntry>) {
        for e in entries {
            self.push(e);
        }
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(AuditEntry::new(AuditCategory::Info, message));
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Sum of the counts recorded against `effect`.
    pub fn affected(&self, effect: Effect) -> usize {
        self.entries
            .iter()
            .filter(|e| e.effect == Some(effect))
            .filter_map(|e| e.count)
            .sum()
    }

    /// Header, one line per entry, then the trailer with completion time and duration.
    pub fn render(&self, failed: bool) -> String {
        let rule = "=".repeat(RULE_WIDTH);
        let mut out = String::new();
        out.push_str(&rule);
        out.push('\n');
        out.push_str("DATASET CLEANING - AUDIT LOG\n");
        out.push_str(&format!(
            "Date: {}\n",
            self.started_at.format("%Y-%m-%d %H:%M:%S")
        ));
        out.push_str(&rule);
        out.push_str("\n\n");
        for e in &self.entries {
            out.push_str(&e.to_string());
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&rule);
        out.push('\n');
        if failed {
            out.push_str("Status: FAILED\n");
        }
        out.push_str(&format!("Completed: {}\n", Local::now().format("%H:%M:%S")));
        out.push_str(&format!(
            "Duration: {:.2} seconds\n",
            self.elapsed().as_secs_f64()
        ));
        out
    }

    /// Write the rendered log atomically: temp file in the same directory, then rename.
    pub fn save(&self, path: &Path, failed: bool) -> Result<()> {
        let wrap = |source: std::io::Error| CleanError::Audit {
            path: path.to_path_buf(),
            source,
        };
        let dir = parent_dir(path);
        fs::create_dir_all(dir).map_err(wrap)?;
        let mut tmp = NamedTempFile::new_in(dir).map_err(wrap)?;
        tmp.write_all(self.render(failed).as_bytes()).map_err(wrap)?;
        tmp.as_file().sync_all().map_err(wrap)?;
        tmp.persist(path).map_err(|e| wrap(e.error))?;
        info!(path = %path.display(), entries = self.entries.len(), "audit log saved");
        Ok(())
    }
}

/// Where the log of a failed run goes: `<stem>.failed.txt` beside the configured log.
pub fn failure_log_path(log_path: &Path) -> PathBuf {
    let stem = log_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("cleaning_log");
    log_path.with_file_name(format!("{}.failed.txt", stem))
}

pub(crate) fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    #[test]
    fn entry_line_format() {
        let e = AuditEntry::effect(
            AuditCategory::Fixed,
            Effect::DelayClamped,
            "clamped to -30 min",
            1234,
        );
        let line = e.to_string();
        assert!(line.starts_with('['));
        assert_eq!(&line[10..], " FIXED: clamped to -30 min (Affected rows: 1234)");

        let plain = AuditEntry::new(AuditCategory::Decision, "rows flagged, not deleted");
        assert!(plain.to_string().ends_with("] DECISION: rows flagged, not deleted"));
    }

    #[test]
    fn affected_sums_only_matching_effect() {
        let mut log = AuditLog::new();
        log.push(AuditEntry::counted(AuditCategory::Found, "too negative", 7));
        log.push(AuditEntry::effect(AuditCategory::Fixed, Effect::DelayClamped, "a", 3));
        log.push(AuditEntry::effect(AuditCategory::Fixed, Effect::DelayClamped, "b", 4));
        log.push(AuditEntry::effect(AuditCategory::Fixed, Effect::DelayReset, "c", 2));
        assert_eq!(log.affected(Effect::DelayClamped), 7);
        assert_eq!(log.affected(Effect::DelayReset), 2);
        assert_eq!(log.affected(Effect::DuplicateRemoved), 0);
        assert_eq!(log.entries().len(), 4);
    }

    #[test]
    fn rendered_log_has_header_entries_and_trailer() {
        let mut log = AuditLog::new();
        log.info("loading");
        log.push(AuditEntry::counted(AuditCategory::Check, "null station_name", 0));
        let text = log.render(false);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "=".repeat(80));
        assert_eq!(lines[1], "DATASET CLEANING - AUDIT LOG");
        assert!(lines[2].starts_with("Date: "));
        assert!(lines[5].ends_with("INFO: loading"));
        assert!(lines[6].ends_with("CHECK: null station_name (Affected rows: 0)"));
        assert!(lines.iter().any(|l| l.starts_with("Completed: ")));
        assert!(lines.last().unwrap().starts_with("Duration: "));
        assert!(!text.contains("FAILED"));
        assert!(log.render(true).contains("Status: FAILED"));
    }

    #[test]
    fn save_writes_file_atomically() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("logs").join("cleaning_log.txt");
        let mut log = AuditLog::new();
        log.info("hello");
        log.save(&path, false)?;
        let text = fs::read_to_string(&path)?;
        assert!(text.contains("INFO: hello"));
        // only the log itself, no stray temp files
        assert_eq!(fs::read_dir(path.parent().unwrap())?.count(), 1);
        Ok(())
    }

    #[test]
    fn failure_log_sits_next_to_configured_log() {
        assert_eq!(
            failure_log_path(Path::new("out/cleaning_log.txt")),
            PathBuf::from("out/cleaning_log.failed.txt")
        );
    }
}

// src/config/mod.rs

use parquet::basic::{BrotliLevel, Compression, ZstdLevel};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::debug;

use crate::audit::failure_log_path;
use crate::error::{CleanError, Result};

/// Delay thresholds, in minutes.
///
/// Must satisfy `min_realistic_delay < max_negative_delay < extreme_delay_threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Lowest accepted (early) delay; anything between the realistic floor and this is clamped up.
    pub max_negative_delay: f64,
    /// Delays above this are reclassified as cancellations.
    pub extreme_delay_threshold: f64,
    /// Below this a delay is a reporting error and is reset to 0.
    pub min_realistic_delay: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Thresholds {
            max_negative_delay: -30.0,
            extreme_delay_threshold: 180.0,
            min_realistic_delay: -1000.0,
        }
    }
}

impl Thresholds {
    pub fn validate(&self) -> Result<()> {
        let all = [
            ("max_negative_delay", self.max_negative_delay),
            ("extreme_delay_threshold", self.extreme_delay_threshold),
            ("min_realistic_delay", self.min_realistic_delay),
        ];
        if let Some((name, v)) = all.iter().find(|(_, v)| !v.is_finite()) {
            return Err(CleanError::Config(format!("{} must be finite, got {}", name, v)));
        }
        if self.min_realistic_delay >= self.max_negative_delay {
            return Err(CleanError::Config(format!(
                "min_realistic_delay ({}) must be below max_negative_delay ({})",
                self.min_realistic_delay, self.max_negative_delay
            )));
        }
        if self.max_negative_delay >= self.extreme_delay_threshold {
            return Err(CleanError::Config(format!(
                "max_negative_delay ({}) must be below extreme_delay_threshold ({})",
                self.max_negative_delay, self.extreme_delay_threshold
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    #[default]
    Snappy,
    Zstd,
    Brotli,
}

impl std::str::FromStr for Codec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "snappy" => Ok(Codec::Snappy),
            "zstd" => Ok(Codec::Zstd),
            "brotli" => Ok(Codec::Brotli),
            other => Err(format!("unknown codec `{}` (expected snappy, zstd or brotli)", other)),
        }
    }
}

/// Parquet compression for the cleaned file. Every option is lossless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    pub codec: Codec,
    /// Codec level; ignored for snappy. `None` uses the codec's default.
    pub level: Option<u32>,
}

impl CompressionConfig {
    /// Resolve into the parquet writer setting, rejecting out-of-range levels.
    pub fn to_parquet(&self) -> Result<Compression> {
        let bad_level = |e: parquet::errors::ParquetError| {
            CleanError::Config(format!("invalid {:?} level: {}", self.codec, e))
        };
        Ok(match (self.codec, self.level) {
            (Codec::Snappy, _) => Compression::SNAPPY,
            (Codec::Zstd, None) => Compression::ZSTD(ZstdLevel::default()),
            (Codec::Zstd, Some(l)) => {
                let level = i32::try_from(l)
                    .map_err(|_| CleanError::Config(format!("zstd level {} out of range", l)))?;
                Compression::ZSTD(ZstdLevel::try_new(level).map_err(bad_level)?)
            }
            (Codec::Brotli, None) => Compression::BROTLI(BrotliLevel::default()),
            (Codec::Brotli, Some(l)) => Compression::BROTLI(BrotliLevel::try_new(l).map_err(bad_level)?),
        })
    }
}

/// Everything one cleaning run needs to know. Loaded from YAML, then overridden from the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaningConfig {
    pub input: Option<PathBuf>,
    /// Defaults to `<input stem>-cleaned.parquet` next to the input.
    pub output: Option<PathBuf>,
    /// Defaults to `cleaning_log.txt` next to the output.
    pub log: Option<PathBuf>,
    pub thresholds: Thresholds,
    /// Substituted when neither station name is known.
    pub unknown_station_label: String,
    pub trim_strings: bool,
    pub compression: CompressionConfig,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        CleaningConfig {
            input: None,
            output: None,
            log: None,
            thresholds: Thresholds::default(),
            unknown_station_label: "Unknown".to_string(),
            trim_strings: true,
            compression: CompressionConfig::default(),
        }
    }
}

impl CleaningConfig {
    /// Read a YAML config file. Missing fields fall back to their defaults.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| CleanError::Config(format!("reading {}: {}", path.display(), e)))?;
        let cfg = Self::from_yaml_str(&text)
            .map_err(|e| CleanError::Config(format!("{}: {}", path.display(), e)))?;
        debug!(path = %path.display(), "loaded config file");
        Ok(cfg)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, serde_yaml::Error> {
        // an empty document deserializes to unit, not to an empty mapping
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.input.is_none() {
            return Err(CleanError::Config("no input dataset configured".into()));
        }
        self.thresholds.validate()?;
        if self.unknown_station_label.trim().is_empty() {
            return Err(CleanError::Config(
                "unknown_station_label must not be empty".into(),
            ));
        }
        self.compression.to_parquet()?;
        self.check_path_collisions()
    }

    /// Input, output, log and failure log must be four different files.
    fn check_path_collisions(&self) -> Result<()> {
        let log = self.log_path()?;
        let paths = [
            ("input", self.input_path()?.to_path_buf()),
            ("output", self.output_path()?),
            ("log", log.clone()),
            ("failure log", failure_log_path(&log)),
        ];
        let resolved: Vec<PathBuf> = paths.iter().map(|(_, p)| resolve(p)).collect();
        for i in 0..paths.len() {
            for j in (i + 1)..paths.len() {
                if resolved[i] == resolved[j] {
                    return Err(CleanError::Config(format!(
                        "{} and {} are the same file: {}",
                        paths[i].0,
                        paths[j].0,
                        paths[j].1.display()
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn input_path(&self) -> Result<&Path> {
        self.input
            .as_deref()
            .ok_or_else(|| CleanError::Config("no input dataset configured".into()))
    }

    pub fn output_path(&self) -> Result<PathBuf> {
        if let Some(p) = &self.output {
            return Ok(p.clone());
        }
        let input = self.input_path()?;
        let stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("dataset");
        Ok(input.with_file_name(format!("{}-cleaned.parquet", stem)))
    }

    pub fn log_path(&self) -> Result<PathBuf> {
        if let Some(p) = &self.log {
            return Ok(p.clone());
        }
        Ok(self.output_path()?.with_file_name("cleaning_log.txt"))
    }
}

/// Absolute form of `path` for comparison. Existing parents are canonicalized
/// so `./a.parquet`, `a.parquet` and symlinked directories compare equal.
fn resolve(path: &Path) -> PathBuf {
    if let Ok(p) = fs::canonicalize(path) {
        return p;
    }
    let abs = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    match (abs.parent(), abs.file_name()) {
        (Some(parent), Some(name)) => fs::canonicalize(parent)
            .map(|p| p.join(name))
            .unwrap_or(abs.clone()),
        _ => abs,
    }
}

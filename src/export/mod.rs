// src/export/mod.rs

use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use parquet::file::reader::{FileReader, SerializedFileReader};
use serde::Serialize;
use std::{
    fs::{self, File},
    path::{Path, PathBuf},
    time::Instant,
};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument};

use crate::audit::parent_dir;
use crate::error::{CleanError, Result};
use crate::frame::TrainFrame;

const MAX_ROW_GROUP_SIZE: usize = 1_000_000;

/// What ended up on disk, read back from the written file's footer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportReport {
    pub path: PathBuf,
    pub rows: i64,
    pub row_groups: usize,
    pub bytes_on_disk: u64,
    pub compressed_bytes: i64,
    pub uncompressed_bytes: i64,
    pub codec: String,
}

impl ExportReport {
    pub fn megabytes(&self) -> f64 {
        self.bytes_on_disk as f64 / (1024.0 * 1024.0)
    }
}

/// Write `frame` to `path` as Parquet.
///
/// The file is written to a temp file in the destination directory and only
/// renamed over `path` once complete, so a failure never leaves a partial file.
pub fn write_parquet(frame: &TrainFrame, path: &Path, compression: Compression) -> Result<ExportReport> {
    write_batch(frame.batch(), path, compression)
}

/// Same as `write_parquet`, for a batch that need not have the ride columns.
#[instrument(level = "info", skip(batch, path), fields(path = %path.display(), rows = batch.num_rows()))]
pub fn write_batch(batch: &RecordBatch, path: &Path, compression: Compression) -> Result<ExportReport> {
    let start = Instant::now();
    let fail = |e: Box<dyn std::error::Error + Send + Sync>| CleanError::export(path, e);

    let dir = parent_dir(path);
    fs::create_dir_all(dir).map_err(|e| fail(e.into()))?;
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| fail(e.into()))?;
    debug!(tmp = %tmp.path().display(), "writing to temp file");

    let props = WriterProperties::builder()
        .set_compression(compression)
        .set_dictionary_enabled(true)
        .set_max_row_group_size(MAX_ROW_GROUP_SIZE)
        .build();
    let mut writer = ArrowWriter::try_new(&mut tmp, batch.schema(), Some(props))
        .map_err(|e| fail(e.into()))?;
    writer.write(batch).map_err(|e| fail(e.into()))?;
    writer.close().map_err(|e| fail(e.into()))?;

    tmp.as_file().sync_all().map_err(|e| fail(e.into()))?;

    // read the footer back before the rename, so nothing can fail once the file is in place
    let mut report = inspect(tmp.path()).map_err(fail)?;
    tmp.persist(path).map_err(|e| fail(e.error.into()))?;
    report.path = path.to_path_buf();
    info!(
        rows = report.rows,
        mb = %format!("{:.1}", report.megabytes()),
        compressed = report.compressed_bytes,
        uncompressed = report.uncompressed_bytes,
        elapsed = ?start.elapsed(),
        "exported dataset"
    );
    Ok(report)
}

fn inspect(path: &Path) -> std::result::Result<ExportReport, Box<dyn std::error::Error + Send + Sync>> {
    let bytes_on_disk = fs::metadata(path)?.len();
    let reader = SerializedFileReader::new(File::open(path)?)?;
    let meta = reader.metadata();

    let mut compressed = 0i64;
    let mut uncompressed = 0i64;
    let mut codec = String::new();
    for rg in meta.row_groups() {
        for col in rg.columns() {
            compressed += col.compressed_size();
            uncompressed += col.uncompressed_size();
            if codec.is_empty() {
                codec = format!("{:?}", col.compression());
            }
        }
    }

    Ok(ExportReport {
        path: path.to_path_buf(),
        rows: meta.file_metadata().num_rows(),
        row_groups: meta.num_row_groups(),
        bytes_on_disk,
        compressed_bytes: compressed,
        uncompressed_bytes: uncompressed,
        codec,
    })
}

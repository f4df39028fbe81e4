// src/load/mod.rs

use arrow::compute::concat_batches;
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::{fs::File, path::Path, time::Instant};
use tracing::{debug, info, instrument};

use crate::error::{CleanError, Result};
use crate::frame::TrainFrame;

const READ_BATCH_SIZE: usize = 64 * 1024;

/// Read a whole Parquet file into one `RecordBatch`.
pub fn read_parquet(path: &Path) -> Result<RecordBatch> {
    read_parquet_head(path, None)
}

/// Read at most `limit` rows (all of them if `None`) into one `RecordBatch`.
#[instrument(level = "info", skip(path), fields(path = %path.display()))]
pub fn read_parquet_head(path: &Path, limit: Option<usize>) -> Result<RecordBatch> {
    let start = Instant::now();
    let file = File::open(path).map_err(|e| CleanError::load(path, e))?;
    let mut reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(|e| CleanError::load(path, e))?
        .with_batch_size(READ_BATCH_SIZE);
    if let Some(n) = limit {
        reader = reader.with_limit(n);
    }
    let schema = reader.schema().clone();
    let reader = reader.build().map_err(|e| CleanError::load(path, e))?;

    let batches = reader
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| CleanError::load(path, e))?;
    debug!(batches = batches.len(), "read record batches");

    let batch = concat_batches(&schema, &batches).map_err(|e| CleanError::load(path, e))?;
    info!(
        rows = batch.num_rows(),
        columns = batch.num_columns(),
        elapsed = ?start.elapsed(),
        "loaded dataset"
    );
    Ok(batch)
}

/// Load a dataset and check it has the columns the rules need.
pub fn load_frame(path: &Path) -> Result<TrainFrame> {
    TrainFrame::new(read_parquet(path)?)
}

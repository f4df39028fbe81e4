// src/frame/mod.rs

use arrow::array::{
    Array, ArrayRef, BooleanArray, Float64Array, StringArray, TimestampMicrosecondArray,
};
use arrow::compute::{cast, filter_record_batch};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use std::sync::Arc;

use crate::error::{CleanError, Result};

pub const STATION_NAME: &str = "station_name";
pub const XML_STATION_NAME: &str = "xml_station_name";
pub const DELAY_IN_MIN: &str = "delay_in_min";
pub const IS_CANCELED: &str = "is_canceled";
pub const TRAIN_LINE_RIDE_ID: &str = "train_line_ride_id";
pub const TIME: &str = "time";
pub const ARRIVAL_PLANNED_TIME: &str = "arrival_planned_time";
pub const DEPARTURE_PLANNED_TIME: &str = "departure_planned_time";

pub const LIKELY_FINAL_STATION: &str = "likely_final_station";
pub const LIKELY_START_STATION: &str = "likely_start_station";
pub const MISSING_BOTH_TIMES: &str = "missing_both_times";

/// Columns a dataset must have before any rule can run.
pub const REQUIRED_COLUMNS: [&str; 7] = [
    STATION_NAME,
    DELAY_IN_MIN,
    IS_CANCELED,
    TRAIN_LINE_RIDE_ID,
    TIME,
    ARRIVAL_PLANNED_TIME,
    DEPARTURE_PLANNED_TIME,
];

/// The in-memory record set: one station visit per row.
///
/// Wraps a single `RecordBatch` holding every column of the source file,
/// including the ones no rule looks at, so the export keeps column order
/// and types. The typed readers cast into a working representation and
/// `with_column` casts back to whatever the file stored.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainFrame {
    batch: RecordBatch,
}

impl TrainFrame {
    /// Check that every required column exists and can be read in its working type.
    pub fn new(batch: RecordBatch) -> Result<Self> {
        let frame = TrainFrame { batch };
        for name in REQUIRED_COLUMNS {
            frame.column(name)?;
        }
        frame.delays()?;
        frame.canceled()?;
        frame.ride_ids()?;
        frame.times()?;
        frame.strings(STATION_NAME)?;
        if frame.has_column(XML_STATION_NAME) {
            frame.strings(XML_STATION_NAME)?;
        }
        Ok(frame)
    }

    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    pub fn into_batch(self) -> RecordBatch {
        self.batch
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.batch.column_by_name(name).is_some()
    }

    pub fn column(&self, name: &str) -> Result<&ArrayRef> {
        self.batch
            .column_by_name(name)
            .ok_or_else(|| CleanError::MissingColumn(name.to_string()))
    }

    /// `delay_in_min` as f64, whatever numeric type it is stored as.
    pub fn delays(&self) -> Result<Float64Array> {
        self.typed::<Float64Array>(DELAY_IN_MIN, &DataType::Float64)
    }

    /// `is_canceled` with nulls read as `false`.
    pub fn canceled(&self) -> Result<BooleanArray> {
        let raw = self.typed::<BooleanArray>(IS_CANCELED, &DataType::Boolean)?;
        if raw.null_count() == 0 {
            return Ok(raw);
        }
        Ok(raw.iter().map(|v| Some(v.unwrap_or(false))).collect())
    }

    pub fn ride_ids(&self) -> Result<StringArray> {
        self.strings(TRAIN_LINE_RIDE_ID)
    }

    /// Event time in microseconds, for ordering only.
    pub fn times(&self) -> Result<TimestampMicrosecondArray> {
        self.typed::<TimestampMicrosecondArray>(
            TIME,
            &DataType::Timestamp(TimeUnit::Microsecond, None),
        )
    }

    pub fn strings(&self, name: &str) -> Result<StringArray> {
        self.typed::<StringArray>(name, &DataType::Utf8)
    }

    /// Like `strings` but an absent column reads as `None`.
    pub fn optional_strings(&self, name: &str) -> Result<Option<StringArray>> {
        if !self.has_column(name) {
            return Ok(None);
        }
        self.strings(name).map(Some)
    }

    /// Per-row null mask of any column.
    pub fn nulls(&self, name: &str) -> Result<Vec<bool>> {
        let col = self.column(name)?;
        Ok((0..col.len()).map(|i| col.is_null(i)).collect())
    }

    /// Replace `name` (cast back to its stored type) or append it as a new last column.
    pub fn with_column(&self, name: &str, values: ArrayRef, nullable: bool) -> Result<Self> {
        let schema = self.batch.schema();
        let mut fields: Vec<Field> = schema.fields().iter().map(|f| f.as_ref().clone()).collect();
        let mut columns: Vec<ArrayRef> = self.batch.columns().to_vec();

        match schema.index_of(name) {
            Ok(idx) => {
                let stored = fields[idx].data_type().clone();
                let values = if values.data_type() == &stored {
                    values
                } else {
                    cast(values.as_ref(), &stored).map_err(|_| CleanError::ColumnType {
                        column: name.to_string(),
                        data_type: stored.clone(),
                    })?
                };
                if values.null_count() > 0 && !fields[idx].is_nullable() {
                    fields[idx] = fields[idx].clone().with_nullable(true);
                }
                columns[idx] = values;
            }
            Err(_) => {
                fields.push(Field::new(name, values.data_type().clone(), nullable));
                columns.push(values);
            }
        }

        let schema = Arc::new(Schema::new_with_metadata(fields, schema.metadata().clone()));
        Ok(TrainFrame {
            batch: RecordBatch::try_new(schema, columns)?,
        })
    }

    /// Keep only the rows where `keep` is true.
    pub fn filter(&self, keep: &BooleanArray) -> Result<Self> {
        Ok(TrainFrame {
            batch: filter_record_batch(&self.batch, keep)?,
        })
    }

    fn typed<A: Array + Clone + 'static>(&self, name: &str, as_type: &DataType) -> Result<A> {
        let col = self.column(name)?;
        let unsupported = || CleanError::ColumnType {
            column: name.to_string(),
            data_type: col.data_type().clone(),
        };
        let converted = if col.data_type() == as_type {
            col.clone()
        } else {
            cast(col.as_ref(), as_type).map_err(|_| unsupported())?
        };
        converted
            .as_any()
            .downcast_ref::<A>()
            .cloned()
            .ok_or_else(unsupported)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Small in-memory datasets shared by the module tests.

    use super::*;
    use arrow::array::Int64Array;

    /// One row of test input; `None` means null.
    #[derive(Debug, Clone)]
    pub struct Row {
        pub station: Option<&'static str>,
        pub xml_station: Option<&'static str>,
        pub delay: Option<i64>,
        pub canceled: bool,
        pub ride: Option<&'static str>,
        pub time: Option<i64>,
        pub arrival: Option<i64>,
        pub departure: Option<i64>,
    }

    impl Default for Row {
        fn default() -> Self {
            Row {
                station: Some("Berlin Hbf"),
                xml_station: Some("Berlin Hbf"),
                delay: Some(0),
                canceled: false,
                ride: None,
                time: Some(0),
                arrival: Some(0),
                departure: Some(0),
            }
        }
    }

    /// Build a frame with the delay stored as Int64 and a passthrough `train_type` column.
    pub fn frame(rows: &[Row]) -> TrainFrame {
        let schema = Arc::new(Schema::new(vec![
            Field::new(STATION_NAME, DataType::Utf8, true),
            Field::new(XML_STATION_NAME, DataType::Utf8, true),
            Field::new("train_type", DataType::Utf8, true),
            Field::new(DELAY_IN_MIN, DataType::Int64, true),
            Field::new(IS_CANCELED, DataType::Boolean, true),
            Field::new(TRAIN_LINE_RIDE_ID, DataType::Utf8, true),
            Field::new(TIME, DataType::Timestamp(TimeUnit::Microsecond, None), true),
            Field::new(
                ARRIVAL_PLANNED_TIME,
                DataType::Timestamp(TimeUnit::Microsecond, None),
                true,
            ),
            Field::new(
                DEPARTURE_PLANNED_TIME,
                DataType::Timestamp(TimeUnit::Microsecond, None),
                true,
            ),
        ]));
        let columns: Vec<ArrayRef> = vec![
            Arc::new(rows.iter().map(|r| r.station).collect::<StringArray>()),
            Arc::new(rows.iter().map(|r| r.xml_station).collect::<StringArray>()),
            Arc::new(rows.iter().map(|_| Some("ICE")).collect::<StringArray>()),
            Arc::new(rows.iter().map(|r| r.delay).collect::<Int64Array>()),
            Arc::new(rows.iter().map(|r| Some(r.canceled)).collect::<BooleanArray>()),
            Arc::new(rows.iter().map(|r| r.ride).collect::<StringArray>()),
            Arc::new(rows.iter().map(|r| r.time).collect::<TimestampMicrosecondArray>()),
            Arc::new(rows.iter().map(|r| r.arrival).collect::<TimestampMicrosecondArray>()),
            Arc::new(
                rows.iter()
                    .map(|r| r.departure)
                    .collect::<TimestampMicrosecondArray>(),
            ),
        ];
        TrainFrame::new(RecordBatch::try_new(schema, columns).expect("fixture batch"))
            .expect("fixture frame")
    }

    pub fn delays(frame: &TrainFrame) -> Vec<Option<f64>> {
        frame.delays().unwrap().iter().collect()
    }

    pub fn canceled(frame: &TrainFrame) -> Vec<bool> {
        frame.canceled().unwrap().iter().map(|v| v.unwrap()).collect()
    }

    pub fn stations(frame: &TrainFrame) -> Vec<Option<String>> {
        frame
            .strings(STATION_NAME)
            .unwrap()
            .iter()
            .map(|s| s.map(str::to_string))
            .collect()
    }
}

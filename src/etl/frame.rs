//! Arrow record batches of series data.
//!
//! Every batch starts with a `when` column holding the grid times, `Int64`
//! for integral epochs and `Float64` otherwise, followed by one value column
//! per series. Gaps appear as the series fill value, not as nulls.

use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, Int64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;

use crate::core::cancel;
use crate::core::{CancelToken, Datum, Epoch, Result, TimeSeriesFile, TypeCode};
use crate::table::TimeSeriesDataDir;

/// Name of the time column.
pub const TIME_COLUMN: &str = "when";

/// Name of the value column in a single series batch.
pub const VALUE_COLUMN: &str = "value";

pub fn data_type(typecode: TypeCode) -> DataType {
    match typecode {
        TypeCode::Float64 => DataType::Float64,
        TypeCode::Int64 => DataType::Int64,
    }
}

/// The `when` column for the grid slots covering `[start, stop)`.
pub fn time_column(epoch: Epoch, start: f64, stop: f64) -> (Field, ArrayRef) {
    let (first, last) = epoch.offset_bounds(start, stop);
    let offsets = first..last.max(first);
    if epoch.is_integral() {
        let times = Int64Array::from_iter_values(offsets.map(|o| epoch.when(o) as i64));
        (Field::new(TIME_COLUMN, DataType::Int64, false), Arc::new(times))
    } else {
        let times = Float64Array::from_iter_values(offsets.map(|o| epoch.when(o)));
        (Field::new(TIME_COLUMN, DataType::Float64, false), Arc::new(times))
    }
}

/// A value column of `typecode` holding `values`.
pub fn value_column(name: &str, typecode: TypeCode, values: &[Datum]) -> (Field, ArrayRef) {
    let array: ArrayRef = match typecode {
        TypeCode::Float64 => Arc::new(Float64Array::from_iter_values(
            values.iter().map(|v| v.as_f64()),
        )),
        TypeCode::Int64 => Arc::new(Int64Array::from_iter_values(
            values.iter().map(|v| v.as_i64().unwrap_or_default()),
        )),
    };
    (Field::new(name, data_type(typecode), false), array)
}

fn batch(columns: Vec<(Field, ArrayRef)>) -> Result<RecordBatch> {
    let (fields, arrays): (Vec<Field>, Vec<ArrayRef>) = columns.into_iter().unzip();
    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?)
}

impl TimeSeriesFile {
    /// The slots in `[start, stop)` as a `when`/`value` batch.
    pub fn to_record_batch(&mut self, start: f64, stop: f64) -> Result<RecordBatch> {
        let values = self.get_range(start, stop)?;
        batch(vec![
            time_column(self.epoch(), start, stop),
            value_column(VALUE_COLUMN, self.typecode(), &values),
        ])
    }
}

impl TimeSeriesDataDir {
    /// The slots in `[start, stop)` for `keys` (every key if `None`), one
    /// column per key.
    ///
    /// `cancel` is checked between keys and between partitions.
    ///
    /// # Errors
    ///
    /// - `Error::KeyNotFound`: a requested key does not exist
    /// - `Error::Cancelled`: `cancel` fired
    pub fn to_record_batch(
        &mut self,
        start: f64,
        stop: f64,
        keys: Option<&[&str]>,
        cancel: Option<&CancelToken>,
    ) -> Result<RecordBatch> {
        let keys: Vec<String> = match keys {
            Some(keys) => keys.iter().map(|key| key.to_string()).collect(),
            None => self.keys(&[])?,
        };
        let mut columns = vec![time_column(self.epoch(), start, stop)];
        for key in &keys {
            cancel::check(cancel)?;
            let series = self.get(key)?;
            let values = series.get_range_cancellable(start, stop, cancel)?;
            columns.push(value_column(key, series.typecode(), &values));
        }
        batch(columns)
    }
}

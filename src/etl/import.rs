//! CSV import into a data directory.
//!
//! One column holds the timestamp; every other column is a key. Rows are
//! buffered per key and written with one time-ordered `setitems` call each.

use std::io::Read;

use csv::{ReaderBuilder, StringRecord, Trim};
use log::{debug, info};
use time::format_description::well_known::{Iso8601, Rfc3339};
use time::{OffsetDateTime, PrimitiveDateTime};

use crate::core::{Datum, Error, Result};
use crate::table::{is_identifier, TimeSeriesDataDir};

/// How timestamp cells are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeConversion {
    /// UNIX seconds, integral or fractional.
    #[default]
    Seconds,
    /// ISO 8601 / RFC 3339 date-times. A missing offset means UTC.
    Iso8601,
}

impl TimeConversion {
    pub fn convert(self, cell: &str) -> Result<f64> {
        match self {
            TimeConversion::Seconds => cell
                .parse::<f64>()
                .map_err(|_| Error::Parse(format!("invalid UNIX time {cell:?}"))),
            TimeConversion::Iso8601 => parse_iso8601(cell),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CsvImportOptions {
    pub time_column: String,
    pub conversion: TimeConversion,
    pub delimiter: u8,
}

impl Default for CsvImportOptions {
    fn default() -> Self {
        Self {
            time_column: "when".to_string(),
            conversion: TimeConversion::Seconds,
            delimiter: b',',
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ImportStats {
    pub rows: u64,
    pub values: u64,
    pub empty_cells: u64,
    pub keys: Vec<String>,
}

/// Read CSV from `reader` and store every data column in `datadir`.
///
/// # Errors
///
/// - `Error::InvalidValue`: the time column is missing
/// - `Error::InvalidKey`: a column name is not a valid key
/// - `Error::Parse`: a timestamp or value cell is malformed
pub fn import_csv<R: Read>(
    datadir: &mut TimeSeriesDataDir,
    reader: R,
    options: &CsvImportOptions,
) -> Result<ImportStats> {
    let mut csv = ReaderBuilder::new()
        .delimiter(options.delimiter)
        .trim(Trim::All)
        .from_reader(reader);
    let headers = csv.headers()?.clone();
    let time_index = headers
        .iter()
        .position(|h| h == options.time_column)
        .ok_or_else(|| {
            Error::InvalidValue(format!("missing csv column: {}", options.time_column))
        })?;
    let columns: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(index, _)| *index != time_index)
        .map(|(index, name)| {
            if is_identifier(name) {
                Ok((index, name.to_string()))
            } else {
                Err(Error::InvalidKey(name.to_string()))
            }
        })
        .collect::<Result<_>>()?;

    let mut stats = ImportStats {
        keys: columns.iter().map(|(_, key)| key.clone()).collect(),
        ..ImportStats::default()
    };
    let mut buffers: Vec<Vec<(f64, Option<Datum>)>> = vec![Vec::new(); columns.len()];
    let mut record = StringRecord::new();
    while csv.read_record(&mut record)? {
        let line = record.position().map_or(0, |pos| pos.line());
        let cell = record.get(time_index).unwrap_or_default();
        let when = options
            .conversion
            .convert(cell)
            .map_err(|err| Error::Parse(format!("line {line}: {err}")))?;
        for ((index, key), buffer) in columns.iter().zip(buffers.iter_mut()) {
            let cell = record.get(*index).unwrap_or_default();
            if cell.is_empty() {
                stats.empty_cells += 1;
                continue;
            }
            let value = parse_datum(cell)
                .map_err(|err| Error::Parse(format!("line {line}, column {key}: {err}")))?;
            buffer.push((when, Some(value)));
        }
        stats.rows += 1;
    }

    for ((_, key), mut items) in columns.iter().zip(buffers) {
        items.sort_by(|a, b| a.0.total_cmp(&b.0));
        let written = datadir.ts(key)?.setitems(items, true)?;
        debug!("imported {written} values for {key}");
        stats.values += written as u64;
    }
    datadir.flush()?;
    info!(
        "imported rows={} values={} empty_cells={}",
        stats.rows, stats.values, stats.empty_cells
    );
    Ok(stats)
}

/// An integer cell becomes an int datum, anything else numeric a float.
fn parse_datum(cell: &str) -> Result<Datum> {
    if let Ok(value) = cell.parse::<i64>() {
        return Ok(Datum::Int(value));
    }
    cell.parse::<f64>()
        .map(Datum::Float)
        .map_err(|_| Error::Parse(format!("invalid number {cell:?}")))
}

fn parse_iso8601(cell: &str) -> Result<f64> {
    let parsed = OffsetDateTime::parse(cell, &Rfc3339)
        .or_else(|_| OffsetDateTime::parse(cell, &Iso8601::DEFAULT))
        .or_else(|_| PrimitiveDateTime::parse(cell, &Iso8601::DEFAULT).map(|dt| dt.assume_utc()))
        .map_err(|err| Error::Parse(format!("invalid ISO 8601 time {cell:?}: {err}")))?;
    Ok(parsed.unix_timestamp_nanos() as f64 / 1e9)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iso8601_times_convert_to_unix_seconds() {
        let iso = TimeConversion::Iso8601;
        assert_eq!(iso.convert("2024-03-01T00:00:00Z").unwrap(), 1_709_251_200.0);
        assert_eq!(iso.convert("2024-03-01T10:00:00+10:00").unwrap(), 1_709_251_200.0);
        assert_eq!(iso.convert("2024-03-01T00:00:30").unwrap(), 1_709_251_230.0);
        assert!(iso.convert("yesterday").is_err());
    }

    #[test]
    fn seconds_convert_directly() {
        assert_eq!(TimeConversion::Seconds.convert("120.5").unwrap(), 120.5);
        assert!(TimeConversion::Seconds.convert("noon").is_err());
    }

    #[test]
    fn integral_cells_stay_integral() {
        assert_eq!(parse_datum("42").unwrap(), Datum::Int(42));
        assert_eq!(parse_datum("4.5").unwrap(), Datum::Float(4.5));
        assert!(parse_datum("x").is_err());
    }
}

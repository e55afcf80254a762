//! Tabular export and import.
//!
//! [`frame`] builds Arrow record batches from series and data directories.
//! With the `etl` feature, [`sink`] writes batches to Parquet or CSV and
//! [`import`] loads CSV files into a data directory.

pub mod frame;
#[cfg(feature = "etl")]
pub mod import;
#[cfg(feature = "etl")]
pub mod sink;

pub use frame::{TIME_COLUMN, VALUE_COLUMN};
#[cfg(feature = "etl")]
pub use import::{import_csv, CsvImportOptions, ImportStats, TimeConversion};
#[cfg(feature = "etl")]
pub use sink::{CsvSink, ParquetSink, RowSink};

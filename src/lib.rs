//! Portable fixed-step time series storage.
//!
//! Samples live in compact `.csts` files (a 24 byte header and a flat array
//! of 64-bit values), one file per calendar partition, one directory of
//! partitions per field, and one data directory of fields sharing a time grid.

pub mod core;
pub mod etl;
pub mod table;

pub use crate::core::{
    CancelToken, Datum, Endian, Epoch, EpochSpec, Error, Number, Result, TimeSeriesFile,
    TimeSeriesFileHeader, TypeCode,
};
pub use crate::table::{
    CalendarPolicy, CalendarUnit, DataDirOptions, PolicySpec, TimePartition,
    TimeSeriesDataDir, TimeSeriesPartitioned, TimespanPolicy, Timezone,
};

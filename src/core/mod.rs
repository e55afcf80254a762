//! File-level primitives: the time grid, the sample codec, the `.csts`
//! header and the single-file time series built on them.

pub mod cancel;
pub mod codec;
pub mod epoch;
pub mod error;
pub mod header;
pub mod mmap;
pub mod series;

pub use cancel::CancelToken;
pub use codec::{Datum, Endian, Samples, TypeCode};
pub use epoch::{Epoch, EpochRange, EpochSpec, Number};
pub use error::{Error, Result};
pub use header::{TimeSeriesFileHeader, HEADER_LENGTH};
pub use series::{TimeSeriesFile, DOTEXT};

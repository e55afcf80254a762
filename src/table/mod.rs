//! Partitioned storage.
//!
//! This module provides two layers above a single `.csts` file:
//! 1. **TimeSeriesPartitioned**: one logical series split into calendar
//!    partitions by a [`TimespanPolicy`]
//! 2. **TimeSeriesDataDir**: a directory of keyed partitioned series sharing
//!    one epoch and policy
//!
//! ```no_run
//! use csts::table::{DataDirOptions, TimeSeriesDataDir};
//!
//! let options = DataDirOptions::new().epoch((0, 60)).policy("monthly");
//! let mut datadir = TimeSeriesDataDir::open("./energy", options)?;
//! datadir.set_at("solar", 1_709_251_200.0, 4.5)?;
//! let values = datadir.ts("solar")?.get_range(1_709_251_200.0, 1_709_254_800.0)?;
//! datadir.close()?;
//! # Ok::<(), csts::core::Error>(())
//! ```

pub mod config;
mod datadir;
mod partitioned;
mod policy;
pub mod tags;
mod timezone;

pub use config::{DataDirConfig, DataDirSection, CONFIG_FILE};
pub use datadir::{is_identifier, DataDirOptions, TimeSeriesDataDir, DEFAULT_POLICY};
pub use partitioned::{PartitionRef, TimeSeriesPartitioned};
pub use policy::{
    policy_from_name, CalendarPolicy, CalendarUnit, PolicySpec, TimePartition, TimespanPolicy,
};
pub use tags::FsTags;
pub use timezone::Timezone;

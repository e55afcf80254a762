//! A single logical time series split into per-partition `.csts` files.
//!
//! ```no_run
//! use std::sync::Arc;
//! use csts::core::{Epoch, TypeCode};
//! use csts::table::{CalendarPolicy, TimeSeriesPartitioned};
//!
//! let policy = Arc::new(CalendarPolicy::monthly(Epoch::new(0, 60)?));
//! let mut series = TimeSeriesPartitioned::open("data/power", TypeCode::Float64, policy)?;
//! series.set(1_709_251_200.0, 42.0)?;
//! let values = series.get_range(1_709_251_200.0, 1_709_254_800.0)?;
//! series.close()?;
//! # Ok::<(), csts::core::Error>(())
//! ```

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, warn};

use crate::core::cancel;
use crate::core::{
    CancelToken, Datum, Epoch, Error, Number, Result, TimeSeriesFile, TypeCode, DOTEXT,
};
use crate::table::tags::FsTags;
use crate::table::{TimePartition, TimespanPolicy};

/// How a caller names a partition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PartitionRef<'a> {
    /// The partition containing this time.
    Time(f64),
    /// A partition name, optionally with the `.csts` extension.
    Name(&'a str),
}

impl From<f64> for PartitionRef<'_> {
    fn from(when: f64) -> Self {
        PartitionRef::Time(when)
    }
}

impl<'a> From<&'a str> for PartitionRef<'a> {
    fn from(name: &'a str) -> Self {
        PartitionRef::Name(name)
    }
}

#[derive(Debug)]
struct Partition {
    span: TimePartition,
    file: TimeSeriesFile,
}

#[derive(Debug)]
pub struct TimeSeriesPartitioned {
    dir: PathBuf,
    typecode: TypeCode,
    policy: Arc<dyn TimespanPolicy>,
    fill: Option<Datum>,
    tags: FsTags,
    partitions: HashMap<String, Partition>,
}

impl TimeSeriesPartitioned {
    /// Open (creating if needed) the partition directory `dir`.
    pub fn open(
        dir: impl AsRef<Path>,
        typecode: TypeCode,
        policy: Arc<dyn TimespanPolicy>,
    ) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        let tags = FsTags::load(&dir)?;
        Ok(Self {
            dir,
            typecode,
            policy,
            fill: None,
            tags,
            partitions: HashMap::new(),
        })
    }

    /// Use `fill` for gaps instead of the typecode default.
    pub fn with_fill(mut self, fill: Datum) -> Self {
        self.fill = Some(fill);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn typecode(&self) -> TypeCode {
        self.typecode
    }

    pub fn policy(&self) -> &Arc<dyn TimespanPolicy> {
        &self.policy
    }

    pub fn epoch(&self) -> Epoch {
        self.policy.epoch()
    }

    pub fn step(&self) -> f64 {
        self.epoch().step_f64()
    }

    pub fn fill(&self) -> Datum {
        self.fill.unwrap_or(self.typecode.default_fill())
    }

    pub fn tags(&self) -> &FsTags {
        &self.tags
    }

    pub fn tags_mut(&mut self) -> &mut FsTags {
        &mut self.tags
    }

    /// The backing file for a partition, opened and cached on first use.
    ///
    /// The file's own epoch starts at the partition start.
    pub fn subseries<'a>(&mut self, spec: impl Into<PartitionRef<'a>>) -> Result<&mut TimeSeriesFile> {
        match spec.into() {
            PartitionRef::Time(when) => {
                let span = self.policy.span_for_time(when)?;
                self.open_span(span)
            }
            PartitionRef::Name(name) => self.partition_file(name),
        }
    }

    /// The backing file for `name` or `name.csts`.
    pub fn partition_file(&mut self, name: &str) -> Result<&mut TimeSeriesFile> {
        let name = name.strip_suffix(DOTEXT).unwrap_or(name);
        let span = match self.partitions.get(name) {
            Some(partition) => partition.span.clone(),
            None => self.policy.span_for_name(name)?,
        };
        self.open_span(span)
    }

    /// Open the file for `span`, caching it. A file already on disk is
    /// tagged as soon as it is opened.
    fn open_span(&mut self, span: TimePartition) -> Result<&mut TimeSeriesFile> {
        let step = self.epoch().step();
        match self.partitions.entry(span.name.clone()) {
            Entry::Occupied(entry) => Ok(&mut entry.into_mut().file),
            Entry::Vacant(entry) => {
                let path = self.dir.join(format!("{}{DOTEXT}", span.name));
                let file = TimeSeriesFile::open_with_fill(
                    &path,
                    Some(self.typecode),
                    Some(span.local_epoch()?),
                    self.fill,
                )?;
                debug!("open partition {}", path.display());
                if path.exists() {
                    tag_partition(&mut self.tags, &span.name, &file, step)?;
                }
                Ok(&mut entry.insert(Partition { span, file }).file)
            }
        }
    }

    pub fn get(&mut self, when: f64) -> Result<Datum> {
        self.subseries(when)?.get(when)
    }

    /// Values for every slot in `[start, stop)`, gaps filled.
    pub fn get_range(&mut self, start: f64, stop: f64) -> Result<Vec<Datum>> {
        self.get_range_cancellable(start, stop, None)
    }

    /// As [`get_range`](Self::get_range), checking `cancel` between partitions.
    pub fn get_range_cancellable(
        &mut self,
        start: f64,
        stop: f64,
        cancel: Option<&CancelToken>,
    ) -> Result<Vec<Datum>> {
        if stop < start {
            return Err(Error::Index(format!("stop {stop} precedes start {start}")));
        }
        let policy = Arc::clone(&self.policy);
        let mut values = Vec::new();
        for span in policy.partitioned_spans(start, stop) {
            cancel::check(cancel)?;
            let span = span?;
            if span.steps == 0 {
                continue;
            }
            let (from, to) = (span.start(), span.stop());
            let file = self.partition_file(&span.name)?;
            values.extend(file.slice_padded(from, to, true)?);
        }
        Ok(values)
    }

    /// Slice with an optional step, which must match the series step.
    pub fn slice(&mut self, start: f64, stop: f64, step: Option<Number>) -> Result<Vec<Datum>> {
        if let Some(step) = step {
            if step.as_f64() != self.step() {
                return Err(Error::Index(format!(
                    "slice step {step} does not match series step {}",
                    self.epoch().step()
                )));
            }
        }
        self.get_range(start, stop)
    }

    pub fn set(&mut self, when: f64, value: impl Into<Datum>) -> Result<()> {
        self.subseries(when)?.set(when, value)
    }

    /// Store `(when, value)` pairs, returning how many were written.
    ///
    /// A `None` value is skipped if `skip_none`, otherwise it writes the
    /// fill value. Time-ordered input resolves each partition once.
    pub fn setitems<I>(&mut self, items: I, skip_none: bool) -> Result<usize>
    where
        I: IntoIterator<Item = (f64, Option<Datum>)>,
    {
        let mut current: Option<TimePartition> = None;
        let mut written = 0;
        for (when, value) in items {
            if value.is_none() && skip_none {
                continue;
            }
            let span = match current.take() {
                Some(span) if span.contains(when) => span,
                _ => self.policy.span_for_time(when)?,
            };
            if !self.partitions.contains_key(&span.name) {
                self.open_span(span.clone())?;
            }
            let file = match self.partitions.get_mut(&span.name) {
                Some(partition) => &mut partition.file,
                None => return Err(Error::KeyNotFound(span.name)),
            };
            let value = value.unwrap_or(file.fill());
            file.set(when, value)?;
            current = Some(span);
            written += 1;
        }
        Ok(written)
    }

    /// Names of the partitions present on disk or open, sorted.
    pub fn partition_names(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.partitions.keys().cloned().collect();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str().and_then(|n| n.strip_suffix(DOTEXT)) else {
                continue;
            };
            if self.policy.raw_start_for_name(name).is_ok() {
                names.push(name.to_string());
            }
        }
        names.sort();
        names.dedup();
        Ok(names)
    }

    /// Earliest start over the non-empty partitions, `None` if there are none.
    pub fn start(&mut self) -> Result<Option<f64>> {
        Ok(self.extent()?.map(|(start, _)| start))
    }

    /// Latest stop over the non-empty partitions, `None` if there are none.
    pub fn stop(&mut self) -> Result<Option<f64>> {
        Ok(self.extent()?.map(|(_, stop)| stop))
    }

    fn extent(&mut self) -> Result<Option<(f64, f64)>> {
        let mut extent: Option<(f64, f64)> = None;
        for name in self.partition_names()? {
            let file = self.partition_file(&name)?;
            if file.stored_len()? == 0 {
                continue;
            }
            let (start, stop) = (file.start(), file.stop()?);
            extent = Some(match extent {
                Some((lo, hi)) => (lo.min(start), hi.max(stop)),
                None => (start, stop),
            });
        }
        Ok(extent)
    }

    /// Save modified partitions and tag the ones that exist on disk.
    ///
    /// Partitions first written since they were opened get their tags here;
    /// `stop` is refreshed for every open partition.
    pub fn flush(&mut self) -> Result<()> {
        let step = self.epoch().step();
        for partition in self.partitions.values_mut() {
            partition.file.flush()?;
            if partition.file.path().exists() {
                tag_partition(&mut self.tags, &partition.span.name, &partition.file, step)?;
            }
        }
        self.tags.save()
    }

    /// Flush and release every partition file.
    pub fn close(mut self) -> Result<()> {
        self.flush()?;
        for (_, partition) in self.partitions.drain() {
            partition.file.close()?;
        }
        Ok(())
    }
}

fn tag_partition(
    tags: &mut FsTags,
    name: &str,
    file: &TimeSeriesFile,
    step: Number,
) -> Result<()> {
    let entry = format!("{name}{DOTEXT}");
    tags.set(&entry, "partition", name);
    tags.set(&entry, "start", file.start());
    tags.set(&entry, "stop", file.stop()?);
    tags.set(&entry, "step", step);
    Ok(())
}

impl Drop for TimeSeriesPartitioned {
    fn drop(&mut self) {
        if let Err(err) = self.flush() {
            warn!("{}: flush on drop failed: {err}", self.dir.display());
        }
    }
}

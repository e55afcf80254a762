//! A single fixed-step time series stored in one `.csts` file.
//!
//! The file is a [`TimeSeriesFileHeader`] followed by a flat array of
//! samples, slot `i` holding the value for time `epoch.when(i)`. The array
//! is loaded on first use, held in host byte order, and written back only
//! when modified.
//!
//! # Example
//!
//! ```no_run
//! use csts::core::{Epoch, TimeSeriesFile, TypeCode};
//!
//! let mut ts = TimeSeriesFile::open("power.csts", Some(TypeCode::Float64), Some(Epoch::new(0, 60)?))?;
//! ts.set(120.0, 3.5)?;
//! assert_eq!(ts.get(150.0)?.as_f64(), 3.5);
//! ts.close()?;
//! # Ok::<(), csts::core::Error>(())
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::core::codec::{Datum, Endian, Samples, TypeCode, ITEM_SIZE};
use crate::core::header::{TimeSeriesFileHeader, HEADER_LENGTH};
use crate::core::mmap::MappedFile;
use crate::core::{Epoch, Error, Result};

/// Filename extension of data files.
pub const DOTEXT: &str = ".csts";

enum ArrayState {
    Unloaded,
    Loaded { samples: Samples, modified: bool },
}

pub struct TimeSeriesFile {
    path: PathBuf,
    header: TimeSeriesFileHeader,
    fill: Datum,
    state: ArrayState,
}

impl TimeSeriesFile {
    /// Open `path` with the default fill value for its typecode.
    ///
    /// # Errors
    ///
    /// - `Error::Conflict`: the existing header disagrees with `typecode` or the epoch step
    /// - `Error::InvalidValue`: the file is missing and `typecode` or `epoch` was not given
    /// - `Error::Format`: the existing header is malformed
    pub fn open(
        path: impl AsRef<Path>,
        typecode: Option<TypeCode>,
        epoch: Option<Epoch>,
    ) -> Result<Self> {
        Self::open_with_fill(path, typecode, epoch, None)
    }

    pub fn open_with_fill(
        path: impl AsRef<Path>,
        typecode: Option<TypeCode>,
        epoch: Option<Epoch>,
        fill: Option<Datum>,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let header = match read_header(&path)? {
            Some(header) => {
                check_header(&path, &header, typecode, epoch.as_ref())?;
                header
            }
            None => {
                let (Some(typecode), Some(epoch)) = (typecode, epoch) else {
                    return Err(Error::InvalidValue(format!(
                        "{} does not exist, typecode and epoch are required to create it",
                        path.display()
                    )));
                };
                TimeSeriesFileHeader::native(typecode, epoch)
            }
        };
        let fill = match fill {
            Some(fill) => fill.coerce(header.typecode)?,
            None => header.typecode.default_fill(),
        };
        Ok(Self {
            path,
            header,
            fill,
            state: ArrayState::Unloaded,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &TimeSeriesFileHeader {
        &self.header
    }

    pub fn epoch(&self) -> Epoch {
        self.header.epoch
    }

    pub fn typecode(&self) -> TypeCode {
        self.header.typecode
    }

    pub fn endian(&self) -> Endian {
        self.header.endian
    }

    /// Byte order used the next time the file is written.
    pub fn set_endian(&mut self, endian: Endian) -> Result<()> {
        if endian != self.header.endian {
            self.loaded()?;
            self.header.endian = endian;
            self.mark_modified();
        }
        Ok(())
    }

    pub fn fill(&self) -> Datum {
        self.fill
    }

    pub fn start(&self) -> f64 {
        self.header.epoch.start_f64()
    }

    pub fn step(&self) -> f64 {
        self.header.epoch.step_f64()
    }

    /// The time just past the last stored sample.
    pub fn stop(&self) -> Result<f64> {
        Ok(self.index_when(self.stored_len()?))
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state, ArrayState::Loaded { .. })
    }

    pub fn is_modified(&self) -> bool {
        matches!(self.state, ArrayState::Loaded { modified: true, .. })
    }

    /// Flag the loaded array as needing a save, for callers that edit it directly.
    pub fn mark_modified(&mut self) {
        if let ArrayState::Loaded { modified, .. } = &mut self.state {
            *modified = true;
        }
    }

    /// The sample array, loading it on first use.
    pub fn array(&mut self) -> Result<&Samples> {
        Ok(&*self.loaded()?.0)
    }

    /// Mutable access to the sample array. Edits made here are not tracked,
    /// see [`TimeSeriesFile::mark_modified`].
    pub fn array_mut(&mut self) -> Result<&mut Samples> {
        Ok(self.loaded()?.0)
    }

    pub fn len(&mut self) -> Result<usize> {
        Ok(self.array()?.len())
    }

    pub fn is_empty(&mut self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Sample count without forcing a load.
    pub fn stored_len(&self) -> Result<usize> {
        if let ArrayState::Loaded { samples, .. } = &self.state {
            return Ok(samples.len());
        }
        match fs::metadata(&self.path) {
            Ok(meta) => Ok((meta.len() as usize).saturating_sub(HEADER_LENGTH) / ITEM_SIZE),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(err) => Err(err.into()),
        }
    }

    /// The array index for `when`, which may not precede the series start.
    pub fn array_index(&self, when: f64) -> Result<usize> {
        if when.is_nan() || when < self.start() {
            return Err(Error::InvalidValue(format!(
                "when:{when} predates the series start:{}",
                self.start()
            )));
        }
        Ok(self.header.epoch.offset(when) as usize)
    }

    /// Index bounds covering `[start, stop)`.
    ///
    /// # Errors
    ///
    /// - `Error::Index`: `start` precedes the series start or `stop < start`
    pub fn array_index_bounds(&self, start: f64, stop: f64) -> Result<(usize, usize)> {
        let range = self.header.epoch.offset_range(start, stop)?;
        Ok((range.start as usize, range.end as usize))
    }

    pub fn index_when(&self, index: usize) -> f64 {
        self.header.epoch.when(index as i64)
    }

    /// The value at the slot containing `when`, or the fill value past the end.
    pub fn get(&mut self, when: f64) -> Result<Datum> {
        let index = self.array_index(when)?;
        let fill = self.fill;
        Ok(self.array()?.get(index).unwrap_or(fill))
    }

    /// Values for every slot in `[start, stop)`, right padded with the fill value.
    ///
    /// # Errors
    ///
    /// - `Error::Index`: `start` lies before the series start
    pub fn get_range(&mut self, start: f64, stop: f64) -> Result<Vec<Datum>> {
        self.slice_padded(start, stop, false)
    }

    /// Stored values in `[start, stop)` without any padding.
    pub fn slice(&mut self, start: f64, stop: f64) -> Result<Vec<Datum>> {
        let (astart, astop) = self.array_index_bounds(start, stop)?;
        Ok(self.array()?.values(astart, astop))
    }

    /// Values for every slot in `[start, stop)`, right padded with the fill
    /// value. Slots before the series start are filled only if `prepad`.
    pub fn slice_padded(&mut self, start: f64, stop: f64, prepad: bool) -> Result<Vec<Datum>> {
        if stop < start {
            return Err(Error::Index(format!("stop {stop} precedes start {start}")));
        }
        let (astart, astop) = self.header.epoch.offset_bounds(start, stop);
        if astart < 0 && !prepad {
            return Err(Error::Index(format!(
                "start {start} maps to negative index {astart}"
            )));
        }
        let fill = self.fill;
        let span = astop.checked_sub(astart).unwrap_or(i64::MAX);
        let too_wide = || Error::InvalidValue(format!("range [{start}, {stop}) is too wide"));
        let width = usize::try_from(span).map_err(|_| too_wide())?;
        let mut values = Vec::new();
        values.try_reserve_exact(width).map_err(|_| too_wide())?;
        let lead = astart.saturating_neg().clamp(0, span) as usize;
        values.resize(lead, fill);
        let first = astart.max(0) as usize;
        values.extend(self.array()?.values(first, astop.max(0) as usize));
        values.resize(width, fill);
        Ok(values)
    }

    /// Store `value` at the slot containing `when`, padding any gap.
    pub fn set(&mut self, when: f64, value: impl Into<Datum>) -> Result<()> {
        let index = self.array_index(when)?;
        let value: Datum = value.into();
        let value = value.coerce(self.typecode())?;
        self.pad_to_index(index, None)?;
        let (samples, modified) = self.loaded()?;
        samples.set(index, value)?;
        *modified = true;
        Ok(())
    }

    /// Extend the array so that the slot for `when` exists.
    ///
    /// Marks the series modified only if the array grew.
    pub fn pad_to(&mut self, when: f64, fill: Option<Datum>) -> Result<()> {
        let index = self.array_index(when)?;
        self.pad_to_index(index, fill)
    }

    fn pad_to_index(&mut self, index: usize, fill: Option<Datum>) -> Result<()> {
        let fill = fill.unwrap_or(self.fill).coerce(self.typecode())?;
        let (samples, modified) = self.loaded()?;
        if index >= samples.len() {
            samples.resize(index + 1, fill)?;
            *modified = true;
        }
        Ok(())
    }

    /// Every stored `(when, value)` pair in time order.
    pub fn items(&mut self) -> Result<impl Iterator<Item = (f64, Datum)>> {
        let epoch = self.header.epoch;
        let samples = self.array()?;
        let values = samples.values(0, samples.len());
        Ok(values
            .into_iter()
            .enumerate()
            .map(move |(i, value)| (epoch.when(i as i64), value)))
    }

    /// Read the value for `when` directly from the file.
    pub fn peek(&self, when: f64) -> Result<Datum> {
        self.peek_offset(self.array_index(when)?)
    }

    /// Read slot `offset` directly from the file, or the fill value if absent.
    pub fn peek_offset(&self, offset: usize) -> Result<Datum> {
        let Some(mapped) = MappedFile::open(&self.path)? else {
            return Ok(self.fill);
        };
        match mapped.range(HEADER_LENGTH + offset * ITEM_SIZE, ITEM_SIZE) {
            Some(bytes) => self.header.decode_datum(bytes),
            None => Ok(self.fill),
        }
    }

    /// Write the value for `when` directly to the file.
    pub fn poke(&mut self, when: f64, value: impl Into<Datum>) -> Result<()> {
        let offset = self.array_index(when)?;
        self.poke_offset(offset, value)
    }

    /// Write slot `offset` directly to the file, creating the file and
    /// filling any gap past its current end with the fill value.
    ///
    /// A loaded array is updated to match.
    pub fn poke_offset(&mut self, offset: usize, value: impl Into<Datum>) -> Result<()> {
        let value: Datum = value.into();
        let value = value.coerce(self.typecode())?;
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)?;
        let mut flen = file.metadata()?.len() as usize;
        if flen == 0 {
            file.write_all(&self.header.transcribe())?;
            flen = HEADER_LENGTH;
        } else {
            let mut buf = [0u8; HEADER_LENGTH];
            file.read_exact(&mut buf)
                .map_err(|_| Error::Format(format!("{}: truncated header", self.path.display())))?;
            let on_disk = TimeSeriesFileHeader::parse(&buf)?;
            if on_disk.endian != self.header.endian || on_disk.typecode != self.header.typecode {
                return Err(Error::Conflict(format!(
                    "{}: header changed on disk",
                    self.path.display()
                )));
            }
        }
        let data_len = flen - HEADER_LENGTH;
        if data_len % ITEM_SIZE != 0 {
            return Err(Error::Format(format!(
                "{}: data length {data_len} is not a multiple of {ITEM_SIZE}",
                self.path.display()
            )));
        }
        let pos = HEADER_LENGTH + offset * ITEM_SIZE;
        if pos > flen {
            let gap = (pos - flen) / ITEM_SIZE;
            let fill = self.header.encode_datum(self.fill)?;
            let mut padding = Vec::with_capacity(gap * ITEM_SIZE);
            (0..gap).for_each(|_| padding.extend_from_slice(&fill));
            file.seek(SeekFrom::Start(flen as u64))?;
            file.write_all(&padding)?;
        }
        file.seek(SeekFrom::Start(pos as u64))?;
        file.write_all(&self.header.encode_datum(value)?)?;

        let fill = self.fill;
        if let ArrayState::Loaded { samples, .. } = &mut self.state {
            if offset >= samples.len() {
                samples.resize(offset + 1, fill)?;
            }
            samples.set(offset, value)?;
        }
        Ok(())
    }

    /// Save if modified.
    pub fn flush(&mut self) -> Result<()> {
        if self.is_modified() {
            self.save()?;
        }
        Ok(())
    }

    /// Write the header and array to this series' own path.
    pub fn save(&mut self) -> Result<()> {
        let path = self.path.clone();
        self.save_to(&path)?;
        if let ArrayState::Loaded { modified, .. } = &mut self.state {
            *modified = false;
        }
        Ok(())
    }

    /// Write the header and array to `path` in the declared byte order.
    pub fn save_to(&mut self, path: &Path) -> Result<()> {
        let header = self.header;
        let samples = self.array()?;
        let mut buf = Vec::with_capacity(HEADER_LENGTH + samples.len() * ITEM_SIZE);
        buf.extend_from_slice(&header.transcribe());
        samples.encode_to(header.endian, &mut buf);
        debug!(
            "save {} samples to {} ({:?} endian)",
            samples.len(),
            path.display(),
            header.endian
        );
        write_atomic(path, &buf)
    }

    /// Flush and release the series.
    pub fn close(mut self) -> Result<()> {
        self.flush()
    }

    fn loaded(&mut self) -> Result<(&mut Samples, &mut bool)> {
        if let ArrayState::Unloaded = self.state {
            let samples = self.read_samples()?;
            self.state = ArrayState::Loaded {
                samples,
                modified: false,
            };
        }
        match &mut self.state {
            ArrayState::Loaded { samples, modified } => Ok((samples, modified)),
            ArrayState::Unloaded => Err(Error::InvalidValue(format!(
                "{}: array is not loaded",
                self.path.display()
            ))),
        }
    }

    fn read_samples(&self) -> Result<Samples> {
        let Some(mapped) = MappedFile::open(&self.path)? else {
            return Ok(Samples::new(self.typecode()));
        };
        let bytes = mapped.as_slice();
        if bytes.len() < HEADER_LENGTH {
            return Err(Error::Format(format!(
                "{}: truncated header, {} bytes",
                self.path.display(),
                bytes.len()
            )));
        }
        let header = TimeSeriesFileHeader::parse(bytes)?;
        check_header(&self.path, &header, Some(self.typecode()), Some(&self.header.epoch))?;
        if !header.endian.is_native() {
            debug!("{}: byte swapping {:?} endian data", self.path.display(), header.endian);
        }
        let samples = Samples::decode_from(&bytes[HEADER_LENGTH..], header.typecode, header.endian)
            .map_err(|err| Error::Format(format!("{}: {err}", self.path.display())))?;
        debug!("loaded {} samples from {}", samples.len(), self.path.display());
        Ok(samples)
    }
}

impl Drop for TimeSeriesFile {
    fn drop(&mut self) {
        if let Err(err) = self.flush() {
            warn!("{}: flush on drop failed: {err}", self.path.display());
        }
    }
}

impl std::fmt::Debug for TimeSeriesFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeSeriesFile")
            .field("path", &self.path)
            .field("header", &self.header)
            .field("fill", &self.fill)
            .field("loaded", &self.is_loaded())
            .field("modified", &self.is_modified())
            .finish()
    }
}

/// Read just the header of `path`, or `None` if it does not exist.
pub fn read_header(path: &Path) -> Result<Option<TimeSeriesFileHeader>> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let mut buf = [0u8; HEADER_LENGTH];
    let mut got = 0;
    while got < HEADER_LENGTH {
        match file.read(&mut buf[got..])? {
            0 => break,
            n => got += n,
        }
    }
    if got != HEADER_LENGTH {
        return Err(Error::Format(format!(
            "{}: header is {got} bytes, expected {HEADER_LENGTH}",
            path.display()
        )));
    }
    TimeSeriesFileHeader::parse(&buf).map(Some)
}

fn check_header(
    path: &Path,
    header: &TimeSeriesFileHeader,
    typecode: Option<TypeCode>,
    epoch: Option<&Epoch>,
) -> Result<()> {
    if let Some(typecode) = typecode {
        if typecode != header.typecode {
            return Err(Error::Conflict(format!(
                "{}: expected typecode {typecode:?} but the file contains {:?}",
                path.display(),
                header.typecode
            )));
        }
    }
    if let Some(epoch) = epoch {
        if epoch.step_f64() != header.epoch.step_f64() {
            return Err(Error::Conflict(format!(
                "{}: expected step {} but the file has step {}",
                path.display(),
                epoch.step(),
                header.epoch.step()
            )));
        }
        if epoch.time_typecode() != header.time_typecode() {
            warn!(
                "{}: time typecode {:?} differs from expected {:?}",
                path.display(),
                header.time_typecode(),
                epoch.time_typecode()
            );
        }
        if epoch.start_f64() != header.epoch.start_f64() {
            warn!(
                "{}: using file start {} rather than {}",
                path.display(),
                header.epoch.start(),
                epoch.start()
            );
        }
    }
    Ok(())
}

/// Write `data` to a temporary sibling, then rename it over `path`.
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&tmp)?;
    file.write_all(data)?;
    file.sync_all()?;
    fs::rename(&tmp, path)?;
    Ok(())
}

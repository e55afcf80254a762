//! A directory of partitioned series sharing one epoch and policy.
//!
//! Each key lives in its own subdirectory. The shared time grid and policy
//! are recorded in the directory's `tsdatadir.toml` so later opens agree.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use glob_match::glob_match;
use log::debug;

use crate::core::{Datum, Epoch, EpochSpec, Error, Number, Result, TypeCode};
use crate::table::config::DataDirConfig;
use crate::table::tags::{FsTags, DIR_ENTRY};
use crate::table::{CalendarUnit, PolicySpec, TimeSeriesPartitioned, TimespanPolicy, Timezone};

/// Policy used when neither the caller nor the config names one.
pub const DEFAULT_POLICY: &str = "monthly";

/// Settings supplied when opening a [`TimeSeriesDataDir`].
///
/// Anything left `None` is taken from the directory's config.
#[derive(Debug, Clone, Default)]
pub struct DataDirOptions {
    pub epoch: Option<EpochSpec>,
    pub policy: Option<PolicySpec>,
    pub timezone: Option<String>,
    /// Typecode for new keys, `Float64` if unset.
    pub typecode: Option<TypeCode>,
}

impl DataDirOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn epoch(mut self, epoch: impl Into<EpochSpec>) -> Self {
        self.epoch = Some(epoch.into());
        self
    }

    pub fn policy(mut self, policy: impl Into<PolicySpec>) -> Self {
        self.policy = Some(policy.into());
        self
    }

    pub fn timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    pub fn typecode(mut self, typecode: TypeCode) -> Self {
        self.typecode = Some(typecode);
        self
    }
}

#[derive(Debug)]
pub struct TimeSeriesDataDir {
    dir: PathBuf,
    epoch: Epoch,
    policy: Arc<dyn TimespanPolicy>,
    typecode: TypeCode,
    series: BTreeMap<String, TimeSeriesPartitioned>,
}

impl TimeSeriesDataDir {
    /// Open (creating if needed) the data directory `dir`.
    ///
    /// Supplied settings are reconciled with the stored config; settings
    /// missing from the config are written back.
    ///
    /// # Errors
    ///
    /// - `Error::Conflict`: a supplied setting disagrees with the config, or
    ///   a policy instance's grid or timezone disagrees with the others
    /// - `Error::InvalidValue`: no step is known from either source
    pub fn open(dir: impl AsRef<Path>, options: DataDirOptions) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        let mut config = DataDirConfig::load(&dir)?;
        let before = config.clone();
        let section = &mut config.tsdatadir;

        // A policy instance carries its own grid.
        let supplied = match (options.epoch, &options.policy) {
            (Some(spec), _) => Some(spec.resolve()?),
            (None, Some(PolicySpec::Policy(policy))) => Some(policy.epoch()),
            (None, _) => None,
        };
        let epoch = match supplied {
            Some(epoch) => {
                check_number(&dir, "start", section.start, epoch.start())?;
                check_number(&dir, "step", section.step, epoch.step())?;
                epoch
            }
            None => match (section.start, section.step) {
                (Some(start), Some(step)) => Epoch::new(start, step)?,
                (None, Some(step)) => Epoch::from_step(step)?,
                (_, None) => {
                    return Err(Error::InvalidValue(format!(
                        "{}: no step configured or supplied",
                        dir.display()
                    )))
                }
            },
        };
        section.start = Some(epoch.start());
        section.step = Some(epoch.step());

        let supplied_tz = options.timezone.as_deref().map(str::parse::<Timezone>).transpose()?;
        let stored_tz = section
            .policy_tzinfo
            .as_deref()
            .map(str::parse::<Timezone>)
            .transpose()?;
        let spec = options.policy.unwrap_or_else(|| {
            PolicySpec::Name(
                section
                    .policy_name
                    .clone()
                    .unwrap_or_else(|| DEFAULT_POLICY.to_string()),
            )
        });
        let policy = spec.resolve(epoch, supplied_tz.or(stored_tz).unwrap_or_default())?;
        let grid = policy.epoch();
        if grid.start_f64() != epoch.start_f64() || grid.step_f64() != epoch.step_f64() {
            return Err(Error::Conflict(format!(
                "{}: policy grid {grid} does not match {epoch}",
                dir.display()
            )));
        }
        let timezone = policy.timezone();
        for (source, tz) in [("supplied", supplied_tz), ("configured", stored_tz)] {
            if let Some(tz) = tz.filter(|tz| *tz != timezone) {
                return Err(Error::Conflict(format!(
                    "{}: policy timezone {timezone} does not match {source} {tz}",
                    dir.display()
                )));
            }
        }
        section.policy_tzinfo = Some(timezone.name());

        if let Some(stored) = &section.policy_name {
            let stored_name = stored
                .parse::<CalendarUnit>()
                .map(CalendarUnit::name)
                .unwrap_or(stored.as_str());
            if stored_name != policy.name() {
                return Err(Error::Conflict(format!(
                    "{}: policy {} does not match configured {stored}",
                    dir.display(),
                    policy.name()
                )));
            }
        }
        section.policy_name = Some(policy.name().to_string());

        if config != before {
            debug!("{}: writing config {:?}", dir.display(), config.tsdatadir);
            config.save(&dir)?;
        }
        Ok(Self {
            dir,
            epoch,
            policy,
            typecode: options.typecode.unwrap_or(TypeCode::Float64),
            series: BTreeMap::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn step(&self) -> f64 {
        self.epoch.step_f64()
    }

    pub fn policy(&self) -> &Arc<dyn TimespanPolicy> {
        &self.policy
    }

    /// The series for `key`, creating it if it does not exist.
    pub fn ts(&mut self, key: &str) -> Result<&mut TimeSeriesPartitioned> {
        validate_key(key)?;
        if !self.series.contains_key(key) {
            self.make_ts(key)?;
        }
        self.cached(key)
    }

    /// The series for an existing `key`. Never creates one.
    ///
    /// # Errors
    ///
    /// - `Error::KeyNotFound`: `key` has no subdirectory
    pub fn get(&mut self, key: &str) -> Result<&mut TimeSeriesPartitioned> {
        if !self.contains_key(key) {
            return Err(Error::KeyNotFound(key.to_string()));
        }
        self.ts(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.series.contains_key(key) || (is_identifier(key) && self.dir.join(key).is_dir())
    }

    /// Open the subdirectory for `key`, tagging it on creation.
    pub fn make_ts(&mut self, key: &str) -> Result<&mut TimeSeriesPartitioned> {
        validate_key(key)?;
        let subdir = self.dir.join(key);
        let tagged = FsTags::load(&subdir)?;
        let typecode = match tagged.get_str(DIR_ENTRY, "typecode") {
            Some(typecode) => typecode.parse()?,
            None => self.typecode,
        };
        let mut series = TimeSeriesPartitioned::open(&subdir, typecode, Arc::clone(&self.policy))?;
        let tags = series.tags_mut();
        tags.set(DIR_ENTRY, "key", key);
        tags.set(DIR_ENTRY, "step", self.epoch.step());
        tags.set(DIR_ENTRY, "typecode", typecode.to_string());
        tags.save()?;
        debug!("{}: opened key {key} ({typecode})", self.dir.display());
        self.series.insert(key.to_string(), series);
        self.cached(key)
    }

    fn cached(&mut self, key: &str) -> Result<&mut TimeSeriesPartitioned> {
        self.series
            .get_mut(key)
            .ok_or_else(|| Error::KeyNotFound(key.to_string()))
    }

    /// All keys, optionally restricted to those matching any of `globs`.
    pub fn keys(&self, globs: &[&str]) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self.series.keys().cloned().collect();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if is_identifier(name) {
                    keys.push(name.to_string());
                }
            }
        }
        keys.sort();
        keys.dedup();
        if !globs.is_empty() {
            keys.retain(|key| globs.iter().any(|glob| glob_match(glob, key)));
        }
        Ok(keys)
    }

    /// The value of `key` at `when`.
    pub fn get_at(&mut self, key: &str, when: f64) -> Result<Datum> {
        self.get(key)?.get(when)
    }

    /// Store `value` for `key` at `when`, creating the key if needed.
    pub fn set_at(&mut self, key: &str, when: f64, value: impl Into<Datum>) -> Result<()> {
        self.ts(key)?.set(when, value)
    }

    pub fn flush(&mut self) -> Result<()> {
        for series in self.series.values_mut() {
            series.flush()?;
        }
        Ok(())
    }

    /// Flush and close every open key.
    pub fn close(mut self) -> Result<()> {
        for (_, series) in std::mem::take(&mut self.series) {
            series.close()?;
        }
        Ok(())
    }
}

/// Keys are identifiers: `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

fn validate_key(key: &str) -> Result<()> {
    if is_identifier(key) {
        Ok(())
    } else {
        Err(Error::InvalidKey(key.to_string()))
    }
}

fn check_number(dir: &Path, name: &str, stored: Option<Number>, supplied: Number) -> Result<()> {
    match stored {
        Some(stored) if stored.as_f64() != supplied.as_f64() => Err(Error::Conflict(format!(
            "{}: {name} {supplied} does not match configured {stored}",
            dir.display()
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::config::CONFIG_FILE;

    fn options() -> DataDirOptions {
        DataDirOptions::new().epoch((0, 60)).policy("daily")
    }

    #[test]
    fn identifiers() {
        assert!(is_identifier("power"));
        assert!(is_identifier("_x9"));
        assert!(!is_identifier("9x"));
        assert!(!is_identifier("a-b"));
        assert!(!is_identifier(""));
    }

    #[test]
    fn config_is_backfilled_and_reused() {
        let dir = tempfile::tempdir().unwrap();
        TimeSeriesDataDir::open(dir.path(), options()).unwrap();
        assert!(dir.path().join(CONFIG_FILE).exists());
        let reopened = TimeSeriesDataDir::open(dir.path(), DataDirOptions::new()).unwrap();
        assert_eq!(reopened.epoch(), Epoch::new(0, 60).unwrap());
        assert_eq!(reopened.policy().name(), "daily");
    }

    #[test]
    fn conflicting_step_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        TimeSeriesDataDir::open(dir.path(), options()).unwrap();
        let err = TimeSeriesDataDir::open(dir.path(), DataDirOptions::new().epoch(30)).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        let err = TimeSeriesDataDir::open(dir.path(), DataDirOptions::new().policy("weekly"))
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn missing_step_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = TimeSeriesDataDir::open(dir.path(), DataDirOptions::new()).unwrap_err();
        assert!(matches!(err, Error::InvalidValue(_)));
    }

    #[test]
    fn get_does_not_create_keys() {
        let dir = tempfile::tempdir().unwrap();
        let mut datadir = TimeSeriesDataDir::open(dir.path(), options()).unwrap();
        assert!(matches!(datadir.get("power"), Err(Error::KeyNotFound(_))));
        assert!(matches!(datadir.ts("bad-key"), Err(Error::InvalidKey(_))));
        datadir.ts("power").unwrap();
        assert!(datadir.contains_key("power"));
        assert!(datadir.get("power").is_ok());
    }

    #[test]
    fn keys_filter_with_any_glob() {
        let dir = tempfile::tempdir().unwrap();
        let mut datadir = TimeSeriesDataDir::open(dir.path(), options()).unwrap();
        for key in ["grid_in", "grid_out", "solar", "battery"] {
            datadir.ts(key).unwrap();
        }
        assert_eq!(datadir.keys(&[]).unwrap().len(), 4);
        assert_eq!(
            datadir.keys(&["grid_*", "sol*"]).unwrap(),
            ["grid_in", "grid_out", "solar"]
        );
    }

    #[test]
    fn key_typecode_is_remembered() {
        let dir = tempfile::tempdir().unwrap();
        let mut datadir =
            TimeSeriesDataDir::open(dir.path(), options().typecode(TypeCode::Int64)).unwrap();
        datadir.set_at("count", 120.0, 7).unwrap();
        datadir.close().unwrap();

        let mut datadir = TimeSeriesDataDir::open(dir.path(), DataDirOptions::new()).unwrap();
        let series = datadir.get("count").unwrap();
        assert_eq!(series.typecode(), TypeCode::Int64);
        assert_eq!(datadir.get_at("count", 150.0).unwrap(), Datum::Int(7));
    }
}

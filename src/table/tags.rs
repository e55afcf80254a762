use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::core::series::write_atomic;
use crate::core::{Number, Result};

/// Name of the per-directory tag sidecar.
pub const FSTAGS_FILE: &str = ".fstags.json";

/// Entry name under which a directory's own tags are kept.
pub const DIR_ENTRY: &str = ".";

/// Named tags for the entries of one directory, stored in its `.fstags.json`.
#[derive(Debug)]
pub struct FsTags {
    path: PathBuf,
    entries: BTreeMap<String, BTreeMap<String, Value>>,
    modified: bool,
}

impl FsTags {
    /// Load the tags of `dir`, empty if it has none yet.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(FSTAGS_FILE);
        let entries = match fs::read(&path) {
            Ok(data) => serde_json::from_slice(&data)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self {
            path,
            entries,
            modified: false,
        })
    }

    pub fn get(&self, name: &str, tag: &str) -> Option<&Value> {
        self.entries.get(name)?.get(tag)
    }

    pub fn get_str(&self, name: &str, tag: &str) -> Option<&str> {
        self.get(name, tag)?.as_str()
    }

    pub fn set(&mut self, name: &str, tag: &str, value: impl Into<Value>) {
        let value = value.into();
        let tags = self.entries.entry(name.to_string()).or_default();
        if tags.get(tag) != Some(&value) {
            tags.insert(tag.to_string(), value);
            self.modified = true;
        }
    }

    pub fn tags(&self, name: &str) -> Option<&BTreeMap<String, Value>> {
        self.entries.get(name)
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Write the sidecar if anything changed.
    pub fn save(&mut self) -> Result<()> {
        if !self.modified {
            return Ok(());
        }
        let data = serde_json::to_vec_pretty(&self.entries)?;
        write_atomic(&self.path, &data)?;
        self.modified = false;
        Ok(())
    }
}

impl From<Number> for Value {
    fn from(number: Number) -> Self {
        match number {
            Number::Int(i) => Value::from(i),
            Number::Float(f) => Value::from(f),
        }
    }
}

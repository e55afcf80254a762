//! Data directory configuration.
//!
//! Persisted as `tsdatadir.toml`:
//!
//! ```toml
//! [tsdatadir]
//! start = 0
//! step = 60
//! "policy.name" = "monthly"
//! "policy.tzinfo" = "UTC"
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::series::write_atomic;
use crate::core::{Number, Result};

/// Config file name inside a data directory.
pub const CONFIG_FILE: &str = "tsdatadir.toml";

/// Contents of a data directory's config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataDirConfig {
    #[serde(default)]
    pub tsdatadir: DataDirSection,
}

/// The `[tsdatadir]` section. Every key is optional on read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataDirSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<Number>,
    #[serde(
        rename = "policy.name",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub policy_name: Option<String>,
    #[serde(
        rename = "policy.tzinfo",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub policy_tzinfo: Option<String>,
}

impl DataDirConfig {
    /// Read the config in `dir`, empty if there is none.
    pub fn load(dir: &Path) -> Result<Self> {
        match fs::read_to_string(dir.join(CONFIG_FILE)) {
            Ok(text) => Ok(toml::from_str(&text)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(err.into()),
        }
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        let text = toml::to_string_pretty(self)?;
        write_atomic(&dir.join(CONFIG_FILE), text.as_bytes())
    }
}

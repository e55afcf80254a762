use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Malformed or truncated data file.
    #[error("bad format: {0}")]
    Format(String),
    /// Caller-supplied values disagree with what is already on disk.
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid value: {0}")]
    InvalidValue(String),
    #[error("index error: {0}")]
    Index(String),
    #[error("no such key: {0}")]
    KeyNotFound(String),
    #[error("invalid key: {0:?}")]
    InvalidKey(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("operation cancelled")]
    Cancelled,
    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("config decode error: {0}")]
    TomlDecode(#[from] toml::de::Error),
    #[error("config encode error: {0}")]
    TomlEncode(#[from] toml::ser::Error),
    #[cfg(feature = "etl")]
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[cfg(feature = "etl")]
    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
}

pub type Result<T> = std::result::Result<T, Error>;

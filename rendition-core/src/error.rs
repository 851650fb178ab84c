use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures while loading `rendition.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read pipeline config {path}: {source}")]
    Io { source: io::Error, path: PathBuf },
    #[error("failed to parse pipeline config {path}: {source}")]
    Parse {
        source: toml::de::Error,
        path: PathBuf,
    },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

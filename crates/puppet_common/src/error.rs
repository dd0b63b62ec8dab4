//! Error types for configuration access.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("Unknown config key '{0}'")]
    KeyNotFound(String),

    #[error("Invalid value for '{path}': expected {expected}")]
    InvalidValue { path: String, expected: &'static str },

    #[error("Cannot persist config {path}: {source}")]
    Persist {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot encode config: {0}")]
    Encode(#[from] serde_yaml::Error),
}

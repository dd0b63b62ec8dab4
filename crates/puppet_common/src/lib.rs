//! Puppet Common - configuration schema and persistence for the robot supervisor
//!
//! The configuration lives in a single YAML file that other tools (and users)
//! may edit at any time, so it is re-read on every access and written back
//! atomically after every mutation.

pub mod config;
pub mod error;
pub mod logs;
pub mod store;

pub use config::*;
pub use error::ConfigError;
pub use store::{Change, ConfigGuard, ConfigStore};

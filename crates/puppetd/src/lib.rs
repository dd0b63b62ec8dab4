//! puppetd - supervisor for the robot control daemon
//!
//! Starts, stops and restarts the daemon, reacts to configuration changes and
//! runs the long maintenance workflows (self-update, motor reconfiguration,
//! shutdown, hotspot). The binary exposes all of it over a small HTTP API.

pub mod commands;
pub mod daemon;
pub mod dummy;
pub mod error;
pub mod motors;
pub mod routes;
pub mod server;
pub mod sessions;
pub mod supervisor;
pub mod task;

pub use error::{Result, SupervisorError};
pub use supervisor::{Services, Supervisor, SupervisorSettings};

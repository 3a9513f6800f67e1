//! Command-line entry point of the migration: configuration, logging setup
//! and wiring of the remote clients into the pipeline.

pub mod app;
pub mod config;

pub use app::run;
pub use config::{ConfigError, LogFormat, MigrationConfig};

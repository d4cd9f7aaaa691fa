//! Configuration module for the render engine
//!
//! Provides types and parsing for `pxr.toml` configuration.

pub mod loader;
pub mod schema;

pub use loader::{load_config, merge_cli_overrides, CliOverrides, ConfigError};
pub use schema::*;

//! Configuration for the Plexus runtime.
//!
//! Layered loading of logging and bus settings from files, environment
//! variables and code, plus validation.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    BusSettings, LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig, PlexusConfig,
    SpanEventConfig,
};
pub use validation::validate_config;

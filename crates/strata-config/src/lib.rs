//! Configuration for the strata generation pipeline.
//!
//! Settings persist to disk as RON, tolerate missing and unknown fields, and
//! can be overridden from the command line. Every toggle is handed to the
//! component that uses it; nothing here is process-global.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    BoundsPolicy, Config, ContentConfig, DebugConfig, FailurePolicy, GenerationConfig,
    TerrainConfig, WatchdogConfig, default_config_dir,
};
pub use error::ConfigError;

//! Configuration system for Alpine.
//!
//! Provides TOML-based configuration with:
//! - An `[llm]` section selecting the reasoning backend
//! - `[agent]` settings for the tool-dispatch loop
//! - `[services.*]` endpoints, timeouts and credentials for upstream providers
//! - `[data]` paths to the range and cross-reference tables
//! - Config file layering (XDG user config + project-local overrides)
//! - Secret resolution (env var → config file)

pub mod discovery;
pub mod error;
pub mod secrets;
pub mod types;

pub use discovery::{
    LoadedConfig, data_dir, load_config, load_config_file, load_config_with_options,
    xdg_config_dir, xdg_config_path,
};
pub use error::{ConfigError, Result};
pub use secrets::{Credentials, ResolvedSecret, SecretSource, resolve_secret};
pub use types::*;

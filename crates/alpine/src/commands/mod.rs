//! CLI command handlers.

pub mod ask;
pub mod chat;
pub mod config;
pub mod ranges;
pub mod repl;

use alpine_config::{Language, LoadedConfig};

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Output as JSON lines for scripting.
    pub json_output: bool,
    /// Number of `-v` flags.
    pub verbose: u8,
    /// Language the advisor answers in, flag over config.
    pub language: Language,
    /// The merged configuration and where it came from.
    pub loaded: LoadedConfig,
}

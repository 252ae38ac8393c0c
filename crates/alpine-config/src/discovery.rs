//! Config file discovery and layered merging.
//!
//! Resolution order (later overrides earlier):
//! 1. `~/.config/alpine/config.toml` (XDG user config)
//! 2. `./alpine.toml` (project-local)
//! 3. An explicit `--config` file
//! 4. CLI arguments (handled externally)

use std::path::{Path, PathBuf};

use crate::{AlpineConfig, ConfigError, Result};

const PROJECT_CONFIG_FILE: &str = "alpine.toml";
const USER_CONFIG_FILE: &str = "config.toml";
const APP_NAME: &str = "alpine";

/// Environment variable to override the user config directory.
const CONFIG_DIR_ENV: &str = "ALPINE_CONFIG_DIR";

/// Tracks where each config layer was loaded from.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    pub path: PathBuf,
    /// Whether the file was found and loaded.
    pub loaded: bool,
}

/// Result of config discovery and loading.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The merged configuration.
    pub config: AlpineConfig,
    /// Sources that were checked, lowest precedence first.
    pub sources: Vec<ConfigSource>,
    /// Warnings generated during loading (e.g., plaintext API keys).
    pub warnings: Vec<String>,
}

impl LoadedConfig {
    /// Paths of sources that were actually loaded.
    pub fn loaded_from(&self) -> Vec<&Path> {
        self.sources
            .iter()
            .filter(|s| s.loaded)
            .map(|s| s.path.as_path())
            .collect()
    }
}

/// Discover and merge the user and project config layers.
pub fn load_config(project_dir: Option<&Path>) -> Result<LoadedConfig> {
    load_config_with_options(project_dir, None, None)
}

/// Load configuration with explicit control over every layer.
///
/// `config_dir` overrides both `ALPINE_CONFIG_DIR` and the platform default.
/// `explicit_file`, when given, must exist and parse: unlike discovered
/// layers it is an error rather than a warning.
pub fn load_config_with_options(
    project_dir: Option<&Path>,
    config_dir: Option<&Path>,
    explicit_file: Option<&Path>,
) -> Result<LoadedConfig> {
    let mut config = AlpineConfig::new();
    let mut sources = Vec::new();
    let mut warnings = Vec::new();

    let user_config_path = match config_dir {
        Some(dir) => Some(dir.join(USER_CONFIG_FILE)),
        None => xdg_config_path(),
    };
    if let Some(path) = user_config_path {
        sources.push(load_layer(&mut config, &path, &mut warnings));
    }

    let project_path = project_dir
        .map(|d| d.join(PROJECT_CONFIG_FILE))
        .unwrap_or_else(|| PathBuf::from(PROJECT_CONFIG_FILE));
    sources.push(load_layer(&mut config, &project_path, &mut warnings));

    if let Some(path) = explicit_file {
        config.merge(load_config_file(path)?);
        sources.push(ConfigSource {
            path: path.to_path_buf(),
            loaded: true,
        });
    }

    check_plaintext_keys(&config, &mut warnings);

    Ok(LoadedConfig {
        config,
        sources,
        warnings,
    })
}

/// Load config from a specific file path (no discovery).
pub fn load_config_file(path: &Path) -> Result<AlpineConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    AlpineConfig::from_toml(&contents)
}

/// Path of the user config file.
pub fn xdg_config_path() -> Option<PathBuf> {
    xdg_config_dir().map(|d| d.join(USER_CONFIG_FILE))
}

/// User config directory: `ALPINE_CONFIG_DIR`, else the platform default.
pub fn xdg_config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Platform data directory for reference tables and logs.
pub fn data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join(APP_NAME))
}

/// Merge a discovered layer. Missing files are skipped; broken ones warn.
fn load_layer(config: &mut AlpineConfig, path: &Path, warnings: &mut Vec<String>) -> ConfigSource {
    let loaded = path.is_file()
        && match load_config_file(path) {
            Ok(layer) => {
                config.merge(layer);
                true
            }
            Err(e) => {
                warnings.push(format!("Failed to load {}: {}", path.display(), e));
                false
            }
        };

    ConfigSource {
        path: path.to_path_buf(),
        loaded,
    }
}

fn check_plaintext_keys(config: &AlpineConfig, warnings: &mut Vec<String>) {
    if config.llm.as_ref().is_some_and(|l| l.has_plaintext_api_key()) {
        warnings.push(format!(
            "[llm] contains a plaintext API key. Consider setting {} instead.",
            config.llm().backend().env_var()
        ));
    }

    for (service, section) in config.services.iter() {
        if section.api_key.is_some() {
            warnings.push(format!(
                "[services.{}] contains a plaintext API key. Consider setting {} instead.",
                service.key(),
                service.env_var().unwrap_or("an environment variable")
            ));
        }
    }
}

//! Configuration types mapping to the TOML schema.
//!
//! ```toml
//! [llm]                    # reasoning backend
//! [agent]                  # dispatch loop settings
//! [services.catalog]       # route catalog
//! [services.avalanche]     # avalanche bulletins
//! [services.forecast]      # weather forecast
//! [services.geocoder]      # geocoding
//! [data]                   # reference tables
//! [logging]                # file log
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g., project-local
/// overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AlpineConfig {
    pub llm: Option<LlmConfig>,
    pub agent: Option<AgentSection>,
    pub services: ServicesConfig,
    pub data: Option<DataConfig>,
    pub logging: Option<LoggingConfig>,
}

impl AlpineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    pub fn merge(&mut self, other: AlpineConfig) {
        if other.llm.is_some() {
            self.llm = other.llm;
        }
        if other.agent.is_some() {
            self.agent = other.agent;
        }
        self.services.merge(other.services);
        if other.data.is_some() {
            self.data = other.data;
        }
        if other.logging.is_some() {
            self.logging = other.logging;
        }
    }

    /// Agent settings, with defaults when the section is absent.
    pub fn agent(&self) -> AgentSection {
        self.agent.clone().unwrap_or_default()
    }

    /// LLM settings, with defaults when the section is absent.
    pub fn llm(&self) -> LlmConfig {
        self.llm.clone().unwrap_or_default()
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let agent = self.agent();
        if agent.max_steps == 0 {
            return Err(ConfigError::InvalidValue {
                field: "agent.max_steps".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if let Some(retries) = self.llm().max_retries
            && retries > MAX_LLM_RETRIES
        {
            return Err(ConfigError::InvalidValue {
                field: "llm.max_retries".to_string(),
                reason: format!("must be at most {MAX_LLM_RETRIES}, got {retries}"),
            });
        }
        for (service, section) in self.services.iter() {
            if section.timeout_secs == Some(0) {
                return Err(ConfigError::InvalidValue {
                    field: format!("services.{}.timeout_secs", service.key()),
                    reason: "every upstream call needs a bounded, non-zero wait".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Copy of this config with every API key replaced by a mask.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if let Some(ref mut llm) = copy.llm {
            llm.api_key = llm.api_key.as_ref().map(|_| "********".to_string());
        }
        for section in copy.services.iter_mut() {
            section.api_key = section.api_key.as_ref().map(|_| "********".to_string());
        }
        copy
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// LLM Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Supported reasoning backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Anthropic,
    Openai,
}

impl Backend {
    /// Environment variable name for this backend's API key.
    pub fn env_var(&self) -> &'static str {
        match self {
            Backend::Anthropic => "ANTHROPIC_API_KEY",
            Backend::Openai => "OPENAI_API_KEY",
        }
    }

    /// Model used when none is configured.
    pub fn default_model(&self) -> &'static str {
        match self {
            Backend::Anthropic => "claude-sonnet-4-20250514",
            Backend::Openai => "gpt-4o",
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Backend::Anthropic => "Anthropic",
            Backend::Openai => "OpenAI",
        })
    }
}

/// Upper bound for `llm.max_retries`.
pub const MAX_LLM_RETRIES: u32 = 10;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub backend: Option<Backend>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    /// Plaintext key; prefer the backend's environment variable.
    pub api_key: Option<String>,
    pub max_tokens: Option<u32>,
    pub max_retries: Option<u32>,
    pub timeout_secs: Option<u64>,
}

impl LlmConfig {
    pub fn backend(&self) -> Backend {
        self.backend.unwrap_or_default()
    }

    pub fn model(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| self.backend().default_model().to_string())
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens.unwrap_or(4096)
    }

    pub fn has_plaintext_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Agent Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Language the advisor answers in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    French,
    English,
}

impl Language {
    pub fn name(&self) -> &'static str {
        match self {
            Language::French => "French",
            Language::English => "English",
        }
    }
}

impl std::str::FromStr for Language {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fr" | "french" | "francais" | "français" => Ok(Language::French),
            "en" | "english" => Ok(Language::English),
            other => Err(ConfigError::InvalidValue {
                field: "language".to_string(),
                reason: format!("unsupported language '{}'", other),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// Ceiling on tool invocations per user turn.
    pub max_steps: usize,
    pub language: Language,
    /// Length cap for raw payloads returned when summarization fails.
    pub summary_max_chars: usize,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_steps: 10,
            language: Language::default(),
            summary_max_chars: 4000,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Upstream Services
// ─────────────────────────────────────────────────────────────────────────────

/// The upstream providers the advisor talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Catalog,
    Avalanche,
    Forecast,
    Geocoder,
}

impl Service {
    pub const ALL: [Service; 4] = [
        Service::Catalog,
        Service::Avalanche,
        Service::Forecast,
        Service::Geocoder,
    ];

    /// TOML key under `[services]`.
    pub fn key(&self) -> &'static str {
        match self {
            Service::Catalog => "catalog",
            Service::Avalanche => "avalanche",
            Service::Forecast => "forecast",
            Service::Geocoder => "geocoder",
        }
    }

    /// Environment variable holding this service's credential, if it needs one.
    pub fn env_var(&self) -> Option<&'static str> {
        match self {
            Service::Catalog => Some("SKITOUR_API_TOKEN"),
            Service::Avalanche => Some("METEO_FRANCE_API_TOKEN"),
            Service::Forecast => None,
            Service::Geocoder => Some("GOOGLE_MAPS_API_KEY"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
    pub api_key: Option<String>,
}

impl ServiceConfig {
    /// Field-wise merge; set fields in `other` win.
    fn merge(&mut self, other: ServiceConfig) {
        if other.base_url.is_some() {
            self.base_url = other.base_url;
        }
        if other.timeout_secs.is_some() {
            self.timeout_secs = other.timeout_secs;
        }
        if other.api_key.is_some() {
            self.api_key = other.api_key;
        }
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs.unwrap_or(10)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    pub catalog: ServiceConfig,
    pub avalanche: ServiceConfig,
    pub forecast: ServiceConfig,
    pub geocoder: ServiceConfig,
}

impl ServicesConfig {
    pub fn get(&self, service: Service) -> &ServiceConfig {
        match service {
            Service::Catalog => &self.catalog,
            Service::Avalanche => &self.avalanche,
            Service::Forecast => &self.forecast,
            Service::Geocoder => &self.geocoder,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Service, &ServiceConfig)> {
        Service::ALL.into_iter().map(move |s| (s, self.get(s)))
    }

    fn iter_mut(&mut self) -> impl Iterator<Item = &mut ServiceConfig> {
        [
            &mut self.catalog,
            &mut self.avalanche,
            &mut self.forecast,
            &mut self.geocoder,
        ]
        .into_iter()
    }

    fn merge(&mut self, other: ServicesConfig) {
        self.catalog.merge(other.catalog);
        self.avalanche.merge(other.avalanche);
        self.forecast.merge(other.forecast);
        self.geocoder.merge(other.geocoder);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Data and Logging
// ─────────────────────────────────────────────────────────────────────────────

/// Locations of the reference tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Summit points grouped by range name.
    pub ranges: Option<PathBuf>,
    /// Catalog-space to weather-space range identifiers.
    pub crossref: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Write a JSON log file next to console output.
    pub file: bool,
    /// Directory for the rolling log file.
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: true,
            dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_defaults() {
        let config = AlpineConfig::from_toml("").unwrap();
        assert!(config.llm.is_none());
        assert_eq!(config.agent().max_steps, 10);
        assert_eq!(config.agent().language, Language::French);
        assert_eq!(config.llm().backend(), Backend::Anthropic);
        assert_eq!(config.services.catalog.timeout_secs(), 10);
    }

    #[test]
    fn test_parse_full_config() {
        let config = AlpineConfig::from_toml(
            r#"
[llm]
backend = "openai"
max_tokens = 2048

[agent]
max_steps = 6
language = "english"

[services.catalog]
base_url = "http://localhost:9000/api/"
timeout_secs = 3

[services.geocoder]
api_key = "maps-key"

[data]
ranges = "/srv/alpine/ranges.json"
"#,
        )
        .unwrap();

        let llm = config.llm();
        assert_eq!(llm.backend(), Backend::Openai);
        assert_eq!(llm.model(), "gpt-4o");
        assert_eq!(llm.max_tokens(), 2048);

        let agent = config.agent();
        assert_eq!(agent.max_steps, 6);
        assert_eq!(agent.language, Language::English);
        assert_eq!(agent.summary_max_chars, 4000);

        assert_eq!(config.services.catalog.timeout_secs(), 3);
        assert_eq!(config.services.geocoder.api_key.as_deref(), Some("maps-key"));
        assert_eq!(
            config.data.unwrap().ranges,
            Some(PathBuf::from("/srv/alpine/ranges.json"))
        );
    }

    #[test]
    fn test_merge_services_field_wise() {
        let mut base = AlpineConfig::from_toml(
            r#"
[services.avalanche]
base_url = "https://bulletins.example/"
timeout_secs = 5
"#,
        )
        .unwrap();
        let overlay = AlpineConfig::from_toml(
            r#"
[services.avalanche]
timeout_secs = 20
"#,
        )
        .unwrap();

        base.merge(overlay);
        assert_eq!(
            base.services.avalanche.base_url.as_deref(),
            Some("https://bulletins.example/")
        );
        assert_eq!(base.services.avalanche.timeout_secs(), 20);
    }

    #[test]
    fn test_validate_rejects_zero_steps_and_timeouts() {
        let config = AlpineConfig::from_toml("[agent]\nmax_steps = 0\n").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "agent.max_steps"
        ));

        let config = AlpineConfig::from_toml("[services.forecast]\ntimeout_secs = 0\n").unwrap();
        assert!(config.validate().is_err());

        assert!(AlpineConfig::new().validate().is_ok());
    }

    #[test]
    fn test_validate_caps_llm_retries() {
        let config = AlpineConfig::from_toml("[llm]\nmax_retries = 10\n").unwrap();
        assert!(config.validate().is_ok());

        let config = AlpineConfig::from_toml("[llm]\nmax_retries = 4000000000\n").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "llm.max_retries"
        ));
    }

    #[test]
    fn test_redacted_masks_keys() {
        let config = AlpineConfig::from_toml(
            r#"
[llm]
api_key = "sk-ant-secret"

[services.catalog]
api_key = "token"
"#,
        )
        .unwrap();

        let shown = config.redacted().to_toml().unwrap();
        assert!(!shown.contains("sk-ant-secret"));
        assert!(!shown.contains("\"token\""));
        assert!(shown.contains("********"));
    }

    #[test]
    fn test_language_from_str() {
        assert_eq!("FR".parse::<Language>().unwrap(), Language::French);
        assert_eq!("english".parse::<Language>().unwrap(), Language::English);
        assert!("klingon".parse::<Language>().is_err());
        assert_eq!(Service::Forecast.env_var(), None);
    }
}

//! Secret resolution for LLM and upstream service credentials.
//!
//! Resolution order:
//! 1. Environment variable
//! 2. Config file (with warning at load time)

use crate::{AlpineConfig, ConfigError, Result, Service};

/// Result of secret resolution with provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSecret {
    pub value: String,
    pub source: SecretSource,
}

/// Where a secret was resolved from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretSource {
    EnvVar(String),
    /// Config file (plaintext, not recommended).
    ConfigFile,
}

impl std::fmt::Display for SecretSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecretSource::EnvVar(var) => write!(f, "env var {}", var),
            SecretSource::ConfigFile => write!(f, "config file (plaintext)"),
        }
    }
}

/// Resolve a secret from `env_var`, falling back to the config value.
///
/// Empty values count as unset.
pub fn resolve_secret(env_var: &str, config_value: Option<&str>) -> Option<ResolvedSecret> {
    if let Ok(value) = std::env::var(env_var)
        && !value.is_empty()
    {
        return Some(ResolvedSecret {
            value,
            source: SecretSource::EnvVar(env_var.to_string()),
        });
    }

    config_value
        .filter(|v| !v.is_empty())
        .map(|v| ResolvedSecret {
            value: v.to_string(),
            source: SecretSource::ConfigFile,
        })
}

/// Every credential the advisor needs, resolved up front.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub llm: ResolvedSecret,
    pub catalog: ResolvedSecret,
    pub avalanche: ResolvedSecret,
    pub geocoder: ResolvedSecret,
}

impl Credentials {
    /// Resolve all credentials, reporting every missing one together.
    pub fn resolve(config: &AlpineConfig) -> Result<Self> {
        let mut missing = Vec::new();
        let llm = config.llm();

        let llm_key = resolve_secret(llm.backend().env_var(), llm.api_key.as_deref());
        if llm_key.is_none() {
            missing.push(llm.backend().env_var().to_string());
        }

        let mut service_key = |service: Service| {
            let env_var = service.env_var()?;
            let resolved =
                resolve_secret(env_var, config.services.get(service).api_key.as_deref());
            if resolved.is_none() {
                missing.push(env_var.to_string());
            }
            resolved
        };
        let catalog = service_key(Service::Catalog);
        let avalanche = service_key(Service::Avalanche);
        let geocoder = service_key(Service::Geocoder);

        match (llm_key, catalog, avalanche, geocoder) {
            (Some(llm), Some(catalog), Some(avalanche), Some(geocoder)) => Ok(Self {
                llm,
                catalog,
                avalanche,
                geocoder,
            }),
            _ => Err(ConfigError::MissingSecrets(missing)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 4] = [
        "ANTHROPIC_API_KEY",
        "SKITOUR_API_TOKEN",
        "METEO_FRANCE_API_TOKEN",
        "GOOGLE_MAPS_API_KEY",
    ];

    fn clear_env() {
        for var in VARS {
            // SAFETY: tests touching the environment are serialized.
            unsafe { std::env::remove_var(var) };
        }
    }

    #[test]
    #[serial]
    fn test_env_var_wins_over_config() {
        clear_env();
        unsafe { std::env::set_var("SKITOUR_API_TOKEN", "from-env") };

        let secret = resolve_secret("SKITOUR_API_TOKEN", Some("from-file")).unwrap();
        assert_eq!(secret.value, "from-env");
        assert_eq!(
            secret.source,
            SecretSource::EnvVar("SKITOUR_API_TOKEN".to_string())
        );
        clear_env();
    }

    #[test]
    #[serial]
    fn test_config_fallback_and_empty_values() {
        clear_env();
        unsafe { std::env::set_var("GOOGLE_MAPS_API_KEY", "") };

        let secret = resolve_secret("GOOGLE_MAPS_API_KEY", Some("file-key")).unwrap();
        assert_eq!(secret.source, SecretSource::ConfigFile);
        assert!(resolve_secret("GOOGLE_MAPS_API_KEY", Some("")).is_none());
        clear_env();
    }

    #[test]
    #[serial]
    fn test_credentials_report_all_missing() {
        clear_env();
        unsafe { std::env::set_var("ANTHROPIC_API_KEY", "sk-ant") };

        let err = Credentials::resolve(&AlpineConfig::new()).unwrap_err();
        let ConfigError::MissingSecrets(missing) = err else {
            panic!("expected MissingSecrets");
        };
        assert_eq!(
            missing,
            vec![
                "SKITOUR_API_TOKEN".to_string(),
                "METEO_FRANCE_API_TOKEN".to_string(),
                "GOOGLE_MAPS_API_KEY".to_string(),
            ]
        );
        clear_env();
    }

    #[test]
    #[serial]
    fn test_credentials_resolve_from_mixed_sources() {
        clear_env();
        for var in VARS {
            unsafe { std::env::set_var(var, format!("{}-value", var)) };
        }
        unsafe { std::env::remove_var("GOOGLE_MAPS_API_KEY") };

        let config =
            AlpineConfig::from_toml("[services.geocoder]\napi_key = \"maps\"\n").unwrap();
        let creds = Credentials::resolve(&config).unwrap();
        assert_eq!(creds.llm.value, "ANTHROPIC_API_KEY-value");
        assert_eq!(creds.geocoder.value, "maps");
        assert_eq!(creds.geocoder.source, SecretSource::ConfigFile);
        clear_env();
    }
}

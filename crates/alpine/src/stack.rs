//! Wiring from configuration to clients, pipeline and dispatch loop.

use anyhow::{Context as _, Result, bail};
use std::sync::Arc;
use std::time::Duration;

use alpine_advisor::{
    MeteoFranceClient, OpenMeteoClient, PlacesGeocoder, RangeCrossReference, RangeIndex,
    RangeLocator, RouteAdvisor, SkitourClient, Summarizer,
};
use alpine_agent::{DispatchConfig, SystemPromptBuilder, ToolDispatchLoop, advisor_tools};
use alpine_config::{AlpineConfig, Backend, Credentials, Service, resolve_secret};
use alpine_llm::{AnthropicBackend, AnthropicConfig, OpenAiBackend, OpenAiConfig, SharedBackend};

use crate::commands::Context;

/// Reference tables shipped with the binary, used when `[data]` names no file.
const BUNDLED_RANGES: &str = include_str!("../../../data/ranges.json");
const BUNDLED_CROSSREF: &str = include_str!("../../../data/crossref.json");

// ─────────────────────────────────────────────────────────────────────────────
// Reference Data
// ─────────────────────────────────────────────────────────────────────────────

pub fn load_ranges(config: &AlpineConfig) -> Result<RangeIndex> {
    match config.data.as_ref().and_then(|d| d.ranges.as_deref()) {
        Some(path) => Ok(RangeIndex::load(path)?),
        None => RangeIndex::from_json(BUNDLED_RANGES).context("bundled ranges table is invalid"),
    }
}

pub fn load_crossref(config: &AlpineConfig) -> Result<RangeCrossReference> {
    match config.data.as_ref().and_then(|d| d.crossref.as_deref()) {
        Some(path) => Ok(RangeCrossReference::load(path)?),
        None => RangeCrossReference::from_json(BUNDLED_CROSSREF)
            .context("bundled cross-reference table is invalid"),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Clients
// ─────────────────────────────────────────────────────────────────────────────

/// The credential of one service, env var first.
pub fn service_secret(config: &AlpineConfig, service: Service) -> Result<String> {
    let Some(env_var) = service.env_var() else {
        bail!("the {} service takes no credential", service.key());
    };
    resolve_secret(env_var, config.services.get(service).api_key.as_deref())
        .map(|s| s.value)
        .with_context(|| format!("missing credential: set {env_var}"))
}

fn timeout(config: &AlpineConfig, service: Service) -> Duration {
    Duration::from_secs(config.services.get(service).timeout_secs())
}

pub fn catalog_client(config: &AlpineConfig, api_key: &str) -> Result<SkitourClient> {
    let mut client = SkitourClient::new(api_key, timeout(config, Service::Catalog))?;
    if let Some(ref url) = config.services.catalog.base_url {
        client = client.with_base_url(url);
    }
    Ok(client)
}

pub fn avalanche_client(config: &AlpineConfig, api_key: &str) -> Result<MeteoFranceClient> {
    let mut client = MeteoFranceClient::new(api_key, timeout(config, Service::Avalanche))?;
    if let Some(ref url) = config.services.avalanche.base_url {
        client = client.with_base_url(url);
    }
    Ok(client)
}

pub fn forecast_client(config: &AlpineConfig) -> Result<OpenMeteoClient> {
    let mut client = OpenMeteoClient::new(timeout(config, Service::Forecast))?;
    if let Some(ref url) = config.services.forecast.base_url {
        client = client.with_base_url(url);
    }
    Ok(client)
}

pub fn geocoder(config: &AlpineConfig, api_key: &str) -> Result<PlacesGeocoder> {
    let mut client = PlacesGeocoder::new(api_key, timeout(config, Service::Geocoder))?;
    if let Some(ref url) = config.services.geocoder.base_url {
        client = client.with_base_url(url);
    }
    Ok(client)
}

fn llm_backend(config: &AlpineConfig, api_key: &str) -> Result<SharedBackend> {
    let llm = config.llm();
    let backend: SharedBackend = match llm.backend() {
        Backend::Anthropic => {
            let mut cfg = AnthropicConfig::new(api_key);
            if let Some(ref url) = llm.base_url {
                cfg = cfg.with_base_url(url);
            }
            if let Some(secs) = llm.timeout_secs {
                cfg = cfg.with_timeout(Duration::from_secs(secs));
            }
            if let Some(retries) = llm.max_retries {
                cfg = cfg.with_max_retries(retries);
            }
            Arc::new(AnthropicBackend::new(cfg)?)
        }
        Backend::Openai => {
            let mut cfg = OpenAiConfig::openai(api_key);
            if let Some(ref url) = llm.base_url {
                cfg = cfg.with_base_url(url);
            }
            if let Some(secs) = llm.timeout_secs {
                cfg = cfg.with_timeout(Duration::from_secs(secs));
            }
            if let Some(retries) = llm.max_retries {
                cfg = cfg.with_max_retries(retries);
            }
            Arc::new(OpenAiBackend::new(cfg)?)
        }
    };
    Ok(backend)
}

// ─────────────────────────────────────────────────────────────────────────────
// Advisor
// ─────────────────────────────────────────────────────────────────────────────

/// Build the dispatch loop with every tool wired to live services.
pub fn dispatch_loop(ctx: &Context) -> Result<ToolDispatchLoop> {
    let config = &ctx.loaded.config;
    let credentials = Credentials::resolve(config)?;
    tracing::debug!(
        llm = %credentials.llm.source,
        catalog = %credentials.catalog.source,
        avalanche = %credentials.avalanche.source,
        geocoder = %credentials.geocoder.source,
        "Credentials resolved"
    );

    let ranges = Arc::new(load_ranges(config)?);
    let crossref = Arc::new(load_crossref(config)?);
    tracing::info!(
        ranges = ranges.len(),
        mapped_massifs = crossref.len(),
        "Reference data loaded"
    );

    let llm = config.llm();
    let agent = config.agent();
    let backend = llm_backend(config, &credentials.llm.value)?;

    let catalog = Arc::new(catalog_client(config, &credentials.catalog.value)?);
    let locator = Arc::new(RangeLocator::new(
        Arc::new(geocoder(config, &credentials.geocoder.value)?),
        ranges,
        catalog.clone(),
    ));
    let summarizer = Summarizer::new(backend.clone(), llm.model())
        .with_raw_max_chars(agent.summary_max_chars);
    let advisor = Arc::new(RouteAdvisor::new(
        catalog,
        Arc::new(avalanche_client(config, &credentials.avalanche.value)?),
        Arc::new(forecast_client(config)?),
        crossref,
        summarizer,
    ));

    let tools = advisor_tools(locator, advisor);
    let prompt = SystemPromptBuilder::new()
        .with_language(ctx.language.name())
        .with_tools(&tools)
        .build();
    let dispatch_config = DispatchConfig::new(llm.model())
        .with_max_tokens(llm.max_tokens())
        .with_max_steps(agent.max_steps);

    Ok(ToolDispatchLoop::new(backend, tools, dispatch_config).with_system_prompt(prompt))
}

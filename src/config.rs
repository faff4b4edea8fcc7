//! TOML configuration loading.
//!
//! The configuration file carries every record the search core needs:
//!
//! ```toml
//! [settings]
//! debug_mode = false
//! default_language = "en"
//! languages = ["en", "fr"]
//!
//! [connectors.solr]
//! kind = "solr"
//! host = "localhost"
//! path = "/solr"
//! collection = "site"
//!
//! [queries.news]
//! facet_list = ["bundle"]
//!
//! [query_connectors.news]
//! connector = "solr"
//! query = "news"
//! ```
//!
//! Connector `host`, `credentials.username` and `credentials.password`
//! values of the form `ENV:NAME` are resolved from the process environment
//! while loading; an unset variable fails the load.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::models::{
    BackendKind, Connector, FacetDeclaration, GlobalParameter, QueryConnectorBinding,
    QueryDefinition, RecrawlSettings, Settings,
};

const ENV_PREFIX: &str = "ENV:";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub connectors: BTreeMap<String, Connector>,
    #[serde(default)]
    pub queries: BTreeMap<String, QueryDefinition>,
    #[serde(default)]
    pub query_connectors: BTreeMap<String, QueryConnectorBinding>,
    #[serde(default)]
    pub parameters: Vec<GlobalParameter>,
    #[serde(default)]
    pub facets: Vec<FacetDeclaration>,
    #[serde(default)]
    pub recrawl: RecrawlSettings,
    /// Facet term id → language → display label.
    #[serde(default)]
    pub translations: BTreeMap<String, BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

/// Parses, resolves and validates a configuration document.
pub fn parse_config(content: &str) -> Result<Config> {
    let mut config: Config =
        toml::from_str(content).with_context(|| "Failed to parse config file")?;

    for (id, connector) in config.connectors.iter_mut() {
        connector.id = id.clone();
        connector.host = resolve_env(&connector.host)
            .with_context(|| format!("connectors.{}.host", id))?;
        connector.credentials.username = resolve_env(&connector.credentials.username)
            .with_context(|| format!("connectors.{}.credentials.username", id))?;
        connector.credentials.password = resolve_env(&connector.credentials.password)
            .with_context(|| format!("connectors.{}.credentials.password", id))?;
    }
    for (id, query) in config.queries.iter_mut() {
        query.id = id.clone();
    }
    for (id, binding) in config.query_connectors.iter_mut() {
        binding.query_id = id.clone();
    }

    validate(&config)?;

    Ok(config)
}

fn resolve_env(value: &str) -> Result<String> {
    match value.strip_prefix(ENV_PREFIX) {
        Some(name) => std::env::var(name.trim())
            .with_context(|| format!("environment variable '{}' is not set", name.trim())),
        None => Ok(value.to_string()),
    }
}

fn validate(config: &Config) -> Result<()> {
    // Validate settings
    if config.settings.languages.is_empty() {
        anyhow::bail!("settings.languages must list at least one language");
    }
    if !config.settings.is_language(&config.settings.default_language) {
        anyhow::bail!(
            "settings.default_language '{}' must be one of settings.languages",
            config.settings.default_language
        );
    }

    // Validate connectors
    for (id, connector) in &config.connectors {
        if connector.host.trim().is_empty() {
            anyhow::bail!("connectors.{}.host must not be empty", id);
        }
        match connector.scheme.as_str() {
            "http" | "https" => {}
            other => anyhow::bail!(
                "connectors.{}.scheme must be http or https, got '{}'",
                id,
                other
            ),
        }
        if connector.backend == BackendKind::Fusion
            && (connector.app.is_empty() || connector.core.is_empty())
        {
            anyhow::bail!("connectors.{}: fusion connectors need both app and core", id);
        }
    }

    // Bindings must name an existing query; a missing connector may still
    // fall back to "solr" at resolve time.
    for (id, binding) in &config.query_connectors {
        if !config.queries.contains_key(&binding.query) {
            anyhow::bail!(
                "query_connectors.{} references unknown query '{}'",
                id,
                binding.query
            );
        }
    }

    for facet in &config.facets {
        if facet.label.is_empty() || facet.field.is_empty() {
            anyhow::bail!("facets entries need both label and field");
        }
    }

    // Validate recrawl
    if config.recrawl.enabled {
        let domain = &config.recrawl.domain;
        if !(domain.starts_with("http://") || domain.starts_with("https://")) {
            anyhow::bail!("recrawl.domain must start with http:// or https://");
        }
        if domain.ends_with('/') {
            anyhow::bail!("recrawl.domain must not end with a trailing slash");
        }
        if config.recrawl.datasource_name.trim().is_empty() {
            anyhow::bail!("recrawl.datasource_name is required when recrawl is enabled");
        }
    }

    Ok(())
}

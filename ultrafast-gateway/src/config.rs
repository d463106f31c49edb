//! Configuration for the ambient binary: the HTTP server block, the
//! pool/router tuning surface from §6, and the TOML-loaded catalogue
//! (provider descriptors, api keys, model-provider links) that feeds
//! [`ultrafast_models_sdk::catalogue::InMemoryCatalogue`].
//!
//! The real catalogue is a database-backed service out of scope for this
//! crate (§1) — this module exists only to give the ambient binary
//! something routable to boot with, loaded once at startup rather than
//! refreshed transactionally.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use ultrafast_models_sdk::catalogue::{
    ApiKeyDescriptor, InMemoryCatalogue, ModelDescriptor, ModelProviderLink, ModelType,
    ProviderDefaults, ProviderDescriptor, ProviderKind,
};
use ultrafast_models_sdk::pool::PoolConfig;
use ultrafast_models_sdk::router::RouterConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub pool: PoolSettings,
    #[serde(default)]
    pub router: RouterSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub providers: HashMap<String, ProviderEntry>,
    #[serde(default)]
    pub models: HashMap<String, ModelEntry>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            pool: PoolSettings::default(),
            router: RouterSettings::default(),
            logging: LoggingConfig::default(),
            providers: HashMap::new(),
            models: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(with = "ultrafast_models_sdk::common::duration_serde")]
    pub timeout: Duration,
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            timeout: Duration::from_secs(30),
            max_body_size: 10 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// The pool half of §6's configuration surface, one field per
/// [`PoolConfig`] knob. Kept as a separate, plain-integer struct rather
/// than deriving `Serialize`/`Deserialize` directly on `PoolConfig` so the
/// wire/file format stays `_s`-suffixed seconds instead of `Duration`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSettings {
    pub min_pool_size: usize,
    pub max_pool_size: usize,
    pub num_shards: usize,
    pub max_idle_time_s: u64,
    pub max_use_count: u64,
    pub cleanup_interval_s: u64,
    pub health_check_interval_s: u64,
    pub health_check_timeout_s: u64,
    pub wait_timeout_s: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        let defaults = PoolConfig::default();
        Self {
            min_pool_size: defaults.min_pool_size,
            max_pool_size: defaults.max_pool_size,
            num_shards: defaults.num_shards,
            max_idle_time_s: defaults.max_idle_time.as_secs(),
            max_use_count: defaults.max_use_count,
            cleanup_interval_s: defaults.cleanup_interval.as_secs(),
            health_check_interval_s: defaults.health_check_interval.as_secs(),
            health_check_timeout_s: defaults.health_check_timeout.as_secs(),
            wait_timeout_s: defaults.wait_timeout.as_secs(),
        }
    }
}

impl From<&PoolSettings> for PoolConfig {
    fn from(settings: &PoolSettings) -> Self {
        PoolConfig {
            min_pool_size: settings.min_pool_size,
            max_pool_size: settings.max_pool_size,
            num_shards: settings.num_shards,
            max_idle_time: Duration::from_secs(settings.max_idle_time_s),
            max_use_count: settings.max_use_count,
            cleanup_interval: Duration::from_secs(settings.cleanup_interval_s),
            health_check_interval: Duration::from_secs(settings.health_check_interval_s),
            health_check_timeout: Duration::from_secs(settings.health_check_timeout_s),
            wait_timeout: Duration::from_secs(settings.wait_timeout_s),
        }
    }
}

/// The load-balancer half of §6's configuration surface. `cache_ttl_s`,
/// `max_retries` and `retry_delay_s` are named there too but belong to the
/// catalogue cache and an outer retry policy, not the stateless router
/// core (no request-level retry across providers unless an outer policy
/// invokes it) — only the three scoring weights are plumbed through to
/// [`RouterConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterSettings {
    pub success_rate_weight: f64,
    pub response_time_weight: f64,
    pub cost_weight: f64,
}

impl Default for RouterSettings {
    fn default() -> Self {
        let defaults = RouterConfig::default();
        Self {
            success_rate_weight: defaults.success_rate_weight,
            response_time_weight: defaults.response_time_weight,
            cost_weight: defaults.cost_weight,
        }
    }
}

impl From<&RouterSettings> for RouterConfig {
    fn from(settings: &RouterSettings) -> Self {
        RouterConfig {
            min_health: ultrafast_models_sdk::providers::HealthStatus::Degraded,
            success_rate_weight: settings.success_rate_weight,
            response_time_weight: settings.response_time_weight,
            cost_weight: settings.cost_weight,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKindConfig {
    PublicCloud,
    ThirdParty,
    Private,
}

impl Default for ProviderKindConfig {
    fn default() -> Self {
        ProviderKindConfig::PublicCloud
    }
}

impl From<ProviderKindConfig> for ProviderKind {
    fn from(kind: ProviderKindConfig) -> Self {
        match kind {
            ProviderKindConfig::PublicCloud => ProviderKind::PublicCloud,
            ProviderKindConfig::ThirdParty => ProviderKind::ThirdParty,
            ProviderKindConfig::Private => ProviderKind::Private,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    #[serde(default)]
    pub kind: ProviderKindConfig,
    #[serde(default)]
    pub official_endpoint: Option<String>,
    #[serde(default)]
    pub third_party_endpoint: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_timeout_s")]
    pub timeout_s: u64,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default)]
    pub use_max_completion_tokens: Option<bool>,
    #[serde(default)]
    pub supports_temperature: Option<bool>,
    #[serde(default)]
    pub api_keys: Vec<ApiKeyEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyEntry {
    pub api_key: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub preferred: bool,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub daily_quota: Option<u64>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTypeConfig {
    Public,
    Private,
}

impl Default for ModelTypeConfig {
    fn default() -> Self {
        ModelTypeConfig::Public
    }
}

impl From<ModelTypeConfig> for ModelType {
    fn from(kind: ModelTypeConfig) -> Self {
        match kind {
            ModelTypeConfig::Public => ModelType::Public,
            ModelTypeConfig::Private => ModelType::Private,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    #[serde(default)]
    pub model_type: ModelTypeConfig,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub providers: Vec<ModelProviderEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelProviderEntry {
    pub provider: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub preferred: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub cost_per_1k_tokens: f64,
}

fn default_true() -> bool {
    true
}

fn default_weight() -> f64 {
    1.0
}

fn default_timeout_s() -> u64 {
    30
}

fn default_retry_count() -> u32 {
    3
}

impl Config {
    /// Load from a TOML file, falling back silently to defaults if the
    /// file is missing, then apply `GATEWAY_*` environment overrides.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("GATEWAY").separator("__"));
        let mut config: Config = builder.build()?.try_deserialize()?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// A handful of top-level knobs get a dedicated, documented
    /// environment variable rather than relying on the generic
    /// `GATEWAY__SERVER__HOST`-style nested override.
    pub fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        if let Ok(host) = env::var("GATEWAY_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = env::var("GATEWAY_PORT") {
            self.server.port = port.parse()?;
        }
        if let Ok(timeout) = env::var("GATEWAY_TIMEOUT") {
            self.server.timeout = parse_duration(&timeout)?;
        }
        if let Ok(level) = env::var("GATEWAY_LOG_LEVEL") {
            self.logging.level = level;
        }
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("server.port must be nonzero");
        }
        if self.server.max_body_size == 0 {
            anyhow::bail!("server.max_body_size must be nonzero");
        }
        if self.pool.min_pool_size > self.pool.max_pool_size {
            anyhow::bail!("pool.min_pool_size must not exceed pool.max_pool_size");
        }
        if self.pool.num_shards == 0 {
            anyhow::bail!("pool.num_shards must be nonzero");
        }
        for (name, entry) in &self.providers {
            if entry.enabled && !entry.api_keys.is_empty() && entry.api_keys.iter().all(|k| !k.enabled)
            {
                tracing::warn!(provider = name, "provider is enabled but every api key is disabled");
            }
        }
        Ok(())
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig::from(&self.pool)
    }

    pub fn router_config(&self) -> RouterConfig {
        RouterConfig::from(&self.router)
    }

    /// Materialize the configured providers/models/api-keys into an
    /// [`InMemoryCatalogue`] (the reference catalogue implementation).
    /// Ids are assigned deterministically from iteration order since the
    /// TOML file carries names, not ids.
    pub fn build_catalogue(&self) -> InMemoryCatalogue {
        let catalogue = InMemoryCatalogue::new();
        let mut provider_ids: HashMap<String, u64> = HashMap::new();

        for (index, (name, entry)) in self.providers.iter().enumerate() {
            let provider_id = (index as u64) + 1;
            provider_ids.insert(name.clone(), provider_id);
            catalogue.add_provider(ProviderDescriptor {
                id: provider_id,
                name: name.clone(),
                kind: entry.kind.into(),
                official_endpoint: entry.official_endpoint.clone(),
                third_party_endpoint: entry.third_party_endpoint.clone(),
                enabled: entry.enabled,
            });
            catalogue.set_provider_defaults(
                provider_id,
                ProviderDefaults {
                    timeout_s: entry.timeout_s,
                    retry_count: entry.retry_count,
                    use_max_completion_tokens: entry.use_max_completion_tokens,
                    supports_temperature: entry.supports_temperature,
                },
            );
            for (key_index, key) in entry.api_keys.iter().enumerate() {
                catalogue.add_api_key(ApiKeyDescriptor {
                    id: provider_id * 10_000 + (key_index as u64) + 1,
                    provider_id,
                    api_key: key.api_key.clone(),
                    base_url: key.base_url.clone(),
                    enabled: key.enabled,
                    preferred: key.preferred,
                    weight: key.weight,
                    daily_quota: key.daily_quota,
                    usage_count: 0,
                    description: key.description.clone(),
                });
            }
        }

        for (index, (name, entry)) in self.models.iter().enumerate() {
            let model_id = (index as u64) + 1;
            catalogue.add_model(ModelDescriptor {
                id: model_id,
                name: name.clone(),
                model_type: entry.model_type.into(),
                enabled: entry.enabled,
                capabilities: entry.capabilities.clone(),
            });
            for link in &entry.providers {
                if let Some(&provider_id) = provider_ids.get(&link.provider) {
                    catalogue.add_link(ModelProviderLink {
                        llm_id: model_id,
                        provider_id,
                        weight: link.weight,
                        preferred: link.preferred,
                        enabled: link.enabled,
                        cost_per_1k_tokens: link.cost_per_1k_tokens,
                    });
                } else {
                    tracing::warn!(
                        model = name,
                        provider = link.provider,
                        "model-provider link names an unconfigured provider"
                    );
                }
            }
        }

        catalogue
    }
}

/// Parse `"30s"`, `"500ms"`, `"1m"`, `"2h"` into a [`Duration`]. Kept local
/// to the binary's config surface rather than shared with the provider
/// wire-format duration codec, since this one parses bare CLI/env strings
/// rather than TOML/JSON values.
pub fn parse_duration(input: &str) -> anyhow::Result<Duration> {
    let s = input.trim();
    if s.is_empty() {
        anyhow::bail!("empty duration string");
    }
    if let Some(stripped) = s.strip_suffix("ms") {
        let num: u64 = stripped.parse()?;
        return Ok(Duration::from_millis(num));
    }
    if let Some(stripped) = s.strip_suffix('h') {
        let num: u64 = stripped.parse()?;
        return Ok(Duration::from_secs(num * 3600));
    }
    if let Some(stripped) = s.strip_suffix('m') {
        let num: u64 = stripped.parse()?;
        return Ok(Duration::from_secs(num * 60));
    }
    if let Some(stripped) = s.strip_suffix('s') {
        let num: u64 = stripped.parse()?;
        return Ok(Duration::from_secs(num));
    }
    anyhow::bail!("unrecognized duration unit in '{s}'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn zero_port_fails_validation() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn min_pool_size_over_max_fails_validation() {
        let mut config = Config::default();
        config.pool.min_pool_size = 100;
        config.pool.max_pool_size = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn duration_parsing_covers_every_unit() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("1m").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("30x").is_err());
        assert!(parse_duration("abc").is_err());
    }

    #[tokio::test]
    async fn build_catalogue_links_model_to_configured_provider() {
        let mut config = Config::default();
        config.providers.insert(
            "openai".to_string(),
            ProviderEntry {
                kind: ProviderKindConfig::PublicCloud,
                official_endpoint: Some("https://api.openai.com/v1".to_string()),
                third_party_endpoint: None,
                enabled: true,
                timeout_s: 30,
                retry_count: 3,
                use_max_completion_tokens: None,
                supports_temperature: None,
                api_keys: vec![ApiKeyEntry {
                    api_key: "sk-test".to_string(),
                    base_url: None,
                    enabled: true,
                    preferred: true,
                    weight: 1.0,
                    daily_quota: None,
                    description: None,
                }],
            },
        );
        config.models.insert(
            "gpt-4".to_string(),
            ModelEntry {
                model_type: ModelTypeConfig::Public,
                enabled: true,
                capabilities: vec!["TEXT".to_string()],
                providers: vec![ModelProviderEntry {
                    provider: "openai".to_string(),
                    weight: 1.0,
                    preferred: false,
                    enabled: true,
                    cost_per_1k_tokens: 0.01,
                }],
            },
        );

        use ultrafast_models_sdk::catalogue::CatalogueStore;
        let catalogue = config.build_catalogue();
        let providers = catalogue.get_all_providers().await;
        assert_eq!(providers.len(), 1);
        let models = catalogue.get_all_models().await;
        assert_eq!(models.len(), 1);
        let links = catalogue.get_model_provider_links(models[0].id).await;
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].provider_id, providers[0].id);
    }
}

//! Catalogue data model (§3) and the `CatalogueStore` contract (§6) the
//! router consults to resolve routable `(model, provider, api-key)`
//! candidates.
//!
//! The database-backed implementation (config/DB loading of
//! model-provider-apikey records, persistent storage schema, admin CRUD)
//! is explicitly out of scope per §1 — only the contract is specified
//! here. [`InMemoryCatalogue`] is the reference implementation this crate
//! ships, sufficient for the ambient binary and the test suite.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    PublicCloud,
    ThirdParty,
    Private,
}

/// Invariant: `(name, kind)` is unique across the catalogue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    pub id: u64,
    pub name: String,
    pub kind: ProviderKind,
    pub official_endpoint: Option<String>,
    pub third_party_endpoint: Option<String>,
    pub enabled: bool,
}

/// Invariant: a provider with no enabled keys is not routable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyDescriptor {
    pub id: u64,
    pub provider_id: u64,
    pub api_key: String,
    pub base_url: Option<String>,
    pub enabled: bool,
    pub preferred: bool,
    pub weight: f64,
    pub daily_quota: Option<u64>,
    pub usage_count: u64,
    pub description: Option<String>,
}

impl ApiKeyDescriptor {
    pub fn is_quota_exhausted(&self) -> bool {
        self.daily_quota
            .map(|quota| self.usage_count >= quota)
            .unwrap_or(false)
    }

    pub fn is_routable(&self) -> bool {
        self.enabled && !self.is_quota_exhausted()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelType {
    Public,
    Private,
}

/// A capability is an uppercase tag such as `TEXT`,
/// `MULTIMODAL_IMAGE_UNDERSTANDING`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: u64,
    pub name: String,
    pub model_type: ModelType,
    pub enabled: bool,
    pub capabilities: Vec<String>,
}

/// Invariant: `(llm_id, provider_id)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelProviderLink {
    pub llm_id: u64,
    pub provider_id: u64,
    pub weight: f64,
    pub preferred: bool,
    pub enabled: bool,
    pub cost_per_1k_tokens: f64,
}

/// Per-provider adapter defaults (§6 configuration surface), model-level
/// overrides allowed by passing a different value per `ModelProviderLink`
/// in a real catalogue; the ambient binary keeps these per-provider.
#[derive(Debug, Clone)]
pub struct ProviderDefaults {
    pub timeout_s: u64,
    pub retry_count: u32,
    pub use_max_completion_tokens: Option<bool>,
    pub supports_temperature: Option<bool>,
}

impl Default for ProviderDefaults {
    fn default() -> Self {
        Self {
            timeout_s: 30,
            retry_count: 3,
            use_max_completion_tokens: None,
            supports_temperature: None,
        }
    }
}

/// External collaborator contract (§6). Implementations are transactional;
/// reads MAY be cached with a short TTL by the caller.
#[async_trait]
pub trait CatalogueStore: Send + Sync {
    async fn get_model_by_name(&self, name: &str) -> Option<ModelDescriptor>;
    async fn get_provider_by_name(&self, name: &str) -> Option<ProviderDescriptor>;
    async fn get_provider_by_id(&self, id: u64) -> Option<ProviderDescriptor>;
    async fn get_model_provider_links(&self, llm_id: u64) -> Vec<ModelProviderLink>;
    async fn get_model_provider_by_ids(
        &self,
        llm_id: u64,
        provider_id: u64,
    ) -> Option<ModelProviderLink>;
    async fn get_api_keys(&self, provider_id: u64) -> Vec<ApiKeyDescriptor>;
    /// Convenience accessor: the single best (preferred, then highest
    /// weight) enabled, non-exhausted key for a provider. The router's own
    /// weighted selection (§4.4 step 6) does not depend on this — it
    /// enumerates `get_api_keys` itself — but external callers may want a
    /// cheap single answer.
    async fn get_best_api_key(&self, provider_id: u64) -> Option<ApiKeyDescriptor>;
    async fn get_all_models(&self) -> Vec<ModelDescriptor>;
    async fn get_all_providers(&self) -> Vec<ProviderDescriptor>;
    async fn get_provider_defaults(&self, provider_id: u64) -> ProviderDefaults;
}

/// In-memory reference implementation. Not transactional across calls (no
/// concurrent writers are expected outside of tests and the ambient
/// binary's startup loading).
#[derive(Default)]
pub struct InMemoryCatalogue {
    models: RwLock<HashMap<u64, ModelDescriptor>>,
    providers: RwLock<HashMap<u64, ProviderDescriptor>>,
    links: RwLock<Vec<ModelProviderLink>>,
    api_keys: RwLock<HashMap<u64, Vec<ApiKeyDescriptor>>>,
    defaults: RwLock<HashMap<u64, ProviderDefaults>>,
}

impl InMemoryCatalogue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_model(&self, model: ModelDescriptor) {
        self.models.write().unwrap().insert(model.id, model);
    }

    pub fn add_provider(&self, provider: ProviderDescriptor) {
        self.providers.write().unwrap().insert(provider.id, provider);
    }

    pub fn add_link(&self, link: ModelProviderLink) {
        self.links.write().unwrap().push(link);
    }

    pub fn add_api_key(&self, key: ApiKeyDescriptor) {
        self.api_keys
            .write()
            .unwrap()
            .entry(key.provider_id)
            .or_default()
            .push(key);
    }

    pub fn set_provider_defaults(&self, provider_id: u64, defaults: ProviderDefaults) {
        self.defaults.write().unwrap().insert(provider_id, defaults);
    }
}

#[async_trait]
impl CatalogueStore for InMemoryCatalogue {
    async fn get_model_by_name(&self, name: &str) -> Option<ModelDescriptor> {
        self.models
            .read()
            .unwrap()
            .values()
            .find(|m| m.name == name)
            .cloned()
    }

    async fn get_provider_by_name(&self, name: &str) -> Option<ProviderDescriptor> {
        self.providers
            .read()
            .unwrap()
            .values()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .cloned()
    }

    async fn get_provider_by_id(&self, id: u64) -> Option<ProviderDescriptor> {
        self.providers.read().unwrap().get(&id).cloned()
    }

    async fn get_model_provider_links(&self, llm_id: u64) -> Vec<ModelProviderLink> {
        self.links
            .read()
            .unwrap()
            .iter()
            .filter(|l| l.llm_id == llm_id)
            .cloned()
            .collect()
    }

    async fn get_model_provider_by_ids(
        &self,
        llm_id: u64,
        provider_id: u64,
    ) -> Option<ModelProviderLink> {
        self.links
            .read()
            .unwrap()
            .iter()
            .find(|l| l.llm_id == llm_id && l.provider_id == provider_id)
            .cloned()
    }

    async fn get_api_keys(&self, provider_id: u64) -> Vec<ApiKeyDescriptor> {
        self.api_keys
            .read()
            .unwrap()
            .get(&provider_id)
            .cloned()
            .unwrap_or_default()
    }

    async fn get_best_api_key(&self, provider_id: u64) -> Option<ApiKeyDescriptor> {
        let keys = self.get_api_keys(provider_id).await;
        keys.into_iter()
            .filter(|k| k.is_routable())
            .max_by(|a, b| {
                (a.preferred, a.weight)
                    .partial_cmp(&(b.preferred, b.weight))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    }

    async fn get_all_models(&self) -> Vec<ModelDescriptor> {
        self.models.read().unwrap().values().cloned().collect()
    }

    async fn get_all_providers(&self) -> Vec<ProviderDescriptor> {
        self.providers.read().unwrap().values().cloned().collect()
    }

    async fn get_provider_defaults(&self, provider_id: u64) -> ProviderDefaults {
        self.defaults
            .read()
            .unwrap()
            .get(&provider_id)
            .cloned()
            .unwrap_or_default()
    }
}

//! Routing core (C6, §4.4) — resolves a model name into a concrete
//! `(provider, api-key)` candidate set and picks one using health
//! filtering, a weighted score, and weighted-random tie-breaking.

use crate::catalogue::{
    ApiKeyDescriptor, CatalogueStore, ModelDescriptor, ModelProviderLink, ProviderDefaults,
    ProviderDescriptor,
};
use crate::metrics::{cost_score, MetricsRegistry};
use crate::pool::AcquireRequest;
use crate::providers::HealthStatus;
use rand::Rng;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouterError {
    #[error("model '{0}' is not known to the catalogue")]
    UnknownModel(String),
    #[error("model '{0}' has no enabled provider links")]
    NoEnabledProvider(String),
    #[error("model '{0}' has no routable api key on any enabled provider")]
    NoRoutableApiKey(String),
}

#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Candidates below this health rank are excluded unless they are the
    /// only option left (§4.4 step 2's health-based fallback).
    pub min_health: HealthStatus,
    /// §6 load-balancer weights for the composite score. Spec default is
    /// response-time 0.4, cost 0.3, success-rate 0.3; callers may retune
    /// without a code change.
    pub success_rate_weight: f64,
    pub response_time_weight: f64,
    pub cost_weight: f64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            min_health: HealthStatus::Degraded,
            success_rate_weight: 0.3,
            response_time_weight: 0.4,
            cost_weight: 0.3,
        }
    }
}

/// The provider+key chosen for one request, plus everything the pool needs
/// to provision or reuse an adapter for it.
#[derive(Debug, Clone)]
pub struct RouteDecision {
    pub model: ModelDescriptor,
    pub provider: ProviderDescriptor,
    pub api_key: ApiKeyDescriptor,
    pub link: ModelProviderLink,
    pub provider_defaults: ProviderDefaults,
    pub score: f64,
}

impl RouteDecision {
    pub fn to_acquire_request(&self) -> AcquireRequest {
        AcquireRequest {
            model: self.model.name.clone(),
            provider: self.provider.clone(),
            api_key: self.api_key.clone(),
            link: self.link.clone(),
            provider_defaults: self.provider_defaults.clone(),
        }
    }
}

struct Candidate {
    provider: ProviderDescriptor,
    link: ModelProviderLink,
    health: HealthStatus,
    score: f64,
}

/// Consults the catalogue for topology and the metrics registry for
/// live health/performance, combining both into a routing decision.
/// Stateless beyond its collaborators — safe to share behind an `Arc`
/// and call concurrently.
pub struct Router {
    catalogue: Arc<dyn CatalogueStore>,
    metrics: MetricsRegistry,
    config: RouterConfig,
}

impl Router {
    pub fn new(catalogue: Arc<dyn CatalogueStore>, metrics: MetricsRegistry, config: RouterConfig) -> Self {
        Self {
            catalogue,
            metrics,
            config,
        }
    }

    /// §4.4, steps 1-6: resolve `model_name` to one routable
    /// `(provider, api-key)` pair.
    pub async fn select(&self, model_name: &str) -> Result<RouteDecision, RouterError> {
        let model = self
            .catalogue
            .get_model_by_name(model_name)
            .await
            .filter(|m| m.enabled)
            .ok_or_else(|| RouterError::UnknownModel(model_name.to_string()))?;

        let links = self.catalogue.get_model_provider_links(model.id).await;
        let mut candidates = Vec::new();
        for link in links.into_iter().filter(|l| l.enabled) {
            let Some(provider) = self.catalogue.get_provider_by_id(link.provider_id).await else {
                continue;
            };
            if !provider.enabled {
                continue;
            }
            let health = self.metrics.health(&(model.name.clone(), provider.name.clone()));
            candidates.push(Candidate {
                provider,
                link,
                health,
                score: 0.0,
            });
        }

        if candidates.is_empty() {
            return Err(RouterError::NoEnabledProvider(model_name.to_string()));
        }

        // Health-based filtering (§4.4 step 2) with fallback: prefer
        // candidates at or above the configured floor, but never starve
        // the request if everything has degraded together.
        let healthy: Vec<usize> = candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| c.health <= self.config.min_health)
            .map(|(i, _)| i)
            .collect();
        let eligible: Vec<usize> = if healthy.is_empty() {
            (0..candidates.len()).collect()
        } else {
            healthy
        };

        let weight_sum = eligible
            .iter()
            .map(|i| candidates[*i].link.weight)
            .sum::<f64>()
            .max(f64::EPSILON);

        for index in &eligible {
            let candidate = &mut candidates[*index];
            let key = (model.name.clone(), candidate.provider.name.clone());
            let snapshot = self.metrics.snapshot(&key);
            let normalized_weight = candidate.link.weight / weight_sum;
            candidate.score = self.config.success_rate_weight * snapshot.success_rate_score()
                + self.config.response_time_weight * snapshot.response_time_score()
                + self.config.cost_weight * cost_score(candidate.link.cost_per_1k_tokens)
                + normalized_weight;
        }

        // Preferred-first (§4.4 step 5): if any eligible candidate's link
        // is marked preferred, restrict the pool to those before weighting.
        let preferred: Vec<usize> = eligible
            .iter()
            .copied()
            .filter(|i| candidates[*i].link.preferred)
            .collect();
        let pool = if preferred.is_empty() { eligible } else { preferred };

        let chosen_index = weighted_choice(&pool, |i| candidates[*i].score.max(f64::EPSILON));
        let chosen = &candidates[chosen_index];
        let provider = chosen.provider.clone();
        let link = chosen.link.clone();
        let score = chosen.score;

        let keys = self.catalogue.get_api_keys(provider.id).await;
        let routable: Vec<&ApiKeyDescriptor> = keys.iter().filter(|k| k.is_routable()).collect();
        if routable.is_empty() {
            return Err(RouterError::NoRoutableApiKey(model_name.to_string()));
        }
        let key_indices: Vec<usize> = (0..routable.len()).collect();
        let preferred_keys: Vec<usize> = key_indices
            .iter()
            .copied()
            .filter(|i| routable[*i].preferred)
            .collect();
        let key_pool = if preferred_keys.is_empty() { key_indices } else { preferred_keys };
        let chosen_key_index = weighted_choice(&key_pool, |i| routable[*i].weight.max(f64::EPSILON));
        let api_key = routable[chosen_key_index].clone();

        let provider_defaults = self.catalogue.get_provider_defaults(provider.id).await;

        Ok(RouteDecision {
            model,
            provider,
            api_key,
            link,
            provider_defaults,
            score,
        })
    }
}

/// Weighted random pick over `items` using `weight_of` — §4.4 step 6's
/// tie-breaking rule. Falls back to the first item when all weights are
/// non-positive (shouldn't happen given the `max(EPSILON)` callers apply,
/// but keeps this total rather than panicking on an empty draw).
fn weighted_choice<T: Copy>(items: &[T], weight_of: impl Fn(&T) -> f64) -> T {
    debug_assert!(!items.is_empty());
    let total: f64 = items.iter().map(&weight_of).sum();
    if total <= 0.0 {
        return items[0];
    }
    let mut draw = rand::thread_rng().gen_range(0.0..total);
    for item in items {
        let weight = weight_of(item);
        if draw < weight {
            return *item;
        }
        draw -= weight;
    }
    *items.last().unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::{InMemoryCatalogue, ModelType, ProviderKind};

    fn catalogue_with_two_providers() -> InMemoryCatalogue {
        let catalogue = InMemoryCatalogue::new();
        catalogue.add_model(ModelDescriptor {
            id: 1,
            name: "gpt-4".to_string(),
            model_type: ModelType::Public,
            enabled: true,
            capabilities: vec!["TEXT".to_string()],
        });
        catalogue.add_provider(ProviderDescriptor {
            id: 10,
            name: "openai".to_string(),
            kind: ProviderKind::PublicCloud,
            official_endpoint: Some("https://api.openai.com/v1".to_string()),
            third_party_endpoint: None,
            enabled: true,
        });
        catalogue.add_provider(ProviderDescriptor {
            id: 20,
            name: "custom".to_string(),
            kind: ProviderKind::ThirdParty,
            official_endpoint: None,
            third_party_endpoint: Some("https://relay.example.com/v1".to_string()),
            enabled: true,
        });
        catalogue.add_link(ModelProviderLink {
            llm_id: 1,
            provider_id: 10,
            weight: 1.0,
            preferred: false,
            enabled: true,
            cost_per_1k_tokens: 0.01,
        });
        catalogue.add_link(ModelProviderLink {
            llm_id: 1,
            provider_id: 20,
            weight: 1.0,
            preferred: false,
            enabled: true,
            cost_per_1k_tokens: 0.02,
        });
        catalogue.add_api_key(ApiKeyDescriptor {
            id: 100,
            provider_id: 10,
            api_key: "sk-openai".to_string(),
            base_url: None,
            enabled: true,
            preferred: false,
            weight: 1.0,
            daily_quota: None,
            usage_count: 0,
            description: None,
        });
        catalogue.add_api_key(ApiKeyDescriptor {
            id: 200,
            provider_id: 20,
            api_key: "sk-custom".to_string(),
            base_url: None,
            enabled: true,
            preferred: false,
            weight: 1.0,
            daily_quota: None,
            usage_count: 0,
            description: None,
        });
        catalogue
    }

    #[tokio::test]
    async fn unknown_model_is_rejected() {
        let catalogue = Arc::new(InMemoryCatalogue::new());
        let router = Router::new(catalogue, MetricsRegistry::new(), RouterConfig::default());
        let err = router.select("nope").await.unwrap_err();
        assert_eq!(err, RouterError::UnknownModel("nope".to_string()));
    }

    #[tokio::test]
    async fn routes_to_an_enabled_provider() {
        let catalogue = Arc::new(catalogue_with_two_providers());
        let router = Router::new(catalogue, MetricsRegistry::new(), RouterConfig::default());
        let decision = router.select("gpt-4").await.unwrap();
        assert!(["openai", "custom"].contains(&decision.provider.name.as_str()));
    }

    #[tokio::test]
    async fn unhealthy_provider_is_excluded_when_an_alternative_exists() {
        let catalogue = Arc::new(catalogue_with_two_providers());
        let metrics = MetricsRegistry::new();
        metrics.set_health(&("gpt-4".to_string(), "openai".to_string()), HealthStatus::Unhealthy);
        let router = Router::new(catalogue, metrics, RouterConfig::default());
        for _ in 0..20 {
            let decision = router.select("gpt-4").await.unwrap();
            assert_eq!(decision.provider.name, "custom");
        }
    }

    #[tokio::test]
    async fn falls_back_to_unhealthy_when_nothing_else_is_available() {
        let catalogue = InMemoryCatalogue::new();
        catalogue.add_model(ModelDescriptor {
            id: 1,
            name: "gpt-4".to_string(),
            model_type: ModelType::Public,
            enabled: true,
            capabilities: vec![],
        });
        catalogue.add_provider(ProviderDescriptor {
            id: 10,
            name: "openai".to_string(),
            kind: ProviderKind::PublicCloud,
            official_endpoint: Some("https://api.openai.com/v1".to_string()),
            third_party_endpoint: None,
            enabled: true,
        });
        catalogue.add_link(ModelProviderLink {
            llm_id: 1,
            provider_id: 10,
            weight: 1.0,
            preferred: false,
            enabled: true,
            cost_per_1k_tokens: 0.01,
        });
        catalogue.add_api_key(ApiKeyDescriptor {
            id: 100,
            provider_id: 10,
            api_key: "sk-openai".to_string(),
            base_url: None,
            enabled: true,
            preferred: false,
            weight: 1.0,
            daily_quota: None,
            usage_count: 0,
            description: None,
        });
        let metrics = MetricsRegistry::new();
        metrics.set_health(&("gpt-4".to_string(), "openai".to_string()), HealthStatus::Unhealthy);
        let router = Router::new(Arc::new(catalogue), metrics, RouterConfig::default());
        let decision = router.select("gpt-4").await.unwrap();
        assert_eq!(decision.provider.name, "openai");
    }

    #[tokio::test]
    async fn preferred_link_always_wins_over_non_preferred() {
        let catalogue = catalogue_with_two_providers();
        // mark the custom link preferred
        catalogue.add_link(ModelProviderLink {
            llm_id: 1,
            provider_id: 20,
            weight: 0.01,
            preferred: true,
            enabled: true,
            cost_per_1k_tokens: 0.02,
        });
        let router = Router::new(Arc::new(catalogue), MetricsRegistry::new(), RouterConfig::default());
        for _ in 0..20 {
            let decision = router.select("gpt-4").await.unwrap();
            assert_eq!(decision.provider.name, "custom");
        }
    }

    #[tokio::test]
    async fn quota_exhausted_key_is_skipped_in_favor_of_another() {
        let catalogue = catalogue_with_two_providers();
        // exhaust openai's only key
        let exhausted = ApiKeyDescriptor {
            id: 100,
            provider_id: 10,
            api_key: "sk-openai".to_string(),
            base_url: None,
            enabled: true,
            preferred: false,
            weight: 1.0,
            daily_quota: Some(1),
            usage_count: 1,
            description: None,
        };
        assert!(!exhausted.is_routable());

        let no_links_catalogue = InMemoryCatalogue::new();
        no_links_catalogue.add_model(ModelDescriptor {
            id: 1,
            name: "gpt-4".to_string(),
            model_type: ModelType::Public,
            enabled: true,
            capabilities: vec![],
        });
        no_links_catalogue.add_provider(ProviderDescriptor {
            id: 10,
            name: "openai".to_string(),
            kind: ProviderKind::PublicCloud,
            official_endpoint: Some("https://api.openai.com/v1".to_string()),
            third_party_endpoint: None,
            enabled: true,
        });
        no_links_catalogue.add_link(ModelProviderLink {
            llm_id: 1,
            provider_id: 10,
            weight: 1.0,
            preferred: false,
            enabled: true,
            cost_per_1k_tokens: 0.01,
        });
        no_links_catalogue.add_api_key(exhausted);
        let router = Router::new(Arc::new(no_links_catalogue), MetricsRegistry::new(), RouterConfig::default());
        let err = router.select("gpt-4").await.unwrap_err();
        assert_eq!(err, RouterError::NoRoutableApiKey("gpt-4".to_string()));
    }

    /// §8 invariant 5: weighted-random selection probability of candidate
    /// `i` converges to `w_i / sum(w_j)`. Draws 12,000 samples from
    /// `weighted_choice` at weights 1:2:3 and checks the chi-squared
    /// goodness-of-fit statistic stays under the df=2, p=0.01 critical
    /// value (9.21) rather than just eyeballing the counts.
    #[test]
    fn weighted_choice_converges_to_weights_by_chi_squared() {
        let weights = [1.0_f64, 2.0, 3.0];
        let total: f64 = weights.iter().sum();
        let draws = 12_000;
        let mut counts = [0u64; 3];
        for _ in 0..draws {
            let idx = weighted_choice(&[0usize, 1, 2], |i| weights[*i]);
            counts[idx] += 1;
        }
        let chi_squared: f64 = (0..3)
            .map(|i| {
                let expected = draws as f64 * weights[i] / total;
                let diff = counts[i] as f64 - expected;
                diff * diff / expected
            })
            .sum();
        assert!(
            chi_squared < 9.210,
            "chi-squared statistic {chi_squared} too high for counts {counts:?}"
        );
    }

    #[test]
    fn weighted_choice_never_picks_a_zero_weight_candidate_when_an_alternative_exists() {
        let weights = [0.0_f64, 1.0];
        for _ in 0..200 {
            let idx = weighted_choice(&[0usize, 1], |i| weights[*i]);
            assert_eq!(idx, 1);
        }
    }
}

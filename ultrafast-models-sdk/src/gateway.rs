//! Gateway facade (§7) — wires the router, pool, catalogue and metrics
//! sink into the two operations an HTTP surface actually needs:
//! `route_and_invoke` and `route_and_invoke_stream`. This is the seam the
//! ambient binary calls into; it never touches axum or any wire framing.

use crate::catalogue::CatalogueStore;
use crate::error::ProviderError;
use crate::metrics::MetricsRegistry;
use crate::models::{ChatRequest, ChatResponse, StreamChunk};
use crate::pool::{AdapterPool, PoolConfig, PoolError, PoolStats};
use crate::providers::{classify_health_status, HealthStatus};
use crate::router::{Router, RouterConfig, RouterError};
use crate::sink::MetricsSink;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// §7's core error taxonomy. `gateway_error::GatewayError` in the ambient
/// binary wraps this with HTTP status mapping; this type stays
/// transport-agnostic.
#[derive(Debug, Error)]
pub enum GatewayCoreError {
    #[error("model not available: {0}")]
    ModelNotAvailable(String),

    #[error("no provider could serve this request: {0}")]
    NoProvider(String),

    #[error("upstream authentication failed")]
    UpstreamAuthError,

    #[error("upstream rejected the request: {message}")]
    UpstreamBadRequest { message: String },

    #[error("upstream returned a server error")]
    UpstreamServerError,

    #[error("timed out waiting for a free adapter")]
    PoolWaitTimeout,

    #[error("requested capability is not supported: {0}")]
    NotSupported(String),

    #[error("request cancelled")]
    Cancelled,
}

impl From<RouterError> for GatewayCoreError {
    fn from(err: RouterError) -> Self {
        match err {
            RouterError::UnknownModel(model) => GatewayCoreError::ModelNotAvailable(model),
            RouterError::NoEnabledProvider(model) => GatewayCoreError::NoProvider(model),
            RouterError::NoRoutableApiKey(model) => GatewayCoreError::NoProvider(model),
        }
    }
}

impl From<PoolError> for GatewayCoreError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::WaitTimeout(_) => GatewayCoreError::PoolWaitTimeout,
            PoolError::NotProvisionable(_, message) => GatewayCoreError::UpstreamBadRequest { message },
        }
    }
}

impl From<ProviderError> for GatewayCoreError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::InvalidApiKey | ProviderError::AuthenticationFailed { .. } => {
                GatewayCoreError::UpstreamAuthError
            }
            ProviderError::ModelNotFound { model } => GatewayCoreError::ModelNotAvailable(model),
            ProviderError::FeatureNotSupported { feature } => GatewayCoreError::NotSupported(feature),
            ProviderError::ValidationError { field, message } => {
                GatewayCoreError::UpstreamBadRequest {
                    message: format!("{field}: {message}"),
                }
            }
            ProviderError::Api { code, message } if (400..500).contains(&code) => {
                GatewayCoreError::UpstreamBadRequest { message }
            }
            ProviderError::RateLimit | ProviderError::QuotaExceeded => {
                GatewayCoreError::UpstreamBadRequest {
                    message: "rate limit or quota exceeded upstream".to_string(),
                }
            }
            other => {
                tracing::warn!(error = %other, "upstream server error");
                GatewayCoreError::UpstreamServerError
            }
        }
    }
}

pub type GatewayStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, GatewayCoreError>> + Send>>;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub pool: PoolConfig,
    pub router: RouterConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            router: RouterConfig::default(),
        }
    }
}

/// The assembled core: catalogue + router + pool + metrics, all behind
/// one call surface. Cheap to clone (every field is an `Arc` or a plain
/// handle) so the ambient binary can share one instance across workers.
#[derive(Clone)]
pub struct Gateway {
    catalogue: Arc<dyn CatalogueStore>,
    router: Arc<Router>,
    pool: Arc<AdapterPool>,
    sink: Arc<dyn MetricsSink>,
}

impl Gateway {
    pub fn new(
        catalogue: Arc<dyn CatalogueStore>,
        sink: Arc<dyn MetricsSink>,
        config: GatewayConfig,
    ) -> Self {
        let metrics = MetricsRegistry::new();
        let router = Arc::new(Router::new(catalogue.clone(), metrics.clone(), config.router));
        let pool = AdapterPool::new(config.pool, metrics);
        pool.spawn_janitor();
        pool.spawn_health_loop();
        Self {
            catalogue,
            router,
            pool,
            sink,
        }
    }

    pub fn catalogue(&self) -> &Arc<dyn CatalogueStore> {
        &self.catalogue
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// §6's optional `RefreshCatalogue` hook: invalidates any cached
    /// catalogue resolutions held by the caller. The shipped
    /// [`crate::catalogue::InMemoryCatalogue`] reads straight through on
    /// every call and caches nothing, so this is a no-op here; a
    /// TTL-caching catalogue implementation would override the behaviour
    /// this call triggers.
    pub fn refresh_catalogue(&self) {}

    /// §2's request path for the non-streaming case: route, acquire,
    /// invoke, record, release.
    pub async fn route_and_invoke(&self, request: ChatRequest) -> Result<ChatResponse, GatewayCoreError> {
        let decision = self.router.select(&request.model).await?;
        let model_id = decision.model.id;
        let provider_id = decision.provider.id;
        let guard = self.pool.acquire(decision.to_acquire_request()).await?;

        let started = Instant::now();
        let result = guard.adapter().chat_completion(request).await;
        let elapsed_s = started.elapsed().as_secs_f64();

        match result {
            Ok(response) => {
                let tokens = response.usage.as_ref().map(|u| u.total_tokens).unwrap_or(0);
                self.pool
                    .record_outcome(&guard, elapsed_s, true, tokens as u64, HealthStatus::Healthy);
                let cost = crate::metrics::AdapterMetrics::cost_estimate(
                    tokens as u64,
                    guard.config().cost_per_1k_tokens,
                );
                self.sink
                    .sync_adapter_metrics(model_id, provider_id, elapsed_s, true, tokens as u64, cost)
                    .await;
                guard.release();
                Ok(response)
            }
            Err(err) => {
                let status = classify_health_status(&err);
                self.pool.record_outcome(&guard, elapsed_s, false, 0, status);
                self.sink
                    .sync_adapter_health(model_id, provider_id, status, Some(err.to_string()))
                    .await;
                guard.release();
                Err(err.into())
            }
        }
    }

    /// §2's request path for the streaming case. The pool guard is moved
    /// into the returned stream so the adapter slot stays `InUse` for the
    /// stream's lifetime and is released exactly once, when the stream is
    /// dropped (on completion, error, or client disconnect).
    pub async fn route_and_invoke_stream(&self, request: ChatRequest) -> Result<GatewayStream, GatewayCoreError> {
        let decision = self.router.select(&request.model).await?;
        let model_id = decision.model.id;
        let provider_id = decision.provider.id;
        let guard = self.pool.acquire(decision.to_acquire_request()).await?;

        let started = Instant::now();
        let inner = guard.adapter().stream_chat_completion(request).await;
        let inner = match inner {
            Ok(stream) => stream,
            Err(err) => {
                let status = classify_health_status(&err);
                self.pool
                    .record_outcome(&guard, started.elapsed().as_secs_f64(), false, 0, status);
                self.sink
                    .sync_adapter_health(model_id, provider_id, status, Some(err.to_string()))
                    .await;
                guard.release();
                return Err(err.into());
            }
        };

        let pool = self.pool.clone();
        let sink = self.sink.clone();
        let stream = async_stream::stream! {
            let _guard = guard;
            tokio::pin!(inner);
            let mut failure_status = None;
            while let Some(item) = inner.next().await {
                match item {
                    Ok(chunk) => yield Ok(chunk),
                    Err(err) => {
                        failure_status = Some(classify_health_status(&err));
                        yield Err(GatewayCoreError::from(err));
                        break;
                    }
                }
            }
            let elapsed_s = started.elapsed().as_secs_f64();
            let success = failure_status.is_none();
            pool.record_outcome(&_guard, elapsed_s, success, 0, failure_status.unwrap_or(HealthStatus::Healthy));
            sink.sync_adapter_metrics(model_id, provider_id, elapsed_s, success, 0, 0.0).await;
            if let Some(status) = failure_status {
                sink.sync_adapter_health(model_id, provider_id, status, None).await;
            }
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::{
        ApiKeyDescriptor, InMemoryCatalogue, ModelDescriptor, ModelProviderLink, ModelType,
        ProviderDescriptor, ProviderKind,
    };
    use crate::models::Message;
    use crate::sink::InMemoryMetricsSink;

    fn catalogue_with_openai() -> InMemoryCatalogue {
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
            api_key: "sk-test".to_string(),
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
    async fn unknown_model_surfaces_as_model_not_available() {
        let gateway = Gateway::new(
            Arc::new(InMemoryCatalogue::new()),
            InMemoryMetricsSink::new(),
            GatewayConfig::default(),
        );
        let request = ChatRequest {
            model: "nope".to_string(),
            messages: vec![Message::user("hi")],
            ..Default::default()
        };
        let err = gateway.route_and_invoke(request).await.unwrap_err();
        assert!(matches!(err, GatewayCoreError::ModelNotAvailable(m) if m == "nope"));
    }

    #[tokio::test]
    async fn pool_stats_start_empty() {
        let gateway = Gateway::new(
            Arc::new(catalogue_with_openai()),
            InMemoryMetricsSink::new(),
            GatewayConfig::default(),
        );
        assert_eq!(gateway.pool_stats().total, 0);
    }
}

//! Provider abstraction layer.
//!
//! Defines the [`Provider`] trait every adapter implements and a factory,
//! [`create_provider`], that turns a [`ProviderConfig`] into a boxed
//! instance. Provider name matching is case-insensitive; a name outside the
//! known set falls back to the OpenAI-compatible adapter rather than
//! erroring, since most self-hosted and third-party endpoints speak that
//! dialect already.
//!
//! ## Supported providers
//!
//! - `openai` (and anything unrecognized, via fallback): OpenAI-compatible
//!   chat completions
//! - `anthropic`: Claude messages API
//! - `volcengine`: ByteDance Volcengine Ark, OpenAI-compatible with a
//!   `thinking` extension
//! - `zhipu`: Zhipu GLM, OpenAI-compatible with reasoning-content mirroring
//! - `aliqwen`: Alibaba DashScope Qwen, OpenAI-compatible with a `thinking`
//!   passthrough
//! - `google`: reserved, not yet implemented
//!
//! ```rust
//! use ultrafast_models_sdk::providers::{create_provider, ProviderConfig};
//!
//! let config = ProviderConfig::new("openai", "your-api-key");
//! let provider = create_provider(config)?;
//! # Ok::<(), ultrafast_models_sdk::error::ProviderError>(())
//! ```

use crate::error::ProviderError;
use crate::models::{
    AudioRequest, AudioResponse, ChatRequest, ChatResponse, EmbeddingRequest, EmbeddingResponse,
    ImageRequest, ImageResponse, SpeechRequest, SpeechResponse, StreamChunk,
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::pin::Pin;
use std::time::Duration;

pub mod aliqwen;
pub mod anthropic;
pub mod custom;
pub mod duration_serde;
pub mod google;
pub mod http_client;
pub use http_client::{classify_health_status, classify_probe_status};
pub mod openai;
pub mod volcengine;
pub mod zhipu;

/// Pinned, boxed stream of streaming chunks or errors.
pub type StreamResult = Pin<Box<dyn Stream<Item = Result<StreamChunk, ProviderError>> + Send>>;

/// Interface every AI provider adapter implements.
#[async_trait::async_trait]
pub trait Provider: Send + Sync + Any {
    /// Unique identifier for this provider.
    fn name(&self) -> &str;

    /// Whether this provider supports streaming chat completions.
    fn supports_streaming(&self) -> bool;

    /// Whether this provider supports function/tool calling.
    fn supports_function_calling(&self) -> bool;

    /// Model names this provider can handle.
    fn supported_models(&self) -> Vec<String>;

    async fn chat_completion(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError>;

    async fn stream_chat_completion(
        &self,
        request: ChatRequest,
    ) -> Result<StreamResult, ProviderError>;

    /// Generate embeddings for text input.
    ///
    /// Returns [`ProviderError::FeatureNotSupported`] unless overridden.
    async fn embedding(
        &self,
        _request: EmbeddingRequest,
    ) -> Result<EmbeddingResponse, ProviderError> {
        Err(ProviderError::FeatureNotSupported {
            feature: "embeddings".to_string(),
        })
    }

    /// Generate images from a text prompt.
    ///
    /// Returns [`ProviderError::FeatureNotSupported`] unless overridden.
    async fn image_generation(
        &self,
        _request: ImageRequest,
    ) -> Result<ImageResponse, ProviderError> {
        Err(ProviderError::FeatureNotSupported {
            feature: "image_generation".to_string(),
        })
    }

    /// Transcribe audio to text.
    ///
    /// Returns [`ProviderError::FeatureNotSupported`] unless overridden.
    async fn audio_transcription(
        &self,
        _request: AudioRequest,
    ) -> Result<AudioResponse, ProviderError> {
        Err(ProviderError::FeatureNotSupported {
            feature: "audio_transcription".to_string(),
        })
    }

    /// Convert text to speech.
    ///
    /// Returns [`ProviderError::FeatureNotSupported`] unless overridden.
    async fn text_to_speech(
        &self,
        _request: SpeechRequest,
    ) -> Result<SpeechResponse, ProviderError> {
        Err(ProviderError::FeatureNotSupported {
            feature: "text_to_speech".to_string(),
        })
    }

    /// Probe the provider and report its current health.
    async fn health_check(&self) -> Result<ProviderHealth, ProviderError>;
}

/// Configuration needed to construct a provider instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub api_key: String,
    pub base_url: Option<String>,
    #[serde(with = "crate::common::duration_serde")]
    pub timeout: Duration,
    pub max_retries: u32,
    #[serde(with = "crate::common::duration_serde")]
    pub retry_delay: Duration,
    pub rate_limit: Option<RateLimit>,
    /// Client-facing model name -> provider model name.
    pub model_mapping: HashMap<String, String>,
    pub headers: HashMap<String, String>,
    pub enabled: bool,
    /// Rename `max_tokens` to `max_completion_tokens` on the wire. Needed for
    /// newer OpenAI reasoning models (gpt-5 family) that reject the old field
    /// name; inferred from the model name when not set explicitly.
    pub use_max_completion_tokens: Option<bool>,
    /// Whether the model accepts sampling parameters (`temperature`, `top_p`,
    /// `frequency_penalty`, `presence_penalty`) at all. Reasoning models
    /// reject them outright. Inferred from the model name when not set.
    pub supports_temperature: Option<bool>,
}

impl ProviderConfig {
    pub fn new(name: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            api_key: api_key.into(),
            base_url: None,
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            rate_limit: None,
            model_mapping: HashMap::new(),
            headers: HashMap::new(),
            enabled: true,
            use_max_completion_tokens: None,
            supports_temperature: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimit) -> Self {
        self.rate_limit = Some(rate_limit);
        self
    }

    pub fn with_model_mapping(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.model_mapping.insert(from.into(), to.into());
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimit {
    pub requests_per_minute: u32,
    pub tokens_per_minute: u32,
}

/// Health snapshot returned by [`Provider::health_check`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub status: HealthStatus,
    pub latency_ms: Option<u64>,
    pub error_rate: f64,
    pub last_check: chrono::DateTime<chrono::Utc>,
    pub details: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Rolling performance counters for a provider adapter.
///
/// Distinct from the per-(model,provider) routing metrics tracked by the
/// pool and router: this is a coarser, adapter-wide view useful for
/// dashboards and logging, smoothed with an exponential moving average
/// rather than the router's last-sample convention.
#[derive(Debug, Clone)]
pub struct ProviderMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub average_latency_ms: f64,
    pub tokens_processed: u64,
    pub cost_usd: f64,
    pub rate_limit_hits: u64,
    pub last_request: Option<chrono::DateTime<chrono::Utc>>,
}

impl Default for ProviderMetrics {
    fn default() -> Self {
        Self {
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
            average_latency_ms: 0.0,
            tokens_processed: 0,
            cost_usd: 0.0,
            rate_limit_hits: 0,
            last_request: None,
        }
    }
}

impl ProviderMetrics {
    pub fn record_enhanced_request(&mut self, success: bool, latency_ms: u64, tokens: u32, cost: f64) {
        self.total_requests += 1;
        self.last_request = Some(chrono::Utc::now());

        if success {
            self.successful_requests += 1;
        } else {
            self.failed_requests += 1;
        }

        let alpha = 0.1;
        self.average_latency_ms =
            alpha * latency_ms as f64 + (1.0 - alpha) * self.average_latency_ms;

        self.tokens_processed += tokens as u64;
        self.cost_usd += cost;
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            1.0
        } else {
            self.successful_requests as f64 / self.total_requests as f64
        }
    }

    pub fn failure_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.failed_requests as f64 / self.total_requests as f64
        }
    }

    pub fn average_tokens_per_request(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.tokens_processed as f64 / self.total_requests as f64
        }
    }

    pub fn average_cost_per_request(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.cost_usd / self.total_requests as f64
        }
    }

    pub fn rate_limit_hit_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.rate_limit_hits as f64 / self.total_requests as f64
        }
    }

    pub fn is_healthy(&self) -> bool {
        let good_success_rate = self.success_rate() > 0.8;
        let reasonable_latency = self.average_latency_ms < 10000.0;
        let recent_activity = self
            .last_request
            .map(|last| {
                let now = chrono::Utc::now();
                now.signed_duration_since(last).num_minutes() < 5
            })
            .unwrap_or(false);

        good_success_rate && reasonable_latency && recent_activity
    }

    pub fn health_status(&self) -> HealthStatus {
        if self.is_healthy() {
            HealthStatus::Healthy
        } else if self.success_rate() > 0.5 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Unhealthy
        }
    }

    pub fn reset(&mut self) {
        *self = ProviderMetrics::default();
    }
}

/// Known provider names, matched case-insensitively. Anything else falls
/// back to the OpenAI-compatible adapter.
fn known_provider(name: &str) -> Option<&'static str> {
    match name.to_ascii_lowercase().as_str() {
        "openai" => Some("openai"),
        "anthropic" => Some("anthropic"),
        "volcengine" => Some("volcengine"),
        "zhipu" => Some("zhipu"),
        "aliqwen" | "qwen" | "dashscope" => Some("aliqwen"),
        "google" => Some("google"),
        "custom" => Some("custom"),
        _ => None,
    }
}

/// Build a provider instance from configuration.
///
/// An unrecognized `config.name` is not an error: it is treated as an
/// OpenAI-compatible endpoint, since that is the dialect the overwhelming
/// majority of self-hosted and third-party gateways speak.
pub fn create_provider(config: ProviderConfig) -> Result<Box<dyn Provider>, ProviderError> {
    match known_provider(&config.name).unwrap_or("openai") {
        "openai" => Ok(Box::new(openai::OpenAIProvider::new(config)?)),
        "anthropic" => Ok(Box::new(anthropic::AnthropicProvider::new(config)?)),
        "volcengine" => Ok(Box::new(volcengine::VolcengineProvider::new(config)?)),
        "zhipu" => Ok(Box::new(zhipu::ZhipuProvider::new(config)?)),
        "aliqwen" => Ok(Box::new(aliqwen::AliQwenProvider::new(config)?)),
        "google" => Ok(Box::new(google::GoogleVertexAIProvider::new(config)?)),
        "custom" => {
            let custom_config = custom::CustomProviderConfig {
                chat_endpoint: "/v1/chat/completions".to_string(),
                embedding_endpoint: Some("/v1/embeddings".to_string()),
                image_endpoint: None,
                audio_endpoint: None,
                speech_endpoint: None,
                request_format: custom::RequestFormat::OpenAI,
                response_format: custom::ResponseFormat::OpenAI,
                auth_type: custom::AuthType::Bearer,
            };
            Ok(Box::new(custom::CustomProvider::new(config, custom_config)?))
        }
        _ => unreachable!("known_provider only returns handled names"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_provider_name_falls_back_to_openai() {
        assert_eq!(known_provider("not-a-real-provider"), None);
    }

    #[test]
    fn provider_name_matching_is_case_insensitive() {
        assert_eq!(known_provider("Anthropic"), Some("anthropic"));
        assert_eq!(known_provider("ZHIPU"), Some("zhipu"));
        assert_eq!(known_provider("DashScope"), Some("aliqwen"));
    }

    #[test]
    fn provider_metrics_success_rate_defaults_to_one() {
        let metrics = ProviderMetrics::default();
        assert_eq!(metrics.success_rate(), 1.0);
    }
}

//! Reserved provider slot. Google is a named provider in configuration but
//! has no adapter implementation yet; every operation reports
//! [`ProviderError::FeatureNotSupported`] and health checks report
//! unhealthy so the router and pool route around it rather than wait on it.

use crate::error::ProviderError;
use crate::models::{
    AudioRequest, AudioResponse, ChatRequest, ChatResponse, EmbeddingRequest, EmbeddingResponse,
    ImageRequest, ImageResponse, SpeechRequest, SpeechResponse,
};
use crate::providers::{HealthStatus, Provider, ProviderConfig, ProviderHealth, StreamResult};
use std::collections::HashMap;

pub struct GoogleVertexAIProvider {
    config: ProviderConfig,
}

impl GoogleVertexAIProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        Ok(Self { config })
    }
}

#[async_trait::async_trait]
impl Provider for GoogleVertexAIProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn supports_streaming(&self) -> bool {
        false
    }

    fn supports_function_calling(&self) -> bool {
        false
    }

    fn supported_models(&self) -> Vec<String> {
        Vec::new()
    }

    async fn chat_completion(&self, _request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        Err(ProviderError::FeatureNotSupported {
            feature: "google chat_completion (reserved, not implemented)".to_string(),
        })
    }

    async fn stream_chat_completion(
        &self,
        _request: ChatRequest,
    ) -> Result<StreamResult, ProviderError> {
        Err(ProviderError::FeatureNotSupported {
            feature: "google stream_chat_completion (reserved, not implemented)".to_string(),
        })
    }

    async fn embedding(
        &self,
        _request: EmbeddingRequest,
    ) -> Result<EmbeddingResponse, ProviderError> {
        Err(ProviderError::FeatureNotSupported {
            feature: "embeddings".to_string(),
        })
    }

    async fn image_generation(
        &self,
        _request: ImageRequest,
    ) -> Result<ImageResponse, ProviderError> {
        Err(ProviderError::FeatureNotSupported {
            feature: "image_generation".to_string(),
        })
    }

    async fn audio_transcription(
        &self,
        _request: AudioRequest,
    ) -> Result<AudioResponse, ProviderError> {
        Err(ProviderError::FeatureNotSupported {
            feature: "audio_transcription".to_string(),
        })
    }

    async fn text_to_speech(
        &self,
        _request: SpeechRequest,
    ) -> Result<SpeechResponse, ProviderError> {
        Err(ProviderError::FeatureNotSupported {
            feature: "text_to_speech".to_string(),
        })
    }

    async fn health_check(&self) -> Result<ProviderHealth, ProviderError> {
        let mut details = HashMap::new();
        details.insert(
            "reason".to_string(),
            "google adapter is reserved and not yet implemented".to_string(),
        );
        Ok(ProviderHealth {
            status: HealthStatus::Unhealthy,
            latency_ms: None,
            error_rate: 1.0,
            last_check: chrono::Utc::now(),
            details,
        })
    }
}

//! OpenAI-compatible adapter.
//!
//! This is both the adapter for the literal OpenAI API and the default
//! fallback for any provider name [`super::create_provider`] doesn't
//! recognize, since the canonical request/response types already mirror
//! the OpenAI chat-completions wire format: most requests pass through
//! close to unmodified, only filling in the sampling defaults a provider
//! expects to see concretely rather than absent.

use crate::error::ProviderError;
use crate::models::{
    AudioRequest, AudioResponse, ChatRequest, ChatResponse, EmbeddingRequest, EmbeddingResponse,
    ImageRequest, ImageResponse, SpeechRequest, SpeechResponse, StreamChunk,
};
use crate::providers::http_client::{
    classify_probe_status, map_error_response, AuthStrategy, HttpProviderClient,
};
use crate::providers::{HealthStatus, Provider, ProviderConfig, ProviderHealth, StreamResult};
use async_stream::stream;
use std::collections::HashMap;
use std::time::Instant;

pub struct OpenAIProvider {
    http: HttpProviderClient,
    config: ProviderConfig,
}

impl OpenAIProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let http = HttpProviderClient::new(
            config.timeout,
            config.base_url.clone(),
            "https://api.openai.com/v1",
            &config.headers,
            AuthStrategy::Bearer {
                token: config.api_key.clone(),
            },
        )?;
        Ok(Self { http, config })
    }

    fn map_model(&self, model: &str) -> String {
        self.config
            .model_mapping
            .get(model)
            .cloned()
            .unwrap_or_else(|| model.to_string())
    }

    /// Fill in the sampling defaults this dialect expects to see concretely
    /// rather than absent, without mutating the caller's request.
    fn resolve_defaults(&self, mut request: ChatRequest) -> ChatRequest {
        request.model = self.map_model(&request.model);
        request.temperature.get_or_insert(0.7);
        request.top_p.get_or_insert(1.0);
        request.frequency_penalty.get_or_insert(0.0);
        request.presence_penalty.get_or_insert(0.0);
        request.stream.get_or_insert(false);
        request
    }

    /// `dall-e-3` is the only OpenAI image model that accepts `quality`/`style`;
    /// strip them for every other model rather than forward a rejected field.
    fn sanitize_image_request(&self, mut request: ImageRequest) -> ImageRequest {
        let model = request.model.clone().unwrap_or_else(|| "dall-e-2".to_string());
        if model != "dall-e-3" {
            request.quality = None;
            request.style = None;
        }
        request.model = Some(model);
        request
    }

    /// gpt-5-family models reject `max_tokens` and every sampling parameter;
    /// they only accept `max_completion_tokens`. Config can force this either
    /// way; absent that, infer it from the model name.
    fn uses_max_completion_tokens(&self, model: &str) -> bool {
        self.config
            .use_max_completion_tokens
            .unwrap_or_else(|| model.starts_with("gpt-5"))
    }

    fn model_supports_temperature(&self, model: &str) -> bool {
        self.config
            .supports_temperature
            .unwrap_or_else(|| !model.starts_with("gpt-5"))
    }

    /// Serialize the resolved request and reshape it for models that don't
    /// speak the standard chat-completions dialect, rather than adding
    /// provider-specific fields to the canonical request type.
    fn to_wire_payload(&self, request: &ChatRequest) -> serde_json::Value {
        let mut payload = serde_json::to_value(request).unwrap_or(serde_json::Value::Null);
        let Some(obj) = payload.as_object_mut() else {
            return payload;
        };

        if self.uses_max_completion_tokens(&request.model) {
            if let Some(max_tokens) = obj.remove("max_tokens") {
                obj.insert("max_completion_tokens".to_string(), max_tokens);
            }
        }

        if !self.model_supports_temperature(&request.model) {
            for key in [
                "temperature",
                "top_p",
                "frequency_penalty",
                "presence_penalty",
            ] {
                obj.remove(key);
            }
        }

        payload
    }
}

#[async_trait::async_trait]
impl Provider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    fn supports_function_calling(&self) -> bool {
        true
    }

    fn supported_models(&self) -> Vec<String> {
        vec![
            "gpt-4o".to_string(),
            "gpt-4o-mini".to_string(),
            "gpt-4-turbo".to_string(),
            "gpt-4".to_string(),
            "gpt-3.5-turbo".to_string(),
        ]
    }

    async fn chat_completion(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let mut request = self.resolve_defaults(request);
        request.stream = Some(false);
        let payload = self.to_wire_payload(&request);
        self.http
            .post_json("/chat/completions", &payload)
            .await
    }

    async fn stream_chat_completion(
        &self,
        request: ChatRequest,
    ) -> Result<StreamResult, ProviderError> {
        let mut request = self.resolve_defaults(request);
        request.stream = Some(true);
        let payload = self.to_wire_payload(&request);

        let response = self.http.post_json_raw("/chat/completions", &payload).await?;
        if !response.status().is_success() {
            return Err(map_error_response(response).await);
        }

        let stream = Box::pin(stream! {
            let mut bytes_stream = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk_result) = futures::StreamExt::next(&mut bytes_stream).await {
                match chunk_result {
                    Ok(chunk) => {
                        buffer.push_str(&String::from_utf8_lossy(&chunk));

                        while let Some(line_end) = buffer.find('\n') {
                            let line = buffer[..line_end].trim().to_string();
                            buffer = buffer[line_end + 1..].to_string();

                            if let Some(json_str) = line.strip_prefix("data: ") {
                                if json_str == "[DONE]" {
                                    return;
                                }
                                if json_str.trim().is_empty() {
                                    continue;
                                }
                                match serde_json::from_str::<StreamChunk>(json_str) {
                                    Ok(chunk) => yield Ok(chunk),
                                    Err(e) => yield Err(ProviderError::Serialization(e)),
                                }
                            }
                        }
                    }
                    Err(e) => yield Err(ProviderError::Http(e)),
                }
            }
        });

        Ok(stream)
    }

    async fn embedding(
        &self,
        request: EmbeddingRequest,
    ) -> Result<EmbeddingResponse, ProviderError> {
        self.http.post_json("/embeddings", &request).await
    }

    async fn image_generation(
        &self,
        request: ImageRequest,
    ) -> Result<ImageResponse, ProviderError> {
        let request = self.sanitize_image_request(request);
        self.http.post_json("/images/generations", &request).await
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
        let start = Instant::now();

        let health_request = self.resolve_defaults(ChatRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![crate::models::Message::user("ping")],
            max_tokens: Some(1),
            ..Default::default()
        });

        let response = self
            .http
            .post_json::<ChatRequest, serde_json::Value>("/chat/completions", &health_request)
            .await;

        let latency_ms = start.elapsed().as_millis() as u64;

        match response {
            Ok(_) => Ok(ProviderHealth {
                status: HealthStatus::Healthy,
                latency_ms: Some(latency_ms),
                error_rate: 0.0,
                last_check: chrono::Utc::now(),
                details: HashMap::new(),
            }),
            Err(e) => {
                let mut details = HashMap::new();
                details.insert("error".to_string(), e.to_string());
                let status = classify_probe_status(&e);
                Ok(ProviderHealth {
                    status,
                    latency_ms: Some(latency_ms),
                    error_rate: 1.0,
                    last_check: chrono::Utc::now(),
                    details,
                })
            }
        }
    }
}

//! Alibaba DashScope Qwen adapter, OpenAI-compatible mode.
//!
//! The only dialect quirk is a top-level `thinking` parameter passed
//! through verbatim to toggle Qwen's reasoning mode; since the canonical
//! request already carries that field under the same name, this adapter
//! needs no request reshaping at all.

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

pub struct AliQwenProvider {
    http: HttpProviderClient,
    config: ProviderConfig,
}

impl AliQwenProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let http = HttpProviderClient::new(
            config.timeout,
            config.base_url.clone(),
            "https://dashscope.aliyuncs.com/compatible-mode/v1",
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

    fn resolve_defaults(&self, mut request: ChatRequest) -> ChatRequest {
        request.model = self.map_model(&request.model);
        request.temperature.get_or_insert(0.7);
        request.top_p.get_or_insert(1.0);
        request.frequency_penalty.get_or_insert(0.0);
        request.presence_penalty.get_or_insert(0.0);
        request.stream.get_or_insert(false);
        request
    }
}

#[async_trait::async_trait]
impl Provider for AliQwenProvider {
    fn name(&self) -> &str {
        "aliqwen"
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    fn supports_function_calling(&self) -> bool {
        true
    }

    fn supported_models(&self) -> Vec<String> {
        vec![
            "qwen-max".to_string(),
            "qwen-plus".to_string(),
            "qwen-turbo".to_string(),
        ]
    }

    async fn chat_completion(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let mut request = self.resolve_defaults(request);
        request.stream = Some(false);
        self.http.post_json("/chat/completions", &request).await
    }

    async fn stream_chat_completion(
        &self,
        request: ChatRequest,
    ) -> Result<StreamResult, ProviderError> {
        let mut request = self.resolve_defaults(request);
        request.stream = Some(true);

        let response = self.http.post_json_raw("/chat/completions", &request).await?;
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
        let start = Instant::now();

        let health_request = self.resolve_defaults(ChatRequest {
            model: "qwen-turbo".to_string(),
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

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> AliQwenProvider {
        AliQwenProvider::new(ProviderConfig::new("aliqwen", "test-key")).unwrap()
    }

    #[test]
    fn resolve_defaults_fills_sampling_params() {
        let p = provider();
        let request = p.resolve_defaults(ChatRequest {
            model: "qwen-max".to_string(),
            messages: vec![crate::models::Message::user("hi")],
            ..Default::default()
        });
        assert_eq!(request.temperature, Some(0.7));
        assert_eq!(request.top_p, Some(1.0));
        assert_eq!(request.frequency_penalty, Some(0.0));
        assert_eq!(request.presence_penalty, Some(0.0));
        assert_eq!(request.stream, Some(false));
    }

    #[test]
    fn resolve_defaults_preserves_explicit_values() {
        let p = provider();
        let request = p.resolve_defaults(ChatRequest {
            model: "qwen-max".to_string(),
            messages: vec![crate::models::Message::user("hi")],
            temperature: Some(0.1),
            ..Default::default()
        });
        assert_eq!(request.temperature, Some(0.1));
    }

    #[test]
    fn thinking_hint_passes_through_as_top_level_field() {
        let p = provider();
        let request = p.resolve_defaults(ChatRequest {
            model: "qwen-max".to_string(),
            messages: vec![crate::models::Message::user("hi")],
            thinking: Some(serde_json::json!({"type": "enabled"})),
            ..Default::default()
        });
        let payload = serde_json::to_value(&request).unwrap();
        assert_eq!(payload["thinking"]["type"], "enabled");
    }

    #[test]
    fn unmapped_model_name_passes_through_unchanged() {
        let p = provider();
        assert_eq!(p.map_model("qwen-turbo"), "qwen-turbo");
    }
}

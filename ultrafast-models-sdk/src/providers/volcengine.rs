//! ByteDance Volcengine Ark adapter.
//!
//! Ark speaks the OpenAI chat-completions dialect with one extension:
//! reasoning mode on Doubao's thinking-capable models is toggled by an
//! `extra_body.thinking.type` field (`"enabled" | "disabled" | "auto"`),
//! not a top-level one. The canonical [`ChatRequest`] carries the hint as
//! an opaque `thinking` value, so this adapter nests it into `extra_body`
//! at wire time rather than forwarding it unmodified.

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

pub struct VolcengineProvider {
    http: HttpProviderClient,
    config: ProviderConfig,
}

impl VolcengineProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let http = HttpProviderClient::new(
            config.timeout,
            config.base_url.clone(),
            "https://ark.cn-beijing.volces.com/api/v3",
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

    /// Pull the `{"type": "enabled"|"disabled"|"auto"}` reasoning hint out of
    /// the canonical request and nest it under `extra_body.thinking`, which is
    /// where Ark actually expects it.
    fn to_wire_payload(&self, request: &ChatRequest) -> serde_json::Value {
        let mut request = request.clone();
        let thinking_type = request.thinking.take().and_then(|value| Self::thinking_type(&value));

        let mut payload = serde_json::to_value(&request).unwrap_or(serde_json::Value::Null);
        if let (Some(kind), Some(obj)) = (thinking_type, payload.as_object_mut()) {
            obj.insert(
                "extra_body".to_string(),
                serde_json::json!({ "thinking": { "type": kind } }),
            );
        }
        payload
    }

    /// `thinking` arrives as an opaque value; accept either a bare string
    /// (`"enabled"`) or an object carrying a `type` key, since both show up
    /// in the wild depending on which client built the canonical request.
    fn thinking_type(value: &serde_json::Value) -> Option<String> {
        match value {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Object(map) => {
                map.get("type").and_then(|v| v.as_str()).map(String::from)
            }
            _ => None,
        }
    }
}

#[async_trait::async_trait]
impl Provider for VolcengineProvider {
    fn name(&self) -> &str {
        "volcengine"
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    fn supports_function_calling(&self) -> bool {
        true
    }

    fn supported_models(&self) -> Vec<String> {
        vec![
            "doubao-seed-1-6".to_string(),
            "doubao-1-5-pro-32k".to_string(),
            "doubao-1-5-lite-32k".to_string(),
        ]
    }

    async fn chat_completion(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let mut request = self.resolve_defaults(request);
        request.stream = Some(false);
        let payload = self.to_wire_payload(&request);
        self.http.post_json("/chat/completions", &payload).await
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
        let start = Instant::now();

        let health_request = self.resolve_defaults(ChatRequest {
            model: "doubao-1-5-lite-32k".to_string(),
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

//! Zhipu GLM adapter.
//!
//! OpenAI-compatible dialect with two quirks: streamed deltas carry a
//! `reasoning_content` field for the model's thinking trace (mirrored onto
//! the canonical `thinking` field so callers can read either), and the
//! API emits blank keep-alive chunks that carry no role, content,
//! reasoning, finish reason, or tool call — those are dropped rather than
//! forwarded as empty SSE frames.

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

pub struct ZhipuProvider {
    http: HttpProviderClient,
    config: ProviderConfig,
}

impl ZhipuProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let http = HttpProviderClient::new(
            config.timeout,
            config.base_url.clone(),
            "https://open.bigmodel.cn/api/paas/v4",
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

    /// Mirror `reasoning_content` onto `thinking` so both fields agree, and
    /// report whether the resulting chunk is worth forwarding at all.
    fn normalize_chunk(mut chunk: StreamChunk) -> Option<StreamChunk> {
        let mut any_nonempty = false;
        for choice in &mut chunk.choices {
            if choice.delta.thinking.is_none() && choice.delta.reasoning_content.is_some() {
                choice.delta.thinking = choice.delta.reasoning_content.clone();
            }
            if !choice.delta.is_empty(&choice.finish_reason) {
                any_nonempty = true;
            }
        }
        if any_nonempty {
            Some(chunk)
        } else {
            None
        }
    }
}

#[async_trait::async_trait]
impl Provider for ZhipuProvider {
    fn name(&self) -> &str {
        "zhipu"
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    fn supports_function_calling(&self) -> bool {
        true
    }

    fn supported_models(&self) -> Vec<String> {
        vec![
            "glm-4.5".to_string(),
            "glm-4.5-air".to_string(),
            "glm-4-plus".to_string(),
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
                                    Ok(chunk) => {
                                        if let Some(chunk) = Self::normalize_chunk(chunk) {
                                            yield Ok(chunk);
                                        }
                                    }
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
            model: "glm-4.5-air".to_string(),
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
    use crate::models::{Delta, StreamChoice};

    fn chunk_with_delta(delta: Delta, finish_reason: Option<String>) -> StreamChunk {
        StreamChunk {
            id: "1".to_string(),
            object: "chat.completion.chunk".to_string(),
            created: 0,
            model: "glm-4.5".to_string(),
            choices: vec![StreamChoice {
                index: 0,
                delta,
                finish_reason,
            }],
        }
    }

    #[test]
    fn blank_keepalive_chunk_is_dropped() {
        let chunk = chunk_with_delta(Delta::default(), None);
        assert!(ZhipuProvider::normalize_chunk(chunk).is_none());
    }

    #[test]
    fn reasoning_content_is_mirrored_onto_thinking() {
        let delta = Delta {
            reasoning_content: Some("because...".to_string()),
            ..Default::default()
        };
        let chunk = chunk_with_delta(delta, None);
        let normalized = ZhipuProvider::normalize_chunk(chunk).expect("should forward");
        assert_eq!(
            normalized.choices[0].delta.thinking,
            Some("because...".to_string())
        );
    }

    #[test]
    fn chunk_with_finish_reason_is_forwarded_even_if_delta_empty() {
        let chunk = chunk_with_delta(Delta::default(), Some("stop".to_string()));
        assert!(ZhipuProvider::normalize_chunk(chunk).is_some());
    }
}

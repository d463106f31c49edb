//! # Ultrafast Models SDK
//!
//! The routing core behind the Ultrafast gateway: a canonical,
//! OpenAI-compatible chat data model, a provider-adapter layer for
//! talking to upstream LLM APIs, a sharded connection pool, and a
//! health/cost/latency-aware router that picks which `(provider,
//! api-key)` pair serves a given model name.
//!
//! The ambient HTTP surface (the `ultrafast-gateway` binary crate) is a
//! thin axum veneer over [`gateway::Gateway`] — everything that decides
//! *which* adapter handles a request, and how that adapter's performance
//! feeds back into future decisions, lives here.
//!
//! ## Data flow
//!
//! 1. A [`models::ChatRequest`] names a model.
//! 2. [`router::Router`] resolves the model against a [`catalogue::CatalogueStore`]
//!    into a ranked set of `(provider, api-key)` candidates, scored from
//!    [`metrics::MetricsRegistry`] snapshots, and picks one.
//! 3. [`pool::AdapterPool`] hands back a live [`providers::Provider`]
//!    instance for that pair, constructing one if the pool has room.
//! 4. The adapter makes the call; the outcome is recorded back into the
//!    registry and mirrored to a [`sink::MetricsSink`], closing the loop
//!    for the next routing decision.
//!
//! [`gateway::Gateway`] wires all four stages behind `route_and_invoke`
//! and `route_and_invoke_stream`.
//!
//! ## Example
//!
//! ```rust
//! use ultrafast_models_sdk::catalogue::InMemoryCatalogue;
//! use ultrafast_models_sdk::gateway::{Gateway, GatewayConfig};
//! use ultrafast_models_sdk::sink::LoggingMetricsSink;
//! use std::sync::Arc;
//!
//! let catalogue = Arc::new(InMemoryCatalogue::new());
//! let gateway = Gateway::new(catalogue, Arc::new(LoggingMetricsSink), GatewayConfig::default());
//! ```

pub mod catalogue;
pub mod common;
pub mod error;
pub mod gateway;
pub mod metrics;
pub mod models;
pub mod pool;
pub mod providers;
pub mod router;
pub mod sink;

pub use error::{ClientError, ProviderError};
pub use gateway::{Gateway, GatewayConfig, GatewayCoreError};
pub use models::{
    AudioRequest, AudioResponse, ChatRequest, ChatResponse, Choice, EmbeddingRequest,
    EmbeddingResponse, ImageRequest, ImageResponse, Message, Role, SpeechRequest, SpeechResponse,
    Usage,
};
pub use providers::{create_provider, Provider, ProviderConfig, ProviderMetrics};
pub use router::{RouteDecision, Router, RouterConfig, RouterError};

/// Result type for SDK-level operations that return a [`ClientError`].
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    #[test]
    fn message_constructors_set_role() {
        let user_msg = Message::user("Hello, world!");
        assert_eq!(user_msg.role, Role::User);
        assert_eq!(user_msg.content, "Hello, world!");

        let assistant_msg = Message::assistant("Hi there!");
        assert_eq!(assistant_msg.role, Role::Assistant);

        let system_msg = Message::system("You are a helpful assistant.");
        assert_eq!(system_msg.role, Role::System);
    }

    #[test]
    fn chat_request_defaults_are_absent() {
        let request = ChatRequest::default();
        assert_eq!(request.model, "");
        assert_eq!(request.messages.len(), 0);
        assert_eq!(request.temperature, None);
    }

    #[test]
    fn provider_config_constructor_fills_sane_defaults() {
        let config = ProviderConfig::new("test-provider", "test-key");
        assert_eq!(config.name, "test-provider");
        assert_eq!(config.api_key, "test-key");
        assert_eq!(config.timeout.as_secs(), 30);
        assert_eq!(config.max_retries, 3);
        assert!(config.enabled);
    }
}

//! HTTP handlers: the OpenAI-compatible chat completion endpoint (§6),
//! a model listing, a health probe, and a pool-stats introspection
//! endpoint. Thin by design — routing, provisioning and invocation all
//! live in [`ultrafast_models_sdk::gateway::Gateway`].

use crate::gateway_error::GatewayError;
use crate::server::AppState;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::{Stream, StreamExt};
use serde_json::json;
use std::convert::Infallible;
use ultrafast_models_sdk::catalogue::CatalogueStore;
use ultrafast_models_sdk::models::ChatRequest;

/// `POST /v1/chat/completions`. Dispatches to the streaming or
/// non-streaming gateway path depending on `request.stream`.
pub async fn chat_completions(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Response, GatewayError> {
    if request.stream.unwrap_or(false) {
        let stream = state.gateway.route_and_invoke_stream(request).await?;
        Ok(Sse::new(to_sse_stream(stream))
            .keep_alive(KeepAlive::default())
            .into_response())
    } else {
        let response = state.gateway.route_and_invoke(request).await?;
        Ok(Json(response).into_response())
    }
}

/// Frames each [`StreamChunk`](ultrafast_models_sdk::models::StreamChunk)
/// as `data: <json>\n\n`, terminated by a literal `data: [DONE]\n\n`
/// once the inner stream drains (§6 wire format). Adapter or routing
/// errors surface as a final `error` SSE event before the stream ends.
fn to_sse_stream(
    stream: ultrafast_models_sdk::gateway::GatewayStream,
) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        tokio::pin!(stream);
        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => match serde_json::to_string(&chunk) {
                    Ok(json) => yield Ok(Event::default().data(json)),
                    Err(err) => {
                        tracing::error!(%err, "failed to serialize stream chunk");
                        yield Ok(Event::default().event("error").data(err.to_string()));
                        return;
                    }
                },
                Err(err) => {
                    yield Ok(Event::default().event("error").data(err.to_string()));
                    return;
                }
            }
        }
        yield Ok(Event::default().data("[DONE]"));
    }
}

/// `GET /v1/models`.
pub async fn list_models(State(state): State<AppState>) -> Json<serde_json::Value> {
    let models = state.gateway.catalogue().get_all_models().await;
    let data: Vec<_> = models
        .into_iter()
        .filter(|m| m.enabled)
        .map(|m| {
            json!({
                "id": m.name,
                "object": "model",
                "capabilities": m.capabilities,
            })
        })
        .collect();
    Json(json!({ "object": "list", "data": data }))
}

/// `GET /health`.
pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// `GET /metrics`. `PoolStats::per_key` is keyed by `(model, provider)`
/// tuples, which don't serialize as JSON object keys — flattened into a
/// list here rather than adding a custom `Serialize` impl to the core
/// crate's public type.
pub async fn pool_metrics(State(state): State<AppState>) -> Json<serde_json::Value> {
    let stats = state.gateway.pool_stats();
    let per_key: Vec<_> = stats
        .per_key
        .iter()
        .map(|((model, provider), key_stats)| {
            json!({
                "model": model,
                "provider": provider,
                "total": key_stats.total,
                "available": key_stats.available,
                "in_use": key_stats.in_use,
                "unhealthy": key_stats.unhealthy,
                "expired": key_stats.expired,
            })
        })
        .collect();
    Json(json!({
        "total": stats.total,
        "available": stats.available,
        "in_use": stats.in_use,
        "unhealthy": stats.unhealthy,
        "expired": stats.expired,
        "per_key": per_key,
    }))
}

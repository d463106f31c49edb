//! Axum server assembly: builds a [`Gateway`] from [`Config`] and wires
//! it behind a small route table. No auth, caching, or plugin layers —
//! those are explicitly out of scope for this crate (§1); a reverse
//! proxy or API gateway in front of this binary is expected to add them.

use crate::config::Config;
use crate::handlers;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use ultrafast_models_sdk::gateway::{Gateway, GatewayConfig};
use ultrafast_models_sdk::sink::LoggingMetricsSink;

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
}

pub async fn create_server(config: Config) -> anyhow::Result<Router> {
    let catalogue = Arc::new(config.build_catalogue());
    let gateway = Arc::new(Gateway::new(
        catalogue,
        Arc::new(LoggingMetricsSink),
        GatewayConfig {
            pool: config.pool_config(),
            router: config.router_config(),
        },
    ));
    let state = AppState { gateway };
    let timeout = config.server.timeout;

    Ok(build_router(state, timeout))
}

fn build_router(state: AppState, timeout: Duration) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(handlers::chat_completions))
        .route("/v1/models", get(handlers::list_models))
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::pool_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::new(timeout))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn test_app() -> Router {
        create_server(Config::default()).await.unwrap()
    }

    #[tokio::test]
    async fn health_check_returns_ok() {
        let app = test_app().await;
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_model_returns_400() {
        let app = test_app().await;
        let body = serde_json::json!({
            "model": "does-not-exist",
            "messages": [{"role": "user", "content": "hi"}],
        });
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/chat/completions")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&body).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn list_models_returns_empty_catalogue_by_default() {
        let app = test_app().await;
        let response = app
            .oneshot(Request::builder().uri("/v1/models").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

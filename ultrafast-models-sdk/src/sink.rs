//! Metrics sink (C7, §4.5) — the injected collaborator adapters mirror
//! their metrics and health transitions to. Mirroring is best-effort: a
//! sink failure is logged and never propagated into the request path.

use crate::providers::HealthStatus;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// External collaborator contract (§6, §4.5). The real persistent-store
/// implementation is out of scope per §1 — this crate ships an in-memory
/// reference (tests) and a logging sink (ambient default).
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn sync_adapter_metrics(
        &self,
        model_id: u64,
        provider_id: u64,
        response_time_s: f64,
        success: bool,
        tokens_used: u64,
        cost: f64,
    );

    async fn sync_adapter_health(
        &self,
        model_id: u64,
        provider_id: u64,
        status: HealthStatus,
        error_message: Option<String>,
    );
}

/// Mirrors every call through `tracing`. The default for the ambient
/// binary, since the spec places a durable sink out of scope and mirroring
/// failures must be swallowed anyway.
#[derive(Default)]
pub struct LoggingMetricsSink;

#[async_trait]
impl MetricsSink for LoggingMetricsSink {
    async fn sync_adapter_metrics(
        &self,
        model_id: u64,
        provider_id: u64,
        response_time_s: f64,
        success: bool,
        tokens_used: u64,
        cost: f64,
    ) {
        tracing::debug!(
            model_id,
            provider_id,
            response_time_s,
            success,
            tokens_used,
            cost,
            "adapter metrics"
        );
    }

    async fn sync_adapter_health(
        &self,
        model_id: u64,
        provider_id: u64,
        status: HealthStatus,
        error_message: Option<String>,
    ) {
        match status {
            HealthStatus::Healthy => {
                tracing::debug!(model_id, provider_id, "adapter healthy")
            }
            HealthStatus::Degraded => {
                tracing::warn!(model_id, provider_id, ?error_message, "adapter degraded")
            }
            HealthStatus::Unhealthy => {
                tracing::warn!(model_id, provider_id, ?error_message, "adapter unhealthy")
            }
        }
    }
}

/// Records calls in memory for assertions; used by the pool/router test
/// suite to confirm mirroring happens and never blocks the request path.
#[derive(Default)]
pub struct InMemoryMetricsSink {
    pub metrics_calls: AtomicU64,
    pub health_calls: AtomicU64,
}

impl InMemoryMetricsSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl MetricsSink for InMemoryMetricsSink {
    async fn sync_adapter_metrics(
        &self,
        _model_id: u64,
        _provider_id: u64,
        _response_time_s: f64,
        _success: bool,
        _tokens_used: u64,
        _cost: f64,
    ) {
        self.metrics_calls.fetch_add(1, Ordering::Relaxed);
    }

    async fn sync_adapter_health(
        &self,
        _model_id: u64,
        _provider_id: u64,
        _status: HealthStatus,
        _error_message: Option<String>,
    ) {
        self.health_calls.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_sink_counts_calls() {
        let sink = InMemoryMetricsSink::new();
        sink.sync_adapter_metrics(1, 1, 0.1, true, 10, 0.001).await;
        sink.sync_adapter_health(1, 1, HealthStatus::Healthy, None).await;
        assert_eq!(sink.metrics_calls.load(Ordering::Relaxed), 1);
        assert_eq!(sink.health_calls.load(Ordering::Relaxed), 1);
    }
}

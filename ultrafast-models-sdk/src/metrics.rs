//! Per-adapter rolling metrics (§3, §4.5) consulted by the router's
//! scoring function and mirrored to the external metrics sink.
//!
//! [`AdapterMetrics`] is the record itself; [`MetricsRegistry`] is the
//! shared, concurrent map the pool writes into after every request and the
//! router reads from when scoring candidates — both sides of the feedback
//! loop described in §2's data flow hold the same registry rather than
//! copies of it.

use crate::providers::HealthStatus;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// `(model name, provider name)` — the same granularity the pool shards on.
pub type MetricsKey = (String, String);

/// Rolling statistics tracked per `(model, provider)` pair.
///
/// The update rule follows the spec literally: success rate is recomputed
/// from the running totals on every call rather than smoothed, and
/// `response_time_s` is simply the last sample. An EWMA is an allowed
/// refinement (§9 open questions) but isn't applied here, so the record
/// stays auditable against the spec's update formula.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterMetrics {
    pub response_time_s: f64,
    pub success_rate: f64,
    pub cost_per_1k_tokens: f64,
    pub total_requests: u64,
    pub total_tokens: u64,
    pub last_health_check: i64,
    pub error_count: u64,
}

impl Default for AdapterMetrics {
    fn default() -> Self {
        Self {
            response_time_s: 0.0,
            success_rate: 1.0,
            cost_per_1k_tokens: 0.0,
            total_requests: 0,
            total_tokens: 0,
            last_health_check: 0,
            error_count: 0,
        }
    }
}

impl AdapterMetrics {
    /// Apply the §3 update rule for the completion of one request.
    pub fn record(&mut self, response_time_s: f64, success: bool, tokens_used: u64) {
        self.total_requests += 1;
        self.total_tokens += tokens_used;
        let n = self.total_requests as f64;
        if success {
            self.success_rate = (self.success_rate * (n - 1.0) + 1.0) / n;
        } else {
            self.success_rate = self.success_rate * (n - 1.0) / n;
            self.error_count += 1;
        }
        self.response_time_s = response_time_s;
        self.touch_health_check();
    }

    pub fn touch_health_check(&mut self) {
        self.last_health_check = now_unix();
    }

    /// `cost = (tokens_used / 1000) * cost_per_1k_tokens`, zero when no
    /// tokens were used, per the original `get_cost_estimate`.
    pub fn cost_estimate(tokens_used: u64, cost_per_1k_tokens: f64) -> f64 {
        if tokens_used == 0 {
            0.0
        } else {
            (tokens_used as f64 / 1000.0) * cost_per_1k_tokens
        }
    }

    /// §4.4 scoring terms. The router adds the normalised link-weight term
    /// itself since that requires the full candidate set.
    pub fn response_time_score(&self) -> f64 {
        (1.0 - self.response_time_s / 10.0).max(0.0)
    }

    pub fn success_rate_score(&self) -> f64 {
        self.success_rate
    }
}

/// `costScore = max(0, 1 - cost_per_1k_tokens / 0.1)`.
pub fn cost_score(cost_per_1k_tokens: f64) -> f64 {
    (1.0 - cost_per_1k_tokens / 0.1).max(0.0)
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Shared metrics + health state, consulted by the router and written by
/// the pool. Cheap to clone — it's a handle around two `Arc<DashMap>`s.
#[derive(Clone, Default)]
pub struct MetricsRegistry {
    entries: Arc<DashMap<MetricsKey, AdapterMetrics>>,
    health: Arc<DashMap<MetricsKey, HealthStatus>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &self,
        key: &MetricsKey,
        response_time_s: f64,
        success: bool,
        tokens_used: u64,
        cost_per_1k_tokens: f64,
    ) {
        let mut entry = self.entries.entry(key.clone()).or_default();
        entry.cost_per_1k_tokens = cost_per_1k_tokens;
        entry.record(response_time_s, success, tokens_used);
    }

    pub fn snapshot(&self, key: &MetricsKey) -> AdapterMetrics {
        self.entries.get(key).map(|e| e.clone()).unwrap_or_default()
    }

    /// `Healthy` until proven otherwise — a candidate that has never been
    /// probed is assumed reachable rather than excluded from routing.
    pub fn health(&self, key: &MetricsKey) -> HealthStatus {
        self.health.get(key).map(|h| *h).unwrap_or(HealthStatus::Healthy)
    }

    pub fn set_health(&self, key: &MetricsKey, status: HealthStatus) {
        self.health.insert(key.clone(), status);
        self.entries.entry(key.clone()).or_default().touch_health_check();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_rate_matches_s_over_n() {
        let mut m = AdapterMetrics::default();
        for i in 0..10 {
            m.record(0.1, i % 3 != 0, 5);
        }
        let successes = (0..10).filter(|i| i % 3 != 0).count() as f64;
        assert!((m.success_rate - successes / 10.0).abs() < 1e-9);
    }

    #[test]
    fn error_count_tracks_failures_only() {
        let mut m = AdapterMetrics::default();
        m.record(0.1, true, 10);
        m.record(0.2, false, 0);
        m.record(0.3, false, 0);
        assert_eq!(m.error_count, 2);
        assert_eq!(m.total_requests, 3);
    }

    #[test]
    fn cost_estimate_is_zero_without_tokens() {
        assert_eq!(AdapterMetrics::cost_estimate(0, 0.05), 0.0);
        assert!((AdapterMetrics::cost_estimate(2000, 0.05) - 0.1).abs() < 1e-9);
    }

    #[test]
    fn response_time_score_floors_at_zero() {
        let mut m = AdapterMetrics::default();
        m.response_time_s = 20.0;
        assert_eq!(m.response_time_score(), 0.0);
        m.response_time_s = 0.0;
        assert_eq!(m.response_time_score(), 1.0);
    }

    #[test]
    fn registry_defaults_to_healthy_before_any_probe() {
        let registry = MetricsRegistry::new();
        let key = ("gpt-4".to_string(), "openai".to_string());
        assert_eq!(registry.health(&key), HealthStatus::Healthy);
    }

    #[test]
    fn registry_records_and_snapshots() {
        let registry = MetricsRegistry::new();
        let key = ("gpt-4".to_string(), "openai".to_string());
        registry.record(&key, 0.5, true, 100, 0.01);
        let snap = registry.snapshot(&key);
        assert_eq!(snap.total_requests, 1);
        assert_eq!(snap.total_tokens, 100);
    }
}

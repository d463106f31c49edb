//! Adapter pool (C5, §4.3) — a bounded, sharded pool of live upstream
//! client sessions, indexed by `(model, provider)`, with idle/usage
//! expiry, background health checks, and wait-or-fail acquisition.
//!
//! Sharding exists to avoid contention under fan-in: each shard owns an
//! independent `std::sync::Mutex`, never held across network I/O or any
//! `.await` point, so adapter construction and health probes always run
//! outside the critical section (§4.3, §5).

use crate::catalogue::{ApiKeyDescriptor, ModelProviderLink, ProviderDefaults, ProviderDescriptor};
use crate::metrics::MetricsRegistry;
use crate::providers::{create_provider, HealthStatus, Provider, ProviderConfig};
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::watch;

/// `(model name, provider name)` — matches [`crate::metrics::MetricsKey`].
pub type PoolKey = (String, String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    Available,
    InUse,
    Unhealthy,
    Expired,
}

#[derive(Debug, Clone)]
pub struct AdapterConfigSnapshot {
    pub base_url: Option<String>,
    pub model: String,
    pub cost_per_1k_tokens: f64,
    pub timeout: Duration,
    pub retry_count: u32,
    pub weight: f64,
    pub api_key_id: u64,
    pub model_id: u64,
    pub provider_id: u64,
}

struct AdapterEntry {
    adapter: Arc<dyn Provider>,
    state: AdapterState,
    created_time: Instant,
    last_used_time: Instant,
    use_count: u64,
    last_health_check: Instant,
    generation: u64,
    config: AdapterConfigSnapshot,
}

impl AdapterEntry {
    fn is_idle_expired(&self, max_idle_time: Duration, now: Instant) -> bool {
        self.state == AdapterState::Available
            && now.duration_since(self.last_used_time) > max_idle_time
    }

    fn is_use_count_expired(&self, max_use_count: u64) -> bool {
        self.use_count >= max_use_count
    }
}

/// What the pool needs to build a fresh adapter for a `(model, provider)`
/// key on a cache miss — assembled by the router's [`crate::router::RouteDecision`].
#[derive(Debug, Clone)]
pub struct AcquireRequest {
    pub model: String,
    pub provider: ProviderDescriptor,
    pub api_key: ApiKeyDescriptor,
    pub link: ModelProviderLink,
    pub provider_defaults: ProviderDefaults,
}

impl AcquireRequest {
    fn key(&self) -> PoolKey {
        (self.model.clone(), self.provider.name.clone())
    }

    fn to_provider_config(&self) -> ProviderConfig {
        let mut config = ProviderConfig::new(self.provider.name.clone(), self.api_key.api_key.clone());
        config.base_url = self
            .api_key
            .base_url
            .clone()
            .or_else(|| self.provider.official_endpoint.clone());
        config.timeout = Duration::from_secs(self.provider_defaults.timeout_s);
        config.max_retries = self.provider_defaults.retry_count;
        config.use_max_completion_tokens = self.provider_defaults.use_max_completion_tokens;
        config.supports_temperature = self.provider_defaults.supports_temperature;
        config
    }

    fn config_snapshot(&self) -> AdapterConfigSnapshot {
        AdapterConfigSnapshot {
            base_url: self.api_key.base_url.clone(),
            model: self.model.clone(),
            cost_per_1k_tokens: self.link.cost_per_1k_tokens,
            timeout: Duration::from_secs(self.provider_defaults.timeout_s),
            retry_count: self.provider_defaults.retry_count,
            weight: self.link.weight,
            api_key_id: self.api_key.id,
            model_id: self.link.llm_id,
            provider_id: self.provider.id,
        }
    }
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("pool wait timed out acquiring an adapter for {0:?}")]
    WaitTimeout(PoolKey),
    #[error("adapter could not be provisioned for {0:?}: {1}")]
    NotProvisionable(PoolKey, String),
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub min_pool_size: usize,
    pub max_pool_size: usize,
    pub num_shards: usize,
    pub max_idle_time: Duration,
    pub max_use_count: u64,
    pub cleanup_interval: Duration,
    pub health_check_interval: Duration,
    /// Upper bound on a single health probe (§6); a probe that doesn't
    /// answer within this window counts as a failure.
    pub health_check_timeout: Duration,
    pub wait_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_pool_size: 2,
            max_pool_size: 10,
            num_shards: 16,
            max_idle_time: Duration::from_secs(300),
            max_use_count: 1000,
            cleanup_interval: Duration::from_secs(60),
            health_check_interval: Duration::from_secs(300),
            health_check_timeout: Duration::from_secs(10),
            wait_timeout: Duration::from_secs(5),
        }
    }
}

impl PoolConfig {
    /// The "optimised" profile from §4.3: 5/20 pool bounds, tighter loops.
    pub fn optimised() -> Self {
        Self {
            min_pool_size: 5,
            max_pool_size: 20,
            num_shards: 16,
            max_idle_time: Duration::from_secs(300),
            max_use_count: 1000,
            cleanup_interval: Duration::from_secs(30),
            health_check_interval: Duration::from_secs(180),
            health_check_timeout: Duration::from_secs(10),
            wait_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PoolKeyStats {
    pub total: usize,
    pub available: usize,
    pub in_use: usize,
    pub unhealthy: usize,
    pub expired: usize,
}

#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    pub total: usize,
    pub available: usize,
    pub in_use: usize,
    pub unhealthy: usize,
    pub expired: usize,
    pub per_key: HashMap<PoolKey, PoolKeyStats>,
}

/// A shard's per-key entry list. Slots are addressed by position and
/// never shift once allocated: an expired or unhealthy entry is
/// tombstoned to `None` in place rather than removed, so a [`PoolGuard`]
/// holding an `index` into this vector always points at the slot it was
/// issued for (or a tombstone, caught by the generation check), never at
/// a different, unrelated entry that happened to compact into its spot.
type EntrySlots = Vec<Option<AdapterEntry>>;

/// Finds a tombstoned slot to reuse, or appends a new one; returns the
/// index the entry now lives at.
fn insert_entry(vec: &mut EntrySlots, entry: AdapterEntry) -> usize {
    if let Some(index) = vec.iter().position(|slot| slot.is_none()) {
        vec[index] = Some(entry);
        index
    } else {
        let index = vec.len();
        vec.push(Some(entry));
        index
    }
}

fn live_count(vec: &EntrySlots) -> usize {
    vec.iter().filter(|slot| slot.is_some()).count()
}

struct Shard {
    entries: Mutex<HashMap<PoolKey, EntrySlots>>,
    templates: Mutex<HashMap<PoolKey, AcquireRequest>>,
}

impl Shard {
    fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            templates: Mutex::new(HashMap::new()),
        }
    }
}

/// Exclusive borrow of one [`AdapterEntry`]. Must be released (explicitly,
/// or implicitly on drop) before the slot becomes acquirable again.
/// `generation` guards against a stale release reaching a slot that was
/// since recycled (spec §9's "index plus generation tag").
pub struct PoolGuard {
    pool: Arc<AdapterPool>,
    key: PoolKey,
    index: usize,
    generation: u64,
    adapter: Arc<dyn Provider>,
    config: AdapterConfigSnapshot,
    released: AtomicBool,
}

impl PoolGuard {
    pub fn adapter(&self) -> &Arc<dyn Provider> {
        &self.adapter
    }

    pub fn config(&self) -> &AdapterConfigSnapshot {
        &self.config
    }

    pub fn key(&self) -> &PoolKey {
        &self.key
    }

    /// Explicit release. Idempotent — a second call (or the `Drop` impl
    /// that follows) is a no-op.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        self.pool.release_slot(&self.key, self.index, self.generation);
    }
}

impl Drop for PoolGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Bounded, sharded pool of live upstream adapter sessions (§4.3).
pub struct AdapterPool {
    config: PoolConfig,
    shards: Vec<Shard>,
    metrics: MetricsRegistry,
    next_generation: AtomicU64,
    shutdown_tx: watch::Sender<bool>,
    self_ref: Weak<AdapterPool>,
}

impl AdapterPool {
    pub fn new(config: PoolConfig, metrics: MetricsRegistry) -> Arc<Self> {
        let num_shards = config.num_shards.max(1);
        let (shutdown_tx, _rx) = watch::channel(false);
        Arc::new_cyclic(|self_ref| Self {
            config,
            shards: (0..num_shards).map(|_| Shard::new()).collect(),
            metrics,
            next_generation: AtomicU64::new(1),
            shutdown_tx,
            self_ref: self_ref.clone(),
        })
    }

    fn shard_index(&self, key: &PoolKey) -> usize {
        let mut hasher = DefaultHasher::new();
        key.0.hash(&mut hasher);
        key.1.hash(&mut hasher);
        (hasher.finish() as usize) % self.shards.len()
    }

    /// §4.3 `acquire`: scan for an idle entry, else construct up to
    /// `max_pool_size`, else poll every 100ms until `wait_timeout`.
    pub async fn acquire(self: &Arc<Self>, request: AcquireRequest) -> Result<PoolGuard, PoolError> {
        let key = request.key();
        let shard = &self.shards[self.shard_index(&key)];
        shard
            .templates
            .lock()
            .unwrap()
            .insert(key.clone(), request.clone());

        let deadline = Instant::now() + self.config.wait_timeout;
        loop {
            match self.try_acquire_once(shard, &key, &request)? {
                Some(guard) => return Ok(guard),
                None => {
                    if Instant::now() >= deadline {
                        return Err(PoolError::WaitTimeout(key));
                    }
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    /// Returns `Ok(None)` when the pool is at capacity and nothing is free
    /// right now (caller should poll); `Err` only for provisioning
    /// failures, which are never worth retrying on the same config.
    fn try_acquire_once(
        &self,
        shard: &Shard,
        key: &PoolKey,
        request: &AcquireRequest,
    ) -> Result<Option<PoolGuard>, PoolError> {
        let now = Instant::now();
        let mut entries = shard.entries.lock().unwrap();
        let vec = entries.entry(key.clone()).or_default();

        for (index, slot) in vec.iter_mut().enumerate() {
            let Some(entry) = slot else { continue };
            if entry.state == AdapterState::Available
                && !entry.is_idle_expired(self.config.max_idle_time, now)
                && !entry.is_use_count_expired(self.config.max_use_count)
            {
                entry.state = AdapterState::InUse;
                entry.use_count += 1;
                entry.last_used_time = now;
                return Ok(Some(self.make_guard(key, index, entry)));
            }
        }

        if live_count(vec) < self.config.max_pool_size {
            let adapter = create_provider(request.to_provider_config()).map_err(|e| {
                PoolError::NotProvisionable(key.clone(), e.to_string())
            })?;
            let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
            let entry = AdapterEntry {
                adapter: Arc::from(adapter),
                state: AdapterState::InUse,
                created_time: now,
                last_used_time: now,
                use_count: 1,
                last_health_check: now,
                generation,
                config: request.config_snapshot(),
            };
            let index = insert_entry(vec, entry);
            let entry_ref = vec[index].as_ref().unwrap();
            return Ok(Some(PoolGuard {
                pool: self.self_arc(),
                key: key.clone(),
                index,
                generation: entry_ref.generation,
                adapter: entry_ref.adapter.clone(),
                config: entry_ref.config.clone(),
                released: AtomicBool::new(false),
            }));
        }

        Ok(None)
    }

    fn make_guard(&self, key: &PoolKey, index: usize, entry: &AdapterEntry) -> PoolGuard {
        PoolGuard {
            pool: self.self_arc(),
            key: key.clone(),
            index,
            generation: entry.generation,
            adapter: entry.adapter.clone(),
            config: entry.config.clone(),
            released: AtomicBool::new(false),
        }
    }

    /// Upgrades the self-`Weak` stashed at construction (`Arc::new_cyclic`)
    /// so a guard can hold a strong reference back to the pool. Always
    /// succeeds: a guard is only ever created while `self` is alive.
    fn self_arc(&self) -> Arc<AdapterPool> {
        self.self_ref.upgrade().expect("pool dropped while a guard was being created")
    }

    fn release_slot(&self, key: &PoolKey, index: usize, generation: u64) {
        let shard = &self.shards[self.shard_index(key)];
        let mut entries = shard.entries.lock().unwrap();
        if let Some(vec) = entries.get_mut(key) {
            if let Some(Some(entry)) = vec.get_mut(index) {
                if entry.generation == generation && entry.state == AdapterState::InUse {
                    entry.state = AdapterState::Available;
                    entry.last_used_time = Instant::now();
                }
            }
        }
    }

    /// Record the outcome of a request on the entry the guard borrowed,
    /// mirroring into the shared [`MetricsRegistry`] the router reads.
    ///
    /// `failure_status` classifies a failed request per the health-status
    /// bookkeeping rule (§4.1): `Degraded` for an ordinary 4xx, `Unhealthy`
    /// for a 401, a 5xx, or a connection fault. Ignored when `success` is
    /// true.
    pub fn record_outcome(
        &self,
        guard: &PoolGuard,
        response_time_s: f64,
        success: bool,
        tokens_used: u64,
        failure_status: HealthStatus,
    ) {
        self.metrics.record(
            guard.key(),
            response_time_s,
            success,
            tokens_used,
            guard.config().cost_per_1k_tokens,
        );
        if !success {
            self.apply_health_status(guard, failure_status);
        }
    }

    /// Mirror a classified health status into the metrics registry, and
    /// pull the borrowed entry out of rotation only when it is unhealthy —
    /// a merely degraded adapter stays eligible, just scored lower.
    fn apply_health_status(&self, guard: &PoolGuard, status: HealthStatus) {
        self.metrics.set_health(guard.key(), status);
        if status == HealthStatus::Unhealthy {
            let shard = &self.shards[self.shard_index(guard.key())];
            let mut entries = shard.entries.lock().unwrap();
            if let Some(vec) = entries.get_mut(guard.key()) {
                if let Some(Some(entry)) = vec.get_mut(guard.index) {
                    if entry.generation == guard.generation {
                        entry.state = AdapterState::Unhealthy;
                    }
                }
            }
        }
    }

    pub fn stats(&self) -> PoolStats {
        let mut stats = PoolStats::default();
        for shard in &self.shards {
            let entries = shard.entries.lock().unwrap();
            for (key, vec) in entries.iter() {
                let mut key_stats = PoolKeyStats::default();
                for entry in vec.iter().flatten() {
                    key_stats.total += 1;
                    match entry.state {
                        AdapterState::Available => key_stats.available += 1,
                        AdapterState::InUse => key_stats.in_use += 1,
                        AdapterState::Unhealthy => key_stats.unhealthy += 1,
                        AdapterState::Expired => key_stats.expired += 1,
                    }
                }
                stats.total += key_stats.total;
                stats.available += key_stats.available;
                stats.in_use += key_stats.in_use;
                stats.unhealthy += key_stats.unhealthy;
                stats.expired += key_stats.expired;
                stats.per_key.insert(key.clone(), key_stats);
            }
        }
        stats
    }

    /// Spawn the janitor loop (§4.3): evicts idle/over-used/unhealthy
    /// entries and refills below `min_pool_size` using the last acquire
    /// request seen for that key.
    pub fn spawn_janitor(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let pool = self.clone();
        let mut shutdown = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(pool.config.cleanup_interval) => {
                        pool.run_janitor_pass();
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        })
    }

    fn run_janitor_pass(&self) {
        for shard in &self.shards {
            let mut refill: Vec<PoolKey> = Vec::new();
            {
                let mut entries = shard.entries.lock().unwrap();
                let now = Instant::now();
                for (key, vec) in entries.iter_mut() {
                    for slot in vec.iter_mut() {
                        let expired = match slot {
                            Some(entry) if entry.state != AdapterState::InUse => {
                                entry.is_idle_expired(self.config.max_idle_time, now)
                                    || entry.is_use_count_expired(self.config.max_use_count)
                                    || entry.state == AdapterState::Unhealthy
                            }
                            _ => false,
                        };
                        if expired {
                            *slot = None;
                        }
                    }
                    if live_count(vec) < self.config.min_pool_size {
                        refill.push(key.clone());
                    }
                }
            }
            for key in refill {
                let template = shard.templates.lock().unwrap().get(&key).cloned();
                if let Some(request) = template {
                    let deficit = {
                        let entries = shard.entries.lock().unwrap();
                        self.config.min_pool_size.saturating_sub(
                            entries.get(&key).map(|vec| live_count(vec)).unwrap_or(0),
                        )
                    };
                    for _ in 0..deficit {
                        if let Ok(adapter) = create_provider(request.to_provider_config()) {
                            let now = Instant::now();
                            let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                            let entry = AdapterEntry {
                                adapter: Arc::from(adapter),
                                state: AdapterState::Available,
                                created_time: now,
                                last_used_time: now,
                                use_count: 0,
                                last_health_check: now,
                                generation,
                                config: request.config_snapshot(),
                            };
                            insert_entry(
                                shard.entries.lock().unwrap().entry(key.clone()).or_default(),
                                entry,
                            );
                        }
                    }
                }
            }
        }
    }

    /// Spawn the health loop (§4.3): probes `Available` entries whose last
    /// check is older than `health_check_interval`; a probe failure
    /// degrades the entry to `Unhealthy` once rather than discarding it
    /// immediately (the janitor removes `Unhealthy` entries on its own
    /// schedule).
    pub fn spawn_health_loop(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let pool = self.clone();
        let mut shutdown = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(pool.config.health_check_interval) => {
                        pool.run_health_pass().await;
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        })
    }

    async fn run_health_pass(&self) {
        let now = Instant::now();
        for shard_index in 0..self.shards.len() {
            let candidates: Vec<(PoolKey, usize, u64, Arc<dyn Provider>)> = {
                let shard = &self.shards[shard_index];
                let entries = shard.entries.lock().unwrap();
                let mut out = Vec::new();
                for (key, vec) in entries.iter() {
                    for (index, slot) in vec.iter().enumerate() {
                        let Some(entry) = slot else { continue };
                        if entry.state == AdapterState::Available
                            && now.duration_since(entry.last_health_check) >= self.config.health_check_interval
                        {
                            out.push((key.clone(), index, entry.generation, entry.adapter.clone()));
                        }
                    }
                }
                out
            };

            for (key, index, generation, adapter) in candidates {
                let result = tokio::time::timeout(self.config.health_check_timeout, adapter.health_check())
                    .await
                    .unwrap_or_else(|_| Err(crate::error::ProviderError::Timeout));
                let shard = &self.shards[shard_index];
                let mut entries = shard.entries.lock().unwrap();
                if let Some(vec) = entries.get_mut(&key) {
                    if let Some(Some(entry)) = vec.get_mut(index) {
                        if entry.generation != generation {
                            continue;
                        }
                        entry.last_health_check = Instant::now();
                        match result {
                            Ok(health) if health.status != HealthStatus::Unhealthy => {
                                if entry.state == AdapterState::Unhealthy {
                                    entry.state = AdapterState::Available;
                                }
                                self.metrics.set_health(&key, health.status);
                            }
                            _ => {
                                entry.state = AdapterState::Unhealthy;
                                self.metrics.set_health(&key, HealthStatus::Unhealthy);
                            }
                        }
                    }
                }
            }
        }
    }

    /// Signal the janitor and health loops to stop within one interval
    /// (§5 cancellation requirement).
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::{ModelType, ProviderKind};

    fn request(model: &str, provider: &str) -> AcquireRequest {
        AcquireRequest {
            model: model.to_string(),
            provider: ProviderDescriptor {
                id: 1,
                name: provider.to_string(),
                kind: ProviderKind::PublicCloud,
                official_endpoint: Some("https://api.openai.com/v1".to_string()),
                third_party_endpoint: None,
                enabled: true,
            },
            api_key: ApiKeyDescriptor {
                id: 1,
                provider_id: 1,
                api_key: "sk-test".to_string(),
                base_url: None,
                enabled: true,
                preferred: true,
                weight: 1.0,
                daily_quota: None,
                usage_count: 0,
                description: None,
            },
            link: ModelProviderLink {
                llm_id: 1,
                provider_id: 1,
                weight: 1.0,
                preferred: false,
                enabled: true,
                cost_per_1k_tokens: 0.01,
            },
            provider_defaults: ProviderDefaults::default(),
        }
    }
    // silence unused import warnings for ModelType in case future tests need it
    #[allow(dead_code)]
    fn _unused() -> ModelType {
        ModelType::Public
    }

    #[tokio::test]
    async fn acquire_then_release_recycles_the_same_slot() {
        let pool = AdapterPool::new(PoolConfig::default(), MetricsRegistry::new());
        let guard = pool.acquire(request("gpt-4", "openai")).await.unwrap();
        let stats = pool.stats();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.in_use, 1);
        guard.release();
        let stats = pool.stats();
        assert_eq!(stats.available, 1);
        assert_eq!(stats.in_use, 0);
    }

    #[tokio::test]
    async fn double_release_is_a_no_op() {
        let pool = AdapterPool::new(PoolConfig::default(), MetricsRegistry::new());
        let guard = pool.acquire(request("gpt-4", "openai")).await.unwrap();
        guard.release();
        guard.release();
        let stats = pool.stats();
        assert_eq!(stats.available, 1);
    }

    #[tokio::test]
    async fn drop_releases_the_slot() {
        let pool = AdapterPool::new(PoolConfig::default(), MetricsRegistry::new());
        {
            let _guard = pool.acquire(request("gpt-4", "openai")).await.unwrap();
            assert_eq!(pool.stats().in_use, 1);
        }
        assert_eq!(pool.stats().available, 1);
    }

    #[tokio::test]
    async fn pool_exhaustion_waits_then_succeeds_on_release() {
        let mut config = PoolConfig::default();
        config.max_pool_size = 2;
        config.wait_timeout = Duration::from_secs(2);
        let pool = AdapterPool::new(config, MetricsRegistry::new());

        let g1 = pool.acquire(request("gpt-4", "openai")).await.unwrap();
        let g2 = pool.acquire(request("gpt-4", "openai")).await.unwrap();
        assert_eq!(pool.stats().total, 2);

        let pool2 = pool.clone();
        let waiter = tokio::spawn(async move { pool2.acquire(request("gpt-4", "openai")).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        g1.release();

        let g3 = waiter.await.unwrap().unwrap();
        assert_eq!(pool.stats().total, 2);
        g2.release();
        g3.release();
    }

    #[tokio::test]
    async fn wait_timeout_surfaces_when_nothing_frees_up() {
        let mut config = PoolConfig::default();
        config.max_pool_size = 1;
        config.wait_timeout = Duration::from_millis(200);
        let pool = AdapterPool::new(config, MetricsRegistry::new());

        let _g1 = pool.acquire(request("gpt-4", "openai")).await.unwrap();
        let result = pool.acquire(request("gpt-4", "openai")).await;
        assert!(matches!(result, Err(PoolError::WaitTimeout(_))));
    }

    /// Invariant 3 / §9 "index plus generation tag": a janitor pass that
    /// tombstones a lower-indexed entry must not disturb the slot index a
    /// still-held guard was issued for. Regression test for a prior bug
    /// where `Vec::retain` compacted the entry vector and silently
    /// invalidated later guards' stored indices.
    #[tokio::test]
    async fn janitor_pass_does_not_invalidate_a_later_held_guards_slot() {
        let mut config = PoolConfig::default();
        config.min_pool_size = 0;
        let pool = AdapterPool::new(config, MetricsRegistry::new());

        let g0 = pool.acquire(request("gpt-4", "openai")).await.unwrap();
        let g1 = pool.acquire(request("gpt-4", "openai")).await.unwrap();
        assert_eq!(pool.stats().total, 2);

        pool.record_outcome(&g0, 0.1, false, 0, HealthStatus::Unhealthy);
        g0.release();

        pool.run_janitor_pass();
        assert_eq!(pool.stats().total, 1, "the unhealthy entry should be tombstoned");

        g1.release();
        let stats = pool.stats();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.available, 1);
        assert_eq!(stats.in_use, 0);
    }

    #[tokio::test]
    async fn record_outcome_marks_unhealthy_on_failure() {
        let pool = AdapterPool::new(PoolConfig::default(), MetricsRegistry::new());
        let guard = pool.acquire(request("gpt-4", "openai")).await.unwrap();
        pool.record_outcome(&guard, 0.2, false, 0, HealthStatus::Unhealthy);
        assert_eq!(pool.metrics.health(guard.key()), HealthStatus::Unhealthy);
        guard.release();
        let stats = pool.stats();
        assert_eq!(stats.unhealthy, 1);
    }

    #[tokio::test]
    async fn record_outcome_with_degraded_status_keeps_entry_in_rotation() {
        let pool = AdapterPool::new(PoolConfig::default(), MetricsRegistry::new());
        let guard = pool.acquire(request("gpt-4", "openai")).await.unwrap();
        pool.record_outcome(&guard, 0.2, false, 0, HealthStatus::Degraded);
        assert_eq!(pool.metrics.health(guard.key()), HealthStatus::Degraded);
        guard.release();
        let stats = pool.stats();
        assert_eq!(stats.unhealthy, 0);
        assert_eq!(stats.available, 1);
    }

    #[tokio::test]
    async fn single_shard_behaves_like_a_plain_pool() {
        let mut config = PoolConfig::default();
        config.num_shards = 1;
        let pool = AdapterPool::new(config, MetricsRegistry::new());
        let g1 = pool.acquire(request("gpt-4", "openai")).await.unwrap();
        let g2 = pool.acquire(request("claude-3", "anthropic")).await.unwrap();
        assert_eq!(pool.stats().total, 2);
        g1.release();
        g2.release();
    }
}

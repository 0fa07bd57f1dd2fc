use crate::Credentials;
use ahash::AHashMap as HashMap;
use parking_lot::RwLock;
use prometheus_client::{
    metrics::{counter::Counter, gauge::Gauge},
    registry::Registry,
};
use std::sync::Arc;
use tokio::time::{self, Duration, Instant};
use tracing::debug;

/// Caches validated credentials per tenant for a fixed TTL.
///
/// Lookups take a shared lock; `set` and `sweep` take the exclusive lock for
/// the duration of their mutation. Expired entries are never returned, even
/// before a sweep removes them.
#[derive(Debug)]
pub struct CredentialCache {
    entries: RwLock<HashMap<String, Entry>>,
    ttl: Duration,
    metrics: CacheMetrics,
}

#[derive(Clone, Debug, Default)]
pub struct CacheMetrics {
    entries: Gauge,
    hits: Counter,
    misses: Counter,
    evictions: Counter,
}

#[derive(Debug)]
struct Entry {
    credentials: Credentials,
    expires_at: Instant,
}

// === impl CredentialCache ===

impl CredentialCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_metrics(ttl, CacheMetrics::default())
    }

    pub fn with_metrics(ttl: Duration, metrics: CacheMetrics) -> Self {
        Self {
            entries: RwLock::new(HashMap::default()),
            ttl,
            metrics,
        }
    }

    /// Returns the cached credentials for `tenant` unless they are absent or
    /// expired.
    pub fn get(&self, tenant: &str) -> Option<Credentials> {
        let now = Instant::now();
        self.entries
            .read()
            .get(tenant)
            .filter(|e| now < e.expires_at)
            .map(|e| e.credentials.clone())
    }

    /// Stores `credentials` for `tenant`, replacing any previous entry and
    /// restarting its TTL.
    pub fn set(&self, tenant: impl Into<String>, credentials: Credentials) {
        let entry = Entry {
            credentials,
            expires_at: Instant::now() + self.ttl,
        };
        let mut entries = self.entries.write();
        entries.insert(tenant.into(), entry);
        self.metrics.entries.set(entries.len() as i64);
    }

    /// Removes all expired entries, returning the number removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| now < e.expires_at);
        let evicted = before - entries.len();
        self.metrics.entries.set(entries.len() as i64);
        self.metrics.evictions.inc_by(evicted as u64);
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub(crate) fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    /// Sweeps the cache every `period` for as long as the task runs.
    pub async fn sweep_every(self: Arc<Self>, period: Duration) {
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let evicted = self.sweep();
            debug!(evicted, remaining = self.len(), "Swept credential cache");
        }
    }
}

// === impl CacheMetrics ===

impl CacheMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let entries = Gauge::default();
        reg.register(
            "entries",
            "Number of tenants with cached credentials",
            entries.clone(),
        );

        let hits = Counter::default();
        reg.register(
            "hits",
            "Count of validations answered by a matching cache entry",
            hits.clone(),
        );

        let misses = Counter::default();
        reg.register(
            "misses",
            "Count of validations that had to consult the credential store",
            misses.clone(),
        );

        let evictions = Counter::default();
        reg.register(
            "evictions",
            "Count of expired cache entries removed by sweeps",
            evictions.clone(),
        );

        Self {
            entries,
            hits,
            misses,
            evictions,
        }
    }

    pub(crate) fn hit(&self) {
        self.hits.inc();
    }

    pub(crate) fn miss(&self) {
        self.misses.inc();
    }
}

use std::{
    future::Future,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use metrics::counter;
use moka::{sync::Cache, Expiry};
use serde_json::Value;
use tracing::trace;

/// Builds the cache key for a v2 API read from the endpoint path and its
/// already encoded query string.
pub fn api_cache_key(endpoint: &str, query: &str) -> String {
    format!("api:v2:{endpoint}:{query}")
}

/// Storage for JSON responses keyed by string. Implementations own their
/// consistency rules; callers only read and write through this trait.
#[async_trait]
pub trait CacheService: Send + Sync {
    /// Returns the live value for `key`, if any.
    async fn lookup(&self, key: &str) -> Option<Value>;

    /// Stores `value` under `key` for `ttl`.
    async fn store(&self, key: &str, value: Value, ttl: Duration);
}

/// Returns the cached value for `key` or awaits `compute` and caches its
/// `Ok` output. Errors are handed back untouched and never cached.
pub async fn get_or_compute<C, F, Fut, E>(
    cache: &C,
    key: &str,
    ttl: Duration,
    compute: F,
) -> Result<Value, E>
where
    C: CacheService + ?Sized,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Value, E>>,
{
    if let Some(hit) = cache.lookup(key).await {
        counter!("xcp_cache_lookups_total", "result" => "hit").increment(1);
        trace!(key, "cache hit");
        return Ok(hit);
    }
    counter!("xcp_cache_lookups_total", "result" => "miss").increment(1);

    let value = compute().await?;
    cache.store(key, value.clone(), ttl).await;
    Ok(value)
}

#[derive(Debug, Clone)]
struct CachedValue {
    value: Value,
    ttl: Duration,
}

/// Expires every entry after the TTL it was stored with.
struct PerEntryTtl;

impl Expiry<String, CachedValue> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        entry: &CachedValue,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &CachedValue,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// In-process cache backed by `moka`. Expiry is tracked by moka per entry,
/// so each `store` call decides how long its value lives.
#[derive(Debug, Clone)]
pub struct MokaCacheService {
    entries: Cache<String, CachedValue>,
}

impl MokaCacheService {
    pub const DEFAULT_CAPACITY: u64 = 10_000;
    /// Longest lifetime an entry may ask for; larger TTLs are clamped.
    pub const MAX_ENTRY_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: u64) -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(capacity.max(1))
                .expire_after(PerEntryTtl)
                .build(),
        }
    }

    pub fn invalidate(&self, key: &str) {
        self.entries.invalidate(key);
    }

    pub fn invalidate_all(&self) {
        self.entries.invalidate_all();
    }
}

impl Default for MokaCacheService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheService for MokaCacheService {
    async fn lookup(&self, key: &str) -> Option<Value> {
        self.entries.get(key).map(|entry| entry.value)
    }

    async fn store(&self, key: &str, value: Value, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        let ttl = ttl.min(Self::MAX_ENTRY_TTL);
        self.entries
            .insert(key.to_string(), CachedValue { value, ttl });
    }
}

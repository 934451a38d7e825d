//! Feed cache and salt-based invalidation.
//!
//! Cache keys embed the viewer's salt and the global salt. Writers never
//! touch cache entries; they bump a salt and stale entries stop matching.

use std::time::{Duration, Instant};

use anyhow::Result;
use glimpse_db::Database;
use glimpse_db::salts::{GLOBAL_SALT_KEY, user_salt_key};
use moka::Expiry;
use moka::sync::Cache as MokaCache;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::warn;

const MAX_ENTRIES: u64 = 10_000;

pub trait FeedCache: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String, ttl: Duration);

    /// Flush pending eviction work. Called from the sweep loop.
    fn run_pending_tasks(&self) {}
}

/// Monotonic per-key tokens. Keys are `global` or `user:{id}`.
pub trait SaltStore: Send + Sync {
    fn salt(&self, key: &str) -> Result<i64>;
    fn bump(&self, key: &str) -> Result<i64>;
}

impl SaltStore for Database {
    fn salt(&self, key: &str) -> Result<i64> {
        Database::salt(self, key)
    }

    fn bump(&self, key: &str) -> Result<i64> {
        self.bump_salt(key)
    }
}

#[derive(Clone)]
struct CachedPayload {
    body: String,
    ttl: Duration,
}

/// Each entry lives for the TTL it was stored with.
struct PayloadExpiry;

impl Expiry<String, CachedPayload> for PayloadExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CachedPayload,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CachedPayload,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process feed cache. Bounded by entry count; when full, moka's
/// admission policy picks what goes instead of dropping live entries.
pub struct MemoryFeedCache {
    entries: MokaCache<String, CachedPayload>,
}

impl MemoryFeedCache {
    pub fn new() -> Self {
        Self::with_capacity(MAX_ENTRIES)
    }

    pub fn with_capacity(max_entries: u64) -> Self {
        let entries = MokaCache::builder()
            .max_capacity(max_entries)
            .expire_after(PayloadExpiry)
            .build();
        Self { entries }
    }

    /// Approximate until pending tasks have run.
    pub fn entry_count(&self) -> u64 {
        self.entries.entry_count()
    }
}

impl Default for MemoryFeedCache {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedCache for MemoryFeedCache {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|payload| payload.body)
    }

    fn set(&self, key: &str, value: String, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        self.entries
            .insert(key.to_string(), CachedPayload { body: value, ttl });
    }

    fn run_pending_tasks(&self) {
        self.entries.run_pending_tasks();
    }
}

/// Current salts for one viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Salts {
    pub user: i64,
    pub global: i64,
}

impl Salts {
    pub fn load(store: &dyn SaltStore, user_id: i64) -> Result<Self> {
        Ok(Self {
            user: store.salt(&user_salt_key(user_id))?,
            global: store.salt(GLOBAL_SALT_KEY)?,
        })
    }
}

/// Hash `parts` into a fixed-length key under `namespace`.
pub fn cache_key<T: Serialize>(namespace: &str, parts: &T) -> String {
    let encoded = serde_json::to_vec(parts).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(namespace.as_bytes());
    hasher.update(b":");
    hasher.update(&encoded);
    format!("{}:{}", namespace, hex::encode(hasher.finalize()))
}

/// Invalidate every cached answer computed with these users' salts.
pub fn bump_users(store: &dyn SaltStore, user_ids: &[i64]) {
    for &user_id in user_ids {
        if user_id <= 0 {
            continue;
        }
        if let Err(e) = store.bump(&user_salt_key(user_id)) {
            warn!("Failed to bump salt for user {}: {}", user_id, e);
        }
    }
}

/// Invalidate every cached feed.
pub fn bump_global(store: &dyn SaltStore) {
    if let Err(e) = store.bump(GLOBAL_SALT_KEY) {
        warn!("Failed to bump global salt: {}", e);
    }
}

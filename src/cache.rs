//! Response cache
//!
//! Memoizes responses for identical requests within a validity window so
//! repeated calls never touch a backend. The key is a SHA-256 digest over
//! the semantically significant request fields: ordered messages (role and
//! content), the logical model name, and the sampling parameters. Two
//! logically identical requests hash identically regardless of object
//! identity; reordering messages changes the key.
//!
//! The fast tier is an in-process concurrent map with FIFO eviction by
//! insertion order. An optional second tier behind [`CacheStore`] (a redis
//! or disk store would plug in here) is consulted on fast-tier misses and
//! written through on every set.

use crate::config::CacheConfig;
use crate::types::{GenerationOptions, Message, ModelResponse};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// Deterministic digest of a request's significant fields
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Compute the key for a fully-populated request
    pub fn compute(messages: &[Message], model: &str, options: &GenerationOptions) -> Self {
        let mut hasher = Sha256::new();
        // Length-prefix every field so adjacent values cannot collide by
        // concatenation.
        for message in messages {
            let role = message.role.as_str();
            hasher.update((role.len() as u64).to_le_bytes());
            hasher.update(role.as_bytes());
            hasher.update((message.content.len() as u64).to_le_bytes());
            hasher.update(message.content.as_bytes());
        }
        hasher.update((model.len() as u64).to_le_bytes());
        hasher.update(model.as_bytes());
        Self::hash_options(&mut hasher, options);
        CacheKey(hex::encode(hasher.finalize()))
    }

    fn hash_options(hasher: &mut Sha256, options: &GenerationOptions) {
        match options.max_units {
            Some(v) => hasher.update((v as u64 + 1).to_le_bytes()),
            None => hasher.update(0u64.to_le_bytes()),
        }
        hasher.update(options.temperature.map(f32::to_bits).unwrap_or(u32::MAX).to_le_bytes());
        hasher.update(options.top_p.map(f32::to_bits).unwrap_or(u32::MAX).to_le_bytes());
        // Each list section starts with its element count (offset by one for
        // present-but-empty) so sections stay self-delimiting: an absent
        // list, an empty list, and list items spilling into the next section
        // all hash apart.
        match &options.stop {
            Some(stop) => {
                hasher.update((stop.len() as u64 + 1).to_le_bytes());
                for s in stop {
                    hasher.update((s.len() as u64).to_le_bytes());
                    hasher.update(s.as_bytes());
                }
            }
            None => hasher.update(0u64.to_le_bytes()),
        }
        // BTreeMap gives a stable field order for the passthrough params.
        let sorted: std::collections::BTreeMap<_, _> = options.extra.iter().collect();
        hasher.update((sorted.len() as u64).to_le_bytes());
        for (k, v) in sorted {
            hasher.update((k.len() as u64).to_le_bytes());
            hasher.update(k.as_bytes());
            let rendered = v.to_string();
            hasher.update((rendered.len() as u64).to_le_bytes());
            hasher.update(rendered.as_bytes());
        }
    }

    /// Hex rendering of the digest
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Optional durable second tier
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch a response if the store holds an unexpired entry
    async fn get(&self, key: &CacheKey) -> Option<ModelResponse>;
    /// Store a response with the given validity window
    async fn set(&self, key: &CacheKey, response: &ModelResponse, ttl: Duration);
}

#[derive(Debug, Clone)]
struct CacheEntry {
    response: ModelResponse,
    inserted_at: Instant,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        Instant::now() > self.expires_at
    }
}

/// Hit/miss/eviction counters, snapshot-readable
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

#[derive(Debug, Default)]
struct AtomicCacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

/// Two-tier request/response memoization
pub struct ResponseCache {
    entries: DashMap<CacheKey, CacheEntry>,
    // FIFO insertion log; eviction pops the oldest-inserted key.
    insertion_order: Mutex<VecDeque<CacheKey>>,
    config: CacheConfig,
    store: Option<Arc<dyn CacheStore>>,
    stats: AtomicCacheStats,
}

impl ResponseCache {
    /// Create a cache with no external tier
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            insertion_order: Mutex::new(VecDeque::new()),
            config,
            store: None,
            stats: AtomicCacheStats::default(),
        }
    }

    /// Attach a durable second tier
    pub fn with_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Look up a response; fast tier first, then the external store
    pub async fn get(&self, key: &CacheKey) -> Option<ModelResponse> {
        if !self.config.enabled {
            return None;
        }

        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired() {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key.as_str(), age_ms = entry.inserted_at.elapsed().as_millis() as u64, "cache hit");
                return Some(entry.response.clone());
            }
            drop(entry);
            self.entries.remove(key);
            // The key leaves the insertion log with its entry; a stale log
            // slot would otherwise count against an unrelated newer insert
            // when this key is set again.
            self.insertion_order.lock().retain(|k| k != key);
        }

        if let Some(store) = &self.store {
            if let Some(response) = store.get(key).await {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key.as_str(), "external store hit, promoting");
                self.insert_local(key.clone(), response.clone());
                return Some(response);
            }
        }

        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store a response in both tiers
    pub async fn set(&self, key: CacheKey, response: ModelResponse) {
        if !self.config.enabled {
            return;
        }
        if let Some(store) = &self.store {
            store.set(&key, &response, self.config.ttl).await;
        }
        self.insert_local(key, response);
    }

    fn insert_local(&self, key: CacheKey, response: ModelResponse) {
        let now = Instant::now();
        let entry = CacheEntry {
            response,
            inserted_at: now,
            expires_at: now + self.config.ttl,
        };
        // The whole entry lands in the map in one insert, so a concurrent
        // get never observes a partially-written value.
        let replaced = self.entries.insert(key.clone(), entry).is_some();

        let mut order = self.insertion_order.lock();
        if !replaced {
            order.push_back(key);
        }
        while self.entries.len() > self.config.max_entries {
            match order.pop_front() {
                Some(oldest) => {
                    if self.entries.remove(&oldest).is_some() {
                        self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                        debug!(key = %oldest.as_str(), "evicted oldest cache entry");
                    }
                }
                None => break,
            }
        }
    }

    /// Number of live fast-tier entries, expired ones included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the fast tier is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Counter snapshot
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            evictions: self.stats.evictions.load(Ordering::Relaxed),
        }
    }

    /// Drop every entry in the fast tier
    pub fn clear(&self) {
        self.entries.clear();
        self.insertion_order.lock().clear();
    }
}

//! AggregateCache - Generation-Stamped Query Memoization
//!
//! ## Responsibilities
//!
//! - Memoize derived read queries (count, recent history) per parameter
//! - Invalidate every entry at once when a write completes
//! - Bound memory with per-kind LRU eviction
//!
//! Staleness is tracked with a generation counter instead of explicit
//! entry removal: each entry is stamped with the generation observed
//! before its compute started, and an entry is served only while its
//! stamp matches the current generation. A write that lands mid-compute
//! therefore leaves the freshly stored entry already stale, so the next
//! read recomputes; a stale value is never served after invalidation.

use crate::detection_store::DetectionRecord;
use crate::error::Result;
use lru::LruCache;
use std::collections::HashMap;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

/// Kinds of memoized aggregate queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Count,
    RecentHistory,
}

/// Memoized query result
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateValue {
    Count(u64),
    History(Vec<DetectionRecord>),
}

struct CacheEntry {
    generation: u64,
    value: AggregateValue,
}

/// Cache hit/miss counters
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// AggregateCache service
pub struct AggregateCache {
    /// Bumped on every completed write
    generation: AtomicU64,
    /// Per-kind LRU over query parameters
    shards: Mutex<HashMap<QueryKind, LruCache<u64, CacheEntry>>>,
    per_kind_capacity: NonZeroUsize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl AggregateCache {
    /// Create a cache holding up to `per_kind_capacity` parameterizations
    /// per query kind
    pub fn new(per_kind_capacity: usize) -> Self {
        Self {
            generation: AtomicU64::new(0),
            shards: Mutex::new(HashMap::new()),
            per_kind_capacity: NonZeroUsize::new(per_kind_capacity.max(1))
                .unwrap_or(NonZeroUsize::MIN),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Current generation counter
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Invalidate every cached entry.
    ///
    /// Must be called after each completed write, before the writer
    /// reports success, so no later read can observe pre-write values.
    pub fn invalidate_all(&self) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::trace!(generation = generation, "Aggregate cache invalidated");
    }

    /// Return the memoized value for (kind, param), or run `compute`
    /// and memoize its result.
    ///
    /// The generation stamp is taken before `compute` starts.
    pub async fn get_or_compute<F, Fut>(
        &self,
        kind: QueryKind,
        param: u64,
        compute: F,
    ) -> Result<AggregateValue>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AggregateValue>>,
    {
        let generation = self.generation.load(Ordering::SeqCst);

        {
            let mut shards = self.shards.lock().await;
            if let Some(shard) = shards.get_mut(&kind) {
                if let Some(entry) = shard.get(&param) {
                    if entry.generation == generation {
                        self.hits.fetch_add(1, Ordering::Relaxed);
                        return Ok(entry.value.clone());
                    }
                }
            }
        }

        // Miss or stale: recompute without holding the shard lock so
        // concurrent readers of other keys are not serialized behind
        // this query.
        self.misses.fetch_add(1, Ordering::Relaxed);
        let value = compute().await?;

        let mut shards = self.shards.lock().await;
        let shard = shards
            .entry(kind)
            .or_insert_with(|| LruCache::new(self.per_kind_capacity));
        // A racing reader may have stored a fresher result already;
        // keep whichever carries the newer stamp.
        let newer_present = match shard.peek(&param) {
            Some(existing) => existing.generation > generation,
            None => false,
        };
        if !newer_present {
            shard.put(
                param,
                CacheEntry {
                    generation,
                    value: value.clone(),
                },
            );
        }

        Ok(value)
    }

    /// Hit/miss counters
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

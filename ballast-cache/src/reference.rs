//! Read-through cache for slowly changing reference data.
//!
//! Three key-spaces, each with its own TTL:
//!
//! - `parents`: a single slot holding the full parent list
//! - `subjects`: a single slot holding the full subject list
//! - `characteristics`: one slot per subject id, bounded by
//!   `max_characteristics`
//!
//! A read returns the cached value while `now < expires_at`; otherwise it calls
//! the [`ReferenceFetcher`], stores the result with `expires_at = now + ttl`
//! and returns it. Fetch errors are handed back unchanged and leave the slot as
//! it was. Locks guard only the slot swap and are never held across a fetch, so
//! two concurrent misses on the same key may both fetch; the last store wins.

use async_trait::async_trait;
use ballast_core::{deadline_after, BallastResult, Clock, Context, SystemClock};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use crate::bounded::{BoundedTtlMap, InsertOutcome};
use crate::config::CacheConfig;
use crate::entry::{CacheEntry, TtlSlot};
use crate::stats::{CacheCounters, CacheStats};

/// Upstream source of reference data.
///
/// Implementations should observe `ctx` and return a cancellation error
/// promptly when it fires. The cache does not retry.
#[async_trait]
pub trait ReferenceFetcher: Send + Sync + 'static {
    type Parent: Send + Sync + 'static;
    type Subject: Send + Sync + 'static;
    type Characteristic: Send + Sync + 'static;

    /// Fetch the complete parent list.
    async fn fetch_parents(&self, ctx: &Context) -> BallastResult<Vec<Self::Parent>>;

    /// Fetch the complete subject list.
    async fn fetch_subjects(&self, ctx: &Context) -> BallastResult<Vec<Self::Subject>>;

    /// Fetch the characteristics of one subject.
    async fn fetch_characteristics(
        &self,
        ctx: &Context,
        subject_id: &str,
    ) -> BallastResult<Vec<Self::Characteristic>>;
}

#[async_trait]
impl<F: ReferenceFetcher> ReferenceFetcher for Arc<F> {
    type Parent = F::Parent;
    type Subject = F::Subject;
    type Characteristic = F::Characteristic;

    async fn fetch_parents(&self, ctx: &Context) -> BallastResult<Vec<Self::Parent>> {
        (**self).fetch_parents(ctx).await
    }

    async fn fetch_subjects(&self, ctx: &Context) -> BallastResult<Vec<Self::Subject>> {
        (**self).fetch_subjects(ctx).await
    }

    async fn fetch_characteristics(
        &self,
        ctx: &Context,
        subject_id: &str,
    ) -> BallastResult<Vec<Self::Characteristic>> {
        (**self).fetch_characteristics(ctx, subject_id).await
    }
}

/// The independent namespaces of the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeySpace {
    Parents,
    Subjects,
    Characteristics,
}

impl KeySpace {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeySpace::Parents => "parents",
            KeySpace::Subjects => "subjects",
            KeySpace::Characteristics => "characteristics",
        }
    }
}

impl fmt::Display for KeySpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entries removed by one expiry sweep, per key-space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub parents: usize,
    pub subjects: usize,
    pub characteristics: usize,
}

impl CleanupReport {
    pub fn total(&self) -> usize {
        self.parents + self.subjects + self.characteristics
    }
}

/// TTL cache over a [`ReferenceFetcher`].
pub struct ReferenceCache<F: ReferenceFetcher> {
    fetcher: F,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    parents: TtlSlot<Vec<F::Parent>>,
    subjects: TtlSlot<Vec<F::Subject>>,
    characteristics: RwLock<BoundedTtlMap<String, Vec<F::Characteristic>>>,
    counters: CacheCounters,
}

impl<F: ReferenceFetcher> ReferenceCache<F> {
    /// Create a cache reading the wall clock.
    pub fn new(fetcher: F, config: CacheConfig) -> Self {
        Self::with_clock(fetcher, config, Arc::new(SystemClock))
    }

    /// Create a cache with an injected time source.
    pub fn with_clock(fetcher: F, config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        let capacity = config.max_characteristics;
        Self {
            fetcher,
            config,
            clock,
            parents: TtlSlot::new(),
            subjects: TtlSlot::new(),
            characteristics: RwLock::new(BoundedTtlMap::new(capacity)),
            counters: CacheCounters::default(),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// The parent list, fetched on a miss.
    pub async fn get_parents(&self, ctx: &Context) -> BallastResult<Arc<Vec<F::Parent>>> {
        self.get_single(
            &self.parents,
            KeySpace::Parents,
            self.config.parents_ttl,
            self.fetcher.fetch_parents(ctx),
        )
        .await
    }

    /// The subject list, fetched on a miss.
    pub async fn get_subjects(&self, ctx: &Context) -> BallastResult<Arc<Vec<F::Subject>>> {
        self.get_single(
            &self.subjects,
            KeySpace::Subjects,
            self.config.subjects_ttl,
            self.fetcher.fetch_subjects(ctx),
        )
        .await
    }

    /// Characteristics of `subject_id`, fetched on a miss.
    ///
    /// Storing a new subject into a full key-space evicts the subject whose
    /// entry expires first.
    pub async fn get_characteristics(
        &self,
        ctx: &Context,
        subject_id: &str,
    ) -> BallastResult<Arc<Vec<F::Characteristic>>> {
        let key = subject_id.to_string();
        let now = self.clock.now();
        let cached = self
            .characteristics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key, now)
            .map(CacheEntry::value);
        if let Some(value) = cached {
            self.counters.hit();
            tracing::trace!(key_space = "characteristics", subject_id, "Cache hit");
            return Ok(value);
        }

        self.counters.miss();
        tracing::trace!(key_space = "characteristics", subject_id, "Cache miss");

        let fetched = self
            .fetcher
            .fetch_characteristics(ctx, subject_id)
            .await
            .map_err(|e| {
                self.counters.fetch_error();
                tracing::warn!(
                    key_space = "characteristics",
                    subject_id,
                    error = %e,
                    "Reference fetch failed"
                );
                e
            })?;

        let entry = CacheEntry::new(
            fetched,
            deadline_after(self.clock.now(), self.config.characteristics_ttl),
        );
        let value = entry.value();
        let outcome = self
            .characteristics
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, entry);
        if let InsertOutcome::Evicted(evicted) = outcome {
            self.counters.eviction();
            tracing::debug!(
                key_space = "characteristics",
                evicted = %evicted,
                inserted = subject_id,
                "Evicted earliest-expiring subject"
            );
        }
        Ok(value)
    }

    async fn get_single<T, Fut>(
        &self,
        slot: &TtlSlot<Vec<T>>,
        key_space: KeySpace,
        ttl: Duration,
        fetch: Fut,
    ) -> BallastResult<Arc<Vec<T>>>
    where
        Fut: Future<Output = BallastResult<Vec<T>>>,
    {
        if let Some(value) = slot.get(self.clock.now()) {
            self.counters.hit();
            tracing::trace!(key_space = %key_space, "Cache hit");
            return Ok(value);
        }

        self.counters.miss();
        tracing::trace!(key_space = %key_space, "Cache miss");

        let fetched = fetch.await.map_err(|e| {
            self.counters.fetch_error();
            tracing::warn!(key_space = %key_space, error = %e, "Reference fetch failed");
            e
        })?;

        let entry = CacheEntry::new(fetched, deadline_after(self.clock.now(), ttl));
        let value = entry.value();
        slot.store(entry);
        Ok(value)
    }

    /// Drop every entry in every key-space.
    pub fn invalidate(&self) {
        self.parents.clear();
        self.subjects.clear();
        let removed = self
            .characteristics
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        tracing::debug!(characteristics = removed, "Reference cache invalidated");
    }

    /// Drop one subject's characteristics, returning whether it was cached.
    pub fn invalidate_subject(&self, subject_id: &str) -> bool {
        self.characteristics
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&subject_id.to_string())
    }

    /// Remove every entry with `expires_at <= now`.
    pub fn cleanup_expired(&self) -> CleanupReport {
        let now = self.clock.now();
        CleanupReport {
            parents: usize::from(self.parents.remove_expired(now)),
            subjects: usize::from(self.subjects.remove_expired(now)),
            characteristics: self
                .characteristics
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .remove_expired(now),
        }
    }

    /// Number of subjects with cached characteristics, valid or not.
    pub fn characteristics_len(&self) -> usize {
        self.characteristics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether `subject_id` currently has a slot, valid or not.
    pub fn contains_subject(&self, subject_id: &str) -> bool {
        self.characteristics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&subject_id.to_string())
    }

    pub fn stats(&self) -> CacheStats {
        let entry_count = usize::from(self.parents.is_occupied())
            + usize::from(self.subjects.is_occupied())
            + self.characteristics_len();
        self.counters.snapshot(entry_count as u64)
    }
}

impl<F: ReferenceFetcher> fmt::Debug for ReferenceCache<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceCache")
            .field("config", &self.config)
            .field("clock", &self.clock)
            .field("stats", &self.stats())
            .finish()
    }
}

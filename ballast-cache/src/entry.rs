//! Cached values with an absolute expiry.

use ballast_core::Timestamp;
use std::sync::{Arc, PoisonError, RwLock};

/// An immutable cached value plus the instant it stops being valid.
///
/// Entries are never mutated in place; a refresh replaces the whole entry.
#[derive(Debug)]
pub struct CacheEntry<T> {
    value: Arc<T>,
    expires_at: Timestamp,
}

impl<T> CacheEntry<T> {
    pub fn new(value: T, expires_at: Timestamp) -> Self {
        Self {
            value: Arc::new(value),
            expires_at,
        }
    }

    /// Shared handle to the cached value.
    pub fn value(&self) -> Arc<T> {
        Arc::clone(&self.value)
    }

    pub fn expires_at(&self) -> Timestamp {
        self.expires_at
    }

    /// Valid strictly before `expires_at`; an entry expiring at `now` is gone.
    pub fn is_valid_at(&self, now: Timestamp) -> bool {
        now < self.expires_at
    }
}

impl<T> Clone for CacheEntry<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            expires_at: self.expires_at,
        }
    }
}

/// A key-space holding at most one entry.
///
/// The lock only guards the swap of the entry; it is never held while a
/// value is being fetched.
#[derive(Debug)]
pub struct TtlSlot<T> {
    entry: RwLock<Option<CacheEntry<T>>>,
}

impl<T> Default for TtlSlot<T> {
    fn default() -> Self {
        Self {
            entry: RwLock::new(None),
        }
    }
}

impl<T> TtlSlot<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The value if present and still valid at `now`.
    pub fn get(&self, now: Timestamp) -> Option<Arc<T>> {
        let guard = self.entry.read().unwrap_or_else(PoisonError::into_inner);
        guard
            .as_ref()
            .filter(|entry| entry.is_valid_at(now))
            .map(CacheEntry::value)
    }

    /// Replace whatever is stored; last writer wins.
    pub fn store(&self, entry: CacheEntry<T>) {
        let mut guard = self.entry.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Some(entry);
    }

    /// Drop the entry, returning whether one was present.
    pub fn clear(&self) -> bool {
        let mut guard = self.entry.write().unwrap_or_else(PoisonError::into_inner);
        guard.take().is_some()
    }

    /// Drop the entry if it has expired at `now`.
    pub fn remove_expired(&self, now: Timestamp) -> bool {
        let mut guard = self.entry.write().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(entry) if !entry.is_valid_at(now) => {
                *guard = None;
                true
            }
            _ => false,
        }
    }

    /// Whether an entry (valid or not) is currently held.
    pub fn is_occupied(&self) -> bool {
        self.entry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

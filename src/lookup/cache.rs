// src/lookup/cache.rs
//! Version lookup caching
//!
//! Registry round-trips dominate resolution time when many packages are
//! unconstrained, and every attempt of the resolution loop asks again. The
//! cache is process-wide, read-mostly, and first-writer-wins so racing
//! workers converge on one answer. Losing it only costs another lookup.

use super::VersionLookup;
use crate::claim::PackageIdentity;
use crate::error::Result;
use crate::version::PackageVersion;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::debug;

/// Maximum number of cached packages
const DEFAULT_MAX_ENTRIES: usize = 1000;

/// Default TTL for cache entries (1 hour)
const DEFAULT_TTL_SECS: u64 = 3600;

#[derive(Clone)]
struct CacheEntry {
    versions: Vec<PackageVersion>,
    created_at: Instant,
    last_used: Instant,
}

impl CacheEntry {
    fn new(versions: Vec<PackageVersion>) -> Self {
        let now = Instant::now();
        Self {
            versions,
            created_at: now,
            last_used: now,
        }
    }
}

/// Thread-safe map from package identity to published versions
///
/// Bounded: expired entries are dropped on insert, then the least recently
/// used one when still full. Clones share storage.
#[derive(Clone)]
pub struct VersionCache {
    entries: Arc<RwLock<HashMap<PackageIdentity, CacheEntry>>>,
    max_entries: usize,
    ttl: Duration,
}

impl Default for VersionCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES, Duration::from_secs(DEFAULT_TTL_SECS))
    }
}

impl VersionCache {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            max_entries: max_entries.max(1),
            ttl,
        }
    }

    /// Get cached versions, ignoring expired entries
    pub fn get(&self, identity: &PackageIdentity) -> Option<Vec<PackageVersion>> {
        let mut entries = self.entries.write().ok()?;
        let entry = entries.get_mut(identity)?;
        if entry.created_at.elapsed() > self.ttl {
            entries.remove(identity);
            return None;
        }
        entry.last_used = Instant::now();
        Some(entry.versions.clone())
    }

    /// Store versions unless a live entry already exists
    ///
    /// Returns the value that ends up cached, which is the earlier writer's
    /// value when two workers race.
    pub fn put(&self, identity: PackageIdentity, versions: Vec<PackageVersion>) -> Vec<PackageVersion> {
        let Ok(mut entries) = self.entries.write() else {
            return versions;
        };

        if let Some(entry) = entries.get_mut(&identity) {
            if entry.created_at.elapsed() <= self.ttl {
                entry.last_used = Instant::now();
                return entry.versions.clone();
            }
            *entry = CacheEntry::new(versions.clone());
            return versions;
        }

        if entries.len() >= self.max_entries {
            let ttl = self.ttl;
            entries.retain(|_, entry| entry.created_at.elapsed() <= ttl);
        }
        if entries.len() >= self.max_entries {
            Self::evict_lru(&mut entries);
        }
        entries.insert(identity, CacheEntry::new(versions.clone()));
        versions
    }

    fn evict_lru(entries: &mut HashMap<PackageIdentity, CacheEntry>) {
        if let Some(key) = entries
            .iter()
            .min_by_key(|(_, e)| e.last_used)
            .map(|(k, _)| k.clone())
        {
            debug!("Version cache full; evicting {}", key);
            entries.remove(&key);
        }
    }
}

/// Global version cache instance
static GLOBAL_CACHE: std::sync::LazyLock<VersionCache> =
    std::sync::LazyLock::new(VersionCache::default);

/// Get the global version cache
pub fn global_cache() -> &'static VersionCache {
    &GLOBAL_CACHE
}

/// Lookup decorator that consults a [`VersionCache`] first
///
/// Only successful answers are cached; "unavailable" is asked again next
/// time in case the registry came back.
pub struct CachedLookup<L> {
    inner: L,
    cache: VersionCache,
}

impl<L: VersionLookup> CachedLookup<L> {
    /// Wrap a lookup with the process-wide cache
    pub fn new(inner: L) -> Self {
        Self::with_cache(inner, global_cache().clone())
    }

    pub fn with_cache(inner: L, cache: VersionCache) -> Self {
        Self { inner, cache }
    }
}

impl<L: VersionLookup> VersionLookup for CachedLookup<L> {
    fn versions(&self, identity: &PackageIdentity) -> Result<Option<Vec<PackageVersion>>> {
        if let Some(hit) = self.cache.get(identity) {
            debug!("Version cache hit for {}", identity);
            return Ok(Some(hit));
        }
        match self.inner.versions(identity)? {
            Some(versions) => Ok(Some(self.cache.put(identity.clone(), versions))),
            None => Ok(None),
        }
    }
}

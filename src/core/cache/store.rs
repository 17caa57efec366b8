//! Similarity Cache
//!
//! TTL'd key-value store with a fuzzy-match fallback: an exact lookup miss
//! scans alive entries and accepts the best similarity match at or above the
//! threshold. Backed by an optional per-entry file store. Readers proceed in
//! parallel; writes and sweeps serialize on the write half of the lock. An
//! in-flight map gives single-flight semantics so concurrent work on one key
//! collapses into a single fetch.

use std::collections::hash_map::Entry as MapEntry;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, RwLock};
use tracing::debug;

use super::disk::DiskStore;
use super::key::{similarity, SIMILARITY_THRESHOLD};

fn now_epoch_s() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

// ============================================================================
// Entries and Provenance
// ============================================================================

/// How a cache value was produced or matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheProvenance {
    /// Exact key match.
    DirectHit,
    /// Fuzzy match through the similarity scan.
    SimilarityHit,
    /// Value computed fresh on a miss.
    Fresh,
    /// Fresh value overwriting an expired entry.
    StaleRefresh,
}

/// One stored entry; this struct is also the on-disk JSON shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<V> {
    pub key: String,
    pub value: V,
    pub created_at_epoch_s: u64,
    pub ttl_s: u64,
    pub provenance: CacheProvenance,
}

impl<V> CacheEntry<V> {
    pub fn is_expired_at(&self, now_epoch_s: u64) -> bool {
        now_epoch_s > self.created_at_epoch_s + self.ttl_s
    }
}

/// A successful lookup.
#[derive(Debug, Clone)]
pub struct CacheHit<V> {
    pub value: V,
    pub provenance: CacheProvenance,
}

/// Counters for monitoring cache effectiveness.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub similarity_hits: u64,
    pub stale_refreshes: u64,
    pub sweeps: u64,
    pub entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// ============================================================================
// SimilarityCache
// ============================================================================

/// TTL'd cache with similarity fallback and single-flight computation.
pub struct SimilarityCache<V> {
    name: &'static str,
    ttl: Duration,
    /// Similarity fallback toggle; off for caches keyed by URL, where fuzzy
    /// key matches would alias distinct resources.
    fuzzy: bool,
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
    inflight: StdMutex<HashMap<String, Arc<Notify>>>,
    disk: Option<DiskStore>,
    stats: RwLock<CacheStats>,
}

impl<V> SimilarityCache<V>
where
    V: Clone + Serialize + DeserializeOwned + Send + Sync,
{
    pub fn new(name: &'static str, ttl: Duration, disk: Option<DiskStore>) -> Self {
        Self {
            name,
            ttl,
            fuzzy: true,
            entries: RwLock::new(HashMap::new()),
            inflight: StdMutex::new(HashMap::new()),
            disk,
            stats: RwLock::new(CacheStats::default()),
        }
    }

    /// Cache with exact matching only (no similarity fallback).
    pub fn exact(name: &'static str, ttl: Duration, disk: Option<DiskStore>) -> Self {
        Self {
            fuzzy: false,
            ..Self::new(name, ttl, disk)
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Entries quarantined as corrupt by the backing file store. The
    /// orchestrator samples this across each request to report corruption
    /// on the request that observed it.
    pub fn corrupt_count(&self) -> u64 {
        self.disk.as_ref().map_or(0, DiskStore::quarantined_count)
    }

    /// Exact lookup, then disk, then similarity scan over alive entries.
    pub async fn get(&self, key: &str) -> Option<CacheHit<V>> {
        let now = now_epoch_s();

        {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(key) {
                if !entry.is_expired_at(now) {
                    self.record_hit(CacheProvenance::DirectHit).await;
                    return Some(CacheHit {
                        value: entry.value.clone(),
                        provenance: CacheProvenance::DirectHit,
                    });
                }
            }
        }

        if let Some(disk) = &self.disk {
            if let Some(entry) = disk.load::<CacheEntry<V>>(key) {
                if !entry.is_expired_at(now) && entry.key == key {
                    // Hydrate memory so the similarity scan sees it later.
                    self.entries
                        .write()
                        .await
                        .insert(key.to_string(), entry.clone());
                    self.record_hit(CacheProvenance::DirectHit).await;
                    return Some(CacheHit {
                        value: entry.value,
                        provenance: CacheProvenance::DirectHit,
                    });
                }
            }
        }

        // Similarity fallback: best alive entry at or above the threshold.
        if self.fuzzy {
            let entries = self.entries.read().await;
            let mut best: Option<(f64, &CacheEntry<V>)> = None;
            for entry in entries.values() {
                if entry.is_expired_at(now) {
                    continue;
                }
                let score = similarity(key, &entry.key);
                if score >= SIMILARITY_THRESHOLD
                    && best.map_or(true, |(best_score, _)| score > best_score)
                {
                    best = Some((score, entry));
                }
            }
            if let Some((score, entry)) = best {
                debug!(cache = self.name, key, matched = %entry.key, score, "similarity hit");
                let hit = CacheHit {
                    value: entry.value.clone(),
                    provenance: CacheProvenance::SimilarityHit,
                };
                drop(entries);
                self.record_hit(CacheProvenance::SimilarityHit).await;
                return Some(hit);
            }
        }

        let mut stats = self.stats.write().await;
        stats.misses += 1;
        None
    }

    /// Insert or overwrite. Overwriting an expired entry is recorded as a
    /// stale refresh.
    pub async fn put(&self, key: &str, value: V) {
        let now = now_epoch_s();
        let mut entries = self.entries.write().await;
        let provenance = match entries.get(key) {
            Some(old) if old.is_expired_at(now) => CacheProvenance::StaleRefresh,
            _ => CacheProvenance::Fresh,
        };
        let entry = CacheEntry {
            key: key.to_string(),
            value,
            created_at_epoch_s: now,
            ttl_s: self.ttl.as_secs(),
            provenance,
        };
        if let Some(disk) = &self.disk {
            if let Err(e) = disk.store(key, &entry) {
                tracing::warn!(cache = self.name, key, error = %e, "cache persist failed");
            }
        }
        entries.insert(key.to_string(), entry);
        let len = entries.len();
        drop(entries);

        let mut stats = self.stats.write().await;
        stats.entries = len;
        if provenance == CacheProvenance::StaleRefresh {
            stats.stale_refreshes += 1;
        }
    }

    /// Drop expired entries from memory and disk.
    pub async fn sweep(&self) {
        let now = now_epoch_s();
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| !entry.is_expired_at(now));
        let len = entries.len();
        drop(entries);

        if let Some(disk) = &self.disk {
            disk.sweep(now);
        }

        let mut stats = self.stats.write().await;
        stats.entries = len;
        stats.sweeps += 1;
    }

    pub async fn stats(&self) -> CacheStats {
        self.stats.read().await.clone()
    }

    /// Single-flight get-or-fetch. Concurrent callers for the same key
    /// collapse onto one fetch; followers wait and read the leader's result
    /// from the cache. With `force_refresh` the lookup is bypassed but the
    /// fetched value still populates the cache.
    pub async fn get_or_compute<E, F, Fut>(
        &self,
        key: &str,
        force_refresh: bool,
        fetch: F,
    ) -> Result<(V, CacheProvenance), E>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if !force_refresh {
            if let Some(hit) = self.get(key).await {
                return Ok((hit.value, hit.provenance));
            }
        }

        loop {
            let follower = {
                let mut inflight = match self.inflight.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                match inflight.entry(key.to_string()) {
                    MapEntry::Occupied(occupied) => Some(occupied.get().clone()),
                    MapEntry::Vacant(vacant) => {
                        vacant.insert(Arc::new(Notify::new()));
                        None
                    }
                }
            };

            match follower {
                Some(notify) => {
                    let notified = notify.notified();
                    tokio::pin!(notified);
                    notified.as_mut().enable();
                    // The leader may have finished between the map check and
                    // the waiter registration; re-check before sleeping.
                    if !force_refresh {
                        if let Some(hit) = self.get(key).await {
                            return Ok((hit.value, hit.provenance));
                        }
                    }
                    notified.await;
                    if !force_refresh {
                        if let Some(hit) = self.get(key).await {
                            return Ok((hit.value, hit.provenance));
                        }
                    }
                    // Leader failed (or refresh forced): contend for the
                    // leader slot on the next iteration.
                }
                None => {
                    let _guard = FlightGuard {
                        map: &self.inflight,
                        key: key.to_string(),
                    };
                    let result = fetch().await;
                    if let Ok(value) = &result {
                        self.put(key, value.clone()).await;
                    }
                    return result.map(|value| (value, CacheProvenance::Fresh));
                }
            }
        }
    }

    async fn record_hit(&self, provenance: CacheProvenance) {
        let mut stats = self.stats.write().await;
        stats.hits += 1;
        if provenance == CacheProvenance::SimilarityHit {
            stats.similarity_hits += 1;
        }
    }
}

/// Removes the in-flight marker and wakes followers even when the leader's
/// future is dropped mid-fetch (request cancellation).
struct FlightGuard<'a> {
    map: &'a StdMutex<HashMap<String, Arc<Notify>>>,
    key: String,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        let notify = match self.map.lock() {
            Ok(mut guard) => guard.remove(&self.key),
            Err(poisoned) => poisoned.into_inner().remove(&self.key),
        };
        if let Some(notify) = notify {
            notify.notify_waiters();
        }
    }
}

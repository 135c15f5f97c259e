//! Local Analysis Result Cache
//!
//! Node-local cache of completed analysis results, keyed by
//! (customer, fingerprint). Supports:
//! - LRU eviction based on entry count and memory limits
//! - TTL-based expiration for freshness
//! - Per-project invalidation through a reverse index
//!
//! Lookups only take the read lock; the access time used for LRU ordering is
//! an atomic on the entry.

use crate::analysis::{AnalysisResult, Fingerprint};
use crate::types::{CustomerId, ProjectId};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

// ============================================================================
// Cache Configuration
// ============================================================================

/// Configuration for result caching
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum cache size in bytes (default: 256 MB)
    pub max_size_bytes: usize,

    /// Maximum number of cached entries (default: 10,000)
    pub max_entries: usize,

    /// Default TTL for cache entries (default: 10 minutes)
    pub default_ttl: Duration,

    /// Enable cache (default: true)
    pub enabled: bool,

    /// Maximum size per entry in bytes (default: 32 MB)
    pub max_entry_size_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: 256 * 1024 * 1024,
            max_entries: 10_000,
            default_ttl: Duration::from_secs(600),
            enabled: true,
            max_entry_size_bytes: 32 * 1024 * 1024,
        }
    }
}

impl CacheConfig {
    /// Set maximum total size in bytes
    pub fn with_max_size(mut self, bytes: usize) -> Self {
        self.max_size_bytes = bytes;
        self
    }

    /// Set maximum entries
    pub fn with_max_entries(mut self, entries: usize) -> Self {
        self.max_entries = entries;
        self
    }

    /// Set default TTL
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Disable caching
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Set maximum entry size in bytes
    pub fn with_max_entry_size(mut self, bytes: usize) -> Self {
        self.max_entry_size_bytes = bytes;
        self
    }
}

// ============================================================================
// Cache Key
// ============================================================================

/// Tenant-scoped fingerprint
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Owning tenant
    pub customer: CustomerId,
    /// Request fingerprint
    pub fingerprint: Fingerprint,
}

impl CacheKey {
    /// Create a key
    pub fn new(customer: CustomerId, fingerprint: Fingerprint) -> Self {
        Self {
            customer,
            fingerprint,
        }
    }
}

// ============================================================================
// Cache Entry
// ============================================================================

struct CacheEntry {
    result: Arc<AnalysisResult>,
    project: ProjectId,
    created_at: Instant,
    ttl: Duration,
    size_bytes: usize,
    /// Nanoseconds since the cache epoch
    last_accessed: AtomicU64,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.created_at.elapsed() > self.ttl
    }
}

// ============================================================================
// Analysis Cache
// ============================================================================

/// LRU cache of analysis results with per-project invalidation
pub struct AnalysisCache {
    config: CacheConfig,

    entries: RwLock<HashMap<CacheKey, Arc<CacheEntry>>>,

    /// Reverse index: (customer, project) -> keys computed on that project
    project_index: RwLock<HashMap<(CustomerId, ProjectId), HashSet<CacheKey>>>,

    current_size: AtomicU64,

    epoch: Instant,

    stats: CacheStats,
}

/// Cache statistics
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Total cache hits
    pub hits: AtomicU64,

    /// Total cache misses
    pub misses: AtomicU64,

    /// Total evictions
    pub evictions: AtomicU64,

    /// Total invalidations triggered
    pub invalidations: AtomicU64,
}

impl AnalysisCache {
    /// Create a new cache
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
            project_index: RwLock::new(HashMap::new()),
            current_size: AtomicU64::new(0),
            epoch: Instant::now(),
            stats: CacheStats::default(),
        }
    }

    fn now_nanos(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    /// Cached result for a key, if present and fresh
    pub fn get(&self, key: &CacheKey) -> Option<Arc<AnalysisResult>> {
        if !self.config.enabled {
            return None;
        }

        let expired = {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(entry) if !entry.is_expired() => {
                    entry.last_accessed.store(self.now_nanos(), Ordering::Relaxed);
                    self.stats.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.result.clone());
                }
                Some(_) => true,
                None => false,
            }
        };

        if expired {
            let mut entries = self.entries.write();
            if entries.get(key).is_some_and(|entry| entry.is_expired()) {
                self.detach(&mut entries, key);
            }
        }
        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Cache a result with the default TTL
    pub fn put(&self, key: CacheKey, project: ProjectId, result: Arc<AnalysisResult>) {
        self.put_with_ttl(key, project, result, self.config.default_ttl)
    }

    /// Cache a result with a custom TTL
    ///
    /// Entries larger than `max_entry_size_bytes` are not cached.
    pub fn put_with_ttl(
        &self,
        key: CacheKey,
        project: ProjectId,
        result: Arc<AnalysisResult>,
        ttl: Duration,
    ) {
        if !self.config.enabled {
            return;
        }

        let size_bytes = result.estimate_size();
        if size_bytes > self.config.max_entry_size_bytes || size_bytes > self.config.max_size_bytes {
            return;
        }

        self.evict_if_needed(size_bytes);

        let entry = Arc::new(CacheEntry {
            result,
            project: project.clone(),
            created_at: Instant::now(),
            ttl,
            size_bytes,
            last_accessed: AtomicU64::new(self.now_nanos()),
        });

        // Lock order: entries, then project_index
        let mut entries = self.entries.write();
        if let Some(replaced) = entries.insert(key.clone(), entry) {
            self.release(&key, &replaced);
        }
        self.current_size
            .fetch_add(size_bytes as u64, Ordering::Relaxed);
        self.project_index
            .write()
            .entry((key.customer.clone(), project))
            .or_default()
            .insert(key);
    }

    /// Remove one entry
    pub fn invalidate(&self, key: &CacheKey) {
        self.remove_key(key, true);
    }

    /// Remove every entry computed on a project; returns how many were removed
    pub fn invalidate_project(&self, customer: &CustomerId, project: &ProjectId) -> usize {
        let keys: Vec<CacheKey> = self
            .project_index
            .read()
            .get(&(customer.clone(), project.clone()))
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default();
        let count = keys.len();
        for key in keys {
            self.remove_key(&key, true);
        }
        count
    }

    fn remove_key(&self, key: &CacheKey, count_invalidation: bool) {
        let removed = self.detach(&mut self.entries.write(), key);
        if removed.is_some() && count_invalidation {
            self.stats.invalidations.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Remove an entry with the entries lock held
    fn detach(
        &self,
        entries: &mut HashMap<CacheKey, Arc<CacheEntry>>,
        key: &CacheKey,
    ) -> Option<Arc<CacheEntry>> {
        let entry = entries.remove(key)?;
        self.release(key, &entry);
        Some(entry)
    }

    fn release(&self, key: &CacheKey, entry: &CacheEntry) {
        let size = entry.size_bytes as u64;
        let _ = self
            .current_size
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(v.saturating_sub(size))
            });

        let mut index = self.project_index.write();
        let index_key = (key.customer.clone(), entry.project.clone());
        if let Some(keys) = index.get_mut(&index_key) {
            keys.remove(key);
            if keys.is_empty() {
                index.remove(&index_key);
            }
        }
    }

    /// Clear all cache entries
    pub fn clear(&self) {
        let mut entries = self.entries.write();
        entries.clear();
        self.project_index.write().clear();
        self.current_size.store(0, Ordering::Relaxed);
    }

    /// Get cache statistics
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Get hit ratio (0.0 to 1.0)
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.stats.hits.load(Ordering::Relaxed);
        let misses = self.stats.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    /// Get current cache size in bytes
    pub fn size_bytes(&self) -> u64 {
        self.current_size.load(Ordering::Relaxed)
    }

    /// Get number of cached entries
    pub fn entry_count(&self) -> usize {
        self.entries.read().len()
    }

    fn evict_if_needed(&self, new_entry_size: usize) {
        const MAX_EVICTION_ATTEMPTS: usize = 1000;

        for _ in 0..MAX_EVICTION_ATTEMPTS {
            let count = self.entries.read().len();
            if count == 0 {
                break;
            }
            let projected = self
                .current_size
                .load(Ordering::Relaxed)
                .saturating_add(new_entry_size as u64);
            if count < self.config.max_entries && projected <= self.config.max_size_bytes as u64 {
                break;
            }
            self.evict_lru();
        }
    }

    /// Evict the least recently used entry
    ///
    /// O(n) scan over the entries.
    fn evict_lru(&self) {
        let victim = {
            let entries = self.entries.read();
            entries
                .iter()
                .min_by_key(|(_, e)| e.last_accessed.load(Ordering::Relaxed))
                .map(|(k, _)| k.clone())
        };

        if let Some(key) = victim {
            if self.detach(&mut self.entries.write(), &key).is_some() {
                self.stats.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Thread-safe wrapper for shared cache access
pub type SharedAnalysisCache = Arc<AnalysisCache>;

// ============================================================================
// Tests
// ============================================================================

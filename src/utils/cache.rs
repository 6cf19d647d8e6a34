//! Citation cache with lazy expiry.
//!
//! Entries live in an in-memory map and, when persistence is enabled, as one
//! JSON file per identifier:
//!
//! ```text
//! ~/.cache/research-corpus/
//!   citations/
//!     <md5 of identifier>.json
//! ```
//!
//! Files are written to a temporary file in the same directory and renamed
//! into place, so concurrent readers never observe a partial entry. Expired
//! entries are treated as absent when read; [`CitationCache::purge_expired`]
//! removes them from disk.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use thiserror::Error;

use crate::config::CacheConfig;
use crate::models::{CitationCacheEntry, CitationKey};

/// Cache errors
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache entry could not be serialized: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("cache entry could not be moved into place: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// Result of a cache lookup
#[derive(Debug, Clone, PartialEq)]
pub enum CacheResult<T> {
    /// Item was found and is valid
    Hit(T),

    /// Item was not found
    Miss,

    /// Item was found but has expired
    Expired,
}

impl<T> CacheResult<T> {
    pub fn hit(self) -> Option<T> {
        match self {
            CacheResult::Hit(v) => Some(v),
            _ => None,
        }
    }
}

/// Statistics about the cache
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    /// Whether entries are persisted to disk
    pub persistent: bool,

    /// Cache directory path
    pub cache_dir: Option<PathBuf>,

    /// Entries held in memory this run
    pub memory_entries: usize,

    /// Entry files on disk
    pub disk_entries: usize,

    /// Entry files on disk past their TTL
    pub expired_entries: usize,

    /// Size on disk in KB
    pub size_kb: u64,

    /// Entry time-to-live
    pub ttl: Duration,
}

/// Cache of citation lookups keyed by normalized identifier
#[derive(Debug)]
pub struct CitationCache {
    dir: Option<PathBuf>,
    ttl: Duration,
    entries: RwLock<HashMap<String, CitationCacheEntry>>,
}

impl CitationCache {
    /// Create a cache from config, creating the cache directory if needed
    pub fn from_config(config: &CacheConfig) -> Result<Self, CacheError> {
        if !config.enabled {
            tracing::debug!("[cache] persistence disabled, using memory only");
            return Ok(Self::in_memory(config.ttl()));
        }

        let dir = config
            .directory
            .clone()
            .unwrap_or_else(crate::config::default_cache_dir)
            .join("citations");
        fs::create_dir_all(&dir)?;
        tracing::info!("[cache] citation cache at {}", dir.display());

        Ok(Self {
            dir: Some(dir),
            ttl: config.ttl(),
            entries: RwLock::new(HashMap::new()),
        })
    }

    /// A cache that lives only for this process
    pub fn in_memory(ttl: Duration) -> Self {
        Self {
            dir: None,
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn entry_path(dir: &Path, identifier: &str) -> PathBuf {
        let digest = md5::compute(identifier.as_bytes());
        dir.join(format!("{:x}.json", digest))
    }

    /// Look up an entry; entries older than the TTL are reported as expired
    pub fn get(&self, key: &CitationKey) -> CacheResult<CitationCacheEntry> {
        self.get_at(key, Utc::now())
    }

    fn get_at(&self, key: &CitationKey, now: DateTime<Utc>) -> CacheResult<CitationCacheEntry> {
        let cached = {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            entries.get(key.as_str()).cloned()
        };

        let entry = match cached {
            Some(entry) => entry,
            None => match self.load(key) {
                Some(entry) => entry,
                None => {
                    tracing::debug!("[cache] MISS {}", key);
                    return CacheResult::Miss;
                }
            },
        };

        if entry.is_expired(self.ttl, now) {
            tracing::debug!("[cache] expired {}", key);
            return CacheResult::Expired;
        }

        tracing::debug!("[cache] HIT {}", key);
        CacheResult::Hit(entry)
    }

    /// Read an entry file into memory
    fn load(&self, key: &CitationKey) -> Option<CitationCacheEntry> {
        let dir = self.dir.as_ref()?;
        let content = fs::read_to_string(Self::entry_path(dir, key.as_str())).ok()?;
        let entry: CitationCacheEntry = match serde_json::from_str(&content) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("[cache] unreadable entry for {}: {}", key, e);
                return None;
            }
        };
        // Guards against md5 collisions
        if entry.identifier != key.as_str() {
            return None;
        }

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(entry.identifier.clone(), entry.clone());
        Some(entry)
    }

    /// Store an entry. The in-memory copy is updated even if the disk write fails.
    pub fn put(&self, entry: CitationCacheEntry) -> Result<(), CacheError> {
        {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            entries.insert(entry.identifier.clone(), entry.clone());
        }

        if let Some(dir) = &self.dir {
            Self::write_atomic(dir, &entry)?;
            tracing::debug!("[cache] stored {}", entry.identifier);
        }
        Ok(())
    }

    fn write_atomic(dir: &Path, entry: &CitationCacheEntry) -> Result<(), CacheError> {
        let content = serde_json::to_vec_pretty(entry)?;
        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        file.write_all(&content)?;
        file.as_file().sync_all()?;
        file.persist(Self::entry_path(dir, &entry.identifier))?;
        Ok(())
    }

    /// Remove expired entries from memory and disk. Returns how many files were removed.
    pub fn purge_expired(&self) -> Result<usize, CacheError> {
        let now = Utc::now();
        {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            entries.retain(|_, entry| !entry.is_expired(self.ttl, now));
        }

        let Some(dir) = &self.dir else {
            return Ok(0);
        };

        let mut removed = 0;
        for path in Self::entry_files(dir)? {
            let expired = fs::read_to_string(&path)
                .ok()
                .and_then(|c| serde_json::from_str::<CitationCacheEntry>(&c).ok())
                .map(|e| e.is_expired(self.ttl, now))
                // Unreadable entries are dead weight
                .unwrap_or(true);
            if expired {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        tracing::info!("[cache] purged {} expired entries", removed);
        Ok(removed)
    }

    /// Remove every entry
    pub fn clear(&self) -> Result<(), CacheError> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();

        if let Some(dir) = &self.dir {
            for path in Self::entry_files(dir)? {
                fs::remove_file(&path)?;
            }
        }
        tracing::info!("[cache] cleared");
        Ok(())
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let memory_entries = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();

        let mut stats = CacheStats {
            persistent: self.dir.is_some(),
            cache_dir: self.dir.clone(),
            memory_entries,
            disk_entries: 0,
            expired_entries: 0,
            size_kb: 0,
            ttl: self.ttl,
        };

        if let Some(dir) = &self.dir {
            let now = Utc::now();
            let files = Self::entry_files(dir).unwrap_or_default();
            let mut bytes = 0;
            for path in &files {
                bytes += fs::metadata(path).map(|m| m.len()).unwrap_or(0);
                let expired = fs::read_to_string(path)
                    .ok()
                    .and_then(|c| serde_json::from_str::<CitationCacheEntry>(&c).ok())
                    .map(|e| e.is_expired(self.ttl, now))
                    .unwrap_or(true);
                if expired {
                    stats.expired_entries += 1;
                }
            }
            stats.disk_entries = files.len();
            stats.size_kb = bytes / 1024;
        }
        stats
    }

    fn entry_files(dir: &Path) -> Result<Vec<PathBuf>, CacheError> {
        let mut files = Vec::new();
        for entry in fs::read_dir(dir)?.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CitationCounts, ResolutionTier};
    use chrono::Duration as ChronoDuration;
    use tempfile::TempDir;

    const TTL: Duration = Duration::from_secs(30 * 24 * 3600);

    fn test_cache_config(dir: &TempDir) -> CacheConfig {
        CacheConfig {
            enabled: true,
            directory: Some(dir.path().to_path_buf()),
            ttl_days: 30,
        }
    }

    fn entry(doi: &str, citations: u32) -> CitationCacheEntry {
        CitationCacheEntry::new(
            &CitationKey::from_doi(doi).unwrap(),
            CitationCounts {
                citation_count: citations,
                reference_count: Some(3),
            },
            ResolutionTier::Primary,
        )
    }

    #[test]
    fn test_put_and_get() {
        let temp_dir = TempDir::new().unwrap();
        let cache = CitationCache::from_config(&test_cache_config(&temp_dir)).unwrap();
        let key = CitationKey::from_doi("10.1/a").unwrap();

        assert_eq!(cache.get(&key), CacheResult::Miss);

        cache.put(entry("10.1/a", 12)).unwrap();
        let hit = cache.get(&key).hit().unwrap();
        assert_eq!(hit.citation_count, 12);
        assert_eq!(hit.tier, ResolutionTier::Primary);
    }

    #[test]
    fn test_entries_survive_restart() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_cache_config(&temp_dir);
        {
            let cache = CitationCache::from_config(&config).unwrap();
            cache.put(entry("10.1/persisted", 5)).unwrap();
        }

        let cache = CitationCache::from_config(&config).unwrap();
        let key = CitationKey::from_doi("10.1/persisted").unwrap();
        assert_eq!(cache.get(&key).hit().unwrap().citation_count, 5);
        assert_eq!(cache.stats().disk_entries, 1);
    }

    #[test]
    fn test_lazy_expiry_and_purge() {
        let temp_dir = TempDir::new().unwrap();
        let cache = CitationCache::from_config(&test_cache_config(&temp_dir)).unwrap();

        let mut old = entry("10.1/old", 1);
        old.fetched_at = Utc::now() - ChronoDuration::days(31);
        cache.put(old).unwrap();
        cache.put(entry("10.1/fresh", 2)).unwrap();

        let key = CitationKey::from_doi("10.1/old").unwrap();
        assert_eq!(cache.get(&key), CacheResult::Expired);
        assert_eq!(cache.stats().expired_entries, 1);

        assert_eq!(cache.purge_expired().unwrap(), 1);
        assert_eq!(cache.stats().disk_entries, 1);
        assert_eq!(cache.get(&key), CacheResult::Miss);
    }

    #[test]
    fn test_clear() {
        let temp_dir = TempDir::new().unwrap();
        let cache = CitationCache::from_config(&test_cache_config(&temp_dir)).unwrap();
        cache.put(entry("10.1/a", 1)).unwrap();
        cache.put(entry("10.1/b", 1)).unwrap();

        cache.clear().unwrap();
        let stats = cache.stats();
        assert_eq!(stats.disk_entries, 0);
        assert_eq!(stats.memory_entries, 0);
    }

    #[test]
    fn test_in_memory_cache() {
        let cache = CitationCache::in_memory(TTL);
        cache.put(entry("10.1/mem", 9)).unwrap();

        let key = CitationKey::from_doi("10.1/mem").unwrap();
        assert_eq!(cache.get(&key).hit().unwrap().citation_count, 9);
        assert!(!cache.stats().persistent);
    }

    #[test]
    fn test_concurrent_writers() {
        let temp_dir = TempDir::new().unwrap();
        let cache = std::sync::Arc::new(
            CitationCache::from_config(&test_cache_config(&temp_dir)).unwrap(),
        );

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = std::sync::Arc::clone(&cache);
                std::thread::spawn(move || {
                    for _ in 0..20 {
                        cache.put(entry("10.1/shared", i)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // A fresh reader sees one complete entry
        let reader = CitationCache::from_config(&test_cache_config(&temp_dir)).unwrap();
        let key = CitationKey::from_doi("10.1/shared").unwrap();
        assert!(reader.get(&key).hit().unwrap().citation_count < 8);
        assert_eq!(reader.stats().disk_entries, 1);
    }
}

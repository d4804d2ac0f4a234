//! Disk-backed content cache for encyclopedia pages.
//!
//! One pretty-printed JSON file per topic, named by the first 128 bits of
//! the SHA-256 of the exact topic string. Entries never expire; they are
//! removed only by [`ContentCache::clear`].
//!
//! Every operation degrades instead of failing: a corrupt entry reads as a
//! miss and a failed write is logged, leaving the pipeline uncached.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, info, warn};

use crate::models::CacheEntry;

/// Summary of the cache directory contents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub total_pages: usize,
    pub total_bytes: u64,
    /// Unix timestamp of the most recently written entry.
    pub newest: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct ContentCache {
    dir: PathBuf,
}

impl ContentCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        match std::fs::create_dir_all(&dir) {
            Ok(()) => debug!("Content cache initialised at {}", dir.display()),
            Err(e) => warn!(
                "Could not create cache directory {}: {}. Continuing without cache",
                dir.display(),
                e
            ),
        }
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Filesystem-safe key for `topic`: 32 lowercase hex characters.
    pub fn cache_key(topic: &str) -> String {
        let digest = Sha256::digest(topic.as_bytes());
        hex::encode(&digest[..16])
    }

    fn entry_path(&self, topic: &str) -> PathBuf {
        self.dir.join(format!("{}.json", Self::cache_key(topic)))
    }

    /// Cached content for `topic`, or `None` on a miss or unreadable entry.
    pub fn get(&self, topic: &str) -> Option<String> {
        self.get_entry(topic).map(|entry| entry.content)
    }

    /// Full cached record for `topic`, including the stored source id.
    pub fn get_entry(&self, topic: &str) -> Option<CacheEntry> {
        let path = self.entry_path(topic);
        if !path.exists() {
            return None;
        }

        let entry = std::fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|raw| {
                serde_json::from_str::<CacheEntry>(&raw).map_err(|e| e.to_string())
            });

        match entry {
            Ok(entry) if entry.topic == topic => {
                debug!("Cache hit for topic: {}", topic);
                Some(entry)
            }
            Ok(entry) => {
                warn!(
                    "Cache entry {} holds '{}', not '{}'; treating as a miss",
                    path.display(),
                    entry.topic,
                    topic
                );
                None
            }
            Err(e) => {
                warn!("Error reading cache for '{}': {}", topic, e);
                None
            }
        }
    }

    /// Write or overwrite the entry for `topic`. Failures are logged and swallowed.
    pub fn set(&self, topic: &str, content: &str, source_id: &str) {
        let entry = CacheEntry {
            topic: topic.to_string(),
            source_id: source_id.to_string(),
            content: content.to_string(),
        };

        let result = serde_json::to_string_pretty(&entry)
            .map_err(|e| e.to_string())
            .and_then(|json| {
                std::fs::create_dir_all(&self.dir).map_err(|e| e.to_string())?;
                std::fs::write(self.entry_path(topic), json).map_err(|e| e.to_string())
            });

        match result {
            Ok(()) => debug!("Cached topic: {}", topic),
            Err(e) => warn!("Error caching '{}': {}", topic, e),
        }
    }

    /// Delete every entry; returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut count = 0;
        for path in self.entry_files() {
            match std::fs::remove_file(&path) {
                Ok(()) => count += 1,
                Err(e) => warn!("Error deleting cache file {}: {}", path.display(), e),
            }
        }

        info!("Cleared {} cached pages", count);
        count
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats::default();
        for path in self.entry_files() {
            let Ok(meta) = std::fs::metadata(&path) else {
                continue;
            };
            stats.total_pages += 1;
            stats.total_bytes += meta.len();

            let modified = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64);
            if let Some(ts) = modified {
                stats.newest = Some(stats.newest.map_or(ts, |n| n.max(ts)));
            }
        }
        stats
    }

    fn entry_files(&self) -> Vec<PathBuf> {
        let Ok(read_dir) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        read_dir
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cache() -> (TempDir, ContentCache) {
        let tmp = TempDir::new().unwrap();
        let cache = ContentCache::new(tmp.path().join("wiki"));
        (tmp, cache)
    }

    #[test]
    fn test_round_trip() {
        let (_tmp, cache) = cache();
        assert_eq!(cache.get("Photosynthesis"), None);
        cache.set("Photosynthesis", "Plants turn light into sugar.", "24544");
        assert_eq!(
            cache.get("Photosynthesis").as_deref(),
            Some("Plants turn light into sugar.")
        );
        let entry = cache.get_entry("Photosynthesis").unwrap();
        assert_eq!(entry.source_id, "24544");
    }

    #[test]
    fn test_overwrite() {
        let (_tmp, cache) = cache();
        cache.set("Carbon", "old", "1");
        cache.set("Carbon", "new", "2");
        assert_eq!(cache.get("Carbon").as_deref(), Some("new"));
        assert_eq!(cache.stats().total_pages, 1);
    }

    #[test]
    fn test_keys_are_exact_and_distinct() {
        assert_ne!(ContentCache::cache_key("carbon"), ContentCache::cache_key("Carbon"));
        assert_ne!(ContentCache::cache_key("carbon"), ContentCache::cache_key("carbon "));
        let key = ContentCache::cache_key("carbon");
        assert_eq!(key.len(), 32);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_unicode_and_punctuation_topics() {
        let (_tmp, cache) = cache();
        let topic = "Schrödinger's cat / état quantique?";
        cache.set(topic, "content", "7");
        assert_eq!(cache.get(topic).as_deref(), Some("content"));
    }

    #[test]
    fn test_clear_returns_count() {
        let (_tmp, cache) = cache();
        cache.set("a", "1", "1");
        cache.set("b", "2", "2");
        cache.set("c", "3", "3");
        assert_eq!(cache.clear(), 3);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.clear(), 0);
    }

    #[test]
    fn test_corrupt_entry_is_miss() {
        let (_tmp, cache) = cache();
        cache.set("Carbon", "ok", "1");
        std::fs::write(cache.entry_path("Carbon"), "{ not json").unwrap();
        assert_eq!(cache.get("Carbon"), None);
    }

    #[test]
    fn test_foreign_entry_is_miss() {
        let (_tmp, cache) = cache();
        cache.set("Carbon", "ok", "1");
        let raw = std::fs::read_to_string(cache.entry_path("Carbon")).unwrap();
        std::fs::write(cache.entry_path("Oxygen"), raw).unwrap();
        assert_eq!(cache.get("Oxygen"), None);
    }

    #[test]
    fn test_stats() {
        let (_tmp, cache) = cache();
        assert_eq!(cache.stats(), CacheStats::default());
        cache.set("a", "hello", "1");
        cache.set("b", "world", "2");
        let stats = cache.stats();
        assert_eq!(stats.total_pages, 2);
        assert!(stats.total_bytes > 0);
        assert!(stats.newest.is_some());
    }

    #[test]
    fn test_file_format() {
        let (_tmp, cache) = cache();
        cache.set("Carbon", "text", "5906");
        let raw = std::fs::read_to_string(cache.entry_path("Carbon")).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["concept"], "Carbon");
        assert_eq!(json["page_id"], "5906");
        assert_eq!(json["content"], "text");
    }

    #[test]
    fn test_unwritable_directory_degrades() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        // A regular file where the directory should be
        let cache = ContentCache::new(blocker.join("sub"));
        cache.set("a", "b", "c");
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.clear(), 0);
    }
}

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::CacheError;
use crate::record::{Embedding, EmbeddingRecord, EmbeddingRecords};

/// Insertions beyond this count trigger a bulk eviction of the oldest
/// entries rather than growing without bound; the original has no cap, this
/// one does.
const CAPACITY: usize = 1000;
const EVICTION_BATCH: usize = 100;

/// A file-backed mapping from prompt key to embedding, with lazy
/// write-back and TTL-based expiry. `ttl_ms == 0` disables expiry.
pub struct EmbeddingCache<C: Clock = SystemClock> {
    file_path: PathBuf,
    ttl_ms: u64,
    dirty: bool,
    map: HashMap<String, EmbeddingRecord>,
    clock: C,
}

impl EmbeddingCache<SystemClock> {
    pub fn open(file_path: impl Into<PathBuf>, ttl_ms: u64) -> Self {
        Self::open_with_clock(file_path, ttl_ms, SystemClock)
    }
}

impl<C: Clock> EmbeddingCache<C> {
    pub fn open_with_clock(file_path: impl Into<PathBuf>, ttl_ms: u64, clock: C) -> Self {
        let file_path = file_path.into();
        let mut cache = Self {
            file_path,
            ttl_ms,
            dirty: false,
            map: HashMap::new(),
            clock,
        };
        cache.load();
        cache
    }

    fn load(&mut self) {
        let buf = match fs::read_to_string(&self.file_path) {
            Ok(buf) => buf,
            Err(e) => {
                warn!("failed to read the embedding cache: {e}");
                return;
            }
        };

        let records: EmbeddingRecords = match serde_json::from_str(&buf) {
            Ok(records) => records,
            Err(e) => {
                error!(
                    "failed to parse the embedding cache at {}: {e}, deleting it",
                    self.file_path.display()
                );
                if let Err(e) = fs::remove_file(&self.file_path) {
                    error!("failed to delete the corrupted cache file: {e}");
                }
                return;
            }
        };

        let total = records.records.len();
        for (key, record) in records.records {
            if self.is_expired(&record) {
                self.dirty = true;
            } else {
                self.map.insert(key, record);
            }
        }
        info!(
            "loaded embedding cache: total {total}, removed {}, size {}",
            total - self.map.len(),
            self.map.len()
        );
    }

    fn is_expired(&self, record: &EmbeddingRecord) -> bool {
        self.ttl_ms != 0 && self.clock.now_ms().saturating_sub(record.updated_time_ms) > self.ttl_ms
    }

    /// Replaces or inserts `key`, stamping the current time and marking the
    /// cache dirty. May evict the oldest batch of entries first if the
    /// cache is at capacity and `key` isn't already present.
    pub fn put(&mut self, key: String, embedding: Embedding) {
        if !self.map.contains_key(&key) && self.map.len() >= CAPACITY {
            self.evict_oldest_batch();
        }
        self.map.insert(
            key,
            EmbeddingRecord {
                values: embedding,
                updated_time_ms: self.clock.now_ms(),
            },
        );
        self.dirty = true;
    }

    fn evict_oldest_batch(&mut self) {
        let mut by_age: Vec<(String, u64)> = self
            .map
            .iter()
            .map(|(k, r)| (k.clone(), r.updated_time_ms))
            .collect();
        by_age.sort_by_key(|(_, updated_time_ms)| *updated_time_ms);
        for (key, _) in by_age.into_iter().take(EVICTION_BATCH) {
            self.map.remove(&key);
        }
        self.dirty = true;
    }

    /// Returns the embedding for `key`, refreshing its timestamp on hit.
    /// A miss is not an error.
    pub fn get(&mut self, key: &str) -> Option<Embedding> {
        let record = self.map.get_mut(key)?;
        record.updated_time_ms = self.clock.now_ms();
        self.dirty = true;
        Some(record.values.clone())
    }

    /// Removes stale entries, then rewrites the backing file if anything
    /// changed since the last sync. Returns `false` on any write or
    /// serialization failure.
    pub fn sync(&mut self) -> bool {
        self.try_sync().is_ok()
    }

    fn try_sync(&mut self) -> Result<(), CacheError> {
        let before = self.map.len();
        self.map.retain(|_, record| !self.is_expired(record));
        let num_removed = before - self.map.len();

        info!(
            "syncing embedding cache: removed {num_removed}, size {}",
            self.map.len()
        );

        if !self.dirty && num_removed == 0 {
            return Ok(());
        }

        let records = EmbeddingRecords {
            records: self.map.clone(),
        };
        let buf = serde_json::to_string(&records)?;
        write_file(&self.file_path, &buf)?;
        self.dirty = false;
        Ok(())
    }
}

fn write_file(path: &Path, buf: &str) -> Result<(), CacheError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, buf)?;
    Ok(())
}

impl<C: Clock> Drop for EmbeddingCache<C> {
    fn drop(&mut self) {
        if !self.sync() {
            error!("failed to flush the embedding cache on drop");
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct ManualClock(AtomicU64);

    impl ManualClock {
        fn new(start_ms: u64) -> Self {
            Self(AtomicU64::new(start_ms))
        }

        fn set(&self, ms: u64) {
            self.0.store(ms, Ordering::SeqCst);
        }
    }

    impl Clock for &ManualClock {
        fn now_ms(&self) -> u64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("embeddings.json");
        let mut cache = EmbeddingCache::open(&path, 0);
        cache.put("k".into(), vec![1.0, 2.0]);
        assert_eq!(cache.get("k"), Some(vec![1.0, 2.0]));
    }

    #[test]
    fn get_on_a_miss_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("embeddings.json");
        let mut cache = EmbeddingCache::open(&path, 0);
        assert_eq!(cache.get("missing"), None);
    }

    #[test]
    fn sync_then_reopen_preserves_non_expired_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("embeddings.json");
        {
            let mut cache = EmbeddingCache::open(&path, 0);
            cache.put("k".into(), vec![3.0]);
            assert!(cache.sync());
        }
        let mut reopened = EmbeddingCache::open(&path, 0);
        assert_eq!(reopened.get("k"), Some(vec![3.0]));
    }

    #[test]
    fn a_malformed_cache_file_is_deleted_and_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("embeddings.json");
        fs::write(&path, b"not json").unwrap();
        let mut cache = EmbeddingCache::open(&path, 0);
        assert_eq!(cache.get("anything"), None);
        assert!(!path.exists());
    }

    /// Timeline: TTL=10s. t=0 put k1,k2,k3. t=1 put k4,k5. t=6 get k2 (refresh).
    /// t=11 sync. Survivors: {k2,k4,k5}. Reopen with TTL=0: same set.
    /// Reopen with TTL=3s: load discards everything (all older than 3s), then
    /// t=17 put k4, sync: survivors become {k4}.
    #[test]
    fn ttl_sweep_timeline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("embeddings.json");
        let clock = ManualClock::new(0);
        let ttl_ms = 10_000;

        {
            let mut cache = EmbeddingCache::open_with_clock(&path, ttl_ms, &clock);
            cache.put("k1".into(), vec![1.0]);
            cache.put("k2".into(), vec![2.0]);
            cache.put("k3".into(), vec![3.0]);

            clock.set(1_000);
            cache.put("k4".into(), vec![4.0]);
            cache.put("k5".into(), vec![5.0]);

            clock.set(6_000);
            cache.get("k2");

            clock.set(11_000);
            assert!(cache.sync());

            let mut survivors: Vec<&str> = cache.map.keys().map(String::as_str).collect();
            survivors.sort();
            assert_eq!(survivors, vec!["k2", "k4", "k5"]);
        }

        let reopened_clock = ManualClock::new(11_000);
        let mut reopened = EmbeddingCache::open_with_clock(&path, 0, &reopened_clock);
        let mut survivors: Vec<&str> = reopened.map.keys().map(String::as_str).collect();
        survivors.sort();
        assert_eq!(survivors, vec!["k2", "k4", "k5"]);
        assert!(reopened.sync());
        drop(reopened);

        // Everything on disk is already older than this narrow TTL, so load
        // discards it all; re-putting k4 at t=17 is what actually saves it.
        let narrow_ttl_clock = ManualClock::new(11_000);
        let mut narrow = EmbeddingCache::open_with_clock(&path, 3_000, &narrow_ttl_clock);
        narrow_ttl_clock.set(17_000);
        narrow.put("k4".into(), vec![4.0]);
        assert!(narrow.sync());
        let mut survivors: Vec<&str> = narrow.map.keys().map(String::as_str).collect();
        survivors.sort();
        assert_eq!(survivors, vec!["k4"]);
    }
}

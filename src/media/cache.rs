//! On-disk cache of generated clips.
//!
//! Clips live in one directory as `<episode>.<timestamp>.webm`. Entries never
//! expire; the only eviction is [`ClipCache::evict_all`], which sweeps every
//! `.webm` file in the directory. Generation of a given clip is serialised
//! through a per-key lock so two requests for the same clip never run the
//! transcoder against the same output file.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{info, warn};

use super::{
    MediaError,
    validate::{CLIP_EXTENSION, MediaRequest},
};

/// Suffix for clips still being written.
pub const PARTIAL_SUFFIX: &str = "part";

#[derive(Debug)]
pub struct ClipCache {
    dir: PathBuf,
    entries: Mutex<HashMap<MediaRequest, PathBuf>>,
    key_locks: Mutex<HashMap<MediaRequest, Arc<AsyncMutex<()>>>>,
}

impl ClipCache {
    /// Use `dir` as the clip directory, creating it if needed and removing
    /// partial files left by an interrupted run.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, MediaError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;

        let mut leftovers = 0;
        let mut rd = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = rd.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == PARTIAL_SUFFIX) {
                remove_if_present(&path).await?;
                leftovers += 1;
            }
        }
        if leftovers > 0 {
            info!("Removed {leftovers} partial clip(s) from {}", dir.display());
        }

        Ok(Self {
            dir,
            entries: Mutex::new(HashMap::new()),
            key_locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the clip for `key` lives (whether or not it exists yet).
    pub fn path_for(&self, key: &MediaRequest) -> PathBuf {
        self.dir.join(key.clip_file_name())
    }

    /// Where the clip for `key` is written before it is complete.
    pub fn partial_path_for(&self, key: &MediaRequest) -> PathBuf {
        self.dir
            .join(format!("{}.{PARTIAL_SUFFIX}", key.clip_file_name()))
    }

    pub fn record(&self, key: MediaRequest, path: PathBuf) {
        self.entries.lock().insert(key, path);
    }

    pub fn get(&self, key: &MediaRequest) -> Option<PathBuf> {
        self.entries.lock().get(key).cloned()
    }

    /// Take the generation lock for `key`. Different keys never contend.
    pub async fn lock_key(&self, key: &MediaRequest) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.key_locks.lock();
            Arc::clone(locks.entry(key.clone()).or_default())
        };
        lock.lock_owned().await
    }

    /// Forget generation locks nobody holds or waits on.
    pub fn prune_key_locks(&self) {
        self.key_locks
            .lock()
            .retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    /// Delete every clip in the directory and forget all entries.
    ///
    /// Succeeds when there is nothing to delete, including when the
    /// directory itself is gone. Returns the number of files removed.
    pub async fn evict_all(&self) -> Result<usize, MediaError> {
        self.entries.lock().clear();

        let mut rd = match tokio::fs::read_dir(&self.dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(entry) = rd.next_entry().await? {
            let path = entry.path();
            if !path.extension().is_some_and(|e| e == CLIP_EXTENSION) {
                continue;
            }
            match remove_if_present(&path).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => warn!("Could not delete clip {}: {e}", path.display()),
            }
        }

        info!("Evicted {removed} clip(s) from {}", self.dir.display());
        Ok(removed)
    }
}

/// Remove a file, treating "already gone" as success.
pub async fn remove_if_present(path: &Path) -> std::io::Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn key(name: &str, ts: u64) -> MediaRequest {
        MediaRequest::new(name, ts).unwrap()
    }

    #[tokio::test]
    async fn open_creates_dir_and_drops_partials() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("clips");
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join("Ep1.0.webm.part"), b"half").await.unwrap();
        tokio::fs::write(dir.join("Ep1.5.webm"), b"done").await.unwrap();

        let cache = ClipCache::open(&dir).await.unwrap();

        assert!(!dir.join("Ep1.0.webm.part").exists());
        assert!(dir.join("Ep1.5.webm").exists());
        assert_eq!(cache.path_for(&key("Ep1", 5)), dir.join("Ep1.5.webm"));
        assert_eq!(cache.partial_path_for(&key("Ep1", 5)), dir.join("Ep1.5.webm.part"));
    }

    #[tokio::test]
    async fn evict_all_sweeps_webm_only() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ClipCache::open(tmp.path()).await.unwrap();
        for name in ["a.1.webm", "b.2.webm", "stray.webm"] {
            tokio::fs::write(tmp.path().join(name), b"x").await.unwrap();
        }
        tokio::fs::write(tmp.path().join("keep.txt"), b"x").await.unwrap();
        cache.record(key("a", 1), tmp.path().join("a.1.webm"));

        assert_eq!(cache.evict_all().await.unwrap(), 3);
        assert!(cache.get(&key("a", 1)).is_none());
        assert!(tmp.path().join("keep.txt").exists());
        assert!(!tmp.path().join("a.1.webm").exists());
    }

    #[tokio::test]
    async fn evict_all_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ClipCache::open(tmp.path().join("c")).await.unwrap();
        assert_eq!(cache.evict_all().await.unwrap(), 0);
        assert_eq!(cache.evict_all().await.unwrap(), 0);

        tokio::fs::remove_dir_all(tmp.path().join("c")).await.unwrap();
        assert_eq!(cache.evict_all().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn same_key_serialises_other_keys_do_not() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = Arc::new(ClipCache::open(tmp.path()).await.unwrap());

        let held = cache.lock_key(&key("a", 1)).await;

        // A different key is available immediately.
        let other = tokio::time::timeout(Duration::from_millis(100), cache.lock_key(&key("b", 1)))
            .await
            .expect("different key must not block");
        drop(other);

        // The same key waits for the holder.
        let same = tokio::time::timeout(Duration::from_millis(50), cache.lock_key(&key("a", 1))).await;
        assert!(same.is_err());

        drop(held);
        let _again = cache.lock_key(&key("a", 1)).await;
    }

    #[tokio::test]
    async fn prune_keeps_held_locks() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ClipCache::open(tmp.path()).await.unwrap();

        let held = cache.lock_key(&key("a", 1)).await;
        drop(cache.lock_key(&key("b", 1)).await);
        cache.prune_key_locks();
        assert_eq!(cache.key_locks.lock().len(), 1);

        drop(held);
        cache.prune_key_locks();
        assert!(cache.key_locks.lock().is_empty());
    }
}

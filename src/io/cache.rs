use crate::types::{LoaderError, LoaderResult};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// One filesystem-backed key-value cache tier.
///
/// Keys are relative paths under the store's root (they may contain `/`).
/// Entries are immutable once written: writes go to a temporary sibling and
/// are renamed into place, so concurrent readers see either the old file or
/// the fully written new one, never a partial. There is no TTL; the file
/// modification time is the access-time proxy used by [`CacheStore::sweep`].
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path an entry with this key would live at
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    /// Returns the entry path on a hit, `None` on a miss
    pub fn get(&self, key: &str) -> Option<PathBuf> {
        let path = self.path_for(key);
        if path.is_file() {
            Some(path)
        } else {
            None
        }
    }

    /// Atomically write an entry from an in-memory buffer
    pub fn put_bytes(&self, key: &str, bytes: &[u8]) -> LoaderResult<PathBuf> {
        let dest = self.path_for(key);
        let parent = dest
            .parent()
            .ok_or_else(|| LoaderError::InvalidFormat(format!("bad cache key: {}", key)))?;
        fs::create_dir_all(parent)?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.write_all(bytes)?;
        tmp.persist(&dest)
            .map_err(|e| LoaderError::Io(e.error))?;
        log::debug!("Cached {} bytes at {}", bytes.len(), dest.display());
        Ok(dest)
    }

    /// Atomically move an existing file into the store.
    ///
    /// The source is expected to live on the same filesystem (the shared
    /// data root); falls back to copy + remove when rename fails.
    pub fn put_file(&self, key: &str, src: &Path) -> LoaderResult<PathBuf> {
        let dest = self.path_for(key);
        let parent = dest
            .parent()
            .ok_or_else(|| LoaderError::InvalidFormat(format!("bad cache key: {}", key)))?;
        fs::create_dir_all(parent)?;

        if fs::rename(src, &dest).is_err() {
            fs::copy(src, &dest)?;
            fs::remove_file(src)?;
        }
        log::debug!("Cached {} at {}", key, dest.display());
        Ok(dest)
    }

    /// Refresh the entry's access time without rewriting its content, so an
    /// external reaper evicting by age sees it as recently used.
    pub fn touch(&self, key: &str) -> LoaderResult<()> {
        let path = self.path_for(key);
        let file = fs::OpenOptions::new().append(true).open(&path)?;
        file.set_modified(SystemTime::now())?;
        Ok(())
    }

    /// Remove every entry whose modification time is older than `max_age`.
    /// Returns the number of files removed. Eviction only ever happens here,
    /// never implicitly inside `get`/`put`.
    pub fn sweep(&self, max_age: Duration) -> LoaderResult<usize> {
        sweep_dir(&self.root, max_age)
    }
}

/// Recursively remove files under `dir` not touched within `max_age`
pub fn sweep_dir(dir: &Path, max_age: Duration) -> LoaderResult<usize> {
    if !dir.is_dir() {
        return Ok(0);
    }
    let cutoff = SystemTime::now()
        .checked_sub(max_age)
        .unwrap_or(UNIX_EPOCH);
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            removed += sweep_dir(&path, max_age)?;
        } else if let Ok(modified) = entry.metadata().and_then(|m| m.modified()) {
            if modified < cutoff {
                log::debug!("Sweeping stale cache file {}", path.display());
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
    }
    Ok(removed)
}

/// Generate a unique path for a transient working file. The file is not
/// created; the caller owns whatever the external tool writes there and must
/// remove it on every exit path.
pub fn unique_tmp_path(dir: &Path, prefix: &str, extension: &str) -> PathBuf {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    dir.join(format!(
        "{}-{}-{}-{}.{}",
        prefix,
        std::process::id(),
        nanos,
        seq,
        extension
    ))
}

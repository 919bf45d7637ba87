//! Crash-safe backup file
//!
//! Uses the write-fsync-rename pattern:
//! 1. Write the encoded snapshot to `.N.backup.tmp`
//! 2. fsync the temporary file
//! 3. Rename it over `N.backup`
//! 4. fsync the parent directory
//!
//! Either the previous or the new backup is visible after a crash, never a
//! truncated one.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use burrow_core::{remaining_secs, CacheValue, SetItem, SnapshotEntry, Store};
use tracing::{debug, warn};

use crate::paths::CachePaths;

/// The backup file of one cache.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    dir: PathBuf,
    path: PathBuf,
    tmp_path: PathBuf,
}

impl SnapshotFile {
    /// Backup file for the given layout.
    pub fn new(paths: &CachePaths) -> Self {
        SnapshotFile {
            dir: paths.dir().to_path_buf(),
            path: paths.backup(),
            tmp_path: paths.backup_tmp(),
        }
    }

    /// Backup file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole backup.
    pub fn read(&self) -> io::Result<Vec<u8>> {
        fs::read(&self.path)
    }

    /// Atomically replace the backup with `bytes`.
    pub fn write(&self, bytes: &[u8]) -> io::Result<()> {
        let result = self.write_tmp_and_rename(bytes);
        if result.is_err() {
            // Never leave a half-written temp file behind
            let _ = fs::remove_file(&self.tmp_path);
        }
        result
    }

    fn write_tmp_and_rename(&self, bytes: &[u8]) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&self.tmp_path, &self.path)?;
        sync_dir(&self.dir)
    }

    /// Remove a temporary file left behind by a crash mid-checkpoint.
    ///
    /// Returns whether one was found.
    pub fn cleanup_temp_file(&self) -> io::Result<bool> {
        match fs::remove_file(&self.tmp_path) {
            Ok(()) => {
                warn!(path = %self.tmp_path.display(), "Removed stale snapshot temp file");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

/// Enumerate every live key of `store` with its value and absolute expiry.
///
/// Keys that vanish between enumeration and lookup (expired or deleted
/// concurrently) are left out.
pub fn capture<V, S>(store: &S) -> Vec<SnapshotEntry<V>>
where
    V: CacheValue,
    S: Store<V> + ?Sized,
{
    let keys = store.keys();
    let mut entries = Vec::with_capacity(keys.len());
    for key in keys {
        let (Some(val), Some(expires_at)) = (store.get(&key), store.get_ttl(&key)) else {
            continue;
        };
        entries.push(SnapshotEntry {
            key,
            val,
            expires_at,
        });
    }
    entries
}

/// Outcome of loading snapshot entries into a store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    /// Entries handed to the store
    pub loaded: usize,
    /// Entries dropped because their expiry had already passed
    pub expired: usize,
}

/// Bulk-load snapshot entries, preserving each entry's remaining TTL.
pub fn load<V, S>(store: &S, entries: Vec<SnapshotEntry<V>>, now_ms: u64) -> LoadStats
where
    V: CacheValue,
    S: Store<V> + ?Sized,
{
    let mut stats = LoadStats::default();
    let mut items = Vec::with_capacity(entries.len());
    for entry in entries {
        let ttl = if entry.expires_at == 0 {
            0
        } else {
            match remaining_secs(entry.expires_at, now_ms) {
                Some(secs) => secs,
                None => {
                    stats.expired += 1;
                    continue;
                }
            }
        };
        items.push(SetItem::new(entry.key, entry.val).with_ttl(ttl));
    }

    stats.loaded = items.len();
    if !items.is_empty() && !store.mset(items) {
        warn!(entries = stats.loaded, "Store refused part of the snapshot");
    }
    debug!(loaded = stats.loaded, expired = stats.expired, "Snapshot loaded");
    stats
}

//! Recovery: rebuild store state from the backup and the journal.
//!
//! ## Recovery Sequence
//!
//! 1. Remove any temporary backup left by an interrupted checkpoint
//! 2. Read `N.backup` and `N.append`; if either is missing, recreate both
//!    empty and report a fresh start
//! 3. Decode the backup and bulk-load every unexpired entry
//! 4. Split the journal into records and apply each one in file order,
//!    skipping records that fail to decode
//!
//! An unreadable file (anything other than "not found") or a backup that
//! cannot be decoded fails recovery; the cache must not open on top of it.

use std::fs::{self, File};
use std::io;

use burrow_core::{now_millis, CacheError, CacheValue, Result, Store};
use tracing::{info, warn};

use crate::codec::CacheSerializer;
use crate::paths::CachePaths;
use crate::snapshot::{self, SnapshotFile};

/// Statistics from a recovery that found existing files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryStats {
    /// Snapshot entries loaded into the store
    pub snapshot_loaded: usize,
    /// Snapshot entries skipped because they had expired
    pub snapshot_expired: usize,
    /// Journal records found
    pub records_read: usize,
    /// Journal records applied to the store
    pub records_applied: usize,
    /// Journal records skipped because they failed to decode
    pub records_skipped: usize,
    /// Size of the journal file in bytes
    pub journal_bytes: usize,
}

impl RecoveryStats {
    /// True if the journal held anything to replay.
    pub fn has_journal(&self) -> bool {
        self.journal_bytes > 0
    }

    /// Check if any records were skipped
    pub fn has_skipped(&self) -> bool {
        self.records_skipped > 0
    }
}

/// How a cache came up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// No prior state; both files were created empty
    Fresh,
    /// State was rebuilt from existing files
    Recovered(RecoveryStats),
}

impl RecoveryOutcome {
    /// Recovery statistics, if files were replayed.
    pub fn stats(&self) -> Option<&RecoveryStats> {
        match self {
            RecoveryOutcome::Fresh => None,
            RecoveryOutcome::Recovered(stats) => Some(stats),
        }
    }
}

/// Rebuild `store` from the files at `paths`.
pub fn recover<V, S>(
    store: &S,
    paths: &CachePaths,
    serializer: &dyn CacheSerializer<V>,
) -> Result<RecoveryOutcome>
where
    V: CacheValue,
    S: Store<V> + ?Sized,
{
    let backup_file = SnapshotFile::new(paths);
    backup_file.cleanup_temp_file()?;

    let backup = read_optional(backup_file.path())?;
    let journal = read_optional(&paths.journal())?;

    let (backup, journal) = match (backup, journal) {
        (Some(backup), Some(journal)) => (backup, journal),
        (backup, journal) => {
            if backup.is_some() || journal.is_some() {
                warn!(
                    cache = paths.name(),
                    backup_found = backup.is_some(),
                    journal_found = journal.is_some(),
                    "Incomplete persisted state, starting fresh"
                );
            }
            create_empty(paths)?;
            info!(cache = paths.name(), dir = %paths.dir().display(), "Created empty cache files");
            return Ok(RecoveryOutcome::Fresh);
        }
    };

    let mut stats = RecoveryStats {
        journal_bytes: journal.len(),
        ..RecoveryStats::default()
    };

    if !backup.iter().all(u8::is_ascii_whitespace) {
        let entries = serializer.deserialize_snapshot(&backup).map_err(|e| {
            CacheError::corruption(format!(
                "backup {} could not be decoded: {}",
                backup_file.path().display(),
                e
            ))
        })?;
        let loaded = snapshot::load(store, entries, now_millis());
        stats.snapshot_loaded = loaded.loaded;
        stats.snapshot_expired = loaded.expired;
    }

    for (index, bytes) in serializer.split_records(&journal).into_iter().enumerate() {
        stats.records_read += 1;
        match serializer.deserialize_record(bytes) {
            Ok(record) => {
                record.apply(store);
                stats.records_applied += 1;
            }
            Err(e) => {
                warn!(cache = paths.name(), record = index, error = %e, "Skipping malformed journal record");
                stats.records_skipped += 1;
            }
        }
    }

    info!(
        cache = paths.name(),
        snapshot_loaded = stats.snapshot_loaded,
        snapshot_expired = stats.snapshot_expired,
        records_applied = stats.records_applied,
        records_skipped = stats.records_skipped,
        "Recovery complete"
    );
    Ok(RecoveryOutcome::Recovered(stats))
}

fn read_optional(path: &std::path::Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(CacheError::Io(e)),
    }
}

fn create_empty(paths: &CachePaths) -> Result<()> {
    fs::create_dir_all(paths.dir())?;
    File::create(paths.backup())?;
    File::create(paths.journal())?;
    Ok(())
}

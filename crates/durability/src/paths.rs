//! Cache file layout
//!
//! A cache named `N` in directory `D` persists two files:
//!
//! ```text
//! D/
//! ├── N.backup        # last snapshot, replaced wholesale on checkpoint
//! ├── N.append        # journal of mutations since that snapshot
//! └── .N.backup.tmp   # in-flight snapshot (only during a checkpoint)
//! ```
//!
//! `D` defaults to the user's home directory.

use std::path::{Path, PathBuf};

use burrow_core::{CacheError, Result};

/// Backup file extension
pub const BACKUP_EXT: &str = "backup";

/// Journal file extension
pub const JOURNAL_EXT: &str = "append";

/// Paths of one cache's persisted state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePaths {
    dir: PathBuf,
    name: String,
}

impl CachePaths {
    /// Resolve the file layout for cache `name` in `dir`.
    ///
    /// An absent or empty `dir` resolves to the home directory. Trailing
    /// separators are dropped.
    pub fn new(dir: Option<&Path>, name: &str) -> Result<Self> {
        validate_name(name)?;
        let dir = match dir {
            Some(d) if !d.as_os_str().is_empty() => normalize_dir(d),
            _ => home_dir().ok_or_else(|| {
                CacheError::invalid_config("no directory given and home directory is unknown")
            })?,
        };
        Ok(CachePaths {
            dir,
            name: name.to_string(),
        })
    }

    /// Directory holding the files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Cache name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `D/N.backup`
    pub fn backup(&self) -> PathBuf {
        self.dir.join(format!("{}.{}", self.name, BACKUP_EXT))
    }

    /// `D/N.append`
    pub fn journal(&self) -> PathBuf {
        self.dir.join(format!("{}.{}", self.name, JOURNAL_EXT))
    }

    /// `D/.N.backup.tmp`
    pub fn backup_tmp(&self) -> PathBuf {
        self.dir.join(format!(".{}.{}.tmp", self.name, BACKUP_EXT))
    }
}

/// Check that a cache name can be used as a file stem.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(CacheError::invalid_config("cache name must not be empty"));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(CacheError::invalid_config(format!(
            "cache name '{}' must not contain path separators",
            name
        )));
    }
    if name == "." || name == ".." {
        return Err(CacheError::invalid_config(format!(
            "cache name '{}' is reserved",
            name
        )));
    }
    Ok(())
}

fn normalize_dir(dir: &Path) -> PathBuf {
    // Collecting components drops trailing separators and `.` segments
    let normalized: PathBuf = dir.components().collect();
    if normalized.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        normalized
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .filter(|h| !h.is_empty())
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_names() {
        let paths = CachePaths::new(Some(Path::new("/tmp/cache")), "c1").unwrap();
        assert_eq!(paths.backup(), PathBuf::from("/tmp/cache/c1.backup"));
        assert_eq!(paths.journal(), PathBuf::from("/tmp/cache/c1.append"));
        assert_eq!(paths.backup_tmp(), PathBuf::from("/tmp/cache/.c1.backup.tmp"));
        assert_eq!(paths.name(), "c1");
    }

    #[test]
    fn test_trailing_separator_normalized() {
        let a = CachePaths::new(Some(Path::new("/tmp/cache/")), "c1").unwrap();
        let b = CachePaths::new(Some(Path::new("/tmp/cache")), "c1").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.dir(), Path::new("/tmp/cache"));
    }

    #[test]
    fn test_empty_dir_means_home() {
        if home_dir().is_none() {
            return;
        }
        let paths = CachePaths::new(Some(Path::new("")), "c1").unwrap();
        assert_eq!(Some(paths.dir().to_path_buf()), home_dir());
        let paths = CachePaths::new(None, "c1").unwrap();
        assert_eq!(Some(paths.dir().to_path_buf()), home_dir());
    }

    #[test]
    fn test_invalid_names() {
        for name in ["", "a/b", "a\\b", ".", ".."] {
            let err = CachePaths::new(Some(Path::new("/tmp")), name).unwrap_err();
            assert!(matches!(err, CacheError::InvalidConfig(_)), "{:?}", name);
        }
    }
}

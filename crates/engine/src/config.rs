//! Cache configuration
//!
//! Built in code with the `with_*` setters or loaded from a TOML file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use burrow_core::{CacheError, Result};
use burrow_durability::{paths::validate_name, CachePaths, JournalSync};
use burrow_storage::StoreOptions;

/// Codec ids accepted by `codec`.
pub const KNOWN_CODECS: &[&str] = &["json", "json-base64", "msgpack"];

/// Configuration of one durable cache.
///
/// # Example
///
/// ```toml
/// name = "sessions"
/// # Checkpoint period in milliseconds (default 1000)
/// checkpoint_period_ms = 1000
/// # Directory for sessions.backup / sessions.append (default: home directory)
/// dir = "/var/lib/app"
/// # "none" (default) or "always" (fsync every journal append)
/// journal_sync = "none"
/// # "json" (default), "json-base64" or "msgpack"
/// codec = "json"
///
/// [store]
/// std_ttl_secs = 1800
/// check_period_secs = 900
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache name; determines the file names
    pub name: String,
    /// Interval between checkpoints in milliseconds
    #[serde(default = "default_checkpoint_period_ms")]
    pub checkpoint_period_ms: u64,
    /// Storage directory (absent or empty = home directory)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    /// Journal fsync policy
    #[serde(default)]
    pub journal_sync: JournalSync,
    /// Serializer codec id
    #[serde(default = "default_codec")]
    pub codec: String,
    /// Options handed to the store untouched
    #[serde(default)]
    pub store: StoreOptions,
}

fn default_checkpoint_period_ms() -> u64 {
    1000
}

fn default_codec() -> String {
    "json".to_string()
}

impl CacheConfig {
    /// Configuration with defaults for everything but the name.
    pub fn new(name: impl Into<String>) -> Self {
        CacheConfig {
            name: name.into(),
            checkpoint_period_ms: default_checkpoint_period_ms(),
            dir: None,
            journal_sync: JournalSync::default(),
            codec: default_codec(),
            store: StoreOptions::default(),
        }
    }

    /// Set the checkpoint period (builder pattern).
    pub fn with_period(mut self, period: Duration) -> Self {
        self.checkpoint_period_ms = period.as_millis() as u64;
        self
    }

    /// Set the storage directory (builder pattern).
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    /// Set the store options (builder pattern).
    pub fn with_store(mut self, store: StoreOptions) -> Self {
        self.store = store;
        self
    }

    /// Set the journal fsync policy (builder pattern).
    pub fn with_journal_sync(mut self, sync: JournalSync) -> Self {
        self.journal_sync = sync;
        self
    }

    /// Set the codec id (builder pattern).
    pub fn with_codec(mut self, codec: impl Into<String>) -> Self {
        self.codec = codec.into();
        self
    }

    /// Checkpoint period as a `Duration`.
    pub fn checkpoint_period(&self) -> Duration {
        Duration::from_millis(self.checkpoint_period_ms)
    }

    /// Resolve the backup and journal paths.
    pub fn paths(&self) -> Result<CachePaths> {
        CachePaths::new(self.dir.as_deref(), &self.name)
    }

    /// Check every field.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::InvalidConfig` for an unusable name, a zero
    /// period or an unknown codec.
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;
        if self.checkpoint_period_ms == 0 {
            return Err(CacheError::invalid_config(
                "checkpoint_period_ms must be greater than zero",
            ));
        }
        if !KNOWN_CODECS.contains(&self.codec.as_str()) {
            return Err(CacheError::invalid_config(format!(
                "Invalid codec '{}'. Expected one of {:?}.",
                self.codec, KNOWN_CODECS
            )));
        }
        Ok(())
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: CacheConfig = toml::from_str(content)
            .map_err(|e| CacheError::invalid_config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CacheError::invalid_config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            CacheError::InvalidConfig(msg) => {
                CacheError::InvalidConfig(format!("{} ({})", msg, path.display()))
            }
            other => other,
        })
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| CacheError::invalid_config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::new("c1");
        assert_eq!(config.checkpoint_period(), Duration::from_millis(1000));
        assert_eq!(config.codec, "json");
        assert_eq!(config.journal_sync, JournalSync::Never);
        assert!(config.dir.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_builder() {
        let config = CacheConfig::new("c1")
            .with_period(Duration::from_millis(250))
            .with_dir("/tmp/x/")
            .with_codec("msgpack")
            .with_journal_sync(JournalSync::Always)
            .with_store(StoreOptions::new().with_std_ttl(5));
        assert_eq!(config.checkpoint_period_ms, 250);
        assert_eq!(config.store.std_ttl_secs, 5);
        assert_eq!(config.paths().unwrap().journal(), PathBuf::from("/tmp/x/c1.append"));
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config = CacheConfig::from_toml_str("name = \"mycache\"").unwrap();
        assert_eq!(config, CacheConfig::new("mycache"));
    }

    #[test]
    fn test_parse_full_toml() {
        let toml = r#"
name = "sessions"
checkpoint_period_ms = 10000
dir = "/var/lib/app"
journal_sync = "always"
codec = "json-base64"

[store]
std_ttl_secs = 1800
check_period_secs = 900
"#;
        let config = CacheConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.name, "sessions");
        assert_eq!(config.checkpoint_period_ms, 10000);
        assert_eq!(config.dir, Some(PathBuf::from("/var/lib/app")));
        assert_eq!(config.journal_sync, JournalSync::Always);
        assert_eq!(config.codec, "json-base64");
        assert_eq!(config.store.std_ttl_secs, 1800);
        assert_eq!(config.store.check_period_secs, 900);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(CacheConfig::from_toml_str("name = \"\"").is_err());
        assert!(CacheConfig::from_toml_str("name = \"a/b\"").is_err());
        assert!(CacheConfig::from_toml_str("name = \"a\"\ncheckpoint_period_ms = 0").is_err());
        assert!(CacheConfig::from_toml_str("name = \"a\"\ncodec = \"yaml\"").is_err());
        assert!(CacheConfig::from_toml_str("name = \"a\"\njournal_sync = \"sometimes\"").is_err());
        assert!(CacheConfig::from_toml_str("checkpoint_period_ms = 5").is_err());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("burrow.toml");
        let config = CacheConfig::new("c1")
            .with_dir(dir.path())
            .with_codec("msgpack");
        config.write_to_file(&path).unwrap();
        assert_eq!(CacheConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = CacheConfig::from_file(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, CacheError::InvalidConfig(msg) if msg.contains("nope.toml")));
    }
}

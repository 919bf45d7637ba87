//! Integration tests for journal replay
//!
//! These tests verify that recovery:
//! 1. Reproduces the state a store reaches by applying the same records directly
//! 2. Loads the backup before replaying the journal
//! 3. Works identically for every built-in codec

use std::sync::Arc;

use burrow_core::{KeySelector, LogRecord, SetItem, SnapshotEntry, Store};
use burrow_durability::{
    recover, serializer_for, CachePaths, CacheSerializer, Journal, JournalSync, RecoveryOutcome,
    SnapshotFile,
};
use burrow_storage::{MemoryStore, StoreOptions};
use proptest::prelude::*;
use serde_json::{json, Value};
use tempfile::TempDir;

fn new_store() -> MemoryStore<Value> {
    MemoryStore::new(StoreOptions::new().with_check_period(0))
}

fn sorted_state(store: &MemoryStore<Value>) -> Vec<(String, Value)> {
    let mut keys = store.keys();
    keys.sort();
    keys.into_iter()
        .filter_map(|k| store.get(&k).map(|v| (k, v)))
        .collect()
}

/// Write `records` through a real journal so the file is produced the same
/// way a running cache produces it.
fn write_journal(paths: &CachePaths, codec: Arc<dyn CacheSerializer<Value>>, records: &[LogRecord<Value>]) {
    let journal = Journal::open(paths.name(), paths.journal(), codec, JournalSync::Never).unwrap();
    for record in records {
        journal.append(record);
    }
    journal.close();
}

fn sample_records() -> Vec<LogRecord<Value>> {
    vec![
        LogRecord::Set {
            key: "john".into(),
            val: json!("doe"),
            ttl: None,
        },
        LogRecord::Set {
            key: "alice".into(),
            val: json!("bob"),
            ttl: None,
        },
        LogRecord::delete_one("alice"),
        LogRecord::MultiSet {
            entries: vec![
                SetItem::new("abc", json!("xyz")),
                SetItem::new("cat", json!("dog")).with_ttl(10),
            ],
        },
        LogRecord::SetTtl {
            key: "john".into(),
            ttl: Some(0),
        },
    ]
}

// ============================================================================
// Recovery vs direct application
// ============================================================================

#[test]
fn test_recovery_matches_direct_application() {
    for codec_id in ["json", "json-base64", "msgpack"] {
        let dir = TempDir::new().unwrap();
        let paths = CachePaths::new(Some(dir.path()), "replay").unwrap();
        let codec: Arc<dyn CacheSerializer<Value>> = Arc::from(serializer_for::<Value>(codec_id).unwrap());

        std::fs::write(paths.backup(), b"").unwrap();
        write_journal(&paths, Arc::clone(&codec), &sample_records());

        let recovered = new_store();
        let outcome = recover(&recovered, &paths, codec.as_ref()).unwrap();
        let stats = outcome.stats().unwrap().clone();
        assert_eq!(stats.records_applied, 5, "codec {}", codec_id);
        assert_eq!(stats.records_skipped, 0, "codec {}", codec_id);

        let direct = new_store();
        for record in sample_records() {
            record.apply(&direct);
        }
        assert_eq!(sorted_state(&recovered), sorted_state(&direct), "codec {}", codec_id);
        assert_eq!(recovered.get_ttl("john"), Some(0));
        assert!(recovered.get_ttl("cat").unwrap() > 0);
    }
}

#[test]
fn test_journal_applies_on_top_of_backup() {
    let dir = TempDir::new().unwrap();
    let paths = CachePaths::new(Some(dir.path()), "layered").unwrap();
    let codec: Arc<dyn CacheSerializer<Value>> = Arc::from(serializer_for::<Value>("json").unwrap());

    let backup = codec
        .serialize_snapshot(&[
            SnapshotEntry {
                key: "a".to_string(),
                val: json!("old"),
                expires_at: 0,
            },
            SnapshotEntry {
                key: "b".to_string(),
                val: json!("kept"),
                expires_at: 0,
            },
        ])
        .unwrap();
    SnapshotFile::new(&paths).write(&backup).unwrap();
    write_journal(
        &paths,
        Arc::clone(&codec),
        &[
            LogRecord::Set {
                key: "a".into(),
                val: json!("new"),
                ttl: None,
            },
            LogRecord::Delete {
                key: KeySelector::Many(vec!["b".into(), "missing".into()]),
            },
        ],
    );

    let store = new_store();
    let outcome = recover(&store, &paths, codec.as_ref()).unwrap();
    assert!(matches!(outcome, RecoveryOutcome::Recovered(ref s) if s.snapshot_loaded == 2));
    assert_eq!(sorted_state(&store), vec![("a".to_string(), json!("new"))]);
}

#[test]
fn test_recovery_does_not_rewrite_files() {
    let dir = TempDir::new().unwrap();
    let paths = CachePaths::new(Some(dir.path()), "ro").unwrap();
    let codec: Arc<dyn CacheSerializer<Value>> = Arc::from(serializer_for::<Value>("json").unwrap());
    std::fs::write(paths.backup(), b"[{\"key\":\"foo\",\"val\":\"bar\",\"ttl\":0}]\n").unwrap();
    write_journal(&paths, Arc::clone(&codec), &sample_records());
    let journal_before = std::fs::read(paths.journal()).unwrap();

    recover(&new_store(), &paths, codec.as_ref()).unwrap();

    assert_eq!(std::fs::read(paths.journal()).unwrap(), journal_before);
    assert_eq!(
        std::fs::read(paths.backup()).unwrap(),
        b"[{\"key\":\"foo\",\"val\":\"bar\",\"ttl\":0}]\n"
    );
}

// ============================================================================
// Property: replay is equivalent to direct application
// ============================================================================

fn arb_record() -> impl Strategy<Value = LogRecord<Value>> {
    let key = "[a-e]";
    prop_oneof![
        (key, any::<i32>()).prop_map(|(k, v)| LogRecord::Set {
            key: k,
            val: json!(v),
            ttl: None,
        }),
        proptest::collection::vec((key, any::<i32>()), 0..4).prop_map(|pairs| {
            LogRecord::MultiSet {
                entries: pairs
                    .into_iter()
                    .map(|(k, v)| SetItem::new(k, json!(v)))
                    .collect(),
            }
        }),
        key.prop_map(LogRecord::delete_one),
        proptest::collection::vec(key, 0..3).prop_map(|keys| LogRecord::Delete {
            key: KeySelector::Many(keys),
        }),
        key.prop_map(|k| LogRecord::SetTtl {
            key: k,
            ttl: Some(0),
        }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_recover_equals_direct_apply(records in proptest::collection::vec(arb_record(), 0..24)) {
        let dir = TempDir::new().unwrap();
        let paths = CachePaths::new(Some(dir.path()), "prop").unwrap();
        let codec: Arc<dyn CacheSerializer<Value>> = Arc::from(serializer_for::<Value>("json").unwrap());
        std::fs::write(paths.backup(), b"").unwrap();
        std::fs::write(paths.journal(), b"").unwrap();
        write_journal(&paths, Arc::clone(&codec), &records);

        let recovered = new_store();
        recover(&recovered, &paths, codec.as_ref()).unwrap();

        let direct = new_store();
        for record in records {
            record.apply(&direct);
        }
        prop_assert_eq!(sorted_state(&recovered), sorted_state(&direct));
    }
}

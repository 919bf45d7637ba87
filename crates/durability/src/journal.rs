//! Append-only journal of mutations since the last checkpoint.
//!
//! The file handle lives on a dedicated writer thread. `append` encodes
//! the record on the caller's thread and hands the bytes to the writer over
//! a channel, so mutations never wait for disk I/O. Channel order is call
//! order; the writer performs no batching or reordering.
//!
//! `truncate` and `sync` travel through the same channel, so they observe
//! every append enqueued before them.
//!
//! Write failures never reach the caller of `append`. They are logged and
//! counted in [`JournalCounters`].

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use burrow_core::{CacheError, CacheValue, LogRecord, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::codec::CacheSerializer;

/// When the journal forces appended bytes to stable storage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalSync {
    /// Leave flushing to the OS (process-crash consistency only)
    #[default]
    #[serde(rename = "none")]
    Never,
    /// `sync_data` after every append
    Always,
}

impl JournalSync {
    /// True when every append is followed by `sync_data`.
    pub fn requires_immediate_fsync(&self) -> bool {
        matches!(self, JournalSync::Always)
    }
}

/// Cumulative journal counters.
///
/// These accumulate over the lifetime of the journal and are never reset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JournalCounters {
    /// Records written to the file
    pub appends: u64,
    /// Total bytes written to the file
    pub bytes_written: u64,
    /// Records lost to encode, open or write errors
    pub append_failures: u64,
    /// Completed truncations
    pub truncations: u64,
    /// `sync_data` calls
    pub sync_calls: u64,
}

#[derive(Debug, Default)]
struct CounterCells {
    appends: AtomicU64,
    bytes_written: AtomicU64,
    append_failures: AtomicU64,
    truncations: AtomicU64,
    sync_calls: AtomicU64,
}

impl CounterCells {
    fn snapshot(&self) -> JournalCounters {
        JournalCounters {
            appends: self.appends.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            append_failures: self.append_failures.load(Ordering::Relaxed),
            truncations: self.truncations.load(Ordering::Relaxed),
            sync_calls: self.sync_calls.load(Ordering::Relaxed),
        }
    }
}

enum Command {
    Append(Vec<u8>),
    Truncate(Sender<io::Result<()>>),
    Sync(Sender<()>),
}

/// Journal for one cache instance.
pub struct Journal<V> {
    name: String,
    path: PathBuf,
    serializer: Arc<dyn CacheSerializer<V>>,
    sender: Mutex<Option<Sender<Command>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    dirty: AtomicBool,
    counters: Arc<CounterCells>,
}

impl<V: CacheValue> Journal<V> {
    /// Start the writer thread for the journal at `path`.
    ///
    /// The file itself is opened lazily on the first write.
    pub fn open(
        name: &str,
        path: impl Into<PathBuf>,
        serializer: Arc<dyn CacheSerializer<V>>,
        sync: JournalSync,
    ) -> Result<Self> {
        let path = path.into();
        let counters = Arc::new(CounterCells::default());
        let (tx, rx) = mpsc::channel();

        let writer = Writer {
            name: name.to_string(),
            path: path.clone(),
            file: None,
            sync,
            counters: Arc::clone(&counters),
        };
        let worker = thread::Builder::new()
            .name(format!("burrow-journal-{}", name))
            .spawn(move || writer.run(rx))
            .map_err(CacheError::Io)?;

        Ok(Journal {
            name: name.to_string(),
            path,
            serializer,
            sender: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            dirty: AtomicBool::new(false),
            counters,
        })
    }

    /// Journal file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Encode `record` and queue it for writing. Marks the journal dirty.
    ///
    /// Returns as soon as the bytes are queued.
    pub fn append(&self, record: &LogRecord<V>) {
        let bytes = match self.serializer.serialize_record(record) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(cache = %self.name, cmd = record.cmd(), error = %e, "Failed to encode journal record");
                self.counters.append_failures.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        if self.send(Command::Append(bytes)) {
            self.dirty.store(true, Ordering::Release);
        } else {
            warn!(cache = %self.name, cmd = record.cmd(), "Journal closed, record dropped");
            self.counters.append_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Empty the journal file once every queued append has been written.
    ///
    /// Blocks until the writer acknowledges.
    pub fn truncate(&self) -> Result<()> {
        let (ack_tx, ack_rx) = mpsc::channel();
        if !self.send(Command::Truncate(ack_tx)) {
            return Err(CacheError::Closed(self.name.clone()));
        }
        match ack_rx.recv() {
            Ok(result) => result.map_err(CacheError::Io),
            Err(_) => Err(CacheError::Closed(self.name.clone())),
        }
    }

    /// Wait until every queued append has been written and synced.
    pub fn sync(&self) {
        let (ack_tx, ack_rx) = mpsc::channel();
        if self.send(Command::Sync(ack_tx)) {
            let _ = ack_rx.recv();
        }
    }

    /// True if a record was queued since the last `clear_dirty`.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Force the dirty flag (after replaying a non-empty journal).
    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    /// Reset the dirty flag after a completed checkpoint.
    pub fn clear_dirty(&self) {
        self.dirty.store(false, Ordering::Release);
    }

    /// Snapshot of the cumulative counters.
    pub fn counters(&self) -> JournalCounters {
        self.counters.snapshot()
    }

    /// True once `close` has run.
    pub fn is_closed(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// Write out everything queued, release the file and stop the writer.
    pub fn close(&self) {
        // Dropping the sender ends the writer loop after the queue drains
        drop(self.sender.lock().take());
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                error!(cache = %self.name, "Journal writer thread panicked");
            }
        }
    }

    fn send(&self, command: Command) -> bool {
        match self.sender.lock().as_ref() {
            Some(tx) => tx.send(command).is_ok(),
            None => false,
        }
    }
}

impl<V> Drop for Journal<V> {
    fn drop(&mut self) {
        drop(self.sender.get_mut().take());
        if let Some(worker) = self.worker.get_mut().take() {
            let _ = worker.join();
        }
    }
}

/// State owned by the writer thread.
struct Writer {
    name: String,
    path: PathBuf,
    file: Option<File>,
    sync: JournalSync,
    counters: Arc<CounterCells>,
}

impl Writer {
    fn run(mut self, rx: Receiver<Command>) {
        for command in rx {
            match command {
                Command::Append(bytes) => self.write(&bytes),
                Command::Truncate(ack) => {
                    let result = self.truncate();
                    let _ = ack.send(result);
                }
                Command::Sync(ack) => {
                    self.sync_file();
                    let _ = ack.send(());
                }
            }
        }
        debug!(cache = %self.name, "Journal writer stopped");
    }

    fn handle(&mut self) -> io::Result<&mut File> {
        if self.file.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            self.file = Some(file);
        }
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "journal handle unavailable"))
    }

    fn write(&mut self, bytes: &[u8]) {
        let sync = self.sync;
        let result = self.handle().and_then(|file| {
            file.write_all(bytes)?;
            if sync.requires_immediate_fsync() {
                file.sync_data()?;
            }
            Ok(())
        });

        match result {
            Ok(()) => {
                self.counters.appends.fetch_add(1, Ordering::Relaxed);
                self.counters
                    .bytes_written
                    .fetch_add(bytes.len() as u64, Ordering::Relaxed);
                if sync.requires_immediate_fsync() {
                    self.counters.sync_calls.fetch_add(1, Ordering::Relaxed);
                }
            }
            Err(e) => {
                error!(cache = %self.name, path = %self.path.display(), error = %e, "Journal append failed");
                self.counters.append_failures.fetch_add(1, Ordering::Relaxed);
                // Reopen on the next append
                self.file = None;
            }
        }
    }

    fn truncate(&mut self) -> io::Result<()> {
        self.file = None;
        let file = File::create(&self.path)?;
        file.sync_all()?;
        self.counters.truncations.fetch_add(1, Ordering::Relaxed);
        debug!(cache = %self.name, "Journal truncated");
        Ok(())
    }

    fn sync_file(&mut self) {
        if let Some(file) = self.file.as_ref() {
            match file.sync_data() {
                Ok(()) => {
                    self.counters.sync_calls.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    warn!(cache = %self.name, error = %e, "Journal sync failed");
                }
            }
        }
    }
}

//! JSON-lines event store.
//!
//! Layout: `<root>/<book_id>/<aggregate_type>.jsonl`, one `StoredEvent` per
//! line, in sequence order. Files are only ever appended to.
//!
//! Appends hold an exclusive OS lock on `<aggregate_type>.lock` next to the
//! stream, so several processes can share one data directory. The current
//! version is read from disk under that lock.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use fs2::FileExt;

use splitledger_core::{BookId, ExpectedVersion};

use super::r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent, batch_stream};

/// Last known end of a stream file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StreamTail {
    len: u64,
    version: u64,
}

/// File-backed append-only event store.
#[derive(Debug)]
pub struct FileEventStore {
    root: PathBuf,
    /// Only trusted while the file length still matches.
    tails: Mutex<HashMap<(BookId, String), StreamTail>>,
}

/// Exclusive lock on one stream, released on drop.
struct StreamLock(File);

impl StreamLock {
    fn acquire(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        file.lock_exclusive()?;
        Ok(Self(file))
    }
}

impl Drop for StreamLock {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.0) {
            tracing::warn!(error = %err, "failed to release stream lock");
        }
    }
}

impl FileEventStore {
    /// Open (or create) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, EventStoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            tails: Mutex::new(HashMap::new()),
        })
    }

    fn stream_path(&self, book_id: BookId, aggregate_type: &str) -> PathBuf {
        self.root
            .join(book_id.to_string())
            .join(format!("{aggregate_type}.jsonl"))
    }

    fn lock_path(&self, book_id: BookId, aggregate_type: &str) -> PathBuf {
        self.root
            .join(book_id.to_string())
            .join(format!("{aggregate_type}.lock"))
    }

    fn read_stream(path: &Path, aggregate_type: &str) -> Result<Vec<StoredEvent>, EventStoreError> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e.into()),
        };

        let mut events = Vec::new();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let event: StoredEvent =
                serde_json::from_str(&line).map_err(|e| EventStoreError::Corrupt {
                    stream: aggregate_type.to_string(),
                    reason: format!("line {}: {e}", idx + 1),
                })?;
            events.push(event);
        }
        Ok(events)
    }

    /// Current end of the stream on disk. Must be called under the stream lock.
    fn current_tail(
        path: &Path,
        aggregate_type: &str,
        cached: Option<StreamTail>,
    ) -> Result<StreamTail, EventStoreError> {
        let len = match fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };

        match cached {
            Some(tail) if tail.len == len => Ok(tail),
            _ => {
                let version = Self::read_stream(path, aggregate_type)?
                    .last()
                    .map(|e| e.sequence_number)
                    .unwrap_or(0);
                Ok(StreamTail { len, version })
            }
        }
    }
}

/// Run `write` against `file`, which currently ends at `len`. On failure the
/// file is cut back to `len` so no partial batch is left behind.
fn write_or_truncate(
    file: &mut File,
    len: u64,
    write: impl FnOnce(&mut File) -> io::Result<()>,
) -> io::Result<()> {
    write(file).inspect_err(|_| {
        if let Err(err) = file.set_len(len) {
            tracing::error!(error = %err, len, "failed to roll back partial append");
        }
    })
}

impl EventStore for FileEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        if events.is_empty() {
            return Ok(vec![]);
        }

        let (book_id, aggregate_type) = batch_stream(&events)?;
        let path = self.stream_path(book_id, &aggregate_type);
        let key = (book_id, aggregate_type.clone());

        let mut tails = self.tails.lock().map_err(|_| EventStoreError::Poisoned)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let _lock = StreamLock::acquire(&self.lock_path(book_id, &aggregate_type))?;

        let tail = Self::current_tail(&path, &aggregate_type, tails.get(&key).copied())?;
        if !expected_version.matches(tail.version) {
            tails.insert(key, tail);
            return Err(EventStoreError::Concurrency(format!(
                "expected {expected_version:?}, found {}",
                tail.version
            )));
        }

        let committed: Vec<StoredEvent> = events
            .into_iter()
            .zip(tail.version + 1..)
            .map(|(e, seq)| e.into_stored(seq))
            .collect();

        // Serialize the whole batch before touching the file.
        let mut buf = Vec::new();
        for stored in &committed {
            serde_json::to_writer(&mut buf, stored)?;
            buf.push(b'\n');
        }

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        write_or_truncate(&mut file, tail.len, |f| {
            f.write_all(&buf)?;
            f.flush()
        })?;

        let last = committed.last().map(|e| e.sequence_number).unwrap_or(tail.version);
        tails.insert(
            key,
            StreamTail {
                len: tail.len + buf.len() as u64,
                version: last,
            },
        );
        tracing::debug!(
            stream = %aggregate_type,
            book = %book_id,
            last_sequence = last,
            "appended events to file store"
        );

        Ok(committed)
    }

    fn load_stream(
        &self,
        book_id: BookId,
        aggregate_type: &str,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let path = self.stream_path(book_id, aggregate_type);
        Self::read_stream(&path, aggregate_type)
    }
}

//! Local persistence of chat state and failure-resilient writing.
//!
//! Defines the [`KeyValueStore`] trait the core saves through, two
//! implementations ([`InMemoryStore`] for tests and [`FileStore`] for real
//! runs), and [`Persistence`], which wraps any store so that neither reads
//! nor writes can take the client down.
//!
//! # Write failures
//!
//! If `KeyValueStore::set()` fails (disk full, permissions, ...):
//! 1. The error is logged (never crashes the application).
//! 2. The in-memory state stays authoritative.
//! 3. The serialized snapshot is kept as a pending write for that key.
//! 4. A later successful save of the same key supersedes the pending one;
//!    [`Persistence::flush_pending`] retries whatever is left.
//!
//! # Layout
//!
//! | Key                          | Value                          |
//! |------------------------------|--------------------------------|
//! | `chatMessages`               | conversation key → message log |
//! | `unreadMessages_{identity}`  | peer → unread count            |
//! | `{identity}-chatUsers`       | added peers                    |

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Key under which the global message store is saved.
pub const MESSAGES_KEY: &str = "chatMessages";

/// Key under which `identity`'s unread counters are saved.
#[must_use]
pub fn unread_key(identity: &str) -> String {
    format!("unreadMessages_{identity}")
}

/// Key under which `identity`'s added peers are saved.
#[must_use]
pub fn roster_key(identity: &str) -> String {
    format!("{identity}-chatUsers")
}

/// Errors that can occur during persistence operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading a stored value failed.
    #[error("read of `{key}` failed: {source}")]
    ReadFailed {
        /// The key being read.
        key: String,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// Writing a value failed.
    #[error("write of `{key}` failed: {source}")]
    WriteFailed {
        /// The key being written.
        key: String,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// A value could not be serialized.
    #[error("encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Durable string key-value storage.
///
/// Implementations include:
/// - [`InMemoryStore`]: process-local, for tests
/// - [`FileStore`]: one file per key under a data directory
pub trait KeyValueStore: Send {
    /// Fetch the value stored under `key`, or `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ReadFailed`] if the backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::WriteFailed`] if the value was not persisted.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// In-memory implementation of [`KeyValueStore`] for testing.
///
/// This store is not persistent; all data is lost when it is dropped.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl InMemoryStore {
    /// Create a new, empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.lock().len()
    }

    /// `true` if nothing has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.lock().is_empty()
    }
}

impl KeyValueStore for InMemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values.lock().insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

/// Stores each key as a JSON file in a directory.
///
/// File names are the key with every byte outside `[A-Za-z0-9_-]`
/// percent-escaped, plus a `.json` suffix. Writes go to a temporary sibling
/// first and are renamed into place, so a crash never leaves a torn file.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::WriteFailed`] if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| StoreError::WriteFailed {
            key: dir.display().to_string(),
            source,
        })?;
        Ok(Self { dir })
    }

    /// Directory holding the stored files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", escape_key(key)))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::ReadFailed {
                key: key.to_owned(),
                source,
            }),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        let write = || -> io::Result<()> {
            let mut file = std::fs::File::create(&tmp)?;
            file.write_all(value.as_bytes())?;
            file.sync_all()?;
            std::fs::rename(&tmp, &path)
        };
        write().map_err(|source| StoreError::WriteFailed {
            key: key.to_owned(),
            source,
        })
    }
}

fn escape_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            out.push(char::from(byte));
        } else {
            let _ = write!(out, "%{byte:02X}");
        }
    }
    out
}

/// Wraps a [`KeyValueStore`] to handle read and write failures gracefully.
///
/// Reads of absent or malformed values yield `T::default()`. Failed writes
/// are logged via `tracing::warn!` and remembered per key until a later
/// save or [`flush_pending`](Self::flush_pending) succeeds.
#[derive(Debug)]
pub struct Persistence<S: KeyValueStore> {
    store: S,
    pending: BTreeMap<String, String>,
}

impl<S: KeyValueStore> Persistence<S> {
    /// Wrap `store`.
    pub const fn new(store: S) -> Self {
        Self {
            store,
            pending: BTreeMap::new(),
        }
    }

    /// Access the underlying store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Unwrap the underlying store, discarding pending writes.
    pub fn into_store(self) -> S {
        self.store
    }

    /// Load the value under `key`, falling back to `T::default()` when it
    /// is absent, unreadable or malformed.
    pub fn load<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        let raw = match self.store.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return T::default(),
            Err(err) => {
                tracing::warn!(key, error = %err, "persistence read failed, starting empty");
                return T::default();
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|err| {
            tracing::warn!(key, error = %err, "persisted value is malformed, starting empty");
            T::default()
        })
    }

    /// Serialize and store `value` under `key`.
    ///
    /// Returns `true` if the write reached the store. On failure the
    /// snapshot is kept as the pending write for `key`.
    pub fn save<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> bool {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(key, error = %err, "could not encode state for persistence");
                return false;
            }
        };
        match self.store.set(key, &raw) {
            Ok(()) => {
                self.pending.remove(key);
                true
            }
            Err(err) => {
                tracing::warn!(key, error = %err, "persistence write failed, keeping state in memory");
                self.pending.insert(key.to_owned(), raw);
                false
            }
        }
    }

    /// Retry every pending write. Returns the number that succeeded.
    pub fn flush_pending(&mut self) -> usize {
        let writes = std::mem::take(&mut self.pending);
        let total = writes.len();
        let mut succeeded = 0;

        for (key, raw) in writes {
            if self.store.set(&key, &raw).is_ok() {
                succeeded += 1;
            } else {
                self.pending.insert(key, raw);
            }
        }

        if succeeded > 0 {
            tracing::info!(
                succeeded,
                remaining = total - succeeded,
                "flushed pending persistence writes"
            );
        }
        succeeded
    }

    /// Number of keys whose latest snapshot has not been persisted.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

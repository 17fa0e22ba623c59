//! Durable key/value settings for the topwin workspace.
//!
//! The store contract is deliberately small: synchronous `get`/`set` over
//! JSON values, with `set` durable on return (a caller may crash immediately
//! afterwards and still find the value on restart). There are no transactions
//! across keys; callers that write two related keys accept that a crash
//! between the writes can leave them inconsistent.
//!
//! Two implementations are provided:
//! - [`JsonStore`]: a single JSON file, rewritten atomically on every `set`.
//! - [`MemoryStore`]: in-process only, for tests and ephemeral use.

use std::{
    env, fs,
    io::Write,
    path::{Path, PathBuf},
};

use parking_lot::Mutex;
use serde_json::{Map, Value};
use thiserror::Error;

/// Result alias for settings operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the settings store.
#[derive(Debug, Error)]
pub enum Error {
    /// Reading or writing the backing file failed.
    #[error("settings I/O error at {path:?}: {source}")]
    Io {
        /// Path of the backing file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The backing file exists but is not a JSON object.
    #[error("settings file {path:?} is not a JSON object")]
    Malformed {
        /// Path of the backing file.
        path: PathBuf,
    },

    /// Serializing the settings map failed.
    #[error("settings serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Synchronous durable key/value store.
///
/// `get` returns `None` for unknown keys; callers supply their own defaults.
/// `set` must not return until the value would survive a process crash.
pub trait Store: Send + Sync {
    /// Read the value for `key`, if present.
    fn get(&self, key: &str) -> Option<Value>;

    /// Write `value` under `key`, durably.
    fn set(&self, key: &str, value: Value) -> Result<()>;
}

/// Default settings path (`~/.topwin/settings.json`).
pub fn default_settings_path() -> PathBuf {
    let mut p = PathBuf::from(env::var_os("HOME").unwrap_or_default());
    p.push(".topwin");
    p.push("settings.json");
    p
}

/// File-backed store: one JSON object, rewritten atomically on every `set`.
///
/// Durability comes from writing a temporary file in the same directory and
/// renaming it over the target, so a reader never observes a torn file.
pub struct JsonStore {
    /// Path of the backing JSON file.
    path: PathBuf,
    /// In-memory copy of the backing object; the file is the source of truth
    /// at startup, this map is authoritative afterwards (single process).
    map: Mutex<Map<String, Value>>,
}

impl JsonStore {
    /// Open or create a store at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let map = match fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<Value>(&bytes) {
                Ok(Value::Object(map)) => map,
                Ok(_) => return Err(Error::Malformed { path }),
                Err(e) => {
                    // A corrupt file is replaced on the next set; losing the
                    // toggles here only resets them to defaults.
                    tracing::warn!(path = %path.display(), error = %e, "unreadable settings file, starting empty");
                    Map::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(source) => return Err(Error::Io { path, source }),
        };
        Ok(Self {
            path,
            map: Mutex::new(map),
        })
    }

    /// Write the current map to disk via temp file + rename.
    fn flush(&self, map: &Map<String, Value>) -> Result<()> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(|source| Error::Io {
            path: self.path.clone(),
            source,
        })?;
        let bytes = serde_json::to_vec_pretty(&Value::Object(map.clone()))?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|source| Error::Io {
            path: self.path.clone(),
            source,
        })?;
        tmp.write_all(&bytes).map_err(|source| Error::Io {
            path: self.path.clone(),
            source,
        })?;
        // Durable-on-return: flush to the device before the rename, so the
        // value survives power loss, not just a process crash.
        tmp.as_file().sync_all().map_err(|source| Error::Io {
            path: self.path.clone(),
            source,
        })?;
        tmp.persist(&self.path).map_err(|e| Error::Io {
            path: self.path.clone(),
            source: e.error,
        })?;
        Ok(())
    }
}

impl Store for JsonStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.map.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut map = self.map.lock();
        let prior = map.insert(key.to_string(), value);
        match self.flush(&map) {
            Ok(()) => Ok(()),
            Err(e) => {
                // Roll back so reads keep matching what is on disk.
                match prior {
                    Some(v) => {
                        map.insert(key.to_string(), v);
                    }
                    None => {
                        map.remove(key);
                    }
                }
                Err(e)
            }
        }
    }
}

/// In-memory store for tests; nothing survives the process.
#[derive(Default)]
pub struct MemoryStore {
    /// Backing map.
    map: Mutex<Map<String, Value>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.map.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        self.map.lock().insert(key.to_string(), value);
        Ok(())
    }
}

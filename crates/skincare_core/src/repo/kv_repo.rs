//! Durable key-value store contract and implementations.
//!
//! # Responsibility
//! - Persist opaque string values under string keys across restarts.
//! - Allow several sessions to share one backing store.
//!
//! # Invariants
//! - `write` replaces the whole value for a key (no partial updates).
//! - Implementations never interpret stored values.

use crate::db::{open_db, open_db_in_memory, DbError};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::sync::{Arc, Mutex};

pub type KvResult<T> = Result<T, KvError>;

/// Key-value storage failure.
#[derive(Debug)]
pub enum KvError {
    /// Backing storage cannot be reached in the current context.
    Unavailable(String),
    Db(DbError),
}

impl Display for KvError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(reason) => write!(f, "key-value store unavailable: {reason}"),
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for KvError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Unavailable(_) => None,
            Self::Db(err) => Some(err),
        }
    }
}

impl From<DbError> for KvError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for KvError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Persistent string storage addressed by key.
pub trait KeyValueStore: Send {
    fn read(&self, key: &str) -> KvResult<Option<String>>;
    fn write(&self, key: &str, value: &str) -> KvResult<()>;
}

/// SQLite-backed key-value store.
///
/// Two instances opened on the same file behave like two sessions sharing
/// one durable store.
pub struct SqliteKeyValueStore {
    conn: Connection,
}

impl SqliteKeyValueStore {
    /// Opens the store file, creating it and its schema when missing.
    pub fn open(path: impl AsRef<Path>) -> KvResult<Self> {
        Ok(Self {
            conn: open_db(path)?,
        })
    }

    pub fn open_in_memory() -> KvResult<Self> {
        Ok(Self {
            conn: open_db_in_memory()?,
        })
    }

    /// Wraps an already migrated connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }
}

impl KeyValueStore for SqliteKeyValueStore {
    fn read(&self, key: &str) -> KvResult<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM kv_entries WHERE key = ?1;",
                [key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn write(&self, key: &str, value: &str) -> KvResult<()> {
        self.conn.execute(
            "INSERT INTO kv_entries (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![key, value],
        )?;
        Ok(())
    }
}

/// Process-local key-value store.
///
/// Clones share the same map, so clones model sessions sharing storage. The
/// store can be switched to an unavailable state to model contexts without
/// durable storage.
#[derive(Clone, Default)]
pub struct MemoryKeyValueStore {
    inner: Arc<Mutex<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    values: HashMap<String, String>,
    unavailable: bool,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose every call fails with `KvError::Unavailable`.
    pub fn unavailable() -> Self {
        let store = Self::default();
        store.set_available(false);
        store
    }

    pub fn set_available(&self, available: bool) {
        self.lock().unavailable = !available;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        // A poisoned map still holds consistent string values.
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn read(&self, key: &str) -> KvResult<Option<String>> {
        let state = self.lock();
        if state.unavailable {
            return Err(KvError::Unavailable("memory store disabled".to_string()));
        }
        Ok(state.values.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> KvResult<()> {
        let mut state = self.lock();
        if state.unavailable {
            return Err(KvError::Unavailable("memory store disabled".to_string()));
        }
        state.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

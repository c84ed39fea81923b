use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use super::Database;

/// Byte-oriented key/value persistence used by the template catalog and the
/// results ledger.
pub trait KeyValueStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn save(&self, key: &str, bytes: Vec<u8>) -> Result<()>;
}

impl KeyValueStore for Database {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let key = key.to_string();
        self.execute(move |conn| {
            conn.query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()
            .with_context(|| format!("failed to load '{key}'"))
        })
    }

    /// Enqueued on the DB thread; returns once queued.
    fn save(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let key = key.to_string();
        self.submit("kv save", move |conn| {
            conn.execute(
                "INSERT INTO kv_store (key, value, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                     value = excluded.value,
                     updated_at = excluded.updated_at",
                params![key, bytes, Utc::now().to_rfc3339()],
            )
            .with_context(|| format!("failed to save '{key}'"))?;
            Ok(())
        })
    }
}

/// In-process store. Clones share the same map.
#[derive(Clone, Default)]
pub struct MemoryStore {
    values: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let guard = self
            .values
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        Ok(guard.get(key).cloned())
    }

    fn save(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let mut guard = self
            .values
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        guard.insert(key.to_string(), bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_clones_share_values() {
        let store = MemoryStore::new();
        let other = store.clone();
        store.save("signs", b"[]".to_vec()).unwrap();
        assert_eq!(other.load("signs").unwrap(), Some(b"[]".to_vec()));
        assert_eq!(other.load("missing").unwrap(), None);
    }

    #[test]
    fn database_round_trips_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("nested").join("test.sqlite3")).unwrap();

        assert_eq!(db.load("signs").unwrap(), None);
        db.save("signs", b"first".to_vec()).unwrap();
        db.save("signs", b"second".to_vec()).unwrap();
        // Loads queue behind earlier saves on the DB thread.
        assert_eq!(db.load("signs").unwrap(), Some(b"second".to_vec()));
    }

    #[test]
    fn dropping_database_flushes_pending_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flush.sqlite3");
        {
            let db = Database::new(path.clone()).unwrap();
            db.save("testResults", b"[1]".to_vec()).unwrap();
        }
        let reopened = Database::new(path).unwrap();
        assert_eq!(reopened.load("testResults").unwrap(), Some(b"[1]".to_vec()));
    }
}

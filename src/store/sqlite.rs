//! SQLite-backed weekly state store.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Error, Result};
use crate::week::WeekKey;

use super::StateStore;

/// How long a write waits for a lock held by another connection.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Durable store, one row per week. Old weeks are never cleaned up.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| Error::Store(format!("sqlite open {}: {}", path.display(), e)))?;
        Self::init(conn)
    }

    /// Database that lives as long as the store.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Store(format!("sqlite open: {}", e)))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        // Another process may hold the write lock briefly.
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| Error::Store(format!("sqlite busy timeout: {}", e)))?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS weekly_state (
                week_key TEXT PRIMARY KEY,
                state TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )
        .map_err(|e| Error::Store(format!("sqlite init: {}", e)))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Store("sqlite connection mutex poisoned".to_string()))
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[async_trait]
impl StateStore for SqliteStore {
    async fn get(&self, key: &WeekKey) -> Result<Option<String>> {
        self.conn()?
            .query_row(
                "SELECT state FROM weekly_state WHERE week_key = ?1",
                params![key.to_string()],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(|e| Error::Store(format!("sqlite read {}: {}", key, e)))
    }

    async fn set(&self, key: &WeekKey, value: &str) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT INTO weekly_state (week_key, state, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(week_key) DO UPDATE SET state = excluded.state, updated_at = excluded.updated_at",
                params![key.to_string(), value, now_millis()],
            )
            .map_err(|e| Error::Store(format!("sqlite write {}: {}", key, e)))?;
        Ok(())
    }

    async fn compare_and_set(
        &self,
        key: &WeekKey,
        expected: Option<&str>,
        value: &str,
    ) -> Result<bool> {
        let conn = self.conn()?;
        let changed = match expected {
            None => conn.execute(
                "INSERT OR IGNORE INTO weekly_state (week_key, state, updated_at) VALUES (?1, ?2, ?3)",
                params![key.to_string(), value, now_millis()],
            ),
            Some(expected) => conn.execute(
                "UPDATE weekly_state SET state = ?2, updated_at = ?3 WHERE week_key = ?1 AND state = ?4",
                params![key.to_string(), value, now_millis(), expected],
            ),
        }
        .map_err(|e| Error::Store(format!("sqlite conditional write {}: {}", key, e)))?;

        Ok(changed == 1)
    }

    async fn compare_and_delete(&self, key: &WeekKey, expected: &str) -> Result<bool> {
        let removed = self
            .conn()?
            .execute(
                "DELETE FROM weekly_state WHERE week_key = ?1 AND state = ?2",
                params![key.to_string(), expected],
            )
            .map_err(|e| Error::Store(format!("sqlite conditional delete {}: {}", key, e)))?;
        Ok(removed == 1)
    }

    async fn delete(&self, key: &WeekKey) -> Result<bool> {
        let removed = self
            .conn()?
            .execute(
                "DELETE FROM weekly_state WHERE week_key = ?1",
                params![key.to_string()],
            )
            .map_err(|e| Error::Store(format!("sqlite delete {}: {}", key, e)))?;
        Ok(removed > 0)
    }
}

//! `SQLite` database connection used as the local key-value substrate.
//!
//! The database is stored at `~/.campus-market/campus-market.db`.

use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::config::Paths;
use crate::error::MarketError;

use super::migrations;
use super::KeyValueStore;

/// Database connection wrapper.
///
/// The connection sits behind a mutex so the handle can be shared with the
/// background drain task.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open the database at the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrations fail.
    pub fn open() -> Result<Self, MarketError> {
        let paths = Paths::new()?;
        paths.ensure_dirs()?;
        Self::open_at(&paths.database)
    }

    /// Open the database at a specific path, creating it if necessary.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrations fail.
    pub fn open_at(path: &std::path::Path) -> Result<Self, MarketError> {
        let conn = Connection::open(path).map_err(|e| {
            MarketError::Database(format!("Failed to open database {}: {e}", path.display()))
        })?;

        Self::from_connection(conn)
    }

    /// Open an in-memory database.
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, MarketError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            MarketError::Database(format!("Failed to open in-memory database: {e}"))
        })?;

        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, MarketError> {
        // Let a concurrent writer (another CLI invocation) finish instead of failing fast
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .map_err(|e| MarketError::Database(format!("Failed to set busy timeout: {e}")))?;

        migrations::run(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    #[cfg(test)]
    pub fn schema_version(&self) -> Result<i32, MarketError> {
        migrations::get_version(&*self.lock()?)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, MarketError> {
        self.conn
            .lock()
            .map_err(|_| MarketError::Database("Database connection lock poisoned".to_string()))
    }
}

impl KeyValueStore for Database {
    fn get(&self, key: &str) -> Result<Option<String>, MarketError> {
        let conn = self.lock()?;

        conn.query_row("SELECT value FROM kv_store WHERE key = ?1", [key], |row| {
            row.get(0)
        })
        .optional()
        .map_err(|e| MarketError::Database(format!("Failed to read key {key}: {e}")))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), MarketError> {
        let conn = self.lock()?;

        conn.execute(
            r"INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
              ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, Utc::now().to_rfc3339()],
        )
        .map_err(|e| MarketError::Database(format!("Failed to write key {key}: {e}")))?;

        Ok(())
    }
}

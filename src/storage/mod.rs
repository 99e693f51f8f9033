//! Storage layer for campus-market.
//!
//! Persisted client state is a set of string blobs under fixed keys. The
//! offline queue is one such blob. [`Database`] keeps them in `SQLite`;
//! [`MemoryStore`] keeps them in process memory.

mod database;
mod migrations;

use std::collections::HashMap;
use std::sync::Mutex;

pub use database::Database;

use crate::error::MarketError;

/// A local, near-synchronous key-value store scoped to this device.
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the substrate cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, MarketError>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the substrate cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), MarketError>;
}

/// In-memory [`KeyValueStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, MarketError> {
        let values = self
            .values
            .lock()
            .map_err(|_| MarketError::Database("Memory store lock poisoned".to_string()))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), MarketError> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| MarketError::Database("Memory store lock poisoned".to_string()))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

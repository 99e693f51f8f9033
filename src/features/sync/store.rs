//! Durable, ordered storage of pending mutations.
//!
//! The whole queue is one JSON array kept under a fixed key in a
//! [`KeyValueStore`]. Every write goes straight to the substrate.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};
use uuid::Uuid;

use super::mutation::QueuedMutation;
use crate::error::MarketError;
use crate::storage::KeyValueStore;

const EMPTY_QUEUE: &str = "[]";

/// Persisted FIFO of [`QueuedMutation`]s.
///
/// Read-modify-write cycles are serialized by an internal lock, so a
/// producer appending while the drainer commits cannot lose an entry within
/// one `QueueStore`. Separate instances over the same substrate are not
/// coordinated.
pub struct QueueStore {
    kv: Arc<dyn KeyValueStore>,
    key: String,
    write_lock: Mutex<()>,
}

impl QueueStore {
    /// Create a store over `kv` and make sure the key holds a valid list.
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        let store = Self {
            kv,
            key: key.into(),
            write_lock: Mutex::new(()),
        };
        if let Err(e) = store.initialize() {
            warn!(key = %store.key, error = %e, "queue_initialize_failed");
        }
        store
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Ensure the key holds a valid (possibly empty) serialized list.
    ///
    /// Safe to call any number of times. A corrupt blob is reset to empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the substrate cannot be read or written.
    pub fn initialize(&self) -> Result<(), MarketError> {
        let _guard = self.lock();

        match self.kv.get(&self.key)? {
            None => self.kv.set(&self.key, EMPTY_QUEUE),
            Some(raw) => match serde_json::from_str::<Vec<QueuedMutation>>(&raw) {
                Ok(_) => Ok(()),
                Err(e) => {
                    warn!(key = %self.key, error = %e, "queue_corrupt_resetting");
                    self.kv.set(&self.key, EMPTY_QUEUE)
                },
            },
        }
    }

    /// Add a mutation to the end of the queue and persist immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the substrate cannot be written.
    pub fn append(&self, mutation: QueuedMutation) -> Result<(), MarketError> {
        let _guard = self.lock();

        let mut queue = self.load()?;
        queue.push(mutation);
        self.store(&queue)?;

        debug!(key = %self.key, len = queue.len(), "queue_appended");
        Ok(())
    }

    /// Current queue in insertion order.
    ///
    /// Never fails: an unreadable substrate reads as empty, and a corrupt
    /// blob is reset to empty.
    #[must_use]
    pub fn read_all(&self) -> Vec<QueuedMutation> {
        let _guard = self.lock();

        match self.load() {
            Ok(queue) => queue,
            Err(e) => {
                warn!(key = %self.key, error = %e, "queue_read_failed");
                Vec::new()
            },
        }
    }

    /// Overwrite the persisted queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the substrate cannot be written.
    pub fn replace_all(&self, mutations: &[QueuedMutation]) -> Result<(), MarketError> {
        let _guard = self.lock();
        self.store(mutations)
    }

    /// Remove the entries a drain pass applied.
    ///
    /// Entries are matched by id against the *current* queue, so anything
    /// appended during the pass survives, and an entry discarded during the
    /// pass does not stop the ones after it from being removed. Applied ids
    /// no longer present are skipped.
    ///
    /// Returns the number of entries left in the queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the substrate cannot be written.
    pub fn commit_applied(&self, applied: &[QueuedMutation]) -> Result<usize, MarketError> {
        let _guard = self.lock();

        let done: HashSet<Uuid> = applied.iter().map(|entry| entry.id).collect();
        let current = self.load()?;
        let before = current.len();
        let remaining: Vec<_> = current
            .into_iter()
            .filter(|entry| !done.contains(&entry.id))
            .collect();

        let removed = before - remaining.len();
        if removed < done.len() {
            warn!(
                key = %self.key,
                applied = done.len(),
                removed,
                "queue_commit_missing_entries"
            );
        }

        self.store(&remaining)?;
        Ok(remaining.len())
    }

    /// Drop the entry at `index` (explicit discard by the host).
    ///
    /// # Errors
    ///
    /// Returns `MarketError::NotFound` if there is no entry at `index`.
    pub fn discard(&self, index: usize) -> Result<QueuedMutation, MarketError> {
        let _guard = self.lock();

        let mut queue = self.load()?;
        if index >= queue.len() {
            return Err(MarketError::NotFound(format!("Queue entry {index}")));
        }
        let removed = queue.remove(index);
        self.store(&queue)?;
        Ok(removed)
    }

    /// Drop every entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the substrate cannot be written.
    pub fn clear(&self) -> Result<usize, MarketError> {
        let _guard = self.lock();

        let count = self.load()?.len();
        self.kv.set(&self.key, EMPTY_QUEUE)?;
        Ok(count)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read_all().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        // The guarded data is `()`, so a poisoned lock carries no broken state
        self.write_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Caller must hold the write lock.
    fn load(&self) -> Result<Vec<QueuedMutation>, MarketError> {
        let Some(raw) = self.kv.get(&self.key)? else {
            return Ok(Vec::new());
        };

        match serde_json::from_str(&raw) {
            Ok(queue) => Ok(queue),
            Err(e) => {
                warn!(key = %self.key, error = %e, "queue_corrupt_resetting");
                self.kv.set(&self.key, EMPTY_QUEUE)?;
                Ok(Vec::new())
            },
        }
    }

    /// Caller must hold the write lock.
    fn store(&self, queue: &[QueuedMutation]) -> Result<(), MarketError> {
        let raw = serde_json::to_string(queue)?;
        self.kv.set(&self.key, &raw)
    }
}

use std::collections::HashMap;
use std::sync::RwLock;

use thiserror::Error;

/// MemEntry is the per-key bookkeeping held in memory: which data file owns
/// the current value, where the value bytes start, how long they are, and
/// when they were written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemEntry {
    pub file_id: u32,
    pub value_offset: i64,
    pub value_size: u32,
    pub timestamp: u32,
}

/// The directory's lock was poisoned by a thread that panicked while holding
/// it. Surfaced as an error so callers decide how to fail instead of
/// cascading the panic.
#[derive(Debug, Error)]
#[error("key directory lock is poisoned")]
pub struct Poisoned;

/// In-memory map from key bytes to the location of the key's live value.
///
/// The lock lives inside each instance, so several databases can coexist in
/// one process without contending on shared state. Readers never block each
/// other; a single writer at a time replaces entries.
#[derive(Debug, Default)]
pub struct KeyDir {
    entries: RwLock<HashMap<Vec<u8>, MemEntry>>,
}

impl KeyDir {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the entry for `key`, if any.
    pub fn get(&self, key: &[u8]) -> Result<Option<MemEntry>, Poisoned> {
        let entries = self.entries.read().map_err(|_| Poisoned)?;
        Ok(entries.get(key).copied())
    }

    /// Inserts or replaces the entry for `key`.
    ///
    /// Tombstone records are inserted like any other write; deletion is
    /// observed on read, not erased from the directory.
    pub fn put(&self, key: Vec<u8>, entry: MemEntry) -> Result<(), Poisoned> {
        let mut entries = self.entries.write().map_err(|_| Poisoned)?;
        entries.insert(key, entry);
        Ok(())
    }

    /// Removes the entry for `key` outright.
    ///
    /// User-facing deletes do not come through here; they append a tombstone
    /// record so the deletion is durable through the log. This exists for the
    /// merge path, which drops superseded keys wholesale.
    pub fn delete(&self, key: &[u8]) -> Result<(), Poisoned> {
        let mut entries = self.entries.write().map_err(|_| Poisoned)?;
        entries.remove(key);
        Ok(())
    }

    pub fn len(&self) -> Result<usize, Poisoned> {
        let entries = self.entries.read().map_err(|_| Poisoned)?;
        Ok(entries.len())
    }

    pub fn is_empty(&self) -> Result<bool, Poisoned> {
        let entries = self.entries.read().map_err(|_| Poisoned)?;
        Ok(entries.is_empty())
    }
}

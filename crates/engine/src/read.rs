/// Read path: `get()`.
///
/// Point lookups resolve through the key directory to a `(file_id, offset,
/// size)` span, then read the value positionally from the owning segment.
/// A value of exactly the tombstone byte reports the key as absent.
use crate::{poisoned, Database, Error, Result, TOMBSTONE};

impl Database {
    /// Looks up a key, returning `Ok(None)` when it was never written or was
    /// deleted. The two cases are indistinguishable to callers.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure, on a short value read, or when the
    /// directory references a segment the database does not know about.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let files = self.files.read().map_err(|_| poisoned())?;

        let Some(entry) = self.key_dir.get(key)? else {
            return Ok(None);
        };

        let segment = if entry.file_id == files.active.id() {
            &files.active
        } else {
            files
                .sealed
                .get(entry.file_id)
                .ok_or(Error::UnknownFileId(entry.file_id))?
        };

        let value = segment.read_at(entry.value_offset, entry.value_size)?;

        if value == TOMBSTONE {
            return Ok(None);
        }

        Ok(Some(value))
    }
}

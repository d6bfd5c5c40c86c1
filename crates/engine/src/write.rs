/// Write path: `put()`, `delete()`, and log rotation.
///
/// All mutations flow through this module under the database write lock.
/// Each put appends a framed record to the active data file, appends the
/// companion hint entry, and then points the key directory at the new value
/// span. Deletes are puts of the tombstone value, so they ride the same
/// durability path as any other write.
use log::debug;

use crate::{poisoned, Database, Files, Result, TOMBSTONE};
use datafile::Datafile;

impl Database {
    /// Inserts or overwrites a key-value pair.
    ///
    /// If the active file has grown past `max_datafile_size`, it is sealed
    /// and a fresh active file takes its place before the record is written.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut files = self.files.write().map_err(|_| poisoned())?;

        if files.active.offset() > self.options.max_datafile_size {
            self.rotate(&mut files)?;
        }

        let entry = files.active.write(key, value)?;
        self.key_dir.put(key.to_vec(), entry)?;

        Ok(())
    }

    /// Deletes a key by appending a tombstone record.
    ///
    /// The key stays in the directory, pointing at the tombstone; reads
    /// observe the deletion, and a future merge reclaims the space.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        self.put(key, TOMBSTONE)
    }

    /// Seals the current active file and installs a fresh one.
    ///
    /// The sealed segment is reopened read-only and joins the sealed map
    /// under its old id. Ids are bumped past every id the database knows so
    /// that two rotations within one wall-clock second stay distinct.
    fn rotate(&self, files: &mut Files) -> Result<()> {
        let old_id = files.active.id();
        let old_path = files.active.path().to_path_buf();

        let fresh = Datafile::create_with_id(&self.directory, self.next_file_id(files))?;
        let new_id = fresh.id();

        let old = std::mem::replace(&mut files.active, fresh);
        old.close()?;

        let sealed = Datafile::open_readonly(&old_path)?;
        files.sealed.insert(sealed);

        debug!("rotated data file {} -> {}", old_id, new_id);
        Ok(())
    }

    /// Picks an id for the next active file: the current wall clock, bumped
    /// past the active id and any sealed id it would collide with.
    fn next_file_id(&self, files: &Files) -> u32 {
        let mut id = datafile::now_unix_seconds();
        if id <= files.active.id() {
            id = files.active.id() + 1;
        }
        while files.sealed.contains(id) {
            id += 1;
        }
        id
    }
}

//! # Engine: the DriftKV database
//!
//! The central orchestrator tying together the [`datafile`], [`hint`], and
//! [`keydir`] crates into a log-structured key-value store.
//!
//! ## Architecture
//!
//! ```text
//! Client
//!   |
//!   v
//! ┌─────────────────────────────────────────────────┐
//! │                   DATABASE                      │
//! │                                                 │
//! │ write.rs → rotate if active too large           │
//! │             → append record + hint entry        │
//! │             → key directory update              │
//! │                                                 │
//! │ read.rs  → key directory lookup                 │
//! │             → resolve active / sealed segment   │
//! │             → positional value read             │
//! │             → tombstone check                   │
//! │                                                 │
//! │ recovery.rs → open: discover .df segments,      │
//! │               replay .hnt streams, new active   │
//! │                                                 │
//! │ merge.rs → candidate selection (interface only) │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! ## On-disk state
//!
//! A database is a directory of `<id>.df` data files and `<id>.hnt` hint
//! files, nothing else: no manifest, no lockfile. Exactly one data file is
//! open for append (the *active* file); the rest are sealed read-only.
//!
//! ## Concurrency
//!
//! A database-level readers-writer lock guards the active file, the sealed
//! map, and rotation. `put`/`delete` serialize on the writer side; any number
//! of `get`s share the reader side, and value reads are positional so they
//! never race on a file cursor. The key directory carries its own lock and is
//! always acquired *after* the database lock when both are held.
//!
//! ## Durability
//!
//! A record is durable once its bytes are handed to the OS; there is no
//! per-record fsync. A crash may lose the tail of the log, and recovery drops
//! that tail because a partial frame cannot pass its CRC.

mod merge;
mod read;
mod recovery;
mod write;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::RwLock;

use datafile::{Datafile, DatafileError, SealedFiles};
use hint::HintError;
use keydir::KeyDir;
use thiserror::Error;

/// Default bound on the active data file before rotation: 512 MiB.
pub const DEFAULT_MAX_DATAFILE_SIZE: i64 = 512 * 1024 * 1024;

/// The single byte standing in for "deleted".
///
/// Deletes append an ordinary record carrying this value, so they are
/// durable through the log like any write. The flip side is that a stored
/// value of exactly one zero byte is indistinguishable from a deletion and
/// reads back as absent.
pub const TOMBSTONE: &[u8] = &[0x00];

/// Tunables accepted by [`Database::open`].
#[derive(Debug, Clone)]
pub struct Options {
    /// Once the active file's append position exceeds this, the next `put`
    /// rotates to a fresh segment.
    pub max_datafile_size: i64,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_datafile_size: DEFAULT_MAX_DATAFILE_SIZE,
        }
    }
}

/// Errors surfaced by database operations.
///
/// A missing key is not an error: `get` returns `Ok(None)` both for keys that
/// were never written and for keys whose current record is a tombstone.
#[derive(Debug, Error)]
pub enum Error {
    /// An underlying filesystem error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A record failed CRC validation or was truncated mid-stream.
    #[error("corrupt record")]
    Corrupt,

    /// Fewer bytes were available than a read required.
    #[error("short read of {expected} bytes at offset {offset}")]
    ShortRead { expected: usize, offset: i64 },

    /// Fewer bytes were written than a record or hint entry required.
    #[error("short write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },

    /// The key directory references a data file the database does not know
    /// about. An internal consistency violation, not a user error.
    #[error("key directory references unknown data file {0}")]
    UnknownFileId(u32),
}

impl From<DatafileError> for Error {
    fn from(e: DatafileError) -> Self {
        match e {
            DatafileError::Io(e) => Error::Io(e),
            DatafileError::Hint(e) => e.into(),
            DatafileError::Corrupt | DatafileError::NoFileId => Error::Corrupt,
            DatafileError::NotSealed(id) => Error::UnknownFileId(id),
            DatafileError::ShortWrite { written, expected } => {
                Error::ShortWrite { written, expected }
            }
            DatafileError::ShortRead { expected, offset } => {
                Error::ShortRead { expected, offset }
            }
            DatafileError::ReadOnly => Error::Io(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "data file is read-only",
            )),
        }
    }
}

impl From<HintError> for Error {
    fn from(e: HintError) -> Self {
        match e {
            HintError::Io(e) => Error::Io(e),
            HintError::ShortWrite { written, expected } => {
                Error::ShortWrite { written, expected }
            }
            HintError::Corrupt => Error::Corrupt,
        }
    }
}

impl From<keydir::Poisoned> for Error {
    fn from(e: keydir::Poisoned) -> Self {
        Error::Io(io::Error::other(e))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// The database-level lock was poisoned by a panicking writer. Reported as
/// an error so one crashed thread does not take every caller down with it.
pub(crate) fn poisoned() -> Error {
    Error::Io(io::Error::other("database lock is poisoned"))
}

/// Everything guarded by the database-level lock: the one writable segment
/// and the sealed read-only segments keyed by file id.
pub(crate) struct Files {
    pub(crate) active: Datafile,
    pub(crate) sealed: SealedFiles,
}

/// A log-structured key-value store over one directory.
///
/// # Write path
///
/// 1. Take the database write lock; rotate the active file if it has grown
///    past `max_datafile_size`.
/// 2. Append the framed record to the active file, then the companion hint
///    entry.
/// 3. Point the key directory at the new value span.
///
/// # Read path
///
/// 1. Take the database read lock and look the key up in the directory.
/// 2. Resolve the owning segment (active by id, otherwise sealed).
/// 3. Read the value span positionally; a tombstone reads as absent.
///
/// # Recovery
///
/// [`Database::open`] rebuilds the key directory from hint files alone, so
/// startup I/O scales with the number of keys, not the volume of data.
pub struct Database {
    directory: PathBuf,
    options: Options,
    files: RwLock<Files>,
    key_dir: KeyDir,
    /// Guards against two concurrent merge passes.
    merging: AtomicBool,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("Database");
        s.field("directory", &self.directory)
            .field("max_datafile_size", &self.options.max_datafile_size);
        // Debug cannot propagate a poisoned lock; show what is reachable.
        if let Ok(files) = self.files.read() {
            s.field("active_file_id", &files.active.id())
                .field("active_offset", &files.active.offset())
                .field("sealed_segments", &files.sealed.len());
        }
        if let Ok(keys) = self.key_dir.len() {
            s.field("keys", &keys);
        }
        s.finish()
    }
}

impl Database {
    /// The directory this database lives in.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Number of live directory entries. Tombstoned keys still count; the
    /// directory keeps them until a merge drops them.
    pub fn key_count(&self) -> Result<usize> {
        Ok(self.key_dir.len()?)
    }

    /// Number of sealed read-only segments.
    pub fn sealed_count(&self) -> Result<usize> {
        let files = self.files.read().map_err(|_| poisoned())?;
        Ok(files.sealed.len())
    }

    /// Id of the segment currently open for append.
    pub fn active_file_id(&self) -> Result<u32> {
        let files = self.files.read().map_err(|_| poisoned())?;
        Ok(files.active.id())
    }

    /// Hands the active segment's buffered bytes (data and hint) to stable
    /// storage. The engine never fsyncs per record; this is the explicit
    /// flush point.
    pub fn sync(&self) -> Result<()> {
        let mut files = self.files.write().map_err(|_| poisoned())?;
        files.active.sync_to_disk()?;
        Ok(())
    }

    /// Flushes the active segment and closes the database. Sealed segments
    /// drop with the database itself.
    pub fn close(self) -> Result<()> {
        self.sync()
    }
}

/// Best-effort flush on drop. Errors are swallowed because `Drop` cannot
/// propagate them; everything acknowledged is already past the write syscall.
impl Drop for Database {
    fn drop(&mut self) {
        if let Ok(mut files) = self.files.write() {
            let _ = files.active.sync_to_disk();
        }
    }
}

#[cfg(test)]
mod tests;

//! # Hint files: the startup index stream
//!
//! Every active data file has a sibling hint file receiving one entry per
//! appended record. On startup the engine replays hint files instead of the
//! (much larger) data files, so recovery I/O is proportional to the number of
//! keys rather than the volume of values.
//!
//! A hint entry is written with the layout from [`codec::encode_hint`]:
//!
//! ```text
//! [timestamp: u32 LE][key_size: u32 LE][value_size: u32 LE][value_offset: u64 LE][key]
//! ```
//!
//! `value_offset` is the absolute position of the value bytes in the data
//! file, so a replayed entry points a read directly at the value.
//!
//! Hint entries carry no CRC; a hint file that fails to parse is skipped by
//! the engine and the affected segment simply contributes nothing to the
//! rebuilt directory.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use keydir::{KeyDir, MemEntry};
use thiserror::Error;

/// Errors from hint-file writes and scans.
#[derive(Debug, Error)]
pub enum HintError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Fewer bytes were written than the entry required.
    #[error("short write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },

    /// A truncated entry mid-stream, or a stored offset that cannot be
    /// represented as a file position.
    #[error("corrupt hint entry")]
    Corrupt,
}

/// Append-only writer for the active data file's hint stream.
pub struct HintFile {
    file: File,
    path: PathBuf,
}

impl HintFile {
    /// Opens (or creates) `<directory>/<file_id>.hnt` for appending.
    pub fn create(directory: &Path, file_id: u32) -> Result<Self, HintError> {
        let path = directory.join(format!("{}.hnt", file_id));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;

        Ok(Self { file, path })
    }

    /// Appends one hint entry. `value_offset` must be the absolute position
    /// of the value bytes in the sibling data file.
    pub fn append(
        &mut self,
        timestamp: u32,
        value_size: u32,
        value_offset: i64,
        key: &[u8],
    ) -> Result<(), HintError> {
        let buf = codec::encode_hint(timestamp, value_size, value_offset as u64, key);

        // One write call so a low byte count is reported rather than retried;
        // the partial entry is dropped by the scanner on the next recovery.
        let written = self.file.write(&buf)?;
        if written != buf.len() {
            return Err(HintError::ShortWrite {
                written,
                expected: buf.len(),
            });
        }

        Ok(())
    }

    /// Hands any OS-buffered bytes to stable storage.
    pub fn sync_to_disk(&mut self) -> Result<(), HintError> {
        self.file.sync_all()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Lazy reader over a hint file, yielding one `(MemEntry, key)` pair per
/// entry. `file_id` is left at zero; the caller derives it from the file
/// name and stamps it, since the hint stream itself does not store it.
pub struct HintScanner {
    rdr: BufReader<File>,
}

impl HintScanner {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, HintError> {
        let file = File::open(path)?;
        Ok(Self {
            rdr: BufReader::new(file),
        })
    }

    /// Reads the fixed-size header, distinguishing clean EOF (no bytes at
    /// all) from a truncated entry (some but not enough).
    fn read_header(&mut self) -> Option<Result<codec::HintHeader, HintError>> {
        let mut header = [0u8; codec::HINT_HEADER_SIZE];
        let mut filled = 0;

        while filled < header.len() {
            match self.rdr.read(&mut header[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Some(Err(HintError::Io(e))),
            }
        }

        if filled == 0 {
            return None;
        }
        if filled < header.len() {
            return Some(Err(HintError::Corrupt));
        }

        match codec::decode_hint_header(&header) {
            Ok(h) => Some(Ok(h)),
            Err(_) => Some(Err(HintError::Corrupt)),
        }
    }
}

impl Iterator for HintScanner {
    type Item = Result<(MemEntry, Vec<u8>), HintError>;

    fn next(&mut self) -> Option<Self::Item> {
        let header = match self.read_header()? {
            Ok(h) => h,
            Err(e) => return Some(Err(e)),
        };

        // Hint offsets are stored as u64 but file positions are i64.
        if header.value_offset > i64::MAX as u64 {
            return Some(Err(HintError::Corrupt));
        }

        let mut key = vec![0u8; header.key_size as usize];
        if let Err(e) = self.rdr.read_exact(&mut key) {
            return Some(Err(match e.kind() {
                io::ErrorKind::UnexpectedEof => HintError::Corrupt,
                _ => HintError::Io(e),
            }));
        }

        let entry = MemEntry {
            file_id: 0,
            value_offset: header.value_offset as i64,
            value_size: header.value_size,
            timestamp: header.timestamp,
        };

        Some(Ok((entry, key)))
    }
}

/// Streams every entry of the hint file at `path` into `key_dir`, stamping
/// each with `file_id`. Returns the number of entries applied.
///
/// Within one file, later entries overwrite earlier ones, matching append
/// order in the sibling data file.
pub fn replay_into(path: &Path, file_id: u32, key_dir: &KeyDir) -> Result<usize, HintError> {
    let scanner = HintScanner::open(path)?;
    let mut applied = 0;

    for item in scanner {
        let (mut entry, key) = item?;
        entry.file_id = file_id;
        key_dir
            .put(key, entry)
            .map_err(|e| HintError::Io(io::Error::other(e)))?;
        applied += 1;
    }

    Ok(applied)
}

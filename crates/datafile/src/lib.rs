//! # Data files: append-only log segments
//!
//! A data file is one segment of the store's log: a plain concatenation of
//! record frames with no header, footer, or padding. Exactly one data file is
//! writable at a time (the *active* file); every other segment is sealed and
//! opened read-only.
//!
//! The active file owns a sibling hint file and appends one hint entry per
//! record, so startup can rebuild the key directory without reading values.
//!
//! Records are framed by [`codec::encode_record`]:
//!
//! ```text
//! [crc32][timestamp][key_size][value_size][key][value]
//! ```
//!
//! File names are `<file_id>.df`, where `file_id` is the Unix timestamp in
//! seconds at creation. The id is recovered from a path by taking the last
//! maximal digit run, since directory names may themselves contain digits.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use codec::Record;
use hint::{HintError, HintFile};
use keydir::MemEntry;
use thiserror::Error;

/// Errors from data-file operations.
#[derive(Debug, Error)]
pub enum DatafileError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The sibling hint file could not be written.
    #[error("hint file: {0}")]
    Hint(#[from] HintError),

    /// A record failed CRC validation or was truncated mid-stream.
    #[error("corrupt record")]
    Corrupt,

    /// Fewer bytes were written than the frame required.
    #[error("short write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },

    /// Fewer bytes were available than the read required.
    #[error("short read of {expected} bytes at offset {offset}")]
    ShortRead { expected: usize, offset: i64 },

    /// The file name contained no digit run to parse an id from.
    #[error("no file id in path")]
    NoFileId,

    /// A write was attempted on a sealed (read-only) data file.
    #[error("data file is read-only")]
    ReadOnly,

    /// The requested file id is not in the sealed set.
    #[error("file id {0} is not sealed")]
    NotSealed(u32),
}

impl From<codec::CodecError> for DatafileError {
    fn from(_: codec::CodecError) -> Self {
        DatafileError::Corrupt
    }
}

/// One log segment. Writable when created fresh (with a hint file attached),
/// read-only when reopened from disk.
pub struct Datafile {
    file: File,
    path: PathBuf,
    id: u32,
    /// Append position. For the active file this is also the file length.
    offset: i64,
    /// Present only while the file is active; sealed files keep the hint
    /// file they wrote on disk but no open handle to it.
    hint: Option<HintFile>,
}

/// Wall-clock seconds since the Unix epoch, the basis for file ids and
/// record timestamps.
pub fn now_unix_seconds() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as u32
}

/// Recovers a file id from a path by taking the last maximal digit run.
pub fn parse_file_id(path: &Path) -> Result<u32, DatafileError> {
    let s = path.to_string_lossy();

    let mut last_run: Option<(usize, usize)> = None;
    let mut run_start: Option<usize> = None;
    for (i, c) in s.char_indices() {
        if c.is_ascii_digit() {
            if run_start.is_none() {
                run_start = Some(i);
            }
        } else if let Some(start) = run_start.take() {
            last_run = Some((start, i));
        }
    }
    if let Some(start) = run_start {
        last_run = Some((start, s.len()));
    }

    let (start, end) = last_run.ok_or(DatafileError::NoFileId)?;
    s[start..end].parse::<u32>().map_err(|_| DatafileError::NoFileId)
}

impl Datafile {
    /// Creates a fresh writable data file with `file_id = now_unix_seconds()`
    /// and its sibling hint file.
    pub fn create(directory: &Path) -> Result<Self, DatafileError> {
        Self::create_with_id(directory, now_unix_seconds())
    }

    /// Creates a fresh writable data file under an explicit id. The engine
    /// uses this to disambiguate two rotations within the same wall-clock
    /// second.
    pub fn create_with_id(directory: &Path, id: u32) -> Result<Self, DatafileError> {
        let path = directory.join(format!("{}.df", id));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)?;

        let hint = HintFile::create(directory, id)?;

        Ok(Self {
            file,
            path,
            id,
            offset: 0,
            hint: Some(hint),
        })
    }

    /// Opens an existing `.df` segment read-only. The id comes from the file
    /// name; the hint slot stays empty because sealed files never append.
    pub fn open_readonly(path: &Path) -> Result<Self, DatafileError> {
        let file = File::open(path)?;
        let id = parse_file_id(path)?;
        let offset = file.metadata()?.len() as i64;

        Ok(Self {
            file,
            path: path.to_path_buf(),
            id,
            offset,
            hint: None,
        })
    }

    /// Appends a key-value record and its hint entry, returning the memory
    /// entry to install in the key directory.
    ///
    /// The hint entry is appended before the offset advances, so a crash
    /// between the two leaves at worst a hint entry whose record is the
    /// partially-written tail, which is dropped by CRC on the next recovery.
    pub fn write(&mut self, key: &[u8], value: &[u8]) -> Result<MemEntry, DatafileError> {
        let hint = self.hint.as_mut().ok_or(DatafileError::ReadOnly)?;

        let timestamp = now_unix_seconds();
        let frame = codec::encode_record(key, value, timestamp);

        // One write call; a low count is a failed put, and the partial frame
        // is invisible to recovery because its CRC cannot match. The cursor
        // still has to account for whatever landed, or every later value
        // offset in this segment would be off by the orphaned bytes.
        let written = self.file.write(&frame)?;
        if written != frame.len() {
            self.offset += written as i64;
            return Err(DatafileError::ShortWrite {
                written,
                expected: frame.len(),
            });
        }

        let value_offset = self.offset + codec::RECORD_HEADER_SIZE as i64 + key.len() as i64;
        let hint_result = hint.append(timestamp, value.len() as u32, value_offset, key);
        self.offset += frame.len() as i64;
        hint_result?;

        Ok(MemEntry {
            file_id: self.id,
            value_offset,
            value_size: value.len() as u32,
            timestamp,
        })
    }

    /// Reads exactly `length` bytes starting at `offset`.
    ///
    /// The read is positional, so concurrent readers of the same sealed file
    /// never race on a shared cursor.
    pub fn read_at(&self, offset: i64, length: u32) -> Result<Vec<u8>, DatafileError> {
        let mut buf = vec![0u8; length as usize];

        self.file
            .read_exact_at(&mut buf, offset as u64)
            .map_err(|e| match e.kind() {
                io::ErrorKind::UnexpectedEof => DatafileError::ShortRead {
                    expected: length as usize,
                    offset,
                },
                _ => DatafileError::Io(e),
            })?;

        Ok(buf)
    }

    /// Current append position; for the active file this equals the file
    /// length.
    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Hands any OS-buffered bytes of the data file and its hint file to
    /// stable storage.
    pub fn sync_to_disk(&mut self) -> Result<(), DatafileError> {
        self.file.sync_all()?;
        if let Some(hint) = self.hint.as_mut() {
            hint.sync_to_disk()?;
        }
        Ok(())
    }

    /// Flushes and closes the data handle and the hint handle (if any).
    pub fn close(mut self) -> Result<(), DatafileError> {
        self.sync_to_disk()?;
        Ok(())
    }

    /// Returns a scanner over this file's records, reading from a separate
    /// handle so the append cursor is untouched.
    pub fn scanner(&self) -> Result<DatafileScanner, DatafileError> {
        DatafileScanner::open(&self.path)
    }
}

/// The read-only segments of a database, keyed by file id.
///
/// Exists so segment retirement goes through one place: `remove` closes the
/// handle before forgetting the entry, which is what the merge rewrite will
/// call to drop a compacted-away segment. Callers provide their own locking;
/// the set itself is plain data.
#[derive(Default)]
pub struct SealedFiles {
    files: HashMap<u32, Datafile>,
}

impl SealedFiles {
    pub fn new() -> Self {
        Self {
            files: HashMap::new(),
        }
    }

    /// Adds a sealed segment, keyed by its own id. The segment should be
    /// read-only; a writable one would break the one-active-file rule.
    pub fn insert(&mut self, df: Datafile) {
        self.files.insert(df.id(), df);
    }

    pub fn get(&self, id: u32) -> Option<&Datafile> {
        self.files.get(&id)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.files.contains_key(&id)
    }

    /// Removes a segment from the set, closing its handle.
    pub fn remove(&mut self, id: u32) -> Result<(), DatafileError> {
        let df = self.files.remove(&id).ok_or(DatafileError::NotSealed(id))?;
        df.close()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Datafile> {
        self.files.values()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Lazily yields successive whole records of a data file, for recovery-style
/// inspection and tests.
///
/// Termination: EOF exactly at a frame boundary ends the iteration; a header
/// or body cut short mid-stream, or a CRC mismatch, yields
/// [`DatafileError::Corrupt`].
pub struct DatafileScanner {
    rdr: BufReader<File>,
}

impl DatafileScanner {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DatafileError> {
        let file = File::open(path)?;
        Ok(Self {
            rdr: BufReader::new(file),
        })
    }

    fn read_header(&mut self) -> Option<Result<[u8; codec::RECORD_HEADER_SIZE], DatafileError>> {
        let mut header = [0u8; codec::RECORD_HEADER_SIZE];
        let mut filled = 0;

        while filled < header.len() {
            match self.rdr.read(&mut header[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Some(Err(DatafileError::Io(e))),
            }
        }

        if filled == 0 {
            return None;
        }
        if filled < header.len() {
            return Some(Err(DatafileError::Corrupt));
        }

        Some(Ok(header))
    }

    fn read_body(&mut self, len: usize) -> Result<Vec<u8>, DatafileError> {
        let mut buf = vec![0u8; len];
        self.rdr.read_exact(&mut buf).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => DatafileError::Corrupt,
            _ => DatafileError::Io(e),
        })?;
        Ok(buf)
    }
}

impl Iterator for DatafileScanner {
    type Item = Result<Record, DatafileError>;

    fn next(&mut self) -> Option<Self::Item> {
        let header_bytes = match self.read_header()? {
            Ok(h) => h,
            Err(e) => return Some(Err(e)),
        };

        let header = match codec::decode_record_header(&header_bytes) {
            Ok(h) => h,
            Err(e) => return Some(Err(e.into())),
        };

        let body = match self.read_body(header.key_size as usize + header.value_size as usize) {
            Ok(b) => b,
            Err(e) => return Some(Err(e)),
        };

        // Reassemble the frame so the codec verifies the CRC the same way it
        // was computed on the write path.
        let mut frame = Vec::with_capacity(header_bytes.len() + body.len());
        frame.extend_from_slice(&header_bytes);
        frame.extend_from_slice(&body);

        match codec::decode_record(&frame) {
            Ok(record) => Some(Ok(record)),
            Err(e) => Some(Err(e.into())),
        }
    }
}

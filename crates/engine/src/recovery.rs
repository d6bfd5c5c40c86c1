/// Cold-start path: `Database::open`.
///
/// Recovery never reads a data file's record bodies. The key directory is
/// rebuilt entirely from hint files, so opening a database costs I/O
/// proportional to the hint bytes (one small entry per record) rather than
/// the data bytes.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::RwLock;

use log::{debug, info, warn};

use crate::{Database, Files, Options, Result};
use datafile::{Datafile, SealedFiles};
use keydir::KeyDir;

impl Database {
    /// Opens the database in `directory`, creating the directory if absent.
    ///
    /// # Recovery steps
    ///
    /// 1. Open every `*.df` file read-only into the sealed map.
    /// 2. Replay every `*.hnt` file into the key directory in ascending
    ///    file-id order, so entries from later segments overwrite earlier
    ///    ones. A hint file that cannot be parsed is skipped with a warning;
    ///    its segment simply contributes no keys.
    /// 3. Create a fresh active data file, bumping its id past any existing
    ///    segment created in the same second.
    pub fn open<P: AsRef<Path>>(directory: P, options: Options) -> Result<Database> {
        let directory = directory.as_ref().to_path_buf();
        ensure_directory(&directory)?;

        let mut sealed = SealedFiles::new();
        let mut hints: Vec<(u32, PathBuf)> = Vec::new();

        for dirent in fs::read_dir(&directory)? {
            let path = dirent?.path();
            match path.extension().and_then(|e| e.to_str()) {
                Some("df") => {
                    sealed.insert(Datafile::open_readonly(&path)?);
                }
                Some("hnt") => match datafile::parse_file_id(&path) {
                    Ok(id) => hints.push((id, path)),
                    Err(_) => {
                        warn!("skipping hint file with no parsable id: {}", path.display())
                    }
                },
                _ => {}
            }
        }

        // Ascending id order makes replay last-writer-wins across segments.
        hints.sort_by_key(|&(id, _)| id);

        let key_dir = KeyDir::new();
        for (id, path) in &hints {
            match hint::replay_into(path, *id, &key_dir) {
                Ok(applied) => {
                    debug!("replayed {} hint entries from {}", applied, path.display())
                }
                Err(e) => warn!("skipping corrupt hint file {}: {}", path.display(), e),
            }
        }

        let mut active_id = datafile::now_unix_seconds();
        while sealed.contains(active_id) {
            active_id += 1;
        }
        let active = Datafile::create_with_id(&directory, active_id)?;

        info!(
            "opened database at {} ({} keys, {} sealed segments)",
            directory.display(),
            key_dir.len()?,
            sealed.len()
        );

        Ok(Database {
            directory,
            options,
            files: RwLock::new(Files { active, sealed }),
            key_dir,
            merging: AtomicBool::new(false),
        })
    }
}

fn ensure_directory(path: &Path) -> io::Result<()> {
    if path.is_dir() {
        return Ok(());
    }

    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o777);
    }
    builder.create(path)
}

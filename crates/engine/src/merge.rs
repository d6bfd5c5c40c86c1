/// Merge/compaction interface.
///
/// Sealed segments accumulate overwritten values and tombstones that only a
/// rewrite can reclaim. The selection predicate below is stable API; the
/// rewrite itself is not implemented yet, so `merge()` currently selects and
/// reports candidates without touching them.
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::Ordering;

use log::{debug, info};

use crate::{poisoned, Database, Result};

impl Database {
    /// Sealed segments eligible for merging: everything smaller than
    /// `max_datafile_size`, which is typical for segments whose records have
    /// largely been superseded. The active file is never a candidate.
    pub fn merge_candidates(&self) -> Result<Vec<PathBuf>> {
        let files = self.files.read().map_err(|_| poisoned())?;

        let mut candidates = Vec::new();
        for df in files.sealed.iter() {
            let size = fs::metadata(df.path())?.len() as i64;
            if size < self.options.max_datafile_size {
                candidates.push(df.path().to_path_buf());
            }
        }

        candidates.sort();
        Ok(candidates)
    }

    /// Runs a merge pass. At most one pass runs at a time; a second call
    /// while one is in flight returns immediately.
    ///
    /// TODO: rewrite the selected segments into a compacted segment, dropping
    /// superseded records and tombstones, then retire the originals.
    pub fn merge(&self) -> Result<()> {
        if self.merging.swap(true, Ordering::SeqCst) {
            debug!("merge already in progress");
            return Ok(());
        }

        let result = self.select_for_merge();
        self.merging.store(false, Ordering::SeqCst);
        result
    }

    fn select_for_merge(&self) -> Result<()> {
        let candidates = self.merge_candidates()?;
        if candidates.is_empty() {
            return Ok(());
        }

        info!(
            "merge selected {} candidate segments; compaction rewrite not implemented yet",
            candidates.len()
        );
        Ok(())
    }
}

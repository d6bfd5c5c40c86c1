use std::fs;
use std::path::Path;

use crate::Options;

pub fn count_files(dir: &Path, extension: &str) -> usize {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|s| s.to_str())
                .map(|ext| ext == extension)
                .unwrap_or(false)
        })
        .count()
}

/// Options with a max file size small enough to force rotation in tests.
pub fn tiny_options(max_datafile_size: i64) -> Options {
    Options { max_datafile_size }
}

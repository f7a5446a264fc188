//! Recursive file discovery

use crate::error::{NemoError, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Every file below `dir` whose extension is exactly `extension` (no dot),
/// sorted by path.
pub fn find_files<P: AsRef<Path>>(dir: P, extension: &str) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let mut files = Vec::new();

    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).to_path_buf();
            NemoError::io(path, e.into())
        })?;

        if entry.file_type().is_file()
            && entry.path().extension().is_some_and(|ext| ext == extension)
        {
            files.push(entry.into_path());
        }
    }

    files.sort();
    Ok(files)
}

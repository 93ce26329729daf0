use anyhow::{bail, Context, Result};
use log::debug;
use std::path::Path;
use walkdir::WalkDir;

/// Names of the files directly inside `dir` ending in `extension`, sorted.
/// Fails when `dir` does not exist.
pub fn list_source_files(dir: &Path, extension: &str) -> Result<Vec<String>> {
    if !dir.is_dir() {
        bail!("Directory not found: {:?}", dir);
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.context(format!("Failed to list directory: {:?}", dir))?;
        if entry.file_type().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(extension) {
            files.push(name);
        }
    }

    debug!("Found {} source files in {:?}", files.len(), dir);
    Ok(files)
}

//! Zip extraction for uploaded datasets

use std::fs::File;
use std::path::{Path, PathBuf};
use zip::ZipArchive;

use super::{StorageError, StorageResult};

/// Directory names some archivers add next to the real content
const IGNORED_ENTRIES: &[&str] = &["__MACOSX"];

/// Extract a zip archive into `target`, replacing whatever was there.
///
/// Returns the dataset root: `target` itself, or its only subdirectory when the
/// archive wraps everything in one top-level folder. The archive file is left in
/// place.
pub async fn extract_archive(archive_path: &Path, target: &Path) -> StorageResult<PathBuf> {
    let archive_path = archive_path.to_path_buf();
    let target = target.to_path_buf();
    tokio::task::spawn_blocking(move || extract_blocking(&archive_path, &target))
        .await
        .map_err(|e| StorageError::Other(format!("extraction task failed: {}", e)))?
}

fn extract_blocking(archive_path: &Path, target: &Path) -> StorageResult<PathBuf> {
    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(file)?;

    if target.exists() {
        std::fs::remove_dir_all(target)?;
    }
    std::fs::create_dir_all(target)?;
    archive.extract(target)?;

    Ok(dataset_root(target)?)
}

fn dataset_root(dir: &Path) -> std::io::Result<PathBuf> {
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') || IGNORED_ENTRIES.contains(&name.as_str()) {
            continue;
        }
        entries.push(entry);
    }

    match entries.as_slice() {
        [only] if only.file_type()?.is_dir() => Ok(only.path()),
        _ => Ok(dir.to_path_buf()),
    }
}

#![forbid(unsafe_code)]

//! Crash-safe filesystem primitives.
//!
//! Whole-file writes go through a uniquely-named temp file in the destination
//! directory followed by an atomic rename, so the target file is either the
//! old version or the new version, never a partial write. Deletes treat an
//! already-absent file as success.

use std::path::Path;

use crate::error::{StoreError, StoreResult};

/// Atomically replace `path` with `data`.
///
/// Writes to a temp file in the same directory (same filesystem = rename is
/// atomic), then renames over the target path.
pub fn atomic_write(path: &Path, data: &[u8]) -> StoreResult<()> {
    let parent = path.parent().ok_or_else(|| {
        StoreError::Io(std::io::Error::other("atomic write: no parent dir"))
    })?;
    std::fs::create_dir_all(parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    std::io::Write::write_all(&mut tmp, data)?;

    // `persist()` does `rename(tmp, target)` and disarms the auto-delete on drop.
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}

/// Delete `path` if it exists. Returns `true` if a file was removed,
/// `false` if it was already absent.
pub fn remove_file(path: &Path) -> StoreResult<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(StoreError::Io(e)),
    }
}

/// Whether `path` currently exists.
#[must_use]
pub fn exists(path: &Path) -> bool {
    path.exists()
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;

    #[fixture]
    fn temp_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    #[rstest]
    fn atomic_write_creates_parent_dirs(temp_dir: tempfile::TempDir) {
        let path = temp_dir.path().join("a/b/file.json");
        atomic_write(&path, b"{}").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"{}");
    }

    #[rstest]
    fn atomic_write_replaces_existing_content(temp_dir: tempfile::TempDir) {
        let path = temp_dir.path().join("file.bin");
        atomic_write(&path, b"old").unwrap();
        atomic_write(&path, b"new").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"new");
    }

    #[rstest]
    fn atomic_write_leaves_no_temp_files(temp_dir: tempfile::TempDir) {
        let path = temp_dir.path().join("file.bin");
        atomic_write(&path, b"data").unwrap();
        let entries: Vec<_> = std::fs::read_dir(temp_dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[rstest]
    fn remove_file_tolerates_absent_target(temp_dir: tempfile::TempDir) {
        let path = temp_dir.path().join("never-written");
        assert!(!remove_file(&path).unwrap());

        atomic_write(&path, b"x").unwrap();
        assert!(remove_file(&path).unwrap());
        assert!(!exists(&path));
    }
}

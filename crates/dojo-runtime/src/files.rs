//! File operations used by the drivers.

use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use dojo_common::error::{DojoError, Result};

/// Synchronous file access, swappable in tests.
pub trait FileService: Send + Sync {
    /// Creates or truncates `path` and writes `contents`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    fn write_file(&self, path: &Path, contents: &str) -> Result<()>;

    /// Removes `path`. A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error for any failure other than the file being absent.
    fn remove_file(&self, path: &Path) -> Result<()>;

    /// Reads `path` as UTF-8.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    fn read_file(&self, path: &Path) -> Result<String>;

    /// Whether `path` exists.
    fn exists(&self, path: &Path) -> bool;

    /// Owner UID of `path`, `None` if it does not exist.
    fn owner_uid(&self, path: &Path) -> Option<u32>;

    /// Current working directory.
    ///
    /// # Errors
    ///
    /// Returns an error if it cannot be determined.
    fn current_dir(&self) -> Result<PathBuf>;
}

/// [`FileService`] on the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFiles;

fn io_error(path: &Path, source: std::io::Error) -> DojoError {
    DojoError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl FileService for LocalFiles {
    fn write_file(&self, path: &Path, contents: &str) -> Result<()> {
        std::fs::write(path, contents).map_err(|e| io_error(path, e))?;
        tracing::debug!(path = %path.display(), "file written");
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        match std::fs::remove_file(path) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "file removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(path, e)),
        }
    }

    fn read_file(&self, path: &Path) -> Result<String> {
        std::fs::read_to_string(path).map_err(|e| io_error(path, e))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn owner_uid(&self, path: &Path) -> Option<u32> {
        std::fs::metadata(path).ok().map(|m| m.uid())
    }

    fn current_dir(&self) -> Result<PathBuf> {
        std::env::current_dir().map_err(|e| io_error(Path::new("."), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_read_remove() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("env");
        let files = LocalFiles;

        files.write_file(&path, "ABC=123\n").unwrap();
        assert!(files.exists(&path));
        assert_eq!(files.read_file(&path).unwrap(), "ABC=123\n");

        files.remove_file(&path).unwrap();
        assert!(!files.exists(&path));
    }

    #[test]
    fn removing_missing_file_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        LocalFiles.remove_file(&dir.path().join("nope")).unwrap();
    }

    #[test]
    fn owner_of_missing_path_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(LocalFiles.owner_uid(&dir.path().join("nope")).is_none());
        assert_eq!(
            LocalFiles.owner_uid(dir.path()),
            Some(nix::unistd::Uid::effective().as_raw())
        );
    }

    #[test]
    fn reading_missing_file_reports_path() {
        let err = LocalFiles.read_file(Path::new("/nonexistent/dojo")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/dojo"));
    }
}

//! Crash-safe file replacement.

use crate::{Error, Result};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Writes `bytes` to `path` through a synced temp file and an atomic rename.
///
/// Readers see either the old contents or the new ones, never a partial file.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8], operation: &str) -> Result<()> {
    let failed = |cause: String| Error::OperationFailed {
        operation: operation.to_string(),
        cause: format!("{}: {cause}", path.display()),
    };

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(|e| failed(e.to_string()))?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(|e| failed(e.to_string()))?;
    tmp.write_all(bytes).map_err(|e| failed(e.to_string()))?;
    tmp.as_file().sync_all().map_err(|e| failed(e.to_string()))?;
    tmp.persist(path).map_err(|e| failed(e.error.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_atomic_creates_parents_and_replaces() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("nested").join("store.json");

        write_atomic(&path, b"{}", "test_write").expect("first write");
        write_atomic(&path, b"{\"a\":1}", "test_write").expect("second write");

        assert_eq!(std::fs::read_to_string(&path).expect("read"), "{\"a\":1}");
        let leftovers = std::fs::read_dir(path.parent().expect("parent"))
            .expect("list")
            .count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_write_atomic_reports_operation() {
        let dir = TempDir::new().expect("tempdir");
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").expect("write blocker");

        let err = write_atomic(&blocker.join("store.json"), b"{}", "store_write")
            .expect_err("parent is a file");
        assert!(matches!(err, Error::OperationFailed { ref operation, .. } if operation == "store_write"));
    }
}

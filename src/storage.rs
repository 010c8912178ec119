//! Statement object storage. Uploaded statements wait in a store until the
//! import pipeline consumes them; the local implementation is a flat
//! directory of files keyed by name.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{PassbookError, Result};

pub trait ObjectStore {
    fn fetch(&self, key: &str) -> Result<Vec<u8>>;
    fn store(&self, key: &str, bytes: &[u8]) -> Result<()>;
    fn delete(&self, key: &str) -> Result<()>;
}

/// Directory-backed store. Keys map straight to file names; separators and
/// dot-dirs are rejected so a key cannot escape the root.
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: &Path) -> Result<LocalStore> {
        fs::create_dir_all(root)?;
        Ok(LocalStore {
            root: root.to_path_buf(),
        })
    }

    fn object_path(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.contains('/') || key.contains('\\') || key == "." || key == ".." {
            return Err(PassbookError::Other(format!("invalid object key: {key:?}")));
        }
        Ok(self.root.join(key))
    }
}

impl ObjectStore for LocalStore {
    fn fetch(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.object_path(key)?;
        fs::read(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => PassbookError::NotFound(format!("object {key}")),
            _ => PassbookError::Io(e),
        })
    }

    fn store(&self, key: &str, bytes: &[u8]) -> Result<()> {
        fs::write(self.object_path(key)?, bytes)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let path = self.object_path(key)?;
        fs::remove_file(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => PassbookError::NotFound(format!("object {key}")),
            _ => PassbookError::Io(e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_fetch_delete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path()).unwrap();

        store.store("statement.csv", b"Date,Amount\n").unwrap();
        assert_eq!(store.fetch("statement.csv").unwrap(), b"Date,Amount\n");

        store.delete("statement.csv").unwrap();
        assert!(matches!(
            store.fetch("statement.csv").unwrap_err(),
            PassbookError::NotFound(_)
        ));
    }

    #[test]
    fn test_missing_object_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path()).unwrap();
        assert!(matches!(
            store.fetch("nope.pdf").unwrap_err(),
            PassbookError::NotFound(_)
        ));
        assert!(matches!(
            store.delete("nope.pdf").unwrap_err(),
            PassbookError::NotFound(_)
        ));
    }

    #[test]
    fn test_rejects_path_traversal_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path()).unwrap();
        for key in ["../escape.csv", "a/b.csv", "", ".", ".."] {
            assert!(store.fetch(key).is_err(), "key {key:?} should be rejected");
        }
    }

    #[test]
    fn test_new_creates_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("uploads");
        LocalStore::new(&root).unwrap();
        assert!(root.is_dir());
    }
}

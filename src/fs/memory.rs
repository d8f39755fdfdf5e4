use crate::error::{Error, Result};
use crate::FileSystem;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// An in-memory implementation of the FileSystem trait
///
/// Useful for testing; files are lost when the last clone is dropped.
#[derive(Debug, Default, Clone)]
pub struct InMemoryFileSystem {
    files: Arc<RwLock<HashMap<PathBuf, Vec<u8>>>>,
}

impl InMemoryFileSystem {
    /// Creates an empty file system
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if a file exists at the path
    pub fn contains(&self, path: &Path) -> bool {
        self.files.read().contains_key(path)
    }

    /// Paths of all files, sorted
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<_> = self.files.read().keys().cloned().collect();
        paths.sort();
        paths
    }
}

#[async_trait]
impl FileSystem for InMemoryFileSystem {
    async fn read_file(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        Ok(self.files.read().get(path).cloned())
    }

    async fn write_file(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.files
            .write()
            .insert(path.to_path_buf(), contents.to_vec());
        Ok(())
    }

    async fn rename_file(&self, from: &Path, to: &Path) -> Result<()> {
        let mut files = self.files.write();
        let contents = files
            .remove(from)
            .ok_or_else(|| Error::Io(std::io::ErrorKind::NotFound.into()))?;
        files.insert(to.to_path_buf(), contents);
        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> Result<()> {
        self.files.write().remove(path);
        Ok(())
    }
}

use std::collections::BTreeMap;
use std::io;

use parking_lot::RwLock;

/// Read-only view of a root that is not a plain folder or archive.
///
/// Paths are relative and `/` separated.
pub trait VirtualFileSystem: Send + Sync + std::fmt::Debug {
    /// Every file below the root.
    fn files(&self) -> io::Result<Vec<String>>;

    fn read(&self, path: &str) -> io::Result<Vec<u8>>;

    /// Millisecond timestamp of the root itself, if known.
    fn last_modified(&self) -> Option<i64>;
}

/// In-memory [`VirtualFileSystem`].
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    files: RwLock<BTreeMap<String, Vec<u8>>>,
    modified: RwLock<i64>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a file and bumps the root timestamp.
    pub fn insert(&self, path: impl Into<String>, bytes: Vec<u8>) {
        self.files.write().insert(path.into(), bytes);
        *self.modified.write() += 1;
    }

    pub fn remove(&self, path: &str) -> bool {
        let removed = self.files.write().remove(path).is_some();
        if removed {
            *self.modified.write() += 1;
        }
        removed
    }
}

impl VirtualFileSystem for MemoryFileSystem {
    fn files(&self) -> io::Result<Vec<String>> {
        Ok(self.files.read().keys().cloned().collect())
    }

    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        self.files
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.to_string()))
    }

    fn last_modified(&self) -> Option<i64> {
        Some(*self.modified.read())
    }
}

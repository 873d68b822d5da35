use crate::error::CacheError;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Per-root cache directory: `<cache_root>/index/<root-fingerprint>/`.
///
/// Each classpath root owns a disjoint directory so scans of different roots
/// never share change-state files or index segments.
#[derive(Clone, Debug)]
pub struct RootCacheDir {
    root: PathBuf,
    fingerprint: String,
    dir: PathBuf,
}

impl RootCacheDir {
    /// Resolves (and creates) the cache directory for `root`.
    pub fn new(cache_root: &Path, root: &Path) -> Result<Self, CacheError> {
        let fingerprint = root_fingerprint(root);
        let dir = cache_root.join("index").join(&fingerprint);
        std::fs::create_dir_all(dir.join("refs"))?;
        Ok(Self {
            root: root.to_path_buf(),
            fingerprint,
            dir,
        })
    }

    /// Resolves the directory without touching the filesystem.
    pub fn locate(cache_root: &Path, root: &Path) -> Self {
        let fingerprint = root_fingerprint(root);
        let dir = cache_root.join("index").join(&fingerprint);
        Self {
            root: root.to_path_buf(),
            fingerprint,
            dir,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn exists(&self) -> bool {
        self.dir.is_dir()
    }

    pub fn crc_path(&self) -> PathBuf {
        self.dir.join("crc.properties")
    }

    pub fn timestamps_path(&self) -> PathBuf {
        self.dir.join("timestamps.properties")
    }

    pub fn attributes_path(&self) -> PathBuf {
        self.dir.join("attributes.properties")
    }

    pub fn refs_dir(&self) -> PathBuf {
        self.dir.join("refs")
    }

    pub fn segment_path(&self) -> PathBuf {
        self.refs_dir().join("segment.bin")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.refs_dir().join(".lock")
    }

    /// Deletes every cached artifact of this root.
    pub fn purge(&self) -> Result<(), CacheError> {
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => {
                tracing::debug!(
                    target: "jref.cache",
                    root = %self.root.display(),
                    "purged root cache directory"
                );
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Stable SHA-256 hex fingerprint of a root path.
pub fn root_fingerprint(root: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(root.to_string_lossy().as_bytes());
    hex::encode(hasher.finalize())
}

/// `~/.jref/cache`, used when no cache directory is configured.
pub fn default_cache_root() -> Result<PathBuf, CacheError> {
    let home = std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .ok_or(CacheError::MissingHomeDir)?;

    Ok(home.join(".jref").join("cache"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_keyed_by_root_fingerprint() {
        let cache = tempfile::tempdir().unwrap();
        let a = RootCacheDir::new(cache.path(), Path::new("/work/a/classes")).unwrap();
        let b = RootCacheDir::new(cache.path(), Path::new("/work/b/classes")).unwrap();

        assert_ne!(a.dir(), b.dir());
        assert_eq!(a.fingerprint().len(), 64);
        assert!(a.refs_dir().is_dir());
        assert_eq!(
            a.segment_path(),
            cache.path().join("index").join(a.fingerprint()).join("refs").join("segment.bin")
        );
        assert_eq!(
            RootCacheDir::locate(cache.path(), Path::new("/work/a/classes")).dir(),
            a.dir()
        );
    }

    #[test]
    fn purge_removes_directory() {
        let cache = tempfile::tempdir().unwrap();
        let dir = RootCacheDir::new(cache.path(), Path::new("/r")).unwrap();
        std::fs::write(dir.crc_path(), "a=1\n").unwrap();
        dir.purge().unwrap();
        assert!(!dir.exists());
        dir.purge().unwrap();
    }
}

//! Mirroring of build artifacts into output directories that ask for it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::error::Result;

/// Marks an output directory that receives mirrored artifacts.
pub const AUTOMATIC_BUILD_TAG: &str = ".netbeans_automatic_build";
/// Marks an output directory that also receives non-class resources.
pub const UPDATE_RESOURCES_TAG: &str = ".netbeans_update_resources";

/// Receives the artifact files a committed transaction added or removed.
pub trait ArtifactMirror: Send + Sync {
    fn update(&self, root: &Path, deleted: &[PathBuf], updated: &[PathBuf]) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct NoMirror;

impl ArtifactMirror for NoMirror {
    fn update(&self, _root: &Path, _deleted: &[PathBuf], _updated: &[PathBuf]) -> Result<()> {
        Ok(())
    }
}

#[derive(Clone, Debug)]
struct MirrorTarget {
    artifacts_dir: PathBuf,
    output_dir: PathBuf,
}

/// Copies artifacts from a root's artifact directory into its output
/// directory, keeping relative paths.
///
/// Nothing happens unless the output directory carries
/// [`AUTOMATIC_BUILD_TAG`]. Only `.class` files are mirrored unless it also
/// carries [`UPDATE_RESOURCES_TAG`].
#[derive(Debug, Default)]
pub struct DirectoryMirror {
    targets: RwLock<HashMap<PathBuf, MirrorTarget>>,
}

impl DirectoryMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, root: &Path, artifacts_dir: &Path, output_dir: &Path) {
        self.targets.write().insert(
            root.to_path_buf(),
            MirrorTarget {
                artifacts_dir: artifacts_dir.to_path_buf(),
                output_dir: output_dir.to_path_buf(),
            },
        );
    }

    pub fn unregister(&self, root: &Path) -> bool {
        self.targets.write().remove(root).is_some()
    }
}

fn is_class_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("class"))
}

impl ArtifactMirror for DirectoryMirror {
    fn update(&self, root: &Path, deleted: &[PathBuf], updated: &[PathBuf]) -> Result<()> {
        let Some(target) = self.targets.read().get(root).cloned() else {
            return Ok(());
        };
        if !target.output_dir.join(AUTOMATIC_BUILD_TAG).is_file() {
            tracing::trace!(
                target: "jref.usages.tx",
                output = %target.output_dir.display(),
                "output directory is not mirrored"
            );
            return Ok(());
        }
        let resources = target.output_dir.join(UPDATE_RESOURCES_TAG).is_file();
        let destination = |file: &Path| -> Option<PathBuf> {
            if !resources && !is_class_file(file) {
                return None;
            }
            let relative = file.strip_prefix(&target.artifacts_dir).ok()?;
            Some(target.output_dir.join(relative))
        };

        for file in deleted {
            let Some(dest) = destination(file) else {
                continue;
            };
            match std::fs::remove_file(&dest) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        for file in updated {
            let Some(dest) = destination(file) else {
                continue;
            };
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(file, &dest)?;
        }
        tracing::debug!(
            target: "jref.usages.tx",
            root = %root.display(),
            deleted = deleted.len(),
            updated = updated.len(),
            "mirrored build artifacts"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirrors_only_into_tagged_output_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let artifacts = tmp.path().join("artifacts");
        let output = tmp.path().join("out");
        std::fs::create_dir_all(artifacts.join("p")).unwrap();
        std::fs::create_dir_all(&output).unwrap();
        let class = artifacts.join("p/A.class");
        let resource = artifacts.join("p/a.properties");
        std::fs::write(&class, b"cafebabe").unwrap();
        std::fs::write(&resource, b"k=v").unwrap();

        let mirror = DirectoryMirror::new();
        let root = Path::new("/src");
        mirror.register(root, &artifacts, &output);

        mirror.update(root, &[], &[class.clone()]).unwrap();
        assert!(!output.join("p/A.class").exists());

        std::fs::write(output.join(AUTOMATIC_BUILD_TAG), b"").unwrap();
        mirror.update(root, &[], &[class.clone(), resource.clone()]).unwrap();
        assert!(output.join("p/A.class").is_file());
        assert!(!output.join("p/a.properties").exists());

        std::fs::write(output.join(UPDATE_RESOURCES_TAG), b"").unwrap();
        mirror.update(root, &[], &[resource]).unwrap();
        assert!(output.join("p/a.properties").is_file());

        mirror.update(root, &[class], &[]).unwrap();
        assert!(!output.join("p/A.class").exists());
    }
}

//! Classpath roots and the processors that walk them.
//!
//! [`RootKind::detect`] picks the processor for a root path and [`scan`] runs
//! it against a [`BinaryAnalyser`]. Every processor reports the resources it
//! saw (name plus fingerprint) so the caller can diff the new root state
//! against the previous CRC snapshot.

mod diff;
mod vfs;

use std::fs::{File, Metadata};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;
use zip::result::ZipError;
use zip::ZipArchive;

pub use diff::{diff, Changes};
pub use vfs::{MemoryFileSystem, VirtualFileSystem};

use crate::binary::class::{MODULE_INFO, MODULE_INFO_CLASS};
use crate::binary::BinaryAnalyser;
use crate::error::Result;
use crate::timestamps::{FileState, RootState, Timestamps};
use crate::usage::JAVA_LANG_OBJECT;

/// Timestamp key under which archive and virtual roots record their own
/// modification time.
pub const ROOT_KEY: &str = "/";

const JCOMPONENT: &str = "javax.swing.JComponent";
const CLASS_EXTENSION: &str = "class";
const BRIDGE_OBJECT: u8 = 1;
const BRIDGE_JCOMPONENT: u8 = 2;

#[derive(Clone, Debug)]
pub enum RootKind {
    /// A `.jar`/`.zip` file whose timestamp changed since the last scan.
    Archive { path: PathBuf },
    Folder { root: PathBuf },
    VirtualFs { fs: Arc<dyn VirtualFileSystem> },
    /// A folder root restricted to the listed class files.
    EnumeratedFiles { root: PathBuf, files: Vec<PathBuf> },
    /// The root no longer exists; everything recorded for it goes.
    Deleted,
}

impl RootKind {
    /// Chooses the processor for `root`. `None` means the root is up to date
    /// and does not need scanning.
    pub fn detect(root: &Path, timestamps: &mut Timestamps) -> Option<RootKind> {
        if root.is_dir() {
            return Some(RootKind::Folder {
                root: root.to_path_buf(),
            });
        }
        if !root.exists() {
            return Some(RootKind::Deleted);
        }
        if is_archive(root) {
            let modified = match File::open(root).and_then(|file| file.metadata()) {
                Ok(meta) => modified_millis(&meta),
                Err(err) => {
                    tracing::debug!(
                        target: "jref.usages.scan",
                        root = %root.display(),
                        error = %err,
                        "archive is not readable"
                    );
                    return Some(RootKind::Deleted);
                }
            };
            if timestamps.is_up_to_date(ROOT_KEY, modified) {
                return None;
            }
            return Some(RootKind::Archive {
                path: root.to_path_buf(),
            });
        }
        tracing::debug!(
            target: "jref.usages.scan",
            root = %root.display(),
            "root is neither a folder nor an archive"
        );
        None
    }

    /// Like [`RootKind::detect`] for a root served by a virtual file system.
    pub fn detect_virtual(
        fs: Arc<dyn VirtualFileSystem>,
        timestamps: &mut Timestamps,
    ) -> Option<RootKind> {
        if let Some(modified) = fs.last_modified() {
            if timestamps.is_up_to_date(ROOT_KEY, modified) {
                return None;
            }
        }
        Some(RootKind::VirtualFs { fs })
    }

    pub fn name(&self) -> &'static str {
        match self {
            RootKind::Archive { .. } => "archive",
            RootKind::Folder { .. } => "folder",
            RootKind::VirtualFs { .. } => "virtual",
            RootKind::EnumeratedFiles { .. } => "files",
            RootKind::Deleted => "deleted",
        }
    }
}

/// What one processor run observed.
#[derive(Debug, Default)]
pub struct ScanResult {
    /// `false` when the scan was cancelled before it visited every entry.
    pub completed: bool,
    /// Something was (re)analysed or deleted.
    pub changed: bool,
    /// Sorted by name, one entry per name.
    pub state: RootState,
    bridge: u8,
}

impl ScanResult {
    /// Both `java.lang.Object` and `javax.swing.JComponent` were reported.
    pub fn pre_build_args(&self) -> bool {
        self.bridge == BRIDGE_OBJECT | BRIDGE_JCOMPONENT
    }
}

/// Runs the processor for `kind`, feeding every accepted class file to
/// `analyser`.
pub fn scan(
    kind: &RootKind,
    analyser: &mut BinaryAnalyser,
    cancel: &CancellationToken,
) -> Result<ScanResult> {
    let mut scanner = Scanner {
        analyser,
        cancel,
        result: ScanResult::default(),
    };
    let completed = match kind {
        RootKind::Archive { path } => scanner.archive(path)?,
        RootKind::Folder { root } => scanner.folder(root)?,
        RootKind::VirtualFs { fs } => scanner.virtual_fs(fs.as_ref())?,
        RootKind::EnumeratedFiles { root, files } => scanner.files(root, files)?,
        RootKind::Deleted => scanner.deleted()?,
    };

    let mut result = scanner.result;
    result.completed = completed;
    result.state.sort();
    result.state.dedup_by(|next, prev| next.name == prev.name);
    tracing::debug!(
        target: "jref.usages.scan",
        kind = kind.name(),
        completed,
        changed = result.changed,
        entries = result.state.len(),
        "root scanned"
    );
    Ok(result)
}

/// `.class`, case-insensitive.
pub fn accepts(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(CLASS_EXTENSION))
}

/// `a/b/C.class` -> `a.b.C`.
pub fn resource_class_name(resource: &str) -> String {
    let file_start = resource.rfind('/').map_or(0, |idx| idx + 1);
    let stem_end = resource[file_start..]
        .rfind('.')
        .map_or(resource.len(), |idx| file_start + idx);
    resource[..stem_end].replace('/', ".")
}

fn relative_class_name(root: &Path, file: &Path) -> Option<String> {
    let relative = file.strip_prefix(root).ok()?;
    let parts: Vec<&str> = relative
        .components()
        .map(|component| component.as_os_str().to_str())
        .collect::<Option<_>>()?;
    Some(resource_class_name(&parts.join("/")))
}

fn is_archive(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("jar") || ext.eq_ignore_ascii_case("zip"))
}

fn modified_millis(meta: &Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |elapsed| elapsed.as_millis() as i64)
}

fn read_archive_entry(
    archive: &mut ZipArchive<File>,
    index: usize,
) -> std::result::Result<Option<(String, u32, Vec<u8>)>, ZipError> {
    let mut entry = archive.by_index(index)?;
    if !entry.is_file() || !accepts(entry.name()) {
        return Ok(None);
    }
    let name = entry.name().to_owned();
    let mut bytes = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut bytes)?;
    Ok(Some((name, entry.crc32(), bytes)))
}

struct Scanner<'a> {
    analyser: &'a mut BinaryAnalyser,
    cancel: &'a CancellationToken,
    result: ScanResult,
}

impl Scanner<'_> {
    fn report(&mut self, name: String, fingerprint: i64) {
        if name == JAVA_LANG_OBJECT {
            self.result.bridge |= BRIDGE_OBJECT;
        } else if name == JCOMPONENT {
            self.result.bridge |= BRIDGE_JCOMPONENT;
        }
        self.result.state.push(FileState::new(name, fingerprint));
    }

    fn mark_changed(&mut self) {
        self.result.changed = true;
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn archive(&mut self, path: &Path) -> Result<bool> {
        self.analyser.clear_writer()?;
        self.mark_changed();

        let opened = File::open(path)
            .map_err(ZipError::from)
            .and_then(ZipArchive::new);
        let mut archive = match opened {
            Ok(archive) => archive,
            Err(err) => {
                tracing::warn!(
                    target: "jref.usages.scan",
                    path = %path.display(),
                    error = %err,
                    "broken zip file"
                );
                return Ok(true);
            }
        };

        let mut reported_broken_entry = false;
        for index in 0..archive.len() {
            match read_archive_entry(&mut archive, index) {
                Ok(Some((name, crc, bytes))) => {
                    self.report(resource_class_name(&name), i64::from(crc));
                    self.analyser
                        .analyse_unit(&bytes, &format!("{}!/{name}", path.display()));
                    self.analyser.poll_low_memory()?;
                }
                Ok(None) => {}
                Err(err) => {
                    if !reported_broken_entry {
                        reported_broken_entry = true;
                        tracing::info!(
                            target: "jref.usages.scan",
                            path = %path.display(),
                            index,
                            error = %err,
                            "skipping broken zip entry"
                        );
                    }
                }
            }
            if self.is_cancelled() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn folder(&mut self, root: &Path) -> Result<bool> {
        for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::warn!(
                        target: "jref.usages.scan",
                        root = %root.display(),
                        error = %err,
                        "cannot read directory entry"
                    );
                    continue;
                }
            };
            if entry.file_type().is_file() && entry.file_name().to_str().is_some_and(accepts) {
                if let Some(name) = relative_class_name(root, entry.path()) {
                    self.visit_file(name, entry.path())?;
                }
            }
            if self.is_cancelled() {
                return Ok(false);
            }
        }
        self.delete_unseen()?;
        Ok(true)
    }

    fn files(&mut self, root: &Path, files: &[PathBuf]) -> Result<bool> {
        for file in files {
            let accepted = file
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(accepts);
            match relative_class_name(root, file) {
                Some(name) if accepted => self.visit_file(name, file)?,
                _ => tracing::debug!(
                    target: "jref.usages.scan",
                    root = %root.display(),
                    file = %file.display(),
                    "ignoring file outside the root"
                ),
            }
            if self.is_cancelled() {
                return Ok(false);
            }
        }
        self.delete_unseen()?;
        Ok(true)
    }

    fn visit_file(&mut self, name: String, path: &Path) -> Result<()> {
        let modified = std::fs::metadata(path).map_or(0, |meta| modified_millis(&meta));
        let up_to_date = self.analyser.timestamps_mut()?.is_up_to_date(&name, modified);
        self.report(name.clone(), modified);
        if up_to_date {
            return Ok(());
        }

        self.mark_changed();
        self.analyser.schedule_delete(Some(name), None);
        match std::fs::read(path) {
            Ok(bytes) => self
                .analyser
                .analyse_unit(&bytes, &path.display().to_string()),
            Err(err) => tracing::warn!(
                target: "jref.usages.scan",
                path = %path.display(),
                error = %err,
                "cannot read file"
            ),
        }
        self.analyser.poll_low_memory()
    }

    /// Keys recorded by an earlier scan whose files are gone.
    fn delete_unseen(&mut self) -> Result<()> {
        let unseen = self.analyser.timestamps_mut()?.unseen();
        for name in unseen {
            if name == MODULE_INFO {
                self.analyser
                    .schedule_delete(None, Some(MODULE_INFO_CLASS.to_string()));
            } else {
                self.analyser.schedule_delete(Some(name), None);
            }
            self.mark_changed();
        }
        Ok(())
    }

    fn virtual_fs(&mut self, fs: &dyn VirtualFileSystem) -> Result<bool> {
        self.analyser.clear_writer()?;
        self.mark_changed();

        let files = match fs.files() {
            Ok(files) => files,
            Err(err) => {
                tracing::warn!(
                    target: "jref.usages.scan",
                    error = %err,
                    "cannot list virtual root"
                );
                return Ok(true);
            }
        };
        for path in files {
            if accepts(&path) {
                self.report(resource_class_name(&path), 0);
                match fs.read(&path) {
                    Ok(bytes) => self.analyser.analyse_unit(&bytes, &path),
                    Err(err) => tracing::warn!(
                        target: "jref.usages.scan",
                        path = %path,
                        error = %err,
                        "cannot read file"
                    ),
                }
                self.analyser.poll_low_memory()?;
            }
            if self.is_cancelled() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn deleted(&mut self) -> Result<bool> {
        if !self.analyser.timestamps_mut()?.is_empty() {
            self.mark_changed();
        }
        self.analyser.clear_writer()?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_class_files_case_insensitively() {
        assert!(accepts("a/B.class"));
        assert!(accepts("B.CLASS"));
        assert!(!accepts("B.java"));
        assert!(!accepts("class"));
    }

    #[test]
    fn resource_names_become_dotted_class_names() {
        assert_eq!(resource_class_name("a/b/C.class"), "a.b.C");
        assert_eq!(resource_class_name("a/b/C$1.class"), "a.b.C$1");
        assert_eq!(resource_class_name("module-info.class"), "module-info");
        assert_eq!(resource_class_name("a.b/C"), "a.b.C");
    }

    #[test]
    fn relative_names_strip_root_and_extension() {
        let root = Path::new("/r/classes");
        assert_eq!(
            relative_class_name(root, Path::new("/r/classes/p/q/A.class")).as_deref(),
            Some("p.q.A")
        );
        assert_eq!(relative_class_name(root, Path::new("/elsewhere/A.class")), None);
    }

    #[test]
    fn pre_build_args_needs_both_bridge_classes() {
        let mut result = ScanResult::default();
        result.bridge = BRIDGE_OBJECT;
        assert!(!result.pre_build_args());
        result.bridge |= BRIDGE_JCOMPONENT;
        assert!(result.pre_build_args());
    }
}

//! Incremental binary analysis of one classpath root.

pub mod class;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use jref_cache::RootCacheDir;
use jref_classfile::ClassFile;
use jref_config::{IdentLevel, UsagesLevel};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::low_memory::LowMemory;
use crate::persistent::{IndexOptions, UsagesWriter};
use crate::root::{self, diff, Changes, RootKind, VirtualFileSystem};
use crate::timestamps::Timestamps;
use crate::usage::UsageRecord;

pub use class::{analyse_class, analyse_class_bytes, ClassAnalysis};

/// Decides whether a parsed class file is indexed.
pub type ClassFilter = Box<dyn Fn(&ClassFile) -> bool + Send + Sync>;

/// `(class_name, file_name)` scheduled for deletion.
pub type DeleteKey = (Option<String>, Option<String>);

/// Scans a root, writes what changed through a [`UsagesWriter`] and reports
/// the difference to the previous scan.
///
/// Deletes and records are buffered and staged together; a low-memory signal
/// stages the buffer early without committing.
pub struct BinaryAnalyser {
    writer: UsagesWriter,
    cache_dir: RootCacheDir,
    level: UsagesLevel,
    idents: IdentLevel,
    low_memory: Arc<dyn LowMemory>,
    filter: Option<ClassFilter>,
    refs: Vec<UsageRecord>,
    to_delete: Vec<DeleteKey>,
    timestamps: Option<Timestamps>,
}

impl BinaryAnalyser {
    pub fn new(writer: UsagesWriter, cache_dir: RootCacheDir, options: &IndexOptions) -> Self {
        Self {
            writer,
            cache_dir,
            level: options.usages,
            idents: options.idents,
            low_memory: Arc::clone(&options.low_memory),
            filter: None,
            refs: Vec::new(),
            to_delete: Vec::new(),
            timestamps: None,
        }
    }

    /// Only classes accepted by `filter` are indexed.
    pub fn with_filter(mut self, filter: impl Fn(&ClassFile) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    pub fn level(&self) -> UsagesLevel {
        self.level
    }

    /// Analyses the folder or archive at `root`.
    pub fn analyse(&mut self, root: &Path, cancel: &CancellationToken) -> Result<Changes> {
        match RootKind::detect(root, self.timestamps_mut()?) {
            Some(kind) => self.analyse_kind(&kind, cancel),
            None => {
                self.timestamps = None;
                Ok(Changes::UP_TO_DATE)
            }
        }
    }

    pub fn analyse_virtual(
        &mut self,
        fs: Arc<dyn VirtualFileSystem>,
        cancel: &CancellationToken,
    ) -> Result<Changes> {
        match RootKind::detect_virtual(fs, self.timestamps_mut()?) {
            Some(kind) => self.analyse_kind(&kind, cancel),
            None => {
                self.timestamps = None;
                Ok(Changes::UP_TO_DATE)
            }
        }
    }

    /// Analyses `files` below the folder `root`. Timestamp keys of files not
    /// in the list are treated as deleted.
    pub fn analyse_files(
        &mut self,
        root: &Path,
        files: Vec<PathBuf>,
        cancel: &CancellationToken,
    ) -> Result<Changes> {
        self.analyse_kind(
            &RootKind::EnumeratedFiles {
                root: root.to_path_buf(),
                files,
            },
            cancel,
        )
    }

    pub fn analyse_kind(&mut self, kind: &RootKind, cancel: &CancellationToken) -> Result<Changes> {
        let scan = match root::scan(kind, self, cancel) {
            Ok(scan) => scan,
            Err(err) => {
                self.abort();
                return Err(err);
            }
        };
        if !scan.completed {
            tracing::debug!(
                target: "jref.usages.scan",
                root = %self.cache_dir.root().display(),
                "scan cancelled"
            );
            self.abort();
            return Ok(Changes::FAILURE);
        }

        let unseen_is_empty = self
            .timestamps
            .as_ref()
            .map_or(true, Timestamps::unseen_is_empty);
        if !scan.changed && unseen_is_empty {
            self.release();
            self.timestamps = None;
            return Ok(Changes::UP_TO_DATE);
        }

        match self.finish(&scan) {
            Ok(changes) => Ok(changes),
            Err(err) => {
                self.abort();
                Err(err)
            }
        }
    }

    /// Stages the buffered records together with the new root state; both
    /// are persisted when the transaction commits.
    fn finish(&mut self, scan: &root::ScanResult) -> Result<Changes> {
        let old_state = self.writer.index().previous_crcs()?;
        self.store()?;
        let timestamps = self.timestamps.take().map(|mut timestamps| {
            timestamps.settle();
            timestamps
        });
        self.writer
            .index()
            .stage_change_state(scan.state.clone(), timestamps);
        let changes = diff(&old_state, &scan.state, scan.pre_build_args());
        tracing::debug!(
            target: "jref.usages.scan",
            root = %self.cache_dir.root().display(),
            added = changes.added.len(),
            removed = changes.removed.len(),
            changed = changes.changed.len(),
            "root analysed"
        );
        Ok(changes)
    }

    /// Stages everything buffered, even when the buffer is empty.
    fn store(&mut self) -> Result<()> {
        let (refs, deletes) = self.take_buffers();
        self.writer.delete_and_store(refs, deletes)
    }

    /// Stages the buffer early; nothing is committed.
    fn flush(&mut self) -> Result<()> {
        if self.refs.is_empty() && self.to_delete.is_empty() {
            return Ok(());
        }
        let (refs, deletes) = self.take_buffers();
        self.writer.delete_and_flush(refs, deletes)
    }

    fn take_buffers(&mut self) -> (Vec<UsageRecord>, Vec<DeleteKey>) {
        (std::mem::take(&mut self.refs), std::mem::take(&mut self.to_delete))
    }

    fn release(&mut self) {
        self.refs.clear();
        self.to_delete.clear();
    }

    fn abort(&mut self) {
        self.release();
        self.timestamps = None;
        if let Err(err) = self.writer.rollback() {
            tracing::warn!(
                target: "jref.usages.scan",
                root = %self.cache_dir.root().display(),
                error = %err,
                "rollback after failed scan failed"
            );
        }
    }

    pub(crate) fn timestamps_mut(&mut self) -> Result<&mut Timestamps> {
        let timestamps = match self.timestamps.take() {
            Some(timestamps) => timestamps,
            None => self.writer.index().previous_timestamps()?,
        };
        Ok(self.timestamps.insert(timestamps))
    }

    pub(crate) fn clear_writer(&mut self) -> Result<()> {
        self.writer.clear()
    }

    pub(crate) fn schedule_delete(&mut self, class_name: Option<String>, file_name: Option<String>) {
        self.to_delete.push((class_name, file_name));
    }

    pub(crate) fn poll_low_memory(&mut self) -> Result<()> {
        if self.low_memory.is_low_memory() {
            tracing::trace!(
                target: "jref.usages.scan",
                buffered = self.refs.len(),
                "low memory, flushing"
            );
            self.flush()?;
        }
        Ok(())
    }

    /// Parses and analyses one class file. An invalid class file is logged
    /// and skipped.
    pub(crate) fn analyse_unit(&mut self, bytes: &[u8], origin: &str) {
        let cf = match ClassFile::parse(bytes) {
            Ok(cf) => cf,
            Err(err) => {
                tracing::warn!(
                    target: "jref.usages.scan",
                    origin,
                    error = %err,
                    "invalid class file format"
                );
                return;
            }
        };
        if let Some(filter) = &self.filter {
            if !filter(&cf) {
                return;
            }
        }
        let analysis = analyse_class(&cf, self.level, self.idents);
        self.schedule_delete(Some(analysis.class_name), analysis.file_name);
        self.refs.push(analysis.record);
    }
}

impl fmt::Debug for BinaryAnalyser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinaryAnalyser")
            .field("root", &self.cache_dir.root())
            .field("level", &self.level)
            .field("idents", &self.idents)
            .field("buffered", &self.refs.len())
            .field("to_delete", &self.to_delete.len())
            .finish()
    }
}

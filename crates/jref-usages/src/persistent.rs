//! One classpath root's usage index.
//!
//! A [`PersistentIndex`] wraps a [`DocumentStore`] with the root's cache
//! directory, the reader-preferring [`PriorityGate`], a package-name cache and
//! the dirty overlay used for files that are being edited. Writes go through a
//! [`UsagesWriter`] and are only visible once [`PersistentIndex::commit`] ran.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use jref_cache::{remove_file_best_effort, Properties, RootCacheDir};
use jref_config::{IdentLevel, IndexConfig, UsagesLevel};
use jref_docindex::{BooleanQuery, DiskIndex, Document, DocumentStore, IndexStatus, MemIndex, Query};
use parking_lot::{Mutex, RwLock};

use crate::binary::{BinaryAnalyser, DeleteKey};
use crate::codec;
use crate::error::{IndexError, Result};
use crate::gate::PriorityGate;
use crate::low_memory::{LowMemory, NoLowMemory, ProcessMemoryWatcher};
use crate::query::{declared_types_query, usages_query, NameKind, Operator, PackageFilter};
use crate::source::SourceAnalyser;
use crate::timestamps::{load_crcs, store_crcs, RootState, Timestamps};
use crate::transaction::TransactionContext;
use crate::usage::{UsageRecord, UsageSet};

const ATTR_KIND: &str = "kind";
const ATTR_BROKEN: &str = "broken";

/// What an index was built from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContentType {
    Source,
    Binary,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IndexType {
    Source,
    Binary,
    /// Nothing committed yet; becomes the wrapped type on the first commit.
    Empty(ContentType),
}

impl IndexType {
    pub fn content(self) -> ContentType {
        match self {
            IndexType::Source | IndexType::Empty(ContentType::Source) => ContentType::Source,
            IndexType::Binary | IndexType::Empty(ContentType::Binary) => ContentType::Binary,
        }
    }

    pub fn is_empty(self) -> bool {
        matches!(self, IndexType::Empty(_))
    }

    fn promoted(self) -> Self {
        match self.content() {
            ContentType::Source => IndexType::Source,
            ContentType::Binary => IndexType::Binary,
        }
    }

    fn attribute(self) -> &'static str {
        match self {
            IndexType::Source => "source",
            IndexType::Binary => "binary",
            IndexType::Empty(ContentType::Source) => "empty-source",
            IndexType::Empty(ContentType::Binary) => "empty-binary",
        }
    }

    fn from_attribute(value: &str) -> Option<Self> {
        Some(match value {
            "source" => IndexType::Source,
            "binary" => IndexType::Binary,
            "empty-source" => IndexType::Empty(ContentType::Source),
            "empty-binary" => IndexType::Empty(ContentType::Binary),
            _ => return None,
        })
    }
}

/// Lifecycle of an index. Moves only forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum State {
    New,
    Initialized,
}

/// Knobs shared by every index a manager opens.
#[derive(Clone)]
pub struct IndexOptions {
    pub usages: UsagesLevel,
    pub idents: IdentLevel,
    pub priority_wait: Duration,
    pub low_memory: Arc<dyn LowMemory>,
}

impl IndexOptions {
    pub fn from_config(config: &IndexConfig) -> Self {
        Self {
            usages: config.usages_level(),
            idents: config.idents,
            priority_wait: config.priority_wait(),
            low_memory: Arc::new(ProcessMemoryWatcher::from_config(config)),
        }
    }

    pub fn with_usages(mut self, usages: UsagesLevel) -> Self {
        self.usages = usages;
        self
    }

    pub fn with_low_memory(mut self, low_memory: Arc<dyn LowMemory>) -> Self {
        self.low_memory = low_memory;
        self
    }
}

impl Default for IndexOptions {
    fn default() -> Self {
        let config = IndexConfig::default();
        Self {
            usages: config.usages_level(),
            idents: config.idents,
            priority_wait: config.priority_wait(),
            low_memory: Arc::new(NoLowMemory),
        }
    }
}

impl fmt::Debug for IndexOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexOptions")
            .field("usages", &self.usages)
            .field("idents", &self.idents)
            .field("priority_wait", &self.priority_wait)
            .finish_non_exhaustive()
    }
}

/// Document frequencies of referenced types and of their packages.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReferenceFrequencies {
    pub types: BTreeMap<String, usize>,
    pub packages: BTreeMap<String, usize>,
}

/// Uncommitted documents of one edited file, consulted instead of the
/// committed documents recorded for that file.
struct DirtyOverlay {
    file: String,
    docs: MemIndex,
}

/// Change state of the pending transaction, written on commit.
#[derive(Debug, Default)]
struct PendingChangeState {
    crcs: Option<RootState>,
    timestamps: Option<Timestamps>,
    /// Remove the persisted change state before writing the above.
    reset: bool,
}

pub struct PersistentIndex {
    root: PathBuf,
    cache_dir: RootCacheDir,
    store: Arc<dyn DocumentStore>,
    options: IndexOptions,
    index_type: RwLock<IndexType>,
    state: Mutex<State>,
    gate: PriorityGate,
    attributes: Mutex<Properties>,
    packages: Mutex<Option<Arc<BTreeSet<String>>>>,
    dirty: Mutex<Option<DirtyOverlay>>,
    /// Sources written by the pending transaction.
    touched: Mutex<HashSet<String>>,
    pending_change: Mutex<PendingChangeState>,
    closed: AtomicBool,
}

impl PersistentIndex {
    /// Opens an index over `store`. A type persisted by an earlier commit wins
    /// over `requested`.
    pub fn open(
        root: &Path,
        cache_dir: RootCacheDir,
        store: Arc<dyn DocumentStore>,
        requested: ContentType,
        options: IndexOptions,
    ) -> Result<Arc<Self>> {
        let attributes = Properties::load(&cache_dir.attributes_path())?;
        let index_type = attributes
            .get(ATTR_KIND)
            .and_then(IndexType::from_attribute)
            .unwrap_or(IndexType::Empty(requested));
        tracing::debug!(
            target: "jref.usages.index",
            root = %root.display(),
            kind = index_type.attribute(),
            "opened usage index"
        );
        Ok(Arc::new(Self {
            root: root.to_path_buf(),
            gate: PriorityGate::new(options.priority_wait),
            cache_dir,
            store,
            options,
            index_type: RwLock::new(index_type),
            state: Mutex::new(State::New),
            attributes: Mutex::new(attributes),
            packages: Mutex::new(None),
            dirty: Mutex::new(None),
            touched: Mutex::new(HashSet::new()),
            pending_change: Mutex::new(PendingChangeState::default()),
            closed: AtomicBool::new(false),
        }))
    }

    /// Opens the disk-backed index of `root` below `cache_root`.
    pub fn open_on_disk(
        root: &Path,
        cache_root: &Path,
        requested: ContentType,
        options: IndexOptions,
    ) -> Result<Arc<Self>> {
        let cache_dir = RootCacheDir::new(cache_root, root)?;
        let store = Arc::new(DiskIndex::open(&cache_dir.refs_dir())?);
        Self::open(root, cache_dir, store, requested, options)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cache_dir(&self) -> &RootCacheDir {
        &self.cache_dir
    }

    pub fn options(&self) -> &IndexOptions {
        &self.options
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn index_type(&self) -> IndexType {
        *self.index_type.read()
    }

    pub(crate) fn set_index_type(&self, index_type: IndexType) {
        *self.index_type.write() = index_type;
    }

    pub fn state(&self) -> State {
        *self.state.lock()
    }

    /// Moves the lifecycle state. Moving backwards is a contract violation.
    pub fn transition(&self, to: State) -> Result<()> {
        let mut state = self.state.lock();
        if to < *state {
            return Err(IndexError::illegal_state(format!(
                "index of `{}` cannot move from {:?} back to {to:?}",
                self.root.display(),
                *state
            )));
        }
        *state = to;
        Ok(())
    }

    /// First access: an index whose persisted data was unreadable starts over
    /// from an empty store with no change state.
    fn ensure_initialized(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(IndexError::illegal_state(format!(
                "index of `{}` is closed",
                self.root.display()
            )));
        }
        if self.state() == State::Initialized {
            return Ok(());
        }
        if self.store.status() == IndexStatus::Invalid {
            tracing::warn!(
                target: "jref.usages.index",
                root = %self.root.display(),
                "index data is corrupt, rebuilding"
            );
            self.clear()?;
        }
        self.transition(State::Initialized)
    }

    pub fn is_valid(&self) -> bool {
        !self.closed.load(Ordering::Acquire) && self.store.status() != IndexStatus::Invalid
    }

    pub fn is_broken(&self) -> bool {
        self.attributes.lock().get(ATTR_BROKEN) == Some("true")
    }

    pub(crate) fn mark_broken(&self) -> Result<()> {
        let mut attributes = self.attributes.lock();
        attributes.set(ATTR_BROKEN, "true");
        attributes.store(&self.cache_dir.attributes_path())?;
        Ok(())
    }

    /// Committed documents matching `query`, with the dirty overlay applied.
    fn run_query(&self, query: &Query) -> Result<Vec<Document>> {
        self.ensure_initialized()?;
        let _read = self.gate.read();
        let dirty = self.dirty.lock();
        match &*dirty {
            None => Ok(self.store.query(query)?),
            Some(overlay) => {
                let committed = BooleanQuery::new()
                    .must(query.clone())
                    .must_not(codec::source_query(&overlay.file))
                    .build();
                let mut docs = self.store.query(&committed)?;
                docs.extend(overlay.docs.query(query)?);
                Ok(docs)
            }
        }
    }

    /// Types that use `name` in any (`Or`) or all (`And`) of `kinds`.
    pub fn search<T>(
        &self,
        name: &str,
        kinds: UsageSet,
        operator: Operator,
        scope: Option<&PackageFilter>,
        convert: impl FnMut(&Document) -> Option<T>,
    ) -> Result<Vec<T>> {
        let mut query = usages_query(name, kinds, operator);
        if let Some(scope) = scope {
            query = scope.apply(query);
        }
        Ok(self.run_query(&query)?.iter().filter_map(convert).collect())
    }

    pub fn get_declared_types<T>(
        &self,
        name: &str,
        kind: NameKind,
        scope: Option<&PackageFilter>,
        convert: impl FnMut(&Document) -> Option<T>,
    ) -> Result<Vec<T>> {
        let mut query = declared_types_query(name, kind);
        if let Some(scope) = scope {
            query = scope.apply(query);
        }
        Ok(self.run_query(&query)?.iter().filter_map(convert).collect())
    }

    /// Packages starting with `prefix`. With `direct_only` deeper packages are
    /// cut to the segment right after the prefix.
    pub fn get_package_names(&self, prefix: &str, direct_only: bool) -> Result<BTreeSet<String>> {
        let all = self.committed_packages()?;
        let mut names: BTreeSet<String> = all.iter().cloned().collect();
        if let Some(overlay) = &*self.dirty.lock() {
            for doc in overlay.docs.query(&Query::All)? {
                if let Some(pkg) = codec::package_name(&doc) {
                    names.insert(pkg.to_string());
                }
            }
        }

        Ok(names
            .into_iter()
            .filter(|pkg| !pkg.is_empty() && pkg.starts_with(prefix))
            .map(|pkg| {
                if !direct_only {
                    return pkg;
                }
                let rest = &pkg[prefix.len()..];
                let skip = usize::from(rest.starts_with('.'));
                match rest[skip..].find('.') {
                    Some(idx) => pkg[..prefix.len() + skip + idx].to_string(),
                    None => pkg,
                }
            })
            .collect())
    }

    fn committed_packages(&self) -> Result<Arc<BTreeSet<String>>> {
        if let Some(cached) = &*self.packages.lock() {
            return Ok(Arc::clone(cached));
        }
        self.ensure_initialized()?;
        let mut names = BTreeSet::new();
        {
            let _read = self.gate.read();
            self.store
                .query_terms(codec::FIELD_PACKAGE_NAME, "", &mut |term, _| {
                    names.insert(term.to_string());
                    ControlFlow::Continue(())
                })?;
        }
        let names = Arc::new(names);
        *self.packages.lock() = Some(Arc::clone(&names));
        Ok(names)
    }

    fn invalidate_packages(&self) {
        *self.packages.lock() = None;
    }

    pub fn get_references_frequencies(&self) -> Result<ReferenceFrequencies> {
        self.ensure_initialized()?;
        let mut frequencies = ReferenceFrequencies::default();
        let _read = self.gate.read();
        self.store
            .query_terms(codec::FIELD_REFERENCES, "", &mut |term, count| {
                if let Some((name, _)) = codec::decode_reference(term) {
                    *frequencies.types.entry(name.to_string()).or_default() += count;
                    let pkg = name.rfind('.').map_or("", |idx| &name[..idx]);
                    *frequencies.packages.entry(pkg.to_string()).or_default() += count;
                }
                ControlFlow::Continue(())
            })?;
        Ok(frequencies)
    }

    /// Source or file recorded for the class `class_name`.
    pub fn get_source_name(&self, class_name: &str) -> Result<Option<String>> {
        let docs = self.run_query(&codec::binary_name_query(class_name))?;
        Ok(docs
            .iter()
            .find_map(codec::source_name)
            .map(str::to_string))
    }

    /// Class names committed for any of the source `files`.
    pub(crate) fn committed_types_of(&self, files: &[&str]) -> Result<BTreeSet<String>> {
        if files.is_empty() {
            return Ok(BTreeSet::new());
        }
        self.ensure_initialized()?;
        let query = files
            .iter()
            .fold(BooleanQuery::new(), |query, file| {
                query.should(codec::source_query(file))
            })
            .build();
        let _read = self.gate.read();
        Ok(self
            .store
            .query(&query)?
            .iter()
            .filter_map(codec::binary_name)
            .map(|name| name.class_name().to_string())
            .collect())
    }

    pub fn writer(self: &Arc<Self>) -> UsagesWriter {
        UsagesWriter {
            index: Arc::clone(self),
        }
    }

    /// Analyser writing into this index as part of `tx`.
    pub fn binary_analyser(self: &Arc<Self>, tx: &mut TransactionContext) -> Result<BinaryAnalyser> {
        tx.register(self)?;
        Ok(BinaryAnalyser::new(
            self.writer(),
            self.cache_dir.clone(),
            &self.options,
        ))
    }

    pub fn source_analyser(self: &Arc<Self>, tx: &mut TransactionContext) -> Result<SourceAnalyser> {
        tx.register(self)?;
        Ok(SourceAnalyser::new(self.writer(), &self.options))
    }

    /// Replaces the dirty overlay with `records` of the edited `file`.
    pub fn set_dirty(&self, file: &str, records: Vec<UsageRecord>) -> Result<()> {
        let docs = MemIndex::new();
        let encoded = records
            .into_iter()
            .map(|mut record| {
                record.source.get_or_insert_with(|| file.to_string());
                codec::encode(&record)
            })
            .collect();
        docs.store(encoded, Vec::new(), true)?;
        *self.dirty.lock() = Some(DirtyOverlay {
            file: file.to_string(),
            docs,
        });
        Ok(())
    }

    pub fn clear_dirty(&self) {
        *self.dirty.lock() = None;
    }

    pub fn dirty_file(&self) -> Option<String> {
        self.dirty.lock().as_ref().map(|overlay| overlay.file.clone())
    }

    /// Root state of the last scan, as staged by the pending transaction or
    /// else as committed.
    pub(crate) fn previous_crcs(&self) -> Result<RootState> {
        let pending = self.pending_change.lock();
        if let Some(crcs) = &pending.crcs {
            return Ok(crcs.clone());
        }
        if pending.reset {
            return Ok(RootState::new());
        }
        load_crcs(&self.cache_dir)
    }

    /// Timestamps to check a new scan against, every key unseen.
    pub(crate) fn previous_timestamps(&self) -> Result<Timestamps> {
        let pending = self.pending_change.lock();
        if let Some(timestamps) = &pending.timestamps {
            let mut timestamps = timestamps.clone();
            timestamps.restart();
            return Ok(timestamps);
        }
        if pending.reset {
            return Ok(Timestamps::empty(&self.cache_dir));
        }
        Timestamps::load(&self.cache_dir)
    }

    pub(crate) fn stage_change_state(&self, crcs: RootState, timestamps: Option<Timestamps>) {
        let mut pending = self.pending_change.lock();
        pending.crcs = Some(crcs);
        if timestamps.is_some() {
            pending.timestamps = timestamps;
        }
    }

    /// Drops the change state when the pending transaction commits.
    pub(crate) fn stage_change_state_reset(&self) {
        *self.pending_change.lock() = PendingChangeState {
            reset: true,
            ..PendingChangeState::default()
        };
    }

    fn write_change_state(&self, pending: PendingChangeState) -> Result<()> {
        if pending.reset {
            remove_file_best_effort(&self.cache_dir.crc_path(), "usages.commit");
            remove_file_best_effort(&self.cache_dir.timestamps_path(), "usages.commit");
        }
        if let Some(crcs) = &pending.crcs {
            store_crcs(&self.cache_dir, crcs)?;
        }
        if let Some(timestamps) = &pending.timestamps {
            timestamps.persist()?;
        }
        Ok(())
    }

    fn stage(&self, docs: Vec<Document>, deletes: Vec<Query>) -> Result<()> {
        self.ensure_initialized()?;
        let _write = self.gate.write();
        self.store.tx_store(docs, deletes)?;
        Ok(())
    }

    /// Publishes the pending transaction and the change state it staged.
    ///
    /// The first successful commit fixes the index type; any commit clears a
    /// previous broken mark.
    pub fn commit(&self) -> Result<()> {
        self.ensure_initialized()?;
        {
            let _write = self.gate.write();
            self.store.commit()?;
        }
        self.invalidate_packages();
        let pending = std::mem::take(&mut *self.pending_change.lock());
        self.write_change_state(pending)?;

        let touched = std::mem::take(&mut *self.touched.lock());
        {
            let mut dirty = self.dirty.lock();
            if dirty.as_ref().is_some_and(|overlay| touched.contains(&overlay.file)) {
                *dirty = None;
            }
        }

        let promoted = {
            let mut index_type = self.index_type.write();
            *index_type = index_type.promoted();
            *index_type
        };
        let mut attributes = self.attributes.lock();
        attributes.set(ATTR_KIND, promoted.attribute());
        attributes.remove(ATTR_BROKEN);
        attributes.store(&self.cache_dir.attributes_path())?;
        Ok(())
    }

    pub fn rollback(&self) -> Result<()> {
        self.touched.lock().clear();
        *self.pending_change.lock() = PendingChangeState::default();
        self.restore_index_type();
        let _write = self.gate.write();
        self.store.rollback()?;
        Ok(())
    }

    /// Puts back the type fixed by the last commit, if any.
    fn restore_index_type(&self) {
        let committed = self
            .attributes
            .lock()
            .get(ATTR_KIND)
            .and_then(IndexType::from_attribute);
        if let Some(committed) = committed {
            self.set_index_type(committed);
        }
    }

    /// Drops every document and the change state, so the next scan rebuilds
    /// the root from scratch. Not transactional.
    pub fn clear(&self) -> Result<()> {
        {
            let _write = self.gate.write();
            self.store.clear()?;
        }
        remove_file_best_effort(&self.cache_dir.crc_path(), "usages.clear");
        remove_file_best_effort(&self.cache_dir.timestamps_path(), "usages.clear");
        self.touched.lock().clear();
        *self.pending_change.lock() = PendingChangeState::default();
        self.invalidate_packages();
        self.clear_dirty();
        tracing::debug!(
            target: "jref.usages.index",
            root = %self.root.display(),
            "cleared usage index"
        );
        Ok(())
    }

    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.clear_dirty();
        self.store.close()?;
        tracing::debug!(
            target: "jref.usages.index",
            root = %self.root.display(),
            "closed usage index"
        );
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for PersistentIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistentIndex")
            .field("root", &self.root)
            .field("type", &self.index_type())
            .field("state", &self.state())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Stages analyser output into a [`PersistentIndex`].
#[derive(Clone, Debug)]
pub struct UsagesWriter {
    index: Arc<PersistentIndex>,
}

impl UsagesWriter {
    pub fn index(&self) -> &Arc<PersistentIndex> {
        &self.index
    }

    /// Stages `deletes` followed by `records` as part of the pending
    /// transaction.
    pub fn delete_and_store(&self, records: Vec<UsageRecord>, deletes: Vec<DeleteKey>) -> Result<()> {
        let (docs, queries) = self.prepare(records, deletes);
        tracing::trace!(
            target: "jref.usages.index",
            root = %self.index.root.display(),
            docs = docs.len(),
            deletes = queries.len(),
            "staging usages"
        );
        self.index.stage(docs, queries)
    }

    /// Stages a partial batch while a scan is still running.
    pub fn delete_and_flush(&self, records: Vec<UsageRecord>, deletes: Vec<DeleteKey>) -> Result<()> {
        let (docs, queries) = self.prepare(records, deletes);
        tracing::trace!(
            target: "jref.usages.index",
            root = %self.index.root.display(),
            docs = docs.len(),
            deletes = queries.len(),
            "flushing usages"
        );
        self.index.stage(docs, queries)
    }

    /// Stages the removal of every document of the root.
    pub fn clear(&self) -> Result<()> {
        self.index.stage(Vec::new(), vec![Query::All])
    }

    pub fn rollback(&self) -> Result<()> {
        self.index.rollback()
    }

    fn prepare(&self, records: Vec<UsageRecord>, deletes: Vec<DeleteKey>) -> (Vec<Document>, Vec<Query>) {
        let mut touched = self.index.touched.lock();
        let queries = deletes
            .iter()
            .filter_map(|(class_name, file_name)| {
                if let Some(file) = file_name {
                    touched.insert(file.clone());
                }
                codec::delete_query(class_name.as_deref(), file_name.as_deref())
            })
            .collect();
        let docs = records
            .iter()
            .map(|record| {
                if let Some(source) = &record.source {
                    touched.insert(source.clone());
                }
                codec::encode(record)
            })
            .collect();
        (docs, queries)
    }
}

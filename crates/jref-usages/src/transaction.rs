//! Two-phase write transactions over several roots.
//!
//! A [`TransactionContext`] collects the indexes written during a scan and the
//! change events the scan produced. [`TransactionContext::commit`] runs the
//! stages [`compute_changes`], [`write_index`], [`mirror_artifacts`] and
//! [`publish_events`] in that order, so listeners never observe types whose
//! index write failed.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{IndexError, Result};
use crate::events::{ClassIndexListener, IndexEvent, RootsEvent, TypesEvent};
use crate::manager::IndexManager;
use crate::mirror::ArtifactMirror;
use crate::persistent::PersistentIndex;
use crate::root::Changes;

#[derive(Debug, Default)]
struct RootTypes {
    module: Option<String>,
    added: BTreeSet<String>,
    removed: BTreeSet<String>,
    changed: BTreeSet<String>,
}

/// Change events accumulated over a whole transaction.
#[derive(Debug, Default)]
pub struct ClassIndexEventsTransaction {
    added_roots: BTreeSet<PathBuf>,
    removed_roots: BTreeSet<PathBuf>,
    types: BTreeMap<PathBuf, RootTypes>,
    added_files: BTreeMap<PathBuf, BTreeSet<PathBuf>>,
    removed_files: BTreeMap<PathBuf, BTreeSet<PathBuf>>,
}

impl ClassIndexEventsTransaction {
    pub fn root_added(&mut self, root: &Path) {
        self.removed_roots.remove(root);
        self.added_roots.insert(root.to_path_buf());
    }

    pub fn root_removed(&mut self, root: &Path) {
        self.added_roots.remove(root);
        self.types.remove(root);
        self.removed_roots.insert(root.to_path_buf());
    }

    pub fn changes(&mut self, root: &Path, module: Option<&str>, changes: &Changes) {
        let entry = self.types.entry(root.to_path_buf()).or_default();
        if entry.module.is_none() {
            entry.module = module.map(str::to_string);
        }
        entry.added.extend(changes.added.iter().cloned());
        entry.removed.extend(changes.removed.iter().cloned());
        entry.changed.extend(changes.changed.iter().cloned());
    }

    pub fn cache_files_added(&mut self, root: &Path, files: impl IntoIterator<Item = PathBuf>) {
        self.added_files
            .entry(root.to_path_buf())
            .or_default()
            .extend(files);
    }

    pub fn cache_files_removed(&mut self, root: &Path, files: impl IntoIterator<Item = PathBuf>) {
        self.removed_files
            .entry(root.to_path_buf())
            .or_default()
            .extend(files);
    }

    pub fn is_empty(&self) -> bool {
        self.added_roots.is_empty()
            && self.removed_roots.is_empty()
            && self.types.is_empty()
            && self.added_files.is_empty()
            && self.removed_files.is_empty()
    }
}

/// Indexes written by a transaction.
#[derive(Default)]
pub struct PersistentIndexTransaction {
    indexes: Vec<Arc<PersistentIndex>>,
}

impl PersistentIndexTransaction {
    pub fn register(&mut self, index: &Arc<PersistentIndex>) {
        if !self.indexes.iter().any(|known| Arc::ptr_eq(known, index)) {
            self.indexes.push(Arc::clone(index));
        }
    }

    pub fn indexes(&self) -> &[Arc<PersistentIndex>] {
        &self.indexes
    }

    pub fn rollback(&self) {
        for index in &self.indexes {
            if let Err(err) = index.rollback() {
                tracing::warn!(
                    target: "jref.usages.tx",
                    root = %index.root().display(),
                    error = %err,
                    "rollback failed"
                );
            }
        }
    }
}

impl fmt::Debug for PersistentIndexTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.indexes.iter().map(|index| index.root()))
            .finish()
    }
}

/// Artifact changes of one root, handed to the [`ArtifactMirror`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MirrorBatch {
    pub root: PathBuf,
    pub deleted: Vec<PathBuf>,
    pub updated: Vec<PathBuf>,
}

/// Output of [`compute_changes`]: what the later stages publish.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommitPlan {
    pub events: Vec<IndexEvent>,
    pub mirror: Vec<MirrorBatch>,
}

impl CommitPlan {
    /// Forgets everything about `root`.
    pub fn drop_root(&mut self, root: &Path) {
        self.events
            .retain(|event| event.root().map_or(true, |event_root| event_root != root));
        self.mirror.retain(|batch| batch.root != root);
    }
}

/// Turns the accumulated changes into the ordered event list: added roots,
/// then per root removed, added and changed types, then removed roots.
pub fn compute_changes(events: &ClassIndexEventsTransaction) -> CommitPlan {
    let mut plan = CommitPlan::default();
    if !events.added_roots.is_empty() {
        plan.events.push(IndexEvent::RootsAdded(RootsEvent {
            roots: events.added_roots.iter().cloned().collect(),
        }));
    }
    for (root, types) in &events.types {
        let event = |names: &BTreeSet<String>| TypesEvent {
            root: root.clone(),
            module: types.module.clone(),
            types: names.iter().cloned().collect(),
        };
        if !types.removed.is_empty() {
            plan.events.push(IndexEvent::TypesRemoved(event(&types.removed)));
        }
        if !types.added.is_empty() {
            plan.events.push(IndexEvent::TypesAdded(event(&types.added)));
        }
        if !types.changed.is_empty() {
            plan.events.push(IndexEvent::TypesChanged(event(&types.changed)));
        }
    }
    if !events.removed_roots.is_empty() {
        plan.events.push(IndexEvent::RootsRemoved(RootsEvent {
            roots: events.removed_roots.iter().cloned().collect(),
        }));
    }

    let roots: BTreeSet<&PathBuf> = events
        .added_files
        .keys()
        .chain(events.removed_files.keys())
        .collect();
    for root in roots {
        let files = |map: &BTreeMap<PathBuf, BTreeSet<PathBuf>>| -> Vec<PathBuf> {
            map.get(root)
                .map(|files| files.iter().cloned().collect())
                .unwrap_or_default()
        };
        plan.mirror.push(MirrorBatch {
            root: root.clone(),
            deleted: files(&events.removed_files),
            updated: files(&events.added_files),
        });
    }
    plan
}

/// Commits every index. An index whose commit fails is rolled back, marked
/// broken, cleared and queued for a reindex; its root is returned.
pub fn write_index(indexes: &[Arc<PersistentIndex>], manager: &IndexManager) -> Vec<PathBuf> {
    let mut failed = Vec::new();
    for index in indexes {
        let Err(err) = index.commit() else {
            continue;
        };
        let root = index.root().to_path_buf();
        tracing::warn!(
            target: "jref.usages.tx",
            root = %root.display(),
            error = %err,
            "index commit failed, scheduling reindex"
        );
        if let Err(err) = index.rollback() {
            tracing::warn!(target: "jref.usages.tx", root = %root.display(), error = %err, "rollback failed");
        }
        if let Err(err) = index.mark_broken() {
            tracing::warn!(target: "jref.usages.tx", root = %root.display(), error = %err, "cannot mark index broken");
        }
        if let Err(err) = index.clear() {
            tracing::warn!(target: "jref.usages.tx", root = %root.display(), error = %err, "cannot clear broken index");
        }
        manager.schedule_reindex(&root);
        failed.push(root);
    }
    failed
}

/// Mirror failures are logged; they never undo committed index writes.
pub fn mirror_artifacts(plan: &CommitPlan, mirror: &dyn ArtifactMirror) {
    for batch in &plan.mirror {
        if let Err(err) = mirror.update(&batch.root, &batch.deleted, &batch.updated) {
            tracing::warn!(
                target: "jref.usages.tx",
                root = %batch.root.display(),
                error = %err,
                "artifact mirroring failed"
            );
        }
    }
}

pub fn publish_events(plan: CommitPlan, listeners: &[Arc<dyn ClassIndexListener>]) {
    for event in &plan.events {
        for listener in listeners {
            listener.on_event(event);
        }
    }
}

/// Ambient write transaction.
///
/// Every operation on a committed or rolled back context fails with
/// [`IndexError::IllegalState`]. Dropping an open context rolls it back.
pub struct TransactionContext {
    manager: IndexManager,
    events: ClassIndexEventsTransaction,
    indexes: PersistentIndexTransaction,
    closed: bool,
}

impl TransactionContext {
    pub fn begin(manager: &IndexManager) -> Result<Self> {
        manager.ensure_open()?;
        Ok(Self {
            manager: manager.clone(),
            events: ClassIndexEventsTransaction::default(),
            indexes: PersistentIndexTransaction::default(),
            closed: false,
        })
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(IndexError::illegal_state("transaction is already closed"));
        }
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        !self.closed
    }

    pub(crate) fn register(&mut self, index: &Arc<PersistentIndex>) -> Result<()> {
        self.ensure_open()?;
        self.indexes.register(index);
        Ok(())
    }

    pub(crate) fn root_added(&mut self, root: &Path) -> Result<()> {
        self.ensure_open()?;
        self.events.root_added(root);
        Ok(())
    }

    pub(crate) fn root_removed(&mut self, root: &Path) -> Result<()> {
        self.ensure_open()?;
        self.events.root_removed(root);
        Ok(())
    }

    /// Records what a scan of `root` changed.
    pub fn record_changes(&mut self, root: &Path, module: Option<&str>, changes: &Changes) -> Result<()> {
        self.ensure_open()?;
        self.events.changes(root, module, changes);
        Ok(())
    }

    pub fn add_cache_files(&mut self, root: &Path, files: impl IntoIterator<Item = PathBuf>) -> Result<()> {
        self.ensure_open()?;
        self.events.cache_files_added(root, files);
        Ok(())
    }

    pub fn remove_cache_files(&mut self, root: &Path, files: impl IntoIterator<Item = PathBuf>) -> Result<()> {
        self.ensure_open()?;
        self.events.cache_files_removed(root, files);
        Ok(())
    }

    pub fn commit(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.closed = true;

        let mut plan = compute_changes(&self.events);
        let failed = write_index(self.indexes.indexes(), &self.manager);
        for root in &failed {
            plan.drop_root(root);
        }
        mirror_artifacts(&plan, self.manager.mirror().as_ref());
        tracing::debug!(
            target: "jref.usages.tx",
            indexes = self.indexes.indexes().len(),
            events = plan.events.len(),
            failed = failed.len(),
            "transaction committed"
        );
        publish_events(plan, &self.manager.listeners());
        Ok(())
    }

    pub fn rollback(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.closed = true;
        self.indexes.rollback();
        tracing::debug!(
            target: "jref.usages.tx",
            indexes = self.indexes.indexes().len(),
            "transaction rolled back"
        );
        Ok(())
    }
}

impl Drop for TransactionContext {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;
            self.indexes.rollback();
        }
    }
}

impl fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionContext")
            .field("events", &self.events)
            .field("indexes", &self.indexes)
            .field("closed", &self.closed)
            .finish()
    }
}

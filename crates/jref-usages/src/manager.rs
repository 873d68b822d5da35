//! Process-wide registry of per-root usage indexes.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use jref_cache::{default_cache_root, RootCacheDir};
use jref_config::IndexConfig;
use jref_docindex::{DiskIndex, DocumentStore};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::{IndexError, Result};
use crate::events::ClassIndexListener;
use crate::mirror::ArtifactMirror;
use crate::persistent::{ContentType, IndexOptions, IndexType, PersistentIndex};
use crate::root::Changes;
use crate::transaction::TransactionContext;

/// Opens the document store backing a root's index.
pub trait StoreFactory: Send + Sync {
    fn open(&self, cache_dir: &RootCacheDir) -> Result<Arc<dyn DocumentStore>>;
}

/// Stores persisted under each root's `refs/` directory.
#[derive(Debug, Default)]
pub struct DiskStoreFactory;

impl StoreFactory for DiskStoreFactory {
    fn open(&self, cache_dir: &RootCacheDir) -> Result<Arc<dyn DocumentStore>> {
        Ok(Arc::new(DiskIndex::open(&cache_dir.refs_dir())?))
    }
}

#[derive(Default)]
struct Maps {
    /// Indexes that have been written to.
    durable: HashMap<PathBuf, Arc<PersistentIndex>>,
    /// Placeholders opened for queries only.
    transient: HashMap<PathBuf, Arc<PersistentIndex>>,
    /// Generated root -> the source root whose index answers for it.
    generated: HashMap<PathBuf, PathBuf>,
}

struct Inner {
    cache_root: PathBuf,
    options: IndexOptions,
    store_factory: Arc<dyn StoreFactory>,
    mirror: Arc<dyn ArtifactMirror>,
    maps: Mutex<Maps>,
    listeners: Mutex<Vec<(u64, Arc<dyn ClassIndexListener>)>>,
    next_listener: AtomicU64,
    pending_reindex: Mutex<BTreeSet<PathBuf>>,
    closed: AtomicBool,
}

/// Hands out one [`PersistentIndex`] per classpath root.
///
/// Cloning is cheap; clones share the registry.
#[derive(Clone)]
pub struct IndexManager {
    inner: Arc<Inner>,
}

impl IndexManager {
    /// Disk-backed manager for `config`. Without a configured cache directory
    /// indexes live under `~/.jref/cache`.
    pub fn init(config: &IndexConfig, mirror: Arc<dyn ArtifactMirror>) -> Result<Self> {
        let cache_root = match &config.cache_dir {
            Some(dir) => dir.clone(),
            None => default_cache_root()?,
        };
        Ok(Self::init_with(
            cache_root,
            IndexOptions::from_config(config),
            mirror,
            Arc::new(DiskStoreFactory),
        ))
    }

    pub fn init_with(
        cache_root: PathBuf,
        options: IndexOptions,
        mirror: Arc<dyn ArtifactMirror>,
        store_factory: Arc<dyn StoreFactory>,
    ) -> Self {
        tracing::debug!(
            target: "jref.usages",
            cache_root = %cache_root.display(),
            usages = options.usages.name(),
            "index manager initialised"
        );
        Self {
            inner: Arc::new(Inner {
                cache_root,
                options,
                store_factory,
                mirror,
                maps: Mutex::new(Maps::default()),
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(1),
                pending_reindex: Mutex::new(BTreeSet::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn cache_root(&self) -> &Path {
        &self.inner.cache_root
    }

    pub fn options(&self) -> &IndexOptions {
        &self.inner.options
    }

    pub(crate) fn mirror(&self) -> &Arc<dyn ArtifactMirror> {
        &self.inner.mirror
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(IndexError::illegal_state("index manager was torn down"));
        }
        Ok(())
    }

    fn open_index(&self, root: &Path, requested: ContentType) -> Result<Arc<PersistentIndex>> {
        let cache_dir = RootCacheDir::new(&self.inner.cache_root, root)?;
        let store = self.inner.store_factory.open(&cache_dir)?;
        PersistentIndex::open(root, cache_dir, store, requested, self.inner.options.clone())
    }

    /// The index answering queries for `root`.
    ///
    /// Roots registered with [`IndexManager::register_generated_root`] resolve
    /// to their source root's index. With `allow_create` an unknown root gets
    /// a transient placeholder typed from its persisted attributes.
    pub fn usages_query(&self, root: &Path, allow_create: bool) -> Result<Option<Arc<PersistentIndex>>> {
        self.ensure_open()?;
        let mut maps = self.inner.maps.lock();
        if let Some(index) = maps.durable.get(root).or_else(|| maps.transient.get(root)) {
            return Ok(Some(Arc::clone(index)));
        }
        if let Some(source_root) = maps.generated.get(root) {
            if let Some(index) = maps
                .durable
                .get(source_root)
                .or_else(|| maps.transient.get(source_root))
            {
                return Ok(Some(Arc::clone(index)));
            }
        }
        if !allow_create {
            return Ok(None);
        }

        let index = self.open_index(root, ContentType::Binary)?;
        maps.transient.insert(root.to_path_buf(), Arc::clone(&index));
        tracing::trace!(
            target: "jref.usages",
            root = %root.display(),
            "opened transient index"
        );
        Ok(Some(index))
    }

    /// The index `tx` writes `root` into. Promotes a transient placeholder or
    /// opens a new index, and records the root as added when it was not
    /// durable yet.
    ///
    /// A binary index asked to hold sources is closed and replaced by a source
    /// index whose documents and change state are dropped when `tx` commits.
    pub fn create_usages_query(
        &self,
        root: &Path,
        source: bool,
        tx: &mut TransactionContext,
    ) -> Result<Arc<PersistentIndex>> {
        self.ensure_open()?;
        tx.ensure_open()?;
        let requested = if source {
            ContentType::Source
        } else {
            ContentType::Binary
        };

        let mut maps = self.inner.maps.lock();
        let was_durable = maps.durable.contains_key(root);
        let existing = maps
            .durable
            .get(root)
            .cloned()
            .or_else(|| maps.transient.remove(root));
        let index = match existing {
            Some(index) if source && index.index_type() == IndexType::Binary => {
                tracing::info!(
                    target: "jref.usages",
                    root = %root.display(),
                    "root holds sources, replacing its binary index"
                );
                index.close()?;
                let replacement = self.open_index(root, ContentType::Source)?;
                replacement.set_index_type(IndexType::Empty(ContentType::Source));
                tx.register(&replacement)?;
                replacement.writer().clear()?;
                replacement.stage_change_state_reset();
                replacement
            }
            Some(index) => {
                if source && index.index_type() == IndexType::Empty(ContentType::Binary) {
                    index.set_index_type(IndexType::Empty(ContentType::Source));
                }
                index
            }
            None => self.open_index(root, requested)?,
        };
        maps.durable.insert(root.to_path_buf(), Arc::clone(&index));
        drop(maps);

        if !was_durable {
            tx.root_added(root)?;
        }
        Ok(index)
    }

    /// Closes and forgets the index of `root`.
    pub fn remove_root(&self, root: &Path, tx: &mut TransactionContext) -> Result<()> {
        self.ensure_open()?;
        tx.ensure_open()?;
        let removed = {
            let mut maps = self.inner.maps.lock();
            maps.generated.retain(|generated, source| generated != root && source != root);
            let durable = maps.durable.remove(root);
            let transient = maps.transient.remove(root);
            durable.or(transient)
        };
        if let Some(index) = removed {
            index.close()?;
            tx.root_removed(root)?;
        }
        Ok(())
    }

    /// Queries for `generated` are answered by the index of `source_root`.
    pub fn register_generated_root(&self, generated: &Path, source_root: &Path) {
        self.inner
            .maps
            .lock()
            .generated
            .insert(generated.to_path_buf(), source_root.to_path_buf());
    }

    /// Roots with a durable index.
    pub fn roots(&self) -> Vec<PathBuf> {
        let mut roots: Vec<PathBuf> = self.inner.maps.lock().durable.keys().cloned().collect();
        roots.sort();
        roots
    }

    pub fn subscribe(&self, listener: Arc<dyn ClassIndexListener>) -> Subscription {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().push((id, listener));
        Subscription {
            id,
            manager: Arc::downgrade(&self.inner),
        }
    }

    pub(crate) fn listeners(&self) -> Vec<Arc<dyn ClassIndexListener>> {
        self.inner
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }

    pub(crate) fn schedule_reindex(&self, root: &Path) {
        self.inner.pending_reindex.lock().insert(root.to_path_buf());
    }

    /// Roots whose index broke and needs a full rescan.
    pub fn take_pending_reindex(&self) -> Vec<PathBuf> {
        std::mem::take(&mut *self.inner.pending_reindex.lock())
            .into_iter()
            .collect()
    }

    /// Scans the binary root in its own transaction. Cancelled scans roll
    /// back.
    pub fn scan_binary_root(&self, root: &Path, cancel: &CancellationToken) -> Result<Changes> {
        let mut tx = TransactionContext::begin(self)?;
        let index = self.create_usages_query(root, false, &mut tx)?;
        let mut analyser = index.binary_analyser(&mut tx)?;
        let changes = analyser.analyse(root, cancel)?;
        if changes.done {
            tx.record_changes(root, None, &changes)?;
            tx.commit()?;
        } else {
            tx.rollback()?;
        }
        Ok(changes)
    }

    /// Closes every index and drops all listeners. The manager is unusable
    /// afterwards.
    pub fn teardown(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let indexes: Vec<Arc<PersistentIndex>> = {
            let mut maps = self.inner.maps.lock();
            let maps = std::mem::take(&mut *maps);
            maps.durable.into_values().chain(maps.transient.into_values()).collect()
        };
        for index in indexes {
            if let Err(err) = index.close() {
                tracing::warn!(
                    target: "jref.usages",
                    root = %index.root().display(),
                    error = %err,
                    "failed to close index"
                );
            }
        }
        self.inner.listeners.lock().clear();
        tracing::debug!(target: "jref.usages", "index manager torn down");
    }
}

impl fmt::Debug for IndexManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let maps = self.inner.maps.lock();
        f.debug_struct("IndexManager")
            .field("cache_root", &self.inner.cache_root)
            .field("durable", &maps.durable.len())
            .field("transient", &maps.transient.len())
            .finish()
    }
}

/// Listener registration; dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    manager: Weak<Inner>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(manager) = self.manager.upgrade() {
            manager.listeners.lock().retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventLog;
    use crate::mirror::NoMirror;
    use jref_docindex::MemIndex;

    struct MemoryStores;

    impl StoreFactory for MemoryStores {
        fn open(&self, _cache_dir: &RootCacheDir) -> Result<Arc<dyn DocumentStore>> {
            Ok(Arc::new(MemIndex::new()))
        }
    }

    fn manager(cache: &Path) -> IndexManager {
        IndexManager::init_with(
            cache.to_path_buf(),
            IndexOptions::default(),
            Arc::new(NoMirror),
            Arc::new(MemoryStores),
        )
    }

    #[test]
    fn placeholders_are_transient_until_written() {
        let cache = tempfile::tempdir().unwrap();
        let manager = manager(cache.path());
        let root = Path::new("/lib/a.jar");

        assert!(manager.usages_query(root, false).unwrap().is_none());
        let placeholder = manager.usages_query(root, true).unwrap().unwrap();
        assert_eq!(placeholder.index_type(), IndexType::Empty(ContentType::Binary));
        assert!(manager.roots().is_empty());

        let mut tx = TransactionContext::begin(&manager).unwrap();
        let durable = manager.create_usages_query(root, false, &mut tx).unwrap();
        assert!(Arc::ptr_eq(&placeholder, &durable));
        assert_eq!(manager.roots(), vec![root.to_path_buf()]);
        tx.commit().unwrap();

        let mut tx = TransactionContext::begin(&manager).unwrap();
        tx.commit().unwrap();
        assert!(manager
            .create_usages_query(root, false, &mut tx)
            .unwrap_err()
            .is_illegal_state());
    }

    #[test]
    fn generated_roots_redirect_to_their_source_root() {
        let cache = tempfile::tempdir().unwrap();
        let manager = manager(cache.path());
        let src = Path::new("/p/src");
        let generated = Path::new("/p/build/generated");

        let mut tx = TransactionContext::begin(&manager).unwrap();
        let index = manager.create_usages_query(src, true, &mut tx).unwrap();
        tx.commit().unwrap();

        manager.register_generated_root(generated, src);
        let redirected = manager.usages_query(generated, false).unwrap().unwrap();
        assert!(Arc::ptr_eq(&index, &redirected));
    }

    #[test]
    fn dropping_the_subscription_stops_delivery() {
        let cache = tempfile::tempdir().unwrap();
        let manager = manager(cache.path());
        let log = Arc::new(EventLog::new());
        let subscription = manager.subscribe(log.clone());

        let mut tx = TransactionContext::begin(&manager).unwrap();
        manager
            .create_usages_query(Path::new("/a"), false, &mut tx)
            .unwrap();
        tx.commit().unwrap();
        assert_eq!(log.take().len(), 1);

        drop(subscription);
        let mut tx = TransactionContext::begin(&manager).unwrap();
        manager
            .create_usages_query(Path::new("/b"), false, &mut tx)
            .unwrap();
        tx.commit().unwrap();
        assert!(log.is_empty());
    }

    #[test]
    fn binary_index_is_replaced_when_sources_show_up() {
        let cache = tempfile::tempdir().unwrap();
        let manager = manager(cache.path());
        let root = Path::new("/p/classes");

        let mut tx = TransactionContext::begin(&manager).unwrap();
        let binary = manager.create_usages_query(root, false, &mut tx).unwrap();
        let _analyser = binary.binary_analyser(&mut tx).unwrap();
        tx.commit().unwrap();
        assert_eq!(binary.index_type(), IndexType::Binary);

        let mut tx = TransactionContext::begin(&manager).unwrap();
        let source = manager.create_usages_query(root, true, &mut tx).unwrap();
        assert!(binary.is_closed());
        assert!(!Arc::ptr_eq(&binary, &source));
        assert_eq!(source.index_type(), IndexType::Empty(ContentType::Source));

        let _analyser = source.source_analyser(&mut tx).unwrap();
        tx.commit().unwrap();
        assert_eq!(source.index_type(), IndexType::Source);
    }

    #[test]
    fn teardown_closes_indexes_and_rejects_further_use() {
        let cache = tempfile::tempdir().unwrap();
        let manager = manager(cache.path());
        let index = manager.usages_query(Path::new("/a"), true).unwrap().unwrap();
        manager.teardown();
        assert!(index.is_closed());
        assert!(manager.usages_query(Path::new("/a"), true).unwrap_err().is_illegal_state());
        assert!(TransactionContext::begin(&manager).unwrap_err().is_illegal_state());
    }
}

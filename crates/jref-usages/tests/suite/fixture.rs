use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use jref_cache::RootCacheDir;
use jref_docindex::{DocIndexError, DocumentStore, IndexStatus, MemIndex, Query, StoreStats};
use jref_test_utils::ClassFileBuilder;
use jref_usages::{
    codec, DiskStoreFactory, IndexManager, IndexOptions, NoMirror, Operator, PersistentIndex,
    StoreFactory, UsageRecord, UsageSet,
};
use parking_lot::Mutex;
use tempfile::TempDir;

pub struct Fixture {
    pub cache: TempDir,
    pub work: TempDir,
    pub manager: IndexManager,
}

impl Fixture {
    pub fn on_disk() -> Self {
        Self::with(IndexOptions::default(), Arc::new(DiskStoreFactory))
    }

    pub fn with(options: IndexOptions, stores: Arc<dyn StoreFactory>) -> Self {
        let cache = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let manager = IndexManager::init_with(
            cache.path().to_path_buf(),
            options,
            Arc::new(NoMirror),
            stores,
        );
        Self {
            cache,
            work,
            manager,
        }
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.work.path().join(rel)
    }

    pub fn index(&self, root: &Path) -> Arc<PersistentIndex> {
        self.manager.usages_query(root, false).unwrap().unwrap()
    }
}

/// Dotted class names of the types that use `name` in any way.
pub fn users_of(index: &PersistentIndex, name: &str) -> Vec<String> {
    let mut users = index
        .search(name, UsageSet::empty(), Operator::Or, None, |doc| {
            codec::binary_name(doc).map(|n| n.class_name().to_string())
        })
        .unwrap();
    users.sort();
    users
}

/// Every committed record, ordered by binary name.
pub fn committed_records(index: &PersistentIndex) -> Vec<UsageRecord> {
    let mut records: Vec<UsageRecord> = index
        .store()
        .query(&Query::All)
        .unwrap()
        .iter()
        .filter_map(codec::decode)
        .collect();
    records.sort_by(|a, b| a.name.cmp(&b.name));
    records
}

pub fn class_using(internal_name: &str, super_internal: &str) -> Vec<u8> {
    ClassFileBuilder::new(internal_name)
        .super_class(Some(super_internal))
        .build()
}

pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// In-memory store whose commits can be made to fail.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemIndex,
    fail_commits: AtomicBool,
}

impl FlakyStore {
    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }
}

impl DocumentStore for FlakyStore {
    fn query(&self, query: &Query) -> jref_docindex::Result<Vec<jref_docindex::Document>> {
        self.inner.query(query)
    }

    fn count(&self, query: &Query) -> jref_docindex::Result<usize> {
        self.inner.count(query)
    }

    fn query_terms(
        &self,
        field: &str,
        prefix: &str,
        visitor: &mut dyn FnMut(&str, usize) -> std::ops::ControlFlow<()>,
    ) -> jref_docindex::Result<()> {
        self.inner.query_terms(field, prefix, visitor)
    }

    fn tx_store(
        &self,
        docs: Vec<jref_docindex::Document>,
        deletes: Vec<Query>,
    ) -> jref_docindex::Result<()> {
        self.inner.tx_store(docs, deletes)
    }

    fn commit(&self) -> jref_docindex::Result<()> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(DocIndexError::Commit("disk full".to_string()));
        }
        self.inner.commit()
    }

    fn rollback(&self) -> jref_docindex::Result<()> {
        self.inner.rollback()
    }

    fn clear(&self) -> jref_docindex::Result<()> {
        self.inner.clear()
    }

    fn close(&self) -> jref_docindex::Result<()> {
        self.inner.close()
    }

    fn status(&self) -> IndexStatus {
        self.inner.status()
    }

    fn stats(&self) -> StoreStats {
        self.inner.stats()
    }
}

/// Hands out [`FlakyStore`]s and remembers them.
#[derive(Default)]
pub struct FlakyStores {
    opened: Mutex<Vec<Arc<FlakyStore>>>,
}

impl FlakyStores {
    pub fn last(&self) -> Arc<FlakyStore> {
        Arc::clone(self.opened.lock().last().unwrap())
    }
}

impl StoreFactory for FlakyStores {
    fn open(&self, _cache_dir: &RootCacheDir) -> jref_usages::Result<Arc<dyn DocumentStore>> {
        let store = Arc::new(FlakyStore::default());
        self.opened.lock().push(Arc::clone(&store));
        Ok(store)
    }
}

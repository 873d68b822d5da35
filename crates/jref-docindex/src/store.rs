use std::ops::ControlFlow;

use parking_lot::RwLock;

use crate::document::Document;
use crate::error::{DocIndexError, Result};
use crate::query::Query;
use crate::segment::Segment;

/// Health of the committed data as observed when the store was opened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexStatus {
    /// No committed data exists yet.
    Empty,
    Valid,
    /// Persisted data could not be read; the store started empty.
    Invalid,
}

/// Write and commit counters, mostly useful to assert that a scan did not
/// touch the store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub tx_stores: u64,
    pub commits: u64,
    pub rollbacks: u64,
    pub clears: u64,
}

/// Inverted document store with a single pending transaction.
///
/// Readers only ever observe committed data. `tx_store` stages deletes
/// (applied first) and additions; `commit` publishes them and `rollback`
/// drops them.
pub trait DocumentStore: Send + Sync {
    fn query(&self, query: &Query) -> Result<Vec<Document>>;

    fn count(&self, query: &Query) -> Result<usize>;

    /// Visits the committed terms of `field` starting with `prefix`, in order,
    /// with their document frequency.
    fn query_terms(
        &self,
        field: &str,
        prefix: &str,
        visitor: &mut dyn FnMut(&str, usize) -> ControlFlow<()>,
    ) -> Result<()>;

    fn tx_store(&self, docs: Vec<Document>, deletes: Vec<Query>) -> Result<()>;

    fn commit(&self) -> Result<()>;

    fn rollback(&self) -> Result<()>;

    fn store(&self, docs: Vec<Document>, deletes: Vec<Query>, commit_now: bool) -> Result<()> {
        self.tx_store(docs, deletes)?;
        if commit_now {
            self.commit()?;
        }
        Ok(())
    }

    /// Drops all committed and pending documents.
    fn clear(&self) -> Result<()>;

    fn close(&self) -> Result<()>;

    fn status(&self) -> IndexStatus;

    fn stats(&self) -> StoreStats;
}

/// Converting front end over [`DocumentStore::store`].
pub trait DocumentStoreExt: DocumentStore {
    fn store_with<T, S>(
        &self,
        docs: impl IntoIterator<Item = T>,
        deletes: impl IntoIterator<Item = S>,
        to_document: impl FnMut(T) -> Document,
        to_query: impl FnMut(S) -> Query,
        commit_now: bool,
    ) -> Result<()> {
        self.store(
            docs.into_iter().map(to_document).collect(),
            deletes.into_iter().map(to_query).collect(),
            commit_now,
        )
    }
}

impl<D: DocumentStore + ?Sized> DocumentStoreExt for D {}

/// One `tx_store` call: deletes are applied before the additions.
#[derive(Debug)]
struct StagedBatch {
    deletes: Vec<Query>,
    docs: Vec<Document>,
}

/// Shared committed/pending bookkeeping for the store implementations.
///
/// The pending transaction is kept as the list of staged batches and only
/// applied to a copy of the committed segment when it is published.
#[derive(Debug, Default)]
pub(crate) struct Engine {
    committed: Segment,
    pending: Option<Vec<StagedBatch>>,
    closed: bool,
    stats: StoreStats,
}

impl Engine {
    pub(crate) fn with_committed(committed: Segment) -> Self {
        Self {
            committed,
            ..Self::default()
        }
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(DocIndexError::Closed);
        }
        Ok(())
    }

    pub(crate) fn query(&self, query: &Query) -> Result<Vec<Document>> {
        self.ensure_open()?;
        let set = self.committed.search(query)?;
        Ok(self.committed.documents(&set))
    }

    pub(crate) fn count(&self, query: &Query) -> Result<usize> {
        self.ensure_open()?;
        Ok(self.committed.search(query)?.len())
    }

    pub(crate) fn query_terms(
        &self,
        field: &str,
        prefix: &str,
        visitor: &mut dyn FnMut(&str, usize) -> ControlFlow<()>,
    ) -> Result<()> {
        self.ensure_open()?;
        for (term, freq) in self.committed.terms(field, prefix) {
            if visitor(term, freq).is_break() {
                break;
            }
        }
        Ok(())
    }

    pub(crate) fn tx_store(&mut self, docs: Vec<Document>, deletes: Vec<Query>) -> Result<()> {
        self.ensure_open()?;
        for delete in &deletes {
            delete.validate()?;
        }
        self.pending
            .get_or_insert_with(Vec::new)
            .push(StagedBatch { deletes, docs });
        self.stats.tx_stores += 1;
        Ok(())
    }

    /// Documents added by the pending transaction so far.
    pub(crate) fn pending_documents(&self) -> usize {
        self.pending
            .iter()
            .flatten()
            .map(|batch| batch.docs.len())
            .sum()
    }

    /// The snapshot `commit` would publish, if anything is staged.
    pub(crate) fn staged(&self) -> Result<Option<Segment>> {
        let Some(batches) = &self.pending else {
            return Ok(None);
        };
        let mut next = self.committed.clone();
        for batch in batches {
            for delete in &batch.deletes {
                next.delete(delete)?;
            }
            for doc in &batch.docs {
                next.add(doc.clone());
            }
        }
        Ok(Some(next.compact()))
    }

    pub(crate) fn publish(&mut self, segment: Segment) {
        self.committed = segment;
        self.pending = None;
        self.stats.commits += 1;
    }

    pub(crate) fn rollback(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.pending = None;
        self.stats.rollbacks += 1;
        Ok(())
    }

    pub(crate) fn clear(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.committed = Segment::default();
        self.pending = None;
        self.stats.clears += 1;
        Ok(())
    }

    pub(crate) fn close(&mut self) {
        self.closed = true;
        self.pending = None;
    }

    pub(crate) fn stats(&self) -> StoreStats {
        self.stats
    }

    pub(crate) fn committed(&self) -> &Segment {
        &self.committed
    }
}

/// Purely in-memory store. Used for dirty overlays and tests.
#[derive(Debug, Default)]
pub struct MemIndex {
    engine: RwLock<Engine>,
}

impl MemIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for MemIndex {
    fn query(&self, query: &Query) -> Result<Vec<Document>> {
        self.engine.read().query(query)
    }

    fn count(&self, query: &Query) -> Result<usize> {
        self.engine.read().count(query)
    }

    fn query_terms(
        &self,
        field: &str,
        prefix: &str,
        visitor: &mut dyn FnMut(&str, usize) -> ControlFlow<()>,
    ) -> Result<()> {
        self.engine.read().query_terms(field, prefix, visitor)
    }

    fn tx_store(&self, docs: Vec<Document>, deletes: Vec<Query>) -> Result<()> {
        self.engine.write().tx_store(docs, deletes)
    }

    fn commit(&self) -> Result<()> {
        let mut engine = self.engine.write();
        engine.ensure_open()?;
        if let Some(segment) = engine.staged()? {
            engine.publish(segment);
        }
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        self.engine.write().rollback()
    }

    fn clear(&self) -> Result<()> {
        self.engine.write().clear()
    }

    fn close(&self) -> Result<()> {
        self.engine.write().close();
        Ok(())
    }

    fn status(&self) -> IndexStatus {
        if self.engine.read().committed().len() == 0 {
            IndexStatus::Empty
        } else {
            IndexStatus::Valid
        }
    }

    fn stats(&self) -> StoreStats {
        self.engine.read().stats()
    }
}

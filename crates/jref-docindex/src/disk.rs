use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use jref_cache::{remove_file_best_effort, CacheLock};
use jref_storage::{read_archive_optional, write_archive_atomic, ArtifactKind, Compression};
use parking_lot::RwLock;

use crate::document::Document;
use crate::error::Result;
use crate::query::Query;
use crate::segment::Segment;
use crate::store::{DocumentStore, Engine, IndexStatus, StoreStats};

/// Bump whenever the persisted segment layout or field interpretation changes.
pub const SEGMENT_SCHEMA_VERSION: u32 = 1;

const SEGMENT_FILE: &str = "segment.bin";
const LOCK_FILE: &str = ".lock";

#[derive(rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
#[archive(check_bytes)]
struct SegmentArchive {
    documents: Vec<Document>,
}

/// Store persisted as a single compacted segment archive under `refs/`.
///
/// Commits rewrite `refs/segment.bin` atomically while holding `refs/.lock`,
/// so other processes see either the previous or the new snapshot.
#[derive(Debug)]
pub struct DiskIndex {
    dir: PathBuf,
    engine: RwLock<Engine>,
    status: RwLock<IndexStatus>,
}

impl DiskIndex {
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(SEGMENT_FILE);

        let (segment, status) = {
            let _lock = CacheLock::lock_exclusive(&dir.join(LOCK_FILE))?;
            match read_archive_optional::<SegmentArchive>(
                &path,
                ArtifactKind::DocumentSegment,
                SEGMENT_SCHEMA_VERSION,
            ) {
                Ok(Some(archive)) => (
                    Segment::from_documents(archive.documents),
                    IndexStatus::Valid,
                ),
                Ok(None) => (Segment::default(), IndexStatus::Empty),
                Err(err) => {
                    tracing::warn!(
                        target: "jref.docindex",
                        path = %path.display(),
                        error = %err,
                        "discarding unreadable index segment"
                    );
                    (Segment::default(), IndexStatus::Invalid)
                }
            }
        };
        tracing::debug!(
            target: "jref.docindex",
            dir = %dir.display(),
            documents = segment.len(),
            ?status,
            "opened disk index"
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            engine: RwLock::new(Engine::with_committed(segment)),
            status: RwLock::new(status),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn segment_path(&self) -> PathBuf {
        self.dir.join(SEGMENT_FILE)
    }
}

impl DocumentStore for DiskIndex {
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
        let staged_documents = engine.pending_documents();
        let Some(segment) = engine.staged()? else {
            return Ok(());
        };

        let archive = SegmentArchive {
            documents: segment.live_documents().cloned().collect(),
        };
        {
            let _lock = CacheLock::lock_exclusive(&self.dir.join(LOCK_FILE))?;
            write_archive_atomic(
                &self.segment_path(),
                ArtifactKind::DocumentSegment,
                SEGMENT_SCHEMA_VERSION,
                &archive,
                Compression::Zstd,
            )?;
        }
        tracing::debug!(
            target: "jref.docindex",
            dir = %self.dir.display(),
            documents = segment.len(),
            staged = staged_documents,
            "committed index segment"
        );
        engine.publish(segment);
        *self.status.write() = IndexStatus::Valid;
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        self.engine.write().rollback()
    }

    fn clear(&self) -> Result<()> {
        let mut engine = self.engine.write();
        engine.clear()?;
        let _lock = CacheLock::lock_exclusive(&self.dir.join(LOCK_FILE))?;
        remove_file_best_effort(&self.segment_path(), "docindex.clear");
        *self.status.write() = IndexStatus::Empty;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.engine.write().close();
        Ok(())
    }

    fn status(&self) -> IndexStatus {
        *self.status.read()
    }

    fn stats(&self) -> StoreStats {
        self.engine.read().stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DocIndexError;
    use pretty_assertions::assert_eq;

    fn named(name: &str) -> Document {
        Document::new().with("binaryName", name)
    }

    #[test]
    fn committed_documents_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let refs = dir.path().join("refs");

        let index = DiskIndex::open(&refs).unwrap();
        assert_eq!(index.status(), IndexStatus::Empty);
        index
            .store(vec![named("a.A"), named("a.B")], vec![], true)
            .unwrap();
        index
            .store(vec![], vec![Query::term("binaryName", "a.A")], true)
            .unwrap();
        index.close().unwrap();

        let reopened = DiskIndex::open(&refs).unwrap();
        assert_eq!(reopened.status(), IndexStatus::Valid);
        assert_eq!(
            reopened.query(&Query::All).unwrap(),
            vec![named("a.B")]
        );
    }

    #[test]
    fn uncommitted_writes_are_not_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let index = DiskIndex::open(dir.path()).unwrap();
        index.tx_store(vec![named("a.A")], vec![]).unwrap();
        drop(index);

        let reopened = DiskIndex::open(dir.path()).unwrap();
        assert_eq!(reopened.count(&Query::All).unwrap(), 0);
        assert!(!dir.path().join(SEGMENT_FILE).exists());
    }

    #[test]
    fn corrupt_segment_opens_invalid_and_clear_recovers() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SEGMENT_FILE), b"not an archive").unwrap();

        let index = DiskIndex::open(dir.path()).unwrap();
        assert_eq!(index.status(), IndexStatus::Invalid);
        index.clear().unwrap();
        assert_eq!(index.status(), IndexStatus::Empty);
        assert!(!dir.path().join(SEGMENT_FILE).exists());
    }

    #[test]
    fn commit_after_close_fails() {
        let dir = tempfile::tempdir().unwrap();
        let index = DiskIndex::open(dir.path()).unwrap();
        index.close().unwrap();
        assert!(matches!(index.commit(), Err(DocIndexError::Closed)));
    }
}

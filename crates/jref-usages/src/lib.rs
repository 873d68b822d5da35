//! Usage index for Java classpath roots.
//!
//! Every root (an archive, a class folder or a source folder) gets a
//! [`PersistentIndex`]: one document per type recording which other types it
//! references and how. Binary roots are scanned incrementally with
//! [`BinaryAnalyser`], sources are fed in as resolved trees through
//! [`SourceAnalyser`]. Writes from several roots are grouped in a
//! [`TransactionContext`] and become visible, together with the
//! [`IndexEvent`]s they cause, when it commits.
//!
//! [`IndexManager`] owns the per-root indexes.

pub mod binary;
mod binary_name;
pub mod codec;
mod error;
mod events;
mod gate;
mod long_map;
mod low_memory;
mod manager;
mod mirror;
mod persistent;
mod query;
pub mod root;
pub mod source;
mod timestamps;
mod transaction;
mod usage;

pub use binary::{BinaryAnalyser, ClassFilter, DeleteKey};
pub use binary_name::{BinaryName, ElementKind};
pub use error::{IndexError, Result};
pub use events::{ClassIndexListener, EventLog, IndexEvent, RootsEvent, TypesEvent};
pub use gate::{PriorityGate, ReadGuard, WriteGuard};
pub use long_map::LongHashMap;
pub use low_memory::{current_rss_bytes, LowMemory, ManualLowMemory, NoLowMemory, ProcessMemoryWatcher};
pub use manager::{DiskStoreFactory, IndexManager, StoreFactory, Subscription};
pub use mirror::{ArtifactMirror, DirectoryMirror, NoMirror, AUTOMATIC_BUILD_TAG, UPDATE_RESOURCES_TAG};
pub use persistent::{
    ContentType, IndexOptions, IndexType, PersistentIndex, ReferenceFrequencies, State, UsagesWriter,
};
pub use query::{camel_case_regex, declared_types_query, usages_query, NameKind, Operator, PackageFilter};
pub use root::{Changes, MemoryFileSystem, RootKind, VirtualFileSystem};
pub use source::SourceAnalyser;
pub use timestamps::{load_crcs, store_crcs, FileState, RootState, Timestamps};
pub use transaction::{
    compute_changes, mirror_artifacts, publish_events, write_index, ClassIndexEventsTransaction,
    CommitPlan, MirrorBatch, PersistentIndexTransaction, TransactionContext,
};
pub use usage::{UsageRecord, UsageSet, UsageType, UsagesData, JAVA_LANG_OBJECT};

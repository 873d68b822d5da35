//! Inverted document store backing the per-root usage index.
//!
//! Documents are flat `(field, value)` lists; every value is indexed verbatim
//! as one term. Queries cover exact terms, prefixes, `?`/`*` wildcards,
//! anchored regexes, boolean combinations and postings filters.
//!
//! [`DiskIndex`] persists committed snapshots with `jref-storage` under a
//! root's `refs/` directory. [`MemIndex`] keeps everything in memory.

mod disk;
mod docset;
mod document;
mod error;
mod query;
mod segment;
mod store;

pub use disk::{DiskIndex, SEGMENT_SCHEMA_VERSION};
pub use docset::DocSet;
pub use document::{Document, Field};
pub use error::{DocIndexError, Result};
pub use query::{BooleanQuery, Filter, Occur, Query};
pub use store::{DocumentStore, DocumentStoreExt, IndexStatus, MemIndex, StoreStats};

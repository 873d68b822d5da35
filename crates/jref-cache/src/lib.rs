//! Per-root cache directories for the usage index.
//!
//! Every classpath root gets `<cache_root>/index/<root-fingerprint>/` holding
//! its change-state property files and the `refs/` document segment. Writes go
//! through [`atomic_write`] and cross-process access to `refs/` is serialised by
//! [`CacheLock`].

mod cache_dir;
mod error;
mod lock;
mod properties;
mod util;

pub use cache_dir::{default_cache_root, root_fingerprint, RootCacheDir};
pub use error::{CacheError, Result};
pub use lock::CacheLock;
pub use properties::Properties;
pub use util::{atomic_write, atomic_write_with, now_millis, remove_file_best_effort};

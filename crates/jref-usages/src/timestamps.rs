//! Persisted change state of one root: resource timestamps and the CRC
//! snapshot of the previous scan.

use std::collections::HashSet;

use jref_cache::{Properties, RootCacheDir};

use crate::error::Result;
use crate::long_map::LongHashMap;

/// `(name, fingerprint)`; the fingerprint is a timestamp or CRC32, `0` when
/// unknown.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileState {
    pub name: String,
    pub fingerprint: i64,
}

impl FileState {
    pub fn new(name: impl Into<String>, fingerprint: i64) -> Self {
        Self {
            name: name.into(),
            fingerprint,
        }
    }
}

/// Root state snapshot, sorted by name with unique names.
pub type RootState = Vec<FileState>;

/// Last seen timestamp per resource key.
///
/// Every key loaded from disk starts out unseen. [`Timestamps::is_up_to_date`]
/// marks keys as seen, so whatever is left in [`Timestamps::unseen`] at the
/// end of a scan was not visited and has been deleted.
#[derive(Clone, Debug)]
pub struct Timestamps {
    path: std::path::PathBuf,
    map: LongHashMap<String>,
    unseen: HashSet<String>,
}

impl Timestamps {
    pub fn load(cache_dir: &RootCacheDir) -> Result<Self> {
        let path = cache_dir.timestamps_path();
        let props = Properties::load(&path)?;
        let mut map = LongHashMap::with_capacity(props.len().max(16));
        let mut unseen = HashSet::with_capacity(props.len());
        for (key, value) in props.iter() {
            match value.trim().parse::<i64>() {
                Ok(ts) => {
                    map.put(key.to_string(), ts);
                    unseen.insert(key.to_string());
                }
                Err(_) => tracing::debug!(
                    target: "jref.usages",
                    key,
                    value,
                    "skipping malformed timestamp entry"
                ),
            }
        }
        Ok(Self { path, map, unseen })
    }

    /// No recorded timestamps, persisted to the usual file of `cache_dir`.
    pub fn empty(cache_dir: &RootCacheDir) -> Self {
        Self {
            path: cache_dir.timestamps_path(),
            map: LongHashMap::with_capacity(16),
            unseen: HashSet::new(),
        }
    }

    /// Marks every key unseen again, as if freshly loaded.
    pub fn restart(&mut self) {
        self.unseen = self.map.iter().map(|(key, _)| key.clone()).collect();
    }

    /// Records `timestamp` for `key` and reports whether it matches the
    /// previously stored value.
    pub fn is_up_to_date(&mut self, key: &str, timestamp: i64) -> bool {
        self.unseen.remove(key);
        let previous = self.map.put(key.to_string(), timestamp);
        previous == Some(timestamp)
    }

    pub fn get(&self, key: &str) -> Option<i64> {
        self.map.get(key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Keys loaded from disk and not visited since, sorted.
    pub fn unseen(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.unseen.iter().cloned().collect();
        keys.sort();
        keys
    }

    pub fn unseen_is_empty(&self) -> bool {
        self.unseen.is_empty()
    }

    /// Drops unseen keys and rewrites the file. An empty map removes it.
    pub fn store(&mut self) -> Result<()> {
        self.settle();
        self.persist()
    }

    /// Drops unseen keys.
    pub fn settle(&mut self) {
        let unseen = std::mem::take(&mut self.unseen);
        self.map.retain(|key, _| !unseen.contains(key));
    }

    /// Rewrites the file with the current map. An empty map removes it.
    pub fn persist(&self) -> Result<()> {
        let props: Properties = self
            .map
            .iter()
            .map(|(key, ts)| (key.clone(), ts.to_string()))
            .collect();
        props.store(&self.path)?;
        Ok(())
    }
}

/// Reads the previous root state. Malformed lines are skipped.
pub fn load_crcs(cache_dir: &RootCacheDir) -> Result<RootState> {
    let props = Properties::load(&cache_dir.crc_path())?;
    let mut state: RootState = props
        .iter()
        .filter_map(|(name, value)| match value.trim().parse::<i64>() {
            Ok(fingerprint) => Some(FileState::new(name, fingerprint)),
            Err(_) => {
                tracing::debug!(
                    target: "jref.usages",
                    name,
                    value,
                    "skipping malformed crc entry"
                );
                None
            }
        })
        .collect();
    state.sort();
    Ok(state)
}

/// Persists `state`, or deletes the snapshot when it is empty.
pub fn store_crcs(cache_dir: &RootCacheDir, state: &[FileState]) -> Result<()> {
    let props: Properties = state
        .iter()
        .map(|file| (file.name.clone(), file.fingerprint.to_string()))
        .collect();
    props.store(&cache_dir.crc_path())?;
    Ok(())
}

use crate::error::CacheError;
use crate::util::{atomic_write, remove_file_best_effort};
use std::collections::BTreeMap;
use std::path::Path;

/// A `key=value` file as used for `crc.properties`, `timestamps.properties`
/// and `attributes.properties`.
///
/// Blank lines and `#` comments are ignored. Lines without `=` are skipped
/// with a debug log; a missing file loads as empty.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Properties {
    entries: BTreeMap<String, String>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self, CacheError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(err) => return Err(err.into()),
        };
        Ok(Self::parse(&text, path))
    }

    fn parse(text: &str, path: &Path) -> Self {
        let mut entries = BTreeMap::new();
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match line.split_once('=') {
                Some((key, value)) => {
                    entries.insert(key.trim().to_string(), value.trim().to_string());
                }
                None => {
                    tracing::debug!(
                        target: "jref.cache",
                        path = %path.display(),
                        line = idx + 1,
                        "skipping malformed properties line"
                    );
                }
            }
        }
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Atomically rewrites `path`. An empty set removes the file instead.
    pub fn store(&self, path: &Path) -> Result<(), CacheError> {
        if self.entries.is_empty() {
            remove_file_best_effort(path, "properties.store_empty");
            return Ok(());
        }
        let mut out = String::new();
        for (key, value) in &self.entries {
            out.push_str(key);
            out.push('=');
            out.push_str(value);
            out.push('\n');
        }
        atomic_write(path, out.as_bytes())
    }
}

impl FromIterator<(String, String)> for Properties {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn malformed_lines_and_comments_are_skipped() {
        let props = Properties::parse(
            "# header\njava.lang.String=12\n\ngarbage\n java.util.List = 7 \n",
            Path::new("crc.properties"),
        );
        assert_eq!(
            props.iter().collect::<Vec<_>>(),
            vec![("java.lang.String", "12"), ("java.util.List", "7")]
        );
    }

    #[test]
    fn store_then_load_and_empty_store_deletes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attributes.properties");

        let mut props = Properties::new();
        props.set("kind", "binary");
        props.set("broken", "true");
        props.store(&path).unwrap();
        assert_eq!(Properties::load(&path).unwrap(), props);

        Properties::new().store(&path).unwrap();
        assert!(!path.exists());
        assert!(Properties::load(&path).unwrap().is_empty());
    }
}

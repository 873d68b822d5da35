use std::collections::{BTreeMap, BTreeSet};

use crate::binary_name::BinaryName;

/// Every type extends it, so it is never recorded as a usage.
pub const JAVA_LANG_OBJECT: &str = "java.lang.Object";

/// Closed set of ways one type can use another.
///
/// The declaration order is the ordinal used by the fixed-width reference
/// suffix in stored documents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UsageType {
    SuperClass,
    SuperInterface,
    FieldReference,
    MethodReference,
    TypeReference,
    FunctionalImplementors,
}

impl UsageType {
    pub const ALL: [UsageType; 6] = [
        UsageType::SuperClass,
        UsageType::SuperInterface,
        UsageType::FieldReference,
        UsageType::MethodReference,
        UsageType::TypeReference,
        UsageType::FunctionalImplementors,
    ];

    pub fn ordinal(self) -> usize {
        self as usize
    }

    fn bit(self) -> u8 {
        1 << self.ordinal()
    }
}

/// Bitset over [`UsageType`].
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct UsageSet(u8);

impl UsageSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn of(kinds: &[UsageType]) -> Self {
        kinds.iter().copied().collect()
    }

    pub fn insert(&mut self, kind: UsageType) {
        self.0 |= kind.bit();
    }

    pub fn contains(self, kind: UsageType) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn contains_all(self, other: UsageSet) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: UsageSet) -> bool {
        self.0 & other.0 != 0
    }

    pub fn union(self, other: UsageSet) -> Self {
        Self(self.0 | other.0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(self) -> impl Iterator<Item = UsageType> {
        UsageType::ALL.into_iter().filter(move |kind| self.contains(*kind))
    }

    /// `+` or `-` per kind, in ordinal order.
    pub fn to_suffix(self) -> String {
        UsageType::ALL
            .iter()
            .map(|kind| if self.contains(*kind) { '+' } else { '-' })
            .collect()
    }

    pub fn from_suffix(suffix: &str) -> Option<Self> {
        if suffix.len() != UsageType::ALL.len() {
            return None;
        }
        let mut set = Self::empty();
        for (kind, c) in UsageType::ALL.iter().zip(suffix.chars()) {
            match c {
                '+' => set.insert(*kind),
                '-' => {}
                _ => return None,
            }
        }
        Some(set)
    }
}

impl std::fmt::Debug for UsageSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl FromIterator<UsageType> for UsageSet {
    fn from_iter<I: IntoIterator<Item = UsageType>>(iter: I) -> Self {
        let mut set = Self::empty();
        for kind in iter {
            set.insert(kind);
        }
        set
    }
}

/// Usages and identifiers collected for one declared type.
///
/// Reference names are dotted binary names. A stored reference always has at
/// least one usage kind.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UsagesData {
    usages: BTreeMap<String, UsageSet>,
    feature_idents: BTreeSet<String>,
    idents: BTreeSet<String>,
}

impl UsagesData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_usage(&mut self, name: impl Into<String>, kind: UsageType) {
        self.add_usages(name, UsageSet::of(&[kind]));
    }

    pub fn add_usages(&mut self, name: impl Into<String>, kinds: UsageSet) {
        let name = name.into();
        if kinds.is_empty() || name == JAVA_LANG_OBJECT {
            return;
        }
        let entry = self.usages.entry(name).or_default();
        *entry = entry.union(kinds);
    }

    pub fn has_usage(&self, name: &str) -> bool {
        self.usages.contains_key(name)
    }

    pub fn usage(&self, name: &str) -> Option<UsageSet> {
        self.usages.get(name).copied()
    }

    pub fn usages(&self) -> impl Iterator<Item = (&str, UsageSet)> {
        self.usages.iter().map(|(name, set)| (name.as_str(), *set))
    }

    pub fn add_feature_ident(&mut self, ident: impl Into<String>) {
        self.feature_idents.insert(ident.into());
    }

    pub fn feature_idents(&self) -> impl Iterator<Item = &str> {
        self.feature_idents.iter().map(String::as_str)
    }

    pub fn add_ident(&mut self, ident: impl Into<String>) {
        self.idents.insert(ident.into());
    }

    pub fn idents(&self) -> impl Iterator<Item = &str> {
        self.idents.iter().map(String::as_str)
    }

    pub fn merge(&mut self, other: UsagesData) {
        for (name, set) in other.usages {
            self.add_usages(name, set);
        }
        self.feature_idents.extend(other.feature_idents);
        self.idents.extend(other.idents);
    }

    pub fn is_empty(&self) -> bool {
        self.usages.is_empty() && self.feature_idents.is_empty() && self.idents.is_empty()
    }

    /// Reference names whose usage set includes `kind`.
    pub fn names_with(&self, kind: UsageType) -> BTreeSet<&str> {
        self.usages
            .iter()
            .filter(|(_, set)| set.contains(kind))
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// One declared type with everything recorded for it, ready to be encoded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UsageRecord {
    pub name: BinaryName,
    /// Resource the type was read from, when deletes address it by file.
    pub source: Option<String>,
    pub data: UsagesData,
}

impl UsageRecord {
    pub fn new(name: BinaryName, source: Option<String>, data: UsagesData) -> Self {
        Self { name, source, data }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_encodes_ordinals_left_to_right() {
        let set = UsageSet::of(&[UsageType::SuperClass, UsageType::TypeReference]);
        assert_eq!(set.to_suffix(), "+---+-");
        assert_eq!(UsageSet::from_suffix("+---+-"), Some(set));
        assert_eq!(UsageSet::from_suffix("+---+"), None);
        assert_eq!(UsageSet::from_suffix("+---+?"), None);
    }

    #[test]
    fn one_name_accumulates_several_kinds() {
        let mut data = UsagesData::new();
        data.add_usage("java.io.IOException", UsageType::TypeReference);
        data.add_usage("java.io.IOException", UsageType::MethodReference);
        data.add_usages("java.util.List", UsageSet::empty());
        data.add_usage(JAVA_LANG_OBJECT, UsageType::SuperClass);

        assert!(!data.has_usage("java.util.List"));
        assert!(!data.has_usage(JAVA_LANG_OBJECT));
        let set = data.usage("java.io.IOException").unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.contains_all(UsageSet::of(&[UsageType::MethodReference])));
        assert!(!set.contains(UsageType::SuperClass));
    }
}

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of a declared element, encoded as the trailing character of a
/// [`BinaryName`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Class,
    Interface,
    Enum,
    Annotation,
    Record,
    Module,
}

impl ElementKind {
    pub fn kind_char(self, local: bool) -> char {
        let c = match self {
            ElementKind::Class => 'C',
            ElementKind::Interface => 'I',
            ElementKind::Enum => 'E',
            ElementKind::Annotation => 'A',
            ElementKind::Record => 'R',
            ElementKind::Module => return 'M',
        };
        if local {
            c.to_ascii_lowercase()
        } else {
            c
        }
    }

    /// Decodes a kind char into `(kind, is_local)`.
    pub fn from_kind_char(c: char) -> Option<(Self, bool)> {
        let kind = match c.to_ascii_uppercase() {
            'C' => ElementKind::Class,
            'I' => ElementKind::Interface,
            'E' => ElementKind::Enum,
            'A' => ElementKind::Annotation,
            'R' => ElementKind::Record,
            'M' if c == 'M' => ElementKind::Module,
            _ => return None,
        };
        Some((kind, c.is_ascii_lowercase()))
    }
}

/// `pkg.Outer$Inner` followed by a single kind char, plus the offset where
/// the simple name starts.
///
/// Ordering is the string order of the raw form.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BinaryName {
    raw: String,
    simple_name_index: usize,
}

impl BinaryName {
    pub fn new(class_name: &str, kind: ElementKind, local: bool, simple_name_index: usize) -> Self {
        let mut raw = String::with_capacity(class_name.len() + 1);
        raw.push_str(class_name);
        raw.push(kind.kind_char(local));
        Self {
            raw,
            simple_name_index: simple_name_index.min(class_name.len()),
        }
    }

    /// Simple name index derived from the last `.` or `$` of `class_name`.
    pub fn with_derived_index(class_name: &str, kind: ElementKind, local: bool) -> Self {
        let index = match kind {
            ElementKind::Module => 0,
            _ => class_name.rfind(['.', '$']).map_or(0, |idx| idx + 1),
        };
        Self::new(class_name, kind, local, index)
    }

    /// Rebuilds a name from its raw stored form. Returns `None` when the kind
    /// char is missing or unknown.
    pub fn from_raw(raw: &str, simple_name_index: usize) -> Option<Self> {
        let last = raw.chars().last()?;
        ElementKind::from_kind_char(last)?;
        let class_len = raw.len() - last.len_utf8();
        Some(Self {
            raw: raw.to_string(),
            simple_name_index: simple_name_index.min(class_len),
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn simple_name_index(&self) -> usize {
        self.simple_name_index
    }

    /// The binary class name without the kind char.
    pub fn class_name(&self) -> &str {
        &self.raw[..self.raw.len() - 1]
    }

    pub fn kind(&self) -> ElementKind {
        self.decoded().0
    }

    pub fn is_local(&self) -> bool {
        self.decoded().1
    }

    pub fn simple_name(&self) -> &str {
        &self.class_name()[self.simple_name_index..]
    }

    /// Package of a type; empty for the default package and for modules.
    pub fn package_name(&self) -> &str {
        if self.kind() == ElementKind::Module {
            return "";
        }
        let class_name = self.class_name();
        class_name.rfind('.').map_or("", |idx| &class_name[..idx])
    }

    fn decoded(&self) -> (ElementKind, bool) {
        self.raw
            .chars()
            .last()
            .and_then(ElementKind::from_kind_char)
            .unwrap_or((ElementKind::Class, false))
    }
}

impl fmt::Debug for BinaryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.raw, self.simple_name_index)
    }
}

impl fmt::Display for BinaryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.class_name())
    }
}

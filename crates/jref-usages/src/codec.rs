//! Mapping between [`UsageRecord`]s and index documents.
//!
//! One document per declared type. Each reference is stored as the referenced
//! name followed by one `+`/`-` per [`UsageType`], in ordinal order, so both
//! "any usage" and "usage of a given kind" are plain wildcard lookups.

use jref_docindex::{Document, Query};

use crate::binary_name::BinaryName;
use crate::usage::{UsageRecord, UsageSet, UsageType, UsagesData};

pub const FIELD_PACKAGE_NAME: &str = "packageName";
pub const FIELD_BINARY_NAME: &str = "binaryName";
pub const FIELD_SIMPLE_NAME: &str = "simpleName";
pub const FIELD_CASE_INSENSITIVE_NAME: &str = "ciName";
pub const FIELD_REFERENCES: &str = "references";
pub const FIELD_FEATURE_IDENTS: &str = "fids";
pub const FIELD_CASE_INSENSITIVE_FEATURE_IDENTS: &str = "cifids";
pub const FIELD_IDENTS: &str = "ids";
pub const FIELD_SOURCE: &str = "source";

/// Width of the usage suffix on every `references` value.
pub const USAGE_SUFFIX_LEN: usize = UsageType::ALL.len();

pub fn encode(record: &UsageRecord) -> Document {
    let name = &record.name;
    let mut doc = Document::new();
    doc.add(FIELD_PACKAGE_NAME, name.package_name())
        .add(FIELD_BINARY_NAME, name.raw())
        .add(FIELD_SIMPLE_NAME, name.simple_name())
        .add(FIELD_CASE_INSENSITIVE_NAME, name.simple_name().to_lowercase());
    for (reference, kinds) in record.data.usages() {
        doc.add(FIELD_REFERENCES, encode_reference(reference, kinds));
    }
    for ident in record.data.feature_idents() {
        doc.add(FIELD_FEATURE_IDENTS, ident);
        doc.add(FIELD_CASE_INSENSITIVE_FEATURE_IDENTS, ident.to_lowercase());
    }
    for ident in record.data.idents() {
        doc.add(FIELD_IDENTS, ident);
    }
    if let Some(source) = &record.source {
        doc.add(FIELD_SOURCE, source.as_str());
    }
    doc
}

pub fn encode_reference(name: &str, kinds: UsageSet) -> String {
    let mut term = String::with_capacity(name.len() + USAGE_SUFFIX_LEN);
    term.push_str(name);
    term.push_str(&kinds.to_suffix());
    term
}

/// Splits a `references` value into the referenced name and its kinds.
pub fn decode_reference(term: &str) -> Option<(&str, UsageSet)> {
    let split = term.len().checked_sub(USAGE_SUFFIX_LEN)?;
    if !term.is_char_boundary(split) {
        return None;
    }
    let (name, suffix) = term.split_at(split);
    let kinds = UsageSet::from_suffix(suffix)?;
    (!name.is_empty() && !kinds.is_empty()).then_some((name, kinds))
}

pub fn binary_name(doc: &Document) -> Option<BinaryName> {
    let raw = doc.get(FIELD_BINARY_NAME)?;
    let simple = doc.get(FIELD_SIMPLE_NAME)?;
    let class_len = raw.len().checked_sub(1)?;
    let index = class_len.checked_sub(simple.len())?;
    BinaryName::from_raw(raw, index)
}

pub fn simple_name(doc: &Document) -> Option<&str> {
    doc.get(FIELD_SIMPLE_NAME)
}

pub fn package_name(doc: &Document) -> Option<&str> {
    doc.get(FIELD_PACKAGE_NAME)
}

pub fn is_local(doc: &Document) -> bool {
    binary_name(doc).is_some_and(|name| name.is_local())
}

pub fn source_name(doc: &Document) -> Option<&str> {
    doc.get(FIELD_SOURCE)
}

/// Recovers the usages and identifiers stored in `doc`.
pub fn usages(doc: &Document) -> UsagesData {
    let mut data = UsagesData::new();
    for term in doc.get_all(FIELD_REFERENCES) {
        match decode_reference(term) {
            Some((name, kinds)) => data.add_usages(name, kinds),
            None => tracing::debug!(
                target: "jref.usages.index",
                term,
                "skipping malformed reference term"
            ),
        }
    }
    for ident in doc.get_all(FIELD_FEATURE_IDENTS) {
        data.add_feature_ident(ident);
    }
    for ident in doc.get_all(FIELD_IDENTS) {
        data.add_ident(ident);
    }
    data
}

pub fn decode(doc: &Document) -> Option<UsageRecord> {
    Some(UsageRecord::new(
        binary_name(doc)?,
        source_name(doc).map(str::to_string),
        usages(doc),
    ))
}

/// Matches every document declared under `class_name`, whatever its kind.
pub fn binary_name_query(class_name: &str) -> Query {
    Query::wildcard(FIELD_BINARY_NAME, format!("{class_name}?"))
}

pub fn source_query(source: &str) -> Query {
    Query::term(FIELD_SOURCE, source)
}

/// Delete query for `(class_name, file_name)`. A file name takes precedence:
/// everything recorded from that resource goes.
pub fn delete_query(class_name: Option<&str>, file_name: Option<&str>) -> Option<Query> {
    match (class_name, file_name) {
        (_, Some(file)) => Some(source_query(file)),
        (Some(class), None) => Some(binary_name_query(class)),
        (None, None) => None,
    }
}

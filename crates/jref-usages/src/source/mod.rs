//! Source-side analysis: resolved trees in, usage records out.

pub mod tree;
mod visitor;

use std::collections::BTreeSet;

use jref_config::{IdentLevel, UsagesLevel};

pub use visitor::{visit, Role, SourceUsages};

use crate::binary::DeleteKey;
use crate::binary_name::BinaryName;
use crate::error::Result;
use crate::persistent::{IndexOptions, UsagesWriter};
use crate::root::Changes;
use crate::usage::UsageRecord;
use tree::CompilationUnit;

/// Buffers the records of analysed compilation units and stages them through
/// a [`UsagesWriter`]. Documents are keyed by the unit's file name, so
/// re-analysing a file replaces everything it produced before.
#[derive(Debug)]
pub struct SourceAnalyser {
    writer: UsagesWriter,
    level: UsagesLevel,
    idents: IdentLevel,
    refs: Vec<UsageRecord>,
    to_delete: Vec<DeleteKey>,
}

impl SourceAnalyser {
    pub fn new(writer: UsagesWriter, options: &IndexOptions) -> Self {
        Self {
            writer,
            level: options.usages,
            idents: options.idents,
            refs: Vec::new(),
            to_delete: Vec::new(),
        }
    }

    /// Analyses `unit` and returns its top-level types that do not match the
    /// file name.
    pub fn analyse(&mut self, unit: &CompilationUnit) -> Vec<(BinaryName, String)> {
        let usages = visit(unit, self.level, self.idents);
        tracing::trace!(
            target: "jref.usages.scan",
            file = %unit.file_name,
            types = usages.records.len(),
            "analysed compilation unit"
        );
        self.to_delete.push((None, Some(unit.file_name.clone())));
        self.refs.extend(usages.records);
        usages.aux_top_level
    }

    /// Records of `unit` for [`PersistentIndex::set_dirty`](crate::PersistentIndex::set_dirty),
    /// without buffering anything.
    pub fn dirty_records(&self, unit: &CompilationUnit) -> Vec<UsageRecord> {
        visit(unit, self.level, self.idents).records
    }

    /// Schedules removal of everything recorded for a deleted source file.
    pub fn delete(&mut self, file_name: &str) {
        self.to_delete.push((None, Some(file_name.to_string())));
    }

    /// Stages the buffer and reports its types against what was committed
    /// for the same files.
    pub fn store(&mut self) -> Result<Changes> {
        let refs = std::mem::take(&mut self.refs);
        let deletes = std::mem::take(&mut self.to_delete);
        let files: Vec<&str> = deletes
            .iter()
            .filter_map(|(_, file)| file.as_deref())
            .collect();
        let old = self.writer.index().committed_types_of(&files)?;
        let new: BTreeSet<String> = refs
            .iter()
            .map(|record| record.name.class_name().to_string())
            .collect();
        let changes = Changes {
            done: true,
            added: new.difference(&old).cloned().collect(),
            removed: old.difference(&new).cloned().collect(),
            changed: new.intersection(&old).cloned().collect(),
            ..Changes::default()
        };
        self.writer.delete_and_store(refs, deletes)?;
        tracing::debug!(
            target: "jref.usages.scan",
            root = %self.writer.index().root().display(),
            added = changes.added.len(),
            removed = changes.removed.len(),
            changed = changes.changed.len(),
            "sources stored"
        );
        Ok(changes)
    }
}

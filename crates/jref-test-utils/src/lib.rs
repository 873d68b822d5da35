//! Utilities shared by jref tests.
//!
//! [`ClassFileBuilder`] assembles small but well-formed class files so the
//! analysers can be exercised without a Java toolchain, and the fixture
//! helpers lay them out as folders or jars.

mod class_builder;
mod fixture_fs;

pub use class_builder::{ClassFileBuilder, FieldSpec, Insn, MethodSpec};
pub use fixture_fs::{bump_mtime, write_class_tree, write_jar};

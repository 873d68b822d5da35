//! Integration test harness for `jref-classfile`.
//!
//! All integration tests are compiled into a single test binary.

mod suite;

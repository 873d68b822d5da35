//! Integration test harness for `jref-usages`.
//!
//! All integration tests are compiled into a single test binary.

mod suite;

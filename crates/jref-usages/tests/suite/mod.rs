// Consolidated integration test suite.
mod binary_roots;
mod fixture;
mod source_roots;
mod transactions;

// Consolidated integration test suite.
mod member_scan;
mod parse_class;

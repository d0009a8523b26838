//! Unit tests for the public configuration, catalog and dialect surfaces
//!
//! Pass-level behavior is tested next to each pass; these cover what callers
//! of the library (and the `hogqlc` binary) configure from outside.

mod catalog_tests;
mod config_tests;
mod dialect_tests;

//! Integration tests - the full compile pipeline through the public API
//!
//! These tests build query ASTs, compile them against the standard schema
//! and check the generated SQL and parameters.

mod dialect_tests;
mod harness;
mod pipeline_tests;
mod pushdown_tests;

//! HogQL compiler - analytics queries to backend SQL
//!
//! Queries are written against a stable logical schema (events, persons,
//! sessions and their semi-structured properties); this crate compiles them
//! for the storage actually in use:
//! - Scope and type resolution
//! - WHERE pushdown into virtual-table joins
//! - Property access strategy selection (dedicated columns, side tables, maps, JSON)
//! - Lazy join materialization
//! - SQL generation for ClickHouse and Postgres, or HogQL pretty printing
//!
//! The entry point is [`compiler::compile`].

pub mod catalog;
pub mod compiler;
pub mod config;
pub mod errors;
pub mod join_materializer;
pub mod optimizer;
pub mod property_access;
pub mod query_ast;
pub mod resolver;
pub mod sql_generator;

pub use compiler::{compile, CompileContext};
pub use errors::{CompileError, CompileResult};
pub use sql_generator::{Dialect, PrintedQuery};

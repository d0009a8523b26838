//! Errors raised while loading catalog metadata.
//!
//! These happen before compilation starts (YAML parsing and validation) and
//! never surface as [`crate::errors::CompileError`].

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CatalogError {
    #[error("Failed to read materialization catalog: {error}")]
    ReadError { error: String },

    #[error("Failed to parse materialization catalog: {error}")]
    ParseError { error: String },

    #[error("Property `{key}` on `{table}.{column}` is declared by more than one {kind} entry")]
    DuplicateEntry {
        kind: &'static str,
        table: String,
        column: String,
        key: String,
    },

    #[error("Invalid materialization entry for `{table}.{column}`: {message}")]
    InvalidEntry {
        table: String,
        column: String,
        message: String,
    },
}

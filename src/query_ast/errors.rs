//! Error types for AST shape violations.
//!
//! These mean a tree broke the contract between the parser and the compiler
//! (or between two passes). They are never caused by user input that the
//! parser accepted.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AstError {
    #[error("{operator} with no operands")]
    EmptyBooleanOperator { operator: &'static str },

    #[error("{node} is not valid in {position}")]
    UnexpectedNode {
        node: &'static str,
        position: &'static str,
    },

    #[error("Empty field chain")]
    EmptyFieldChain,
}

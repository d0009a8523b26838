//! Compilation error taxonomy.
//!
//! Two classes of failure abort a compile:
//! - [`QueryError`]: the query itself is wrong or asks for something the target
//!   dialect cannot do. These are user-facing and carry enough context for a
//!   useful message (offending chain, nearest valid alternative).
//! - [`InternalError`]: the AST handed to a pass violates a contract another
//!   pass (or the upstream parser) was supposed to uphold. These are bugs.
//!
//! "Nothing to push down" is not an error; the optimizer returns `None`.

use std::fmt::Display;

use thiserror::Error;

use crate::query_ast::errors::AstError;
use crate::sql_generator::Dialect;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    Resolver,
    WherePushdown,
    JoinMaterializer,
    PropertyAccess,
    Printer,
}

impl Display for Pass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Pass::Resolver => write!(f, "Resolver"),
            Pass::WherePushdown => write!(f, "WherePushdown"),
            Pass::JoinMaterializer => write!(f, "JoinMaterializer"),
            Pass::PropertyAccess => write!(f, "PropertyAccess"),
            Pass::Printer => write!(f, "Printer"),
        }
    }
}

fn did_you_mean(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(s) => format!(". Did you mean `{}`?", s),
        None => String::new(),
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum QueryError {
    #[error("Unable to resolve field `{chain}`{}", did_you_mean(.suggestion))]
    UnresolvedField {
        chain: String,
        suggestion: Option<String>,
    },

    #[error("Unknown table `{name}`{}", did_you_mean(.suggestion))]
    UnknownTable {
        name: String,
        suggestion: Option<String>,
    },

    #[error("Unknown function `{name}`{}", did_you_mean(.suggestion))]
    UnknownFunction {
        name: String,
        suggestion: Option<String>,
    },

    #[error("Function `{function}` expects {expected} argument(s), found {found}")]
    ArityMismatch {
        function: String,
        expected: String,
        found: usize,
    },

    #[error("Ambiguous reference `{name}`: could refer to {}", .candidates.join(", "))]
    AmbiguousReference {
        name: String,
        candidates: Vec<String>,
    },

    #[error("{feature} is not supported by the {dialect} dialect")]
    UnsupportedFeature { feature: String, dialect: Dialect },

    #[error("Alias `{alias}` is a reserved keyword")]
    ReservedAlias { alias: String },

    #[error("Invalid identifier `{identifier}`: {reason}")]
    InvalidIdentifier { identifier: String, reason: String },

    #[error("Query is too large: {0}")]
    QueryTooLarge(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum InternalError {
    #[error("{pass}: malformed AST: {source}")]
    MalformedAst {
        pass: Pass,
        #[source]
        source: AstError,
    },

    #[error("{pass}: field `{chain}` reached this pass without a binding")]
    UnboundField { pass: Pass, chain: String },

    #[error("{pass}: field `{chain}` still references a virtual table after join materialization")]
    UnmaterializedField { pass: Pass, chain: String },

    #[error("{pass}: {message}")]
    ContractViolation { pass: Pass, message: String },
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CompileError {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("Internal compiler error: {0}")]
    Internal(#[from] InternalError),
}

impl CompileError {
    pub fn is_query_error(&self) -> bool {
        matches!(self, CompileError::Query(_))
    }

    pub fn malformed(pass: Pass, source: AstError) -> Self {
        CompileError::Internal(InternalError::MalformedAst { pass, source })
    }

    pub fn contract(pass: Pass, message: impl Into<String>) -> Self {
        CompileError::Internal(InternalError::ContractViolation {
            pass,
            message: message.into(),
        })
    }
}

pub type CompileResult<T> = Result<T, CompileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unresolved_field_message_includes_suggestion() {
        let err = QueryError::UnresolvedField {
            chain: "evnt".to_string(),
            suggestion: Some("event".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Unable to resolve field `evnt`. Did you mean `event`?"
        );
    }

    #[test]
    fn test_unresolved_field_message_without_suggestion() {
        let err = QueryError::UnresolvedField {
            chain: "zzz".to_string(),
            suggestion: None,
        };
        assert_eq!(err.to_string(), "Unable to resolve field `zzz`");
    }

    #[test]
    fn test_unsupported_feature_is_query_error() {
        let err: CompileError = QueryError::UnsupportedFeature {
            feature: "SAMPLE".to_string(),
            dialect: Dialect::Postgres,
        }
        .into();
        assert!(err.is_query_error());
        assert_eq!(err.to_string(), "SAMPLE is not supported by the postgres dialect");
    }
}

//! SQL generation for the supported backends.
//!
//! [`print_select`] renders a fully compiled tree (resolved, joins
//! materialized, property access expanded) into SQL text and a parameter map.
//! The HogQL dialect pretty-prints a resolved tree back to source form.

pub mod function_registry;
mod printer;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::compiler::CompileContext;
use crate::errors::CompileResult;
use crate::query_ast::SelectQuery;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    ClickHouse,
    Postgres,
    HogQL,
}

impl Dialect {
    pub fn capabilities(&self) -> DialectCapabilities {
        match self {
            Dialect::ClickHouse => DialectCapabilities {
                sampling: true,
                array_join: true,
                limit_by: true,
                prewhere: true,
                cohort_membership: true,
                native_lag_lead: false,
                null_safety: NullSafety::IfNullWrapping,
            },
            Dialect::Postgres => DialectCapabilities {
                sampling: false,
                array_join: false,
                limit_by: false,
                prewhere: false,
                cohort_membership: false,
                native_lag_lead: true,
                null_safety: NullSafety::DistinctFrom,
            },
            Dialect::HogQL => DialectCapabilities {
                sampling: true,
                array_join: true,
                limit_by: true,
                prewhere: true,
                cohort_membership: true,
                native_lag_lead: true,
                null_safety: NullSafety::Source,
            },
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::ClickHouse => write!(f, "clickhouse"),
            Dialect::Postgres => write!(f, "postgres"),
            Dialect::HogQL => write!(f, "hogql"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("unknown dialect `{0}` (expected clickhouse, postgres or hogql)")]
pub struct UnknownDialect(String);

impl FromStr for Dialect {
    type Err = UnknownDialect;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "clickhouse" | "ch" => Ok(Dialect::ClickHouse),
            "postgres" | "postgresql" | "pg" => Ok(Dialect::Postgres),
            "hogql" => Ok(Dialect::HogQL),
            _ => Err(UnknownDialect(s.to_string())),
        }
    }
}

/// How a dialect keeps comparisons two-valued when operands may be NULL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullSafety {
    /// `ifNull(equals(a, b), 0)` and friends.
    IfNullWrapping,
    /// `IS [NOT] DISTINCT FROM`, `COALESCE(..., false)`.
    DistinctFrom,
    /// Printed as written.
    Source,
}

/// What a dialect can express. Anything a query uses that its target lacks
/// is rejected before printing starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialectCapabilities {
    pub sampling: bool,
    pub array_join: bool,
    pub limit_by: bool,
    /// Without PREWHERE the condition is folded into WHERE.
    pub prewhere: bool,
    pub cohort_membership: bool,
    /// `lag`/`lead` exist natively; otherwise they are emulated with
    /// `lagInFrame`/`leadInFrame` over an explicit frame.
    pub native_lag_lead: bool,
    pub null_safety: NullSafety,
}

/// Output of the printer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrintedQuery {
    pub sql: String,
    /// Values for the `%(name)s` placeholders in `sql`.
    pub params: BTreeMap<String, serde_json::Value>,
    /// Output column names, in order.
    pub columns: Vec<String>,
}

/// Renders `select` for `dialect`. Never mutates its input; printing the same
/// tree twice gives identical text and parameters.
pub fn print_select(
    select: &SelectQuery,
    dialect: Dialect,
    ctx: &CompileContext<'_>,
) -> CompileResult<PrintedQuery> {
    log::debug!("Printer: printing {} query", dialect);
    printer::check_capabilities(select, dialect)?;
    printer::Printer::new(dialect, ctx).print_top_level(select)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_parsing() {
        assert_eq!("ClickHouse".parse::<Dialect>(), Ok(Dialect::ClickHouse));
        assert_eq!("pg".parse::<Dialect>(), Ok(Dialect::Postgres));
        assert_eq!("hogql".parse::<Dialect>(), Ok(Dialect::HogQL));
        assert!("mysql".parse::<Dialect>().is_err());
    }

    #[test]
    fn test_capabilities() {
        let pg = Dialect::Postgres.capabilities();
        assert!(!pg.sampling && !pg.array_join && !pg.limit_by && !pg.cohort_membership);
        assert!(pg.native_lag_lead);
        let ch = Dialect::ClickHouse.capabilities();
        assert!(ch.sampling && ch.cohort_membership && !ch.native_lag_lead);
        assert_eq!(ch.null_safety, NullSafety::IfNullWrapping);
    }
}

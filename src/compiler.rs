//! The compilation pipeline.
//!
//! ```text
//! SelectQuery ─► resolve ─► materialize_joins ─► expand_properties ─► print_select
//!                              │
//!                              └─► pushdown_where (once per lazy join)
//! ```
//!
//! Every pass takes a tree and returns a new one. The HogQL dialect stops
//! after resolution: it prints the query as written.

use crate::catalog::{Database, MaterializationCatalog};
use crate::config::{CompileSettings, Modifiers};
use crate::errors::{CompileResult, QueryError};
use crate::join_materializer::materialize_joins;
use crate::property_access::expand_properties;
use crate::query_ast::visitors::SizeCounter;
use crate::query_ast::SelectQuery;
use crate::resolver::resolve;
use crate::sql_generator::{print_select, Dialect, PrintedQuery};

/// Everything a compile reads besides the query itself. Borrowed, never
/// modified; one context can serve any number of compiles.
#[derive(Debug, Clone, Copy)]
pub struct CompileContext<'a> {
    pub database: &'a Database,
    pub catalog: &'a MaterializationCatalog,
    pub modifiers: &'a Modifiers,
    pub settings: &'a CompileSettings,
    /// Tenant whose rows every physical table read is restricted to.
    pub team_id: Option<i64>,
}

/// Compiles `select` to SQL for `dialect`.
pub fn compile(
    select: &SelectQuery,
    dialect: Dialect,
    ctx: &CompileContext<'_>,
) -> CompileResult<PrintedQuery> {
    check_size(select, ctx.settings)?;

    let resolved = resolve(select, ctx)?;
    if dialect == Dialect::HogQL {
        return print_select(&resolved, dialect, ctx);
    }

    let joined = materialize_joins(resolved, ctx)?;
    let expanded = expand_properties(joined, ctx)?;
    let printed = print_select(&expanded, dialect, ctx)?;
    log::debug!(
        "compile: {} bytes of {} SQL, {} parameter(s)",
        printed.sql.len(),
        dialect,
        printed.params.len()
    );
    Ok(printed)
}

fn check_size(select: &SelectQuery, settings: &CompileSettings) -> CompileResult<()> {
    let size = SizeCounter::measure(select);
    log::trace!(
        "compile: {} nodes, select depth {}, expression depth {}",
        size.nodes,
        size.max_select_depth,
        size.max_expr_depth
    );
    if size.nodes > settings.max_ast_nodes {
        return Err(QueryError::QueryTooLarge(format!(
            "{} nodes exceeds the limit of {}",
            size.nodes, settings.max_ast_nodes
        ))
        .into());
    }
    if size.max_select_depth > settings.max_subquery_depth {
        return Err(QueryError::QueryTooLarge(format!(
            "subqueries are nested more than {} levels deep",
            settings.max_subquery_depth
        ))
        .into());
    }
    if size.max_expr_depth > settings.max_expr_depth {
        return Err(QueryError::QueryTooLarge(format!(
            "expressions are nested more than {} levels deep",
            settings.max_expr_depth
        ))
        .into());
    }
    Ok(())
}

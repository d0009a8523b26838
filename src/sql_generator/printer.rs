//! Dialect-aware rendering of a compiled tree.
//!
//! Printing runs in two steps:
//! 1. [`check_capabilities`] walks the whole tree once and rejects anything
//!    the target cannot express (and any bad identifier) before a single
//!    byte of SQL exists.
//! 2. [`Printer`] renders the tree, binding constants as `%(hogql_val_N)s`
//!    parameters and applying the dialect's NULL handling.

use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use regex::Regex;

use super::function_registry::{self, apply_template, SqlForm};
use super::{Dialect, DialectCapabilities, NullSafety, PrintedQuery};
use crate::catalog::database::physical::COHORT_PEOPLE;
use crate::compiler::CompileContext;
use crate::errors::{CompileError, CompileResult, InternalError, Pass, QueryError};
use crate::query_ast::builders::{column, compare, eq, inline_constant, typed_call};
use crate::query_ast::visitors::{walk_select, ExpressionVisitor};
use crate::query_ast::{
    combinators, infer_type, ArrayJoinKind, Binding, CompareOperation, CompareOperator, Constant,
    ConstantValue, DataType, Expr, Field, FrameBound, FrameKind, JoinExpr, JoinType, Lambda,
    Order, OrderExpr, SampleRatio, SelectQuery, TableExpr, TableSource, WindowFrame,
    WindowFunction,
};
use crate::resolver::suggestions::nearest;

static PLAIN_IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// Postgres folds unquoted identifiers to lower case.
static PLAIN_PG_IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z_][a-z0-9_]*$").unwrap());

static PLAIN_HOGQL_IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").unwrap());

static FORMAT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9]*$").unwrap());

/// Names a query may not use as an alias.
const RESERVED_ALIASES: &[&str] = &["true", "false", "null", "team_id"];

/// Words that are quoted even when they look like plain identifiers.
const KEYWORDS: &[&str] = &[
    "all", "and", "array", "as", "asc", "between", "by", "case", "cohort", "cross", "desc",
    "distinct", "else", "end", "false", "final", "format", "from", "full", "group", "having",
    "ilike", "in", "inner", "interval", "is", "join", "left", "like", "limit", "not", "null",
    "offset", "on", "or", "order", "outer", "over", "partition", "prewhere", "range", "right",
    "rows", "sample", "select", "settings", "then", "true", "union", "using", "when", "where",
    "window", "with",
];

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

const EMULATED_FRAME: &str = "ROWS BETWEEN UNBOUNDED PRECEDING AND UNBOUNDED FOLLOWING";

// =============================================================================
// Capability pre-pass
// =============================================================================

/// Rejects features `dialect` lacks, reserved aliases and identifiers the
/// parameter syntax would misread.
pub(super) fn check_capabilities(select: &SelectQuery, dialect: Dialect) -> CompileResult<()> {
    let mut check = CapabilityCheck {
        dialect,
        caps: dialect.capabilities(),
        error: None,
    };
    walk_select(select, &mut check);
    match check.error {
        Some(err) => {
            log::debug!("Printer: rejected before printing: {}", err);
            Err(err)
        }
        None => Ok(()),
    }
}

struct CapabilityCheck {
    dialect: Dialect,
    caps: DialectCapabilities,
    error: Option<CompileError>,
}

impl CapabilityCheck {
    fn fail(&mut self, err: impl Into<CompileError>) {
        if self.error.is_none() {
            self.error = Some(err.into());
        }
    }

    fn unsupported(&mut self, feature: &str) {
        self.fail(QueryError::UnsupportedFeature {
            feature: feature.to_string(),
            dialect: self.dialect,
        });
    }

    fn check_identifier(&mut self, identifier: &str) {
        if identifier.contains('%') {
            self.fail(QueryError::InvalidIdentifier {
                identifier: identifier.to_string(),
                reason: "identifiers may not contain `%`".to_string(),
            });
        }
    }

    fn check_alias(&mut self, alias: &str) {
        if RESERVED_ALIASES.contains(&alias.to_ascii_lowercase().as_str()) {
            self.fail(QueryError::ReservedAlias {
                alias: alias.to_string(),
            });
        }
        self.check_identifier(alias);
    }
}

impl ExpressionVisitor for CapabilityCheck {
    fn visit_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Alias(a) if a.hidden => self.check_identifier(&a.alias),
            Expr::Alias(a) => self.check_alias(&a.alias),
            Expr::Compare(c)
                if matches!(c.op, CompareOperator::InCohort | CompareOperator::NotInCohort)
                    && !self.caps.cohort_membership =>
            {
                self.unsupported("IN COHORT")
            }
            Expr::Lambda(l) => {
                for arg in &l.args {
                    self.check_identifier(arg);
                }
            }
            _ => {}
        }
    }

    fn visit_field(&mut self, field: &Field) {
        for part in &field.chain {
            self.check_identifier(part);
        }
    }

    fn enter_select(&mut self, select: &SelectQuery) -> bool {
        if self.error.is_some() {
            return false;
        }
        for join in select.joins() {
            if join.sample.is_some() && !self.caps.sampling {
                self.unsupported("SAMPLE");
            }
            if let Some(alias) = &join.alias {
                self.check_alias(alias);
            }
            if let TableExpr::Table { name } = &join.table {
                self.check_identifier(name);
            }
        }
        if select.array_join.is_some() && !self.caps.array_join {
            self.unsupported("ARRAY JOIN");
        }
        if select.limit_by.is_some() && !self.caps.limit_by {
            self.unsupported("LIMIT BY");
        }
        true
    }
}

// =============================================================================
// Printer
// =============================================================================

fn param_value(value: &ConstantValue) -> serde_json::Value {
    match value {
        ConstantValue::Null => serde_json::Value::Null,
        ConstantValue::Bool(b) => serde_json::Value::Bool(*b),
        ConstantValue::Int(i) => serde_json::Value::from(*i),
        ConstantValue::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        ConstantValue::String(s) => serde_json::Value::String(s.clone()),
        ConstantValue::DateTime(dt) => {
            serde_json::Value::String(dt.format(DATETIME_FORMAT).to_string())
        }
    }
}

fn is_negative(op: CompareOperator) -> bool {
    matches!(
        op,
        CompareOperator::NotEq
            | CompareOperator::NotLike
            | CompareOperator::NotILike
            | CompareOperator::NotIn
            | CompareOperator::NotRegex
            | CompareOperator::NotIRegex
            | CompareOperator::NotInCohort
    )
}

fn frame_bound(bound: &FrameBound) -> String {
    match bound {
        FrameBound::UnboundedPreceding => "UNBOUNDED PRECEDING".to_string(),
        FrameBound::Preceding(n) => format!("{} PRECEDING", n),
        FrameBound::CurrentRow => "CURRENT ROW".to_string(),
        FrameBound::Following(n) => format!("{} FOLLOWING", n),
        FrameBound::UnboundedFollowing => "UNBOUNDED FOLLOWING".to_string(),
    }
}

fn print_frame(frame: &WindowFrame) -> String {
    let kind = match frame.kind {
        FrameKind::Rows => "ROWS",
        FrameKind::Range => "RANGE",
    };
    match &frame.end {
        Some(end) => format!(
            "{} BETWEEN {} AND {}",
            kind,
            frame_bound(&frame.start),
            frame_bound(end)
        ),
        None => format!("{} {}", kind, frame_bound(&frame.start)),
    }
}

fn sample_ratio(ratio: &SampleRatio) -> String {
    match ratio.denominator {
        Some(d) => format!("{}/{}", ratio.numerator, d),
        None => ratio.numerator.to_string(),
    }
}

pub(super) struct Printer<'c> {
    dialect: Dialect,
    caps: DialectCapabilities,
    ctx: &'c CompileContext<'c>,
    params: BTreeMap<String, serde_json::Value>,
    /// Select aliases of the SELECTs being printed, innermost last. Postgres
    /// cannot reference them outside ORDER BY, so they are inlined there.
    select_aliases: Vec<HashMap<String, Expr>>,
    /// JOIN ON conditions are printed without null-safety wrapping.
    in_join_constraint: bool,
}

impl<'c> Printer<'c> {
    pub(super) fn new(dialect: Dialect, ctx: &'c CompileContext<'c>) -> Self {
        Printer {
            dialect,
            caps: dialect.capabilities(),
            ctx,
            params: BTreeMap::new(),
            select_aliases: Vec::new(),
            in_join_constraint: false,
        }
    }

    pub(super) fn print_top_level(mut self, select: &SelectQuery) -> CompileResult<PrintedQuery> {
        let columns = self.output_columns(select)?;
        let sql = match self.dialect {
            Dialect::HogQL => self.print_select_query(select)?,
            Dialect::ClickHouse | Dialect::Postgres => {
                let limit = self.capped_limit(select.limit.as_ref())?;
                let mut sql = self.print_query(select, Some(limit))?;
                if self.dialect == Dialect::ClickHouse {
                    sql.push_str(&self.settings_clause()?);
                }
                sql
            }
        };
        log::trace!("Printer: {} parameter(s) bound", self.params.len());
        Ok(PrintedQuery {
            sql,
            params: self.params,
            columns,
        })
    }

    fn output_columns(&self, select: &SelectQuery) -> CompileResult<Vec<String>> {
        let mut source = Printer::new(Dialect::HogQL, self.ctx);
        select
            .select
            .iter()
            .map(|item| match item {
                Expr::Alias(a) => Ok(a.alias.clone()),
                Expr::Field(f) if !f.chain.is_empty() => Ok(f.chain[f.chain.len() - 1].clone()),
                other => source.print_expr(other),
            })
            .collect()
    }

    /// The top-level LIMIT: the default when absent, never above the ceiling.
    fn capped_limit(&mut self, limit: Option<&Expr>) -> CompileResult<String> {
        let settings = self.ctx.settings;
        match limit {
            None => Ok(settings.default_limit.min(settings.max_limit).to_string()),
            Some(Expr::Constant(Constant {
                value: ConstantValue::Int(n),
                ..
            })) => Ok(u64::try_from(*n)
                .unwrap_or(0)
                .min(settings.max_limit)
                .to_string()),
            Some(other) => {
                let printed = self.print_expr(other)?;
                Ok(match self.dialect {
                    Dialect::Postgres => format!("LEAST({}, {})", printed, settings.max_limit),
                    _ => format!("min2({}, {})", printed, settings.max_limit),
                })
            }
        }
    }

    fn settings_clause(&self) -> CompileResult<String> {
        let settings = self.ctx.settings;
        // Outer joins must pad with NULL, not type defaults, for the
        // null-safety wrapping and join pushdown to hold.
        let mut out = format!(
            " SETTINGS readonly=2, max_execution_time={}, join_use_nulls=1",
            settings.max_execution_time
        );
        if let Some(format) = &settings.output_format {
            if !FORMAT_NAME.is_match(format) {
                return Err(QueryError::InvalidQuery(format!(
                    "invalid output format `{}`",
                    format
                ))
                .into());
            }
            out.push_str(" FORMAT ");
            out.push_str(format);
        }
        Ok(out)
    }

    fn print_select_query(&mut self, select: &SelectQuery) -> CompileResult<String> {
        self.print_query(select, None)
    }

    fn print_query(&mut self, select: &SelectQuery, limit: Option<String>) -> CompileResult<String> {
        let aliases = match self.dialect {
            Dialect::Postgres => select
                .select
                .iter()
                .filter_map(|item| match item {
                    Expr::Alias(a) => Some((a.alias.clone(), (*a.expr).clone())),
                    _ => None,
                })
                .collect(),
            _ => HashMap::new(),
        };
        self.select_aliases.push(aliases);
        let in_join = std::mem::replace(&mut self.in_join_constraint, false);
        let result = self.print_clauses(select, limit);
        self.in_join_constraint = in_join;
        self.select_aliases.pop();
        result
    }

    fn print_clauses(&mut self, select: &SelectQuery, limit: Option<String>) -> CompileResult<String> {
        let mut clauses = Vec::new();

        let items = self.print_select_items(&select.select)?;
        clauses.push(format!(
            "SELECT {}{}",
            if select.distinct { "DISTINCT " } else { "" },
            items
        ));

        if let Some(from) = &select.select_from {
            clauses.push(format!("FROM {}", self.print_join_chain(from)?));
        }

        if let Some(array_join) = &select.array_join {
            let keyword = match array_join.kind {
                ArrayJoinKind::Inner => "ARRAY JOIN",
                ArrayJoinKind::Left => "LEFT ARRAY JOIN",
            };
            clauses.push(format!(
                "{} {}",
                keyword,
                self.print_select_items(&array_join.exprs)?
            ));
        }

        let folded;
        let (prewhere, where_clause) = match (&select.prewhere, &select.where_clause) {
            (Some(pre), filter) if !self.caps.prewhere => {
                folded = match filter {
                    Some(filter) => Expr::And(vec![pre.clone(), filter.clone()]),
                    None => pre.clone(),
                };
                (None, Some(&folded))
            }
            (pre, filter) => (pre.as_ref(), filter.as_ref()),
        };
        if let Some(pre) = prewhere {
            clauses.push(format!("PREWHERE {}", self.print_expr(pre)?));
        }
        if let Some(filter) = where_clause {
            clauses.push(format!("WHERE {}", self.print_expr(filter)?));
        }

        if !select.group_by.is_empty() {
            clauses.push(format!("GROUP BY {}", self.print_list(&select.group_by)?));
        }
        if let Some(having) = &select.having {
            clauses.push(format!("HAVING {}", self.print_expr(having)?));
        }
        if !select.order_by.is_empty() {
            clauses.push(format!("ORDER BY {}", self.print_order_by(&select.order_by)?));
        }

        if let Some(limit_by) = &select.limit_by {
            let mut clause = format!("LIMIT {}", self.print_limit_value(&limit_by.n)?);
            if let Some(offset) = &limit_by.offset {
                clause.push_str(&format!(" OFFSET {}", self.print_limit_value(offset)?));
            }
            clause.push_str(&format!(" BY {}", self.print_list(&limit_by.exprs)?));
            clauses.push(clause);
        }

        let limit = match (limit, &select.limit) {
            (Some(limit), _) => Some(limit),
            (None, Some(limit)) => Some(self.print_limit_value(limit)?),
            (None, None) => None,
        };
        if let Some(limit) = limit {
            clauses.push(format!("LIMIT {}", limit));
        }
        if let Some(offset) = &select.offset {
            clauses.push(format!("OFFSET {}", self.print_limit_value(offset)?));
        }

        Ok(clauses.join(" "))
    }

    fn print_limit_value(&mut self, expr: &Expr) -> CompileResult<String> {
        match expr.as_constant() {
            Some(ConstantValue::Int(n)) => Ok(n.to_string()),
            _ => self.print_expr(expr),
        }
    }

    fn print_select_items(&mut self, items: &[Expr]) -> CompileResult<String> {
        let mut printed = Vec::with_capacity(items.len());
        for item in items {
            printed.push(match item {
                Expr::Alias(a) => {
                    let inner = self.print_expr(&a.expr)?;
                    if a.hidden && self.dialect == Dialect::HogQL {
                        inner
                    } else {
                        format!("{} AS {}", inner, self.quote(&a.alias))
                    }
                }
                other => self.print_expr(other)?,
            });
        }
        Ok(printed.join(", "))
    }

    fn print_list(&mut self, items: &[Expr]) -> CompileResult<String> {
        let mut printed = Vec::with_capacity(items.len());
        for item in items {
            printed.push(self.print_expr(item)?);
        }
        Ok(printed.join(", "))
    }

    fn print_order_by(&mut self, items: &[OrderExpr]) -> CompileResult<String> {
        let mut printed = Vec::with_capacity(items.len());
        for item in items {
            let order = match item.order {
                Order::Asc => "ASC",
                Order::Desc => "DESC",
            };
            printed.push(format!("{} {}", self.print_expr(&item.expr)?, order));
        }
        Ok(printed.join(", "))
    }

    // -------------------------------------------------------------------------
    // FROM
    // -------------------------------------------------------------------------

    fn print_join_chain(&mut self, head: &JoinExpr) -> CompileResult<String> {
        let mut parts = Vec::new();
        for (index, join) in head.iter().enumerate() {
            let table = self.print_join_table(join)?;
            if index == 0 {
                parts.push(table);
                continue;
            }
            let kind = join.join_type.unwrap_or(JoinType::Inner);
            let mut part = format!("{} {}", kind.to_sql(), table);
            if let Some(constraint) = &join.constraint {
                let in_join = std::mem::replace(&mut self.in_join_constraint, true);
                let on = self.print_expr(constraint);
                self.in_join_constraint = in_join;
                part.push_str(&format!(" ON {}", on?));
            }
            parts.push(part);
        }
        Ok(parts.join(" "))
    }

    fn print_join_table(&mut self, join: &JoinExpr) -> CompileResult<String> {
        let (mut out, printed_name) = match &join.table {
            TableExpr::Table { name } => {
                let physical = self.physical_table(name);
                (self.quote(&physical), Some(physical))
            }
            TableExpr::Subquery(sub) => (format!("({})", self.print_select_query(sub)?), None),
        };
        if let Some(alias) = join.effective_alias() {
            if printed_name.as_deref() != Some(alias) {
                out.push_str(" AS ");
                out.push_str(&self.quote(alias));
            }
        }
        if let Some(sample) = &join.sample {
            out.push_str(" SAMPLE ");
            out.push_str(&sample_ratio(&sample.ratio));
            if let Some(offset) = &sample.offset {
                out.push_str(" OFFSET ");
                out.push_str(&sample_ratio(offset));
            }
        }
        Ok(out)
    }

    /// Catalog tables print under their storage name; anything else (the
    /// raw tables lazy subqueries read) is already physical.
    fn physical_table(&self, name: &str) -> String {
        if self.dialect == Dialect::HogQL {
            return name.to_string();
        }
        self.ctx
            .database
            .table(name)
            .and_then(|t| t.physical_name())
            .unwrap_or(name)
            .to_string()
    }

    // -------------------------------------------------------------------------
    // Expressions
    // -------------------------------------------------------------------------

    fn print_expr(&mut self, expr: &Expr) -> CompileResult<String> {
        match expr {
            Expr::Constant(c) => Ok(self.print_constant(c)),
            Expr::Field(f) => self.print_field(f),
            Expr::Compare(c) => self.print_compare(c),
            Expr::And(items) => self.print_connective(items, true),
            Expr::Or(items) => self.print_connective(items, false),
            Expr::Not(inner) => {
                let inner = self.print_expr(inner)?;
                Ok(match self.dialect {
                    Dialect::Postgres => format!("(NOT {})", inner),
                    _ => format!("not({})", inner),
                })
            }
            Expr::Call(c) => {
                let mut args = Vec::with_capacity(c.args.len());
                for arg in &c.args {
                    args.push(self.print_expr(arg)?);
                }
                self.render_function(&c.name, &args, c.distinct)
            }
            Expr::Array(items) => {
                let items = self.print_list(items)?;
                Ok(match self.dialect {
                    Dialect::Postgres => format!("ARRAY[{}]", items),
                    _ => format!("[{}]", items),
                })
            }
            Expr::Tuple(items) => {
                let items = self.print_list(items)?;
                Ok(match self.dialect {
                    Dialect::Postgres => format!("ROW({})", items),
                    _ => format!("tuple({})", items),
                })
            }
            Expr::Alias(a) => {
                let inner = self.print_expr(&a.expr)?;
                if self.dialect == Dialect::HogQL && !a.hidden {
                    Ok(format!("({} AS {})", inner, self.quote(&a.alias)))
                } else {
                    Ok(inner)
                }
            }
            Expr::Lambda(l) => self.print_lambda(l),
            Expr::WindowFunction(w) => self.print_window(w),
            Expr::Select(s) => Ok(format!("({})", self.print_select_query(s)?)),
        }
    }

    fn print_constant(&mut self, constant: &Constant) -> String {
        if constant.value.is_null() {
            return "NULL".to_string();
        }
        if constant.inline || self.dialect == Dialect::HogQL {
            return self.literal(&constant.value);
        }
        let name = format!("hogql_val_{}", self.params.len());
        self.params.insert(name.clone(), param_value(&constant.value));
        format!("%({})s", name)
    }

    fn literal(&self, value: &ConstantValue) -> String {
        match (self.dialect, value) {
            (Dialect::HogQL, v) => v.to_string(),
            (_, ConstantValue::Null) => "NULL".to_string(),
            (_, ConstantValue::Bool(b)) => b.to_string(),
            (_, ConstantValue::Int(i)) => i.to_string(),
            (_, ConstantValue::Float(f)) => f.to_string(),
            (Dialect::Postgres, ConstantValue::String(s)) => format!("'{}'", s.replace('\'', "''")),
            (Dialect::Postgres, ConstantValue::DateTime(dt)) => {
                format!("TIMESTAMP '{}'", dt.format(DATETIME_FORMAT))
            }
            (Dialect::ClickHouse, ConstantValue::String(s)) => {
                format!("'{}'", crate::query_ast::escape_string(s))
            }
            (Dialect::ClickHouse, ConstantValue::DateTime(dt)) => {
                format!("toDateTime64('{}', 6, 'UTC')", dt.format(DATETIME_FORMAT))
            }
        }
    }

    fn print_field(&mut self, field: &Field) -> CompileResult<String> {
        if self.dialect == Dialect::HogQL {
            let parts: Vec<_> = field.chain.iter().map(|p| self.quote(p)).collect();
            return Ok(parts.join("."));
        }
        let binding = field.binding.as_ref().ok_or_else(|| InternalError::UnboundField {
            pass: Pass::Printer,
            chain: field.chain_string(),
        })?;
        self.print_binding(field, binding)
    }

    fn print_binding(&mut self, field: &Field, binding: &Binding) -> CompileResult<String> {
        match binding {
            Binding::Column {
                source: TableSource::Table { alias, .. },
                column,
                ..
            } => Ok(format!("{}.{}", self.quote(alias), self.quote(column))),
            Binding::Column {
                source: TableSource::Lazy { .. },
                ..
            }
            | Binding::Property {
                source: TableSource::Lazy { .. },
                ..
            } => Err(InternalError::UnmaterializedField {
                pass: Pass::Printer,
                chain: field.chain_string(),
            }
            .into()),
            Binding::Property { .. } => Err(CompileError::contract(
                Pass::Printer,
                format!("property access `{}` was never expanded", field.chain_string()),
            )),
            Binding::SelectAlias { name, .. } => self.print_select_alias(name),
            Binding::LambdaArgument { name } => Ok(self.quote(name)),
            Binding::Outer { inner, .. } => self.print_binding(field, inner),
        }
    }

    fn print_select_alias(&mut self, name: &str) -> CompileResult<String> {
        if self.dialect == Dialect::Postgres {
            // Taken out while printing so a self-reference cannot recurse.
            let aliased = self.select_aliases.last_mut().and_then(|f| f.remove(name));
            if let Some(expr) = aliased {
                let printed = self.print_expr(&expr);
                if let Some(frame) = self.select_aliases.last_mut() {
                    frame.insert(name.to_string(), expr);
                }
                return Ok(format!("({})", printed?));
            }
        }
        Ok(self.quote(name))
    }

    // -------------------------------------------------------------------------
    // Comparisons and connectives
    // -------------------------------------------------------------------------

    fn print_compare(&mut self, cmp: &CompareOperation) -> CompileResult<String> {
        match (cmp.op, self.caps.null_safety) {
            (_, NullSafety::Source) => self.print_compare_source(cmp),
            (CompareOperator::InCohort | CompareOperator::NotInCohort, _) => {
                self.print_cohort(cmp)
            }
            (_, NullSafety::IfNullWrapping) => self.print_compare_clickhouse(cmp),
            (_, NullSafety::DistinctFrom) => self.print_compare_postgres(cmp),
        }
    }

    fn print_compare_source(&mut self, cmp: &CompareOperation) -> CompileResult<String> {
        let left = match &*cmp.left {
            Expr::Compare(inner) => format!("({})", self.print_compare_source(inner)?),
            other => self.print_expr(other)?,
        };
        let right = match (cmp.op, &*cmp.right) {
            (CompareOperator::In | CompareOperator::NotIn, _) => self.print_in_list(&cmp.right)?,
            (_, Expr::Compare(inner)) => format!("({})", self.print_compare_source(inner)?),
            (_, other) => self.print_expr(other)?,
        };
        Ok(format!("{} {} {}", left, cmp.op.symbol(), right))
    }

    /// The right-hand side of `IN`: a list or a subquery.
    fn print_in_list(&mut self, right: &Expr) -> CompileResult<String> {
        match (self.dialect, right) {
            (Dialect::ClickHouse, Expr::Tuple(items) | Expr::Array(items)) => {
                Ok(format!("tuple({})", self.print_list(items)?))
            }
            (Dialect::HogQL, Expr::Array(items)) => Ok(format!("[{}]", self.print_list(items)?)),
            (_, Expr::Tuple(items) | Expr::Array(items)) => {
                Ok(format!("({})", self.print_list(items)?))
            }
            (_, Expr::Select(_)) | (Dialect::ClickHouse, _) => self.print_expr(right),
            (_, other) => Ok(format!("({})", self.print_expr(other)?)),
        }
    }

    /// `a = NULL` and `a != NULL`, by which operand is the literal.
    fn null_literal_operand<'e>(cmp: &'e CompareOperation) -> Option<&'e Expr> {
        if !matches!(cmp.op, CompareOperator::Eq | CompareOperator::NotEq) {
            return None;
        }
        if cmp.right.is_null_constant() {
            Some(cmp.left.as_ref())
        } else if cmp.left.is_null_constant() {
            Some(cmp.right.as_ref())
        } else {
            None
        }
    }

    fn operand_nullability(cmp: &CompareOperation) -> (bool, bool) {
        let left = infer_type(&cmp.left).nullable;
        let right = match cmp.op {
            CompareOperator::In | CompareOperator::NotIn => false,
            _ => infer_type(&cmp.right).nullable,
        };
        (left, right)
    }

    fn print_compare_clickhouse(&mut self, cmp: &CompareOperation) -> CompileResult<String> {
        if let Some(other) = Self::null_literal_operand(cmp) {
            let printed = self.print_expr(other)?;
            return Ok(match cmp.op {
                CompareOperator::Eq => format!("isNull({})", printed),
                _ => format!("isNotNull({})", printed),
            });
        }

        let l = self.print_expr(&cmp.left)?;
        let r = match cmp.op {
            CompareOperator::In | CompareOperator::NotIn => self.print_in_list(&cmp.right)?,
            _ => self.print_expr(&cmp.right)?,
        };
        let base = match cmp.op {
            CompareOperator::Eq => format!("equals({}, {})", l, r),
            CompareOperator::NotEq => format!("notEquals({}, {})", l, r),
            CompareOperator::Lt => format!("less({}, {})", l, r),
            CompareOperator::LtEq => format!("lessOrEquals({}, {})", l, r),
            CompareOperator::Gt => format!("greater({}, {})", l, r),
            CompareOperator::GtEq => format!("greaterOrEquals({}, {})", l, r),
            CompareOperator::Like => format!("like({}, {})", l, r),
            CompareOperator::NotLike => format!("notLike({}, {})", l, r),
            CompareOperator::ILike => format!("ilike({}, {})", l, r),
            CompareOperator::NotILike => format!("notILike({}, {})", l, r),
            CompareOperator::In => format!("in({}, {})", l, r),
            CompareOperator::NotIn => format!("notIn({}, {})", l, r),
            CompareOperator::Regex => format!("match({}, {})", l, r),
            CompareOperator::NotRegex => format!("not(match({}, {}))", l, r),
            CompareOperator::IRegex => format!("match({}, concat('(?i)', {}))", l, r),
            CompareOperator::NotIRegex => format!("not(match({}, concat('(?i)', {})))", l, r),
            CompareOperator::InCohort | CompareOperator::NotInCohort => {
                return Err(CompileError::contract(
                    Pass::Printer,
                    "cohort membership must be expanded before printing",
                ))
            }
        };

        let (left_nullable, right_nullable) = Self::operand_nullability(cmp);
        if self.in_join_constraint || (!left_nullable && !right_nullable) {
            return Ok(base);
        }
        Ok(match cmp.op {
            CompareOperator::Eq if left_nullable && right_nullable => {
                format!("ifNull({}, and(isNull({}), isNull({})))", base, l, r)
            }
            CompareOperator::NotEq if left_nullable && right_nullable => {
                format!("ifNull({}, or(isNotNull({}), isNotNull({})))", base, l, r)
            }
            op if is_negative(op) => format!("ifNull({}, 1)", base),
            _ => format!("ifNull({}, 0)", base),
        })
    }

    fn print_compare_postgres(&mut self, cmp: &CompareOperation) -> CompileResult<String> {
        if let Some(other) = Self::null_literal_operand(cmp) {
            let printed = self.print_expr(other)?;
            return Ok(match cmp.op {
                CompareOperator::Eq => format!("({} IS NULL)", printed),
                _ => format!("({} IS NOT NULL)", printed),
            });
        }

        let l = self.print_expr(&cmp.left)?;
        let r = match cmp.op {
            CompareOperator::In | CompareOperator::NotIn => self.print_in_list(&cmp.right)?,
            _ => self.print_expr(&cmp.right)?,
        };
        let op = match cmp.op {
            CompareOperator::Eq => "=",
            CompareOperator::NotEq => "<>",
            CompareOperator::Lt => "<",
            CompareOperator::LtEq => "<=",
            CompareOperator::Gt => ">",
            CompareOperator::GtEq => ">=",
            CompareOperator::Like => "LIKE",
            CompareOperator::NotLike => "NOT LIKE",
            CompareOperator::ILike => "ILIKE",
            CompareOperator::NotILike => "NOT ILIKE",
            CompareOperator::In => "IN",
            CompareOperator::NotIn => "NOT IN",
            CompareOperator::Regex => "~",
            CompareOperator::NotRegex => "!~",
            CompareOperator::IRegex => "~*",
            CompareOperator::NotIRegex => "!~*",
            CompareOperator::InCohort | CompareOperator::NotInCohort => {
                return Err(QueryError::UnsupportedFeature {
                    feature: "IN COHORT".to_string(),
                    dialect: self.dialect,
                }
                .into())
            }
        };
        let base = format!("({} {} {})", l, op, r);

        let (left_nullable, right_nullable) = Self::operand_nullability(cmp);
        if self.in_join_constraint || (!left_nullable && !right_nullable) {
            return Ok(base);
        }
        Ok(match cmp.op {
            CompareOperator::Eq => format!("({} IS NOT DISTINCT FROM {})", l, r),
            CompareOperator::NotEq => format!("({} IS DISTINCT FROM {})", l, r),
            op if is_negative(op) => format!("COALESCE({}, true)", base),
            _ => format!("COALESCE({}, false)", base),
        })
    }

    /// `x IN COHORT n` becomes membership in the precalculated cohort table.
    fn print_cohort(&mut self, cmp: &CompareOperation) -> CompileResult<String> {
        if !self.caps.cohort_membership {
            return Err(QueryError::UnsupportedFeature {
                feature: "IN COHORT".to_string(),
                dialect: self.dialect,
            }
            .into());
        }
        let Some(ConstantValue::Int(cohort_id)) = cmp.right.as_constant() else {
            return Err(QueryError::InvalidQuery(
                "IN COHORT expects a numeric cohort id".to_string(),
            )
            .into());
        };
        let op = match cmp.op {
            CompareOperator::NotInCohort => CompareOperator::NotIn,
            _ => CompareOperator::In,
        };
        let membership = CompareOperation {
            op,
            left: cmp.left.clone(),
            right: Box::new(Expr::Select(Box::new(self.cohort_members(*cohort_id)))),
        };
        self.print_compare(&membership)
    }

    /// Person ids currently in a cohort. Rows are sign-collapsed, so a person
    /// is a member while the signs of their latest version sum above zero.
    fn cohort_members(&self, cohort_id: i64) -> SelectQuery {
        let col = |name: &str, ty: DataType| column(COHORT_PEOPLE, Some(COHORT_PEOPLE), name, ty);
        let mut conditions = Vec::new();
        if let Some(team) = self.ctx.team_id {
            conditions.push(eq(col("team_id", DataType::integer()), inline_constant(team)));
        }
        conditions.push(eq(
            col("cohort_id", DataType::integer()),
            inline_constant(cohort_id),
        ));
        SelectQuery {
            select: vec![col("person_id", DataType::uuid())],
            select_from: Some(JoinExpr::table(COHORT_PEOPLE)),
            where_clause: combinators::and(conditions),
            group_by: vec![
                col("person_id", DataType::uuid()),
                col("cohort_id", DataType::integer()),
                col("version", DataType::integer()),
            ],
            having: Some(compare(
                CompareOperator::Gt,
                typed_call("sum", vec![col("sign", DataType::integer())], DataType::integer()),
                inline_constant(0_i64),
            )),
            ..Default::default()
        }
    }

    fn print_connective(&mut self, items: &[Expr], is_and: bool) -> CompileResult<String> {
        match items {
            [] => {
                return Ok(match (self.dialect, is_and) {
                    (Dialect::ClickHouse, true) => "1",
                    (Dialect::ClickHouse, false) => "0",
                    (_, true) => "true",
                    (_, false) => "false",
                }
                .to_string())
            }
            [single] => return self.print_expr(single),
            _ => {}
        }

        let mut printed = Vec::with_capacity(items.len());
        for item in items {
            let text = self.print_expr(item)?;
            let nullable = !self.in_join_constraint && infer_type(item).nullable;
            printed.push(match (self.caps.null_safety, nullable) {
                (NullSafety::IfNullWrapping, true) => format!("ifNull({}, 0)", text),
                (NullSafety::DistinctFrom, true) => format!("COALESCE({}, false)", text),
                _ => text,
            });
        }
        Ok(match (self.dialect, is_and) {
            (Dialect::Postgres, true) => format!("({})", printed.join(" AND ")),
            (Dialect::Postgres, false) => format!("({})", printed.join(" OR ")),
            (_, true) => format!("and({})", printed.join(", ")),
            (_, false) => format!("or({})", printed.join(", ")),
        })
    }

    // -------------------------------------------------------------------------
    // Functions
    // -------------------------------------------------------------------------

    fn render_function(&self, name: &str, args: &[String], distinct: bool) -> CompileResult<String> {
        let spec = function_registry::lookup(name).ok_or_else(|| QueryError::UnknownFunction {
            name: name.to_string(),
            suggestion: nearest(name, function_registry::function_names()),
        })?;
        match spec.form(self.dialect) {
            SqlForm::Name(sql_name) => Ok(format!(
                "{}({}{})",
                sql_name,
                if distinct { "DISTINCT " } else { "" },
                args.join(", ")
            )),
            SqlForm::Template(template) => Ok(apply_template(template, args)),
            SqlForm::Infix(op) => Ok(format!("({})", args.join(&format!(" {} ", op)))),
            SqlForm::Unsupported => {
                log::debug!("Printer: `{}` has no {} form", name, self.dialect);
                Err(QueryError::UnsupportedFeature {
                    feature: format!("function `{}`", name),
                    dialect: self.dialect,
                }
                .into())
            }
        }
    }

    fn print_lambda(&mut self, lambda: &Lambda) -> CompileResult<String> {
        if self.dialect == Dialect::Postgres {
            return Err(QueryError::UnsupportedFeature {
                feature: "lambda".to_string(),
                dialect: self.dialect,
            }
            .into());
        }
        let body = self.print_expr(&lambda.body)?;
        let args: Vec<_> = lambda.args.iter().map(|a| self.quote(a)).collect();
        Ok(match args.as_slice() {
            [single] => format!("{} -> {}", single, body),
            _ => format!("({}) -> {}", args.join(", "), body),
        })
    }

    fn print_window(&mut self, window: &WindowFunction) -> CompileResult<String> {
        let mut args = Vec::with_capacity(window.args.len());
        for arg in &window.args {
            args.push(self.print_expr(arg)?);
        }
        let function = self.render_function(&window.name, &args, false)?;

        let mut over = Vec::new();
        if !window.over.partition_by.is_empty() {
            over.push(format!("PARTITION BY {}", self.print_list(&window.over.partition_by)?));
        }
        if !window.over.order_by.is_empty() {
            over.push(format!("ORDER BY {}", self.print_order_by(&window.over.order_by)?));
        }
        match &window.over.frame {
            Some(frame) => over.push(print_frame(frame)),
            None if !self.caps.native_lag_lead
                && matches!(window.name.as_str(), "lag" | "lead") =>
            {
                over.push(EMULATED_FRAME.to_string())
            }
            None => {}
        }
        Ok(format!("{} OVER ({})", function, over.join(" ")))
    }

    fn quote(&self, identifier: &str) -> String {
        let plain = match self.dialect {
            Dialect::ClickHouse => PLAIN_IDENTIFIER.is_match(identifier),
            Dialect::Postgres => PLAIN_PG_IDENTIFIER.is_match(identifier),
            Dialect::HogQL => PLAIN_HOGQL_IDENTIFIER.is_match(identifier),
        } && !KEYWORDS.contains(&identifier.to_ascii_lowercase().as_str());
        if plain {
            return identifier.to_string();
        }
        match self.dialect {
            Dialect::Postgres => format!("\"{}\"", identifier.replace('"', "\"\"")),
            Dialect::ClickHouse | Dialect::HogQL => format!(
                "`{}`",
                identifier.replace('\\', "\\\\").replace('`', "\\`")
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Database, MaterializationCatalog};
    use crate::config::{CompileSettings, Modifiers};
    use crate::query_ast::builders::{
        alias, and, bound_field, constant, hidden_alias, int, not_eq, null, or, select_from,
    };
    use crate::query_ast::{ArrayJoin, LimitBy, SampleClause, WindowSpec};
    use crate::sql_generator::print_select;

    struct Fixture {
        database: Database,
        catalog: MaterializationCatalog,
        modifiers: Modifiers,
        settings: CompileSettings,
    }

    impl Fixture {
        fn new() -> Self {
            Fixture {
                database: Database::standard(),
                catalog: MaterializationCatalog::default(),
                modifiers: Modifiers::default(),
                settings: CompileSettings::default(),
            }
        }

        fn ctx(&self) -> CompileContext<'_> {
            CompileContext {
                database: &self.database,
                catalog: &self.catalog,
                modifiers: &self.modifiers,
                settings: &self.settings,
                team_id: Some(1),
            }
        }

        fn print(&self, select: &SelectQuery, dialect: Dialect) -> CompileResult<PrintedQuery> {
            print_select(select, dialect, &self.ctx())
        }
    }

    const SETTINGS: &str = " SETTINGS readonly=2, max_execution_time=60, join_use_nulls=1";

    fn event() -> Expr {
        column("events", Some("events"), "event", DataType::string())
    }

    fn nullable(name: &str) -> Expr {
        column("events", Some("events"), name, DataType::string().nullable())
    }

    fn events_where(filter: Expr) -> SelectQuery {
        SelectQuery {
            where_clause: Some(filter),
            ..select_from("events", vec![alias("event", event())])
        }
    }

    fn where_sql(fx: &Fixture, filter: Expr, dialect: Dialect) -> String {
        let sql = fx.print(&events_where(filter), dialect).unwrap().sql;
        let start = sql.find("WHERE ").unwrap() + "WHERE ".len();
        let end = sql.find(" LIMIT").unwrap();
        sql[start..end].to_string()
    }

    #[test]
    fn test_clickhouse_select_binds_parameters() {
        let fx = Fixture::new();
        let printed = fx
            .print(&events_where(eq(event(), constant("$pageview"))), Dialect::ClickHouse)
            .unwrap();
        assert_eq!(
            printed.sql,
            format!(
                "SELECT events.event AS event FROM events WHERE equals(events.event, %(hogql_val_0)s) LIMIT 100{}",
                SETTINGS
            )
        );
        assert_eq!(printed.params["hogql_val_0"], serde_json::json!("$pageview"));
        assert_eq!(printed.columns, vec!["event"]);
    }

    #[test]
    fn test_clickhouse_null_safety() {
        let fx = Fixture::new();
        let ch = Dialect::ClickHouse;
        assert_eq!(
            where_sql(&fx, eq(nullable("a"), constant("x")), ch),
            "ifNull(equals(events.a, %(hogql_val_0)s), 0)"
        );
        assert_eq!(
            where_sql(&fx, not_eq(nullable("a"), constant("x")), ch),
            "ifNull(notEquals(events.a, %(hogql_val_0)s), 1)"
        );
        assert_eq!(
            where_sql(&fx, eq(nullable("a"), nullable("b")), ch),
            "ifNull(equals(events.a, events.b), and(isNull(events.a), isNull(events.b)))"
        );
        assert_eq!(
            where_sql(&fx, not_eq(nullable("a"), nullable("b")), ch),
            "ifNull(notEquals(events.a, events.b), or(isNotNull(events.a), isNotNull(events.b)))"
        );
        assert_eq!(where_sql(&fx, eq(nullable("a"), null()), ch), "isNull(events.a)");
        assert_eq!(where_sql(&fx, not_eq(null(), event()), ch), "isNotNull(events.event)");
        assert_eq!(
            where_sql(&fx, compare(CompareOperator::Like, nullable("a"), constant("%x%")), ch),
            "ifNull(like(events.a, %(hogql_val_0)s), 0)"
        );
    }

    #[test]
    fn test_postgres_null_safety() {
        let fx = Fixture::new();
        let pg = Dialect::Postgres;
        assert_eq!(
            where_sql(&fx, eq(event(), constant("x")), pg),
            "(events.event = %(hogql_val_0)s)"
        );
        assert_eq!(
            where_sql(&fx, eq(nullable("a"), constant("x")), pg),
            "(events.a IS NOT DISTINCT FROM %(hogql_val_0)s)"
        );
        assert_eq!(
            where_sql(&fx, not_eq(nullable("a"), constant("x")), pg),
            "(events.a IS DISTINCT FROM %(hogql_val_0)s)"
        );
        assert_eq!(
            where_sql(&fx, compare(CompareOperator::Lt, nullable("a"), constant("x")), pg),
            "COALESCE((events.a < %(hogql_val_0)s), false)"
        );
        assert_eq!(where_sql(&fx, eq(nullable("a"), null()), pg), "(events.a IS NULL)");
    }

    #[test]
    fn test_nullable_connective_operands_are_wrapped() {
        let fx = Fixture::new();
        let flag = column(
            "events",
            Some("events"),
            "flag",
            DataType::boolean().nullable(),
        );
        let filter = and(vec![flag.clone(), eq(event(), constant("x"))]);
        assert_eq!(
            where_sql(&fx, filter, Dialect::ClickHouse),
            "and(ifNull(events.flag, 0), equals(events.event, %(hogql_val_0)s))"
        );
        assert_eq!(
            where_sql(&fx, or(vec![flag, eq(event(), constant("x"))]), Dialect::Postgres),
            "(COALESCE(events.flag, false) OR (events.event = %(hogql_val_0)s))"
        );
    }

    #[test]
    fn test_join_constraints_are_printed_plain() {
        let fx = Fixture::new();
        let sub = select_from(
            "sessions",
            vec![alias(
                "session_id",
                column("sessions", Some("sessions"), "session_id", DataType::string()),
            )],
        );
        let mut from = JoinExpr::table("events");
        from.append(JoinExpr {
            join_type: Some(JoinType::LeftOuter),
            table: TableExpr::Subquery(Box::new(sub)),
            alias: Some("s".to_string()),
            constraint: Some(eq(
                nullable("$session_id"),
                column("s", None, "session_id", DataType::string().nullable()),
            )),
            sample: None,
            next_join: None,
        });
        let select = SelectQuery {
            select: vec![alias("event", event())],
            select_from: Some(from),
            ..Default::default()
        };
        let sql = fx.print(&select, Dialect::ClickHouse).unwrap().sql;
        assert!(sql.contains(
            "LEFT OUTER JOIN (SELECT sessions.session_id AS session_id FROM sessions) AS s ON equals(events.`$session_id`, s.session_id)"
        ));
    }

    #[test]
    fn test_capabilities_are_checked_before_printing() {
        let fx = Fixture::new();
        let mut sampled = select_from("events", vec![event()]);
        if let Some(from) = sampled.select_from.as_mut() {
            from.sample = Some(SampleClause {
                ratio: SampleRatio {
                    numerator: 1,
                    denominator: Some(10),
                },
                offset: None,
            });
        }
        let err = fx.print(&sampled, Dialect::Postgres).unwrap_err();
        assert!(matches!(
            err,
            CompileError::Query(QueryError::UnsupportedFeature { ref feature, .. }) if feature == "SAMPLE"
        ));
        let sql = fx.print(&sampled, Dialect::ClickHouse).unwrap().sql;
        assert!(sql.contains("FROM events SAMPLE 1/10"));

        let limited_by = SelectQuery {
            limit_by: Some(LimitBy {
                n: int(1),
                offset: None,
                exprs: vec![event()],
            }),
            ..select_from("events", vec![event()])
        };
        assert!(fx.print(&limited_by, Dialect::Postgres).is_err());
        let sql = fx.print(&limited_by, Dialect::ClickHouse).unwrap().sql;
        assert!(sql.contains("LIMIT 1 BY events.event LIMIT 100"));

        let array_joined = SelectQuery {
            array_join: Some(ArrayJoin {
                kind: ArrayJoinKind::Left,
                exprs: vec![alias("item", nullable("items"))],
            }),
            ..select_from("events", vec![event()])
        };
        assert!(fx.print(&array_joined, Dialect::Postgres).is_err());
        let sql = fx.print(&array_joined, Dialect::ClickHouse).unwrap().sql;
        assert!(sql.contains("LEFT ARRAY JOIN events.items AS item"));

        let cohort = events_where(compare(CompareOperator::InCohort, event(), int(3)));
        assert!(fx.print(&cohort, Dialect::Postgres).is_err());
    }

    #[test]
    fn test_cohort_membership_expands_on_clickhouse() {
        let fx = Fixture::new();
        let person_id = column("events", Some("events"), "person_id", DataType::uuid());
        let select = events_where(compare(CompareOperator::InCohort, person_id, int(5)));
        let printed = fx.print(&select, Dialect::ClickHouse).unwrap();
        assert!(printed.sql.contains(
            "in(events.person_id, (SELECT cohortpeople.person_id FROM cohortpeople WHERE and(equals(cohortpeople.team_id, 1), equals(cohortpeople.cohort_id, 5)) GROUP BY cohortpeople.person_id, cohortpeople.cohort_id, cohortpeople.version HAVING greater(sum(cohortpeople.sign), 0)))"
        ));
        assert!(printed.params.is_empty());
    }

    #[test]
    fn test_reserved_alias_and_percent_identifiers_are_rejected() {
        let fx = Fixture::new();
        let reserved = select_from("events", vec![alias("team_id", event())]);
        assert!(matches!(
            fx.print(&reserved, Dialect::ClickHouse),
            Err(CompileError::Query(QueryError::ReservedAlias { .. }))
        ));
        let percent = select_from("events", vec![alias("a%b", event())]);
        assert!(matches!(
            fx.print(&percent, Dialect::HogQL),
            Err(CompileError::Query(QueryError::InvalidIdentifier { .. }))
        ));
        // Compiler-generated aliases may shadow reserved names.
        let hidden = select_from("events", vec![hidden_alias("team_id", event())]);
        assert!(fx.print(&hidden, Dialect::ClickHouse).is_ok());
    }

    fn lag_over_timestamp(frame: Option<WindowFrame>) -> SelectQuery {
        let window = Expr::WindowFunction(WindowFunction {
            name: "lag".to_string(),
            args: vec![event()],
            over: WindowSpec {
                partition_by: vec![],
                order_by: vec![OrderExpr {
                    expr: column("events", Some("events"), "timestamp", DataType::datetime()),
                    order: Order::Asc,
                }],
                frame,
            },
            ty: Some(DataType::string().nullable()),
        });
        select_from("events", vec![alias("previous", window)])
    }

    #[test]
    fn test_lag_is_emulated_on_clickhouse() {
        let fx = Fixture::new();
        let sql = fx.print(&lag_over_timestamp(None), Dialect::ClickHouse).unwrap().sql;
        assert!(sql.starts_with(
            "SELECT lagInFrame(events.event) OVER (ORDER BY events.timestamp ASC ROWS BETWEEN UNBOUNDED PRECEDING AND UNBOUNDED FOLLOWING) AS previous"
        ));

        let explicit = WindowFrame {
            kind: FrameKind::Rows,
            start: FrameBound::Preceding(1),
            end: Some(FrameBound::CurrentRow),
        };
        let sql = fx
            .print(&lag_over_timestamp(Some(explicit)), Dialect::ClickHouse)
            .unwrap()
            .sql;
        assert!(sql.contains("OVER (ORDER BY events.timestamp ASC ROWS BETWEEN 1 PRECEDING AND CURRENT ROW)"));
        assert!(!sql.contains("UNBOUNDED"));

        let sql = fx.print(&lag_over_timestamp(None), Dialect::Postgres).unwrap().sql;
        assert!(sql.starts_with("SELECT lag(events.event) OVER (ORDER BY events.timestamp ASC) AS previous"));
    }

    #[test]
    fn test_limit_default_and_cap() {
        let fx = Fixture::new();
        let capped = SelectQuery {
            limit: Some(int(1_000_000)),
            ..select_from("events", vec![event()])
        };
        assert!(fx
            .print(&capped, Dialect::ClickHouse)
            .unwrap()
            .sql
            .contains("LIMIT 50000 SETTINGS"));

        let computed = SelectQuery {
            limit: Some(typed_call("plus", vec![int(1), int(2)], DataType::integer())),
            ..select_from("events", vec![event()])
        };
        let printed = fx.print(&computed, Dialect::ClickHouse).unwrap();
        assert!(printed
            .sql
            .contains("LIMIT min2(plus(%(hogql_val_0)s, %(hogql_val_1)s), 50000)"));
        let printed = fx.print(&computed, Dialect::Postgres).unwrap();
        assert!(printed.sql.ends_with(
            "LIMIT LEAST((%(hogql_val_0)s + %(hogql_val_1)s), 50000)"
        ));
    }

    #[test]
    fn test_output_format() {
        let mut fx = Fixture::new();
        fx.settings.output_format = Some("JSONEachRow".to_string());
        let select = select_from("events", vec![event()]);
        assert!(fx
            .print(&select, Dialect::ClickHouse)
            .unwrap()
            .sql
            .ends_with("join_use_nulls=1 FORMAT JSONEachRow"));

        fx.settings.output_format = Some("JSON; DROP".to_string());
        assert!(matches!(
            fx.print(&select, Dialect::ClickHouse),
            Err(CompileError::Query(QueryError::InvalidQuery(_)))
        ));
    }

    #[test]
    fn test_hogql_inlines_constants_and_omits_hidden_aliases() {
        let fx = Fixture::new();
        let event_field = bound_field(
            vec!["event".to_string()],
            Binding::Column {
                source: TableSource::table("events", "events"),
                column: "event".to_string(),
                ty: DataType::string(),
            },
        );
        let select = SelectQuery {
            where_clause: Some(eq(event_field.clone(), constant("it's"))),
            ..select_from("events", vec![hidden_alias("event", event_field)])
        };
        let printed = fx.print(&select, Dialect::HogQL).unwrap();
        assert_eq!(printed.sql, "SELECT event FROM events WHERE event = 'it\\'s'");
        assert!(printed.params.is_empty());
        assert_eq!(printed.columns, vec!["event"]);
    }

    #[test]
    fn test_identifier_quoting() {
        let fx = Fixture::new();
        let select = select_from("events", vec![nullable("$session_id"), nullable("Mixed")]);
        let ch = fx.print(&select, Dialect::ClickHouse).unwrap().sql;
        assert!(ch.starts_with("SELECT events.`$session_id`, events.Mixed FROM events"));
        let pg = fx.print(&select, Dialect::Postgres).unwrap().sql;
        assert!(pg.starts_with("SELECT events.\"$session_id\", events.\"Mixed\" FROM events"));
    }

    #[test]
    fn test_postgres_inlines_select_aliases_outside_select_list() {
        let fx = Fixture::new();
        let total = typed_call("count", vec![], DataType::integer());
        let total_ref = bound_field(
            vec!["total".to_string()],
            Binding::SelectAlias {
                name: "total".to_string(),
                ty: DataType::integer(),
            },
        );
        let select = SelectQuery {
            having: Some(compare(CompareOperator::Gt, total_ref, int(1))),
            ..select_from("events", vec![alias("total", total)])
        };
        let pg = fx.print(&select, Dialect::Postgres).unwrap().sql;
        assert!(pg.contains("HAVING ((count()) > %(hogql_val_0)s)"));
        let ch = fx.print(&select, Dialect::ClickHouse).unwrap().sql;
        assert!(ch.contains("HAVING greater(total, %(hogql_val_0)s)"));
    }

    #[test]
    fn test_functions_render_per_dialect() {
        let fx = Fixture::new();
        let select = select_from(
            "events",
            vec![typed_call("toString", vec![event()], DataType::string())],
        );
        assert!(fx
            .print(&select, Dialect::Postgres)
            .unwrap()
            .sql
            .starts_with("SELECT CAST(events.event AS TEXT) FROM"));

        let arg_max = select_from(
            "events",
            vec![typed_call("argMax", vec![event(), event()], DataType::string())],
        );
        assert!(matches!(
            fx.print(&arg_max, Dialect::Postgres),
            Err(CompileError::Query(QueryError::UnsupportedFeature { .. }))
        ));
        assert!(fx.print(&arg_max, Dialect::ClickHouse).is_ok());
    }

    #[test]
    fn test_unmaterialized_and_unbound_fields_are_internal_errors() {
        let fx = Fixture::new();
        let lazy = bound_field(
            vec!["pdi".to_string(), "person_id".to_string()],
            Binding::Column {
                source: TableSource::Lazy {
                    from_alias: "events".to_string(),
                    path: vec!["pdi".to_string()],
                },
                column: "person_id".to_string(),
                ty: DataType::uuid(),
            },
        );
        assert!(matches!(
            fx.print(&select_from("events", vec![lazy]), Dialect::ClickHouse),
            Err(CompileError::Internal(InternalError::UnmaterializedField { .. }))
        ));
        let unbound = crate::query_ast::builders::field(&["event"]);
        assert!(matches!(
            fx.print(&select_from("events", vec![unbound]), Dialect::ClickHouse),
            Err(CompileError::Internal(InternalError::UnboundField { .. }))
        ));
    }

    #[test]
    fn test_printing_is_idempotent() {
        let fx = Fixture::new();
        let select = events_where(and(vec![
            eq(nullable("a"), constant("x")),
            compare(
                CompareOperator::In,
                event(),
                Expr::Tuple(vec![constant("a"), constant("b")]),
            ),
        ]));
        for dialect in [Dialect::ClickHouse, Dialect::Postgres, Dialect::HogQL] {
            let first = fx.print(&select, dialect).unwrap();
            let second = fx.print(&select, dialect).unwrap();
            assert_eq!(first, second);
        }
        let ch = fx.print(&select, Dialect::ClickHouse).unwrap().sql;
        assert!(ch.contains("in(events.event, tuple(%(hogql_val_1)s, %(hogql_val_2)s))"));
    }
}

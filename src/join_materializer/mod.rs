//! Join Materializer
//!
//! Turns fields bound to virtual tables into real joins. Per SELECT:
//!
//! 1. fields with a [`TableSource::Lazy`] source are grouped by traversal
//!    path (`events.pdi.person` and `events.pdi` are two paths)
//! 2. every path becomes one subquery, joined onto the FROM chain after the
//!    path it hangs off
//! 3. the fields are rewritten to read the subquery's output columns
//!
//! Virtual tables named directly in FROM are replaced in place by the same
//! subqueries. Nested SELECTs are processed before the SELECT containing them.
//!
//! When `optimize_joined_filters` is on, the SELECT's WHERE is pushed into
//! each subquery through [`pushdown_where`].

mod distinct_ids;
pub mod join_registry;
mod persons;
mod sessions;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::catalog::{Database, FieldDef, LazyTable, TableDef};
use crate::compiler::CompileContext;
use crate::config::PersonsOnEventsMode;
use crate::errors::{CompileError, CompileResult, InternalError, Pass};
use crate::optimizer::{pushdown_where, PushdownTarget};
use crate::query_ast::builders::{bound_field, column, eq, inline_constant, null, or, typed_call};
use crate::query_ast::combinators;
use crate::query_ast::visitors::{
    collect_fields, walk_expression, walk_select_transform, walk_transform, ExprTransformer,
    ExpressionVisitor,
};
use crate::query_ast::{
    Binding, DataType, Expr, Field, JoinExpr, JoinType, SelectQuery, TableExpr, TableSource,
};
use crate::resolver::person_id_with_override;

pub use join_registry::{JoinKey, JoinRegistry};

/// Replaces every virtual-table access in `select` with joins.
pub fn materialize_joins(select: SelectQuery, ctx: &CompileContext<'_>) -> CompileResult<SelectQuery> {
    log::debug!("JoinMaterializer: starting");
    let mut materializer = Materializer { ctx };
    materializer.visit_select(select)
}

/// Builds the subquery standing in for one virtual table.
trait LazyTableBuilder {
    /// Identity used to deduplicate joins.
    fn identity(&self) -> String;

    /// Output column the join matches on.
    fn key(&self) -> (&'static str, DataType);

    /// Column of the parent table holding the join key, when it is not the
    /// field declared on the lazy join.
    fn parent_key_column(&self) -> Option<(&'static str, DataType)> {
        None
    }

    /// The subquery, outputting the key plus `requested` columns.
    fn build(&self, requested: &BTreeSet<String>, pushed: Option<Expr>) -> CompileResult<SelectQuery>;

    /// How fields bound to `source` map into the subquery.
    fn pushdown_target(&self, source: TableSource, null_padded: bool) -> Box<dyn PushdownTarget + '_>;
}

fn builder<'c>(ctx: &'c CompileContext<'c>, table: LazyTable) -> Box<dyn LazyTableBuilder + 'c> {
    match table {
        LazyTable::Persons => Box::new(persons::Persons::new(ctx)),
        LazyTable::PersonDistinctIds | LazyTable::PersonDistinctIdOverrides => {
            Box::new(distinct_ids::DistinctIds::new(ctx, table))
        }
        LazyTable::Sessions => Box::new(sessions::Sessions::new(ctx)),
    }
}

// =============================================================================
// Shared pieces of the lazy subqueries
// =============================================================================

/// Output column name for a property read, `properties___a___b`.
pub(crate) fn property_column(column: &str, keys: &[String]) -> String {
    format!("{}___{}", column, keys.join("___"))
}

/// Inverse of [`property_column`].
fn property_keys(column: &str, name: &str) -> Option<Vec<String>> {
    let rest = name.strip_prefix(column)?.strip_prefix("___")?;
    Some(rest.split("___").map(str::to_string).collect())
}

fn team_column(alias: &str, table: &str) -> Expr {
    column(alias, Some(table), "team_id", DataType::integer())
}

fn team_guard(alias: &str, table: &str, team_id: i64) -> Expr {
    eq(team_column(alias, table), inline_constant(team_id))
}

/// Whether the FROM chain keeps unmatched rows of a later table. Filtering
/// either side of such a join before it runs changes which rows get padded.
fn has_right_or_full_join<'a>(links: impl IntoIterator<Item = &'a JoinExpr>) -> bool {
    links.into_iter().any(|l| {
        matches!(
            l.join_type,
            Some(JoinType::RightOuter) | Some(JoinType::FullOuter)
        )
    })
}

/// `argMax(value, <table>.version)`: the value at the latest version.
fn latest(table: &str, value: Expr, ty: DataType) -> Expr {
    typed_call(
        "argMax",
        vec![value, column(table, Some(table), "version", DataType::integer())],
        ty,
    )
}

fn not_deleted(table: &str) -> Expr {
    eq(
        latest(
            table,
            column(table, Some(table), "is_deleted", DataType::integer()),
            DataType::integer(),
        ),
        inline_constant(0_i64),
    )
}

/// The binding of `field` when it reads `source` directly.
fn binding_on<'f>(field: &'f Field, source: &TableSource) -> Option<&'f Binding> {
    field
        .binding
        .as_ref()
        .filter(|b| !matches!(b, Binding::Outer { .. }) && b.source() == Some(source))
}

fn is_lazy_table(database: &Database, name: &str) -> bool {
    database
        .table(name)
        .is_some_and(|t| t.lazy_table().is_some())
}

// =============================================================================
// Usage collection
// =============================================================================

/// A lazy join: the FROM alias it hangs off and the traversal from there.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct LazyPath {
    from_alias: String,
    path: Vec<String>,
}

impl LazyPath {
    fn of(source: &TableSource) -> Option<Self> {
        match source {
            TableSource::Lazy { from_alias, path } => Some(LazyPath {
                from_alias: from_alias.clone(),
                path: path.clone(),
            }),
            TableSource::Table { .. } => None,
        }
    }

    fn source(&self) -> TableSource {
        TableSource::Lazy {
            from_alias: self.from_alias.clone(),
            path: self.path.clone(),
        }
    }

    fn alias(&self) -> String {
        format!("{}__{}", self.from_alias, self.path.join("__"))
    }
}

fn output_name(binding: &Binding) -> Option<String> {
    match binding {
        Binding::Column { column, .. } => Some(column.clone()),
        Binding::Property { column, keys, .. } => Some(property_column(column, keys)),
        _ => None,
    }
}

#[derive(Debug, Default)]
struct Usage {
    /// Output columns requested from each lazy join.
    joins: BTreeMap<LazyPath, BTreeSet<String>>,
    /// Output columns requested from virtual tables named in FROM, by alias.
    from_tables: BTreeMap<String, BTreeSet<String>>,
}

impl Usage {
    /// Records a binding into the SELECT being materialized. Returns the
    /// lazy path it reads, if any.
    fn record(&mut self, binding: &Binding, database: &Database) -> Option<LazyPath> {
        let name = output_name(binding)?;
        match binding.source()? {
            source @ TableSource::Lazy { .. } => {
                let path = LazyPath::of(source)?;
                self.joins.entry(path.clone()).or_default().insert(name);
                Some(path)
            }
            TableSource::Table {
                alias,
                table: Some(table),
            } if is_lazy_table(database, table) => {
                self.from_tables
                    .entry(alias.clone())
                    .or_default()
                    .insert(name);
                None
            }
            TableSource::Table { .. } => None,
        }
    }
}

/// Every expression of a SELECT outside its FROM chain.
fn clause_exprs(select: &SelectQuery) -> Vec<&Expr> {
    let mut out: Vec<&Expr> = select.select.iter().chain(&select.group_by).collect();
    if let Some(aj) = &select.array_join {
        out.extend(&aj.exprs);
    }
    let singles = [
        &select.prewhere,
        &select.where_clause,
        &select.having,
        &select.limit,
        &select.offset,
    ];
    out.extend(singles.into_iter().flatten());
    out.extend(select.order_by.iter().map(|o| &o.expr));
    if let Some(lb) = &select.limit_by {
        out.push(&lb.n);
        out.extend(&lb.offset);
        out.extend(&lb.exprs);
    }
    out
}

/// Finds the fields reading the SELECT being materialized: its own fields,
/// plus correlated references from nested subqueries.
struct UsageScan<'u> {
    usage: &'u mut Usage,
    database: &'u Database,
    /// Frames between the scanned SELECT and the materialized one.
    level: usize,
}

impl UsageScan<'_> {
    fn scan_select(&mut self, select: &SelectQuery) {
        for join in select.joins() {
            // FROM subqueries do not see the SELECT they sit in.
            if let (TableExpr::Subquery(sub), true) = (&join.table, self.level > 0) {
                self.scan_select(sub);
            }
            if let Some(c) = &join.constraint {
                walk_expression(c, self);
            }
        }
        for expr in clause_exprs(select) {
            walk_expression(expr, self);
        }
    }
}

impl ExpressionVisitor for UsageScan<'_> {
    fn visit_field(&mut self, field: &Field) {
        let binding = match (&field.binding, self.level) {
            (Some(b), 0) => b,
            (Some(Binding::Outer { levels, inner }), level) if *levels == level => inner,
            _ => return,
        };
        self.usage.record(binding, self.database);
    }

    fn enter_select(&mut self, select: &SelectQuery) -> bool {
        let mut nested = UsageScan {
            usage: &mut *self.usage,
            database: self.database,
            level: self.level + 1,
        };
        nested.scan_select(select);
        false
    }
}

// =============================================================================
// Planning
// =============================================================================

struct JoinPlan {
    table: LazyTable,
    join_type: JoinType,
    /// Key expression on the parent side, before rewriting.
    parent_key: Expr,
    /// Canonical text of `parent_key`, for deduplication.
    key_text: String,
    /// Lazy joins `parent_key` reads.
    deps: Vec<LazyPath>,
}

/// WHERE clause and aliases of the SELECT, as seen before materialization.
struct PushdownInput {
    where_clause: Option<Expr>,
    aliases: Vec<(String, Expr)>,
}

impl PushdownInput {
    fn of(select: &SelectQuery) -> Self {
        let where_clause = if has_right_or_full_join(select.joins()) {
            log::debug!("JoinMaterializer: RIGHT/FULL join in FROM, nothing is pushed");
            None
        } else {
            select.where_clause.clone()
        };
        PushdownInput {
            where_clause,
            aliases: select
                .select
                .iter()
                .filter_map(|e| match e {
                    Expr::Alias(a) => Some((a.alias.clone(), (*a.expr).clone())),
                    _ => None,
                })
                .collect(),
        }
    }
}

#[derive(Debug)]
struct SelectJoins {
    registry: JoinRegistry,
    aliases: HashMap<LazyPath, String>,
}

struct Materializer<'c> {
    ctx: &'c CompileContext<'c>,
}

impl<'c> Materializer<'c> {
    fn materialize(&self, select: SelectQuery) -> CompileResult<SelectQuery> {
        let database = self.ctx.database;
        let mut usage = Usage::default();
        UsageScan {
            usage: &mut usage,
            database,
            level: 0,
        }
        .scan_select(&select);

        let from_tables: HashMap<String, &TableDef> = select
            .joins()
            .filter_map(|j| match &j.table {
                TableExpr::Table { name } => {
                    let alias = j.alias.clone().unwrap_or_else(|| name.clone());
                    database.table(name).map(|def| (alias, def))
                }
                TableExpr::Subquery(_) => None,
            })
            .collect();
        if usage.joins.is_empty() && !from_tables.values().any(|t| t.lazy_table().is_some()) {
            return self.guard_only(select);
        }

        let plans = self.plan_all(&mut usage, &from_tables)?;
        let input = PushdownInput::of(&select);
        let mut joins = SelectJoins {
            registry: JoinRegistry::for_select(&select),
            aliases: HashMap::new(),
        };
        for path in plans.keys() {
            self.ensure(path, &plans, &usage, &input, &mut joins, 0)?;
        }
        if !joins.registry.is_empty() {
            log::debug!(
                "JoinMaterializer: {} lazy join(s) added to SELECT",
                joins.registry.len()
            );
        }

        let mut select = self.rewrite_from(select, Some((&usage, &input)))?;
        let mut rewriter = LazyRewriter {
            aliases: &joins.aliases,
            database,
        };
        select = walk_select_transform(&mut rewriter, select)?;
        joins.registry.splice_into(&mut select)?;
        Ok(select)
    }

    fn guard_only(&self, select: SelectQuery) -> CompileResult<SelectQuery> {
        if self.ctx.team_id.is_none() {
            return Ok(select);
        }
        self.rewrite_from(select, None)
    }

    fn plan_all(
        &self,
        usage: &mut Usage,
        from_tables: &HashMap<String, &TableDef>,
    ) -> CompileResult<BTreeMap<LazyPath, JoinPlan>> {
        let mut plans = BTreeMap::new();
        let mut pending: Vec<LazyPath> = usage.joins.keys().cloned().collect();
        while let Some(path) = pending.pop() {
            if plans.contains_key(&path) {
                continue;
            }
            let plan = self.plan(&path, from_tables)?;
            for field in collect_fields(&plan.parent_key) {
                if let Some(binding) = &field.binding {
                    if let Some(dep) = usage.record(binding, self.ctx.database) {
                        pending.push(dep);
                    }
                }
            }
            plans.insert(path, plan);
        }
        Ok(plans)
    }

    fn lazy_def(&self, table: LazyTable) -> CompileResult<&'c TableDef> {
        self.ctx.database.table(table.name()).ok_or_else(|| {
            CompileError::contract(
                Pass::JoinMaterializer,
                format!("lazy table `{}` missing from the database", table.name()),
            )
        })
    }

    /// Table reached from `def` through `step`.
    fn step_target(&self, def: &TableDef, step: &str) -> CompileResult<&'c TableDef> {
        match def.field(step) {
            Some(FieldDef::LazyJoin(join)) => self.lazy_def(join.table),
            Some(FieldDef::PersonTraverser) => self.lazy_def(LazyTable::Persons),
            _ => Err(CompileError::contract(
                Pass::JoinMaterializer,
                format!("`{}.{}` is not a virtual table", def.name, step),
            )),
        }
    }

    fn plan(&self, path: &LazyPath, from_tables: &HashMap<String, &TableDef>) -> CompileResult<JoinPlan> {
        let root = from_tables.get(&path.from_alias).copied().ok_or_else(|| {
            CompileError::contract(
                Pass::JoinMaterializer,
                format!("virtual path from unknown table `{}`", path.from_alias),
            )
        })?;
        let Some((step, parents)) = path.path.split_last() else {
            return Err(CompileError::contract(
                Pass::JoinMaterializer,
                "empty virtual path",
            ));
        };

        let mut def = root;
        for parent in parents {
            def = self.step_target(def, parent)?;
        }
        let (parent_source, parent_label) = if parents.is_empty() {
            (
                TableSource::table(path.from_alias.clone(), &root.name),
                path.from_alias.clone(),
            )
        } else {
            let parent = LazyPath {
                from_alias: path.from_alias.clone(),
                path: parents.to_vec(),
            };
            (parent.source(), parent.alias())
        };

        let (table, join_type, parent_key, key_column) = match def.field(step) {
            Some(FieldDef::LazyJoin(join)) => {
                let (column_name, ty) = match builder(self.ctx, join.table).parent_key_column() {
                    Some((c, ty)) => (c.to_string(), ty),
                    None => {
                        let ty = match def.field(&join.from_field) {
                            Some(FieldDef::Column { ty, .. }) => ty.clone(),
                            _ => DataType::unknown(),
                        };
                        (join.from_field.clone(), ty)
                    }
                };
                let key = bound_field(
                    vec![parent_label.clone(), column_name.clone()],
                    Binding::Column {
                        source: parent_source,
                        column: column_name.clone(),
                        ty,
                    },
                );
                (join.table, join.join_type, key, column_name)
            }
            Some(FieldDef::PersonTraverser)
                if self.ctx.modifiers.persons_on_events_mode
                    == PersonsOnEventsMode::PersonIdOverridePropertiesJoined =>
            {
                (
                    LazyTable::Persons,
                    JoinType::Inner,
                    person_id_with_override(&parent_source),
                    "person_id_with_override".to_string(),
                )
            }
            _ => {
                return Err(CompileError::contract(
                    Pass::JoinMaterializer,
                    format!("`{}.{}` is not a virtual table", def.name, step),
                ))
            }
        };

        let deps = collect_fields(&parent_key)
            .into_iter()
            .filter_map(|f| f.binding.as_ref().and_then(Binding::source).and_then(LazyPath::of))
            .collect();
        log::trace!(
            "JoinMaterializer: {} joins `{}` on {}",
            path.alias(),
            table.name(),
            key_column
        );
        Ok(JoinPlan {
            table,
            join_type,
            parent_key,
            key_text: format!("{}.{}", parent_label, key_column),
            deps,
        })
    }

    fn pushed(
        &self,
        builder: &dyn LazyTableBuilder,
        source: TableSource,
        null_padded: bool,
        input: &PushdownInput,
    ) -> CompileResult<Option<Expr>> {
        if !self.ctx.modifiers.optimize_joined_filters {
            return Ok(None);
        }
        let Some(where_clause) = &input.where_clause else {
            return Ok(None);
        };
        let target = builder.pushdown_target(source, null_padded);
        let pushed = pushdown_where(where_clause, target.as_ref(), &input.aliases)?;
        if let Some(p) = &pushed {
            log::debug!(
                "JoinMaterializer: pushed {} predicate(s) into `{}`",
                combinators::flatten_and(p).len(),
                target.name()
            );
        }
        Ok(pushed)
    }

    /// Registers the join for `path`, after the joins its key depends on.
    fn ensure(
        &self,
        path: &LazyPath,
        plans: &BTreeMap<LazyPath, JoinPlan>,
        usage: &Usage,
        input: &PushdownInput,
        joins: &mut SelectJoins,
        depth: usize,
    ) -> CompileResult<()> {
        if joins.aliases.contains_key(path) {
            return Ok(());
        }
        if depth > plans.len() {
            return Err(CompileError::contract(
                Pass::JoinMaterializer,
                format!("cyclic dependency between lazy joins at `{}`", path.alias()),
            ));
        }
        let plan = plans.get(path).ok_or_else(|| {
            CompileError::contract(
                Pass::JoinMaterializer,
                format!("no plan for lazy join `{}`", path.alias()),
            )
        })?;
        for dep in &plan.deps {
            self.ensure(dep, plans, usage, input, joins, depth + 1)?;
        }

        let builder = builder(self.ctx, plan.table);
        let (key_name, key_ty) = builder.key();
        let requested = usage.joins.get(path).cloned().unwrap_or_default();
        let pushed = self.pushed(
            builder.as_ref(),
            path.source(),
            plan.join_type == JoinType::LeftOuter,
            input,
        )?;
        let subquery = builder.build(&requested, pushed)?;
        let mut rewriter = LazyRewriter {
            aliases: &joins.aliases,
            database: self.ctx.database,
        };
        let parent_key = rewriter.rewrite(plan.parent_key.clone())?;

        let key = JoinKey::new(builder.identity(), &plan.key_text, plan.join_type);
        let alias = joins.registry.register_after(&path.from_alias, key, &path.alias(), |alias| {
            Ok(JoinExpr {
                join_type: Some(plan.join_type),
                table: TableExpr::Subquery(Box::new(subquery)),
                alias: Some(alias.to_string()),
                constraint: Some(eq(parent_key, column(alias, None, key_name, key_ty))),
                sample: None,
                next_join: None,
            })
        })?;
        joins.aliases.insert(path.clone(), alias);
        Ok(())
    }

    /// Replaces virtual tables in FROM with their subqueries and adds the
    /// team guard to physical ones. Without `lazy`, only the guards are added.
    fn rewrite_from(
        &self,
        mut select: SelectQuery,
        lazy: Option<(&Usage, &PushdownInput)>,
    ) -> CompileResult<SelectQuery> {
        let Some(from) = select.select_from.take() else {
            return Ok(select);
        };
        let links = from.into_links();
        let outer_joined = has_right_or_full_join(&links);

        let mut guards = Vec::new();
        let mut out = Vec::with_capacity(links.len());
        for mut link in links {
            let def = match &link.table {
                TableExpr::Table { name } => self.ctx.database.table(name),
                TableExpr::Subquery(_) => None,
            };
            let Some(def) = def else {
                out.push(link);
                continue;
            };
            let alias = link.alias.clone().unwrap_or_else(|| def.name.clone());

            match (def.lazy_table(), lazy) {
                (Some(table), Some((usage, input))) => {
                    let builder = builder(self.ctx, table);
                    let requested = usage.from_tables.get(&alias).cloned().unwrap_or_default();
                    let pushed = if !outer_joined {
                        self.pushed(
                            builder.as_ref(),
                            TableSource::table(alias.clone(), &def.name),
                            link.join_type == Some(JoinType::LeftOuter),
                            input,
                        )?
                    } else {
                        None
                    };
                    log::debug!("JoinMaterializer: `{}` in FROM becomes a subquery", alias);
                    link.table = TableExpr::Subquery(Box::new(builder.build(&requested, pushed)?));
                    link.alias = Some(alias);
                }
                (Some(_), None) => {
                    return Err(CompileError::contract(
                        Pass::JoinMaterializer,
                        format!("virtual table `{}` left in FROM", def.name),
                    ))
                }
                (None, _) => {
                    if let Some(team) = self.ctx.team_id {
                        guards.push((out.len(), alias, def.name.clone(), team));
                    }
                }
            }
            out.push(link);
        }

        let where_guards = place_team_guards(&mut out, guards, outer_joined);
        select.select_from = JoinExpr::from_links(out);
        for guard in where_guards {
            select.where_clause = Some(combinators::and_optional(select.where_clause.take(), guard));
        }
        Ok(select)
    }
}

/// Puts each physical table's team guard on the FROM chain, returning the
/// conditions that belong in WHERE.
///
/// Without RIGHT/FULL joins a guard goes in the table's own ON (WHERE for the
/// head and CROSS joins). With them, a table's rows may reappear NULL-padded
/// further down the chain, so its guard is added to the ON of its own link
/// and of every later one, and WHERE keeps rows that either pass it or are
/// padding on that side.
fn place_team_guards(
    links: &mut [JoinExpr],
    guards: Vec<(usize, String, String, i64)>,
    outer_joined: bool,
) -> Vec<Expr> {
    let mut where_guards = Vec::new();
    for (index, alias, table, team) in guards {
        let guard = team_guard(&alias, &table, team);
        if !outer_joined {
            match links[index].join_type {
                None | Some(JoinType::Cross) => where_guards.push(guard),
                Some(_) => {
                    let link = &mut links[index];
                    link.constraint = Some(combinators::and_optional(link.constraint.take(), guard));
                }
            }
            continue;
        }
        for link in links.iter_mut().skip(index) {
            if matches!(link.join_type, Some(t) if t != JoinType::Cross) {
                link.constraint =
                    Some(combinators::and_optional(link.constraint.take(), guard.clone()));
            }
        }
        where_guards.push(or(vec![guard, eq(team_column(&alias, &table), null())]));
    }
    where_guards
}

impl ExprTransformer for Materializer<'_> {
    fn visit_select(&mut self, select: SelectQuery) -> CompileResult<SelectQuery> {
        let select = walk_select_transform(self, select)?;
        self.materialize(select)
    }
}

// =============================================================================
// Field rewriting
// =============================================================================

/// Points fields of one SELECT level at the materialized joins.
struct LazyRewriter<'r> {
    aliases: &'r HashMap<LazyPath, String>,
    database: &'r Database,
}

impl LazyRewriter<'_> {
    fn rewrite(&mut self, expr: Expr) -> CompileResult<Expr> {
        self.visit(expr)?.ok_or_else(|| {
            CompileError::contract(Pass::JoinMaterializer, "expression removed while rewriting")
        })
    }

    fn rewrite_binding(&self, binding: Binding, chain: &[String]) -> CompileResult<Binding> {
        if let Binding::Outer { levels, inner } = binding {
            return Ok(Binding::Outer {
                levels,
                inner: Box::new(self.rewrite_binding(*inner, chain)?),
            });
        }
        let (Some(name), Some(source)) = (output_name(&binding), binding.source().cloned()) else {
            return Ok(binding);
        };
        let source = match source {
            TableSource::Lazy { from_alias, path } => {
                let alias = self
                    .aliases
                    .get(&LazyPath { from_alias, path })
                    .ok_or_else(|| InternalError::UnmaterializedField {
                        pass: Pass::JoinMaterializer,
                        chain: chain.join("."),
                    })?;
                TableSource::Table {
                    alias: alias.clone(),
                    table: None,
                }
            }
            TableSource::Table {
                table: Some(ref table),
                ..
            } if matches!(binding, Binding::Property { .. })
                && is_lazy_table(self.database, table) =>
            {
                source
            }
            TableSource::Table { .. } => return Ok(binding),
        };
        Ok(Binding::Column {
            source,
            column: name,
            ty: binding.data_type(),
        })
    }
}

impl ExprTransformer for LazyRewriter<'_> {
    fn visit(&mut self, expr: Expr) -> CompileResult<Option<Expr>> {
        match expr {
            Expr::Field(Field {
                chain,
                binding,
                span,
            }) => {
                let binding = match binding {
                    Some(b) => Some(self.rewrite_binding(b, &chain)?),
                    None => None,
                };
                Ok(Some(Expr::Field(Field {
                    chain,
                    binding,
                    span,
                })))
            }
            other => walk_transform(self, other),
        }
    }

    fn visit_select(&mut self, select: SelectQuery) -> CompileResult<SelectQuery> {
        Ok(select)
    }
}

//! Scope and type resolution.
//!
//! Produces a new tree in which every [`Field`] carries a [`Binding`] and
//! every [`Call`] a resolved return type. Virtual-table traversals such as
//! `events.pdi.person.properties.email` are bound to a
//! [`TableSource::Lazy`] source; the join materializer turns those into real
//! joins later.
//!
//! Name lookup order for a chain `a.b.c`:
//! 1. lambda argument `a` (single-element chains only)
//! 2. table alias `a` in the current SELECT
//! 3. select alias `a` (single-element chains only)
//! 4. field `a` of exactly one table in the current SELECT
//! 5. table alias `a` in an enclosing SELECT (correlated, [`Binding::Outer`])

mod scope;
pub mod suggestions;

use std::collections::HashSet;

use crate::catalog::{Database, FieldDef, MaterializationCatalog, TableDef, TableKind};
use crate::compiler::CompileContext;
use crate::config::{Modifiers, PersonsOnEventsMode};
use crate::errors::{CompileError, CompileResult, Pass, QueryError};
use crate::property_access::property_type;
use crate::query_ast::builders::{bound_field, typed_call};
use crate::query_ast::errors::AstError;
use crate::query_ast::{
    infer_type, Alias, ArrayJoin, Binding, Call, CompareOperation, CompareOperator, DataType,
    Expr, Field, JoinExpr, Lambda, LimitBy, OrderExpr, SelectQuery, TableExpr, TableSource,
    TypeKind, WindowFunction, WindowSpec,
};
use crate::sql_generator::function_registry;

use scope::{FrameTable, Scope, SelectFrame};
use suggestions::nearest;

/// Resolves every name in `select`.
pub fn resolve(select: &SelectQuery, ctx: &CompileContext<'_>) -> CompileResult<SelectQuery> {
    log::debug!("Resolver: starting");
    let mut resolver = Resolver {
        database: ctx.database,
        catalog: ctx.catalog,
        modifiers: ctx.modifiers,
        max_depth: ctx.settings.max_subquery_depth,
        scope: Scope::default(),
    };
    resolver.resolve_select(select)
}

/// What a chain resolved to: usually a binding, but a few virtual fields
/// expand into an expression.
enum Resolved {
    Binding(Binding),
    Expr(Expr),
}

struct Resolver<'a> {
    database: &'a Database,
    catalog: &'a MaterializationCatalog,
    modifiers: &'a Modifiers,
    max_depth: usize,
    scope: Scope<'a>,
}

fn unresolved(field: &Field, suggestion: Option<String>) -> CompileError {
    QueryError::UnresolvedField {
        chain: field.chain_string(),
        suggestion,
    }
    .into()
}

fn extend(source: &TableSource, step: &str) -> TableSource {
    match source {
        TableSource::Table { alias, .. } => TableSource::Lazy {
            from_alias: alias.clone(),
            path: vec![step.to_string()],
        },
        TableSource::Lazy { from_alias, path } => {
            let mut path = path.clone();
            path.push(step.to_string());
            TableSource::Lazy {
                from_alias: from_alias.clone(),
                path,
            }
        }
    }
}

/// Physical table whose properties a catalog table exposes.
pub(crate) fn properties_table(table: &TableDef) -> Option<&str> {
    match &table.kind {
        TableKind::Physical { table } => Some(table),
        TableKind::Lazy(crate::catalog::LazyTable::Persons) => {
            Some(crate::catalog::database::physical::PERSON)
        }
        TableKind::Lazy(_) => None,
    }
}

/// Output columns of a resolved SELECT, as seen by an enclosing FROM.
pub(crate) fn output_columns(select: &SelectQuery) -> Vec<(String, DataType)> {
    select
        .select
        .iter()
        .filter_map(|item| match item {
            Expr::Alias(a) => Some((a.alias.clone(), infer_type(&a.expr))),
            Expr::Field(f) => f.chain.last().map(|n| (n.clone(), infer_type(item))),
            _ => None,
        })
        .collect()
}

impl<'a> Resolver<'a> {
    fn resolve_select(&mut self, select: &SelectQuery) -> CompileResult<SelectQuery> {
        let depth = self.scope.select_depth();
        if depth >= self.max_depth {
            return Err(QueryError::QueryTooLarge(format!(
                "subqueries are nested more than {} levels deep",
                self.max_depth
            ))
            .into());
        }
        log::trace!("Resolver: SELECT at depth {}", depth);

        let mut frame = SelectFrame::default();
        let links = match &select.select_from {
            Some(from) => self.resolve_from_tables(from, &mut frame)?,
            None => Vec::new(),
        };

        self.scope.push_select(frame);
        let result = self.resolve_clauses(select, links);
        self.scope.pop_select();
        result
    }

    /// Registers the FROM chain's tables in `frame`. Constraints are resolved
    /// later, once every table is visible.
    fn resolve_from_tables(
        &mut self,
        from: &JoinExpr,
        frame: &mut SelectFrame<'a>,
    ) -> CompileResult<Vec<JoinExpr>> {
        let mut links = Vec::new();
        for link in from.iter() {
            let (table, frame_table) = match &link.table {
                TableExpr::Table { name } => {
                    let def = self.database.table(name).ok_or_else(|| QueryError::UnknownTable {
                        name: name.clone(),
                        suggestion: nearest(name, self.database.table_names()),
                    })?;
                    let alias = link.alias.clone().unwrap_or_else(|| name.clone());
                    (
                        link.table.clone(),
                        FrameTable::Catalog { alias, table: def },
                    )
                }
                TableExpr::Subquery(sub) => {
                    let alias = link.alias.clone().ok_or_else(|| {
                        QueryError::InvalidQuery("subqueries in FROM must have an alias".into())
                    })?;
                    let resolved = self.resolve_select(sub)?;
                    let columns = output_columns(&resolved);
                    (
                        TableExpr::Subquery(Box::new(resolved)),
                        FrameTable::Subquery { alias, columns },
                    )
                }
            };
            if frame.table(frame_table.alias()).is_some() {
                return Err(QueryError::InvalidQuery(format!(
                    "table alias `{}` is used more than once",
                    frame_table.alias()
                ))
                .into());
            }
            frame.tables.push(frame_table);
            links.push(JoinExpr {
                join_type: link.join_type,
                table,
                alias: link.alias.clone(),
                constraint: link.constraint.clone(),
                sample: link.sample.clone(),
                next_join: None,
            });
        }
        Ok(links)
    }

    fn resolve_clauses(
        &mut self,
        select: &SelectQuery,
        links: Vec<JoinExpr>,
    ) -> CompileResult<SelectQuery> {
        let mut resolved_links = Vec::with_capacity(links.len());
        for mut link in links {
            link.constraint = self.resolve_optional(&link.constraint)?;
            resolved_links.push(link);
        }

        let array_join = match &select.array_join {
            Some(aj) => {
                let mut exprs = Vec::with_capacity(aj.exprs.len());
                for e in &aj.exprs {
                    let resolved = self.resolve_value(e)?;
                    if let Expr::Alias(a) = &resolved {
                        self.define_alias(&a.alias, infer_type(&a.expr))?;
                    }
                    exprs.push(resolved);
                }
                Some(ArrayJoin {
                    kind: aj.kind,
                    exprs,
                })
            }
            None => None,
        };

        let mut taken: HashSet<String> = select
            .select
            .iter()
            .filter_map(|item| match item {
                Expr::Alias(a) => Some(a.alias.clone()),
                _ => None,
            })
            .collect();
        let mut items = Vec::with_capacity(select.select.len());
        for item in &select.select {
            let resolved = self.resolve_value(item)?;
            let resolved = match (item, resolved) {
                (Expr::Alias(a), resolved) => {
                    if !a.hidden {
                        if let Expr::Alias(r) = &resolved {
                            self.define_alias(&a.alias, infer_type(&r.expr))?;
                        }
                    }
                    resolved
                }
                (Expr::Field(f), resolved) => self.hide_alias(f, resolved, &mut taken),
                (_, resolved) => resolved,
            };
            items.push(resolved);
        }

        let prewhere = self.resolve_optional(&select.prewhere)?;
        let where_clause = self.resolve_optional(&select.where_clause)?;
        let group_by = self.resolve_list(&select.group_by)?;
        let having = self.resolve_optional(&select.having)?;
        let order_by = self.resolve_order_by(&select.order_by)?;
        let limit = self.resolve_optional(&select.limit)?;
        let offset = self.resolve_optional(&select.offset)?;
        let limit_by = match &select.limit_by {
            Some(lb) => Some(LimitBy {
                n: self.resolve_value(&lb.n)?,
                offset: self.resolve_optional(&lb.offset)?,
                exprs: self.resolve_list(&lb.exprs)?,
            }),
            None => None,
        };

        Ok(SelectQuery {
            select: items,
            distinct: select.distinct,
            select_from: JoinExpr::from_links(resolved_links),
            array_join,
            prewhere,
            where_clause,
            group_by,
            having,
            order_by,
            limit,
            offset,
            limit_by,
        })
    }

    fn define_alias(&mut self, name: &str, ty: DataType) -> CompileResult<()> {
        let frame = self
            .scope
            .innermost_mut()
            .ok_or_else(|| CompileError::contract(Pass::Resolver, "no SELECT frame"))?;
        frame.aliases.push((name.to_string(), ty));
        Ok(())
    }

    /// Wraps a bare select-list field in a hidden alias named after the
    /// chain tail, unless that name is already taken.
    fn hide_alias(&self, field: &Field, resolved: Expr, taken: &mut HashSet<String>) -> Expr {
        let bound_to_name = matches!(
            resolved.as_field().and_then(|f| f.binding.as_ref()),
            Some(Binding::SelectAlias { .. } | Binding::LambdaArgument { .. })
        );
        match field.chain.last() {
            Some(tail) if !bound_to_name && taken.insert(tail.clone()) => Expr::Alias(Alias {
                alias: tail.clone(),
                expr: Box::new(resolved),
                hidden: true,
            }),
            _ => resolved,
        }
    }

    fn resolve_optional(&mut self, expr: &Option<Expr>) -> CompileResult<Option<Expr>> {
        expr.as_ref().map(|e| self.resolve_value(e)).transpose()
    }

    fn resolve_list(&mut self, exprs: &[Expr]) -> CompileResult<Vec<Expr>> {
        exprs.iter().map(|e| self.resolve_value(e)).collect()
    }

    fn resolve_order_by(&mut self, items: &[OrderExpr]) -> CompileResult<Vec<OrderExpr>> {
        items
            .iter()
            .map(|o| {
                Ok(OrderExpr {
                    expr: self.resolve_value(&o.expr)?,
                    order: o.order,
                })
            })
            .collect()
    }

    /// Resolves an expression in a position that needs a value.
    fn resolve_value(&mut self, expr: &Expr) -> CompileResult<Expr> {
        if let Expr::Lambda(_) = expr {
            return Err(CompileError::malformed(
                Pass::Resolver,
                AstError::UnexpectedNode {
                    node: "Lambda",
                    position: "a value position",
                },
            ));
        }
        self.resolve_expr(expr)
    }

    fn resolve_expr(&mut self, expr: &Expr) -> CompileResult<Expr> {
        Ok(match expr {
            Expr::Constant(_) => expr.clone(),
            Expr::Field(f) => self.resolve_field(f)?,
            Expr::Compare(cmp) => {
                let left = self.resolve_value(&cmp.left)?;
                let right = self.resolve_value(&cmp.right)?;
                if matches!(cmp.op, CompareOperator::InCohort | CompareOperator::NotInCohort)
                    && right.as_constant().is_none()
                {
                    return Err(QueryError::InvalidQuery(
                        "IN COHORT expects a constant cohort id".into(),
                    )
                    .into());
                }
                Expr::Compare(CompareOperation {
                    op: cmp.op,
                    left: Box::new(left),
                    right: Box::new(right),
                })
            }
            Expr::And(items) | Expr::Or(items) => {
                if items.is_empty() {
                    return Err(CompileError::malformed(
                        Pass::Resolver,
                        AstError::EmptyBooleanOperator {
                            operator: expr.kind_name(),
                        },
                    ));
                }
                let items = self.resolve_list(items)?;
                match expr {
                    Expr::And(_) => Expr::And(items),
                    _ => Expr::Or(items),
                }
            }
            Expr::Not(inner) => Expr::Not(Box::new(self.resolve_value(inner)?)),
            Expr::Call(call) => self.resolve_call(call)?,
            Expr::Array(items) => Expr::Array(self.resolve_list(items)?),
            Expr::Tuple(items) => Expr::Tuple(self.resolve_list(items)?),
            Expr::Alias(a) => Expr::Alias(Alias {
                alias: a.alias.clone(),
                expr: Box::new(self.resolve_value(&a.expr)?),
                hidden: a.hidden,
            }),
            Expr::Lambda(l) => {
                self.scope.push_lambda(l.args.clone());
                let body = self.resolve_value(&l.body);
                self.scope.pop_lambda();
                Expr::Lambda(Lambda {
                    args: l.args.clone(),
                    body: Box::new(body?),
                })
            }
            Expr::WindowFunction(w) => self.resolve_window(w)?,
            Expr::Select(sub) => Expr::Select(Box::new(self.resolve_select(sub)?)),
        })
    }

    fn check_function(&self, name: &str, found: usize) -> CompileResult<&'static function_registry::FunctionSpec> {
        let spec = function_registry::lookup(name).ok_or_else(|| QueryError::UnknownFunction {
            name: name.to_string(),
            suggestion: nearest(name, function_registry::function_names()),
        })?;
        if !spec.accepts(found) {
            return Err(QueryError::ArityMismatch {
                function: name.to_string(),
                expected: spec.arity(),
                found,
            }
            .into());
        }
        Ok(spec)
    }

    fn resolve_call(&mut self, call: &Call) -> CompileResult<Expr> {
        let spec = self.check_function(&call.name, call.args.len())?;
        if function_registry::is_window_function(&call.name) {
            return Err(QueryError::InvalidQuery(format!(
                "window function `{}` requires an OVER clause",
                call.name
            ))
            .into());
        }
        // Lambdas are only valid as direct call arguments.
        let args = call
            .args
            .iter()
            .map(|a| self.resolve_expr(a))
            .collect::<CompileResult<Vec<_>>>()?;
        let arg_types: Vec<DataType> = args.iter().map(infer_type).collect();
        Ok(Expr::Call(Call {
            name: call.name.clone(),
            args,
            distinct: call.distinct,
            ty: Some(spec.return_type(&arg_types)),
            span: call.span,
        }))
    }

    fn resolve_window(&mut self, w: &WindowFunction) -> CompileResult<Expr> {
        let spec = self.check_function(&w.name, w.args.len())?;
        let args = self.resolve_list(&w.args)?;
        let arg_types: Vec<DataType> = args.iter().map(infer_type).collect();
        Ok(Expr::WindowFunction(WindowFunction {
            name: w.name.clone(),
            args,
            over: WindowSpec {
                partition_by: self.resolve_list(&w.over.partition_by)?,
                order_by: self.resolve_order_by(&w.over.order_by)?,
                frame: w.over.frame.clone(),
            },
            ty: Some(spec.return_type(&arg_types)),
        }))
    }

    fn resolve_field(&self, field: &Field) -> CompileResult<Expr> {
        let chain = &field.chain;
        let Some(head) = chain.first() else {
            return Err(CompileError::malformed(Pass::Resolver, AstError::EmptyFieldChain));
        };
        let bind = |resolved: Resolved| match resolved {
            Resolved::Binding(b) => Expr::Field(Field {
                chain: chain.clone(),
                binding: Some(b),
                span: field.span,
            }),
            Resolved::Expr(e) => e,
        };

        if chain.len() == 1 && self.scope.is_lambda_argument(head) {
            return Ok(bind(Resolved::Binding(Binding::LambdaArgument {
                name: head.clone(),
            })));
        }

        let frame = self
            .scope
            .innermost()
            .ok_or_else(|| CompileError::contract(Pass::Resolver, "field outside of any SELECT"))?;

        if chain.len() > 1 {
            if let Some(table) = frame.table(head) {
                return self.resolve_in_frame_table(table, &chain[1..], field).map(bind);
            }
        }

        if chain.len() == 1 {
            if let Some(ty) = frame.alias_type(head) {
                return Ok(bind(Resolved::Binding(Binding::SelectAlias {
                    name: head.clone(),
                    ty: ty.clone(),
                })));
            }
        }

        let candidates = frame.tables_with_field(head);
        match candidates.as_slice() {
            [table] => return self.resolve_in_frame_table(table, chain, field).map(bind),
            [] => {}
            many => {
                return Err(QueryError::AmbiguousReference {
                    name: head.clone(),
                    candidates: many
                        .iter()
                        .map(|t| format!("{}.{}", t.alias(), head))
                        .collect(),
                }
                .into())
            }
        }

        if chain.len() > 1 {
            if let Some((table, levels)) = self.scope.find_outer_table(head) {
                log::trace!("Resolver: `{}` is correlated {} level(s) up", field.chain_string(), levels);
                return match self.resolve_in_frame_table(table, &chain[1..], field)? {
                    Resolved::Binding(b)
                        if !matches!(b.source(), Some(TableSource::Lazy { .. })) =>
                    {
                        Ok(bind(Resolved::Binding(Binding::Outer {
                            levels,
                            inner: Box::new(b),
                        })))
                    }
                    _ => Err(QueryError::InvalidQuery(format!(
                        "correlated access to `{}` through a virtual table is not supported",
                        field.chain_string()
                    ))
                    .into()),
                };
            }
        }

        let mut names = frame.visible_names();
        names.extend(self.scope.lambda_arguments());
        Err(unresolved(field, nearest(head, names)))
    }

    fn resolve_in_frame_table(
        &self,
        table: &FrameTable<'a>,
        rest: &[String],
        field: &Field,
    ) -> CompileResult<Resolved> {
        match table {
            FrameTable::Catalog { table: def, .. } => {
                self.resolve_in_table(def, table.source(), rest, field)
            }
            FrameTable::Subquery { columns, .. } => {
                let Some((name, ty)) = columns.iter().find(|(c, _)| *c == rest[0]) else {
                    let names = columns.iter().map(|(c, _)| c.as_str());
                    return Err(unresolved(field, nearest(&rest[0], names)));
                };
                match (&rest[1..], ty.kind) {
                    ([], _) => Ok(Resolved::Binding(Binding::Column {
                        source: table.source(),
                        column: name.clone(),
                        ty: ty.clone(),
                    })),
                    (keys, TypeKind::String | TypeKind::Unknown) => {
                        Ok(Resolved::Binding(Binding::Property {
                            source: table.source(),
                            column: name.clone(),
                            keys: keys.to_vec(),
                            ty: DataType::string().nullable(),
                        }))
                    }
                    _ => Err(unresolved(field, None)),
                }
            }
        }
    }

    fn resolve_in_table(
        &self,
        table: &TableDef,
        source: TableSource,
        rest: &[String],
        field: &Field,
    ) -> CompileResult<Resolved> {
        let Some((name, tail)) = rest.split_first() else {
            return Err(unresolved(field, None));
        };
        let def = table
            .field(name)
            .ok_or_else(|| unresolved(field, nearest(name, table.field_names())))?;

        match def {
            FieldDef::Column { column, ty } => {
                if !tail.is_empty() {
                    return Err(unresolved(field, None));
                }
                Ok(Resolved::Binding(Binding::Column {
                    source,
                    column: column.clone(),
                    ty: ty.clone(),
                }))
            }
            FieldDef::Properties { column } => {
                Ok(Resolved::Binding(self.properties_binding(
                    source,
                    properties_table(table),
                    column,
                    tail,
                )))
            }
            FieldDef::LazyJoin(join) => {
                if tail.is_empty() {
                    return Err(QueryError::InvalidQuery(format!(
                        "`{}` is a table, select one of its fields",
                        field.chain_string()
                    ))
                    .into());
                }
                let target = self.lazy_table(join.table.name())?;
                self.resolve_in_table(target, extend(&source, name), tail, field)
            }
            FieldDef::PersonTraverser => self.resolve_person(source, name, tail, field),
            FieldDef::PersonId => {
                if !tail.is_empty() {
                    return Err(unresolved(field, None));
                }
                self.resolve_person_id(source)
            }
        }
    }

    fn lazy_table(&self, name: &str) -> CompileResult<&'a TableDef> {
        self.database.table(name).ok_or_else(|| {
            CompileError::contract(
                Pass::Resolver,
                format!("lazy table `{}` missing from the database", name),
            )
        })
    }

    fn properties_binding(
        &self,
        source: TableSource,
        table: Option<&str>,
        column: &str,
        keys: &[String],
    ) -> Binding {
        if keys.is_empty() {
            return Binding::Column {
                source,
                column: column.to_string(),
                ty: DataType::string(),
            };
        }
        Binding::Property {
            source,
            column: column.to_string(),
            keys: keys.to_vec(),
            ty: property_type(
                self.catalog,
                self.modifiers.property_groups_mode,
                table,
                column,
                keys,
            ),
        }
    }

    /// `events.person.<rest>` according to the persons-on-events mode.
    fn resolve_person(
        &self,
        source: TableSource,
        name: &str,
        rest: &[String],
        field: &Field,
    ) -> CompileResult<Resolved> {
        if rest.is_empty() {
            return Err(QueryError::InvalidQuery(format!(
                "`{}` is a table, select one of its fields",
                field.chain_string()
            ))
            .into());
        }
        let persons = self.lazy_table(crate::catalog::LazyTable::Persons.name())?;
        match self.modifiers.persons_on_events_mode {
            PersonsOnEventsMode::Disabled => {
                let via_pdi = extend(&extend(&source, "pdi"), name);
                self.resolve_in_table(persons, via_pdi, rest, field)
            }
            PersonsOnEventsMode::PersonIdOverridePropertiesJoined => {
                self.resolve_in_table(persons, extend(&source, name), rest, field)
            }
            PersonsOnEventsMode::PersonIdNoOverridePropertiesOnEvents => {
                let events = crate::catalog::database::physical::EVENTS;
                match (rest[0].as_str(), &rest[1..]) {
                    ("id", []) => Ok(Resolved::Binding(Binding::Column {
                        source,
                        column: "person_id".into(),
                        ty: DataType::uuid(),
                    })),
                    ("created_at", []) => Ok(Resolved::Binding(Binding::Column {
                        source,
                        column: "person_created_at".into(),
                        ty: DataType::datetime(),
                    })),
                    ("properties", keys) => Ok(Resolved::Binding(self.properties_binding(
                        source,
                        Some(events),
                        "person_properties",
                        keys,
                    ))),
                    (other, _) => Err(unresolved(
                        field,
                        nearest(other, ["id", "created_at", "properties"]),
                    )),
                }
            }
        }
    }

    /// `events.person_id` according to the persons-on-events mode.
    fn resolve_person_id(&self, source: TableSource) -> CompileResult<Resolved> {
        Ok(match self.modifiers.persons_on_events_mode {
            PersonsOnEventsMode::Disabled => Resolved::Binding(Binding::Column {
                source: extend(&source, "pdi"),
                column: "person_id".into(),
                ty: DataType::uuid(),
            }),
            PersonsOnEventsMode::PersonIdNoOverridePropertiesOnEvents => {
                Resolved::Binding(Binding::Column {
                    source,
                    column: "person_id".into(),
                    ty: DataType::uuid(),
                })
            }
            PersonsOnEventsMode::PersonIdOverridePropertiesJoined => {
                Resolved::Expr(person_id_with_override(&source))
            }
        })
    }
}

fn column_field(source: TableSource, chain: &[&str], column: &str, ty: DataType) -> Expr {
    bound_field(
        chain.iter().map(|s| s.to_string()).collect(),
        Binding::Column {
            source,
            column: column.to_string(),
            ty,
        },
    )
}

/// `if(not(empty(override.distinct_id)), override.person_id, <source>.person_id)`
pub(crate) fn person_id_with_override(source: &TableSource) -> Expr {
    let overrides = extend(source, "override");
    let has_override = Expr::Not(Box::new(typed_call(
        "empty",
        vec![column_field(
            overrides.clone(),
            &["override", "distinct_id"],
            "distinct_id",
            DataType::string(),
        )],
        DataType::boolean(),
    )));
    typed_call(
        "if",
        vec![
            has_override,
            column_field(overrides, &["override", "person_id"], "person_id", DataType::uuid()),
            column_field(source.clone(), &["person_id"], "person_id", DataType::uuid()),
        ],
        DataType::uuid(),
    )
}

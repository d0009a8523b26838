//! Traversal primitives.
//!
//! Three tools, matched exhaustively over the closed node union:
//!
//! - [`clone_expr`] / [`clone_select`]: deep copy, optionally stripping
//!   resolution metadata (bindings, resolved types, spans) so two trees can be
//!   compared structurally.
//! - [`ExpressionVisitor`] + [`walk_expression`]: read-only traversal for
//!   collectors.
//! - [`ExprTransformer`]: the rebuilding visitor every pass is written
//!   against. `visit` returns `Ok(None)` to remove a subtree.
//!
//! # Removal semantics
//!
//! When a child is removed, list positions (AND/OR operands, array and tuple
//! items, select items, GROUP BY / ORDER BY entries) simply drop it. Mandatory
//! positions (comparison operands, call arguments, NOT operand, alias target,
//! lambda body) propagate the removal to the parent. An AND/OR left with no
//! operands is itself removed.

use super::{
    Alias, ArrayJoin, Call, CompareOperation, Expr, Field, JoinExpr, Lambda, LimitBy, OrderExpr,
    SelectQuery, TableExpr, WindowFunction, WindowSpec,
};
use crate::errors::CompileResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CloneOptions {
    /// Drop field bindings and resolved call/window types.
    pub strip_types: bool,
    /// Drop source spans.
    pub strip_spans: bool,
}

impl CloneOptions {
    pub const KEEP_ALL: CloneOptions = CloneOptions {
        strip_types: false,
        strip_spans: false,
    };

    pub const STRIPPED: CloneOptions = CloneOptions {
        strip_types: true,
        strip_spans: true,
    };
}

pub fn clone_expr(expr: &Expr, options: CloneOptions) -> Expr {
    let many = |items: &[Expr]| items.iter().map(|e| clone_expr(e, options)).collect();
    match expr {
        Expr::Constant(c) => Expr::Constant(c.clone()),
        Expr::Field(f) => Expr::Field(Field {
            chain: f.chain.clone(),
            binding: if options.strip_types {
                None
            } else {
                f.binding.clone()
            },
            span: if options.strip_spans { None } else { f.span },
        }),
        Expr::Compare(cmp) => Expr::Compare(CompareOperation {
            op: cmp.op,
            left: Box::new(clone_expr(&cmp.left, options)),
            right: Box::new(clone_expr(&cmp.right, options)),
        }),
        Expr::And(items) => Expr::And(many(items)),
        Expr::Or(items) => Expr::Or(many(items)),
        Expr::Not(inner) => Expr::Not(Box::new(clone_expr(inner, options))),
        Expr::Call(c) => Expr::Call(Call {
            name: c.name.clone(),
            args: many(&c.args),
            distinct: c.distinct,
            ty: if options.strip_types { None } else { c.ty.clone() },
            span: if options.strip_spans { None } else { c.span },
        }),
        Expr::Array(items) => Expr::Array(many(items)),
        Expr::Tuple(items) => Expr::Tuple(many(items)),
        Expr::Alias(a) => Expr::Alias(Alias {
            alias: a.alias.clone(),
            expr: Box::new(clone_expr(&a.expr, options)),
            hidden: a.hidden,
        }),
        Expr::Lambda(l) => Expr::Lambda(Lambda {
            args: l.args.clone(),
            body: Box::new(clone_expr(&l.body, options)),
        }),
        Expr::WindowFunction(w) => Expr::WindowFunction(WindowFunction {
            name: w.name.clone(),
            args: many(&w.args),
            over: WindowSpec {
                partition_by: many(&w.over.partition_by),
                order_by: clone_order_by(&w.over.order_by, options),
                frame: w.over.frame.clone(),
            },
            ty: if options.strip_types { None } else { w.ty.clone() },
        }),
        Expr::Select(s) => Expr::Select(Box::new(clone_select(s, options))),
    }
}

fn clone_order_by(items: &[OrderExpr], options: CloneOptions) -> Vec<OrderExpr> {
    items
        .iter()
        .map(|o| OrderExpr {
            expr: clone_expr(&o.expr, options),
            order: o.order,
        })
        .collect()
}

fn clone_join(join: &JoinExpr, options: CloneOptions) -> JoinExpr {
    JoinExpr {
        join_type: join.join_type,
        table: match &join.table {
            TableExpr::Table { name } => TableExpr::Table { name: name.clone() },
            TableExpr::Subquery(s) => TableExpr::Subquery(Box::new(clone_select(s, options))),
        },
        alias: join.alias.clone(),
        constraint: join.constraint.as_ref().map(|c| clone_expr(c, options)),
        sample: join.sample.clone(),
        next_join: join
            .next_join
            .as_ref()
            .map(|n| Box::new(clone_join(n, options))),
    }
}

pub fn clone_select(select: &SelectQuery, options: CloneOptions) -> SelectQuery {
    let one = |e: &Option<Expr>| e.as_ref().map(|e| clone_expr(e, options));
    let many = |items: &[Expr]| items.iter().map(|e| clone_expr(e, options)).collect();
    SelectQuery {
        select: many(&select.select),
        distinct: select.distinct,
        select_from: select.select_from.as_ref().map(|j| clone_join(j, options)),
        array_join: select.array_join.as_ref().map(|aj| ArrayJoin {
            kind: aj.kind,
            exprs: many(&aj.exprs),
        }),
        prewhere: one(&select.prewhere),
        where_clause: one(&select.where_clause),
        group_by: many(&select.group_by),
        having: one(&select.having),
        order_by: clone_order_by(&select.order_by, options),
        limit: one(&select.limit),
        offset: one(&select.offset),
        limit_by: select.limit_by.as_ref().map(|lb| LimitBy {
            n: clone_expr(&lb.n, options),
            offset: lb.offset.as_ref().map(|o| clone_expr(o, options)),
            exprs: many(&lb.exprs),
        }),
    }
}

// =============================================================================
// Read-only traversal
// =============================================================================

/// Read-only visitor. Override the hooks of interest; defaults do nothing.
pub trait ExpressionVisitor {
    /// Called for every node before its children.
    fn visit_expr(&mut self, _expr: &Expr) {}

    fn visit_field(&mut self, _field: &Field) {}

    fn visit_call(&mut self, _call: &Call) {}

    /// Return `false` to skip descending into the subquery.
    fn enter_select(&mut self, _select: &SelectQuery) -> bool {
        true
    }

    fn leave_select(&mut self, _select: &SelectQuery) {}
}

pub fn walk_expression<V: ExpressionVisitor + ?Sized>(expr: &Expr, visitor: &mut V) {
    visitor.visit_expr(expr);
    match expr {
        Expr::Constant(_) => {}
        Expr::Field(f) => visitor.visit_field(f),
        Expr::Compare(cmp) => {
            walk_expression(&cmp.left, visitor);
            walk_expression(&cmp.right, visitor);
        }
        Expr::And(items) | Expr::Or(items) | Expr::Array(items) | Expr::Tuple(items) => {
            for item in items {
                walk_expression(item, visitor);
            }
        }
        Expr::Not(inner) => walk_expression(inner, visitor),
        Expr::Call(c) => {
            visitor.visit_call(c);
            for arg in &c.args {
                walk_expression(arg, visitor);
            }
        }
        Expr::Alias(a) => walk_expression(&a.expr, visitor),
        Expr::Lambda(l) => walk_expression(&l.body, visitor),
        Expr::WindowFunction(w) => {
            for e in w.args.iter().chain(&w.over.partition_by) {
                walk_expression(e, visitor);
            }
            for o in &w.over.order_by {
                walk_expression(&o.expr, visitor);
            }
        }
        Expr::Select(s) => walk_select(s, visitor),
    }
}

pub fn walk_select<V: ExpressionVisitor + ?Sized>(select: &SelectQuery, visitor: &mut V) {
    if !visitor.enter_select(select) {
        return;
    }
    for join in select.joins() {
        if let TableExpr::Subquery(sub) = &join.table {
            walk_select(sub, visitor);
        }
        if let Some(c) = &join.constraint {
            walk_expression(c, visitor);
        }
    }
    let singles = [
        &select.prewhere,
        &select.where_clause,
        &select.having,
        &select.limit,
        &select.offset,
    ];
    for e in select.select.iter().chain(&select.group_by) {
        walk_expression(e, visitor);
    }
    if let Some(aj) = &select.array_join {
        for e in &aj.exprs {
            walk_expression(e, visitor);
        }
    }
    for e in singles.into_iter().flatten() {
        walk_expression(e, visitor);
    }
    for o in &select.order_by {
        walk_expression(&o.expr, visitor);
    }
    if let Some(lb) = &select.limit_by {
        walk_expression(&lb.n, visitor);
        if let Some(o) = &lb.offset {
            walk_expression(o, visitor);
        }
        for e in &lb.exprs {
            walk_expression(e, visitor);
        }
    }
    visitor.leave_select(select);
}

/// Counts nodes, the deepest SELECT nesting and the deepest expression
/// nesting. Walks with an explicit stack so that input too deep for the
/// recursive passes can still be measured and rejected.
#[derive(Debug, Default)]
pub struct SizeCounter {
    pub nodes: usize,
    pub max_select_depth: usize,
    /// Expression levels from the outermost clause, through subqueries.
    pub max_expr_depth: usize,
}

enum Pending<'a> {
    Select(&'a SelectQuery),
    Expr(&'a Expr),
}

impl SizeCounter {
    pub fn measure(select: &SelectQuery) -> Self {
        let mut counter = Self::default();
        // (node, enclosing SELECTs, enclosing expressions)
        let mut stack = vec![(Pending::Select(select), 0, 0)];
        while let Some((node, selects, depth)) = stack.pop() {
            counter.nodes += 1;
            match node {
                Pending::Select(s) => {
                    let selects = selects + 1;
                    counter.max_select_depth = counter.max_select_depth.max(selects);
                    for join in s.joins() {
                        if let TableExpr::Subquery(sub) = &join.table {
                            stack.push((Pending::Select(sub), selects, depth));
                        }
                        if let Some(c) = &join.constraint {
                            stack.push((Pending::Expr(c), selects, depth));
                        }
                    }
                    for e in clause_roots(s) {
                        stack.push((Pending::Expr(e), selects, depth));
                    }
                }
                Pending::Expr(e) => {
                    let depth = depth + 1;
                    counter.max_expr_depth = counter.max_expr_depth.max(depth);
                    match e {
                        Expr::Select(sub) => stack.push((Pending::Select(sub), selects, depth)),
                        other => {
                            for child in children(other) {
                                stack.push((Pending::Expr(child), selects, depth));
                            }
                        }
                    }
                }
            }
        }
        counter
    }
}

/// Top-level expressions of every clause except FROM.
fn clause_roots(select: &SelectQuery) -> Vec<&Expr> {
    let mut roots: Vec<&Expr> = select.select.iter().chain(&select.group_by).collect();
    if let Some(aj) = &select.array_join {
        roots.extend(&aj.exprs);
    }
    roots.extend(
        [
            &select.prewhere,
            &select.where_clause,
            &select.having,
            &select.limit,
            &select.offset,
        ]
        .into_iter()
        .flatten(),
    );
    roots.extend(select.order_by.iter().map(|o| &o.expr));
    if let Some(lb) = &select.limit_by {
        roots.push(&lb.n);
        roots.extend(&lb.offset);
        roots.extend(&lb.exprs);
    }
    roots
}

/// Direct children of a non-subquery expression.
fn children(expr: &Expr) -> Vec<&Expr> {
    match expr {
        Expr::Constant(_) | Expr::Field(_) | Expr::Select(_) => Vec::new(),
        Expr::Compare(c) => vec![&*c.left, &*c.right],
        Expr::And(items) | Expr::Or(items) | Expr::Array(items) | Expr::Tuple(items) => {
            items.iter().collect()
        }
        Expr::Not(inner) => vec![&**inner],
        Expr::Call(c) => c.args.iter().collect(),
        Expr::Alias(a) => vec![&*a.expr],
        Expr::Lambda(l) => vec![&*l.body],
        Expr::WindowFunction(w) => w
            .args
            .iter()
            .chain(&w.over.partition_by)
            .chain(w.over.order_by.iter().map(|o| &o.expr))
            .collect(),
    }
}

/// Collects every field in an expression, including the select list and
/// filters of nested subqueries.
pub fn collect_fields(expr: &Expr) -> Vec<&Field> {
    fn go<'a>(expr: &'a Expr, out: &mut Vec<&'a Field>) {
        match expr {
            Expr::Field(f) => out.push(f),
            Expr::Constant(_) => {}
            Expr::Compare(c) => {
                go(&c.left, out);
                go(&c.right, out);
            }
            Expr::And(items) | Expr::Or(items) | Expr::Array(items) | Expr::Tuple(items) => {
                items.iter().for_each(|e| go(e, out))
            }
            Expr::Not(inner) => go(inner, out),
            Expr::Call(c) => c.args.iter().for_each(|e| go(e, out)),
            Expr::Alias(a) => go(&a.expr, out),
            Expr::Lambda(l) => go(&l.body, out),
            Expr::WindowFunction(w) => {
                w.args.iter().chain(&w.over.partition_by).for_each(|e| go(e, out));
                w.over.order_by.iter().for_each(|o| go(&o.expr, out));
            }
            Expr::Select(s) => {
                for item in &s.select {
                    go(item, out);
                }
                for e in [&s.where_clause, &s.having, &s.prewhere].into_iter().flatten() {
                    go(e, out);
                }
            }
        }
    }
    let mut out = Vec::new();
    go(expr, &mut out);
    out
}

/// True if the expression contains a subquery anywhere.
pub fn contains_select(expr: &Expr) -> bool {
    struct Finder(bool);
    impl ExpressionVisitor for Finder {
        fn enter_select(&mut self, _select: &SelectQuery) -> bool {
            self.0 = true;
            false
        }
    }
    let mut finder = Finder(false);
    walk_expression(expr, &mut finder);
    finder.0
}

// =============================================================================
// Rebuilding traversal
// =============================================================================

/// Rebuilding visitor. Implementors override `visit` for the node kinds they
/// care about and delegate everything else to [`walk_transform`].
pub trait ExprTransformer {
    fn visit(&mut self, expr: Expr) -> CompileResult<Option<Expr>> {
        walk_transform(self, expr)
    }

    fn visit_select(&mut self, select: SelectQuery) -> CompileResult<SelectQuery> {
        walk_select_transform(self, select)
    }
}

fn visit_list<T: ExprTransformer + ?Sized>(
    t: &mut T,
    items: Vec<Expr>,
) -> CompileResult<Vec<Expr>> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        if let Some(e) = t.visit(item)? {
            out.push(e);
        }
    }
    Ok(out)
}

/// All-or-nothing: any removed item removes the whole list.
fn visit_required<T: ExprTransformer + ?Sized>(
    t: &mut T,
    items: Vec<Expr>,
) -> CompileResult<Option<Vec<Expr>>> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        match t.visit(item)? {
            Some(e) => out.push(e),
            None => return Ok(None),
        }
    }
    Ok(Some(out))
}

fn visit_order_by<T: ExprTransformer + ?Sized>(
    t: &mut T,
    items: Vec<OrderExpr>,
) -> CompileResult<Vec<OrderExpr>> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        if let Some(expr) = t.visit(item.expr)? {
            out.push(OrderExpr {
                expr,
                order: item.order,
            });
        }
    }
    Ok(out)
}

/// Default traversal: rebuilds `expr` from transformed children.
pub fn walk_transform<T: ExprTransformer + ?Sized>(
    t: &mut T,
    expr: Expr,
) -> CompileResult<Option<Expr>> {
    Ok(match expr {
        Expr::Constant(_) | Expr::Field(_) => Some(expr),
        Expr::Compare(cmp) => {
            let left = t.visit(*cmp.left)?;
            let right = t.visit(*cmp.right)?;
            match (left, right) {
                (Some(l), Some(r)) => Some(Expr::Compare(CompareOperation {
                    op: cmp.op,
                    left: Box::new(l),
                    right: Box::new(r),
                })),
                _ => None,
            }
        }
        Expr::And(items) => {
            let items = visit_list(t, items)?;
            (!items.is_empty()).then_some(Expr::And(items))
        }
        Expr::Or(items) => {
            let items = visit_list(t, items)?;
            (!items.is_empty()).then_some(Expr::Or(items))
        }
        Expr::Not(inner) => t.visit(*inner)?.map(|e| Expr::Not(Box::new(e))),
        Expr::Call(c) => visit_required(t, c.args)?.map(|args| {
            Expr::Call(Call {
                name: c.name,
                args,
                distinct: c.distinct,
                ty: c.ty,
                span: c.span,
            })
        }),
        Expr::Array(items) => Some(Expr::Array(visit_list(t, items)?)),
        Expr::Tuple(items) => Some(Expr::Tuple(visit_list(t, items)?)),
        Expr::Alias(a) => t.visit(*a.expr)?.map(|e| {
            Expr::Alias(Alias {
                alias: a.alias,
                expr: Box::new(e),
                hidden: a.hidden,
            })
        }),
        Expr::Lambda(l) => t.visit(*l.body)?.map(|body| {
            Expr::Lambda(Lambda {
                args: l.args,
                body: Box::new(body),
            })
        }),
        Expr::WindowFunction(w) => match visit_required(t, w.args)? {
            Some(args) => Some(Expr::WindowFunction(WindowFunction {
                name: w.name,
                args,
                over: WindowSpec {
                    partition_by: visit_list(t, w.over.partition_by)?,
                    order_by: visit_order_by(t, w.over.order_by)?,
                    frame: w.over.frame,
                },
                ty: w.ty,
            })),
            None => None,
        },
        Expr::Select(s) => Some(Expr::Select(Box::new(t.visit_select(*s)?))),
    })
}

fn transform_join<T: ExprTransformer + ?Sized>(
    t: &mut T,
    join: JoinExpr,
) -> CompileResult<JoinExpr> {
    let table = match join.table {
        TableExpr::Subquery(s) => TableExpr::Subquery(Box::new(t.visit_select(*s)?)),
        table => table,
    };
    let constraint = match join.constraint {
        Some(c) => t.visit(c)?,
        None => None,
    };
    let next_join = match join.next_join {
        Some(next) => Some(Box::new(transform_join(t, *next)?)),
        None => None,
    };
    Ok(JoinExpr {
        join_type: join.join_type,
        table,
        alias: join.alias,
        constraint,
        sample: join.sample,
        next_join,
    })
}

fn transform_optional<T: ExprTransformer + ?Sized>(
    t: &mut T,
    expr: Option<Expr>,
) -> CompileResult<Option<Expr>> {
    match expr {
        Some(e) => t.visit(e),
        None => Ok(None),
    }
}

/// Default SELECT traversal, in clause order.
pub fn walk_select_transform<T: ExprTransformer + ?Sized>(
    t: &mut T,
    select: SelectQuery,
) -> CompileResult<SelectQuery> {
    let select_from = match select.select_from {
        Some(j) => Some(transform_join(t, j)?),
        None => None,
    };
    let array_join = match select.array_join {
        Some(aj) => Some(ArrayJoin {
            kind: aj.kind,
            exprs: visit_list(t, aj.exprs)?,
        }),
        None => None,
    };
    let items = visit_list(t, select.select)?;
    let prewhere = transform_optional(t, select.prewhere)?;
    let where_clause = transform_optional(t, select.where_clause)?;
    let group_by = visit_list(t, select.group_by)?;
    let having = transform_optional(t, select.having)?;
    let order_by = visit_order_by(t, select.order_by)?;
    let limit_by = match select.limit_by {
        Some(lb) => match t.visit(lb.n)? {
            Some(n) => Some(LimitBy {
                n,
                offset: transform_optional(t, lb.offset)?,
                exprs: visit_list(t, lb.exprs)?,
            }),
            None => None,
        },
        None => None,
    };
    let limit = transform_optional(t, select.limit)?;
    let offset = transform_optional(t, select.offset)?;
    Ok(SelectQuery {
        select: items,
        distinct: select.distinct,
        select_from,
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query_ast::builders::*;
    use crate::query_ast::{Binding, DataType, TableSource};

    fn resolved_email() -> Expr {
        bound_field(
            vec!["properties".into(), "email".into()],
            Binding::Property {
                source: TableSource::table("events", "events"),
                column: "properties".into(),
                keys: vec!["email".into()],
                ty: DataType::string().nullable(),
            },
        )
    }

    #[test]
    fn test_clone_strips_bindings() {
        let expr = eq(resolved_email(), constant("a"));
        let stripped = clone_expr(&expr, CloneOptions::STRIPPED);
        assert_eq!(stripped, eq(field(&["properties", "email"]), constant("a")));
        assert_eq!(clone_expr(&expr, CloneOptions::KEEP_ALL), expr);
    }

    /// Removes every string constant.
    struct DropStrings;

    impl ExprTransformer for DropStrings {
        fn visit(&mut self, expr: Expr) -> CompileResult<Option<Expr>> {
            match expr {
                Expr::Constant(ref c) if c.value.as_str().is_some() => Ok(None),
                other => walk_transform(self, other),
            }
        }
    }

    #[test]
    fn test_removal_drops_list_items_and_propagates_from_mandatory_slots() {
        let expr = and(vec![
            eq(field(&["a"]), constant("x")),
            eq(field(&["b"]), int(1)),
            tuple(vec![constant("y"), int(2)]),
        ]);
        let out = DropStrings.visit(expr).unwrap();
        assert_eq!(
            out,
            Some(and(vec![eq(field(&["b"]), int(1)), tuple(vec![int(2)])]))
        );
    }

    #[test]
    fn test_and_left_empty_is_removed() {
        let expr = and(vec![eq(field(&["a"]), constant("x"))]);
        assert_eq!(DropStrings.visit(expr).unwrap(), None);
    }

    #[test]
    fn test_size_counter_tracks_depth() {
        let inner = select_from("events", vec![field(&["event"])]);
        let mut outer = select_from("events", vec![Expr::Select(Box::new(inner))]);
        outer.where_clause = Some(eq(field(&["event"]), constant("x")));
        let size = SizeCounter::measure(&outer);
        assert_eq!(size.max_select_depth, 2);
        assert!(size.nodes >= 6);
    }

    #[test]
    fn test_size_counter_tracks_expression_depth() {
        let mut select = select_from("events", vec![field(&["event"])]);
        select.where_clause = Some(not(not(eq(field(&["event"]), constant("x")))));
        // not > not > equals > field
        assert_eq!(SizeCounter::measure(&select).max_expr_depth, 4);

        let mut deep = eq(field(&["event"]), constant("x"));
        for _ in 0..3000 {
            deep = not(deep);
        }
        select.where_clause = Some(deep);
        let size = SizeCounter::measure(&select);
        assert_eq!(size.max_expr_depth, 3002);
        assert_eq!(size.max_select_depth, 1);
    }

    #[test]
    fn test_contains_select() {
        let sub = Expr::Select(Box::new(select_from("events", vec![int(1)])));
        assert!(contains_select(&compare(
            crate::query_ast::CompareOperator::In,
            field(&["a"]),
            sub
        )));
        assert!(!contains_select(&eq(field(&["a"]), int(1))));
    }
}

//! WHERE pushdown into join targets.
//!
//! Given the WHERE clause of a SELECT and one of its lazy-join targets, builds
//! a predicate that can run inside the target's subquery. The pushed predicate
//! must be implied by the original: every row the outer query keeps must
//! still be produced by the subquery. It may be weaker than the original; the
//! outer WHERE still runs in full.
//!
//! Each subexpression is classified as
//! - `Exact`: fully expressible on the target, equivalent to the original
//! - `Weakened`: expressible, but only implied by the original
//! - `Unknown`: nothing can be said about it on the target
//!
//! and combined:
//!
//! | node       | rule                                                      |
//! |------------|-----------------------------------------------------------|
//! | `AND`      | drop `Unknown` conjuncts (the result becomes `Weakened`)  |
//! | `OR`       | any `Unknown` disjunct makes the whole OR `Unknown`       |
//! | `NOT`      | only over `Exact`; negating a weakened form is unsound    |
//!
//! Timestamps aggregated inside a target (a session's start, say) cannot be
//! filtered directly. A bound on one is turned into a bound on the target's
//! partition key, widened by a lookback window.

use chrono::Duration;

use crate::errors::{CompileError, CompileResult, Pass};
use crate::query_ast::builders::{compare, constant, int, typed_call};
use crate::query_ast::combinators;
use crate::query_ast::errors::AstError;
use crate::query_ast::visitors::{collect_fields, contains_select, walk_transform, ExprTransformer};
use crate::query_ast::{
    infer_type, Binding, CompareOperation, CompareOperator, ConstantValue, DataType, Expr, Field,
    TypeKind,
};

/// How a field of the outer query maps into a join target.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldRewrite {
    /// Available inside the target as this expression.
    Local(Expr),
    /// An aggregate of a timestamp; only bounds on `partition_key`, widened
    /// by `lookback_days`, can be pushed.
    WidenedTimestamp {
        partition_key: Expr,
        lookback_days: u32,
    },
    /// Not available inside the target.
    Unreachable,
}

/// A join target predicates can be pushed into.
pub trait PushdownTarget {
    /// Name used in logs.
    fn name(&self) -> &str;

    fn rewrite_field(&self, field: &Field) -> FieldRewrite;

    /// True when unmatched outer rows are kept with NULL-padded target
    /// columns (LEFT OUTER joins).
    fn is_null_padded(&self) -> bool;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Pushed {
    Exact(Expr),
    Weakened(Expr),
    Unknown,
}

impl Pushed {
    pub fn into_expr(self) -> Option<Expr> {
        match self {
            Pushed::Exact(e) | Pushed::Weakened(e) => Some(e),
            Pushed::Unknown => None,
        }
    }
}

/// Builds the predicate to push into `target`, or `None` when nothing useful
/// can be pushed. `aliases` are the SELECT's aliased expressions, used to
/// see through references to them.
pub fn pushdown_where(
    where_clause: &Expr,
    target: &dyn PushdownTarget,
    aliases: &[(String, Expr)],
) -> CompileResult<Option<Expr>> {
    let pushdown = Pushdown { target, aliases };
    let pushed = pushdown.push(where_clause, 0)?;
    log::trace!("WherePushdown: {} <- {:?}", target.name(), pushed);
    Ok(pushed.into_expr().filter(|e| !is_true(e)))
}

fn is_true(expr: &Expr) -> bool {
    expr.constant_bool() == Some(true)
}

fn is_non_null_constant(expr: &Expr) -> bool {
    match expr {
        Expr::Constant(c) => !c.value.is_null(),
        Expr::Tuple(items) | Expr::Array(items) => {
            !items.is_empty() && items.iter().all(is_non_null_constant)
        }
        _ => false,
    }
}

struct Pushdown<'t> {
    target: &'t dyn PushdownTarget,
    aliases: &'t [(String, Expr)],
}

impl<'t> Pushdown<'t> {
    fn alias(&self, name: &str) -> Option<&'t Expr> {
        self.aliases
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, e)| e.unaliased())
    }

    /// Follows select-alias references until a real expression is reached.
    fn follow<'e>(&self, mut expr: &'e Expr) -> &'e Expr
    where
        't: 'e,
    {
        for _ in 0..=self.aliases.len() {
            let Expr::Field(Field {
                binding: Some(Binding::SelectAlias { name, .. }),
                ..
            }) = expr.unaliased()
            else {
                return expr.unaliased();
            };
            match self.alias(name) {
                Some(target) => expr = target,
                None => return expr.unaliased(),
            }
        }
        expr.unaliased()
    }

    fn push(&self, expr: &Expr, depth: usize) -> CompileResult<Pushed> {
        if depth > self.aliases.len() {
            // Aliases referring to each other in a cycle.
            return Ok(Pushed::Unknown);
        }
        match expr {
            Expr::Constant(c) => Ok(match c.value {
                ConstantValue::Bool(_) => Pushed::Exact(expr.clone()),
                _ => Pushed::Unknown,
            }),
            Expr::Alias(a) => self.push(&a.expr, depth),
            Expr::Field(Field {
                binding: Some(Binding::SelectAlias { name, .. }),
                ..
            }) => match self.alias(name) {
                Some(aliased) => self.push(aliased, depth + 1),
                None => Ok(Pushed::Unknown),
            },
            Expr::And(items) => self.push_and(items, depth),
            Expr::Or(items) => self.push_or(items, depth),
            Expr::Not(inner) => Ok(match self.push(inner, depth)? {
                Pushed::Exact(e) if !self.target.is_null_padded() => {
                    Pushed::Exact(Expr::Not(Box::new(e)))
                }
                _ => Pushed::Unknown,
            }),
            Expr::Compare(cmp) => self.push_compare(cmp),
            Expr::Select(_) => Ok(Pushed::Unknown),
            other => self.push_leaf(other),
        }
    }

    fn push_and(&self, items: &[Expr], depth: usize) -> CompileResult<Pushed> {
        if items.is_empty() {
            return Err(CompileError::malformed(
                Pass::WherePushdown,
                AstError::EmptyBooleanOperator { operator: "AND" },
            ));
        }
        let mut parts = Vec::with_capacity(items.len());
        let mut weakened = false;
        for item in items {
            match self.push(item, depth)? {
                Pushed::Exact(e) => parts.push(e),
                Pushed::Weakened(e) => {
                    weakened = true;
                    parts.push(e);
                }
                Pushed::Unknown => weakened = true,
            }
        }
        parts.retain(|e| !is_true(e));
        Ok(match combinators::and(parts) {
            Some(e) if weakened => Pushed::Weakened(e),
            Some(e) => Pushed::Exact(e),
            None if weakened => Pushed::Unknown,
            None => Pushed::Exact(constant(true)),
        })
    }

    fn push_or(&self, items: &[Expr], depth: usize) -> CompileResult<Pushed> {
        if items.is_empty() {
            return Err(CompileError::malformed(
                Pass::WherePushdown,
                AstError::EmptyBooleanOperator { operator: "OR" },
            ));
        }
        let mut parts = Vec::with_capacity(items.len());
        let mut weakened = false;
        for item in items {
            match self.push(item, depth)? {
                Pushed::Exact(e) => parts.push(e),
                Pushed::Weakened(e) => {
                    weakened = true;
                    parts.push(e);
                }
                Pushed::Unknown => return Ok(Pushed::Unknown),
            }
        }
        let combined = if parts.iter().any(is_true) {
            constant(true)
        } else {
            match combinators::or(parts) {
                Some(e) => e,
                None => return Ok(Pushed::Unknown),
            }
        };
        Ok(if weakened {
            Pushed::Weakened(combined)
        } else {
            Pushed::Exact(combined)
        })
    }

    fn push_compare(&self, cmp: &CompareOperation) -> CompileResult<Pushed> {
        let left = self.follow(&cmp.left);
        let right = self.follow(&cmp.right);
        if contains_select(left) || contains_select(right) {
            return Ok(Pushed::Unknown);
        }

        if let Some(widened) = self.widen_timestamp(cmp.op, left, right)? {
            return Ok(widened);
        }

        let Some(local) = self.localize(&Expr::Compare(CompareOperation {
            op: cmp.op,
            left: Box::new(left.clone()),
            right: Box::new(right.clone()),
        }))?
        else {
            return Ok(Pushed::Unknown);
        };

        if self.target.is_null_padded() {
            let rejects_nulls = cmp.op.is_null_rejecting()
                && match cmp.op {
                    CompareOperator::In => is_non_null_constant(right) && !collect_fields(left).is_empty(),
                    _ => {
                        (is_non_null_constant(right) && !collect_fields(left).is_empty())
                            || (is_non_null_constant(left) && !collect_fields(right).is_empty())
                    }
                };
            if !rejects_nulls {
                return Ok(Pushed::Unknown);
            }
        }
        Ok(Pushed::Exact(local))
    }

    /// Other boolean-valued leaves (function calls, bare boolean fields).
    fn push_leaf(&self, expr: &Expr) -> CompileResult<Pushed> {
        if self.target.is_null_padded() || contains_select(expr) {
            return Ok(Pushed::Unknown);
        }
        Ok(match self.localize(expr)? {
            Some(local) => Pushed::Exact(local),
            None => Pushed::Unknown,
        })
    }

    /// `<aggregated timestamp> <op> <bound>` turned into a widened bound on
    /// the partition key. `None` when neither side is such a timestamp.
    fn widen_timestamp(
        &self,
        op: CompareOperator,
        left: &Expr,
        right: &Expr,
    ) -> CompileResult<Option<Pushed>> {
        let as_widened = |expr: &Expr| match expr {
            Expr::Field(f) => match self.target.rewrite_field(f) {
                FieldRewrite::WidenedTimestamp {
                    partition_key,
                    lookback_days,
                } => Some((partition_key, lookback_days)),
                _ => None,
            },
            _ => None,
        };
        let (partition_key, lookback_days, op, bound) = match (as_widened(left), as_widened(right)) {
            (Some((pk, days)), None) => (pk, days, Some(op), right),
            (None, Some((pk, days))) => (pk, days, op.flipped(), left),
            (None, None) => return Ok(None),
            (Some(_), Some(_)) => return Ok(Some(Pushed::Unknown)),
        };
        let Some(op) = op else {
            return Ok(Some(Pushed::Unknown));
        };
        if bound.is_null_constant() {
            return Ok(Some(Pushed::Unknown));
        }
        let Some(bound) = self.localize(bound)? else {
            return Ok(Some(Pushed::Unknown));
        };

        let lower = || shift_days(&bound, -i64::from(lookback_days));
        let upper = || shift_days(&bound, i64::from(lookback_days));
        let widened = match op {
            CompareOperator::Eq => combinators::and(vec![
                compare(CompareOperator::GtEq, partition_key.clone(), lower()),
                compare(CompareOperator::LtEq, partition_key, upper()),
            ]),
            CompareOperator::Gt | CompareOperator::GtEq => {
                Some(compare(CompareOperator::GtEq, partition_key, lower()))
            }
            CompareOperator::Lt | CompareOperator::LtEq => {
                Some(compare(CompareOperator::LtEq, partition_key, upper()))
            }
            _ => None,
        };
        Ok(Some(match widened {
            Some(e) => Pushed::Weakened(e),
            None => Pushed::Unknown,
        }))
    }

    /// Rewrites every field of `expr` into the target, or `None` if any of
    /// them is not available there.
    fn localize(&self, expr: &Expr) -> CompileResult<Option<Expr>> {
        let mut localizer = Localizer {
            pushdown: self,
            depth: 0,
            failed: false,
        };
        let local = localizer.visit(expr.clone())?;
        Ok(local.filter(|_| !localizer.failed))
    }
}

/// `bound ± days`, folded when the bound is a literal.
fn shift_days(bound: &Expr, days: i64) -> Expr {
    if let Some(ConstantValue::DateTime(dt)) = bound.as_constant() {
        if let Some(shifted) = dt.checked_add_signed(Duration::days(days)) {
            return constant(shifted);
        }
    }
    let (name, amount) = if days < 0 {
        ("minus", -days)
    } else {
        ("plus", days)
    };
    typed_call(
        name,
        vec![
            bound.clone(),
            typed_call(
                "toIntervalDay",
                vec![int(amount)],
                DataType::new(TypeKind::Unknown, false),
            ),
        ],
        infer_type(bound),
    )
}

struct Localizer<'p, 't> {
    pushdown: &'p Pushdown<'t>,
    depth: usize,
    failed: bool,
}

impl ExprTransformer for Localizer<'_, '_> {
    fn visit(&mut self, expr: Expr) -> CompileResult<Option<Expr>> {
        if self.failed {
            return Ok(Some(expr));
        }
        match expr {
            Expr::Field(ref field) => match &field.binding {
                Some(Binding::LambdaArgument { .. }) => Ok(Some(expr)),
                Some(Binding::SelectAlias { name, .. }) => {
                    match self.pushdown.alias(name) {
                        Some(aliased) if self.depth < self.pushdown.aliases.len() => {
                            self.depth += 1;
                            let local = self.visit(aliased.clone());
                            self.depth -= 1;
                            local
                        }
                        _ => {
                            self.failed = true;
                            Ok(Some(expr))
                        }
                    }
                }
                _ => match self.pushdown.target.rewrite_field(field) {
                    FieldRewrite::Local(local) => Ok(Some(local)),
                    FieldRewrite::WidenedTimestamp { .. } | FieldRewrite::Unreachable => {
                        self.failed = true;
                        Ok(Some(expr))
                    }
                },
            },
            Expr::Select(_) => {
                self.failed = true;
                Ok(Some(expr))
            }
            other => walk_transform(self, other),
        }
    }
}

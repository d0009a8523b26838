//! Predicate combinators.
//!
//! Unlike the raw `Expr::And`/`Expr::Or` constructors these normalize their
//! input: empty lists collapse to `None`, single items are returned as-is, and
//! nested connectives of the same kind are flattened.

use super::Expr;

/// Combine predicates with AND.
///
/// - Empty vec → None
/// - Single predicate → Some(predicate)
/// - Multiple → Some(And[...]) with nested ANDs flattened
pub fn and(predicates: Vec<Expr>) -> Option<Expr> {
    let mut flat = Vec::with_capacity(predicates.len());
    for p in predicates {
        match p {
            Expr::And(items) => flat.extend(items),
            other => flat.push(other),
        }
    }
    match flat.len() {
        0 => None,
        1 => flat.into_iter().next(),
        _ => Some(Expr::And(flat)),
    }
}

/// Combine predicates with OR; same normalization as [`and`].
pub fn or(predicates: Vec<Expr>) -> Option<Expr> {
    let mut flat = Vec::with_capacity(predicates.len());
    for p in predicates {
        match p {
            Expr::Or(items) => flat.extend(items),
            other => flat.push(other),
        }
    }
    match flat.len() {
        0 => None,
        1 => flat.into_iter().next(),
        _ => Some(Expr::Or(flat)),
    }
}

/// Flatten nested AND expressions into a flat list of conjuncts.
///
/// `(a AND (b AND c))` → `[a, b, c]`
pub fn flatten_and(expr: &Expr) -> Vec<Expr> {
    match expr {
        Expr::And(items) => items.iter().flat_map(flatten_and).collect(),
        other => vec![other.clone()],
    }
}

/// Adds `extra` as a conjunct to an optional existing predicate.
pub fn and_optional(existing: Option<Expr>, extra: Expr) -> Expr {
    match existing {
        // Single-item `and` is always Some.
        Some(e) => and(vec![e, extra.clone()]).unwrap_or(extra),
        None => extra,
    }
}

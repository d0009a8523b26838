//! Index-friendly comparisons against map-backed properties.
//!
//! The generic map read `if(has(m, k), m[k], NULL)` defeats the key/value
//! bloom filters on property-group columns. For the comparison shapes below
//! an equivalent form that touches `m[k]` / `has(m, k)` directly exists:
//!
//! | comparison        | rewrite                                   |
//! |-------------------|-------------------------------------------|
//! | `= 'v'`           | `equals(m[k], 'v')`                       |
//! | `= ''`            | `and(has(m, k), equals(m[k], ''))`        |
//! | `IS NULL`         | `not(has(m, k))`                          |
//! | `IS NOT NULL`     | `has(m, k)`                               |
//! | `IN ('a', 'b')`   | `in(m[k], ('a', 'b'))`                    |
//! | `IN ('a', '')`    | `and(has(m, k), in(m[k], ('a', '')))`     |
//!
//! A missing key reads as `''` from `m[k]`, which is why the empty string
//! needs the `has` guard. Everything else (`!=`, `NOT IN`, `LIKE`, non-string
//! constants) keeps the generic read.

use crate::query_ast::builders::typed_call;
use crate::query_ast::{CompareOperator, ConstantValue, DataType, Expr};

use super::reads::{map_get, map_has};

/// Rewrites `<map property> <op> <right>`, or returns `None` when the shape
/// has no specialized form.
pub fn optimize(map: &Expr, key: &str, op: CompareOperator, right: &Expr) -> Option<Expr> {
    let boolean = DataType::boolean;
    match op {
        CompareOperator::Eq if right.is_null_constant() => Some(Expr::Not(Box::new(map_has(
            map.clone(),
            key,
        )))),
        CompareOperator::NotEq if right.is_null_constant() => Some(map_has(map.clone(), key)),
        CompareOperator::Eq => {
            let value = string_constant(right)?;
            let equals = typed_call(
                "equals",
                vec![map_get(map.clone(), key), right.clone()],
                boolean(),
            );
            Some(if value.is_empty() {
                guarded(map, key, equals)
            } else {
                equals
            })
        }
        CompareOperator::In => {
            let items = match right {
                Expr::Tuple(items) | Expr::Array(items) => items,
                _ => return None,
            };
            let values = items
                .iter()
                .map(string_constant)
                .collect::<Option<Vec<_>>>()?;
            if values.is_empty() {
                return None;
            }
            let membership = typed_call(
                "in",
                vec![map_get(map.clone(), key), Expr::Tuple(items.clone())],
                boolean(),
            );
            Some(if values.iter().any(|v| v.is_empty()) {
                guarded(map, key, membership)
            } else {
                membership
            })
        }
        _ => None,
    }
}

fn string_constant(expr: &Expr) -> Option<&str> {
    match expr.as_constant()? {
        ConstantValue::String(s) => Some(s),
        _ => None,
    }
}

fn guarded(map: &Expr, key: &str, check: Expr) -> Expr {
    typed_call(
        "and",
        vec![map_has(map.clone(), key), check],
        DataType::boolean(),
    )
}

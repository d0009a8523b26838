//! Resolved data types.
//!
//! Nullability is tracked alongside the kind because the printer's null-safety
//! wrapping depends on it: a comparison between two non-nullable operands is
//! printed bare, anything else gets the dialect's three-valued-logic treatment.

use serde::{Deserialize, Serialize};

use super::{Binding, Expr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeKind {
    String,
    Integer,
    Float,
    Boolean,
    DateTime,
    Date,
    Uuid,
    Array,
    Tuple,
    Map,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataType {
    pub kind: TypeKind,
    pub nullable: bool,
}

impl DataType {
    pub const fn new(kind: TypeKind, nullable: bool) -> Self {
        Self { kind, nullable }
    }

    pub const fn string() -> Self {
        Self::new(TypeKind::String, false)
    }

    pub const fn boolean() -> Self {
        Self::new(TypeKind::Boolean, false)
    }

    pub const fn integer() -> Self {
        Self::new(TypeKind::Integer, false)
    }

    pub const fn float() -> Self {
        Self::new(TypeKind::Float, false)
    }

    pub const fn datetime() -> Self {
        Self::new(TypeKind::DateTime, false)
    }

    pub const fn uuid() -> Self {
        Self::new(TypeKind::Uuid, false)
    }

    pub const fn unknown() -> Self {
        Self::new(TypeKind::Unknown, true)
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// Computes the type of an already-resolved expression.
///
/// Calls without a resolved type are treated as nullable so the printer errs
/// on the side of wrapping.
pub fn infer_type(expr: &Expr) -> DataType {
    match expr {
        Expr::Constant(c) => c.value.data_type(),
        Expr::Field(f) => f
            .binding
            .as_ref()
            .map(Binding::data_type)
            .unwrap_or_else(DataType::unknown),
        // Printers render comparisons two-valued.
        Expr::Compare(_) => DataType::boolean(),
        Expr::And(items) | Expr::Or(items) => DataType::new(
            TypeKind::Boolean,
            items.iter().any(|e| infer_type(e).nullable),
        ),
        Expr::Not(inner) => DataType::new(TypeKind::Boolean, infer_type(inner).nullable),
        Expr::Call(call) => call.ty.clone().unwrap_or_else(DataType::unknown),
        Expr::Array(_) => DataType::new(TypeKind::Array, false),
        Expr::Tuple(_) => DataType::new(TypeKind::Tuple, false),
        Expr::Alias(alias) => infer_type(&alias.expr),
        Expr::Lambda(_) => DataType::new(TypeKind::Unknown, false),
        Expr::WindowFunction(w) => w.ty.clone().unwrap_or_else(DataType::unknown),
        Expr::Select(select) => match select.select.as_slice() {
            // A scalar subquery yields NULL when it returns no rows.
            [single] => infer_type(single).nullable(),
            _ => DataType::unknown(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query_ast::builders::{and, constant, eq, int};

    #[test]
    fn test_constant_types() {
        assert_eq!(infer_type(&constant("x")), DataType::string());
        assert_eq!(infer_type(&int(1)), DataType::integer());
        assert!(infer_type(&Expr::Constant(crate::query_ast::Constant {
            value: crate::query_ast::ConstantValue::Null,
            inline: false,
        }))
        .nullable);
    }

    #[test]
    fn test_comparison_is_never_nullable() {
        let cmp = eq(constant("a"), constant("b"));
        assert!(!infer_type(&cmp).nullable);
        assert!(!infer_type(&and(vec![cmp.clone(), cmp])).nullable);
    }
}

//! Terse constructors for AST nodes.
//!
//! Passes use these to emit new subtrees; tests use them in place of a parser.
//!
//! ```ignore
//! use crate::query_ast::builders::*;
//!
//! // person.properties.email = 'a@x.com'
//! let pred = eq(field(&["person", "properties", "email"]), constant("a@x.com"));
//! ```

use chrono::{DateTime, Utc};

use super::{
    Alias, Binding, Call, CompareOperation, CompareOperator, Constant, ConstantValue, DataType,
    Expr, Field, JoinExpr, Lambda, SelectQuery, TableSource,
};

impl From<&str> for ConstantValue {
    fn from(value: &str) -> Self {
        ConstantValue::String(value.to_string())
    }
}

impl From<String> for ConstantValue {
    fn from(value: String) -> Self {
        ConstantValue::String(value)
    }
}

impl From<i64> for ConstantValue {
    fn from(value: i64) -> Self {
        ConstantValue::Int(value)
    }
}

impl From<f64> for ConstantValue {
    fn from(value: f64) -> Self {
        ConstantValue::Float(value)
    }
}

impl From<bool> for ConstantValue {
    fn from(value: bool) -> Self {
        ConstantValue::Bool(value)
    }
}

impl From<DateTime<Utc>> for ConstantValue {
    fn from(value: DateTime<Utc>) -> Self {
        ConstantValue::DateTime(value)
    }
}

pub fn constant(value: impl Into<ConstantValue>) -> Expr {
    Expr::Constant(Constant {
        value: value.into(),
        inline: false,
    })
}

/// A constant the printer must render as a literal.
pub fn inline_constant(value: impl Into<ConstantValue>) -> Expr {
    Expr::Constant(Constant {
        value: value.into(),
        inline: true,
    })
}

pub fn int(value: i64) -> Expr {
    constant(value)
}

pub fn boolean(value: bool) -> Expr {
    constant(value)
}

pub fn null() -> Expr {
    constant(ConstantValue::Null)
}

/// An unresolved field chain, as the parser would produce it.
pub fn field(chain: &[&str]) -> Expr {
    Expr::Field(Field {
        chain: chain.iter().map(|s| s.to_string()).collect(),
        binding: None,
        span: None,
    })
}

pub fn bound_field(chain: Vec<String>, binding: Binding) -> Expr {
    Expr::Field(Field {
        chain,
        binding: Some(binding),
        span: None,
    })
}

/// A resolved physical column `alias.column`.
pub fn column(alias: &str, table: Option<&str>, column: &str, ty: DataType) -> Expr {
    bound_field(
        vec![alias.to_string(), column.to_string()],
        Binding::Column {
            source: TableSource::Table {
                alias: alias.to_string(),
                table: table.map(str::to_string),
            },
            column: column.to_string(),
            ty,
        },
    )
}

pub fn call(name: &str, args: Vec<Expr>) -> Expr {
    Expr::Call(Call {
        name: name.to_string(),
        args,
        distinct: false,
        ty: None,
        span: None,
    })
}

pub fn typed_call(name: &str, args: Vec<Expr>, ty: DataType) -> Expr {
    Expr::Call(Call {
        name: name.to_string(),
        args,
        distinct: false,
        ty: Some(ty),
        span: None,
    })
}

pub fn compare(op: CompareOperator, left: Expr, right: Expr) -> Expr {
    Expr::Compare(CompareOperation {
        op,
        left: Box::new(left),
        right: Box::new(right),
    })
}

pub fn eq(left: Expr, right: Expr) -> Expr {
    compare(CompareOperator::Eq, left, right)
}

pub fn not_eq(left: Expr, right: Expr) -> Expr {
    compare(CompareOperator::NotEq, left, right)
}

pub fn and(items: Vec<Expr>) -> Expr {
    Expr::And(items)
}

pub fn or(items: Vec<Expr>) -> Expr {
    Expr::Or(items)
}

pub fn not(expr: Expr) -> Expr {
    Expr::Not(Box::new(expr))
}

pub fn tuple(items: Vec<Expr>) -> Expr {
    Expr::Tuple(items)
}

pub fn array(items: Vec<Expr>) -> Expr {
    Expr::Array(items)
}

pub fn alias(name: &str, expr: Expr) -> Expr {
    Expr::Alias(Alias {
        alias: name.to_string(),
        expr: Box::new(expr),
        hidden: false,
    })
}

pub fn hidden_alias(name: &str, expr: Expr) -> Expr {
    Expr::Alias(Alias {
        alias: name.to_string(),
        expr: Box::new(expr),
        hidden: true,
    })
}

pub fn lambda(args: &[&str], body: Expr) -> Expr {
    Expr::Lambda(Lambda {
        args: args.iter().map(|s| s.to_string()).collect(),
        body: Box::new(body),
    })
}

/// `SELECT <items> FROM <table>`
pub fn select_from(table: &str, items: Vec<Expr>) -> SelectQuery {
    SelectQuery {
        select: items,
        select_from: Some(JoinExpr::table(table)),
        ..Default::default()
    }
}

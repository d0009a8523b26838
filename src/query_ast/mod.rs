//! HogQL abstract syntax tree.
//!
//! The tree is produced by the (external) parser and consumed by every pass of
//! the compiler. Passes never mutate a tree in place; they build a new one
//! (see [`visitors::ExprTransformer`]).
//!
//! Resolution metadata lives directly on the nodes that need it:
//! - [`Field::binding`] says what a dot-path refers to
//! - [`Call::ty`] carries the resolved return type
//!
//! Both are `None` on a freshly parsed tree.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod builders;
pub mod combinators;
pub mod errors;
pub mod types;
pub mod visitors;

pub use types::{infer_type, DataType, TypeKind};

/// Byte offsets into the original query text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConstantValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    DateTime(DateTime<Utc>),
}

impl ConstantValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ConstantValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConstantValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConstantValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            ConstantValue::Null => DataType::new(TypeKind::Unknown, true),
            ConstantValue::Bool(_) => DataType::new(TypeKind::Boolean, false),
            ConstantValue::Int(_) => DataType::new(TypeKind::Integer, false),
            ConstantValue::Float(_) => DataType::new(TypeKind::Float, false),
            ConstantValue::String(_) => DataType::new(TypeKind::String, false),
            ConstantValue::DateTime(_) => DataType::new(TypeKind::DateTime, false),
        }
    }
}

/// HogQL literal form; used by the HogQL dialect and for inlined constants.
impl fmt::Display for ConstantValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstantValue::Null => f.write_str("NULL"),
            ConstantValue::Bool(b) => write!(f, "{}", b),
            ConstantValue::Int(i) => write!(f, "{}", i),
            ConstantValue::Float(v) => write!(f, "{}", v),
            ConstantValue::String(s) => write!(f, "'{}'", escape_string(s)),
            ConstantValue::DateTime(dt) => {
                write!(f, "'{}'", dt.format("%Y-%m-%d %H:%M:%S%.6f"))
            }
        }
    }
}

pub(crate) fn escape_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\0' => out.push_str("\\0"),
            other => out.push(other),
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constant {
    pub value: ConstantValue,
    /// Print as a literal instead of binding a parameter. Set by passes that
    /// emit index-acceleration hints where a parameter would defeat the index.
    #[serde(default)]
    pub inline: bool,
}

/// Where a bound field's data comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TableSource {
    /// A table (or subquery) in the FROM chain of the enclosing SELECT.
    /// `table` is the catalog table name, `None` for subqueries.
    Table { alias: String, table: Option<String> },
    /// A virtual table reached from `from_alias` through lazy joins.
    Lazy { from_alias: String, path: Vec<String> },
}

impl TableSource {
    pub fn table(alias: impl Into<String>, table: impl Into<String>) -> Self {
        TableSource::Table {
            alias: alias.into(),
            table: Some(table.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Binding {
    Column {
        source: TableSource,
        column: String,
        ty: DataType,
    },
    /// A key (or nested key path) inside a semi-structured properties column.
    Property {
        source: TableSource,
        column: String,
        keys: Vec<String>,
        ty: DataType,
    },
    SelectAlias {
        name: String,
        ty: DataType,
    },
    LambdaArgument {
        name: String,
    },
    /// Correlated reference into an enclosing SELECT, `levels` frames up.
    Outer {
        levels: usize,
        inner: Box<Binding>,
    },
}

impl Binding {
    pub fn data_type(&self) -> DataType {
        match self {
            Binding::Column { ty, .. }
            | Binding::Property { ty, .. }
            | Binding::SelectAlias { ty, .. } => ty.clone(),
            Binding::LambdaArgument { .. } => DataType::new(TypeKind::Unknown, false),
            Binding::Outer { inner, .. } => inner.data_type(),
        }
    }

    pub fn source(&self) -> Option<&TableSource> {
        match self {
            Binding::Column { source, .. } | Binding::Property { source, .. } => Some(source),
            Binding::Outer { inner, .. } => inner.source(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub chain: Vec<String>,
    #[serde(default)]
    pub binding: Option<Binding>,
    #[serde(default)]
    pub span: Option<Span>,
}

impl Field {
    pub fn chain_string(&self) -> String {
        self.chain.join(".")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOperator {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Like,
    NotLike,
    ILike,
    NotILike,
    In,
    NotIn,
    Regex,
    NotRegex,
    IRegex,
    NotIRegex,
    InCohort,
    NotInCohort,
}

impl CompareOperator {
    /// HogQL infix spelling.
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOperator::Eq => "=",
            CompareOperator::NotEq => "!=",
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
            CompareOperator::Regex => "=~",
            CompareOperator::NotRegex => "!~",
            CompareOperator::IRegex => "=~*",
            CompareOperator::NotIRegex => "!~*",
            CompareOperator::InCohort => "IN COHORT",
            CompareOperator::NotInCohort => "NOT IN COHORT",
        }
    }

    /// The operator with its operands swapped (`a < b` == `b > a`).
    pub fn flipped(&self) -> Option<CompareOperator> {
        match self {
            CompareOperator::Eq => Some(CompareOperator::Eq),
            CompareOperator::NotEq => Some(CompareOperator::NotEq),
            CompareOperator::Lt => Some(CompareOperator::Gt),
            CompareOperator::LtEq => Some(CompareOperator::GtEq),
            CompareOperator::Gt => Some(CompareOperator::Lt),
            CompareOperator::GtEq => Some(CompareOperator::LtEq),
            _ => None,
        }
    }

    /// True when the comparison is false whenever the left operand is NULL,
    /// given a non-null right operand.
    pub fn is_null_rejecting(&self) -> bool {
        matches!(
            self,
            CompareOperator::Eq
                | CompareOperator::Lt
                | CompareOperator::LtEq
                | CompareOperator::Gt
                | CompareOperator::GtEq
                | CompareOperator::Like
                | CompareOperator::ILike
                | CompareOperator::In
                | CompareOperator::Regex
                | CompareOperator::IRegex
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompareOperation {
    pub op: CompareOperator,
    pub left: Box<Expr>,
    pub right: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    pub name: String,
    pub args: Vec<Expr>,
    #[serde(default)]
    pub distinct: bool,
    #[serde(default)]
    pub ty: Option<DataType>,
    #[serde(default)]
    pub span: Option<Span>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alias {
    pub alias: String,
    pub expr: Box<Expr>,
    /// Introduced by the compiler rather than written by the user. Hidden
    /// aliases still name SQL output columns, but are omitted when printing
    /// the query back as HogQL.
    #[serde(default)]
    pub hidden: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lambda {
    pub args: Vec<String>,
    pub body: Box<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameKind {
    Rows,
    Range,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameBound {
    UnboundedPreceding,
    Preceding(u64),
    CurrentRow,
    Following(u64),
    UnboundedFollowing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowFrame {
    pub kind: FrameKind,
    pub start: FrameBound,
    #[serde(default)]
    pub end: Option<FrameBound>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WindowSpec {
    #[serde(default)]
    pub partition_by: Vec<Expr>,
    #[serde(default)]
    pub order_by: Vec<OrderExpr>,
    #[serde(default)]
    pub frame: Option<WindowFrame>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowFunction {
    pub name: String,
    pub args: Vec<Expr>,
    pub over: WindowSpec,
    #[serde(default)]
    pub ty: Option<DataType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Constant(Constant),
    Field(Field),
    Compare(CompareOperation),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    Call(Call),
    Array(Vec<Expr>),
    Tuple(Vec<Expr>),
    Alias(Alias),
    Lambda(Lambda),
    WindowFunction(WindowFunction),
    Select(Box<SelectQuery>),
}

impl Expr {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Expr::Constant(_) => "Constant",
            Expr::Field(_) => "Field",
            Expr::Compare(_) => "CompareOperation",
            Expr::And(_) => "And",
            Expr::Or(_) => "Or",
            Expr::Not(_) => "Not",
            Expr::Call(_) => "Call",
            Expr::Array(_) => "Array",
            Expr::Tuple(_) => "Tuple",
            Expr::Alias(_) => "Alias",
            Expr::Lambda(_) => "Lambda",
            Expr::WindowFunction(_) => "WindowFunction",
            Expr::Select(_) => "SelectQuery",
        }
    }

    pub fn as_constant(&self) -> Option<&ConstantValue> {
        match self {
            Expr::Constant(c) => Some(&c.value),
            _ => None,
        }
    }

    pub fn constant_bool(&self) -> Option<bool> {
        self.as_constant().and_then(|v| v.as_bool())
    }

    pub fn is_null_constant(&self) -> bool {
        self.as_constant().is_some_and(|v| v.is_null())
    }

    pub fn as_field(&self) -> Option<&Field> {
        match self {
            Expr::Field(f) => Some(f),
            _ => None,
        }
    }

    /// Strips any number of alias wrappers.
    pub fn unaliased(&self) -> &Expr {
        match self {
            Expr::Alias(a) => a.expr.unaliased(),
            other => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderExpr {
    pub expr: Expr,
    pub order: Order,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    LeftOuter,
    RightOuter,
    FullOuter,
    Cross,
}

impl JoinType {
    pub fn to_sql(&self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::LeftOuter => "LEFT OUTER JOIN",
            JoinType::RightOuter => "RIGHT OUTER JOIN",
            JoinType::FullOuter => "FULL OUTER JOIN",
            JoinType::Cross => "CROSS JOIN",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TableExpr {
    Table { name: String },
    Subquery(Box<SelectQuery>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleRatio {
    pub numerator: u64,
    #[serde(default)]
    pub denominator: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleClause {
    pub ratio: SampleRatio,
    #[serde(default)]
    pub offset: Option<SampleRatio>,
}

/// One link of a SELECT's FROM chain. The head has no `join_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinExpr {
    #[serde(default)]
    pub join_type: Option<JoinType>,
    pub table: TableExpr,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub constraint: Option<Expr>,
    #[serde(default)]
    pub sample: Option<SampleClause>,
    #[serde(default)]
    pub next_join: Option<Box<JoinExpr>>,
}

impl JoinExpr {
    pub fn table(name: impl Into<String>) -> Self {
        JoinExpr {
            join_type: None,
            table: TableExpr::Table { name: name.into() },
            alias: None,
            constraint: None,
            sample: None,
            next_join: None,
        }
    }

    /// Alias used to qualify this table's columns.
    pub fn effective_alias(&self) -> Option<&str> {
        match (&self.alias, &self.table) {
            (Some(alias), _) => Some(alias),
            (None, TableExpr::Table { name }) => Some(name),
            (None, TableExpr::Subquery(_)) => None,
        }
    }

    pub fn iter(&self) -> JoinIter<'_> {
        JoinIter { next: Some(self) }
    }

    /// Appends `join` (and anything chained after it) to the end of the chain.
    pub fn append(&mut self, join: JoinExpr) {
        match self.next_join {
            Some(ref mut next) => next.append(join),
            None => self.next_join = Some(Box::new(join)),
        }
    }

    /// Splits the chain into its links, each with `next_join` cleared.
    pub fn into_links(self) -> Vec<JoinExpr> {
        let mut links = Vec::new();
        let mut current = Some(self);
        while let Some(mut join) = current {
            current = join.next_join.take().map(|b| *b);
            links.push(join);
        }
        links
    }

    /// Rebuilds a chain from links produced by [`JoinExpr::into_links`].
    pub fn from_links(links: Vec<JoinExpr>) -> Option<JoinExpr> {
        let mut head: Option<JoinExpr> = None;
        for mut link in links.into_iter().rev() {
            link.next_join = head.map(Box::new);
            head = Some(link);
        }
        head
    }
}

pub struct JoinIter<'a> {
    next: Option<&'a JoinExpr>,
}

impl<'a> Iterator for JoinIter<'a> {
    type Item = &'a JoinExpr;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.next_join.as_deref();
        Some(current)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArrayJoinKind {
    Inner,
    Left,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayJoin {
    pub kind: ArrayJoinKind,
    pub exprs: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitBy {
    pub n: Expr,
    #[serde(default)]
    pub offset: Option<Expr>,
    pub exprs: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SelectQuery {
    pub select: Vec<Expr>,
    #[serde(default)]
    pub distinct: bool,
    #[serde(default)]
    pub select_from: Option<JoinExpr>,
    #[serde(default)]
    pub array_join: Option<ArrayJoin>,
    #[serde(default)]
    pub prewhere: Option<Expr>,
    #[serde(default)]
    pub where_clause: Option<Expr>,
    #[serde(default)]
    pub group_by: Vec<Expr>,
    #[serde(default)]
    pub having: Option<Expr>,
    #[serde(default)]
    pub order_by: Vec<OrderExpr>,
    #[serde(default)]
    pub limit: Option<Expr>,
    #[serde(default)]
    pub offset: Option<Expr>,
    #[serde(default)]
    pub limit_by: Option<LimitBy>,
}

impl SelectQuery {
    pub fn joins(&self) -> impl Iterator<Item = &JoinExpr> {
        self.select_from.iter().flat_map(|j| j.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_chain_append_and_iterate() {
        let mut head = JoinExpr::table("events");
        head.append(JoinExpr {
            join_type: Some(JoinType::Inner),
            alias: Some("p".to_string()),
            ..JoinExpr::table("persons")
        });
        head.append(JoinExpr {
            join_type: Some(JoinType::LeftOuter),
            ..JoinExpr::table("sessions")
        });

        let aliases: Vec<_> = head.iter().filter_map(|j| j.effective_alias()).collect();
        assert_eq!(aliases, vec!["events", "p", "sessions"]);
    }

    #[test]
    fn test_links_round_trip_preserves_order() {
        let mut head = JoinExpr::table("a");
        head.append(JoinExpr::table("b"));
        head.append(JoinExpr::table("c"));

        let links = head.clone().into_links();
        assert_eq!(links.len(), 3);
        assert!(links.iter().all(|l| l.next_join.is_none()));
        assert_eq!(JoinExpr::from_links(links), Some(head));
    }

    #[test]
    fn test_escape_string() {
        let v = ConstantValue::String("it's a \\ test".to_string());
        assert_eq!(v.to_string(), "'it\\'s a \\\\ test'");
    }

    #[test]
    fn test_flipped_comparisons() {
        assert_eq!(CompareOperator::Lt.flipped(), Some(CompareOperator::Gt));
        assert_eq!(CompareOperator::GtEq.flipped(), Some(CompareOperator::LtEq));
        assert_eq!(CompareOperator::Like.flipped(), None);
    }
}

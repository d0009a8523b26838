/// HogQL Function Registry
///
/// Every function a query may call, with its arity, result type and how each
/// SQL dialect spells it. The resolver checks calls against this table; the
/// printer renders them through it.
use std::collections::HashMap;

use super::Dialect;
use crate::query_ast::{DataType, TypeKind};

/// How a dialect renders a call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SqlForm {
    /// `name(arg, ...)`
    Name(&'static str),
    /// Placeholders: `{N}` is argument N, `{N..}` is arguments N onwards
    /// joined with `, `.
    Template(&'static str),
    /// Arguments joined by an infix operator, parenthesized.
    Infix(&'static str),
    Unsupported,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReturnType {
    /// Nullable when any argument is.
    Propagating(TypeKind),
    /// Never NULL.
    NonNull(TypeKind),
    /// May be NULL regardless of arguments.
    Nullable(TypeKind),
    /// Type of argument N.
    SameAs(usize),
    /// Common type of the arguments from N onwards, nullable if any of them is.
    CommonFrom(usize),
}

#[derive(Clone, Debug)]
pub struct FunctionSpec {
    pub name: &'static str,
    pub min_args: usize,
    /// `None` for variadic functions.
    pub max_args: Option<usize>,
    pub returns: ReturnType,
    pub clickhouse: SqlForm,
    pub postgres: SqlForm,
}

impl FunctionSpec {
    pub fn accepts(&self, count: usize) -> bool {
        count >= self.min_args && self.max_args.is_none_or(|max| count <= max)
    }

    /// Human-readable arity, e.g. `2`, `1 to 3`, `at least 1`.
    pub fn arity(&self) -> String {
        match self.max_args {
            Some(max) if max == self.min_args => max.to_string(),
            Some(max) => format!("{} to {}", self.min_args, max),
            None => format!("at least {}", self.min_args),
        }
    }

    pub fn form(&self, dialect: Dialect) -> SqlForm {
        match dialect {
            Dialect::ClickHouse => self.clickhouse,
            Dialect::Postgres => self.postgres,
            Dialect::HogQL => SqlForm::Name(self.name),
        }
    }

    pub fn return_type(&self, args: &[DataType]) -> DataType {
        let any_nullable = |from: usize| args.iter().skip(from).any(|a| a.nullable);
        match self.returns {
            ReturnType::Propagating(kind) => DataType::new(kind, any_nullable(0)),
            ReturnType::NonNull(kind) => DataType::new(kind, false),
            ReturnType::Nullable(kind) => DataType::new(kind, true),
            ReturnType::SameAs(i) => args.get(i).cloned().unwrap_or_else(DataType::unknown),
            ReturnType::CommonFrom(i) => {
                let kinds: Vec<_> = args.iter().skip(i).map(|a| a.kind).collect();
                let kind = match kinds.first() {
                    Some(first) if kinds.iter().all(|k| k == first) => *first,
                    _ => TypeKind::Unknown,
                };
                DataType::new(kind, any_nullable(i))
            }
        }
    }
}

/// Get the spec for a HogQL function name (case-sensitive).
pub fn lookup(name: &str) -> Option<&'static FunctionSpec> {
    FUNCTIONS.get(name)
}

pub fn function_names() -> impl Iterator<Item = &'static str> {
    FUNCTIONS.keys().copied()
}

/// Window-only functions; any aggregate may also be used with OVER.
pub fn is_window_function(name: &str) -> bool {
    matches!(
        name,
        "lag" | "lead" | "row_number" | "rank" | "dense_rank" | "first_value" | "last_value"
    )
}

/// Renders a template form against already-printed arguments.
pub fn apply_template(template: &str, args: &[String]) -> String {
    let mut out = String::with_capacity(template.len() + args.iter().map(String::len).sum::<usize>());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };
        let placeholder = &after[..close];
        if let Some(from) = placeholder.strip_suffix("..") {
            if let Ok(from) = from.parse::<usize>() {
                out.push_str(&args.get(from..).unwrap_or_default().join(", "));
            }
        } else if let Ok(index) = placeholder.parse::<usize>() {
            if let Some(arg) = args.get(index) {
                out.push_str(arg);
            }
        } else {
            out.push('{');
            out.push_str(placeholder);
            out.push('}');
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    out
}

fn spec(
    name: &'static str,
    (min_args, max_args): (usize, Option<usize>),
    returns: ReturnType,
    clickhouse: SqlForm,
    postgres: SqlForm,
) -> FunctionSpec {
    FunctionSpec {
        name,
        min_args,
        max_args,
        returns,
        clickhouse,
        postgres,
    }
}

const fn exactly(n: usize) -> (usize, Option<usize>) {
    (n, Some(n))
}

const fn between(min: usize, max: usize) -> (usize, Option<usize>) {
    (min, Some(max))
}

const fn at_least(n: usize) -> (usize, Option<usize>) {
    (n, None)
}

// Static function table
lazy_static::lazy_static! {
    static ref FUNCTIONS: HashMap<&'static str, FunctionSpec> = {
        use ReturnType::*;
        use SqlForm::*;
        use TypeKind as K;

        let same = |name: &'static str| Name(name);
        let entries = vec![
            // ===== COMPARISON (function form) =====
            spec("equals", exactly(2), Propagating(K::Boolean), same("equals"), Template("({0} = {1})")),
            spec("notEquals", exactly(2), Propagating(K::Boolean), same("notEquals"), Template("({0} <> {1})")),
            spec("less", exactly(2), Propagating(K::Boolean), same("less"), Template("({0} < {1})")),
            spec("lessOrEquals", exactly(2), Propagating(K::Boolean), same("lessOrEquals"), Template("({0} <= {1})")),
            spec("greater", exactly(2), Propagating(K::Boolean), same("greater"), Template("({0} > {1})")),
            spec("greaterOrEquals", exactly(2), Propagating(K::Boolean), same("greaterOrEquals"), Template("({0} >= {1})")),
            spec("like", exactly(2), Propagating(K::Boolean), same("like"), Template("({0} LIKE {1})")),
            spec("ilike", exactly(2), Propagating(K::Boolean), same("ilike"), Template("({0} ILIKE {1})")),
            spec("match", exactly(2), Propagating(K::Boolean), same("match"), Template("({0} ~ {1})")),
            spec("in", exactly(2), Propagating(K::Boolean), same("in"), Template("({0} IN {1})")),
            spec("has", exactly(2), NonNull(K::Boolean), same("has"), Unsupported),

            // ===== LOGICAL =====
            spec("and", at_least(2), Propagating(K::Boolean), same("and"), Infix("AND")),
            spec("or", at_least(2), Propagating(K::Boolean), same("or"), Infix("OR")),
            spec("not", exactly(1), Propagating(K::Boolean), same("not"), Template("(NOT {0})")),

            // ===== NULL HANDLING =====
            spec("ifNull", exactly(2), CommonFrom(1), same("ifNull"), Name("COALESCE")),
            spec("coalesce", at_least(1), CommonFrom(0), same("coalesce"), Name("COALESCE")),
            spec("nullIf", exactly(2), Nullable(K::Unknown), same("nullIf"), Name("NULLIF")),
            spec("isNull", exactly(1), NonNull(K::Boolean), same("isNull"), Template("({0} IS NULL)")),
            spec("isNotNull", exactly(1), NonNull(K::Boolean), same("isNotNull"), Template("({0} IS NOT NULL)")),

            // ===== CONDITIONALS =====
            spec("if", exactly(3), CommonFrom(1), same("if"), Template("CASE WHEN {0} THEN {1} ELSE {2} END")),
            spec("multiIf", at_least(3), Nullable(K::Unknown), same("multiIf"), Unsupported),
            spec("transform", between(3, 4), Nullable(K::Unknown), same("transform"), Unsupported),

            // ===== TYPE CONVERSION =====
            spec("toString", exactly(1), Propagating(K::String), same("toString"), Template("CAST({0} AS TEXT)")),
            spec("toInt", exactly(1), Nullable(K::Integer), Template("accurateCastOrNull({0}, 'Int64')"), Template("CAST({0} AS BIGINT)")),
            spec("toFloat", exactly(1), Nullable(K::Float), Template("accurateCastOrNull({0}, 'Float64')"), Template("CAST({0} AS DOUBLE PRECISION)")),
            spec("toUUID", exactly(1), Propagating(K::Uuid), same("toUUID"), Template("CAST({0} AS UUID)")),
            spec("toDate", exactly(1), Propagating(K::Date), same("toDate"), Template("CAST({0} AS DATE)")),
            spec("toDateTime", between(1, 2), Propagating(K::DateTime), same("toDateTime"), Template("CAST({0} AS TIMESTAMP)")),
            spec("toUInt64", exactly(1), Propagating(K::Integer), same("toUInt64"), Template("CAST({0} AS NUMERIC)")),
            spec("toUInt128", exactly(1), Propagating(K::Integer), same("toUInt128"), Unsupported),
            spec("reinterpretAsUUID", exactly(1), Propagating(K::Uuid), same("reinterpretAsUUID"), Unsupported),
            spec("parseDateTime64BestEffortOrNull", between(1, 3), Nullable(K::DateTime), same("parseDateTime64BestEffortOrNull"), Unsupported),
            spec("fromUnixTimestamp", exactly(1), Propagating(K::DateTime), same("fromUnixTimestamp"), Name("to_timestamp")),

            // ===== JSON / MAPS =====
            spec("JSONExtractRaw", at_least(1), NonNull(K::String), same("JSONExtractRaw"), Template("jsonb_extract_path_text(({0})::jsonb, {1..})")),
            spec("JSONExtractString", at_least(1), NonNull(K::String), same("JSONExtractString"), Template("jsonb_extract_path_text(({0})::jsonb, {1..})")),
            spec("arrayElement", exactly(2), Nullable(K::Unknown), Template("{0}[{1}]"), Template("{0}[{1}]")),

            // ===== STRINGS =====
            spec("replaceRegexpAll", exactly(3), Propagating(K::String), same("replaceRegexpAll"), Template("regexp_replace({0}, {1}, {2}, 'g')")),
            spec("lower", exactly(1), Propagating(K::String), same("lower"), same("lower")),
            spec("upper", exactly(1), Propagating(K::String), same("upper"), same("upper")),
            spec("length", exactly(1), Propagating(K::Integer), same("length"), same("length")),
            spec("concat", at_least(1), Propagating(K::String), same("concat"), same("concat")),
            spec("substring", between(2, 3), Propagating(K::String), same("substring"), Name("substr")),
            spec("trim", exactly(1), Propagating(K::String), same("trim"), same("trim")),
            spec("empty", exactly(1), NonNull(K::Boolean), same("empty"), Template("(COALESCE(length({0}), 0) = 0)")),
            spec("notEmpty", exactly(1), NonNull(K::Boolean), same("notEmpty"), Template("(COALESCE(length({0}), 0) > 0)")),
            spec("startsWith", exactly(2), Propagating(K::Boolean), same("startsWith"), Name("starts_with")),

            // ===== ARITHMETIC =====
            spec("plus", exactly(2), CommonFrom(0), same("plus"), Template("({0} + {1})")),
            spec("minus", exactly(2), SameAs(0), same("minus"), Template("({0} - {1})")),
            spec("multiply", exactly(2), CommonFrom(0), same("multiply"), Template("({0} * {1})")),
            spec("divide", exactly(2), Propagating(K::Float), same("divide"), Template("({0} / {1})")),
            spec("intDiv", exactly(2), Propagating(K::Integer), same("intDiv"), Template("div({0}, {1})")),
            spec("modulo", exactly(2), Propagating(K::Integer), same("modulo"), Template("({0} % {1})")),
            spec("abs", exactly(1), SameAs(0), same("abs"), same("abs")),
            spec("round", between(1, 2), SameAs(0), same("round"), same("round")),
            spec("bitShiftRight", exactly(2), Propagating(K::Integer), same("bitShiftRight"), Template("({0} >> {1})")),

            // ===== DATES =====
            spec("now", exactly(0), NonNull(K::DateTime), same("now"), same("now")),
            spec("today", exactly(0), NonNull(K::Date), same("today"), Name("CURRENT_DATE")),
            spec("toIntervalDay", exactly(1), NonNull(K::Unknown), same("toIntervalDay"), Template("make_interval(days => {0})")),
            spec("toIntervalHour", exactly(1), NonNull(K::Unknown), same("toIntervalHour"), Template("make_interval(hours => {0})")),
            spec("toStartOfDay", exactly(1), Propagating(K::DateTime), same("toStartOfDay"), Template("date_trunc('day', {0})")),
            spec("toStartOfHour", exactly(1), Propagating(K::DateTime), same("toStartOfHour"), Template("date_trunc('hour', {0})")),
            spec("toStartOfWeek", exactly(1), Propagating(K::DateTime), same("toStartOfWeek"), Template("date_trunc('week', {0})")),
            spec("toStartOfMonth", exactly(1), Propagating(K::DateTime), same("toStartOfMonth"), Template("date_trunc('month', {0})")),
            spec("dateDiff", exactly(3), Propagating(K::Integer), same("dateDiff"), Unsupported),

            // ===== AGGREGATES =====
            spec("count", between(0, 1), NonNull(K::Integer), same("count"), same("count")),
            spec("countIf", exactly(1), NonNull(K::Integer), same("countIf"), Template("count(*) FILTER (WHERE {0})")),
            spec("sum", exactly(1), SameAs(0), same("sum"), same("sum")),
            spec("sumIf", exactly(2), SameAs(0), same("sumIf"), Template("sum({0}) FILTER (WHERE {1})")),
            spec("avg", exactly(1), Nullable(K::Float), same("avg"), same("avg")),
            spec("min", exactly(1), SameAs(0), same("min"), same("min")),
            spec("max", exactly(1), SameAs(0), same("max"), same("max")),
            spec("uniq", at_least(1), NonNull(K::Integer), same("uniq"), Template("count(DISTINCT {0..})")),
            spec("argMax", exactly(2), SameAs(0), same("argMax"), Unsupported),
            spec("argMin", exactly(2), SameAs(0), same("argMin"), Unsupported),
            spec("groupArray", exactly(1), NonNull(K::Array), same("groupArray"), Name("array_agg")),

            // ===== ARRAYS =====
            spec("arrayMap", at_least(2), NonNull(K::Array), same("arrayMap"), Unsupported),
            spec("arrayFilter", at_least(2), NonNull(K::Array), same("arrayFilter"), Unsupported),
            spec("arrayExists", at_least(2), NonNull(K::Boolean), same("arrayExists"), Unsupported),
            spec("arrayJoin", exactly(1), Nullable(K::Unknown), same("arrayJoin"), Name("unnest")),

            // ===== WINDOW =====
            spec("lag", between(1, 3), Nullable(K::Unknown), Name("lagInFrame"), same("lag")),
            spec("lead", between(1, 3), Nullable(K::Unknown), Name("leadInFrame"), same("lead")),
            spec("row_number", exactly(0), NonNull(K::Integer), same("row_number"), same("row_number")),
            spec("rank", exactly(0), NonNull(K::Integer), same("rank"), same("rank")),
            spec("dense_rank", exactly(0), NonNull(K::Integer), same("dense_rank"), same("dense_rank")),
            spec("first_value", exactly(1), SameAs(0), same("first_value"), same("first_value")),
            spec("last_value", exactly(1), SameAs(0), same("last_value"), same("last_value")),
        ];

        entries.into_iter().map(|s| (s.name, s)).collect()
    };
}

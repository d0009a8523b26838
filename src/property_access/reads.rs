//! Read expressions for each physical representation of a property.

use crate::catalog::PropertyType;
use crate::query_ast::builders::{array, boolean, constant, inline_constant, int, null, typed_call};
use crate::query_ast::{Binding, DataType, Expr, Field, TableSource, TypeKind};

/// Builds `alias.column` fields that keep whatever binding wrapper (such as
/// a correlated [`Binding::Outer`]) the property access had.
#[derive(Debug, Clone)]
pub struct ColumnRef {
    pub source: TableSource,
    pub outer_levels: Option<usize>,
}

impl ColumnRef {
    pub fn field(&self, column: &str, ty: DataType) -> Expr {
        let alias = match &self.source {
            TableSource::Table { alias, .. } => alias.clone(),
            TableSource::Lazy { from_alias, .. } => from_alias.clone(),
        };
        let binding = Binding::Column {
            source: self.source.clone(),
            column: column.to_string(),
            ty,
        };
        let binding = match self.outer_levels {
            Some(levels) => Binding::Outer {
                levels,
                inner: Box::new(binding),
            },
            None => binding,
        };
        Expr::Field(Field {
            chain: vec![alias, column.to_string()],
            binding: Some(binding),
            span: None,
        })
    }
}

/// `replaceRegexpAll(nullIf(nullIf(JSONExtractRaw(col, k...), ''), 'null'), '^"|"$', '')`
///
/// Reserved keys skip the null normalization and are typed non-nullable.
pub fn json_read(blob: Expr, keys: &[String], reserved: bool) -> Expr {
    let mut args = vec![blob];
    args.extend(keys.iter().map(|k| constant(k.as_str())));
    let raw = typed_call("JSONExtractRaw", args, DataType::string());
    let (inner, ty) = if reserved {
        (raw, DataType::string())
    } else {
        let not_empty = typed_call(
            "nullIf",
            vec![raw, constant("")],
            DataType::string().nullable(),
        );
        (
            typed_call(
                "nullIf",
                vec![not_empty, constant("null")],
                DataType::string().nullable(),
            ),
            DataType::string().nullable(),
        )
    };
    typed_call(
        "replaceRegexpAll",
        vec![inner, constant("^\"|\"$"), constant("")],
        ty,
    )
}

/// `map[key]`, with the key inlined so the bloom-filter index can use it.
pub fn map_get(map: Expr, key: &str) -> Expr {
    typed_call(
        "arrayElement",
        vec![map, inline_constant(key)],
        DataType::string(),
    )
}

/// `has(map, key)`
pub fn map_has(map: Expr, key: &str) -> Expr {
    typed_call("has", vec![map, inline_constant(key)], DataType::boolean())
}

/// `if(has(map, key), map[key], NULL)`
pub fn map_read(map: Expr, key: &str) -> Expr {
    typed_call(
        "if",
        vec![map_has(map.clone(), key), map_get(map, key), null()],
        DataType::string().nullable(),
    )
}

/// Side-table value column for a property type.
pub fn side_table_column(ty: Option<PropertyType>) -> (&'static str, DataType) {
    match ty {
        Some(PropertyType::Numeric) => ("value_numeric", DataType::float().nullable()),
        Some(PropertyType::Boolean) => ("value_bool", DataType::boolean().nullable()),
        Some(PropertyType::DateTime) => ("value_datetime", DataType::datetime().nullable()),
        Some(PropertyType::String) | None => ("value_string", DataType::string().nullable()),
    }
}

/// Wraps a string read so comparisons run on the declared type.
pub fn typed_read(read: Expr, ty: Option<PropertyType>) -> Expr {
    match ty {
        None | Some(PropertyType::String) => read,
        Some(PropertyType::Numeric) => {
            typed_call("toFloat", vec![read], DataType::float().nullable())
        }
        Some(PropertyType::Boolean) => typed_call(
            "transform",
            vec![
                typed_call("toString", vec![read], DataType::string().nullable()),
                array(vec![constant("true"), constant("false")]),
                array(vec![boolean(true), boolean(false)]),
                null(),
            ],
            DataType::boolean().nullable(),
        ),
        Some(PropertyType::DateTime) => typed_call(
            "parseDateTime64BestEffortOrNull",
            vec![read, int(6)],
            DataType::datetime().nullable(),
        ),
    }
}

/// Result type of [`typed_read`] over a read of type `base`.
pub fn typed_read_type(base: DataType, ty: Option<PropertyType>) -> DataType {
    match ty {
        None | Some(PropertyType::String) => base,
        Some(PropertyType::Numeric) => DataType::float().nullable(),
        Some(PropertyType::Boolean) => DataType::boolean().nullable(),
        Some(PropertyType::DateTime) => DataType::datetime().nullable(),
    }
}

pub fn map_column_type() -> DataType {
    DataType::new(TypeKind::Map, false)
}

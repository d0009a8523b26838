//! Property access strategy selection.
//!
//! A property key can be stored in up to four places. For every resolved
//! property access this pass picks one, in order of preference:
//!
//! 1. a dedicated column holding just that key
//! 2. a slot in the `event_property_slots` side table (joined per SELECT)
//! 3. a key/value map column of a property group (unless groups are disabled)
//! 4. the JSON blob, which always has the data
//!
//! Nested key paths can only be served by the JSON blob.

pub mod map_comparisons;
pub mod reads;

use crate::catalog::database::physical;
use crate::catalog::{
    DedicatedColumn, MaterializationCatalog, PropertyGroup, PropertyType, SideTableSlot,
};
use crate::compiler::CompileContext;
use crate::config::PropertyGroupsMode;
use crate::errors::{CompileError, CompileResult, InternalError, Pass};
use crate::join_materializer::join_registry::{JoinKey, JoinRegistry};
use crate::query_ast::builders::{column, constant, eq, hidden_alias, int};
use crate::query_ast::combinators;
use crate::query_ast::visitors::{walk_select_transform, walk_transform, ExprTransformer};
use crate::query_ast::{
    Binding, CompareOperation, CompareOperator, DataType, Expr, Field, JoinExpr, JoinType,
    SelectQuery, TableExpr, TableSource, TypeKind,
};

use reads::ColumnRef;

/// Keys that are always present on the events that carry them. Their JSON
/// reads skip the null normalization and are typed non-nullable.
pub const RESERVED_KEYS: &[&str] = &[
    "$ai_trace_id",
    "$ai_session_id",
    "$trace_id",
    "$correlation_id",
    "$session_id",
    "$window_id",
];

pub fn is_reserved(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PropertyStrategy<'c> {
    Dedicated(&'c DedicatedColumn),
    SideTable(&'c SideTableSlot),
    Map(&'c PropertyGroup),
    Json { reserved: bool },
}

pub fn select_strategy<'c>(
    catalog: &'c MaterializationCatalog,
    mode: PropertyGroupsMode,
    table: Option<&str>,
    column: &str,
    keys: &[String],
) -> PropertyStrategy<'c> {
    let (Some(table), [key]) = (table, keys) else {
        return PropertyStrategy::Json { reserved: false };
    };
    if let Some(d) = catalog.dedicated(table, column, key) {
        return PropertyStrategy::Dedicated(d);
    }
    if let Some(s) = catalog.side_slot(table, column, key) {
        return PropertyStrategy::SideTable(s);
    }
    if mode != PropertyGroupsMode::Disabled {
        if let Some(g) = catalog.property_group(table, column, key) {
            return PropertyStrategy::Map(g);
        }
    }
    PropertyStrategy::Json {
        reserved: is_reserved(key),
    }
}

fn declared_type(
    catalog: &MaterializationCatalog,
    table: Option<&str>,
    column: &str,
    keys: &[String],
) -> Option<PropertyType> {
    match (table, keys) {
        (Some(table), [key]) => catalog.property_type(table, column, key),
        _ => None,
    }
}

/// Type of a property access once expanded. The resolver stamps this on the
/// binding so types are known before the read expression exists.
pub fn property_type(
    catalog: &MaterializationCatalog,
    mode: PropertyGroupsMode,
    table: Option<&str>,
    column: &str,
    keys: &[String],
) -> DataType {
    let declared = declared_type(catalog, table, column, keys);
    let base = match select_strategy(catalog, mode, table, column, keys) {
        PropertyStrategy::SideTable(_) => return reads::side_table_column(declared).1,
        PropertyStrategy::Dedicated(d) => DataType::new(TypeKind::String, d.nullable),
        PropertyStrategy::Map(_) => DataType::string().nullable(),
        PropertyStrategy::Json { reserved: true } => DataType::string(),
        PropertyStrategy::Json { reserved: false } => DataType::string().nullable(),
    };
    reads::typed_read_type(base, declared)
}

/// Replaces every property access in `select` with its physical read,
/// adding side-table joins where needed.
pub fn expand_properties(select: SelectQuery, ctx: &CompileContext<'_>) -> CompileResult<SelectQuery> {
    log::debug!(
        "PropertyAccess: expanding with property groups {:?}",
        ctx.modifiers.property_groups_mode
    );
    let mut expander = PropertyExpander {
        ctx,
        registries: Vec::new(),
    };
    expander.visit_select(select)
}

/// A property access taken apart.
struct PropertyRef {
    source: TableSource,
    outer_levels: Option<usize>,
    column: String,
    keys: Vec<String>,
}

impl PropertyRef {
    fn from_field(field: &Field) -> CompileResult<Option<Self>> {
        let (binding, outer_levels) = match &field.binding {
            Some(Binding::Outer { levels, inner }) => (inner.as_ref(), Some(*levels)),
            Some(b) => (b, None),
            None => return Ok(None),
        };
        match binding {
            Binding::Property { source: TableSource::Lazy { .. }, .. } => {
                Err(CompileError::Internal(InternalError::UnmaterializedField {
                    pass: Pass::PropertyAccess,
                    chain: field.chain_string(),
                }))
            }
            Binding::Property {
                source,
                column,
                keys,
                ..
            } => Ok(Some(PropertyRef {
                source: source.clone(),
                outer_levels,
                column: column.clone(),
                keys: keys.clone(),
            })),
            _ => Ok(None),
        }
    }

    fn columns(&self) -> ColumnRef {
        ColumnRef {
            source: self.source.clone(),
            outer_levels: self.outer_levels,
        }
    }

    fn alias(&self) -> &str {
        match &self.source {
            TableSource::Table { alias, .. } => alias,
            TableSource::Lazy { from_alias, .. } => from_alias,
        }
    }
}

struct PropertyExpander<'c, 'a> {
    ctx: &'c CompileContext<'a>,
    /// One per SELECT being processed, innermost last.
    registries: Vec<JoinRegistry>,
}

impl<'c, 'a> PropertyExpander<'c, 'a> {
    /// Physical table the catalog knows the property's source by.
    fn physical_table(&self, source: &TableSource) -> Option<String> {
        match source {
            TableSource::Table {
                table: Some(name), ..
            } => match self.ctx.database.table(name) {
                Some(def) => crate::resolver::properties_table(def).map(str::to_string),
                None => Some(name.clone()),
            },
            _ => None,
        }
    }

    fn strategy(&self, prop: &PropertyRef) -> (PropertyStrategy<'a>, Option<PropertyType>) {
        let table = self.physical_table(&prop.source);
        let catalog: &'a MaterializationCatalog = self.ctx.catalog;
        (
            select_strategy(
                catalog,
                self.ctx.modifiers.property_groups_mode,
                table.as_deref(),
                &prop.column,
                &prop.keys,
            ),
            declared_type(catalog, table.as_deref(), &prop.column, &prop.keys),
        )
    }

    fn expand(&mut self, prop: &PropertyRef) -> CompileResult<Expr> {
        let (strategy, declared) = self.strategy(prop);
        let columns = prop.columns();
        log::trace!(
            "PropertyAccess: {}.{}.{} via {:?}",
            prop.alias(),
            prop.column,
            prop.keys.join("."),
            strategy
        );
        let read = match strategy {
            PropertyStrategy::Dedicated(d) => columns.field(
                &d.target,
                DataType::new(TypeKind::String, d.nullable),
            ),
            PropertyStrategy::SideTable(slot) if prop.outer_levels.is_none() => {
                return self.side_table_read(prop, slot, declared);
            }
            PropertyStrategy::SideTable(_) => {
                log::debug!(
                    "PropertyAccess: correlated access to `{}` read from JSON instead of the side table",
                    prop.keys.join(".")
                );
                reads::json_read(
                    columns.field(&prop.column, DataType::string()),
                    &prop.keys,
                    false,
                )
            }
            PropertyStrategy::Map(group) => reads::map_read(
                columns.field(&group.map_column, reads::map_column_type()),
                &prop.keys[0],
            ),
            PropertyStrategy::Json { reserved } => reads::json_read(
                columns.field(&prop.column, DataType::string()),
                &prop.keys,
                reserved,
            ),
        };
        Ok(reads::typed_read(read, declared))
    }

    fn side_table_read(
        &mut self,
        prop: &PropertyRef,
        slot: &SideTableSlot,
        declared: Option<PropertyType>,
    ) -> CompileResult<Expr> {
        let from_alias = prop.alias().to_string();
        let team_id = self.ctx.team_id;
        let events_uuid = prop.columns().field("uuid", DataType::uuid());
        let registry = self.registries.last_mut().ok_or_else(|| {
            CompileError::contract(Pass::PropertyAccess, "property access outside of any SELECT")
        })?;

        let key = JoinKey::new(
            physical::EVENT_PROPERTY_SLOTS,
            format!("{}.uuid#slot{}", from_alias, slot.slot),
            JoinType::LeftOuter,
        );
        let join_alias = registry.register_after(
            &from_alias,
            key,
            &format!("{}__slot_{}", from_alias, slot.slot),
            |alias| {
                Ok(JoinExpr {
                    join_type: Some(JoinType::LeftOuter),
                    table: TableExpr::Subquery(Box::new(slot_subquery(slot.slot, team_id))),
                    alias: Some(alias.to_string()),
                    constraint: Some(eq(
                        events_uuid,
                        column(alias, None, "uuid", DataType::uuid()),
                    )),
                    sample: None,
                    next_join: None,
                })
            },
        )?;

        let (value_column, ty) = reads::side_table_column(declared);
        Ok(column(&join_alias, None, value_column, ty))
    }

    /// Index-friendly rewrite of a comparison against a map-backed property.
    fn optimize_map_comparison(&self, cmp: &CompareOperation) -> CompileResult<Option<Expr>> {
        if self.ctx.modifiers.property_groups_mode != PropertyGroupsMode::Optimized {
            return Ok(None);
        }
        let (prop_side, other, op) = match (cmp.left.as_field(), cmp.right.as_field()) {
            (Some(f), _) => (f, cmp.right.as_ref(), cmp.op),
            (None, Some(f)) if matches!(cmp.op, CompareOperator::Eq | CompareOperator::NotEq) => {
                (f, cmp.left.as_ref(), cmp.op)
            }
            _ => return Ok(None),
        };
        let Some(prop) = PropertyRef::from_field(prop_side)? else {
            return Ok(None);
        };
        let (strategy, declared) = self.strategy(&prop);
        let PropertyStrategy::Map(group) = strategy else {
            return Ok(None);
        };
        if !matches!(declared, None | Some(PropertyType::String)) {
            return Ok(None);
        }
        let map = prop
            .columns()
            .field(&group.map_column, reads::map_column_type());
        Ok(map_comparisons::optimize(&map, &prop.keys[0], op, other))
    }
}

/// `SELECT uuid, value_* FROM event_property_slots WHERE slot = n`
fn slot_subquery(slot: u32, team_id: Option<i64>) -> SelectQuery {
    let table = physical::EVENT_PROPERTY_SLOTS;
    let col = |name: &str, ty: DataType| {
        hidden_alias(name, column(table, Some(table), name, ty))
    };
    let mut conditions = vec![eq(
        column(table, Some(table), "slot", DataType::integer()),
        int(i64::from(slot)),
    )];
    if let Some(team) = team_id {
        conditions.push(eq(
            column(table, Some(table), "team_id", DataType::integer()),
            constant(team),
        ));
    }
    SelectQuery {
        select: vec![
            col("uuid", DataType::uuid()),
            col("value_string", DataType::string().nullable()),
            col("value_numeric", DataType::float().nullable()),
            col("value_bool", DataType::boolean().nullable()),
            col("value_datetime", DataType::datetime().nullable()),
        ],
        select_from: Some(JoinExpr::table(table)),
        where_clause: combinators::and(conditions),
        ..Default::default()
    }
}

impl ExprTransformer for PropertyExpander<'_, '_> {
    fn visit(&mut self, expr: Expr) -> CompileResult<Option<Expr>> {
        match expr {
            Expr::Field(ref field) => match PropertyRef::from_field(field)? {
                Some(prop) => self.expand(&prop).map(Some),
                None => Ok(Some(expr)),
            },
            Expr::Compare(ref cmp) => match self.optimize_map_comparison(cmp)? {
                Some(optimized) => Ok(Some(optimized)),
                None => walk_transform(self, expr),
            },
            other => walk_transform(self, other),
        }
    }

    fn visit_select(&mut self, select: SelectQuery) -> CompileResult<SelectQuery> {
        self.registries.push(JoinRegistry::for_select(&select));
        let result = walk_select_transform(self, select);
        let registry = self.registries.pop();
        let mut select = result?;
        if let Some(registry) = registry {
            if !registry.is_empty() {
                log::debug!("PropertyAccess: adding {} side-table join(s)", registry.len());
            }
            registry.splice_into(&mut select)?;
        }
        Ok(select)
    }
}

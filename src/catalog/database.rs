//! The logical schema queries are written against.
//!
//! Tables are either physical (read directly) or lazy: virtual tables that
//! only exist as a subquery built on demand by the join materializer. Fields
//! on a table can point at another lazy table, which is how `events.pdi` and
//! `events.session` become joins.

use std::collections::BTreeMap;

use crate::query_ast::{DataType, JoinType, TypeKind};

/// Virtual tables the join materializer knows how to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LazyTable {
    Persons,
    PersonDistinctIds,
    PersonDistinctIdOverrides,
    Sessions,
}

impl LazyTable {
    pub fn name(&self) -> &'static str {
        match self {
            LazyTable::Persons => "persons",
            LazyTable::PersonDistinctIds => "person_distinct_ids",
            LazyTable::PersonDistinctIdOverrides => "person_distinct_id_overrides",
            LazyTable::Sessions => "sessions",
        }
    }

    /// Field the table is joined on.
    pub fn key_field(&self) -> &'static str {
        match self {
            LazyTable::Persons => "id",
            LazyTable::PersonDistinctIds | LazyTable::PersonDistinctIdOverrides => "distinct_id",
            LazyTable::Sessions => "session_id",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LazyJoinDef {
    pub table: LazyTable,
    /// Field of the source table holding the join key.
    pub from_field: String,
    pub join_type: JoinType,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldDef {
    Column { column: String, ty: DataType },
    /// A semi-structured properties column; accessed as `<field>.<key>...`.
    Properties { column: String },
    LazyJoin(LazyJoinDef),
    /// `events.person`, resolved according to the persons-on-events mode.
    PersonTraverser,
    /// `events.person_id`, resolved according to the persons-on-events mode.
    PersonId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TableKind {
    Physical { table: String },
    Lazy(LazyTable),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableDef {
    pub name: String,
    pub kind: TableKind,
    fields: Vec<(String, FieldDef)>,
}

impl TableDef {
    fn physical(name: &str, fields: Vec<(&str, FieldDef)>) -> Self {
        Self::new(
            name,
            TableKind::Physical {
                table: name.to_string(),
            },
            fields,
        )
    }

    fn lazy(table: LazyTable, fields: Vec<(&str, FieldDef)>) -> Self {
        Self::new(table.name(), TableKind::Lazy(table), fields)
    }

    fn new(name: &str, kind: TableKind, fields: Vec<(&str, FieldDef)>) -> Self {
        TableDef {
            name: name.to_string(),
            kind,
            fields: fields
                .into_iter()
                .map(|(n, f)| (n.to_string(), f))
                .collect(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, f)| f)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    pub fn lazy_table(&self) -> Option<LazyTable> {
        match self.kind {
            TableKind::Lazy(t) => Some(t),
            TableKind::Physical { .. } => None,
        }
    }

    /// Name of the table the printer emits, for physical tables.
    pub fn physical_name(&self) -> Option<&str> {
        match &self.kind {
            TableKind::Physical { table } => Some(table),
            TableKind::Lazy(_) => None,
        }
    }
}

fn col(column: &str, ty: DataType) -> FieldDef {
    FieldDef::Column {
        column: column.to_string(),
        ty,
    }
}

fn props(column: &str) -> FieldDef {
    FieldDef::Properties {
        column: column.to_string(),
    }
}

fn lazy(table: LazyTable, from_field: &str, join_type: JoinType) -> FieldDef {
    FieldDef::LazyJoin(LazyJoinDef {
        table,
        from_field: from_field.to_string(),
        join_type,
    })
}

/// Symbol table used by the resolver. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Database {
    tables: BTreeMap<String, TableDef>,
}

impl Default for Database {
    fn default() -> Self {
        Self::standard()
    }
}

impl Database {
    pub fn new(tables: Vec<TableDef>) -> Self {
        Database {
            tables: tables.into_iter().map(|t| (t.name.clone(), t)).collect(),
        }
    }

    /// The product analytics schema: events plus the person and session
    /// virtual tables hanging off it.
    pub fn standard() -> Self {
        let string = DataType::string;
        let nullable_string = || DataType::string().nullable();
        let datetime = DataType::datetime;

        let events = TableDef::physical(
            "events",
            vec![
                ("uuid", col("uuid", DataType::uuid())),
                ("event", col("event", string())),
                ("properties", props("properties")),
                ("timestamp", col("timestamp", datetime())),
                ("distinct_id", col("distinct_id", string())),
                ("elements_chain", col("elements_chain", string())),
                ("created_at", col("created_at", datetime())),
                ("team_id", col("team_id", DataType::integer())),
                ("$session_id", col("$session_id", string())),
                ("$window_id", col("$window_id", string())),
                ("person_id", FieldDef::PersonId),
                ("person", FieldDef::PersonTraverser),
                (
                    "pdi",
                    lazy(LazyTable::PersonDistinctIds, "distinct_id", JoinType::Inner),
                ),
                (
                    "override",
                    lazy(
                        LazyTable::PersonDistinctIdOverrides,
                        "distinct_id",
                        JoinType::LeftOuter,
                    ),
                ),
                (
                    "session",
                    lazy(LazyTable::Sessions, "$session_id", JoinType::LeftOuter),
                ),
            ],
        );

        let persons = TableDef::lazy(
            LazyTable::Persons,
            vec![
                ("id", col("id", DataType::uuid())),
                ("created_at", col("created_at", datetime())),
                ("properties", props("properties")),
                ("is_identified", col("is_identified", DataType::boolean())),
            ],
        );

        let pdi_fields = |with_person: bool| {
            let mut fields = vec![
                ("distinct_id", col("distinct_id", string())),
                ("person_id", col("person_id", DataType::uuid())),
            ];
            if with_person {
                fields.push((
                    "person",
                    lazy(LazyTable::Persons, "person_id", JoinType::Inner),
                ));
            }
            fields
        };
        let pdi = TableDef::lazy(LazyTable::PersonDistinctIds, pdi_fields(true));
        let overrides = TableDef::lazy(LazyTable::PersonDistinctIdOverrides, pdi_fields(false));

        let sessions = TableDef::lazy(
            LazyTable::Sessions,
            vec![
                ("session_id", col("session_id", string())),
                ("distinct_id", col("distinct_id", string())),
                ("$start_timestamp", col("$start_timestamp", datetime())),
                ("$end_timestamp", col("$end_timestamp", datetime())),
                (
                    "$session_duration",
                    col("$session_duration", DataType::integer()),
                ),
                ("$entry_current_url", col("$entry_current_url", nullable_string())),
                ("$pageview_count", col("$pageview_count", DataType::integer())),
            ],
        );

        Database::new(vec![events, persons, pdi, overrides, sessions])
    }

    pub fn table(&self, name: &str) -> Option<&TableDef> {
        self.tables.get(name)
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }
}

/// Physical tables the lazy subqueries read. Not addressable from queries.
pub mod physical {
    pub const EVENTS: &str = "events";
    pub const PERSON: &str = "person";
    pub const PERSON_DISTINCT_ID: &str = "person_distinct_id2";
    pub const PERSON_DISTINCT_ID_OVERRIDES: &str = "person_distinct_id_overrides";
    pub const COHORT_PEOPLE: &str = "cohortpeople";
    pub const EVENT_PROPERTY_SLOTS: &str = "event_property_slots";
}

/// True for columns holding a date-time, used by the pushdown optimizer to
/// decide whether a comparison is a timestamp bound.
pub fn is_temporal(ty: &DataType) -> bool {
    matches!(ty.kind, TypeKind::DateTime | TypeKind::Date)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_schema_has_virtual_tables() {
        let db = Database::standard();
        assert_eq!(
            db.table("sessions").and_then(|t| t.lazy_table()),
            Some(LazyTable::Sessions)
        );
        assert_eq!(
            db.table("events").and_then(|t| t.physical_name()),
            Some("events")
        );
        assert!(db.table("raw_sessions").is_none());
    }

    #[test]
    fn test_events_links() {
        let db = Database::standard();
        let events = db.table("events").unwrap();
        match events.field("pdi") {
            Some(FieldDef::LazyJoin(def)) => {
                assert_eq!(def.table, LazyTable::PersonDistinctIds);
                assert_eq!(def.join_type, JoinType::Inner);
            }
            other => panic!("unexpected pdi field: {:?}", other),
        }
        assert_eq!(events.field("person"), Some(&FieldDef::PersonTraverser));
        assert!(db
            .table("person_distinct_id_overrides")
            .unwrap()
            .field("person")
            .is_none());
    }
}

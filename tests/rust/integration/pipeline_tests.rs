use hogql_compiler::config::PropertyGroupsMode;
use hogql_compiler::errors::{CompileError, QueryError};
use hogql_compiler::query_ast::builders::{boolean, constant, eq, field, null, select_from};
use hogql_compiler::query_ast::{Expr, SelectQuery};
use hogql_compiler::Dialect;

use super::harness::{param_count, Harness, SETTINGS};

const CATALOG: &str = r#"
dedicated:
  - { table: events, column: properties, key: "$browser", target: "mat_$browser" }
side_slots:
  - { table: events, column: properties, key: plan, slot: 3 }
property_groups:
  - { table: events, column: properties, map_column: properties_group_custom, rule: { exclude_prefix: "$" } }
property_types:
  - { table: events, key: is_admin, type: Boolean }
"#;

fn events_where(items: Vec<Expr>, filter: Expr) -> SelectQuery {
    SelectQuery {
        where_clause: Some(filter),
        ..select_from("events", items)
    }
}

#[test]
fn test_simple_select_gets_team_guard_limit_and_settings() {
    let h = Harness::new();
    let printed = h
        .compile(&select_from("events", vec![field(&["event"])]), Dialect::ClickHouse)
        .unwrap();
    assert_eq!(
        printed.sql,
        format!(
            "SELECT events.event AS event FROM events WHERE equals(events.team_id, 1) LIMIT 100{}",
            SETTINGS
        )
    );
    assert_eq!(printed.columns, vec!["event"]);
    assert!(printed.params.is_empty());
}

#[test]
fn test_user_filter_is_combined_with_team_guard() {
    let h = Harness::new();
    let select = events_where(vec![field(&["event"])], eq(field(&["event"]), constant("$pageview")));
    let printed = h.compile(&select, Dialect::ClickHouse).unwrap();
    assert!(printed.sql.contains(
        "WHERE and(equals(events.event, %(hogql_val_0)s), equals(events.team_id, 1))"
    ));
    assert_eq!(
        printed.params.get("hogql_val_0"),
        Some(&serde_json::json!("$pageview"))
    );
}

#[test]
fn test_person_property_filter_is_pushed_into_person_join() {
    let h = Harness::new();
    let select = events_where(
        vec![field(&["event"])],
        eq(field(&["person", "properties", "email"]), constant("a@x.com")),
    );
    let printed = h.compile(&select, Dialect::ClickHouse).unwrap();

    assert!(printed.sql.contains("INNER JOIN (SELECT"));
    assert!(printed.sql.contains("AS events__pdi ON"));
    assert!(printed.sql.contains("AS events__pdi__person ON"));
    // Once in the outer WHERE, at least once inside the person subquery.
    assert!(param_count(&printed, &serde_json::json!("a@x.com")) >= 2);

    let mut unoptimized = Harness::new();
    unoptimized.modifiers.optimize_joined_filters = false;
    let printed = unoptimized.compile(&select, Dialect::ClickHouse).unwrap();
    assert_eq!(param_count(&printed, &serde_json::json!("a@x.com")), 1);
}

#[test]
fn test_lazy_table_in_from_is_replaced_by_subquery() {
    let h = Harness::new();
    let sql = h.sql(
        &select_from("persons", vec![field(&["properties", "email"])]),
        Dialect::ClickHouse,
    );
    assert!(sql.starts_with("SELECT persons.properties___email AS email FROM (SELECT"));
    assert!(sql.contains(") AS persons"));
    assert!(!sql.contains("FROM persons"));
}

#[test]
fn test_dedicated_column_wins_over_json() {
    let h = Harness::with_catalog(CATALOG);
    let sql = h.sql(
        &select_from("events", vec![field(&["properties", "$browser"])]),
        Dialect::ClickHouse,
    );
    assert!(sql.contains("events.`mat_$browser`"));
    assert!(!sql.contains("JSONExtractRaw"));
}

#[test]
fn test_dedicated_column_wins_over_property_group() {
    let catalog = CATALOG.replacen(
        "dedicated:\n",
        "dedicated:\n  - { table: events, column: properties, key: company, target: mat_company }\n",
        1,
    );
    let mut h = Harness::with_catalog(&catalog);
    h.modifiers.property_groups_mode = PropertyGroupsMode::Optimized;
    let sql = h.sql(
        &events_where(
            vec![field(&["properties", "company"])],
            eq(field(&["properties", "company"]), constant("acme")),
        ),
        Dialect::ClickHouse,
    );
    assert!(sql.contains("events.mat_company AS company"));
    assert!(sql.contains("events.mat_company, %(hogql_val_"));
    assert!(!sql.contains("properties_group_custom"));

    // Without the dedicated column the same key reads the group map.
    let mut h = Harness::with_catalog(CATALOG);
    h.modifiers.property_groups_mode = PropertyGroupsMode::Optimized;
    let sql = h.sql(
        &select_from("events", vec![field(&["properties", "company"])]),
        Dialect::ClickHouse,
    );
    assert!(sql.contains("properties_group_custom"));
}

#[test]
fn test_unmaterialized_property_reads_json() {
    let h = Harness::with_catalog(CATALOG);
    let printed = h
        .compile(
            &select_from("events", vec![field(&["properties", "$os"])]),
            Dialect::ClickHouse,
        )
        .unwrap();
    assert!(printed.sql.contains("replaceRegexpAll(nullIf(nullIf(JSONExtractRaw(events.properties"));
    assert_eq!(param_count(&printed, &serde_json::json!("$os")), 1);
    assert_eq!(printed.columns, vec!["$os"]);
}

#[test]
fn test_side_table_slot_is_joined() {
    let h = Harness::with_catalog(CATALOG);
    let sql = h.sql(
        &select_from("events", vec![field(&["properties", "plan"])]),
        Dialect::ClickHouse,
    );
    assert!(sql.contains("LEFT OUTER JOIN (SELECT"));
    assert!(sql.contains("events__slot_3.value_string"));
}

#[test]
fn test_boolean_property_comparisons() {
    let h = Harness::with_catalog(CATALOG);
    let is_admin = || field(&["properties", "is_admin"]);

    // The read maps the raw strings onto booleans; NULL compares unequal.
    let sql = h.sql(
        &events_where(vec![field(&["event"])], eq(is_admin(), boolean(true))),
        Dialect::ClickHouse,
    );
    assert!(sql.contains("ifNull(equals(transform(toString(replaceRegexpAll("));

    let sql = h.sql(
        &events_where(vec![field(&["event"])], eq(is_admin(), boolean(false))),
        Dialect::ClickHouse,
    );
    assert!(sql.contains("ifNull(equals(transform(toString(replaceRegexpAll("));

    let sql = h.sql(
        &events_where(vec![field(&["event"])], eq(is_admin(), null())),
        Dialect::ClickHouse,
    );
    assert!(sql.contains("isNull(transform(toString("));
}

#[test]
fn test_unknown_field_suggests_nearest() {
    let h = Harness::new();
    let err = h
        .compile(&select_from("events", vec![field(&["evnt"])]), Dialect::ClickHouse)
        .unwrap_err();
    assert!(err.is_query_error());
    assert_eq!(
        err,
        CompileError::Query(QueryError::UnresolvedField {
            chain: "evnt".into(),
            suggestion: Some("event".into()),
        })
    );
    assert!(err.to_string().contains("Did you mean `event`?"));
}

#[test]
fn test_compiling_twice_is_identical() {
    let h = Harness::with_catalog(CATALOG);
    let select = events_where(
        vec![field(&["person", "properties", "email"]), field(&["properties", "plan"])],
        eq(field(&["session", "$session_duration"]), constant(30_i64)),
    );
    let first = h.compile(&select, Dialect::ClickHouse).unwrap();
    let second = h.compile(&select, Dialect::ClickHouse).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_ast_from_json() {
    let h = Harness::new();
    let select = select_from("events", vec![field(&["event"])]);
    let json = serde_json::to_string(&select).unwrap();
    let parsed: SelectQuery = serde_json::from_str(&json).unwrap();
    assert_eq!(
        h.sql(&parsed, Dialect::ClickHouse),
        h.sql(&select, Dialect::ClickHouse)
    );
}

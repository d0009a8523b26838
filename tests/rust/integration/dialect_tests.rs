use hogql_compiler::errors::{CompileError, QueryError};
use hogql_compiler::query_ast::builders::{constant, eq, field, int, not_eq, select_from};
use hogql_compiler::query_ast::{SampleClause, SampleRatio, SelectQuery};
use hogql_compiler::Dialect;

use super::harness::Harness;

#[test]
fn test_postgres_output_has_no_settings() {
    let h = Harness::new();
    let sql = h.sql(&select_from("events", vec![field(&["event"])]), Dialect::Postgres);
    assert_eq!(
        sql,
        "SELECT events.event AS event FROM events WHERE (events.team_id = 1) LIMIT 100"
    );
}

#[test]
fn test_nullable_inequality_per_dialect() {
    let h = Harness::new();
    let select = SelectQuery {
        where_clause: Some(not_eq(field(&["properties", "$browser"]), constant("Safari"))),
        ..select_from("events", vec![field(&["event"])])
    };

    let ch = h.sql(&select, Dialect::ClickHouse);
    assert!(ch.contains("ifNull(notEquals(replaceRegexpAll("));
    assert!(ch.contains("), 1)"));

    let hogql = h.sql(&select, Dialect::HogQL);
    assert_eq!(
        hogql,
        "SELECT event FROM events WHERE properties.$browser != 'Safari'"
    );
}

#[test]
fn test_sampling_is_rejected_on_postgres() {
    let h = Harness::new();
    let mut select = select_from("events", vec![field(&["event"])]);
    if let Some(from) = select.select_from.as_mut() {
        from.sample = Some(SampleClause {
            ratio: SampleRatio {
                numerator: 1,
                denominator: Some(10),
            },
            offset: None,
        });
    }

    match h.compile(&select, Dialect::Postgres) {
        Err(CompileError::Query(QueryError::UnsupportedFeature { feature, dialect })) => {
            assert_eq!(feature, "SAMPLE");
            assert_eq!(dialect, Dialect::Postgres);
        }
        other => panic!("expected UnsupportedFeature, got {:?}", other),
    }
    assert!(h.sql(&select, Dialect::ClickHouse).contains("FROM events SAMPLE 1/10"));
}

#[test]
fn test_limit_is_capped() {
    let mut h = Harness::new();
    h.settings.max_limit = 500;
    let select = SelectQuery {
        limit: Some(int(1_000_000)),
        ..select_from("events", vec![field(&["event"])])
    };
    assert!(h.sql(&select, Dialect::ClickHouse).contains(" LIMIT 500 SETTINGS"));
    assert!(h.sql(&select, Dialect::Postgres).ends_with(" LIMIT 500"));
}

#[test]
fn test_output_format_is_validated() {
    let mut h = Harness::new();
    h.settings.output_format = Some("JSONEachRow".to_string());
    let select = select_from("events", vec![field(&["event"])]);
    assert!(h.sql(&select, Dialect::ClickHouse).ends_with(" FORMAT JSONEachRow"));

    h.settings.output_format = Some("JSON; DROP TABLE events".to_string());
    assert!(matches!(
        h.compile(&select, Dialect::ClickHouse),
        Err(CompileError::Query(QueryError::InvalidQuery(_)))
    ));
}

#[test]
fn test_hogql_prints_source_form() {
    let h = Harness::new();
    let select = SelectQuery {
        where_clause: Some(eq(field(&["event"]), constant("it's"))),
        ..select_from("events", vec![field(&["event"]), field(&["person", "properties", "email"])])
    };
    let printed = h.compile(&select, Dialect::HogQL).unwrap();
    assert_eq!(
        printed.sql,
        "SELECT event, person.properties.email FROM events WHERE event = 'it\\'s'"
    );
    assert!(printed.params.is_empty());
    assert_eq!(printed.columns, vec!["event", "email"]);
}

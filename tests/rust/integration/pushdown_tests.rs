use chrono::{TimeZone, Utc};
use hogql_compiler::config::SessionTableVersion;
use hogql_compiler::query_ast::builders::{boolean, compare, constant, eq, field, or, select_from};
use hogql_compiler::query_ast::{CompareOperator, Expr, JoinExpr, JoinType, SelectQuery};
use hogql_compiler::Dialect;

use super::harness::{param_count, Harness};

fn events_where(filter: Expr) -> SelectQuery {
    SelectQuery {
        where_clause: Some(filter),
        ..select_from("events", vec![field(&["event"])])
    }
}

fn email(value: &str) -> Expr {
    eq(field(&["person", "properties", "email"]), constant(value))
}

fn session_started_since(year: i32, month: u32, day: u32) -> Expr {
    compare(
        CompareOperator::GtEq,
        field(&["session", "$start_timestamp"]),
        constant(Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()),
    )
}

#[test]
fn test_or_of_pushable_branches_is_pushed() {
    let h = Harness::new();
    let printed = h
        .compile(&events_where(or(vec![email("a"), email("b")])), Dialect::ClickHouse)
        .unwrap();
    assert!(param_count(&printed, &serde_json::json!("a")) >= 2);
    assert!(param_count(&printed, &serde_json::json!("b")) >= 2);
}

#[test]
fn test_or_false_still_pushes() {
    let h = Harness::new();
    let printed = h
        .compile(&events_where(or(vec![email("a"), boolean(false)])), Dialect::ClickHouse)
        .unwrap();
    assert!(param_count(&printed, &serde_json::json!("a")) >= 2);
}

#[test]
fn test_or_true_pushes_nothing() {
    let h = Harness::new();
    let printed = h
        .compile(&events_where(or(vec![email("a"), boolean(true)])), Dialect::ClickHouse)
        .unwrap();
    assert_eq!(param_count(&printed, &serde_json::json!("a")), 1);
}

#[test]
fn test_or_with_outer_only_branch_is_not_pushed() {
    let h = Harness::new();
    let filter = or(vec![email("a"), eq(field(&["event"]), constant("$pageview"))]);
    let printed = h.compile(&events_where(filter), Dialect::ClickHouse).unwrap();
    assert_eq!(param_count(&printed, &serde_json::json!("a")), 1);
}

#[test]
fn test_session_start_bound_is_widened_onto_v2_partition_key() {
    let h = Harness::new();
    assert_eq!(h.modifiers.session_table_version, SessionTableVersion::V2);
    let printed = h
        .compile(&events_where(session_started_since(2024, 1, 10)), Dialect::ClickHouse)
        .unwrap();

    assert!(printed.sql.contains(
        "greaterOrEquals(fromUnixTimestamp(intDiv(toUInt64(bitShiftRight(raw_sessions.session_id_v7, 80)), 1000)), %(hogql_val_"
    ));
    // Three days of lookback before the requested bound.
    assert_eq!(
        param_count(&printed, &serde_json::json!("2024-01-07 00:00:00.000000")),
        1
    );
    assert_eq!(
        param_count(&printed, &serde_json::json!("2024-01-10 00:00:00.000000")),
        1
    );
}

#[test]
fn test_session_lookback_follows_modifier() {
    let mut h = Harness::new();
    h.modifiers.session_table_version = SessionTableVersion::V3;
    h.modifiers.session_lookback_days = 1;
    let printed = h
        .compile(&events_where(session_started_since(2024, 1, 10)), Dialect::ClickHouse)
        .unwrap();
    assert!(printed.sql.contains("greaterOrEquals(raw_sessions_v3.session_timestamp, %(hogql_val_"));
    assert_eq!(
        param_count(&printed, &serde_json::json!("2024-01-09 00:00:00.000000")),
        1
    );
}

#[test]
fn test_outer_filter_always_survives() {
    // Pushing is an optimization only: the full predicate still runs outside.
    let h = Harness::new();
    let sql = h.sql(&events_where(email("a")), Dialect::ClickHouse);
    let outer_where = sql.rfind(" WHERE ").unwrap();
    assert!(sql[outer_where..].contains("events__pdi__person.properties___email"));
}

#[test]
fn test_nothing_is_pushed_past_right_or_full_joins() {
    let h = Harness::new();
    for join_type in [JoinType::Inner, JoinType::RightOuter, JoinType::FullOuter] {
        let other = JoinExpr {
            join_type: Some(join_type),
            alias: Some("o".to_string()),
            constraint: Some(eq(field(&["e", "uuid"]), field(&["o", "uuid"]))),
            ..JoinExpr::table("events")
        };
        let select = SelectQuery {
            select: vec![field(&["o", "event"])],
            select_from: Some(JoinExpr {
                alias: Some("e".to_string()),
                next_join: Some(Box::new(other)),
                ..JoinExpr::table("events")
            }),
            where_clause: Some(eq(field(&["e", "person", "properties", "email"]), constant("a"))),
            ..Default::default()
        };
        let printed = h.compile(&select, Dialect::ClickHouse).unwrap();
        let pushed = printed.sql.contains("where_optimization");
        assert_eq!(pushed, join_type == JoinType::Inner, "{:?}: {}", join_type, printed.sql);
        if join_type != JoinType::Inner {
            assert_eq!(param_count(&printed, &serde_json::json!("a")), 1);
            assert!(printed.sql.contains("or(equals(e.team_id, 1), isNull(e.team_id))"));
        }
    }
}

use hogql_compiler::sql_generator::NullSafety;
use hogql_compiler::Dialect;
use test_case::test_case;

#[test_case("clickhouse", Dialect::ClickHouse ; "full clickhouse name")]
#[test_case("CH", Dialect::ClickHouse ; "short clickhouse name")]
#[test_case("postgresql", Dialect::Postgres ; "full postgres name")]
#[test_case("Postgres", Dialect::Postgres ; "mixed case postgres")]
#[test_case("pg", Dialect::Postgres ; "short postgres name")]
#[test_case("HogQL", Dialect::HogQL ; "hogql")]
fn test_dialect_names(name: &str, expected: Dialect) {
    assert_eq!(name.parse::<Dialect>(), Ok(expected));
}

#[test]
fn test_unknown_dialect_message() {
    let err = "mysql".parse::<Dialect>().unwrap_err();
    assert!(err.to_string().contains("`mysql`"));
}

#[test]
fn test_display_parses_back() {
    for dialect in [Dialect::ClickHouse, Dialect::Postgres, Dialect::HogQL] {
        assert_eq!(dialect.to_string().parse::<Dialect>(), Ok(dialect));
    }
}

#[test_case(Dialect::ClickHouse, NullSafety::IfNullWrapping)]
#[test_case(Dialect::Postgres, NullSafety::DistinctFrom)]
#[test_case(Dialect::HogQL, NullSafety::Source)]
fn test_null_safety_strategy(dialect: Dialect, expected: NullSafety) {
    assert_eq!(dialect.capabilities().null_safety, expected);
}

#[test]
fn test_dialect_serializes_lowercase() {
    assert_eq!(
        serde_json::to_string(&Dialect::ClickHouse).unwrap(),
        "\"clickhouse\""
    );
    let parsed: Dialect = serde_json::from_str("\"postgres\"").unwrap();
    assert_eq!(parsed, Dialect::Postgres);
}

use hogql_compiler::catalog::{CatalogError, KeyRule, MaterializationCatalog, PropertyType};
use test_case::test_case;

#[test_case(None, None, "anything", true ; "empty rule matches all")]
#[test_case(Some("$feature/"), None, "$feature/beta", true ; "prefix match")]
#[test_case(Some("$feature/"), None, "$browser", false ; "prefix mismatch")]
#[test_case(None, Some("$"), "plan", true ; "custom key kept")]
#[test_case(None, Some("$"), "$browser", false ; "system key excluded")]
fn test_key_rules(prefix: Option<&str>, exclude_prefix: Option<&str>, key: &str, expected: bool) {
    let rule = KeyRule {
        prefix: prefix.map(str::to_string),
        exclude_prefix: exclude_prefix.map(str::to_string),
    };
    assert_eq!(rule.matches(key), expected);
}

#[test]
fn test_duplicate_dedicated_column_rejected() {
    let yaml = r#"
dedicated:
  - { table: events, column: properties, key: "$browser", target: "mat_$browser" }
  - { table: events, column: properties, key: "$browser", target: "mat_browser_2" }
"#;
    assert!(matches!(
        MaterializationCatalog::from_yaml_str(yaml),
        Err(CatalogError::DuplicateEntry { .. })
    ));
}

#[test]
fn test_empty_target_rejected() {
    let yaml = r#"
dedicated:
  - { table: events, column: properties, key: "$os", target: "" }
"#;
    assert!(matches!(
        MaterializationCatalog::from_yaml_str(yaml),
        Err(CatalogError::InvalidEntry { .. })
    ));
}

#[test]
fn test_malformed_yaml_is_parse_error() {
    assert!(matches!(
        MaterializationCatalog::from_yaml_str("dedicated: [ {"),
        Err(CatalogError::ParseError { .. })
    ));
}

#[test]
fn test_missing_file_is_read_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        MaterializationCatalog::from_yaml_file(dir.path().join("missing.yaml")),
        Err(CatalogError::ReadError { .. })
    ));
}

#[test]
fn test_property_type_column_defaults_to_properties() {
    let yaml = r#"
property_types:
  - { table: events, key: revenue, type: Numeric }
  - { table: person, column: properties, key: signed_up, type: DateTime }
"#;
    let catalog = MaterializationCatalog::from_yaml_str(yaml).unwrap();
    assert_eq!(
        catalog.property_type("events", "properties", "revenue"),
        Some(PropertyType::Numeric)
    );
    assert_eq!(
        catalog.property_type("person", "properties", "signed_up"),
        Some(PropertyType::DateTime)
    );
    assert_eq!(catalog.property_type("events", "properties", "signed_up"), None);
}

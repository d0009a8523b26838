use std::env;
use std::io::Write;

use hogql_compiler::config::{
    CompileSettings, CompilerConfig, ConfigError, PropertyGroupsMode, SessionTableVersion,
};
use serial_test::serial;

fn yaml_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_partial_yaml_keeps_defaults() {
    let file = yaml_file("modifiers:\n  session_table_version: v1\n");
    let config = CompilerConfig::from_yaml_file(file.path()).unwrap();
    assert_eq!(config.modifiers.session_table_version, SessionTableVersion::V1);
    assert_eq!(config.modifiers.property_groups_mode, PropertyGroupsMode::Disabled);
    assert_eq!(config.settings, CompileSettings::default());
}

#[test]
fn test_yaml_values_are_validated() {
    let file = yaml_file("modifiers:\n  session_lookback_days: 90\n");
    assert!(matches!(
        CompilerConfig::from_yaml_file(file.path()),
        Err(ConfigError::Validation(_))
    ));

    let file = yaml_file("settings:\n  max_limit: 10\n  default_limit: 20\n");
    assert!(matches!(
        CompilerConfig::from_yaml_file(file.path()),
        Err(ConfigError::Validation(_))
    ));
}

#[test]
fn test_unknown_mode_in_yaml_is_parse_error() {
    let file = yaml_file("modifiers:\n  property_groups_mode: sometimes\n");
    assert!(matches!(
        CompilerConfig::from_yaml_file(file.path()),
        Err(ConfigError::Parse { .. })
    ));
}

#[test]
#[serial]
fn test_settings_from_env() {
    env::set_var("HOGQL_MAX_LIMIT", "2000");
    env::set_var("HOGQL_OUTPUT_FORMAT", "TabSeparated");
    let settings = CompileSettings::from_env();
    env::remove_var("HOGQL_MAX_LIMIT");
    env::remove_var("HOGQL_OUTPUT_FORMAT");

    let settings = settings.unwrap();
    assert_eq!(settings.max_limit, 2000);
    assert_eq!(settings.default_limit, 100);
    assert_eq!(settings.output_format.as_deref(), Some("TabSeparated"));
}

#[test]
#[serial]
fn test_env_limits_are_validated() {
    env::set_var("HOGQL_MAX_EXECUTION_TIME", "0");
    let result = CompileSettings::from_env();
    env::remove_var("HOGQL_MAX_EXECUTION_TIME");
    assert!(matches!(result, Err(ConfigError::Validation(_))));
}

#[test]
#[serial]
fn test_config_from_env_defaults() {
    let config = CompilerConfig::from_env().unwrap();
    assert_eq!(config, CompilerConfig::default());
}

#[test]
#[serial]
fn test_expression_depth_limit_from_env_is_validated() {
    env::set_var("HOGQL_MAX_EXPR_DEPTH", "100000");
    let result = CompileSettings::from_env();
    env::remove_var("HOGQL_MAX_EXPR_DEPTH");
    assert!(matches!(result, Err(ConfigError::Validation(_))));

    let file = yaml_file("settings:\n  max_expr_depth: 64\n");
    let config = CompilerConfig::from_yaml_file(file.path()).unwrap();
    assert_eq!(config.settings.max_expr_depth, 64);
}

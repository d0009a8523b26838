use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use thiserror::Error;
use validator::{Validate, ValidationError};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    #[error("Parse error for {field}: {value} - {source}")]
    Parse {
        field: String,
        value: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("unknown {kind} `{value}`")]
pub struct UnknownModeError {
    kind: &'static str,
    value: String,
}

/// How person data is reached from events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonsOnEventsMode {
    /// Through `events.pdi.person`.
    #[default]
    Disabled,
    /// Person id taken from the override table when present, persons joined on it.
    PersonIdOverridePropertiesJoined,
    /// Denormalized person columns on the events table; no join.
    PersonIdNoOverridePropertiesOnEvents,
}

impl FromStr for PersonsOnEventsMode {
    type Err = UnknownModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disabled" => Ok(Self::Disabled),
            "person_id_override_properties_joined" => Ok(Self::PersonIdOverridePropertiesJoined),
            "person_id_no_override_properties_on_events" => {
                Ok(Self::PersonIdNoOverridePropertiesOnEvents)
            }
            other => Err(UnknownModeError {
                kind: "persons-on-events mode",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionTableVersion {
    V1,
    #[default]
    V2,
    V3,
}

impl FromStr for SessionTableVersion {
    type Err = UnknownModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "v1" => Ok(Self::V1),
            "v2" => Ok(Self::V2),
            "v3" => Ok(Self::V3),
            other => Err(UnknownModeError {
                kind: "session table version",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyGroupsMode {
    #[default]
    Disabled,
    /// Map columns used for reads.
    Enabled,
    /// Map columns used for reads, with index-friendly comparison rewrites.
    Optimized,
}

impl FromStr for PropertyGroupsMode {
    type Err = UnknownModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disabled" => Ok(Self::Disabled),
            "enabled" => Ok(Self::Enabled),
            "optimized" => Ok(Self::Optimized),
            other => Err(UnknownModeError {
                kind: "property groups mode",
                value: other.to_string(),
            }),
        }
    }
}

/// Per-query switches that change how the logical schema maps to storage.
#[derive(Clone, Debug, PartialEq, Validate, Serialize, Deserialize)]
#[serde(default)]
pub struct Modifiers {
    pub persons_on_events_mode: PersonsOnEventsMode,

    pub session_table_version: SessionTableVersion,

    pub property_groups_mode: PropertyGroupsMode,

    /// Push WHERE predicates into lazy-join subqueries
    pub optimize_joined_filters: bool,

    /// Widening applied to session timestamp bounds pushed onto the
    /// partition key (days)
    #[validate(range(
        min = 1,
        max = 30,
        message = "Session lookback must be between 1 and 30 days"
    ))]
    pub session_lookback_days: u32,
}

impl Default for Modifiers {
    fn default() -> Self {
        Self {
            persons_on_events_mode: PersonsOnEventsMode::default(),
            session_table_version: SessionTableVersion::default(),
            property_groups_mode: PropertyGroupsMode::default(),
            optimize_joined_filters: true,
            session_lookback_days: 3,
        }
    }
}

impl Modifiers {
    /// Create modifiers from environment variables with validation
    pub fn from_env() -> Result<Self, ConfigError> {
        let modifiers = Self {
            persons_on_events_mode: parse_env_var("HOGQL_PERSONS_ON_EVENTS_MODE", "disabled")?,
            session_table_version: parse_env_var("HOGQL_SESSION_TABLE_VERSION", "v2")?,
            property_groups_mode: parse_env_var("HOGQL_PROPERTY_GROUPS_MODE", "disabled")?,
            optimize_joined_filters: parse_env_var("HOGQL_OPTIMIZE_JOINED_FILTERS", "true")?,
            session_lookback_days: parse_env_var("HOGQL_SESSION_LOOKBACK_DAYS", "3")?,
        };

        modifiers.validate()?;
        Ok(modifiers)
    }
}

/// Execution limits and output shaping.
#[derive(Clone, Debug, PartialEq, Validate, Serialize, Deserialize)]
#[serde(default)]
#[validate(schema(function = "validate_limits"))]
pub struct CompileSettings {
    /// Hard ceiling on the top-level LIMIT
    #[validate(range(min = 1, message = "Max limit must be at least 1"))]
    pub max_limit: u64,

    /// LIMIT applied when the query has none
    #[validate(range(min = 1, message = "Default limit must be at least 1"))]
    pub default_limit: u64,

    /// Seconds; emitted as `max_execution_time` on ClickHouse
    #[validate(range(
        min = 1,
        max = 3600,
        message = "Max execution time must be between 1 and 3600 seconds"
    ))]
    pub max_execution_time: u32,

    /// Optional `FORMAT` clause appended on ClickHouse
    pub output_format: Option<String>,

    #[validate(range(min = 1, message = "Max AST nodes must be at least 1"))]
    pub max_ast_nodes: usize,

    #[validate(range(
        min = 1,
        max = 256,
        message = "Max subquery depth must be between 1 and 256"
    ))]
    pub max_subquery_depth: usize,

    /// Deepest expression nesting accepted; every pass recurses per level
    #[validate(range(
        min = 8,
        max = 2048,
        message = "Max expression depth must be between 8 and 2048"
    ))]
    pub max_expr_depth: usize,
}

impl Default for CompileSettings {
    fn default() -> Self {
        Self {
            max_limit: 50_000,
            default_limit: 100,
            max_execution_time: 60,
            output_format: None,
            max_ast_nodes: 100_000,
            max_subquery_depth: 32,
            max_expr_depth: 512,
        }
    }
}

fn validate_limits(settings: &CompileSettings) -> Result<(), ValidationError> {
    if settings.default_limit > settings.max_limit {
        let mut err = ValidationError::new("default_limit_exceeds_max");
        err.message = Some("Default limit cannot exceed max limit".into());
        return Err(err);
    }
    Ok(())
}

impl CompileSettings {
    /// Create settings from environment variables with validation
    pub fn from_env() -> Result<Self, ConfigError> {
        let settings = Self {
            max_limit: parse_env_var("HOGQL_MAX_LIMIT", "50000")?,
            default_limit: parse_env_var("HOGQL_DEFAULT_LIMIT", "100")?,
            max_execution_time: parse_env_var("HOGQL_MAX_EXECUTION_TIME", "60")?,
            output_format: env::var("HOGQL_OUTPUT_FORMAT").ok().filter(|f| !f.is_empty()),
            max_ast_nodes: parse_env_var("HOGQL_MAX_AST_NODES", "100000")?,
            max_subquery_depth: parse_env_var("HOGQL_MAX_SUBQUERY_DEPTH", "32")?,
            max_expr_depth: parse_env_var("HOGQL_MAX_EXPR_DEPTH", "512")?,
        };

        settings.validate()?;
        Ok(settings)
    }
}

/// Modifiers and settings as one YAML document:
///
/// ```yaml
/// modifiers:
///   session_table_version: v3
/// settings:
///   max_limit: 1000
/// ```
#[derive(Clone, Debug, Default, PartialEq, Validate, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    #[validate(nested)]
    pub modifiers: Modifiers,
    #[validate(nested)]
    pub settings: CompileSettings,
}

impl CompilerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            modifiers: Modifiers::from_env()?,
            settings: CompileSettings::from_env()?,
        })
    }

    /// Create configuration from YAML file
    pub fn from_yaml_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Parse {
            field: "yaml_file".to_string(),
            value: "file read failed".to_string(),
            source: Box::new(e),
        })?;

        let config: Self = serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
            field: "yaml_content".to_string(),
            value: content,
            source: Box::new(e),
        })?;

        config.validate()?;
        Ok(config)
    }
}

/// Parse an environment variable with a default value
fn parse_env_var<T: FromStr>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = env::var(key).unwrap_or_else(|_| default.to_string());
    value.parse().map_err(|e| ConfigError::Parse {
        field: key.to_string(),
        value,
        source: Box::new(e),
    })
}

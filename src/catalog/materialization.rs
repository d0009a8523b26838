//! Physical storage metadata for semi-structured properties.
//!
//! Describes where a given `(table, properties column, key)` actually lives:
//! a promoted (dedicated) column, a slot in the typed side table, a bucketed
//! map column, or nowhere special (the JSON blob). Loaded from YAML:
//!
//! ```yaml
//! dedicated:
//!   - { table: events, column: properties, key: "$browser", target: "mat_$browser", nullable: true }
//! side_slots:
//!   - { table: events, column: properties, key: plan, slot: 3 }
//! property_groups:
//!   - { table: events, column: properties, map_column: properties_group_feature_flags,
//!       rule: { prefix: "$feature/" } }
//!   - { table: events, column: properties, map_column: properties_group_custom,
//!       rule: { exclude_prefix: "$" } }
//! property_types:
//!   - { table: events, key: is_paid, type: Boolean }
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::errors::CatalogError;

/// A property promoted to its own column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedicatedColumn {
    pub table: String,
    pub column: String,
    pub key: String,
    /// Physical column name.
    pub target: String,
    #[serde(default = "default_true")]
    pub nullable: bool,
}

/// A property stored in the typed, slot-indexed side table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideTableSlot {
    pub table: String,
    pub column: String,
    pub key: String,
    pub slot: u32,
}

/// Which keys a property group holds.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KeyRule {
    /// Only keys starting with this prefix.
    #[serde(default)]
    pub prefix: Option<String>,
    /// Only keys not starting with this prefix.
    #[serde(default)]
    pub exclude_prefix: Option<String>,
}

impl KeyRule {
    pub fn matches(&self, key: &str) -> bool {
        let included = self.prefix.as_deref().is_none_or(|p| key.starts_with(p));
        let excluded = self
            .exclude_prefix
            .as_deref()
            .is_some_and(|p| key.starts_with(p));
        included && !excluded
    }
}

/// A bucketed `Map(String, String)` column holding a subset of keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyGroup {
    pub table: String,
    pub column: String,
    pub map_column: String,
    #[serde(default)]
    pub rule: KeyRule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyType {
    String,
    Numeric,
    Boolean,
    DateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyTypeDef {
    pub table: String,
    #[serde(default = "default_properties_column")]
    pub column: String,
    pub key: String,
    #[serde(rename = "type")]
    pub property_type: PropertyType,
}

fn default_true() -> bool {
    true
}

fn default_properties_column() -> String {
    "properties".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MaterializationCatalog {
    #[serde(default)]
    pub dedicated: Vec<DedicatedColumn>,
    #[serde(default)]
    pub side_slots: Vec<SideTableSlot>,
    /// Checked in order; the first group whose rule matches a key owns it.
    #[serde(default)]
    pub property_groups: Vec<PropertyGroup>,
    #[serde(default)]
    pub property_types: Vec<PropertyTypeDef>,
}

impl MaterializationCatalog {
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let contents = fs::read_to_string(path).map_err(|e| CatalogError::ReadError {
            error: e.to_string(),
        })?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, CatalogError> {
        let catalog: Self = serde_yaml::from_str(yaml).map_err(|e| CatalogError::ParseError {
            error: e.to_string(),
        })?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Rejects entries that would make strategy selection ambiguous.
    pub fn validate(&self) -> Result<(), CatalogError> {
        let mut seen = HashSet::new();
        for d in &self.dedicated {
            if d.target.is_empty() {
                return Err(CatalogError::InvalidEntry {
                    table: d.table.clone(),
                    column: d.column.clone(),
                    message: format!("dedicated column for `{}` has an empty target", d.key),
                });
            }
            if !seen.insert((&d.table, &d.column, &d.key)) {
                return Err(duplicate("dedicated", &d.table, &d.column, &d.key));
            }
        }

        seen.clear();
        let mut slots = HashSet::new();
        for s in &self.side_slots {
            if !seen.insert((&s.table, &s.column, &s.key)) {
                return Err(duplicate("side slot", &s.table, &s.column, &s.key));
            }
            if !slots.insert((&s.table, s.slot)) {
                return Err(CatalogError::InvalidEntry {
                    table: s.table.clone(),
                    column: s.column.clone(),
                    message: format!("slot {} is assigned to more than one key", s.slot),
                });
            }
        }

        for g in &self.property_groups {
            if g.map_column.is_empty() {
                return Err(CatalogError::InvalidEntry {
                    table: g.table.clone(),
                    column: g.column.clone(),
                    message: "property group has an empty map column".to_string(),
                });
            }
        }

        seen.clear();
        for t in &self.property_types {
            if !seen.insert((&t.table, &t.column, &t.key)) {
                return Err(duplicate("property type", &t.table, &t.column, &t.key));
            }
        }
        Ok(())
    }

    pub fn dedicated(&self, table: &str, column: &str, key: &str) -> Option<&DedicatedColumn> {
        self.dedicated
            .iter()
            .find(|d| d.table == table && d.column == column && d.key == key)
    }

    pub fn side_slot(&self, table: &str, column: &str, key: &str) -> Option<&SideTableSlot> {
        self.side_slots
            .iter()
            .find(|s| s.table == table && s.column == column && s.key == key)
    }

    pub fn property_group(&self, table: &str, column: &str, key: &str) -> Option<&PropertyGroup> {
        self.property_groups
            .iter()
            .find(|g| g.table == table && g.column == column && g.rule.matches(key))
    }

    pub fn property_type(&self, table: &str, column: &str, key: &str) -> Option<PropertyType> {
        self.property_types
            .iter()
            .find(|t| t.table == table && t.column == column && t.key == key)
            .map(|t| t.property_type)
    }
}

fn duplicate(kind: &'static str, table: &str, column: &str, key: &str) -> CatalogError {
    CatalogError::DuplicateEntry {
        kind,
        table: table.to_string(),
        column: column.to_string(),
        key: key.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"
dedicated:
  - { table: events, column: properties, key: "$browser", target: "mat_$browser" }
side_slots:
  - { table: events, column: properties, key: plan, slot: 3 }
property_groups:
  - { table: events, column: properties, map_column: properties_group_feature_flags, rule: { prefix: "$feature/" } }
  - { table: events, column: properties, map_column: properties_group_custom, rule: { exclude_prefix: "$" } }
property_types:
  - { table: events, key: is_paid, type: Boolean }
"#;

    #[test]
    fn test_parse_yaml() {
        let catalog = MaterializationCatalog::from_yaml_str(CATALOG).unwrap();
        let d = catalog.dedicated("events", "properties", "$browser").unwrap();
        assert_eq!(d.target, "mat_$browser");
        assert!(d.nullable);
        assert_eq!(catalog.side_slot("events", "properties", "plan").unwrap().slot, 3);
        assert_eq!(
            catalog.property_type("events", "properties", "is_paid"),
            Some(PropertyType::Boolean)
        );
    }

    #[test]
    fn test_property_group_rules_first_match_wins() {
        let catalog = MaterializationCatalog::from_yaml_str(CATALOG).unwrap();
        let group = |key| {
            catalog
                .property_group("events", "properties", key)
                .map(|g| g.map_column.as_str())
        };
        assert_eq!(group("$feature/beta"), Some("properties_group_feature_flags"));
        assert_eq!(group("plan"), Some("properties_group_custom"));
        assert_eq!(group("$browser"), None);
    }

    #[test]
    fn test_duplicate_slot_rejected() {
        let yaml = r#"
side_slots:
  - { table: events, column: properties, key: a, slot: 1 }
  - { table: events, column: properties, key: b, slot: 1 }
"#;
        assert!(matches!(
            MaterializationCatalog::from_yaml_str(yaml),
            Err(CatalogError::InvalidEntry { .. })
        ));
    }

    #[test]
    fn test_from_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, CATALOG.as_bytes()).unwrap();
        let catalog = MaterializationCatalog::from_yaml_file(file.path()).unwrap();
        assert_eq!(catalog.property_groups.len(), 2);
    }
}

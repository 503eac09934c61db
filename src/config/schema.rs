//! Storage configuration: table names and the access-tree names separator.
//!
//! Every field has a default, so a YAML document only needs the keys it changes.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{RbacError, Result};

pub const DEFAULT_ITEMS_TABLE: &str = "rbac_item";
pub const DEFAULT_ITEMS_CHILDREN_TABLE: &str = "rbac_item_child";
pub const DEFAULT_ASSIGNMENTS_TABLE: &str = "rbac_assignment";
pub const DEFAULT_NAMES_SEPARATOR: &str = ",";

// ---------------------------------------------------------------------------
// StorageConfig
// ---------------------------------------------------------------------------

/// Names of the three RBAC tables and the separator used to join child names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Roles and permissions.
    #[serde(default = "default_items_table")]
    pub items_table: String,

    /// Parent/child edges between items.
    #[serde(default = "default_items_children_table")]
    pub items_children_table: String,

    /// Item/user assignments.
    #[serde(default = "default_assignments_table")]
    pub assignments_table: String,

    /// Joins descendant names in access-tree rows. Must be exactly one
    /// character and must never occur inside an item name.
    #[serde(default = "default_names_separator")]
    pub names_separator: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            items_table: default_items_table(),
            items_children_table: default_items_children_table(),
            assignments_table: default_assignments_table(),
            names_separator: default_names_separator(),
        }
    }
}

impl StorageConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_names_separator(mut self, separator: impl Into<String>) -> Self {
        self.names_separator = separator.into();
        self
    }

    pub fn with_tables(
        mut self,
        items_table: impl Into<String>,
        items_children_table: impl Into<String>,
        assignments_table: impl Into<String>,
    ) -> Self {
        self.items_table = items_table.into();
        self.items_children_table = items_children_table.into();
        self.assignments_table = assignments_table.into();
        self
    }

    /// Reject separators that are not a single character and table names
    /// that are not plain identifiers.
    pub fn validate(&self) -> Result<()> {
        self.separator()?;
        for (label, table) in [
            ("items_table", &self.items_table),
            ("items_children_table", &self.items_children_table),
            ("assignments_table", &self.assignments_table),
        ] {
            if table.is_empty() {
                return Err(RbacError::InvalidArgument(format!(
                    "{label} must not be empty"
                )));
            }
            if !identifier_re().is_match(table) {
                return Err(RbacError::InvalidArgument(format!(
                    "{label} {table:?} is not a valid table identifier"
                )));
            }
        }
        Ok(())
    }

    /// The configured separator as a `char`.
    pub fn separator(&self) -> Result<char> {
        let mut chars = self.names_separator.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(c),
            _ => Err(RbacError::InvalidArgument(
                "names separator must be exactly 1 character long".into(),
            )),
        }
    }
}

fn identifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex is valid"))
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn default_items_table() -> String {
    DEFAULT_ITEMS_TABLE.to_string()
}

fn default_items_children_table() -> String {
    DEFAULT_ITEMS_CHILDREN_TABLE.to_string()
}

fn default_assignments_table() -> String {
    DEFAULT_ASSIGNMENTS_TABLE.to_string()
}

fn default_names_separator() -> String {
    DEFAULT_NAMES_SEPARATOR.to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

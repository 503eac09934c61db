//! SQLite schema bootstrap for the three RBAC tables.
//!
//! This is a convenience for tests and embedded deployments, not a
//! migration tool: statements are idempotent (`IF NOT EXISTS`) and there is
//! no versioning.

use rusqlite::{params, Connection};

use crate::config::StorageConfig;
use crate::error::Result;

/// Create the items, item-children and assignments tables if missing.
///
/// Edge foreign keys are checked immediately. The assignment foreign key is
/// deferred to commit time so an item rename can rewrite the item row first
/// and its assignment rows second, inside one transaction.
pub fn ensure_tables(conn: &Connection, config: &StorageConfig) -> Result<()> {
    config.validate()?;
    let items = &config.items_table;
    let children = &config.items_children_table;
    let assignments = &config.assignments_table;

    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS \"{items}\" (
  name VARCHAR(126) NOT NULL PRIMARY KEY,
  type VARCHAR(10) NOT NULL,
  description VARCHAR(191),
  rule_name VARCHAR(64),
  created_at INTEGER NOT NULL,
  updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS \"idx-{items}-type\" ON \"{items}\"(type);
CREATE TABLE IF NOT EXISTS \"{children}\" (
  parent VARCHAR(126) NOT NULL,
  child VARCHAR(126) NOT NULL,
  PRIMARY KEY (parent, child),
  FOREIGN KEY (parent) REFERENCES \"{items}\"(name),
  FOREIGN KEY (child) REFERENCES \"{items}\"(name)
);
CREATE INDEX IF NOT EXISTS \"idx-{children}-child\" ON \"{children}\"(child);
CREATE TABLE IF NOT EXISTS \"{assignments}\" (
  item_name VARCHAR(126) NOT NULL,
  user_id VARCHAR(128) NOT NULL,
  created_at INTEGER NOT NULL,
  PRIMARY KEY (item_name, user_id),
  FOREIGN KEY (item_name) REFERENCES \"{items}\"(name) DEFERRABLE INITIALLY DEFERRED
);
CREATE INDEX IF NOT EXISTS \"idx-{assignments}-user_id\" ON \"{assignments}\"(user_id);"
    ))?;
    tracing::debug!(%items, %children, %assignments, "rbac tables ensured");
    Ok(())
}

/// Drop all three tables (children and assignments first).
pub fn drop_tables(conn: &Connection, config: &StorageConfig) -> Result<()> {
    config.validate()?;
    conn.execute_batch(&format!(
        "DROP TABLE IF EXISTS \"{}\";
DROP TABLE IF EXISTS \"{}\";
DROP TABLE IF EXISTS \"{}\";",
        config.items_children_table, config.assignments_table, config.items_table
    ))?;
    Ok(())
}

/// Whether a table called `name` exists.
pub fn has_table(conn: &Connection, name: &str) -> Result<bool> {
    let mut stmt =
        conn.prepare_cached("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1")?;
    Ok(stmt.exists(params![name])?)
}

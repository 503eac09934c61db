//! Assignments storage: which subjects hold which items.
//!
//! No hierarchy logic lives here. Keeping assignments in step with item
//! renames and removals is the job of whoever drives both storages in one
//! transaction (see [`RbacManager`](crate::manager::RbacManager)).

use rusqlite::{params, params_from_iter, Connection};

use crate::config::StorageConfig;
use crate::db::converters::row_to_assignment;
use crate::error::Result;
use crate::graph::dialect::Dialect;
use crate::graph::sql::placeholders;
use crate::types::Assignment;

// ---------------------------------------------------------------------------
// AssignmentsStore
// ---------------------------------------------------------------------------

/// Assignment mutations the manager needs while cascading item changes.
pub trait AssignmentsStore {
    /// Insert `assignment`. Fails with `DuplicateKey` if the pair exists.
    fn add(&self, assignment: &Assignment) -> Result<()>;

    /// Point every assignment of `old_name` at `new_name`.
    fn rename_item(&self, old_name: &str, new_name: &str) -> Result<()>;

    fn remove(&self, item_name: &str, user_id: &str) -> Result<()>;

    fn remove_by_user_id(&self, user_id: &str) -> Result<()>;

    /// Delete every assignment of `item_name`; a no-op when there are none.
    fn remove_by_item_name(&self, item_name: &str) -> Result<()>;

    /// Delete every assignment of any item in `item_names`.
    fn remove_by_item_names(&self, item_names: &[String]) -> Result<()>;

    /// Delete every assignment.
    fn clear(&self) -> Result<()>;
}

// ---------------------------------------------------------------------------
// AssignmentsStorage
// ---------------------------------------------------------------------------

/// SQLite-backed assignments on a borrowed connection.
pub struct AssignmentsStorage<'c> {
    conn: &'c Connection,
    table: String,
}

impl std::fmt::Debug for AssignmentsStorage<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssignmentsStorage")
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

impl<'c> AssignmentsStorage<'c> {
    pub fn new(conn: &'c Connection, config: &StorageConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            conn,
            table: Dialect::Sqlite.quote_table(&config.assignments_table),
        })
    }

    pub fn connection(&self) -> &'c Connection {
        self.conn
    }

    pub fn get_all(&self) -> Result<Vec<Assignment>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT * FROM {} ORDER BY user_id, item_name",
            self.table
        ))?;
        let rows = stmt.query_and_then([], row_to_assignment)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    pub fn get_by_user_id(&self, user_id: &str) -> Result<Vec<Assignment>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT * FROM {} WHERE user_id = ?1 ORDER BY item_name",
            self.table
        ))?;
        let rows = stmt.query_and_then(params![user_id], row_to_assignment)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Assignments of any item in `item_names`.
    pub fn get_by_item_names<S: AsRef<str>>(&self, item_names: &[S]) -> Result<Vec<Assignment>> {
        if item_names.is_empty() {
            return Ok(Vec::new());
        }
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT * FROM {} WHERE item_name IN ({}) ORDER BY user_id, item_name",
            self.table,
            placeholders(1, item_names.len())
        ))?;
        let rows = stmt.query_and_then(
            params_from_iter(item_names.iter().map(AsRef::<str>::as_ref)),
            row_to_assignment,
        )?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    pub fn get(&self, item_name: &str, user_id: &str) -> Result<Option<Assignment>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT * FROM {} WHERE item_name = ?1 AND user_id = ?2",
            self.table
        ))?;
        let mut rows = stmt.query_and_then(params![item_name, user_id], row_to_assignment)?;
        match rows.next() {
            Some(Ok(assignment)) => Ok(Some(assignment)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    pub fn exists(&self, item_name: &str, user_id: &str) -> Result<bool> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT 1 FROM {} WHERE item_name = ?1 AND user_id = ?2",
            self.table
        ))?;
        Ok(stmt.exists(params![item_name, user_id])?)
    }

    /// Whether `user_id` holds at least one of `item_names`.
    pub fn user_has_item<S: AsRef<str>>(&self, user_id: &str, item_names: &[S]) -> Result<bool> {
        if item_names.is_empty() {
            return Ok(false);
        }
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT 1 FROM {} WHERE user_id = ?1 AND item_name IN ({})",
            self.table,
            placeholders(2, item_names.len())
        ))?;
        let values = std::iter::once(user_id).chain(item_names.iter().map(AsRef::<str>::as_ref));
        Ok(stmt.exists(params_from_iter(values))?)
    }

    /// Whether anybody holds `item_name`.
    pub fn has_item(&self, item_name: &str) -> Result<bool> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!("SELECT 1 FROM {} WHERE item_name = ?1", self.table))?;
        Ok(stmt.exists(params![item_name])?)
    }
}

impl AssignmentsStore for AssignmentsStorage<'_> {
    fn add(&self, assignment: &Assignment) -> Result<()> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "INSERT INTO {} (item_name, user_id, created_at) VALUES (?1, ?2, ?3)",
            self.table
        ))?;
        stmt.execute(params![
            assignment.item_name,
            assignment.user_id,
            assignment.created_at,
        ])?;
        Ok(())
    }

    fn rename_item(&self, old_name: &str, new_name: &str) -> Result<()> {
        if old_name == new_name {
            return Ok(());
        }
        let mut stmt = self.conn.prepare_cached(&format!(
            "UPDATE {} SET item_name = ?1 WHERE item_name = ?2",
            self.table
        ))?;
        let rows = stmt.execute(params![new_name, old_name])?;
        tracing::debug!(from = old_name, to = new_name, rows, "assignments renamed");
        Ok(())
    }

    fn remove(&self, item_name: &str, user_id: &str) -> Result<()> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "DELETE FROM {} WHERE item_name = ?1 AND user_id = ?2",
            self.table
        ))?;
        stmt.execute(params![item_name, user_id])?;
        Ok(())
    }

    fn remove_by_user_id(&self, user_id: &str) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!("DELETE FROM {} WHERE user_id = ?1", self.table))?;
        stmt.execute(params![user_id])?;
        Ok(())
    }

    fn remove_by_item_name(&self, item_name: &str) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!("DELETE FROM {} WHERE item_name = ?1", self.table))?;
        stmt.execute(params![item_name])?;
        Ok(())
    }

    fn remove_by_item_names(&self, item_names: &[String]) -> Result<()> {
        if item_names.is_empty() {
            return Ok(());
        }
        let mut stmt = self.conn.prepare_cached(&format!(
            "DELETE FROM {} WHERE item_name IN ({})",
            self.table,
            placeholders(1, item_names.len())
        ))?;
        let rows = stmt.execute(params_from_iter(item_names))?;
        tracing::debug!(items = item_names.len(), rows, "assignments removed by item");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let rows = self
            .conn
            .execute(&format!("DELETE FROM {}", self.table), [])?;
        tracing::info!(rows, "assignments cleared");
        Ok(())
    }
}

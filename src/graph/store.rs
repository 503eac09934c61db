//! Items storage: the item catalog, the edge table and hierarchy queries.
//!
//! Simple CRUD goes straight to the tables through `prepare_cached`;
//! hierarchy questions go through the [`TreeTraversal`] picked for the
//! connection. Rename and removal rewrite edges inside one transaction.

use rusqlite::{params, params_from_iter, Connection};

use crate::config::StorageConfig;
use crate::db::backend::BackendInfo;
use crate::db::converters::row_to_item;
use crate::db::transaction;
use crate::error::{RbacError, Result};
use crate::graph::dialect::Dialect;
use crate::graph::sql::placeholders;
use crate::graph::traversal::TreeTraversal;
use crate::types::{AccessTree, Item, ItemKind};

// ---------------------------------------------------------------------------
// ItemsStorage
// ---------------------------------------------------------------------------

/// Roles, permissions and the edges between them, on a borrowed connection.
///
/// The connection is never owned or closed here. When it is already inside
/// a transaction, multi-statement operations join that transaction instead
/// of starting their own.
pub struct ItemsStorage<'c> {
    conn: &'c Connection,
    config: StorageConfig,
    traversal: TreeTraversal,
    items: String,
    children: String,
}

impl std::fmt::Debug for ItemsStorage<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemsStorage")
            .field("config", &self.config)
            .field("traversal", &self.traversal.name())
            .finish_non_exhaustive()
    }
}

impl<'c> ItemsStorage<'c> {
    /// Validate `config`, detect the backend and pick its traversal strategy.
    pub fn new(conn: &'c Connection, config: StorageConfig) -> Result<Self> {
        config.validate()?;
        let backend = BackendInfo::detect(conn)?;
        let traversal = TreeTraversal::for_backend(&backend, &config)?;
        Ok(Self {
            conn,
            items: Dialect::Sqlite.quote_table(&config.items_table),
            children: Dialect::Sqlite.quote_table(&config.items_children_table),
            config,
            traversal,
        })
    }

    pub fn connection(&self) -> &'c Connection {
        self.conn
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn traversal(&self) -> &TreeTraversal {
        &self.traversal
    }

    // -------------------------------------------------------------------
    // Item catalog: queries
    // -------------------------------------------------------------------

    /// A single item by name, or `None`.
    pub fn get(&self, name: &str) -> Result<Option<Item>> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!("SELECT * FROM {} WHERE name = ?1", self.items))?;
        let mut rows = stmt.query_and_then(params![name], row_to_item)?;
        match rows.next() {
            Some(Ok(item)) => Ok(Some(item)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    pub fn get_all(&self) -> Result<Vec<Item>> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!("SELECT * FROM {} ORDER BY name", self.items))?;
        let rows = stmt.query_and_then([], row_to_item)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Items whose name is in `names`; unknown names are skipped.
    pub fn get_by_names<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<Item>> {
        self.select_by_names(names, None)
    }

    pub fn get_by_kind(&self, kind: ItemKind) -> Result<Vec<Item>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT * FROM {} WHERE type = ?1 ORDER BY name",
            self.items
        ))?;
        let rows = stmt.query_and_then(params![kind.as_str()], row_to_item)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// The item called `name` if it is of `kind`.
    pub fn get_by_kind_and_name(&self, kind: ItemKind, name: &str) -> Result<Option<Item>> {
        Ok(self.get(name)?.filter(|item| item.kind == kind))
    }

    pub fn get_by_names_and_kind<S: AsRef<str>>(
        &self,
        names: &[S],
        kind: ItemKind,
    ) -> Result<Vec<Item>> {
        self.select_by_names(names, Some(kind))
    }

    pub fn get_role(&self, name: &str) -> Result<Option<Item>> {
        self.get_by_kind_and_name(ItemKind::Role, name)
    }

    pub fn get_permission(&self, name: &str) -> Result<Option<Item>> {
        self.get_by_kind_and_name(ItemKind::Permission, name)
    }

    pub fn exists(&self, name: &str) -> Result<bool> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!("SELECT 1 FROM {} WHERE name = ?1", self.items))?;
        Ok(stmt.exists(params![name])?)
    }

    pub fn role_exists(&self, name: &str) -> Result<bool> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT 1 FROM {} WHERE name = ?1 AND type = ?2",
            self.items
        ))?;
        Ok(stmt.exists(params![name, ItemKind::Role.as_str()])?)
    }

    fn select_by_names<S: AsRef<str>>(
        &self,
        names: &[S],
        kind: Option<ItemKind>,
    ) -> Result<Vec<Item>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let mut sql = format!(
            "SELECT * FROM {} WHERE name IN ({})",
            self.items,
            placeholders(1, names.len())
        );
        let mut values: Vec<&str> = names.iter().map(AsRef::<str>::as_ref).collect();
        if let Some(kind) = kind {
            sql.push_str(&format!(" AND type = ?{}", names.len() + 1));
            values.push(kind.as_str());
        }
        sql.push_str(" ORDER BY name");

        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt.query_and_then(params_from_iter(values), row_to_item)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    // -------------------------------------------------------------------
    // Item catalog: mutations
    // -------------------------------------------------------------------

    /// Insert a new item. Fails with `DuplicateKey` if the name is taken.
    pub fn add(&self, item: &Item) -> Result<()> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "INSERT INTO {} (name, type, description, rule_name, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            self.items
        ))?;
        stmt.execute(params![
            item.name,
            item.kind.as_str(),
            item.description,
            item.rule_name,
            item.created_at,
            item.updated_at,
        ])?;
        Ok(())
    }

    /// Replace the item called `name` with `item`.
    ///
    /// When `item.name` differs from `name` this is a rename: every edge
    /// that referenced `name` is rewritten to the new name in the same
    /// transaction. Edges are not touched when there are none. Updating an
    /// absent item is a no-op.
    pub fn update(&self, name: &str, item: &Item) -> Result<()> {
        if item.name == name {
            self.update_row(name, item)?;
            return Ok(());
        }

        transaction(self.conn, |conn| {
            let edges = self.edges_touching(conn, name)?;
            if !edges.is_empty() {
                let mut stmt = conn.prepare_cached(&format!(
                    "DELETE FROM {} WHERE parent = ?1 OR child = ?1",
                    self.children
                ))?;
                stmt.execute(params![name])?;
            }

            let updated = self.update_row(name, item)?;

            if !edges.is_empty() {
                let mut stmt = conn.prepare_cached(&format!(
                    "INSERT INTO {} (parent, child) VALUES (?1, ?2)",
                    self.children
                ))?;
                let rename = |n: String| if n == name { item.name.clone() } else { n };
                for (parent, child) in edges.iter().cloned() {
                    stmt.execute(params![rename(parent), rename(child)])?;
                }
            }

            tracing::info!(
                from = name,
                to = %item.name,
                rows = updated,
                edges = edges.len(),
                "item renamed"
            );
            Ok(())
        })
    }

    /// Delete `name` and every edge where it is parent or child. Removing
    /// an absent item is a no-op.
    pub fn remove(&self, name: &str) -> Result<()> {
        transaction(self.conn, |conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "DELETE FROM {} WHERE parent = ?1 OR child = ?1",
                self.children
            ))?;
            let edges = stmt.execute(params![name])?;
            let mut stmt = conn
                .prepare_cached(&format!("DELETE FROM {} WHERE name = ?1", self.items))?;
            let rows = stmt.execute(params![name])?;
            if rows > 0 {
                tracing::info!(name, edges, "item removed");
            }
            Ok(())
        })
    }

    /// Delete every item of `kind` and every edge touching one of them,
    /// including edges whose other end is of the other kind.
    pub fn clear_by_kind(&self, kind: ItemKind) -> Result<()> {
        transaction(self.conn, |conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "DELETE FROM {children}
                 WHERE parent IN (SELECT name FROM {items} WHERE type = ?1)
                    OR child IN (SELECT name FROM {items} WHERE type = ?1)",
                children = self.children,
                items = self.items,
            ))?;
            let edges = stmt.execute(params![kind.as_str()])?;
            let mut stmt = conn
                .prepare_cached(&format!("DELETE FROM {} WHERE type = ?1", self.items))?;
            let rows = stmt.execute(params![kind.as_str()])?;
            tracing::info!(%kind, rows, edges, "items cleared by kind");
            Ok(())
        })
    }

    /// Delete all edges and all items.
    pub fn clear(&self) -> Result<()> {
        transaction(self.conn, |conn| {
            conn.execute(&format!("DELETE FROM {}", self.children), [])?;
            let rows = conn.execute(&format!("DELETE FROM {}", self.items), [])?;
            tracing::info!(rows, "items cleared");
            Ok(())
        })
    }

    fn update_row(&self, name: &str, item: &Item) -> Result<usize> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "UPDATE {} SET name = ?1, type = ?2, description = ?3, rule_name = ?4,
                           created_at = ?5, updated_at = ?6
             WHERE name = ?7",
            self.items
        ))?;
        Ok(stmt.execute(params![
            item.name,
            item.kind.as_str(),
            item.description,
            item.rule_name,
            item.created_at,
            item.updated_at,
            name,
        ])?)
    }

    fn edges_touching(&self, conn: &Connection, name: &str) -> Result<Vec<(String, String)>> {
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT parent, child FROM {} WHERE parent = ?1 OR child = ?1",
            self.children
        ))?;
        let rows = stmt.query_map(params![name], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    // -------------------------------------------------------------------
    // Hierarchy queries
    // -------------------------------------------------------------------

    /// Every ancestor of `name`, ordered by name.
    pub fn get_parents(&self, name: &str) -> Result<Vec<Item>> {
        self.traversal.parent_rows(self.conn, name)
    }

    /// Every item reachable upwards from `name`, `name` included, each with
    /// the descendants that lie between it and `name`.
    ///
    /// Fails with [`RbacError::SeparatorCollision`] when a returned item
    /// name contains the names separator, or when a joined descendant list
    /// does not split back into returned item names.
    pub fn get_access_tree(&self, name: &str) -> Result<AccessTree> {
        let separator = self.config.separator()?;
        let rows = self.traversal.access_tree_rows(self.conn, name)?;

        if let Some((item, _)) = rows.iter().find(|(item, _)| item.name.contains(separator)) {
            tracing::warn!(%separator, item = %item.name, "item name contains the names separator");
            return Err(RbacError::SeparatorCollision { separator });
        }

        let entries = rows
            .into_iter()
            .map(|(item, children)| {
                let names = if children.is_empty() {
                    Vec::new()
                } else {
                    children.split(separator).map(str::to_string).collect()
                };
                (item, names)
            })
            .collect();

        AccessTree::from_entries(entries).map_err(|unknown| {
            tracing::warn!(%separator, child = %unknown, "access tree child name is not a known item");
            RbacError::SeparatorCollision { separator }
        })
    }

    /// Children one edge below `name`, ordered by name.
    pub fn get_direct_children(&self, name: &str) -> Result<Vec<Item>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT item.* FROM {children} AS edge
             JOIN {items} AS item ON item.name = edge.child
             WHERE edge.parent = ?1
             ORDER BY item.name",
            children = self.children,
            items = self.items,
        ))?;
        let rows = stmt.query_and_then(params![name], row_to_item)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Every descendant of any of `names`, seeds excluded.
    pub fn get_all_children<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<Item>> {
        self.traversal.children_rows(self.conn, names, None)
    }

    /// Descendant roles of any of `names`. Permissions in between still
    /// carry reachability.
    pub fn get_all_child_roles<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<Item>> {
        self.traversal
            .children_rows(self.conn, names, Some(ItemKind::Role))
    }

    pub fn get_all_child_permissions<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<Item>> {
        self.traversal
            .children_rows(self.conn, names, Some(ItemKind::Permission))
    }

    /// Whether `name` has at least one direct child.
    pub fn has_children(&self, name: &str) -> Result<bool> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!("SELECT 1 FROM {} WHERE parent = ?1", self.children))?;
        Ok(stmt.exists(params![name])?)
    }

    /// Whether `child` is below `parent` at any depth.
    pub fn has_child(&self, parent: &str, child: &str) -> Result<bool> {
        self.traversal.has_child(self.conn, parent, child)
    }

    /// Whether the edge `parent -> child` itself exists.
    pub fn has_direct_child(&self, parent: &str, child: &str) -> Result<bool> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT 1 FROM {} WHERE parent = ?1 AND child = ?2",
            self.children
        ))?;
        Ok(stmt.exists(params![parent, child])?)
    }

    // -------------------------------------------------------------------
    // Edge table
    // -------------------------------------------------------------------

    /// Insert the edge `parent -> child`. Fails with `DuplicateKey` if it
    /// exists and with `ReferentialViolation` if either item is missing.
    pub fn add_child(&self, parent: &str, child: &str) -> Result<()> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "INSERT INTO {} (parent, child) VALUES (?1, ?2)",
            self.children
        ))?;
        stmt.execute(params![parent, child])?;
        Ok(())
    }

    pub fn remove_child(&self, parent: &str, child: &str) -> Result<()> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "DELETE FROM {} WHERE parent = ?1 AND child = ?2",
            self.children
        ))?;
        stmt.execute(params![parent, child])?;
        Ok(())
    }

    /// Delete every edge below `parent`.
    pub fn remove_children(&self, parent: &str) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!("DELETE FROM {} WHERE parent = ?1", self.children))?;
        stmt.execute(params![parent])?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{open_database, schema::ensure_tables};

    fn setup() -> Connection {
        let conn = open_database(":memory:").unwrap();
        ensure_tables(&conn, &StorageConfig::default()).unwrap();
        conn
    }

    fn names(items: &[Item]) -> Vec<&str> {
        items.iter().map(|i| i.name.as_str()).collect()
    }

    #[test]
    fn add_get_and_duplicate() {
        let conn = setup();
        let storage = ItemsStorage::new(&conn, StorageConfig::default()).unwrap();
        let item = Item::role("admin").with_description("Administrator");
        storage.add(&item).unwrap();

        assert_eq!(storage.get("admin").unwrap(), Some(item.clone()));
        assert_eq!(storage.get("nobody").unwrap(), None);
        assert!(storage.exists("admin").unwrap());
        assert!(storage.role_exists("admin").unwrap());
        assert!(matches!(
            storage.add(&item).unwrap_err(),
            RbacError::DuplicateKey(_)
        ));
    }

    #[test]
    fn kind_filters() {
        let conn = setup();
        let storage = ItemsStorage::new(&conn, StorageConfig::default()).unwrap();
        storage.add(&Item::role("r")).unwrap();
        storage.add(&Item::permission("p")).unwrap();

        assert_eq!(names(&storage.get_by_kind(ItemKind::Role).unwrap()), vec!["r"]);
        assert!(storage.get_role("p").unwrap().is_none());
        assert!(storage.get_permission("p").unwrap().is_some());
        assert!(!storage.role_exists("p").unwrap());
        assert_eq!(
            names(&storage.get_by_names_and_kind(&["r", "p"], ItemKind::Permission).unwrap()),
            vec!["p"]
        );
        assert_eq!(names(&storage.get_by_names(&["p", "r", "x"]).unwrap()), vec!["p", "r"]);
        assert!(storage.get_by_names::<&str>(&[]).unwrap().is_empty());
    }

    #[test]
    fn same_name_update_keeps_edges() {
        let conn = setup();
        let storage = ItemsStorage::new(&conn, StorageConfig::default()).unwrap();
        storage.add(&Item::role("a")).unwrap();
        storage.add(&Item::role("b")).unwrap();
        storage.add_child("a", "b").unwrap();

        storage
            .update("a", &Item::role("a").with_description("changed"))
            .unwrap();
        let a = storage.get("a").unwrap().unwrap();
        assert_eq!(a.description.as_deref(), Some("changed"));
        assert!(storage.has_direct_child("a", "b").unwrap());
    }

    #[test]
    fn rename_rewrites_both_edge_sides() {
        let conn = setup();
        let storage = ItemsStorage::new(&conn, StorageConfig::default()).unwrap();
        for name in ["a", "b", "c"] {
            storage.add(&Item::role(name)).unwrap();
        }
        storage.add_child("a", "b").unwrap();
        storage.add_child("b", "c").unwrap();

        storage.update("b", &Item::role("beta")).unwrap();
        assert!(!storage.exists("b").unwrap());
        assert!(storage.has_direct_child("a", "beta").unwrap());
        assert!(storage.has_direct_child("beta", "c").unwrap());
        assert!(storage.has_child("a", "c").unwrap());
    }

    #[test]
    fn rename_onto_existing_name_rolls_back() {
        let conn = setup();
        let storage = ItemsStorage::new(&conn, StorageConfig::default()).unwrap();
        for name in ["a", "b", "c"] {
            storage.add(&Item::role(name)).unwrap();
        }
        storage.add_child("a", "b").unwrap();

        let err = storage.update("b", &Item::role("c")).unwrap_err();
        assert!(matches!(err, RbacError::DuplicateKey(_)));
        assert!(storage.exists("b").unwrap());
        assert!(storage.has_direct_child("a", "b").unwrap());
        assert!(conn.is_autocommit());
    }

    #[test]
    fn add_child_requires_both_items() {
        let conn = setup();
        let storage = ItemsStorage::new(&conn, StorageConfig::default()).unwrap();
        storage.add(&Item::role("a")).unwrap();
        assert!(matches!(
            storage.add_child("a", "ghost").unwrap_err(),
            RbacError::ReferentialViolation(_)
        ));
    }

    #[test]
    fn remove_children_only_touches_outgoing_edges() {
        let conn = setup();
        let storage = ItemsStorage::new(&conn, StorageConfig::default()).unwrap();
        for name in ["a", "b", "c"] {
            storage.add(&Item::role(name)).unwrap();
        }
        storage.add_child("a", "b").unwrap();
        storage.add_child("b", "c").unwrap();

        storage.remove_children("b").unwrap();
        assert!(!storage.has_children("b").unwrap());
        assert!(storage.has_direct_child("a", "b").unwrap());

        storage.remove_child("a", "b").unwrap();
        storage.remove_child("a", "b").unwrap();
        assert!(!storage.has_children("a").unwrap());
    }

    #[test]
    fn direct_children_versus_all_children() {
        let conn = setup();
        let storage = ItemsStorage::new(&conn, StorageConfig::default()).unwrap();
        for name in ["a", "b", "c"] {
            storage.add(&Item::role(name)).unwrap();
        }
        storage.add_child("a", "b").unwrap();
        storage.add_child("b", "c").unwrap();

        assert_eq!(names(&storage.get_direct_children("a").unwrap()), vec!["b"]);
        assert_eq!(names(&storage.get_all_children(&["a"]).unwrap()), vec!["b", "c"]);
        assert!(!storage.has_direct_child("a", "c").unwrap());
        assert!(storage.has_child("a", "c").unwrap());
    }
}

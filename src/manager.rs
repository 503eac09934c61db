//! Cross-storage operations that must stay atomic.

use rusqlite::Connection;

use crate::assignment::AssignmentsStore;
use crate::db::transaction;
use crate::error::Result;
use crate::graph::store::ItemsStorage;
use crate::types::{Assignment, Item, ItemKind};

/// Drives an [`ItemsStorage`] and an assignments store that share one
/// connection, so item renames and removals reach the assignments in the
/// same transaction.
pub struct RbacManager<'c, A: AssignmentsStore> {
    conn: &'c Connection,
    items: ItemsStorage<'c>,
    assignments: A,
}

impl<'c, A: AssignmentsStore> RbacManager<'c, A> {
    pub fn new(items: ItemsStorage<'c>, assignments: A) -> Self {
        Self {
            conn: items.connection(),
            items,
            assignments,
        }
    }

    pub fn items(&self) -> &ItemsStorage<'c> {
        &self.items
    }

    pub fn assignments(&self) -> &A {
        &self.assignments
    }

    pub fn add_item(&self, item: &Item) -> Result<()> {
        self.items.add(item)
    }

    /// Update the item called `name`. A rename also rewrites its edges and
    /// assignments; if any step fails nothing is applied.
    pub fn update_item(&self, name: &str, item: &Item) -> Result<()> {
        transaction(self.conn, |_| {
            self.items.update(name, item)?;
            if item.name != name {
                self.assignments.rename_item(name, &item.name)?;
            }
            Ok(())
        })
    }

    /// Remove the item called `name` together with its edges and assignments.
    pub fn remove_item(&self, name: &str) -> Result<()> {
        transaction(self.conn, |_| {
            self.assignments.remove_by_item_name(name)?;
            self.items.remove(name)
        })
    }

    /// Remove every item of `kind` with its edges and assignments.
    pub fn clear_by_kind(&self, kind: ItemKind) -> Result<()> {
        transaction(self.conn, |_| {
            let names: Vec<String> = self
                .items
                .get_by_kind(kind)?
                .into_iter()
                .map(|item| item.name)
                .collect();
            self.assignments.remove_by_item_names(&names)?;
            self.items.clear_by_kind(kind)
        })
    }

    /// Remove every item, edge and assignment.
    pub fn clear(&self) -> Result<()> {
        transaction(self.conn, |_| {
            self.assignments.clear()?;
            self.items.clear()
        })
    }

    pub fn assign(&self, item_name: &str, user_id: &str) -> Result<()> {
        self.assignments.add(&Assignment::new(item_name, user_id))
    }

    pub fn revoke(&self, item_name: &str, user_id: &str) -> Result<()> {
        self.assignments.remove(item_name, user_id)
    }

    pub fn revoke_all(&self, user_id: &str) -> Result<()> {
        self.assignments.remove_by_user_id(user_id)
    }
}

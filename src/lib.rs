//! rbac-store: relational storage for role/permission hierarchies.
//!
//! Items (roles and permissions) form a parent/child graph in one table and
//! its edges in another. Ancestor, descendant and access-tree questions are
//! answered by a single recursive SQL query per call, so the graph is never
//! loaded into memory. Assignments bind items to external user identifiers.
//!
//! ```no_run
//! use rbac_store::{db, AssignmentsStorage, Item, ItemsStorage, RbacManager, StorageConfig};
//!
//! # fn main() -> rbac_store::Result<()> {
//! let conn = db::open_database("rbac.db")?;
//! let config = StorageConfig::default();
//! db::schema::ensure_tables(&conn, &config)?;
//!
//! let manager = RbacManager::new(
//!     ItemsStorage::new(&conn, config.clone())?,
//!     AssignmentsStorage::new(&conn, &config)?,
//! );
//! manager.add_item(&Item::role("admin"))?;
//! manager.add_item(&Item::permission("post.edit"))?;
//! manager.items().add_child("admin", "post.edit")?;
//! manager.assign("admin", "42")?;
//! assert!(manager.items().has_child("admin", "post.edit")?);
//! # Ok(())
//! # }
//! ```

pub mod assignment;
pub mod config;
pub mod db;
pub mod error;
pub mod graph;
pub mod manager;
pub mod observability;
pub mod types;

pub use assignment::{AssignmentsStorage, AssignmentsStore};
pub use config::StorageConfig;
pub use db::backend::BackendInfo;
pub use error::{RbacError, Result};
pub use graph::dialect::Dialect;
pub use graph::store::ItemsStorage;
pub use graph::traversal::{Direction, TreeTraversal};
pub use manager::RbacManager;
pub use types::{AccessTree, AccessTreeNode, Assignment, Item, ItemKind};

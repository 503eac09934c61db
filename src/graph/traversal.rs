//! Hierarchy traversal: strategy selection and execution.
//!
//! A [`TreeTraversal`] is chosen once per storage from the backend identity
//! and then answers the four closure questions: ancestors, descendants, a
//! descendant check and the raw access tree.

use rusqlite::Connection;

use crate::config::StorageConfig;
use crate::db::backend::BackendInfo;
use crate::db::converters::row_to_item;
use crate::error::{RbacError, Result};
use crate::graph::cte::CteTraversal;
use crate::graph::dialect::Dialect;
use crate::graph::session_vars::SessionVariableTraversal;
use crate::graph::sql::SqlQuery;
use crate::types::{Item, ItemKind};

/// Lowest SQLite release with `WITH RECURSIVE`.
const SQLITE_MIN_CTE_VERSION: (u32, u32, u32) = (3, 8, 3);
/// First MySQL major version with recursive CTEs.
const MYSQL_MIN_CTE_MAJOR: u32 = 8;
/// First MariaDB release with recursive CTEs.
const MARIADB_MIN_CTE_VERSION: (u32, u32, u32) = (10, 2, 0);

// ---------------------------------------------------------------------------
// Shared pieces
// ---------------------------------------------------------------------------

/// Which way a set traversal follows edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// parent -> child
    Descendants,
    /// child -> parent
    Ancestors,
}

impl Direction {
    /// `(known end, reached end)` edge columns.
    pub(crate) fn columns(&self) -> (&'static str, &'static str) {
        match self {
            Self::Descendants => ("parent", "child"),
            Self::Ancestors => ("child", "parent"),
        }
    }
}

/// Quoted table identifiers for one dialect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Tables {
    pub(crate) items: String,
    pub(crate) children: String,
}

impl Tables {
    pub(crate) fn new(dialect: Dialect, items: &str, children: &str) -> Self {
        Self {
            items: dialect.quote_table(items),
            children: dialect.quote_table(children),
        }
    }
}

// ---------------------------------------------------------------------------
// TreeTraversal
// ---------------------------------------------------------------------------

/// Backend-specific transitive closure over the edge table.
#[derive(Debug, Clone)]
pub enum TreeTraversal {
    /// Recursive common table expressions.
    Cte(CteTraversal),
    /// MySQL session variables, for servers without recursive CTEs.
    SessionVariables(SessionVariableTraversal),
}

impl TreeTraversal {
    /// Pick the strategy for `backend`.
    ///
    /// Fails with [`RbacError::UnsupportedBackend`] when no strategy exists
    /// for the driver or its version, and with
    /// [`RbacError::InvalidArgument`] when `config` is invalid.
    pub fn for_backend(backend: &BackendInfo, config: &StorageConfig) -> Result<Self> {
        config.validate()?;
        let separator = config.separator()?;
        let unsupported = || RbacError::UnsupportedBackend {
            driver: backend.driver.clone(),
            version: backend.version.clone(),
        };
        let cte = |dialect: Dialect| {
            TreeTraversal::Cte(CteTraversal::new(
                dialect,
                Tables::new(dialect, &config.items_table, &config.items_children_table),
                separator,
            ))
        };

        let version = backend.version_tuple();
        let traversal = match backend.driver.as_str() {
            "sqlite" if version >= SQLITE_MIN_CTE_VERSION => cte(Dialect::Sqlite),
            "sqlite" => return Err(unsupported()),
            "mysql" => {
                let has_cte = if backend.is_mariadb() {
                    version >= MARIADB_MIN_CTE_VERSION
                } else {
                    version.0 >= MYSQL_MIN_CTE_MAJOR
                };
                if has_cte {
                    cte(Dialect::Mysql)
                } else {
                    TreeTraversal::SessionVariables(SessionVariableTraversal::new(
                        Tables::new(
                            Dialect::Mysql,
                            &config.items_table,
                            &config.items_children_table,
                        ),
                        separator,
                    ))
                }
            }
            "pgsql" => cte(Dialect::Postgres),
            "sqlsrv" => cte(Dialect::SqlServer),
            "oci" => cte(Dialect::Oracle),
            _ => return Err(unsupported()),
        };
        tracing::debug!(backend = %backend, strategy = traversal.name(), "tree traversal selected");
        Ok(traversal)
    }

    /// Short strategy label for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Cte(_) => "cte",
            Self::SessionVariables(_) => "session-variables",
        }
    }

    pub fn dialect(&self) -> Dialect {
        match self {
            Self::Cte(cte) => cte.dialect(),
            Self::SessionVariables(_) => Dialect::Mysql,
        }
    }

    // -------------------------------------------------------------------
    // Query generation
    // -------------------------------------------------------------------

    /// Items reachable from `names` in `direction`, seeds excluded.
    ///
    /// The session-variable strategy fails with
    /// [`RbacError::InvalidArgument`] for a seed name containing a comma.
    pub fn reachable_query<S: AsRef<str>>(
        &self,
        direction: Direction,
        names: &[S],
        kind: Option<ItemKind>,
    ) -> Result<SqlQuery> {
        match self {
            Self::Cte(t) => Ok(t.reachable_query(direction, names, kind)),
            Self::SessionVariables(t) => t.reachable_query(direction, names, kind),
        }
    }

    pub fn has_child_query(&self, parent: &str, child: &str) -> Result<SqlQuery> {
        match self {
            Self::Cte(t) => Ok(t.has_child_query(parent, child)),
            Self::SessionVariables(t) => t.has_child_query(parent, child),
        }
    }

    // -------------------------------------------------------------------
    // Execution
    // -------------------------------------------------------------------

    /// All ancestors of `name`, ordered by name.
    pub fn parent_rows(&self, conn: &Connection, name: &str) -> Result<Vec<Item>> {
        self.reachable_query(Direction::Ancestors, &[name], None)?
            .query_map(conn, row_to_item)
    }

    /// All descendants of any of `names`, optionally restricted to `kind`.
    /// An empty `names` yields no rows without touching the database.
    pub fn children_rows<S: AsRef<str>>(
        &self,
        conn: &Connection,
        names: &[S],
        kind: Option<ItemKind>,
    ) -> Result<Vec<Item>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        self.reachable_query(Direction::Descendants, names, kind)?
            .query_map(conn, row_to_item)
    }

    /// Whether `child` is reachable from `parent`. Never true for
    /// `parent == child`.
    pub fn has_child(&self, conn: &Connection, parent: &str, child: &str) -> Result<bool> {
        self.has_child_query(parent, child)?.exists(conn)
    }

    /// Raw access-tree rows: each reachable item with the separator-joined
    /// child names on its path from `name`. Empty when `name` does not exist.
    pub fn access_tree_rows(&self, conn: &Connection, name: &str) -> Result<Vec<(Item, String)>> {
        match self {
            Self::Cte(t) => t.access_tree_query(name).query_map(conn, |row| {
                let item = row_to_item(row)?;
                let children: Option<String> = row.get("children")?;
                Ok((item, children.unwrap_or_default()))
            }),
            Self::SessionVariables(t) => t.access_tree_rows(conn, name),
        }
    }
}

//! Generated SQL statements with their bound parameters.

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row};

use crate::error::Result;
use crate::graph::dialect::Dialect;

/// `?1, ?2, ..., ?n` starting at `?{first}`, for statements run directly
/// on the SQLite connection.
pub(crate) fn placeholders(first: usize, n: usize) -> String {
    (first..first + n)
        .map(|i| Dialect::Sqlite.placeholder(i))
        .collect::<Vec<_>>()
        .join(", ")
}

/// A statement plus the parameters its placeholders refer to, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

impl SqlQuery {
    /// Run the query and map every row.
    pub fn query_map<T>(
        &self,
        conn: &Connection,
        f: impl FnMut(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>> {
        tracing::debug!(sql = %self.sql, params = self.params.len(), "traversal query");
        let mut stmt = conn.prepare_cached(&self.sql)?;
        let rows = stmt.query_map(params_from_iter(self.params.iter()), f)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Whether the query yields at least one row.
    pub fn exists(&self, conn: &Connection) -> Result<bool> {
        tracing::debug!(sql = %self.sql, params = self.params.len(), "traversal existence query");
        let mut stmt = conn.prepare_cached(&self.sql)?;
        Ok(stmt.exists(params_from_iter(self.params.iter()))?)
    }
}

/// Appends SQL text and binds parameters with the dialect's placeholders.
pub(crate) struct SqlBuilder {
    dialect: Dialect,
    sql: String,
    params: Vec<Value>,
}

impl SqlBuilder {
    pub(crate) fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            params: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    /// Append a placeholder bound to `value`.
    pub(crate) fn bind(&mut self, value: impl Into<Value>) -> &mut Self {
        self.params.push(value.into());
        let placeholder = self.dialect.placeholder(self.params.len());
        self.sql.push_str(&placeholder);
        self
    }

    /// Append `ph, ph, ...` bound to each of `values`.
    pub(crate) fn bind_list<S: AsRef<str>>(&mut self, values: &[S]) -> &mut Self {
        for (i, value) in values.iter().enumerate() {
            if i > 0 {
                self.sql.push_str(", ");
            }
            self.bind(AsRef::<str>::as_ref(value).to_string());
        }
        self
    }

    pub(crate) fn finish(self) -> SqlQuery {
        SqlQuery {
            sql: self.sql,
            params: self.params,
        }
    }
}

//! Database layer: connection setup, transactions, schema and row conversion.

pub mod backend;
pub mod converters;
pub mod schema;

use std::time::Duration;

use rusqlite::Connection;

use crate::error::Result;

/// Open (or create) the SQLite database at `db_path`.
///
/// The connection has foreign keys enforced and a busy timeout so that
/// concurrent writers wait instead of failing immediately. File databases
/// additionally run in WAL mode.
pub fn open_database(db_path: &str) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(Duration::from_secs(5))?;
    if db_path != ":memory:" {
        // journal_mode returns the resulting mode as a row.
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get::<_, String>(0))?;
    }
    conn.set_prepared_statement_cache_capacity(64);
    Ok(conn)
}

/// Run `f` inside a transaction on `conn`.
///
/// When `conn` is already inside a transaction that somebody else started,
/// `f` simply runs inline and the outer owner decides to commit or roll
/// back. Otherwise a transaction is begun here, committed when `f` returns
/// `Ok`, and rolled back on every error path (the guard rolls back on drop,
/// including after a failed `COMMIT`).
pub fn transaction<T>(conn: &Connection, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
    if !conn.is_autocommit() {
        return f(conn);
    }
    let tx = conn.unchecked_transaction()?;
    let value = f(&tx)?;
    tx.commit()?;
    Ok(value)
}

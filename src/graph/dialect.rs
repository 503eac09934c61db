//! Per-backend SQL fragments for the traversal queries.
//!
//! The recursive query skeleton is shared; only these small pieces differ
//! between backends.

/// SQL flavour of the connected backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    Sqlite,
    Mysql,
    Postgres,
    SqlServer,
    Oracle,
}

impl Dialect {
    /// Quote a table identifier.
    pub fn quote_table(&self, name: &str) -> String {
        match self {
            Self::Mysql => format!("`{}`", name.replace('`', "``")),
            Self::SqlServer => format!("[{}]", name.replace(']', "]]")),
            Self::Sqlite | Self::Postgres | Self::Oracle => {
                format!("\"{}\"", name.replace('"', "\"\""))
            }
        }
    }

    /// Placeholder for the `index`-th bound parameter (1-based).
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Self::Sqlite => format!("?{index}"),
            Self::Mysql => "?".to_string(),
            Self::Postgres => format!("${index}"),
            Self::SqlServer => format!("@P{index}"),
            Self::Oracle => format!(":{index}"),
        }
    }

    /// Keyword opening a recursive common table expression.
    pub fn with_recursive(&self) -> &'static str {
        match self {
            Self::SqlServer | Self::Oracle => "WITH",
            Self::Sqlite | Self::Mysql | Self::Postgres => "WITH RECURSIVE",
        }
    }

    /// Union between the seed and the recursive step of a set traversal.
    /// `UNION` drops rows already produced, which also ends the walk on
    /// cycles; backends that only accept `UNION ALL` rely on
    /// [`cycle_clause`](Self::cycle_clause) or a
    /// [path guard](Self::guards_set_paths).
    pub fn set_union(&self) -> &'static str {
        match self {
            Self::SqlServer | Self::Oracle => "UNION ALL",
            Self::Sqlite | Self::Mysql | Self::Postgres => "UNION",
        }
    }

    /// Clause placed after the CTE body that stops revisiting `column`.
    pub fn cycle_clause(&self, column: &str) -> Option<String> {
        match self {
            Self::Oracle => Some(format!("CYCLE {column} SET is_cycle TO '1' DEFAULT '0'")),
            _ => None,
        }
    }

    /// Whether set traversals must carry their own path and refuse to step
    /// onto a name already on it, because neither the union nor a cycle
    /// clause stops a cycle.
    pub fn guards_set_paths(&self) -> bool {
        matches!(self, Self::SqlServer)
    }

    /// Statement suffix lifting the default recursion depth limit.
    pub fn recursion_hint(&self) -> Option<&'static str> {
        match self {
            Self::SqlServer => Some("OPTION (MAXRECURSION 0)"),
            _ => None,
        }
    }

    /// `table AS alias` (Oracle does not accept `AS` for tables).
    pub fn table_alias(&self, table: &str, alias: &str) -> String {
        match self {
            Self::Oracle => format!("{table} {alias}"),
            _ => format!("{table} AS {alias}"),
        }
    }

    /// Concatenate string expressions.
    pub fn concat(&self, parts: &[&str]) -> String {
        match self {
            Self::Mysql | Self::SqlServer => format!("CONCAT({})", parts.join(", ")),
            Self::Sqlite | Self::Postgres | Self::Oracle => parts.join(" || "),
        }
    }

    /// Strip `chars` (a literal) from both ends of `expr`.
    pub fn trim_both(&self, expr: &str, chars: &str) -> String {
        match self {
            Self::Sqlite => format!("trim({expr}, {chars})"),
            Self::SqlServer => format!("TRIM({chars} FROM {expr})"),
            Self::Mysql | Self::Postgres | Self::Oracle => format!("TRIM(BOTH {chars} FROM {expr})"),
        }
    }

    /// 1-based position of `needle` in `haystack`, 0 when absent.
    pub fn position(&self, haystack: &str, needle: &str) -> String {
        match self {
            Self::Sqlite | Self::Mysql | Self::Oracle => format!("INSTR({haystack}, {needle})"),
            Self::Postgres => format!("STRPOS({haystack}, {needle})"),
            Self::SqlServer => format!("CHARINDEX({needle}, {haystack})"),
        }
    }

    /// Cast to the text type used for accumulated child-name lists, so the
    /// seed and the recursive step of a CTE agree on the column type.
    pub fn cast_text(&self, expr: &str) -> String {
        match self {
            Self::Sqlite => expr.to_string(),
            Self::Mysql => format!("CAST({expr} AS CHAR(4000))"),
            Self::Postgres => format!("CAST({expr} AS TEXT)"),
            Self::SqlServer => format!("CAST({expr} AS NVARCHAR(4000))"),
            Self::Oracle => format!("CAST({expr} AS VARCHAR2(4000))"),
        }
    }
}

/// Single-quoted SQL string literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

//! Backend identity and version discovery.

use rusqlite::Connection;

use crate::error::Result;

/// Which database server a connection talks to, and its version string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendInfo {
    /// Driver name: `sqlite`, `mysql`, `pgsql`, `sqlsrv`, `oci`, or whatever
    /// the caller reports for an unknown backend.
    pub driver: String,
    /// Server version as reported by the server itself.
    pub version: String,
}

impl BackendInfo {
    /// Describe a backend. Common driver aliases are normalised
    /// (`postgres` -> `pgsql`, `mssql` -> `sqlsrv`, `oracle` -> `oci`,
    /// `mariadb` -> `mysql`).
    pub fn new(driver: &str, version: impl Into<String>) -> Self {
        let driver = match driver.trim().to_lowercase().as_str() {
            "sqlite" | "sqlite3" => "sqlite".to_string(),
            "mysql" | "mariadb" => "mysql".to_string(),
            "pgsql" | "postgres" | "postgresql" => "pgsql".to_string(),
            "sqlsrv" | "mssql" | "sqlserver" => "sqlsrv".to_string(),
            "oci" | "oracle" => "oci".to_string(),
            other => other.to_string(),
        };
        Self {
            driver,
            version: version.into(),
        }
    }

    /// Ask the connection which SQLite library it runs on.
    pub fn detect(conn: &Connection) -> Result<Self> {
        let version: String = conn.query_row("SELECT sqlite_version()", [], |row| row.get(0))?;
        Ok(Self::new("sqlite", version))
    }

    /// `true` for MariaDB servers reporting through the MySQL driver.
    pub fn is_mariadb(&self) -> bool {
        self.version.to_lowercase().contains("mariadb")
    }

    /// Leading `major.minor.patch` numbers of the version string; missing
    /// components are zero.
    ///
    /// MariaDB servers that prefix their version with the `5.5.5-`
    /// replication marker report the real version after it.
    pub fn version_tuple(&self) -> (u32, u32, u32) {
        let raw = if self.is_mariadb() {
            self.version.strip_prefix("5.5.5-").unwrap_or(&self.version)
        } else {
            &self.version
        };
        let mut parts = raw
            .split(|c: char| !c.is_ascii_digit())
            .take_while(|p| !p.is_empty())
            .map(|p| p.parse::<u32>().unwrap_or(0));
        (
            parts.next().unwrap_or(0),
            parts.next().unwrap_or(0),
            parts.next().unwrap_or(0),
        )
    }
}

impl std::fmt::Display for BackendInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.driver, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn detect_reports_sqlite() {
        let conn = Connection::open_in_memory().unwrap();
        let info = BackendInfo::detect(&conn).unwrap();
        assert_eq!(info.driver, "sqlite");
        assert!(info.version_tuple() >= (3, 8, 3), "bundled sqlite is {info}");
    }

    #[test_case("postgres", "pgsql")]
    #[test_case("MSSQL", "sqlsrv")]
    #[test_case("oracle", "oci")]
    #[test_case("mariadb", "mysql")]
    #[test_case("firebird", "firebird")]
    fn driver_aliases_are_normalised(input: &str, expected: &str) {
        assert_eq!(BackendInfo::new(input, "1").driver, expected);
    }

    #[test_case("5.7.44-log", (5, 7, 44))]
    #[test_case("8.0.36", (8, 0, 36))]
    #[test_case("10.11.6-MariaDB", (10, 11, 6))]
    #[test_case("5.5.5-10.6.12-MariaDB-log", (10, 6, 12))]
    #[test_case("16", (16, 0, 0))]
    #[test_case("", (0, 0, 0))]
    fn version_tuple_parses_leading_numbers(version: &str, expected: (u32, u32, u32)) {
        assert_eq!(BackendInfo::new("mysql", version).version_tuple(), expected);
    }
}

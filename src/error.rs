//! Error taxonomy for the RBAC store.
//!
//! Backend errors are classified once, at the `rusqlite` boundary, so callers
//! can match on constraint failures without inspecting SQLite codes.

use rusqlite::ffi;
use thiserror::Error;

/// Every failure the storage layer can report.
#[derive(Debug, Error)]
pub enum RbacError {
    /// Malformed configuration or argument (bad separator, bad table name).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An insert hit a uniqueness constraint (item name, edge, assignment).
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    /// An edge or assignment references an item that does not exist.
    #[error("referential integrity violation: {0}")]
    ReferentialViolation(String),

    /// The access tree could not be split back into item names.
    #[error("separator collision has been detected for separator {separator:?}")]
    SeparatorCollision { separator: char },

    /// No traversal strategy is known for the connected backend.
    #[error("{driver} {version} database backend is not supported")]
    UnsupportedBackend { driver: String, version: String },

    /// Any other connection or statement failure, propagated unchanged.
    #[error("backend failure: {0}")]
    Backend(rusqlite::Error),

    #[error("config error: {0}")]
    Config(#[from] serde_yaml::Error),
}

impl RbacError {
    /// Short hint shown next to a separator collision.
    pub fn solution(&self) -> Option<&'static str> {
        match self {
            Self::SeparatorCollision { .. } => Some(
                "The separator joins and splits child names while building the access tree, \
                 so it can not be part of an item name. Configure another names_separator \
                 or rename the affected items.",
            ),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for RbacError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(ref failure, ref message) = err {
            let detail = message
                .clone()
                .unwrap_or_else(|| failure.to_string());
            match failure.extended_code {
                ffi::SQLITE_CONSTRAINT_PRIMARYKEY | ffi::SQLITE_CONSTRAINT_UNIQUE => {
                    return Self::DuplicateKey(detail);
                }
                ffi::SQLITE_CONSTRAINT_FOREIGNKEY => {
                    return Self::ReferentialViolation(detail);
                }
                _ => {}
            }
        }
        Self::Backend(err)
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, RbacError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(extended_code: i32) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(
            ffi::Error {
                code: ffi::ErrorCode::ConstraintViolation,
                extended_code,
            },
            Some("constraint failed".into()),
        )
    }

    #[test]
    fn primary_key_and_unique_map_to_duplicate_key() {
        assert!(matches!(
            RbacError::from(failure(ffi::SQLITE_CONSTRAINT_PRIMARYKEY)),
            RbacError::DuplicateKey(_)
        ));
        assert!(matches!(
            RbacError::from(failure(ffi::SQLITE_CONSTRAINT_UNIQUE)),
            RbacError::DuplicateKey(_)
        ));
    }

    #[test]
    fn foreign_key_maps_to_referential_violation() {
        let err = RbacError::from(failure(ffi::SQLITE_CONSTRAINT_FOREIGNKEY));
        assert!(matches!(err, RbacError::ReferentialViolation(ref m) if m == "constraint failed"));
    }

    #[test]
    fn other_errors_stay_backend_failures() {
        let err = RbacError::from(failure(ffi::SQLITE_CONSTRAINT_NOTNULL));
        assert!(matches!(err, RbacError::Backend(_)));
        assert!(matches!(
            RbacError::from(rusqlite::Error::QueryReturnedNoRows),
            RbacError::Backend(_)
        ));
    }

    #[test]
    fn separator_collision_has_message_and_solution() {
        let err = RbacError::SeparatorCollision { separator: '.' };
        assert_eq!(
            err.to_string(),
            "separator collision has been detected for separator '.'"
        );
        assert!(err.solution().is_some());
        assert!(RbacError::InvalidArgument("x".into()).solution().is_none());
    }
}

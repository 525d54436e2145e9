//! Error types for the migration system
//!
//! Errors are split by layer: [`DatabaseError`] comes out of the database
//! handle, [`MigrationError`] out of the migrator itself. Configuration
//! problems live in [`crate::config::ConfigError`] and convert into
//! [`MigrationError::Configuration`].

use crate::backends::DatabaseBackendType;
use crate::config::ConfigError;
use crate::migrations::MigrationDirection;

/// Result type alias for database handle operations
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Result type alias for migrator operations
pub type MigrationResult<T> = Result<T, MigrationError>;

/// Errors raised by a database handle or transaction
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Column '{0}' not found")]
    ColumnNotFound(String),

    #[error("Unsupported value in column {column}: {reason}")]
    UnsupportedValue { column: usize, reason: String },

    #[error("{0}")]
    Other(String),
}

/// Errors raised while constructing a migrator or walking the registry
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("Unsupported database backend: {0}")]
    UnsupportedBackend(DatabaseBackendType),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Invalid migration id '{id}': {reason}")]
    InvalidMigrationId { id: String, reason: String },

    #[error("Duplicate migration id '{0}'")]
    DuplicateMigration(String),

    #[error("Invalid {direction} step for '{id}': {reason}")]
    InvalidStep {
        id: String,
        direction: MigrationDirection,
        reason: String,
    },

    #[error("creating migrations table: {0}")]
    Bootstrap(#[source] DatabaseError),

    #[error("reading migration status: {0}")]
    Status(#[source] DatabaseError),

    #[error("looking up {direction} by id '{id}': {source}")]
    Lookup {
        id: String,
        direction: MigrationDirection,
        #[source]
        source: DatabaseError,
    },

    #[error("running {direction} '{id}': {source}")]
    Execution {
        id: String,
        direction: MigrationDirection,
        #[source]
        source: anyhow::Error,
    },

    #[error("committing {direction} '{id}': {source}")]
    Commit {
        id: String,
        direction: MigrationDirection,
        #[source]
        source: DatabaseError,
    },
}

impl MigrationError {
    /// Id of the migration the error is tied to, if any
    pub fn migration_id(&self) -> Option<&str> {
        match self {
            MigrationError::InvalidMigrationId { id, .. }
            | MigrationError::InvalidStep { id, .. }
            | MigrationError::Lookup { id, .. }
            | MigrationError::Execution { id, .. }
            | MigrationError::Commit { id, .. } => Some(id),
            MigrationError::DuplicateMigration(id) => Some(id),
            _ => None,
        }
    }

    pub(crate) fn execution(
        id: &str,
        direction: MigrationDirection,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        MigrationError::Execution {
            id: id.to_string(),
            direction,
            source: source.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_error_names_phase() {
        let err = MigrationError::execution(
            "0002",
            MigrationDirection::Down,
            anyhow::anyhow!("no such table: users"),
        );

        assert_eq!(
            err.to_string(),
            "running rollback '0002': no such table: users"
        );
        assert_eq!(err.migration_id(), Some("0002"));
    }

    #[test]
    fn test_bootstrap_error_has_no_migration_id() {
        let err = MigrationError::Bootstrap(DatabaseError::Other("disk full".to_string()));

        assert!(err.to_string().starts_with("creating migrations table"));
        assert!(err.migration_id().is_none());
    }
}

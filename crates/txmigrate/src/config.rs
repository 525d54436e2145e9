//! Migrator configuration
//!
//! The tracking table name and the set of database engines a migrator will
//! accept. Both can be taken from the environment; anything unset falls back
//! to [`MigrationConfig::default`].

use std::env;
use std::str::FromStr;
use thiserror::Error;

use crate::backends::DatabaseBackendType;
use crate::security::validate_identifier;

/// Environment variable holding the tracking table name
pub const MIGRATIONS_TABLE_ENV: &str = "MIGRATIONS_TABLE";

/// Environment variable holding a comma-separated engine allow-list
pub const SUPPORTED_BACKENDS_ENV: &str = "MIGRATIONS_SUPPORTED_BACKENDS";

/// Default tracking table name
pub const DEFAULT_MIGRATIONS_TABLE: &str = "migrations";

/// Configuration for a [`Migrator`](crate::Migrator)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationConfig {
    /// Table holding one row per applied migration id
    pub migrations_table: String,
    /// Engines the migrator accepts at construction time
    pub supported_backends: Vec<DatabaseBackendType>,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            migrations_table: DEFAULT_MIGRATIONS_TABLE.to_string(),
            supported_backends: vec![DatabaseBackendType::SQLite, DatabaseBackendType::MySQL],
        }
    }
}

impl MigrationConfig {
    /// Use a different tracking table
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.migrations_table = table.into();
        self
    }

    /// Replace the engine allow-list
    pub fn with_supported_backends(
        mut self,
        backends: impl IntoIterator<Item = DatabaseBackendType>,
    ) -> Self {
        self.supported_backends = backends.into_iter().collect();
        self
    }

    /// Whether `backend` is on the allow-list
    pub fn supports(&self, backend: &DatabaseBackendType) -> bool {
        self.supported_backends.contains(backend)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let migrations_table =
            get_env_or_default(MIGRATIONS_TABLE_ENV, &defaults.migrations_table);

        let supported_backends = match get_env_optional(SUPPORTED_BACKENDS_ENV) {
            Some(raw) => parse_backend_list(&raw)?,
            None => defaults.supported_backends,
        };

        let config = Self {
            migrations_table,
            supported_backends,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_identifier(&self.migrations_table).map_err(|reason| {
            ConfigError::ValidationFailed {
                field: "migrations_table".to_string(),
                reason,
            }
        })?;

        if self.supported_backends.is_empty() {
            return Err(ConfigError::ValidationFailed {
                field: "supported_backends".to_string(),
                reason: "At least one database backend must be supported".to_string(),
            });
        }

        Ok(())
    }
}

fn parse_backend_list(raw: &str) -> Result<Vec<DatabaseBackendType>, ConfigError> {
    let mut backends = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let backend =
            DatabaseBackendType::from_str(name).map_err(|_| ConfigError::InvalidValue {
                field: SUPPORTED_BACKENDS_ENV.to_string(),
                value: name.to_string(),
                expected: "sqlite, mysql, or postgresql".to_string(),
            })?;
        if !backends.contains(&backend) {
            backends.push(backend);
        }
    }
    Ok(backends)
}

fn get_env_optional(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn get_env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: '{value}', expected {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Validation failed for {field}: {reason}")]
    ValidationFailed { field: String, reason: String },
}

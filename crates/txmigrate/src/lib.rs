//! # txmigrate: ordered, transactional schema migrations
//!
//! A [`Migrator`] is bound to a database handle and an ordered list of
//! [`Migration`]s. [`Migrator::apply`] runs every migration that has no row
//! in the tracking table, in order; [`Migrator::rollback`] walks the list in
//! reverse and undoes every applied migration that defines a backward step.
//! Each migration runs in its own transaction together with the insert or
//! delete of its tracking row.
//!
//! ```rust,ignore
//! use txmigrate::{Migration, Migrator};
//!
//! let pool = sqlx::SqlitePool::connect("sqlite://app.db").await?;
//! let migrator = Migrator::new(
//!     pool,
//!     vec![
//!         Migration::sql("1", "create_courses", "CREATE TABLE courses (id INTEGER PRIMARY KEY, name TEXT)")
//!             .with_down_sql("DROP TABLE courses"),
//!     ],
//! )?;
//!
//! migrator.apply().await?;
//! ```

pub mod backends;
pub mod config;
pub mod error;
pub mod migrations;
pub mod security;


pub use backends::{
    DatabaseBackendType, DatabaseRow, DatabaseTransaction, DatabaseValue, MigrationDatabase,
    SqlDialect, SqlxTransaction,
};
pub use config::{ConfigError, MigrationConfig};
pub use error::{DatabaseError, DatabaseResult, MigrationError, MigrationResult};
pub use migrations::*;

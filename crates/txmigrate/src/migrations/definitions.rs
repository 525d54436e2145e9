//! Migration Definitions - Core types and structures for migrations
//!
//! Defines the registry entries ([`Migration`]), the executable capability a
//! migration runs in each direction ([`MigrationStep`]), and the reports
//! returned by the migrator.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::backends::DatabaseTransaction;

/// Future returned by closure-based steps
pub type StepFuture<'t> = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 't>>;

/// One direction of a migration, run inside the migrator's transaction
#[async_trait]
pub trait MigrationStep: Send + Sync {
    async fn run(&self, tx: &mut dyn DatabaseTransaction) -> anyhow::Result<()>;

    /// Checked when the migrator is built; a step that can never do
    /// useful work returns the reason here.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

#[async_trait]
impl<F> MigrationStep for F
where
    F: for<'t> Fn(&'t mut dyn DatabaseTransaction) -> StepFuture<'t> + Send + Sync,
{
    async fn run(&self, tx: &mut dyn DatabaseTransaction) -> anyhow::Result<()> {
        (self)(tx).await
    }
}

/// Pin down the signature of a closure so it can be used as a step
///
/// ```rust,ignore
/// let forward = step_fn(|tx| {
///     Box::pin(async move {
///         tx.execute("CREATE TABLE courses (id INTEGER PRIMARY KEY, name TEXT)", &[])
///             .await?;
///         Ok(())
///     })
/// });
/// ```
pub fn step_fn<F>(f: F) -> F
where
    F: for<'t> Fn(&'t mut dyn DatabaseTransaction) -> StepFuture<'t> + Send + Sync,
{
    f
}

/// Step that executes raw SQL statements in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlStep {
    statements: Vec<String>,
}

impl SqlStep {
    /// A single statement
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            statements: vec![sql.into()],
        }
    }

    /// Several statements, executed in the given order
    pub fn batch<I, S>(statements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            statements: statements.into_iter().map(Into::into).collect(),
        }
    }

    pub fn statements(&self) -> &[String] {
        &self.statements
    }
}

#[async_trait]
impl MigrationStep for SqlStep {
    async fn run(&self, tx: &mut dyn DatabaseTransaction) -> anyhow::Result<()> {
        for statement in &self.statements {
            tx.execute(statement, &[]).await?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), String> {
        if self.statements.is_empty() {
            return Err("no SQL statements".to_string());
        }
        match self.statements.iter().position(|s| s.trim().is_empty()) {
            Some(index) => Err(format!("SQL statement {} is blank", index + 1)),
            None => Ok(()),
        }
    }
}

/// Represents a database migration
#[derive(Clone)]
pub struct Migration {
    /// Unique identifier, stored in the tracking table once applied
    pub id: String,
    /// Human-readable name, not used for reconciliation
    pub name: String,
    /// Forward step
    pub forward: Arc<dyn MigrationStep>,
    /// Reverse step; `None` makes the migration irreversible
    pub backward: Option<Arc<dyn MigrationStep>>,
}

impl Migration {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        forward: impl MigrationStep + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            forward: Arc::new(forward),
            backward: None,
        }
    }

    /// Migration whose forward step is a single SQL statement
    pub fn sql(id: impl Into<String>, name: impl Into<String>, up_sql: impl Into<String>) -> Self {
        Self::new(id, name, SqlStep::new(up_sql))
    }

    pub fn with_backward(mut self, backward: impl MigrationStep + 'static) -> Self {
        self.backward = Some(Arc::new(backward));
        self
    }

    /// Backward step as a single SQL statement
    pub fn with_down_sql(self, down_sql: impl Into<String>) -> Self {
        self.with_backward(SqlStep::new(down_sql))
    }

    pub fn is_reversible(&self) -> bool {
        self.backward.is_some()
    }
}

impl fmt::Debug for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migration")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("reversible", &self.is_reversible())
            .finish()
    }
}

/// Result of running migrations
#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationRunResult {
    /// Number of migrations that were applied
    pub applied_count: usize,
    /// IDs of migrations that were applied, in order
    pub applied_migrations: Vec<String>,
    /// Number of migrations that were skipped (already applied)
    pub skipped_count: usize,
    /// IDs of migrations that were skipped
    pub skipped_migrations: Vec<String>,
    /// Total execution time in milliseconds
    pub execution_time_ms: u128,
}

/// Result of rolling back migrations
#[derive(Debug, Clone, Default, Serialize)]
pub struct RollbackResult {
    /// Number of migrations that were rolled back
    pub rolled_back_count: usize,
    /// IDs of migrations that were rolled back, in rollback order
    pub rolled_back_migrations: Vec<String>,
    /// IDs of reversible migrations that were not applied
    pub skipped_migrations: Vec<String>,
    /// IDs of migrations without a backward step
    pub irreversible_migrations: Vec<String>,
    /// Total execution time in milliseconds
    pub execution_time_ms: u128,
}

/// Migration direction for execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MigrationDirection {
    /// Apply the migration (run the forward step)
    Up,
    /// Rollback the migration (run the backward step)
    Down,
}

impl fmt::Display for MigrationDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationDirection::Up => write!(f, "migration"),
            MigrationDirection::Down => write!(f, "rollback"),
        }
    }
}

/// Migration status in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MigrationStatus {
    /// Migration is pending (not yet applied)
    Pending,
    /// Migration has been applied
    Applied,
}

/// Status of one registry entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationState {
    pub id: String,
    pub name: String,
    pub status: MigrationStatus,
    pub reversible: bool,
}

/// Registry status as seen by the tracking table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationStatusReport {
    /// One entry per registry migration, in registry order
    pub migrations: Vec<MigrationState>,
    /// Tracked ids the registry does not declare
    pub unknown_applied: Vec<String>,
}

impl MigrationStatusReport {
    pub fn pending(&self) -> impl Iterator<Item = &MigrationState> {
        self.migrations
            .iter()
            .filter(|m| m.status == MigrationStatus::Pending)
    }

    pub fn applied(&self) -> impl Iterator<Item = &MigrationState> {
        self.migrations
            .iter()
            .filter(|m| m.status == MigrationStatus::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_builder() {
        let migration = Migration::sql(
            "0001",
            "create_courses",
            "CREATE TABLE courses (id INTEGER PRIMARY KEY)",
        );
        assert!(!migration.is_reversible());

        let migration = migration.with_down_sql("DROP TABLE courses");
        assert!(migration.is_reversible());
        assert_eq!(migration.id, "0001");
        assert_eq!(migration.name, "create_courses");
    }

    #[test]
    fn test_migration_debug_hides_steps() {
        let migration = Migration::sql("7", "noop", "SELECT 1");
        let debug = format!("{:?}", migration);

        assert!(debug.contains("\"7\""));
        assert!(debug.contains("reversible: false"));
    }

    #[test]
    fn test_sql_step_batch_keeps_order() {
        let step = SqlStep::batch(["CREATE TABLE a (id INTEGER)", "CREATE TABLE b (id INTEGER)"]);

        assert_eq!(step.statements().len(), 2);
        assert!(step.statements()[0].contains("TABLE a"));
    }

    #[test]
    fn test_sql_step_rejects_blank_statements() {
        assert!(SqlStep::new("CREATE TABLE a (id INTEGER)").validate().is_ok());
        assert_eq!(
            SqlStep::new("   ").validate(),
            Err("SQL statement 1 is blank".to_string())
        );
        assert_eq!(
            SqlStep::batch(["CREATE TABLE a (id INTEGER)", ""]).validate(),
            Err("SQL statement 2 is blank".to_string())
        );
        assert!(SqlStep::batch(Vec::<String>::new()).validate().is_err());
    }

    #[test]
    fn test_direction_names_phase() {
        assert_eq!(MigrationDirection::Up.to_string(), "migration");
        assert_eq!(MigrationDirection::Down.to_string(), "rollback");
    }
}

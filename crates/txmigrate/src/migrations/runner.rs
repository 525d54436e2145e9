//! Migration Runner - Executes migrations against the database
//!
//! The [`Migrator`] walks the registry forward ([`Migrator::apply`]) or in
//! reverse ([`Migrator::rollback`]). Each migration that needs work runs in
//! its own transaction together with the insert or delete of its tracking
//! row, so the tracking table never disagrees with what was committed.
//!
//! The first failure stops the walk. Migrations committed before it stay
//! applied; nothing after it is attempted.

use std::collections::HashSet;
use std::time::Instant;

use super::definitions::{
    Migration, MigrationDirection, MigrationRunResult, MigrationState, MigrationStatus,
    MigrationStatusReport, MigrationStep, RollbackResult,
};
use crate::backends::{DatabaseValue, MigrationDatabase, SqlDialect};
use crate::config::MigrationConfig;
use crate::error::{DatabaseError, DatabaseResult, MigrationError, MigrationResult};
use crate::security::validate_migration_id;

/// Outcome of looking up a tracking row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingLookup {
    /// A tracking row exists; the migration is applied
    Found,
    /// No tracking row; the migration is not applied
    NotFound,
}

/// Applies and rolls back an ordered migration registry
pub struct Migrator<D> {
    db: D,
    migrations: Vec<Migration>,
    config: MigrationConfig,
}

impl<D: MigrationDatabase> Migrator<D> {
    /// Create a migrator with the default configuration
    pub fn new(db: D, migrations: Vec<Migration>) -> MigrationResult<Self> {
        Self::with_config(db, migrations, MigrationConfig::default())
    }

    /// Create a migrator with a custom configuration
    ///
    /// Rejects engines outside `config.supported_backends`, invalid
    /// configuration, registries with empty, oversized or duplicate ids, and
    /// steps whose `validate` fails (such as blank SQL).
    pub fn with_config(
        db: D,
        migrations: Vec<Migration>,
        config: MigrationConfig,
    ) -> MigrationResult<Self> {
        config.validate()?;

        let backend = db.backend_type();
        if !config.supports(&backend) {
            return Err(MigrationError::UnsupportedBackend(backend));
        }

        validate_registry(&migrations)?;

        Ok(Self {
            db,
            migrations,
            config,
        })
    }

    /// Get the database handle
    pub fn database(&self) -> &D {
        &self.db
    }

    /// Get the registry, in declaration order
    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    /// Get the configuration
    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Apply every migration without a tracking row, in registry order
    pub async fn apply(&self) -> MigrationResult<MigrationRunResult> {
        let start_time = Instant::now();
        self.ensure_migrations_table().await?;

        let mut result = MigrationRunResult::default();

        for migration in &self.migrations {
            match self.lookup(&migration.id, MigrationDirection::Up).await? {
                TrackingLookup::Found => {
                    tracing::info!(id = %migration.id, "Skipping migration: {}", migration.id);
                    result.skipped_migrations.push(migration.id.clone());
                    continue;
                }
                TrackingLookup::NotFound => {
                    tracing::info!(
                        id = %migration.id,
                        name = %migration.name,
                        "Running migration: {}",
                        migration.id
                    );
                }
            }

            self.run_in_transaction(
                migration,
                MigrationDirection::Up,
                migration.forward.as_ref(),
            )
            .await?;
            result.applied_migrations.push(migration.id.clone());
        }

        result.applied_count = result.applied_migrations.len();
        result.skipped_count = result.skipped_migrations.len();
        result.execution_time_ms = start_time.elapsed().as_millis();
        Ok(result)
    }

    /// Roll back every applied migration that has a backward step, in
    /// reverse registry order
    pub async fn rollback(&self) -> MigrationResult<RollbackResult> {
        let start_time = Instant::now();
        self.ensure_migrations_table().await?;

        let mut result = RollbackResult::default();

        for migration in self.migrations.iter().rev() {
            let backward = match &migration.backward {
                Some(backward) => backward,
                None => {
                    tracing::info!(id = %migration.id, "Rollback not provided: {}", migration.id);
                    result.irreversible_migrations.push(migration.id.clone());
                    continue;
                }
            };

            match self.lookup(&migration.id, MigrationDirection::Down).await? {
                TrackingLookup::NotFound => {
                    tracing::info!(id = %migration.id, "Skipping rollback: {}", migration.id);
                    result.skipped_migrations.push(migration.id.clone());
                    continue;
                }
                TrackingLookup::Found => {
                    tracing::info!(
                        id = %migration.id,
                        name = %migration.name,
                        "Running rollback: {}",
                        migration.id
                    );
                }
            }

            self.run_in_transaction(migration, MigrationDirection::Down, backward.as_ref())
                .await?;
            result.rolled_back_migrations.push(migration.id.clone());
        }

        result.rolled_back_count = result.rolled_back_migrations.len();
        result.execution_time_ms = start_time.elapsed().as_millis();
        Ok(result)
    }

    /// Get migration status for all migrations (applied and pending)
    ///
    /// Read-only with respect to tracking state: it creates the tracking
    /// table if absent but never inserts or deletes a tracking row.
    pub async fn status(&self) -> MigrationResult<MigrationStatusReport> {
        self.ensure_migrations_table().await?;

        let rows = self
            .db
            .fetch_all(&self.applied_ids_sql(), &[])
            .await
            .map_err(MigrationError::Status)?;

        let mut applied = Vec::with_capacity(rows.len());
        for row in &rows {
            let id = row
                .get_by_name("id")
                .map_err(MigrationError::Status)?
                .as_str()
                .ok_or_else(|| {
                    MigrationError::Status(DatabaseError::Other(
                        "Tracking id is not a string".to_string(),
                    ))
                })?;
            applied.push(id.to_string());
        }

        let applied_ids: HashSet<&str> = applied.iter().map(String::as_str).collect();
        let declared: HashSet<&str> = self.migrations.iter().map(|m| m.id.as_str()).collect();

        let migrations = self
            .migrations
            .iter()
            .map(|migration| MigrationState {
                id: migration.id.clone(),
                name: migration.name.clone(),
                status: if applied_ids.contains(migration.id.as_str()) {
                    MigrationStatus::Applied
                } else {
                    MigrationStatus::Pending
                },
                reversible: migration.is_reversible(),
            })
            .collect();

        let unknown_applied = applied
            .iter()
            .filter(|id| !declared.contains(id.as_str()))
            .cloned()
            .collect();

        Ok(MigrationStatusReport {
            migrations,
            unknown_applied,
        })
    }

    /// Ensure migrations table exists
    async fn ensure_migrations_table(&self) -> MigrationResult<()> {
        tracing::debug!(table = %self.config.migrations_table, "Ensuring migrations table");
        self.db
            .execute(&self.create_migrations_table_sql(), &[])
            .await
            .map_err(MigrationError::Bootstrap)?;
        Ok(())
    }

    /// Look up the tracking row for `id`
    async fn lookup(&self, id: &str, direction: MigrationDirection) -> MigrationResult<TrackingLookup> {
        self.find_tracking_record(id)
            .await
            .map_err(|source| MigrationError::Lookup {
                id: id.to_string(),
                direction,
                source,
            })
    }

    async fn find_tracking_record(&self, id: &str) -> DatabaseResult<TrackingLookup> {
        let row = self
            .db
            .fetch_optional(&self.check_migration_sql(), &[DatabaseValue::from(id)])
            .await?;

        Ok(match row {
            Some(_) => TrackingLookup::Found,
            None => TrackingLookup::NotFound,
        })
    }

    /// Run `step` and the tracking mutation for `direction` as one unit
    ///
    /// Either both take effect on commit or the transaction is discarded.
    /// A failure to discard is logged, never returned, so the caller sees
    /// the error that caused the unwind.
    async fn run_in_transaction(
        &self,
        migration: &Migration,
        direction: MigrationDirection,
        step: &dyn MigrationStep,
    ) -> MigrationResult<()> {
        let id = migration.id.as_str();

        let mut tx = self
            .db
            .begin_transaction()
            .await
            .map_err(|e| MigrationError::execution(id, direction, e))?;

        let tracking_sql = match direction {
            MigrationDirection::Up => self.record_migration_sql(),
            MigrationDirection::Down => self.remove_migration_sql(),
        };

        let outcome = match tx.execute(&tracking_sql, &[DatabaseValue::from(id)]).await {
            Ok(_) => step.run(tx.as_mut()).await,
            Err(e) => Err(e.into()),
        };

        if let Err(source) = outcome {
            if let Err(discard_error) = tx.rollback().await {
                tracing::warn!(
                    id = %id,
                    error = %discard_error,
                    "Failed to discard {} transaction",
                    direction
                );
            }
            return Err(MigrationError::execution(id, direction, source));
        }

        tx.commit()
            .await
            .map_err(|source| MigrationError::Commit {
                id: id.to_string(),
                direction,
                source,
            })?;

        tracing::debug!(id = %id, "Committed {}", direction);
        Ok(())
    }

    fn dialect(&self) -> SqlDialect {
        self.db.sql_dialect()
    }

    /// SQL to create the migrations tracking table
    fn create_migrations_table_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (id VARCHAR(63) PRIMARY KEY)",
            self.config.migrations_table
        )
    }

    /// SQL to check if a migration has been applied
    fn check_migration_sql(&self) -> String {
        format!(
            "SELECT id FROM {} WHERE id = {}",
            self.config.migrations_table,
            self.dialect().parameter_placeholder(0)
        )
    }

    /// SQL to record a migration as applied
    fn record_migration_sql(&self) -> String {
        format!(
            "INSERT INTO {} (id) VALUES ({})",
            self.config.migrations_table,
            self.dialect().parameter_placeholder(0)
        )
    }

    /// SQL to remove a migration record
    fn remove_migration_sql(&self) -> String {
        format!(
            "DELETE FROM {} WHERE id = {}",
            self.config.migrations_table,
            self.dialect().parameter_placeholder(0)
        )
    }

    /// SQL to list applied migrations
    fn applied_ids_sql(&self) -> String {
        format!("SELECT id FROM {}", self.config.migrations_table)
    }
}

impl<D> std::fmt::Debug for Migrator<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migrator")
            .field("migrations", &self.migrations)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn validate_registry(migrations: &[Migration]) -> MigrationResult<()> {
    let mut seen = HashSet::with_capacity(migrations.len());

    for migration in migrations {
        validate_migration_id(&migration.id).map_err(|reason| {
            MigrationError::InvalidMigrationId {
                id: migration.id.clone(),
                reason,
            }
        })?;

        if !seen.insert(migration.id.as_str()) {
            return Err(MigrationError::DuplicateMigration(migration.id.clone()));
        }

        let steps = std::iter::once((MigrationDirection::Up, &migration.forward))
            .chain(migration.backward.iter().map(|b| (MigrationDirection::Down, b)));
        for (direction, step) in steps {
            step.validate()
                .map_err(|reason| MigrationError::InvalidStep {
                    id: migration.id.clone(),
                    direction,
                    reason,
                })?;
        }
    }

    Ok(())
}

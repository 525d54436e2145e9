use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tempfile::TempDir;
use txmigrate::{
    step_fn, DatabaseValue, Migration, MigrationConfig, MigrationDirection, MigrationError,
    MigrationStatus, Migrator,
};

async fn create_sqlite_pool(dir: &TempDir) -> anyhow::Result<SqlitePool> {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("txmigrate=debug")
        .try_init();

    let options = SqliteConnectOptions::new()
        .filename(dir.path().join("migrations.db"))
        .create_if_missing(true);

    Ok(SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?)
}

async fn table_exists(pool: &SqlitePool, name: &str) -> anyhow::Result<bool> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(name)
            .fetch_one(pool)
            .await?;
    Ok(count > 0)
}

async fn tracked_ids(pool: &SqlitePool, table: &str) -> anyhow::Result<Vec<String>> {
    let ids = sqlx::query_scalar(&format!("SELECT id FROM {} ORDER BY id", table))
        .fetch_all(pool)
        .await?;
    Ok(ids)
}

fn courses() -> Migration {
    Migration::sql(
        "1",
        "create_courses",
        "CREATE TABLE courses (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
    )
    .with_down_sql("DROP TABLE courses")
}

fn users() -> Migration {
    Migration::sql(
        "2",
        "create_users",
        "CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT NOT NULL)",
    )
    .with_down_sql("DROP TABLE users")
}

#[tokio::test]
async fn sqlite_apply_rollback_apply() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let pool = create_sqlite_pool(&dir).await?;
    let migrator = Migrator::new(pool.clone(), vec![courses()])?;

    let first = migrator.apply().await?;
    assert_eq!(first.applied_migrations, vec!["1"]);

    let second = migrator.apply().await?;
    assert_eq!(second.applied_count, 0);
    assert_eq!(second.skipped_migrations, vec!["1"]);

    sqlx::query("INSERT INTO courses (name) VALUES ('Databases 101')")
        .execute(&pool)
        .await?;

    let rolled_back = migrator.rollback().await?;
    assert_eq!(rolled_back.rolled_back_migrations, vec!["1"]);
    assert!(!table_exists(&pool, "courses").await?);
    assert!(tracked_ids(&pool, "migrations").await?.is_empty());

    migrator.apply().await?;
    assert!(table_exists(&pool, "courses").await?);
    assert_eq!(tracked_ids(&pool, "migrations").await?, vec!["1"]);

    Ok(())
}

#[tokio::test]
async fn sqlite_tracking_table_is_trusted_over_schema() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let pool = create_sqlite_pool(&dir).await?;

    Migrator::new(pool.clone(), vec![courses()])?.apply().await?;
    sqlx::query("DROP TABLE courses").execute(&pool).await?;

    let migrator = Migrator::new(pool.clone(), vec![courses(), users()])?;
    let result = migrator.apply().await?;

    assert_eq!(result.applied_migrations, vec!["2"]);
    assert_eq!(result.skipped_migrations, vec!["1"]);
    assert!(!table_exists(&pool, "courses").await?);
    assert!(table_exists(&pool, "users").await?);
    assert_eq!(tracked_ids(&pool, "migrations").await?, vec!["1", "2"]);

    Ok(())
}

#[tokio::test]
async fn sqlite_failing_forward_leaves_no_trace() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let pool = create_sqlite_pool(&dir).await?;

    let broken = Migration::new(
        "3",
        "seed_then_fail",
        step_fn(|tx| {
            Box::pin(async move {
                tx.execute("CREATE TABLE tags (id INTEGER PRIMARY KEY)", &[])
                    .await?;
                tx.execute("INSERT INTO missing_table (id) VALUES (1)", &[])
                    .await?;
                anyhow::Ok(())
            })
        }),
    );
    let migrator = Migrator::new(pool.clone(), vec![courses(), users(), broken])?;

    let err = migrator.apply().await.unwrap_err();

    assert!(matches!(
        err,
        MigrationError::Execution { ref id, direction: MigrationDirection::Up, .. } if id == "3"
    ));
    assert!(!table_exists(&pool, "tags").await?);
    assert_eq!(tracked_ids(&pool, "migrations").await?, vec!["1", "2"]);

    Ok(())
}

#[tokio::test]
async fn sqlite_rollback_skips_irreversible() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let pool = create_sqlite_pool(&dir).await?;

    let seed = Migration::new(
        "3",
        "seed_courses",
        step_fn(|tx| {
            Box::pin(async move {
                tx.execute(
                    "INSERT INTO courses (name) VALUES (?)",
                    &[DatabaseValue::from("Compilers")],
                )
                .await?;
                anyhow::Ok(())
            })
        }),
    );
    let irreversible = Migration::sql(
        "2",
        "create_audit",
        "CREATE TABLE audit (id INTEGER PRIMARY KEY)",
    );
    let migrator = Migrator::new(pool.clone(), vec![courses(), irreversible, seed])?;

    migrator.apply().await?;
    let result = migrator.rollback().await?;

    assert_eq!(result.rolled_back_migrations, vec!["1"]);
    assert_eq!(result.irreversible_migrations, vec!["3", "2"]);
    assert!(table_exists(&pool, "audit").await?);
    assert!(!table_exists(&pool, "courses").await?);
    assert_eq!(tracked_ids(&pool, "migrations").await?, vec!["2", "3"]);

    Ok(())
}

#[tokio::test]
async fn sqlite_custom_table_and_status() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let pool = create_sqlite_pool(&dir).await?;
    let config = MigrationConfig::default().with_table("schema_history");

    Migrator::with_config(pool.clone(), vec![courses()], config.clone())?
        .apply()
        .await?;

    let migrator = Migrator::with_config(pool.clone(), vec![courses(), users()], config)?;
    let report = migrator.status().await?;

    assert!(table_exists(&pool, "schema_history").await?);
    assert!(!table_exists(&pool, "migrations").await?);
    assert_eq!(report.migrations[0].status, MigrationStatus::Applied);
    assert_eq!(report.migrations[1].status, MigrationStatus::Pending);
    assert!(report.unknown_applied.is_empty());

    Ok(())
}

#[tokio::test]
async fn sqlite_transaction_commit_and_rollback() -> anyhow::Result<()> {
    use txmigrate::MigrationDatabase;

    let dir = TempDir::new()?;
    let pool = create_sqlite_pool(&dir).await?;

    let mut tx = pool.begin_transaction().await?;
    tx.execute("CREATE TABLE drafts (id INTEGER PRIMARY KEY)", &[])
        .await?;
    tx.rollback().await?;
    assert!(!table_exists(&pool, "drafts").await?);

    let mut tx = pool.begin_transaction().await?;
    tx.execute("CREATE TABLE published (id INTEGER PRIMARY KEY)", &[])
        .await?;
    tx.commit().await?;
    assert!(table_exists(&pool, "published").await?);

    Ok(())
}

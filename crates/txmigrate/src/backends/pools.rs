//! sqlx Backend Implementations
//!
//! Implements [`MigrationDatabase`] directly on the sqlx SQLite, MySQL and
//! PostgreSQL pools, and [`DatabaseTransaction`] on [`SqlxTransaction`].
//! The three engines share identical code apart from their types, so the
//! impls are stamped out by `impl_sqlx_backend!`.

use async_trait::async_trait;
use sqlx::database::HasArguments;
use sqlx::query::Query;
use sqlx::{Column, ColumnIndex, Database, Decode, Encode, Row, Type};

use super::core::*;
use super::DatabaseBackendType;
use crate::error::{DatabaseError, DatabaseResult};

/// A sqlx transaction checked out from a pool
///
/// `commit` and `rollback` consume the box, so the inner transaction is
/// always live while the value exists.
pub struct SqlxTransaction<DB: Database> {
    tx: sqlx::Transaction<'static, DB>,
    backend: DatabaseBackendType,
}

impl<DB: Database> SqlxTransaction<DB> {
    pub fn new(tx: sqlx::Transaction<'static, DB>, backend: DatabaseBackendType) -> Self {
        Self { tx, backend }
    }
}

macro_rules! impl_sqlx_backend {
    ($db:ty, $backend:expr) => {
        #[async_trait]
        impl MigrationDatabase for sqlx::Pool<$db> {
            fn backend_type(&self) -> DatabaseBackendType {
                $backend
            }

            async fn execute(&self, sql: &str, params: &[DatabaseValue]) -> DatabaseResult<u64> {
                let query = bind_all(sqlx::query::<$db>(sql), params);
                let result = query.execute(self).await?;
                Ok(result.rows_affected())
            }

            async fn fetch_optional(
                &self,
                sql: &str,
                params: &[DatabaseValue],
            ) -> DatabaseResult<Option<DatabaseRow>> {
                let query = bind_all(sqlx::query::<$db>(sql), params);
                let row = query.fetch_optional(self).await?;
                row.as_ref().map(decode_row).transpose()
            }

            async fn fetch_all(
                &self,
                sql: &str,
                params: &[DatabaseValue],
            ) -> DatabaseResult<Vec<DatabaseRow>> {
                let query = bind_all(sqlx::query::<$db>(sql), params);
                let rows = query.fetch_all(self).await?;
                rows.iter().map(decode_row).collect()
            }

            async fn begin_transaction(&self) -> DatabaseResult<Box<dyn DatabaseTransaction>> {
                let tx = self.begin().await?;
                tracing::debug!("{} transaction started", $backend);
                Ok(Box::new(SqlxTransaction::<$db>::new(tx, $backend)))
            }
        }

        #[async_trait]
        impl DatabaseTransaction for SqlxTransaction<$db> {
            fn backend_type(&self) -> DatabaseBackendType {
                self.backend
            }

            async fn execute(
                &mut self,
                sql: &str,
                params: &[DatabaseValue],
            ) -> DatabaseResult<u64> {
                let query = bind_all(sqlx::query::<$db>(sql), params);
                let result = query.execute(&mut *self.tx).await?;
                Ok(result.rows_affected())
            }

            async fn fetch_optional(
                &mut self,
                sql: &str,
                params: &[DatabaseValue],
            ) -> DatabaseResult<Option<DatabaseRow>> {
                let query = bind_all(sqlx::query::<$db>(sql), params);
                let row = query.fetch_optional(&mut *self.tx).await?;
                row.as_ref().map(decode_row).transpose()
            }

            async fn fetch_all(
                &mut self,
                sql: &str,
                params: &[DatabaseValue],
            ) -> DatabaseResult<Vec<DatabaseRow>> {
                let query = bind_all(sqlx::query::<$db>(sql), params);
                let rows = query.fetch_all(&mut *self.tx).await?;
                rows.iter().map(decode_row).collect()
            }

            async fn commit(self: Box<Self>) -> DatabaseResult<()> {
                let this = *self;
                this.tx.commit().await?;
                Ok(())
            }

            async fn rollback(self: Box<Self>) -> DatabaseResult<()> {
                let this = *self;
                this.tx.rollback().await?;
                Ok(())
            }
        }
    };
}

impl_sqlx_backend!(sqlx::Sqlite, DatabaseBackendType::SQLite);
impl_sqlx_backend!(sqlx::MySql, DatabaseBackendType::MySQL);
impl_sqlx_backend!(sqlx::Postgres, DatabaseBackendType::PostgreSQL);

type SqlxQuery<'q, DB> = Query<'q, DB, <DB as HasArguments<'q>>::Arguments>;

/// Bind every parameter in order
fn bind_all<'q, DB>(mut query: SqlxQuery<'q, DB>, params: &[DatabaseValue]) -> SqlxQuery<'q, DB>
where
    DB: Database,
    Option<String>: Encode<'q, DB> + Type<DB>,
    bool: Encode<'q, DB> + Type<DB>,
    i32: Encode<'q, DB> + Type<DB>,
    i64: Encode<'q, DB> + Type<DB>,
    f64: Encode<'q, DB> + Type<DB>,
    String: Encode<'q, DB> + Type<DB>,
    Vec<u8>: Encode<'q, DB> + Type<DB>,
{
    for param in params {
        query = match param {
            DatabaseValue::Null => query.bind(Option::<String>::None),
            DatabaseValue::Bool(b) => query.bind(*b),
            DatabaseValue::Int32(i) => query.bind(*i),
            DatabaseValue::Int64(i) => query.bind(*i),
            DatabaseValue::Float64(f) => query.bind(*f),
            DatabaseValue::String(s) => query.bind(s.clone()),
            DatabaseValue::Bytes(b) => query.bind(b.clone()),
        };
    }
    query
}

/// Decode a sqlx row column by column
fn decode_row<R>(row: &R) -> DatabaseResult<DatabaseRow>
where
    R: Row,
    usize: ColumnIndex<R>,
    String: for<'r> Decode<'r, R::Database> + Type<R::Database>,
    i64: for<'r> Decode<'r, R::Database> + Type<R::Database>,
    i32: for<'r> Decode<'r, R::Database> + Type<R::Database>,
    f64: for<'r> Decode<'r, R::Database> + Type<R::Database>,
    bool: for<'r> Decode<'r, R::Database> + Type<R::Database>,
    Vec<u8>: for<'r> Decode<'r, R::Database> + Type<R::Database>,
{
    let columns = row
        .columns()
        .iter()
        .map(|column| column.name().to_string())
        .collect();

    let values = (0..row.len())
        .map(|index| decode_value(row, index))
        .collect::<DatabaseResult<Vec<_>>>()?;

    Ok(DatabaseRow::new(columns, values))
}

/// Try the supported Rust types in turn; sqlx rejects incompatible column
/// types before decoding, so the first success wins. NULL decodes as
/// `None` for the first attempt.
fn decode_value<R>(row: &R, index: usize) -> DatabaseResult<DatabaseValue>
where
    R: Row,
    usize: ColumnIndex<R>,
    String: for<'r> Decode<'r, R::Database> + Type<R::Database>,
    i64: for<'r> Decode<'r, R::Database> + Type<R::Database>,
    i32: for<'r> Decode<'r, R::Database> + Type<R::Database>,
    f64: for<'r> Decode<'r, R::Database> + Type<R::Database>,
    bool: for<'r> Decode<'r, R::Database> + Type<R::Database>,
    Vec<u8>: for<'r> Decode<'r, R::Database> + Type<R::Database>,
{
    if let Ok(value) = row.try_get::<Option<String>, _>(index) {
        return Ok(value.into());
    }
    if let Ok(value) = row.try_get::<Option<i64>, _>(index) {
        return Ok(value.into());
    }
    if let Ok(value) = row.try_get::<Option<i32>, _>(index) {
        return Ok(value.into());
    }
    if let Ok(value) = row.try_get::<Option<f64>, _>(index) {
        return Ok(value.into());
    }
    if let Ok(value) = row.try_get::<Option<bool>, _>(index) {
        return Ok(value.into());
    }

    row.try_get::<Option<Vec<u8>>, _>(index)
        .map(DatabaseValue::from)
        .map_err(|e| DatabaseError::UnsupportedValue {
            column: index,
            reason: e.to_string(),
        })
}

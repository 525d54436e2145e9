//! Core Database Backend Traits
//!
//! The migrator needs three things from a database: statements executed
//! outside a transaction (table bootstrap), single-row lookups that tell
//! "no row" apart from a failure, and transactions it can commit or discard.
//! [`MigrationDatabase`] and [`DatabaseTransaction`] capture exactly that.

use std::sync::Arc;

use async_trait::async_trait;

use super::DatabaseBackendType;
use crate::error::{DatabaseError, DatabaseResult};

/// Database handle a [`Migrator`](crate::Migrator) is bound to
#[async_trait]
pub trait MigrationDatabase: Send + Sync {
    /// Engine behind this handle, checked against the allow-list
    fn backend_type(&self) -> DatabaseBackendType;

    /// SQL dialect used to render tracking-table statements
    fn sql_dialect(&self) -> SqlDialect {
        self.backend_type().sql_dialect()
    }

    /// Execute a statement outside any transaction and return affected rows
    async fn execute(&self, sql: &str, params: &[DatabaseValue]) -> DatabaseResult<u64>;

    /// Fetch at most one row; `Ok(None)` means the query matched nothing
    async fn fetch_optional(
        &self,
        sql: &str,
        params: &[DatabaseValue],
    ) -> DatabaseResult<Option<DatabaseRow>>;

    /// Fetch every row
    async fn fetch_all(&self, sql: &str, params: &[DatabaseValue])
        -> DatabaseResult<Vec<DatabaseRow>>;

    /// Begin a transaction
    async fn begin_transaction(&self) -> DatabaseResult<Box<dyn DatabaseTransaction>>;
}

/// Transaction handed to migration steps
///
/// Dropping a transaction without calling [`commit`](Self::commit) discards it.
#[async_trait]
pub trait DatabaseTransaction: Send {
    /// Engine the transaction runs on
    fn backend_type(&self) -> DatabaseBackendType;

    /// SQL dialect of the underlying engine
    fn sql_dialect(&self) -> SqlDialect {
        self.backend_type().sql_dialect()
    }

    /// Execute a statement within the transaction
    async fn execute(&mut self, sql: &str, params: &[DatabaseValue]) -> DatabaseResult<u64>;

    /// Fetch at most one row within the transaction
    async fn fetch_optional(
        &mut self,
        sql: &str,
        params: &[DatabaseValue],
    ) -> DatabaseResult<Option<DatabaseRow>>;

    /// Fetch every row within the transaction
    async fn fetch_all(
        &mut self,
        sql: &str,
        params: &[DatabaseValue],
    ) -> DatabaseResult<Vec<DatabaseRow>>;

    /// Commit the transaction
    async fn commit(self: Box<Self>) -> DatabaseResult<()>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> DatabaseResult<()>;
}

#[async_trait]
impl<T> MigrationDatabase for Arc<T>
where
    T: MigrationDatabase + ?Sized,
{
    fn backend_type(&self) -> DatabaseBackendType {
        (**self).backend_type()
    }

    fn sql_dialect(&self) -> SqlDialect {
        (**self).sql_dialect()
    }

    async fn execute(&self, sql: &str, params: &[DatabaseValue]) -> DatabaseResult<u64> {
        (**self).execute(sql, params).await
    }

    async fn fetch_optional(
        &self,
        sql: &str,
        params: &[DatabaseValue],
    ) -> DatabaseResult<Option<DatabaseRow>> {
        (**self).fetch_optional(sql, params).await
    }

    async fn fetch_all(
        &self,
        sql: &str,
        params: &[DatabaseValue],
    ) -> DatabaseResult<Vec<DatabaseRow>> {
        (**self).fetch_all(sql, params).await
    }

    async fn begin_transaction(&self) -> DatabaseResult<Box<dyn DatabaseTransaction>> {
        (**self).begin_transaction().await
    }
}

/// Database value enumeration for type-safe parameter binding
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseValue {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    String(String),
    Bytes(Vec<u8>),
}

impl DatabaseValue {
    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, DatabaseValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DatabaseValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view, widening 32-bit values
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DatabaseValue::Int32(i) => Some(i64::from(*i)),
            DatabaseValue::Int64(i) => Some(*i),
            _ => None,
        }
    }
}

impl From<bool> for DatabaseValue {
    fn from(value: bool) -> Self {
        DatabaseValue::Bool(value)
    }
}

impl From<i32> for DatabaseValue {
    fn from(value: i32) -> Self {
        DatabaseValue::Int32(value)
    }
}

impl From<i64> for DatabaseValue {
    fn from(value: i64) -> Self {
        DatabaseValue::Int64(value)
    }
}

impl From<f64> for DatabaseValue {
    fn from(value: f64) -> Self {
        DatabaseValue::Float64(value)
    }
}

impl From<String> for DatabaseValue {
    fn from(value: String) -> Self {
        DatabaseValue::String(value)
    }
}

impl From<&str> for DatabaseValue {
    fn from(value: &str) -> Self {
        DatabaseValue::String(value.to_string())
    }
}

impl From<Vec<u8>> for DatabaseValue {
    fn from(value: Vec<u8>) -> Self {
        DatabaseValue::Bytes(value)
    }
}

impl<T> From<Option<T>> for DatabaseValue
where
    T: Into<DatabaseValue>,
{
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => DatabaseValue::Null,
        }
    }
}

/// A decoded result row
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DatabaseRow {
    columns: Vec<String>,
    values: Vec<DatabaseValue>,
}

impl DatabaseRow {
    pub fn new(columns: Vec<String>, values: Vec<DatabaseValue>) -> Self {
        Self { columns, values }
    }

    /// Get a column value by index
    pub fn get_by_index(&self, index: usize) -> DatabaseResult<&DatabaseValue> {
        self.values
            .get(index)
            .ok_or_else(|| DatabaseError::ColumnNotFound(index.to_string()))
    }

    /// Get a column value by name
    pub fn get_by_name(&self, name: &str) -> DatabaseResult<&DatabaseValue> {
        let index = self
            .columns
            .iter()
            .position(|column| column == name)
            .ok_or_else(|| DatabaseError::ColumnNotFound(name.to_string()))?;

        self.get_by_index(index)
    }

    pub fn column_count(&self) -> usize {
        self.values.len()
    }

    pub fn column_names(&self) -> &[String] {
        &self.columns
    }
}

/// SQL dialect enumeration for generating database-specific SQL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    PostgreSQL,
    MySQL,
    SQLite,
}

impl SqlDialect {
    /// Get the parameter placeholder style for this dialect
    pub fn parameter_placeholder(&self, index: usize) -> String {
        match self {
            SqlDialect::PostgreSQL => format!("${}", index + 1),
            SqlDialect::MySQL | SqlDialect::SQLite => "?".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_placeholders() {
        assert_eq!(SqlDialect::PostgreSQL.parameter_placeholder(0), "$1");
        assert_eq!(SqlDialect::PostgreSQL.parameter_placeholder(2), "$3");
        assert_eq!(SqlDialect::MySQL.parameter_placeholder(0), "?");
        assert_eq!(SqlDialect::SQLite.parameter_placeholder(4), "?");
    }

    #[test]
    fn test_row_lookup() {
        let row = DatabaseRow::new(
            vec!["id".to_string(), "count".to_string()],
            vec![DatabaseValue::from("0001"), DatabaseValue::from(3i64)],
        );

        assert_eq!(row.column_count(), 2);
        assert_eq!(row.get_by_name("id").unwrap().as_str(), Some("0001"));
        assert_eq!(row.get_by_index(1).unwrap().as_i64(), Some(3));
        assert!(matches!(
            row.get_by_name("missing"),
            Err(DatabaseError::ColumnNotFound(_))
        ));
    }

    #[test]
    fn test_optional_values() {
        assert!(DatabaseValue::from(None::<String>).is_null());
        assert_eq!(
            DatabaseValue::from(Some(7i32)),
            DatabaseValue::Int32(7)
        );
    }
}

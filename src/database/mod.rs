//! Persistence service consumed by the handlers.
//!
//! Every tenant-owned operation takes the tenant explicitly; implementations
//! match on `id AND tenant_id`, so a row owned by another clinic is reported
//! exactly like a row that does not exist.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::records::entities::TABLES;
use crate::records::Record;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A write would duplicate a value in a unique column
    #[error("Duplicate value for {table}.{column}")]
    Conflict { table: String, column: String },

    /// The caller handed the store something it can never write
    #[error("Malformed write: {0}")]
    Malformed(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

#[async_trait]
pub trait Persistence: Send + Sync {
    /// Row `id` if it belongs to `tenant`
    async fn get(&self, table: &str, id: &str, tenant: &str)
        -> Result<Option<Record>, PersistenceError>;

    /// All rows of `tenant`, newest first
    async fn list(&self, table: &str, tenant: &str) -> Result<Vec<Record>, PersistenceError>;

    /// First row whose `column` equals `value`, across tenants. Used to resolve
    /// a login e-mail before any tenant is known.
    async fn find_one(
        &self,
        table: &str,
        column: &str,
        value: &Value,
    ) -> Result<Option<Record>, PersistenceError>;

    async fn insert(&self, table: &str, fields: Record) -> Result<Record, PersistenceError>;

    /// Write `fields` onto row `id` of `tenant`; `None` when nothing matched
    async fn update(
        &self,
        table: &str,
        id: &str,
        tenant: &str,
        fields: Record,
    ) -> Result<Option<Record>, PersistenceError>;

    /// True when a row of `tenant` was removed
    async fn delete(&self, table: &str, id: &str, tenant: &str) -> Result<bool, PersistenceError>;

    async fn ping(&self) -> Result<(), PersistenceError>;
}

/// Columns that hold at most one row per value, across tenants. Mirrors the
/// `UNIQUE` constraints in `sql/schema.sql`.
pub const UNIQUE_COLUMNS: &[(&str, &str)] = &[("users", "email")];

pub(crate) fn unique_columns(table: &str) -> impl Iterator<Item = &'static str> + '_ {
    UNIQUE_COLUMNS
        .iter()
        .filter(move |(t, _)| *t == table)
        .map(|(_, column)| *column)
}

/// Reject any table outside the known schema before it reaches a query.
pub(crate) fn checked_table(table: &str) -> Result<&str, PersistenceError> {
    if TABLES.contains(&table) {
        Ok(table)
    } else {
        Err(PersistenceError::UnknownTable(table.to_string()))
    }
}

/// Column names are restricted to `[a-z0-9_]` before being quoted into SQL.
pub(crate) fn is_valid_column(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

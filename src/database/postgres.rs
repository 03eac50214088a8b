use async_trait::async_trait;
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use std::time::Duration;
use tracing::{debug, info};

use super::{checked_table, is_valid_column, unique_columns, Persistence, PersistenceError};
use crate::config::DatabaseConfig;
use crate::records::Record;

/// PostgreSQL store. Rows travel as JSON in both directions: reads come back
/// through `row_to_json`, writes go in through `jsonb_populate_record`, so no
/// per-column binding code is needed for any record type.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &DatabaseConfig) -> Result<Self, PersistenceError> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| PersistenceError::Unavailable("DATABASE_URL is not set".to_string()))?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout))
            .connect(url)
            .await?;

        sqlx::query("SELECT 1").execute(&pool).await?;
        info!(
            "Created database pool (max_connections={})",
            config.max_connections
        );
        Ok(Self::new(pool))
    }

}

/// Quote SQL identifier to prevent injection
fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn column_list(fields: &Record) -> Result<String, PersistenceError> {
    let mut columns = Vec::with_capacity(fields.len());
    for name in fields.keys() {
        if !is_valid_column(name) {
            return Err(PersistenceError::Malformed(format!(
                "invalid column name: {}",
                name
            )));
        }
        columns.push(quote_identifier(name));
    }
    Ok(columns.join(", "))
}

/// Report a unique violation (SQLSTATE 23505) as a conflict on the first
/// unique column the write touched.
fn write_error(err: sqlx::Error, table: &str, fields: &Record) -> PersistenceError {
    let unique_violation = err
        .as_database_error()
        .is_some_and(|db| db.is_unique_violation());
    if !unique_violation {
        return err.into();
    }
    let column = unique_columns(table)
        .find(|column| fields.contains_key(*column))
        .unwrap_or("unknown");
    PersistenceError::Conflict {
        table: table.to_string(),
        column: column.to_string(),
    }
}

fn into_record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        _ => Record::new(),
    }
}

fn row_record(row: &sqlx::postgres::PgRow) -> Result<Record, PersistenceError> {
    let value: Value = row.try_get("row")?;
    Ok(into_record(value))
}

#[async_trait]
impl Persistence for PgStore {
    async fn get(
        &self,
        table: &str,
        id: &str,
        tenant: &str,
    ) -> Result<Option<Record>, PersistenceError> {
        let table = quote_identifier(checked_table(table)?);
        let query = format!(
            "SELECT row_to_json(t) AS row FROM {} t WHERE t.id::text = $1 AND t.tenant_id = $2",
            table
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(tenant)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_record).transpose()
    }

    async fn list(&self, table: &str, tenant: &str) -> Result<Vec<Record>, PersistenceError> {
        let table = quote_identifier(checked_table(table)?);
        let query = format!(
            "SELECT row_to_json(t) AS row FROM {} t WHERE t.tenant_id = $1 ORDER BY t.created_at DESC",
            table
        );
        let rows = sqlx::query(&query)
            .bind(tenant)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_record).collect()
    }

    async fn find_one(
        &self,
        table: &str,
        column: &str,
        value: &Value,
    ) -> Result<Option<Record>, PersistenceError> {
        let table = quote_identifier(checked_table(table)?);
        if !is_valid_column(column) {
            return Err(PersistenceError::Malformed(format!(
                "invalid column name: {}",
                column
            )));
        }
        // Compare through jsonb so any scalar type binds the same way
        let query = format!(
            "SELECT row_to_json(t) AS row FROM {} t WHERE to_jsonb(t.{}) = $1 LIMIT 1",
            table,
            quote_identifier(column)
        );
        let row = sqlx::query(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_record).transpose()
    }

    async fn insert(&self, table: &str, fields: Record) -> Result<Record, PersistenceError> {
        let name = checked_table(table)?;
        let table = quote_identifier(name);
        let columns = column_list(&fields)?;
        let query = format!(
            "WITH t AS (INSERT INTO {table} ({columns}) \
             SELECT {columns} FROM jsonb_populate_record(NULL::{table}, $1) RETURNING *) \
             SELECT row_to_json(t) AS row FROM t",
        );
        debug!("Inserting into {}: {}", table, columns);

        let row = sqlx::query(&query)
            .bind(Value::Object(fields.clone()))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| write_error(e, name, &fields))?;
        row_record(&row)
    }

    async fn update(
        &self,
        table: &str,
        id: &str,
        tenant: &str,
        fields: Record,
    ) -> Result<Option<Record>, PersistenceError> {
        let name = checked_table(table)?;
        let table = quote_identifier(name);
        let columns = column_list(&fields)?;
        // A parenthesised column list must name at least two columns
        let target = if fields.len() == 1 {
            columns.clone()
        } else {
            format!("({})", columns)
        };
        let query = format!(
            "WITH t AS (UPDATE {table} SET {target} = \
             (SELECT {columns} FROM jsonb_populate_record(NULL::{table}, $1)) \
             WHERE id::text = $2 AND tenant_id = $3 RETURNING *) \
             SELECT row_to_json(t) AS row FROM t",
        );
        debug!("Updating {} in {}: {}", id, table, columns);

        let row = sqlx::query(&query)
            .bind(Value::Object(fields.clone()))
            .bind(id)
            .bind(tenant)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| write_error(e, name, &fields))?;
        row.as_ref().map(row_record).transpose()
    }

    async fn delete(&self, table: &str, id: &str, tenant: &str) -> Result<bool, PersistenceError> {
        let table = quote_identifier(checked_table(table)?);
        let query = format!(
            "DELETE FROM {} WHERE id::text = $1 AND tenant_id = $2",
            table
        );
        let result = sqlx::query(&query)
            .bind(id)
            .bind(tenant)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<(), PersistenceError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn quotes_identifiers() {
        assert_eq!(quote_identifier("patients"), "\"patients\"");
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn column_list_rejects_unsafe_names() {
        let ok = json!({ "first_name": "Ada", "type": "x" }).as_object().unwrap().clone();
        assert_eq!(column_list(&ok).unwrap(), "\"first_name\", \"type\"");

        let bad = json!({ "x\"; DROP TABLE users; --": 1 }).as_object().unwrap().clone();
        assert!(matches!(column_list(&bad), Err(PersistenceError::Malformed(_))));
    }

    #[test]
    fn non_constraint_errors_pass_through() {
        let fields = json!({ "email": "a@clinic.test" }).as_object().unwrap().clone();
        assert!(matches!(
            write_error(sqlx::Error::RowNotFound, "users", &fields),
            PersistenceError::Sqlx(_)
        ));
    }
}

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{checked_table, unique_columns, Persistence, PersistenceError};
use crate::records::{Record, TENANT_FIELD};

/// Process-local store keyed by table, then row id.
///
/// Used by the integration tests and by `--in-memory` runs. Contents are lost
/// on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, HashMap<String, Record>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn owned_by(record: &Record, tenant: &str) -> bool {
    record.get(TENANT_FIELD).and_then(Value::as_str) == Some(tenant)
}

/// First unique column of `table` where another row already holds the value
/// `fields` carries for it.
fn duplicate_of(
    rows: Option<&HashMap<String, Record>>,
    table: &str,
    id: &str,
    fields: &Record,
) -> Option<PersistenceError> {
    let rows = rows?;
    unique_columns(table).find_map(|column| {
        let value = fields.get(column).filter(|v| !v.is_null())?;
        rows.iter()
            .any(|(other, record)| other != id && record.get(column) == Some(value))
            .then(|| PersistenceError::Conflict {
                table: table.to_string(),
                column: column.to_string(),
            })
    })
}

fn created_at(record: &Record) -> &str {
    record.get("created_at").and_then(Value::as_str).unwrap_or("")
}

#[async_trait]
impl Persistence for MemoryStore {
    async fn get(
        &self,
        table: &str,
        id: &str,
        tenant: &str,
    ) -> Result<Option<Record>, PersistenceError> {
        let table = checked_table(table)?;
        let tables = self.tables.read().await;
        Ok(tables
            .get(table)
            .and_then(|rows| rows.get(id))
            .filter(|record| owned_by(record, tenant))
            .cloned())
    }

    async fn list(&self, table: &str, tenant: &str) -> Result<Vec<Record>, PersistenceError> {
        let table = checked_table(table)?;
        let tables = self.tables.read().await;
        let mut rows: Vec<Record> = tables
            .get(table)
            .map(|rows| {
                rows.values()
                    .filter(|record| owned_by(record, tenant))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        // RFC 3339 strings from one clock sort chronologically
        rows.sort_by(|a, b| created_at(b).cmp(created_at(a)));
        Ok(rows)
    }

    async fn find_one(
        &self,
        table: &str,
        column: &str,
        value: &Value,
    ) -> Result<Option<Record>, PersistenceError> {
        let table = checked_table(table)?;
        let tables = self.tables.read().await;
        Ok(tables
            .get(table)
            .and_then(|rows| rows.values().find(|record| record.get(column) == Some(value)))
            .cloned())
    }

    async fn insert(&self, table: &str, fields: Record) -> Result<Record, PersistenceError> {
        let table = checked_table(table)?;
        let id = fields
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| PersistenceError::Malformed("insert without id".to_string()))?
            .to_string();

        // Check and insert under one write lock so concurrent writers cannot
        // both claim a unique value
        let mut tables = self.tables.write().await;
        if let Some(conflict) = duplicate_of(tables.get(table), table, &id, &fields) {
            return Err(conflict);
        }
        tables
            .entry(table.to_string())
            .or_default()
            .insert(id, fields.clone());
        Ok(fields)
    }

    async fn update(
        &self,
        table: &str,
        id: &str,
        tenant: &str,
        fields: Record,
    ) -> Result<Option<Record>, PersistenceError> {
        let table = checked_table(table)?;
        let mut tables = self.tables.write().await;
        let rows = tables.get(table);
        if !rows
            .and_then(|rows| rows.get(id))
            .is_some_and(|record| owned_by(record, tenant))
        {
            return Ok(None);
        }
        if let Some(conflict) = duplicate_of(rows, table, id, &fields) {
            return Err(conflict);
        }
        let Some(record) = tables.get_mut(table).and_then(|rows| rows.get_mut(id)) else {
            return Ok(None);
        };

        for (column, value) in fields {
            if column == "id" || column == TENANT_FIELD {
                continue;
            }
            record.insert(column, value);
        }
        Ok(Some(record.clone()))
    }

    async fn delete(&self, table: &str, id: &str, tenant: &str) -> Result<bool, PersistenceError> {
        let table = checked_table(table)?;
        let mut tables = self.tables.write().await;
        let Some(rows) = tables.get_mut(table) else {
            return Ok(false);
        };
        if !rows.get(id).is_some_and(|record| owned_by(record, tenant)) {
            return Ok(false);
        }
        Ok(rows.remove(id).is_some())
    }

    async fn ping(&self) -> Result<(), PersistenceError> {
        Ok(())
    }
}

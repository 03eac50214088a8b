use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeSet;
use thiserror::Error;

use super::{Changeset, Entity, Patch, Record, SYSTEM_FIELDS, TENANT_FIELD, UPDATED_AT_FIELD};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MergeError {
    #[error("No fields to update")]
    NoFieldsToUpdate,

    #[error("Missing required fields: {}", .0.join(", "))]
    MissingRequiredFields(Vec<String>),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

/// Outcome of applying a sparse update to an existing row
#[derive(Debug, Clone, PartialEq)]
pub struct Merged {
    /// The full row as it will read after the write
    pub record: Record,
    /// Fields the caller touched, `updated_at` excluded
    pub changed: BTreeSet<String>,
    pub updated_at: DateTime<Utc>,
}

impl Merged {
    /// Columns and values to persist: every changed field plus `updated_at`.
    pub fn assignments(&self) -> Record {
        let mut columns = Record::new();
        for field in self.changed.iter().map(String::as_str).chain([UPDATED_AT_FIELD]) {
            let value = self.record.get(field).cloned().unwrap_or(Value::Null);
            columns.insert(field.to_string(), value);
        }
        columns
    }
}

/// Decode a request body into an entity's typed change set.
pub fn parse_changes<E: Entity>(payload: Value) -> Result<E::Changes, MergeError> {
    if !payload.is_object() {
        return Err(MergeError::InvalidPayload("Expected JSON object".to_string()));
    }
    serde_json::from_value(payload).map_err(|e| MergeError::InvalidPayload(e.to_string()))
}

/// Merge a typed change set into `existing` using the entity's schema.
pub fn merge<E: Entity>(
    existing: &Record,
    changes: E::Changes,
    now: DateTime<Utc>,
) -> Result<Merged, MergeError> {
    merge_fields(existing, E::FIELDS, E::REQUIRED, changes.into_changes(), now)
}

/// The merge algorithm shared by every record type.
///
/// For each schema field: an unset patch keeps the existing value, `Null`
/// clears it and `Value` replaces it. `updated_at` is always refreshed. Nothing
/// is produced unless at least one schema field was proposed.
pub fn merge_fields(
    existing: &Record,
    fields: &[&str],
    required: &[&str],
    proposed: Vec<(&str, Patch<Value>)>,
    now: DateTime<Utc>,
) -> Result<Merged, MergeError> {
    let mut record = existing.clone();
    let mut changed = BTreeSet::new();
    let mut cleared_required = Vec::new();

    for (field, patch) in proposed {
        if !fields.contains(&field) || SYSTEM_FIELDS.contains(&field) {
            continue;
        }
        match patch {
            Patch::Unset => continue,
            Patch::Null => {
                if required.contains(&field) {
                    cleared_required.push(field.to_string());
                    continue;
                }
                record.insert(field.to_string(), Value::Null);
            }
            Patch::Value(value) => {
                record.insert(field.to_string(), value);
            }
        }
        changed.insert(field.to_string());
    }

    if !cleared_required.is_empty() {
        return Err(MergeError::MissingRequiredFields(cleared_required));
    }
    if changed.is_empty() {
        return Err(MergeError::NoFieldsToUpdate);
    }

    record.insert(UPDATED_AT_FIELD.to_string(), Value::String(now.to_rfc3339()));

    Ok(Merged {
        record,
        changed,
        updated_at: now,
    })
}

/// Assemble a new row from a change set: schema fields the caller set, then
/// defaults for what was left unset, then server-owned columns.
pub fn build_new<E: Entity>(
    changes: E::Changes,
    id: &str,
    tenant_id: &str,
    now: DateTime<Utc>,
) -> Result<Record, MergeError> {
    let mut record = Record::new();

    for (field, patch) in changes.into_changes() {
        if SYSTEM_FIELDS.contains(&field) {
            continue;
        }
        match patch {
            Patch::Unset => {}
            Patch::Null => {
                record.insert(field.to_string(), Value::Null);
            }
            Patch::Value(value) => {
                record.insert(field.to_string(), value);
            }
        }
    }

    for (field, value) in E::defaults() {
        if !is_present(record.get(field)) {
            record.insert(field.to_string(), value);
        }
    }

    let missing: Vec<String> = E::REQUIRED
        .iter()
        .filter(|field| !is_present(record.get(**field)))
        .map(|field| field.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(MergeError::MissingRequiredFields(missing));
    }

    let timestamp = Value::String(now.to_rfc3339());
    record.insert("id".to_string(), Value::String(id.to_string()));
    record.insert(TENANT_FIELD.to_string(), Value::String(tenant_id.to_string()));
    record.insert("created_at".to_string(), timestamp.clone());
    record.insert(UPDATED_AT_FIELD.to_string(), timestamp);

    Ok(record)
}

/// Presence check: null and blank strings count as missing
fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    define_entity! {
        struct Person / PersonChanges {
            table: "people",
            path: "/api/people",
            label: "Person",
            required: ["name"],
            writers: [],
            deleters: [Admin],
            defaults: { "status": "active" },
            fields: {
                name: String,
                age: i64,
                kind = "type": String,
                status: String,
            },
        }
    }

    fn existing() -> Record {
        json!({
            "id": "p-1",
            "tenant_id": "clinic-a",
            "name": "A",
            "age": 30,
            "updated_at": "2024-01-01T00:00:00+00:00"
        })
        .as_object()
        .unwrap()
        .clone()
    }

    fn changes(payload: Value) -> PersonChanges {
        parse_changes::<Person>(payload).unwrap()
    }

    #[test]
    fn null_clears_and_absent_keeps() {
        let now = Utc::now();
        let merged = merge::<Person>(&existing(), changes(json!({ "age": null })), now).unwrap();

        assert_eq!(merged.record["name"], "A");
        assert_eq!(merged.record["age"], Value::Null);
        assert_eq!(merged.changed, BTreeSet::from(["age".to_string()]));
        assert_eq!(merged.record["updated_at"], json!(now.to_rfc3339()));
        assert_eq!(merged.record["tenant_id"], "clinic-a");
    }

    #[test]
    fn value_replaces() {
        let merged =
            merge::<Person>(&existing(), changes(json!({ "age": 31, "type": "outpatient" })), Utc::now())
                .unwrap();

        assert_eq!(merged.record["age"], 31);
        assert_eq!(merged.record["type"], "outpatient");
        assert_eq!(
            merged.changed,
            BTreeSet::from(["age".to_string(), "type".to_string()])
        );
    }

    #[test]
    fn empty_proposal_is_rejected() {
        assert_eq!(
            merge::<Person>(&existing(), changes(json!({})), Utc::now()),
            Err(MergeError::NoFieldsToUpdate)
        );
    }

    #[test]
    fn unknown_and_system_fields_do_not_count() {
        let result = merge::<Person>(
            &existing(),
            changes(json!({ "tenant_id": "clinic-b", "id": "p-9", "favourite_colour": "red" })),
            Utc::now(),
        );
        assert_eq!(result, Err(MergeError::NoFieldsToUpdate));
    }

    #[test]
    fn required_field_cannot_be_cleared() {
        assert_eq!(
            merge::<Person>(&existing(), changes(json!({ "name": null })), Utc::now()),
            Err(MergeError::MissingRequiredFields(vec!["name".to_string()]))
        );
    }

    #[test]
    fn assignments_cover_changed_fields_and_timestamp() {
        let merged = merge::<Person>(&existing(), changes(json!({ "age": null })), Utc::now()).unwrap();
        let columns = merged.assignments();

        assert_eq!(columns.len(), 2);
        assert_eq!(columns["age"], Value::Null);
        assert!(columns["updated_at"].is_string());
    }

    #[test]
    fn merge_fields_works_without_an_entity() {
        let merged = merge_fields(
            &existing(),
            &["name", "age"],
            &[],
            vec![("age", Patch::Null), ("name", Patch::Unset)],
            Utc::now(),
        )
        .unwrap();
        assert_eq!(merged.record["name"], "A");
        assert_eq!(merged.record["age"], Value::Null);
    }

    #[test]
    fn build_new_stamps_server_columns() {
        let now = Utc::now();
        let record = build_new::<Person>(
            changes(json!({ "name": "Ada", "tenant_id": "clinic-b" })),
            "p-2",
            "clinic-a",
            now,
        )
        .unwrap();

        assert_eq!(record["id"], "p-2");
        assert_eq!(record["tenant_id"], "clinic-a");
        assert_eq!(record["status"], "active");
        assert_eq!(record["created_at"], record["updated_at"]);
        assert!(!record.contains_key("age"));
    }

    #[test]
    fn build_new_reports_missing_required() {
        let err = build_new::<Person>(changes(json!({ "name": "  " })), "p-3", "clinic-a", Utc::now())
            .unwrap_err();
        assert_eq!(err, MergeError::MissingRequiredFields(vec!["name".to_string()]));
    }

    #[test]
    fn non_object_payload_is_invalid() {
        assert!(matches!(
            parse_changes::<Person>(json!([1, 2])),
            Err(MergeError::InvalidPayload(_))
        ));
    }
}

// Handlers are grouped by security tier:
// public (no auth) → protected (JWT auth) → elevated (JWT auth + admin role)
pub mod elevated;
pub mod protected;
pub mod public;

use serde::Serialize;
use serde_json::Value;

use crate::auth::{IdentityClaims, IssuedToken, Role};
use crate::error::ApiError;
use crate::records::Record;

pub(crate) const USERS_TABLE: &str = "users";

/// Columns of a user row that never leave the server
const PRIVATE_USER_FIELDS: &[&str] = &["password_hash"];

/// Body returned by register, login and refresh
#[derive(Debug, Serialize)]
pub struct SessionPayload {
    pub user: Record,
    #[serde(flatten)]
    pub token: IssuedToken,
}

/// A user row with the credential columns removed
pub(crate) fn user_view(mut row: Record) -> Record {
    for field in PRIVATE_USER_FIELDS {
        row.remove(*field);
    }
    row
}

fn text<'a>(row: &'a Record, column: &str) -> Option<&'a str> {
    row.get(column).and_then(Value::as_str)
}

pub(crate) fn is_active(row: &Record) -> bool {
    row.get("is_active").and_then(Value::as_bool).unwrap_or(true)
}

/// The claims a token for this user row should carry
pub(crate) fn identity_of(row: &Record) -> Result<IdentityClaims, ApiError> {
    let (Some(id), Some(email), Some(role), Some(tenant_id)) = (
        text(row, "id"),
        text(row, "email"),
        text(row, "role"),
        text(row, "tenant_id"),
    ) else {
        tracing::error!("User row is missing identity columns");
        return Err(ApiError::internal_server_error(
            "An error occurred while processing your request",
        ));
    };

    let role: Role = role.parse().map_err(|e| {
        tracing::error!("User {} has unusable role: {}", id, e);
        ApiError::internal_server_error("An error occurred while processing your request")
    })?;

    Ok(IdentityClaims {
        subject_id: id.to_string(),
        email: email.to_string(),
        role,
        tenant_id: tenant_id.to_string(),
    })
}

/// Trimmed value of an optional request string, `None` when blank
pub(crate) fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row() -> Record {
        json!({
            "id": "u-1",
            "email": "doc@clinic.test",
            "role": "doctor",
            "tenant_id": "main",
            "password_hash": "$2b$04$abc",
            "is_active": true
        })
        .as_object()
        .unwrap()
        .clone()
    }

    #[test]
    fn user_view_hides_hash() {
        let view = user_view(row());
        assert!(!view.contains_key("password_hash"));
        assert_eq!(view["email"], "doc@clinic.test");
    }

    #[test]
    fn identity_comes_from_row() {
        let claims = identity_of(&row()).unwrap();
        assert_eq!(claims.subject_id, "u-1");
        assert_eq!(claims.role, Role::Doctor);
        assert_eq!(claims.tenant_id, "main");
    }

    #[test]
    fn bad_role_is_a_server_error() {
        let mut row = row();
        row.insert("role".to_string(), json!("janitor"));
        assert!(identity_of(&row).is_err());
    }

    #[test]
    fn non_blank_trims() {
        assert_eq!(non_blank(&Some("  a ".to_string())), Some("a"));
        assert_eq!(non_blank(&Some("   ".to_string())), None);
        assert_eq!(non_blank(&None), None);
    }
}

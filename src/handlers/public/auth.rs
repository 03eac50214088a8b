use axum::{extract::rejection::JsonRejection, extract::State, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::{HashedCredential, Role, UnknownRole};
use crate::database::PersistenceError;
use crate::error::ApiError;
use crate::handlers::{identity_of, is_active, non_blank, user_view, SessionPayload, USERS_TABLE};
use crate::middleware::{ApiResponse, ApiResult};
use crate::records::Record;
use crate::state::AppState;

/// Tenant assigned when a registration names none
pub const DEFAULT_TENANT: &str = "main";

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
    pub role: Option<String>,
    pub department: Option<String>,
    #[serde(alias = "clinic_id")]
    pub tenant_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// E-mails are matched case-insensitively
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// POST /api/auth/register - Create a user account and sign it in
///
/// The only place a caller picks a tenant: `tenant_id` (or `clinic_id`)
/// defaults to `main`.
pub async fn register_post(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<SessionPayload> {
    let Json(request) = payload?;

    let email = non_blank(&request.email);
    let name = non_blank(&request.name);
    let role = non_blank(&request.role);
    // Passwords are taken verbatim; only emptiness is checked
    let password = request.password.as_deref().filter(|p| !p.is_empty());

    let missing: Vec<&str> = [
        ("email", email.is_none()),
        ("password", password.is_none()),
        ("name", name.is_none()),
        ("role", role.is_none()),
    ]
    .into_iter()
    .filter_map(|(field, absent)| absent.then_some(field))
    .collect();

    let (Some(email), Some(password), Some(name), Some(role)) = (email, password, name, role)
    else {
        return Err(ApiError::missing_fields(missing));
    };

    let role: Role = role.parse().map_err(|e: UnknownRole| {
        ApiError::validation_error(
            "Invalid role",
            Some(BTreeMap::from([("role".to_string(), e.to_string())])),
        )
    })?;

    let email = normalize_email(email);
    let tenant_id = non_blank(&request.tenant_id).unwrap_or(DEFAULT_TENANT);

    let user = create_user(
        &state,
        NewUser {
            email: &email,
            password,
            name,
            role,
            department: non_blank(&request.department),
            tenant_id,
        },
    )
    .await?;

    let claims = identity_of(&user)?;
    let token = state.tokens.issue(&claims, state.tokens.default_ttl())?;
    info!("Registered user {} ({}) in tenant {}", claims.subject_id, role, tenant_id);

    Ok(ApiResponse::created(SessionPayload {
        user: user_view(user),
        token,
    }))
}

/// Fields for a freshly created account
pub(crate) struct NewUser<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub name: &'a str,
    pub role: Role,
    pub department: Option<&'a str>,
    pub tenant_id: &'a str,
}

/// Insert a user row, refusing an e-mail that is already registered.
pub(crate) async fn create_user(state: &AppState, user: NewUser<'_>) -> Result<Record, ApiError> {
    let email = json!(user.email);
    if state.store.find_one(USERS_TABLE, "email", &email).await?.is_some() {
        return Err(ApiError::conflict("User already exists"));
    }

    let password_hash = state
        .credentials
        .hash_blocking(user.password.to_string())
        .await?;

    let now = Value::String(Utc::now().to_rfc3339());
    let row: Record = [
        ("id", json!(Uuid::new_v4().to_string())),
        ("name", json!(user.name)),
        ("email", email),
        ("password_hash", json!(password_hash.into_string())),
        ("role", json!(user.role.as_str())),
        ("department", json!(user.department)),
        ("profile_image", Value::Null),
        ("tenant_id", json!(user.tenant_id)),
        ("is_active", Value::Bool(true)),
        ("last_login", Value::Null),
        ("created_at", now.clone()),
        ("updated_at", now),
    ]
    .into_iter()
    .map(|(column, value)| (column.to_string(), value))
    .collect();

    // The lookup above skips hashing for the common case; the store's unique
    // index settles concurrent registrations
    state.store.insert(USERS_TABLE, row).await.map_err(|e| match e {
        PersistenceError::Conflict { .. } => ApiError::conflict("User already exists"),
        other => other.into(),
    })
}

/// POST /api/auth/login - Exchange e-mail and password for a token
///
/// Unknown e-mail, wrong password and inactive account all produce the same
/// 401 so callers cannot probe which accounts exist.
pub async fn login_post(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<SessionPayload> {
    let Json(request) = payload?;

    let email = non_blank(&request.email);
    let password = request.password.as_deref().filter(|p| !p.is_empty());
    let (Some(email), Some(password)) = (email, password) else {
        let mut missing = Vec::new();
        if email.is_none() {
            missing.push("email");
        }
        if password.is_none() {
            missing.push("password");
        }
        return Err(ApiError::missing_fields(missing));
    };

    let email = normalize_email(email);
    let invalid = || ApiError::unauthorized("Invalid credentials");

    let Some(user) = state
        .store
        .find_one(USERS_TABLE, "email", &json!(email))
        .await?
    else {
        warn!("Login failed: unknown e-mail");
        return Err(invalid());
    };

    let stored = user
        .get("password_hash")
        .and_then(Value::as_str)
        .map(HashedCredential::from_stored);
    let verified = match stored {
        Some(stored) => {
            state
                .credentials
                .verify_blocking(password.to_string(), stored)
                .await
        }
        None => false,
    };
    if !verified || !is_active(&user) {
        warn!("Login failed for {}", email);
        return Err(invalid());
    }

    let claims = identity_of(&user)?;
    let now = Value::String(Utc::now().to_rfc3339());
    let stamp = Record::from_iter([("last_login".to_string(), now)]);
    let user = state
        .store
        .update(USERS_TABLE, &claims.subject_id, &claims.tenant_id, stamp)
        .await?
        .unwrap_or(user);

    let token = state.tokens.issue(&claims, state.tokens.default_ttl())?;
    info!("User {} logged in", claims.subject_id);

    Ok(ApiResponse::success(SessionPayload {
        user: user_view(user),
        token,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails_are_normalized() {
        assert_eq!(normalize_email("  Dr.Who@Clinic.TEST "), "dr.who@clinic.test");
    }

    #[test]
    fn register_accepts_clinic_id_alias() {
        let request: RegisterRequest = serde_json::from_value(json!({
            "email": "a@b.c",
            "clinic_id": "north"
        }))
        .unwrap();
        assert_eq!(request.tenant_id.as_deref(), Some("north"));
        assert!(request.password.is_none());
    }
}

use axum::{extract::rejection::JsonRejection, extract::State, Extension, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::auth::HashedCredential;
use crate::error::ApiError;
use crate::handlers::{identity_of, is_active, user_view, SessionPayload, USERS_TABLE};
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::records::{entities::UserProfile, merge, parse_changes, Record};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PasswordChangeRequest {
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

/// What the presented token says about its bearer
#[derive(Debug, Serialize)]
pub struct WhoAmI {
    #[serde(flatten)]
    pub claims: crate::auth::IdentityClaims,
    pub expires_at: chrono::DateTime<Utc>,
}

/// The caller's own user row, scoped by subject and tenant
async fn own_row(state: &AppState, user: &AuthUser) -> Result<Record, ApiError> {
    state
        .store
        .get(USERS_TABLE, user.subject_id(), user.tenant_id())
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))
}

/// GET /api/auth/me - The caller's user record
pub async fn me_get(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Record> {
    Ok(ApiResponse::success(user_view(own_row(&state, &user).await?)))
}

/// GET /api/auth/whoami - Token claims, without touching the store
pub async fn whoami_get(Extension(user): Extension<AuthUser>) -> ApiResult<WhoAmI> {
    Ok(ApiResponse::success(WhoAmI {
        claims: user.claims().clone(),
        expires_at: user.expires_at(),
    }))
}

/// PUT /api/auth/profile - Partial update of name, department and picture
pub async fn profile_put(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Record> {
    let Json(payload) = payload?;
    let changes = parse_changes::<UserProfile>(payload)?;

    let existing = own_row(&state, &user).await?;
    let merged = merge::<UserProfile>(&existing, changes, Utc::now())?;
    tracing::debug!("Profile update for {}: {:?}", user.subject_id(), merged.changed);

    let updated = state
        .store
        .update(
            USERS_TABLE,
            user.subject_id(),
            user.tenant_id(),
            merged.assignments(),
        )
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(ApiResponse::success(user_view(updated)))
}

/// PUT /api/auth/password - Replace the caller's password
pub async fn password_put(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<PasswordChangeRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(request) = payload?;
    let current = request.current_password.filter(|p| !p.is_empty());
    let new = request.new_password.filter(|p| !p.is_empty());
    let (Some(current), Some(new)) = (current.clone(), new.clone()) else {
        let missing = [
            ("current_password", current.is_none()),
            ("new_password", new.is_none()),
        ]
        .into_iter()
        .filter_map(|(field, absent)| absent.then_some(field));
        return Err(ApiError::missing_fields(missing));
    };

    let row = own_row(&state, &user).await?;
    let stored = row
        .get("password_hash")
        .and_then(Value::as_str)
        .map(HashedCredential::from_stored);
    let verified = match stored {
        Some(stored) => state.credentials.verify_blocking(current, stored).await,
        None => false,
    };
    if !verified {
        tracing::warn!("Password change rejected for {}", user.subject_id());
        return Err(ApiError::unauthorized("Current password is incorrect"));
    }

    let hash = state.credentials.hash_blocking(new).await?;
    let columns: Record = [
        ("password_hash".to_string(), Value::String(hash.into_string())),
        ("updated_at".to_string(), Value::String(Utc::now().to_rfc3339())),
    ]
    .into_iter()
    .collect();

    state
        .store
        .update(USERS_TABLE, user.subject_id(), user.tenant_id(), columns)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    info!("User {} changed password", user.subject_id());
    Ok(ApiResponse::success(serde_json::json!({ "updated": true })))
}

/// POST /api/auth/refresh - Re-read the user and issue a fresh token
///
/// Role changes and deactivation take effect here rather than mid-token.
pub async fn refresh_post(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<SessionPayload> {
    let row = state
        .store
        .get(USERS_TABLE, user.subject_id(), user.tenant_id())
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired token"))?;

    if !is_active(&row) {
        tracing::warn!("Refresh refused for inactive user {}", user.subject_id());
        return Err(ApiError::unauthorized("Invalid or expired token"));
    }

    let claims = identity_of(&row)?;
    let token = state.tokens.issue(&claims, state.tokens.default_ttl())?;

    Ok(ApiResponse::success(SessionPayload {
        user: user_view(row),
        token,
    }))
}

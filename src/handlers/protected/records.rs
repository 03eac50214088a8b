//! CRUD handlers shared by every record type.
//!
//! Each handler is generic over [`Entity`]; the router instantiates them once
//! per record type. Tenant scoping comes from the caller's token only.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Extension, Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::ApiError;
use crate::middleware::{authorize, ApiResponse, ApiResult, AuthUser};
use crate::records::{build_new, merge, parse_changes, Entity, Record};
use crate::state::AppState;

fn not_found<E: Entity>() -> ApiError {
    ApiError::not_found(format!("{} not found", E::LABEL))
}

/// GET <path> - The caller's clinic rows, newest first
pub async fn list<E: Entity>(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Vec<Record>> {
    let rows = state.store.list(E::TABLE, user.tenant_id()).await?;
    Ok(ApiResponse::success(rows))
}

/// GET <path>/:id
pub async fn show<E: Entity>(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<Record> {
    let row = state
        .store
        .get(E::TABLE, &id, user.tenant_id())
        .await?
        .ok_or_else(not_found::<E>)?;
    Ok(ApiResponse::success(row))
}

/// POST <path> - Create a row stamped with the caller's tenant
pub async fn create<E: Entity>(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Record> {
    authorize(&user, E::WRITERS)?;
    let Json(payload) = payload?;

    let changes = parse_changes::<E>(payload)?;
    let id = Uuid::new_v4().to_string();
    let row = build_new::<E>(changes, &id, user.tenant_id(), Utc::now())?;

    let created = state.store.insert(E::TABLE, row).await?;
    tracing::info!("Created {} {} for tenant {}", E::LABEL, id, user.tenant_id());
    Ok(ApiResponse::created(created))
}

/// PUT/PATCH <path>/:id - Merge a sparse update into the stored row
pub async fn update<E: Entity>(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Record> {
    authorize(&user, E::WRITERS)?;
    let Json(payload) = payload?;
    let changes = parse_changes::<E>(payload)?;

    let existing = state
        .store
        .get(E::TABLE, &id, user.tenant_id())
        .await?
        .ok_or_else(not_found::<E>)?;

    let merged = merge::<E>(&existing, changes, Utc::now())?;
    tracing::debug!("Updating {} {}: {:?}", E::LABEL, id, merged.changed);

    let updated = state
        .store
        .update(E::TABLE, &id, user.tenant_id(), merged.assignments())
        .await?
        .ok_or_else(not_found::<E>)?;
    Ok(ApiResponse::success(updated))
}

/// DELETE <path>/:id
pub async fn delete<E: Entity>(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    authorize(&user, E::DELETERS)?;

    if !state.store.delete(E::TABLE, &id, user.tenant_id()).await? {
        return Err(not_found::<E>());
    }
    tracing::info!("Deleted {} {} for tenant {}", E::LABEL, id, user.tenant_id());
    Ok(ApiResponse::success(json!({ "id": id, "deleted": true })))
}

use axum::{extract::State, Extension};

use crate::handlers::{user_view, USERS_TABLE};
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::records::Record;
use crate::state::AppState;

/// GET /api/users - Staff directory of the admin's own clinic
pub async fn users_get(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Vec<Record>> {
    let rows = state.store.list(USERS_TABLE, user.tenant_id()).await?;
    Ok(ApiResponse::success(rows.into_iter().map(user_view).collect()))
}

pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod records;
pub mod state;

use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Router,
};
use tracing::info;

use crate::auth::Role;
use crate::config::AdminBootstrap;
use crate::handlers::protected::records as record_handlers;
use crate::handlers::public::auth::{create_user, normalize_email, NewUser, DEFAULT_TENANT};
use crate::handlers::{elevated, protected, public, USERS_TABLE};
use crate::middleware::jwt_auth_middleware;
use crate::records::entities::*;
use crate::records::Entity;
use crate::state::AppState;

pub use crate::error::ApiError;

const ADMIN_ONLY: &[Role] = &[Role::Admin];

/// The full HTTP application, minus transport-level layers added by the binary
pub fn app(state: AppState) -> Router {
    let body_limit = state.config.server.max_request_size_bytes;

    let protected = Router::new()
        .merge(auth_routes())
        .merge(record_routes())
        .merge(
            elevated_routes().route_layer(from_fn_with_state(ADMIN_ONLY, middleware::require_roles)),
        )
        .route_layer(from_fn_with_state(state.clone(), jwt_auth_middleware));

    Router::new()
        // Public
        .route("/", get(public::root_get))
        .route("/health", get(public::health_get))
        .merge(auth_public_routes())
        // Protected API
        .merge(protected)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

fn auth_public_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/register", post(public::register_post))
        .route("/api/auth/login", post(public::login_post))
}

fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/me", get(protected::me_get))
        .route("/api/auth/whoami", get(protected::whoami_get))
        .route(UserProfile::PATH, put(protected::profile_put))
        .route("/api/auth/password", put(protected::password_put))
        .route("/api/auth/refresh", post(protected::refresh_post))
}

fn elevated_routes() -> Router<AppState> {
    Router::new().route("/api/users", get(elevated::users_get))
}

fn record_routes() -> Router<AppState> {
    Router::new()
        .merge(entity_routes::<Patient>())
        .merge(entity_routes::<Doctor>())
        .merge(entity_routes::<Appointment>())
        .merge(entity_routes::<TriageRecord>())
        .merge(entity_routes::<VitalSign>())
        .merge(entity_routes::<ImagingStudy>())
        .merge(entity_routes::<AntenatalVisit>())
        .merge(entity_routes::<Surgery>())
        .merge(entity_routes::<Vaccination>())
        .merge(entity_routes::<LabTest>())
        .merge(entity_routes::<Prescription>())
        .merge(entity_routes::<InventoryItem>())
        .merge(entity_routes::<DispensingRecord>())
        .merge(entity_routes::<Payment>())
        .merge(entity_routes::<Invoice>())
        .merge(entity_routes::<MedicalVisit>())
}

/// Collection and member routes for one record type
fn entity_routes<E: Entity>() -> Router<AppState> {
    Router::new()
        .route(E::PATH, get(record_handlers::list::<E>).post(record_handlers::create::<E>))
        .route(
            &format!("{}/:id", E::PATH),
            get(record_handlers::show::<E>)
                .put(record_handlers::update::<E>)
                .patch(record_handlers::update::<E>)
                .delete(record_handlers::delete::<E>),
        )
}

/// Seed the configured admin account unless its e-mail is already taken.
pub async fn bootstrap_admin(state: &AppState, admin: &AdminBootstrap) -> Result<bool, ApiError> {
    let email = normalize_email(&admin.email);
    if state
        .store
        .find_one(USERS_TABLE, "email", &serde_json::json!(email))
        .await?
        .is_some()
    {
        return Ok(false);
    }

    let seeded = create_user(
        state,
        NewUser {
            email: &email,
            password: &admin.password,
            name: "Administrator",
            role: Role::Admin,
            department: None,
            tenant_id: DEFAULT_TENANT,
        },
    )
    .await;
    match seeded {
        Ok(_) => {}
        // Another instance seeded the same account first
        Err(ApiError::Conflict(_)) => return Ok(false),
        Err(e) => return Err(e),
    }
    info!("Seeded admin user {} in tenant {}", email, DEFAULT_TENANT);
    Ok(true)
}

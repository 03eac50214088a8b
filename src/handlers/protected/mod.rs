// Tier 2: JWT authentication required
pub mod auth;
pub mod records;

pub use auth::{me_get, password_put, profile_put, refresh_post, whoami_get};

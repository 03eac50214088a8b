// Tier 1: no authentication required
pub mod auth;
pub mod health;

pub use auth::{login_post, register_post};
pub use health::{health_get, root_get};

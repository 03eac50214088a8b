pub mod auth;
pub mod response;

pub use auth::{authenticate, authorize, jwt_auth_middleware, require_roles, AuthUser};
pub use response::{ApiResponse, ApiResult};

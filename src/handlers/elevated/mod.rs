// Tier 3: JWT authentication plus the admin role
pub mod users;

pub use users::users_get;

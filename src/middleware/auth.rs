use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};

use crate::auth::{AuthError, IdentityClaims, Role, TokenService};
use crate::error::ApiError;
use crate::state::AppState;

/// Authenticated caller, attached to the request by [`jwt_auth_middleware`].
///
/// Only [`authenticate`] constructs one, so holding an `AuthUser` proves the
/// token was verified.
#[derive(Clone, Debug)]
pub struct AuthUser {
    claims: IdentityClaims,
    expires_at: DateTime<Utc>,
}

impl AuthUser {
    pub fn claims(&self) -> &IdentityClaims {
        &self.claims
    }

    pub fn subject_id(&self) -> &str {
        &self.claims.subject_id
    }

    pub fn tenant_id(&self) -> &str {
        &self.claims.tenant_id
    }

    pub fn role(&self) -> Role {
        self.claims.role
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

/// JWT authentication middleware that validates tokens and attaches the caller
pub async fn jwt_auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_user = authenticate(request.headers(), &state.tokens)?;
    request.extensions_mut().insert(auth_user);
    Ok(next.run(request).await)
}

/// Admit only callers whose role is in `allowed`. Layer it inside
/// [`jwt_auth_middleware`].
pub async fn require_roles(
    State(allowed): State<&'static [Role]>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_user = request
        .extensions()
        .get::<AuthUser>()
        .ok_or(AuthError::NoTokenProvided)?;
    authorize(auth_user, allowed)?;
    Ok(next.run(request).await)
}

/// Verify the bearer token in `headers` and recover the caller's identity.
pub fn authenticate(headers: &HeaderMap, tokens: &TokenService) -> Result<AuthUser, AuthError> {
    let token = extract_jwt_from_headers(headers).map_err(|reason| {
        tracing::debug!("Rejected request: {}", reason);
        AuthError::NoTokenProvided
    })?;

    let verified = tokens.verify(token).map_err(|_| {
        tracing::warn!("Rejected request: invalid or expired token");
        AuthError::InvalidOrExpiredToken
    })?;

    Ok(AuthUser {
        claims: verified.claims,
        expires_at: verified.expires_at,
    })
}

/// An empty `allowed` set admits any authenticated caller.
pub fn authorize(user: &AuthUser, allowed: &[Role]) -> Result<(), AuthError> {
    if allowed.is_empty() || allowed.contains(&user.role()) {
        Ok(())
    } else {
        tracing::warn!(
            "User {} with role {} denied; requires one of {:?}",
            user.subject_id(),
            user.role(),
            allowed
        );
        Err(AuthError::InsufficientRole)
    }
}

/// Extract JWT token from Authorization header
fn extract_jwt_from_headers(headers: &HeaderMap) -> Result<&str, &'static str> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .ok_or("missing Authorization header")?;

    let auth_str = auth_header
        .to_str()
        .map_err(|_| "invalid Authorization header encoding")?;

    let token = auth_str
        .strip_prefix("Bearer ")
        .ok_or("Authorization header must use Bearer token format")?
        .trim();

    if token.is_empty() {
        return Err("empty bearer token");
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use std::time::Duration;

    fn tokens() -> TokenService {
        TokenService::new(b"test-secret", Duration::from_secs(3600))
    }

    fn claims(role: Role) -> IdentityClaims {
        IdentityClaims {
            subject_id: "u-1".to_string(),
            email: "nurse@clinic.test".to_string(),
            role,
            tenant_id: "clinic-a".to_string(),
        }
    }

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    fn user(role: Role) -> AuthUser {
        let issued = tokens().issue(&claims(role), Duration::from_secs(60)).unwrap();
        authenticate(&headers(&format!("Bearer {}", issued.token)), &tokens()).unwrap()
    }

    #[test]
    fn accepts_a_valid_bearer_token() {
        let user = user(Role::Nurse);
        assert_eq!(user.claims(), &claims(Role::Nurse));
        assert_eq!(user.tenant_id(), "clinic-a");
    }

    #[test]
    fn missing_or_malformed_header_is_no_token() {
        assert_eq!(
            authenticate(&HeaderMap::new(), &tokens()).unwrap_err(),
            AuthError::NoTokenProvided
        );
        assert_eq!(
            authenticate(&headers(""), &tokens()).unwrap_err(),
            AuthError::NoTokenProvided
        );
        assert_eq!(
            authenticate(&headers("Token abc"), &tokens()).unwrap_err(),
            AuthError::NoTokenProvided
        );
        assert_eq!(
            authenticate(&headers("Bearer   "), &tokens()).unwrap_err(),
            AuthError::NoTokenProvided
        );
    }

    #[test]
    fn bad_token_is_invalid() {
        let issued = tokens().issue(&claims(Role::Nurse), Duration::from_secs(60)).unwrap();
        let other = TokenService::new(b"other-secret", Duration::from_secs(60));
        assert_eq!(
            authenticate(&headers(&format!("Bearer {}", issued.token)), &other).unwrap_err(),
            AuthError::InvalidOrExpiredToken
        );
        assert_eq!(
            authenticate(&headers("Bearer not.a.jwt"), &tokens()).unwrap_err(),
            AuthError::InvalidOrExpiredToken
        );
    }

    #[test]
    fn authorize_checks_membership() {
        let nurse = user(Role::Nurse);
        assert!(authorize(&nurse, &[]).is_ok());
        assert!(authorize(&nurse, &[Role::Admin, Role::Nurse]).is_ok());
        assert_eq!(
            authorize(&nurse, &[Role::Admin]).unwrap_err(),
            AuthError::InsufficientRole
        );
    }
}

//! Signed, time-limited identity tokens
//!
//! Tokens are HS256 JWTs. The algorithm is pinned on decode, expiry is checked
//! against an explicit clock with no leeway, and every failure collapses into
//! [`TokenError::Invalid`].

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use super::{IdentityClaims, Role};
use crate::config::SecurityConfig;

/// Shortest lifetime a token can carry; `exp` has whole-second resolution.
pub const MIN_TTL: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum TokenError {
    /// Malformed, wrongly signed or expired. Deliberately carries no detail.
    #[error("Invalid token")]
    Invalid,

    #[error("Token lifetime out of range")]
    InvalidTtl,

    #[error("Token signing failed: {0}")]
    Signing(String),
}

/// Payload stored in the JWT
#[derive(Debug, Serialize, Deserialize)]
struct TokenClaims {
    sub: String,
    email: String,
    role: Role,
    tenant_id: String,
    iat: i64,
    exp: i64,
}

/// A freshly signed token and when it stops being accepted
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Claims recovered from a token that passed verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    pub claims: IdentityClaims,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Issues and verifies identity tokens with a process-wide signing key
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    default_ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &[u8], default_ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is enforced in verify_at against the caller's clock
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            default_ttl,
        }
    }

    pub fn from_config(config: &SecurityConfig) -> Self {
        Self::new(config.jwt_secret.as_bytes(), config.token_ttl)
    }

    /// Lifetime used for tokens issued at login and registration
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn issue(&self, claims: &IdentityClaims, ttl: Duration) -> Result<IssuedToken, TokenError> {
        self.issue_at(claims, ttl, Utc::now())
    }

    pub fn issue_at(
        &self,
        claims: &IdentityClaims,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenError> {
        if ttl < MIN_TTL {
            return Err(TokenError::InvalidTtl);
        }
        let ttl = chrono::Duration::from_std(ttl).map_err(|_| TokenError::InvalidTtl)?;
        let expires_at = now.checked_add_signed(ttl).ok_or(TokenError::InvalidTtl)?;

        // Round up so the token never lapses before now + ttl
        let mut exp = expires_at.timestamp();
        if expires_at.timestamp_subsec_nanos() > 0 {
            exp += 1;
        }

        let payload = TokenClaims {
            sub: claims.subject_id.clone(),
            email: claims.email.clone(),
            role: claims.role,
            tenant_id: claims.tenant_id.clone(),
            iat: now.timestamp(),
            exp,
        };

        let token = encode(&Header::new(Algorithm::HS256), &payload, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))?;

        Ok(IssuedToken {
            token,
            expires_at: timestamp(payload.exp)?,
        })
    }

    pub fn verify(&self, token: &str) -> Result<VerifiedToken, TokenError> {
        self.verify_at(token, Utc::now())
    }

    /// Valid only while the signature is intact and `now < exp`.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<VerifiedToken, TokenError> {
        let data = decode::<TokenClaims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            tracing::debug!("Token rejected: {}", e);
            TokenError::Invalid
        })?;
        let payload = data.claims;
        let expires_at = timestamp(payload.exp)?;

        if now >= expires_at {
            tracing::debug!("Token rejected: expired at {}", expires_at);
            return Err(TokenError::Invalid);
        }

        Ok(VerifiedToken {
            issued_at: timestamp(payload.iat)?,
            expires_at,
            claims: IdentityClaims {
                subject_id: payload.sub,
                email: payload.email,
                role: payload.role,
                tenant_id: payload.tenant_id,
            },
        })
    }
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, TokenError> {
    Utc.timestamp_opt(secs, 0).single().ok_or(TokenError::Invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn service() -> TokenService {
        TokenService::new(b"unit-test-secret", Duration::from_secs(3600))
    }

    fn claims() -> IdentityClaims {
        IdentityClaims {
            subject_id: "7f1d2c4e-user".to_string(),
            email: "nurse@clinic.test".to_string(),
            role: Role::Nurse,
            tenant_id: "clinic-a".to_string(),
        }
    }

    #[test]
    fn verifies_fresh_token() {
        let now = Utc::now();
        let issued = service().issue_at(&claims(), Duration::from_secs(60), now).unwrap();

        let verified = service().verify_at(&issued.token, now).unwrap();
        assert_eq!(verified.claims, claims());
        assert_eq!(verified.expires_at, issued.expires_at);
    }

    #[test]
    fn rejects_once_ttl_elapses() {
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let issued = service().issue_at(&claims(), Duration::from_secs(60), now).unwrap();

        assert!(service()
            .verify_at(&issued.token, now + ChronoDuration::seconds(59))
            .is_ok());
        assert!(matches!(
            service().verify_at(&issued.token, now + ChronoDuration::seconds(60)),
            Err(TokenError::Invalid)
        ));
        assert!(matches!(
            service().verify_at(&issued.token, now + ChronoDuration::days(1)),
            Err(TokenError::Invalid)
        ));
    }

    #[test]
    fn sub_second_issue_time_never_shortens_lifetime() {
        let issued_at = Utc.timestamp_opt(1_700_000_000, 900_000_000).unwrap();
        let ttl = Duration::from_secs(60);
        let issued = service().issue_at(&claims(), ttl, issued_at).unwrap();
        let nominal_expiry = issued_at + ChronoDuration::seconds(60);

        assert!(issued.expires_at >= nominal_expiry);
        assert!(service().verify_at(&issued.token, issued_at).is_ok());
        assert!(service()
            .verify_at(&issued.token, issued_at + ChronoDuration::milliseconds(59_200))
            .is_ok());
        assert!(service()
            .verify_at(&issued.token, nominal_expiry - ChronoDuration::milliseconds(1))
            .is_ok());
        assert!(matches!(
            service().verify_at(&issued.token, issued.expires_at),
            Err(TokenError::Invalid)
        ));
    }

    #[test]
    fn rejects_lifetimes_below_one_second() {
        let now = Utc.timestamp_opt(1_700_000_000, 200_000_000).unwrap();
        assert!(matches!(
            service().issue_at(&claims(), Duration::from_millis(500), now),
            Err(TokenError::InvalidTtl)
        ));
        let issued = service().issue_at(&claims(), MIN_TTL, now).unwrap();
        assert!(service().verify_at(&issued.token, now).is_ok());
    }

    #[test]
    fn rejects_tampered_signature() {
        let issued = service().issue(&claims(), Duration::from_secs(60)).unwrap();
        let signature_start = issued.token.rfind('.').unwrap() + 1;
        let mut bytes = issued.token.into_bytes();
        bytes[signature_start] = if bytes[signature_start] == b'a' { b'b' } else { b'a' };
        let tampered = String::from_utf8(bytes).unwrap();

        assert!(matches!(service().verify(&tampered), Err(TokenError::Invalid)));
    }

    #[test]
    fn rejects_foreign_key_and_garbage() {
        let issued = service().issue(&claims(), Duration::from_secs(60)).unwrap();
        let other = TokenService::new(b"another-secret", Duration::from_secs(60));

        assert!(matches!(other.verify(&issued.token), Err(TokenError::Invalid)));
        assert!(matches!(service().verify("not.a.token"), Err(TokenError::Invalid)));
        assert!(matches!(service().verify(""), Err(TokenError::Invalid)));
    }

    #[test]
    fn rejects_other_algorithms() {
        let payload = TokenClaims {
            sub: "x".into(),
            email: "x@clinic.test".into(),
            role: Role::Admin,
            tenant_id: "clinic-a".into(),
            iat: Utc::now().timestamp(),
            exp: Utc::now().timestamp() + 60,
        };
        let token = encode(
            &Header::new(Algorithm::HS512),
            &payload,
            &EncodingKey::from_secret(b"unit-test-secret"),
        )
        .unwrap();

        assert!(matches!(service().verify(&token), Err(TokenError::Invalid)));
    }

    #[test]
    fn rejects_out_of_range_ttl() {
        assert!(matches!(
            service().issue(&claims(), Duration::from_secs(u64::MAX)),
            Err(TokenError::InvalidTtl)
        ));
    }
}

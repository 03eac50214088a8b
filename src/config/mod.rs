use serde::Serialize;
use std::env;
use std::time::Duration;
use thiserror::Error;

use crate::auth::token::MIN_TTL;

/// Cost bounds enforced by `bcrypt` (the crate keeps its own constants private).
pub(crate) const BCRYPT_MIN_COST: u32 = 4;
const BCRYPT_MAX_COST: u32 = 31;

/// Placeholder secret used by non-production profiles when `JWT_SECRET` is unset.
const DEV_JWT_SECRET: &str = "change-this-secret-in-production";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing configuration: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub max_request_size_bytes: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseConfig {
    /// Postgres connection string; `None` selects the in-memory store
    pub url: Option<String>,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SecurityConfig {
    #[serde(skip_serializing)]
    pub jwt_secret: String,
    #[serde(serialize_with = "serialize_ttl")]
    pub token_ttl: Duration,
    pub bcrypt_cost: u32,
    pub admin: Option<AdminBootstrap>,
}

/// Credentials for the admin account seeded at startup
#[derive(Debug, Clone, Serialize)]
pub struct AdminBootstrap {
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
}

fn serialize_ttl<S: serde::Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&humantime::format_duration(*value).to_string())
}

impl AppConfig {
    /// Build the configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = match lookup("APP_ENV").as_deref() {
            Some("production") | Some("prod") => Environment::Production,
            Some("staging") | Some("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        let config = match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        };

        config.with_overrides(&lookup)
    }

    fn with_overrides<F>(mut self, lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Server overrides
        if let Some(v) = lookup("HOST") {
            self.server.host = v;
        }
        if let Some(v) = lookup("PORT") {
            self.server.port = parse("PORT", &v)?;
        }
        if let Some(v) = lookup("CORS_ORIGIN") {
            self.server.cors_origins = v.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Some(v) = lookup("API_MAX_REQUEST_SIZE_BYTES") {
            self.server.max_request_size_bytes = parse("API_MAX_REQUEST_SIZE_BYTES", &v)?;
        }

        // Database overrides
        if let Some(v) = lookup("DATABASE_URL") {
            if !v.trim().is_empty() {
                self.database.url = Some(v);
            }
        }
        if let Some(v) = lookup("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse("DATABASE_MAX_CONNECTIONS", &v)?;
        }
        if let Some(v) = lookup("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = parse("DATABASE_CONNECTION_TIMEOUT", &v)?;
        }

        // Security overrides
        match lookup("JWT_SECRET") {
            Some(v) if !v.is_empty() => self.security.jwt_secret = v,
            _ if self.environment == Environment::Production => {
                return Err(ConfigError::Missing("JWT_SECRET"));
            }
            _ => {}
        }
        if let Some(v) = lookup("JWT_EXPIRES_IN") {
            self.security.token_ttl =
                humantime::parse_duration(&v).map_err(|e| ConfigError::Invalid {
                    key: "JWT_EXPIRES_IN",
                    message: e.to_string(),
                })?;
        }
        if self.security.token_ttl < MIN_TTL {
            return Err(ConfigError::Invalid {
                key: "JWT_EXPIRES_IN",
                message: "token lifetime must be at least one second".to_string(),
            });
        }
        if let Some(v) = lookup("BCRYPT_COST") {
            self.security.bcrypt_cost = parse("BCRYPT_COST", &v)?;
        }
        if !(BCRYPT_MIN_COST..=BCRYPT_MAX_COST).contains(&self.security.bcrypt_cost) {
            return Err(ConfigError::Invalid {
                key: "BCRYPT_COST",
                message: format!(
                    "cost must be between {} and {}",
                    BCRYPT_MIN_COST,
                    BCRYPT_MAX_COST
                ),
            });
        }
        if let (Some(email), Some(password)) = (lookup("ADMIN_EMAIL"), lookup("ADMIN_PASSWORD")) {
            if !email.is_empty() && !password.is_empty() {
                self.security.admin = Some(AdminBootstrap { email, password });
            }
        }

        Ok(self)
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 5000,
                cors_origins: vec!["http://localhost:5173".to_string()],
                max_request_size_bytes: 10 * 1024 * 1024, // 10MB
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 10,
                connection_timeout: 30,
            },
            security: SecurityConfig {
                jwt_secret: DEV_JWT_SECRET.to_string(),
                token_ttl: Duration::from_secs(7 * 24 * 60 * 60), // 1 week
                bcrypt_cost: 10,
                admin: None,
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 5000,
                cors_origins: vec!["https://staging.example.com".to_string()],
                max_request_size_bytes: 5 * 1024 * 1024, // 5MB
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 20,
                connection_timeout: 10,
            },
            security: SecurityConfig {
                jwt_secret: DEV_JWT_SECRET.to_string(),
                token_ttl: Duration::from_secs(24 * 60 * 60),
                bcrypt_cost: 10,
                admin: None,
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 5000,
                cors_origins: vec!["https://app.example.com".to_string()],
                max_request_size_bytes: 2 * 1024 * 1024, // 2MB
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 50,
                connection_timeout: 5,
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                token_ttl: Duration::from_secs(4 * 60 * 60),
                bcrypt_cost: 12,
                admin: None,
            },
        }
    }

    /// Configuration for tests: in-memory store, cheap hashing.
    pub fn for_tests() -> Self {
        let mut config = Self::development();
        config.security.jwt_secret = "test-secret-with-enough-entropy-0123456789".to_string();
        config.security.bcrypt_cost = BCRYPT_MIN_COST;
        config.security.token_ttl = Duration::from_secs(60 * 60);
        config
    }
}

fn parse<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_development_config() {
        let config = AppConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.security.bcrypt_cost, 10);
        assert_eq!(config.security.token_ttl, Duration::from_secs(7 * 24 * 3600));
        assert!(config.database.url.is_none());
    }

    #[test]
    fn test_production_requires_secret() {
        let err = AppConfig::from_lookup(lookup_from(&[("APP_ENV", "production")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("JWT_SECRET")));

        let config = AppConfig::from_lookup(lookup_from(&[
            ("APP_ENV", "production"),
            ("JWT_SECRET", "prod-secret"),
        ]))
        .unwrap();
        assert_eq!(config.security.jwt_secret, "prod-secret");
        assert_eq!(config.security.token_ttl, Duration::from_secs(4 * 3600));
    }

    #[test]
    fn test_duration_and_cost_overrides() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("JWT_EXPIRES_IN", "7d"),
            ("BCRYPT_COST", "4"),
            ("DATABASE_URL", "postgres://localhost/clinic"),
        ]))
        .unwrap();
        assert_eq!(config.security.token_ttl, Duration::from_secs(7 * 86400));
        assert_eq!(config.security.bcrypt_cost, 4);
        assert_eq!(config.database.url.as_deref(), Some("postgres://localhost/clinic"));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(AppConfig::from_lookup(lookup_from(&[("JWT_EXPIRES_IN", "soon")])).is_err());
        assert!(AppConfig::from_lookup(lookup_from(&[("JWT_EXPIRES_IN", "0s")])).is_err());
        assert!(AppConfig::from_lookup(lookup_from(&[("JWT_EXPIRES_IN", "500ms")])).is_err());
        assert!(AppConfig::from_lookup(lookup_from(&[("BCRYPT_COST", "2")])).is_err());
        assert!(AppConfig::from_lookup(lookup_from(&[("PORT", "http")])).is_err());
    }

    #[test]
    fn test_admin_bootstrap_needs_both_values() {
        let config =
            AppConfig::from_lookup(lookup_from(&[("ADMIN_EMAIL", "admin@clinic.test")])).unwrap();
        assert!(config.security.admin.is_none());

        let config = AppConfig::from_lookup(lookup_from(&[
            ("ADMIN_EMAIL", "admin@clinic.test"),
            ("ADMIN_PASSWORD", "hunter22"),
        ]))
        .unwrap();
        assert_eq!(config.security.admin.unwrap().email, "admin@clinic.test");
    }
}

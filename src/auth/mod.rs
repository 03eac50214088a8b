//! Identity, credentials and tokens.
//!
//! Claims are minted once by [`TokenService::issue`] and only read back through
//! [`TokenService::verify`]; nothing else in the crate constructs identity for a
//! request.

pub mod credentials;
pub mod token;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub use credentials::{CredentialCodec, CredentialError, HashedCredential};
pub use token::{IssuedToken, TokenError, TokenService};

/// Staff roles recognised by the access guard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Doctor,
    Nurse,
    Receptionist,
    Pharmacist,
    LabTechnician,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Doctor => "doctor",
            Role::Nurse => "nurse",
            Role::Receptionist => "receptionist",
            Role::Pharmacist => "pharmacist",
            Role::LabTechnician => "lab_technician",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("Unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "doctor" => Ok(Role::Doctor),
            "nurse" => Ok(Role::Nurse),
            "receptionist" => Ok(Role::Receptionist),
            "pharmacist" => Ok(Role::Pharmacist),
            "lab_technician" => Ok(Role::LabTechnician),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// Who the caller is and which clinic they act for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    pub subject_id: String,
    pub email: String,
    pub role: Role,
    pub tenant_id: String,
}

/// Access guard failures. Messages are safe to return to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("No token provided")]
    NoTokenProvided,

    #[error("Invalid or expired token")]
    InvalidOrExpiredToken,

    #[error("Insufficient permissions")]
    InsufficientRole,
}

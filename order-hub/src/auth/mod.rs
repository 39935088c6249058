//! 认证与授权
//!
//! Token issuance lives outside this service. The core only needs the
//! verified principal `{user_id, tenant_id, role}`:
//!
//! - [`TokenVerifier`]: bearer credential → [`Principal`]
//! - [`JwtVerifier`]: HS256 implementation
//! - `Principal` axum extractor + role checks

mod extractor;
mod jwt;

pub use extractor::authenticate;
pub use jwt::{Claims, JwtVerifier};

use serde::{Deserialize, Serialize};
use shared::error::{AppError, ErrorCode};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Staff role inside a tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Manager,
    /// 厨房/前厅操作员
    Staff,
}

impl Role {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Manager => "MANAGER",
            Role::Staff => "STAFF",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ADMIN" => Ok(Role::Admin),
            "MANAGER" => Ok(Role::Manager),
            "STAFF" => Ok(Role::Staff),
            other => Err(AuthError::Invalid(format!("unknown role {other}"))),
        }
    }
}

/// Role sets used by the route guards
pub const ANY_STAFF: &[Role] = &[Role::Admin, Role::Manager, Role::Staff];
pub const MANAGEMENT: &[Role] = &[Role::Admin, Role::Manager];
pub const ADMIN_ONLY: &[Role] = &[Role::Admin];

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
    pub tenant_id: String,
    pub role: Role,
}

impl Principal {
    /// 角色检查，不满足返回 403
    pub fn require_any(&self, roles: &[Role]) -> Result<(), AppError> {
        if roles.contains(&self.role) {
            return Ok(());
        }
        tracing::warn!(
            user_id = %self.user_id,
            tenant_id = %self.tenant_id,
            role = %self.role,
            "Role check failed"
        );
        let code = if roles == ADMIN_ONLY {
            ErrorCode::AdminRequired
        } else {
            ErrorCode::RoleRequired
        };
        let required: Vec<&str> = roles.iter().map(Role::as_str).collect();
        Err(AppError::new(code).with_detail("required", required))
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing credential")]
    Missing,
    #[error("token expired")]
    Expired,
    #[error("invalid token: {0}")]
    Invalid(String),
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Missing => AppError::not_authenticated(),
            AuthError::Expired => AppError::token_expired(),
            AuthError::Invalid(msg) => AppError::invalid_token(msg),
        }
    }
}

/// Resolves a bearer credential into a principal
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<Principal, AuthError>;
}

/// Token from an `Authorization: Bearer <token>` header value
pub fn bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

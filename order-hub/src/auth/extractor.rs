//! Principal extractor
//!
//! Handlers take `Principal` as an argument; the bearer token is verified and
//! the user/tenant active flags are checked on every request.

use axum::{extract::FromRequestParts, http::request::Parts};
use shared::error::{AppError, ErrorCode};

use super::{AuthError, Principal, TokenVerifier, bearer_token};
use crate::directory::Directory;
use crate::state::AppState;

/// Verify a credential and check the principal is still allowed in
///
/// Shared by the HTTP extractor and the WebSocket handshake.
pub async fn authenticate(
    verifier: &dyn TokenVerifier,
    directory: &dyn Directory,
    token: &str,
) -> Result<Principal, AppError> {
    let principal = verifier.verify(token).inspect_err(|e| {
        tracing::warn!(error = %e, "Token verification failed");
    })?;

    let user = directory.user(&principal.user_id).await.map_err(|e| {
        tracing::error!(error = %e, "Directory user lookup failed");
        AppError::new(ErrorCode::InternalError)
    })?;
    match user {
        Some(u) if u.active && u.tenant_id == principal.tenant_id => {}
        Some(_) => {
            tracing::warn!(user_id = %principal.user_id, "Inactive or foreign user rejected");
            return Err(AppError::new(ErrorCode::AccountDisabled));
        }
        None => return Err(AuthError::Invalid("unknown user".into()).into()),
    }

    let tenant = directory.tenant(&principal.tenant_id).await.map_err(|e| {
        tracing::error!(error = %e, "Directory tenant lookup failed");
        AppError::new(ErrorCode::InternalError)
    })?;
    match tenant {
        Some(t) if t.active => Ok(principal),
        Some(_) => {
            tracing::warn!(tenant_id = %principal.tenant_id, "Inactive tenant rejected");
            Err(AppError::new(ErrorCode::TenantInactive))
        }
        None => Err(AppError::new(ErrorCode::TenantNotFound)),
    }
}

impl FromRequestParts<AppState> for Principal {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(principal) = parts.extensions.get::<Principal>() {
            return Ok(principal.clone());
        }

        let token = parts
            .headers
            .get(http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(bearer_token)
            .ok_or(AuthError::Missing)?;

        let principal =
            authenticate(state.verifier.as_ref(), state.directory.as_ref(), token).await?;
        parts.extensions.insert(principal.clone());
        Ok(principal)
    }
}

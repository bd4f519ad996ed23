//! Axum extractors for authentication

use axum::extract::{FromRef, FromRequestParts};
use axum::http::header;
use axum::http::request::Parts;
use slate_core::EntitlementClaims;

use crate::error::ApiError;
use crate::state::AppState;

/// Caller authenticated with an entitlement credential
#[derive(Debug, Clone)]
pub struct AuthUser(pub EntitlementClaims);

impl AuthUser {
    pub fn user_id(&self) -> &str {
        &self.0.sub
    }

    /// Credentials only reach the caller's own entitlement
    pub fn ensure_owner(&self, user_id: &str) -> Result<(), ApiError> {
        if self.user_id() == user_id {
            Ok(())
        } else {
            tracing::warn!(caller = self.user_id(), requested = user_id, "Cross-user access denied");
            Err(ApiError::Forbidden("Credential does not belong to this user"))
        }
    }
}

impl<S> FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);
        let token = bearer_token(parts)?;

        let claims = app_state.account.authenticate(token).await.map_err(|e| {
            tracing::debug!(error = %e, "Credential rejected");
            ApiError::from(e)
        })?;

        Ok(Self(claims))
    }
}

fn bearer_token(parts: &Parts) -> Result<&str, ApiError> {
    let value = parts
        .headers
        .get(header::AUTHORIZATION)
        .ok_or(ApiError::Unauthorized("No authentication token provided"))?;
    let value = value
        .to_str()
        .map_err(|_| ApiError::BadRequest("Invalid Authorization header encoding".into()))?;

    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(ApiError::Unauthorized("Expected a Bearer token"))
}

//! Bearer API-key extractor.
//!
//! Every data route takes an [`AuthenticatedDevice`]; the (user, device) it
//! carries is the only identity the handlers trust.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use focuslog_core::BatchOwner;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedDevice {
    pub user_id: String,
    pub device_id: String,
}

impl AuthenticatedDevice {
    pub fn owner(&self) -> BatchOwner {
        BatchOwner {
            user_id: self.user_id.clone(),
            device_id: self.device_id.clone(),
        }
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

impl FromRequestParts<Arc<AppState>> for AuthenticatedDevice {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| ApiError::Unauthorized("missing bearer token".into()))?;

        let identity = state
            .db
            .authenticate_api_key(token)
            .await?
            .ok_or_else(|| ApiError::Unauthorized("unknown API key".into()))?;

        Ok(Self {
            user_id: identity.user_id,
            device_id: identity.device_id,
        })
    }
}

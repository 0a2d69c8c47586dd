//! Acting-user extractor.
//!
//! The messenger sits behind the platform gateway, which authenticates the
//! caller and forwards their identity in `x-user-id` / `x-user-role`
//! headers. Controllers re-read the authoritative role from storage where a
//! transition depends on it; the header role is used for read-path
//! filtering.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use domain::models::UserRole;

use crate::app::AppState;
use crate::error::ApiError;

const USER_ID_HEADER: &str = "x-user-id";
const USER_ROLE_HEADER: &str = "x-user-role";

/// The authenticated user an incoming request acts as.
#[derive(Debug, Clone, Copy)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: UserRole,
}

#[async_trait]
impl FromRequestParts<AppState> for Actor {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("Missing x-user-id header".to_string()))?
            .parse::<Uuid>()
            .map_err(|_| ApiError::Unauthorized("Invalid x-user-id header".to_string()))?;

        let role = parts
            .headers
            .get(USER_ROLE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("Missing x-user-role header".to_string()))?
            .parse::<UserRole>()
            .map_err(|_| ApiError::Unauthorized("Invalid x-user-role header".to_string()))?;

        Ok(Actor { user_id, role })
    }
}

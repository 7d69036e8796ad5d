//! Caller identity.
//!
//! Authentication happens upstream; the gateway forwards the authenticated
//! user's id in the `x-user-id` header. The id is resolved against the
//! users table on every request so deactivation takes effect immediately.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use kpx_core::identity::Actor;

use crate::error::ApiError;
use crate::state::AppState;

pub const USER_ID_HEADER: &str = "x-user-id";

/// The resolved caller of the current request.
#[derive(Debug, Clone)]
pub struct CurrentActor(pub Actor);

impl FromRequestParts<AppState> for CurrentActor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(ApiError::Unauthorized)?;

        match state.svc.resolve_actor(user_id).await? {
            Some(actor) => Ok(Self(actor)),
            None => {
                tracing::debug!(user_id, "unknown caller");
                Err(ApiError::Unauthorized)
            }
        }
    }
}

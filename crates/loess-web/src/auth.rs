//! Bearer API-key authentication

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use loess_store::AuthUser;

use crate::server::AppState;
use crate::WebError;

/// Extractor resolving `Authorization: Bearer <key>` to a stored user.
///
/// Rejects with 401 before any handler logic runs; the chat stream is
/// never opened for an unauthenticated request.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub AuthUser);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = WebError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(WebError::Unauthorized)?;

        state
            .store
            .resolve_api_key(token)?
            .map(CurrentUser)
            .ok_or(WebError::Unauthorized)
    }
}

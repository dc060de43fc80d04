// ABOUTME: Authentication context for API requests
// ABOUTME: Identifies the calling user from the x-user-id header

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Json as ResponseJson, Response},
};
use marketwise_config::USER_ID_HEADER;
use tracing::warn;

use crate::response::ApiResponse;

/// Current authenticated user
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty());

        match id {
            Some(id) => Ok(Self { id: id.to_string() }),
            None => {
                warn!("Rejected request to {} without a user id", parts.uri.path());
                Err((
                    StatusCode::UNAUTHORIZED,
                    ResponseJson(ApiResponse::<()>::error(
                        "Missing user identity".to_string(),
                    )),
                )
                    .into_response())
            }
        }
    }
}

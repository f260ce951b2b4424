//! Identity extraction for HTTP handlers
//!
//! The fronting proxy verifies the caller's token and forwards the
//! stable external user id in a trusted header. Handlers that need an
//! identity take `CurrentUser` as an extractor argument; requests
//! without the header are rejected with 401.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::error::ApiError;

/// Header carrying the authenticated external user id
pub const USER_ID_HEADER: &str = "x-chorus-user-id";

/// The authenticated user behind an HTTP request
#[derive(Debug, Clone)]
pub struct CurrentUser(pub String);

impl CurrentUser {
    pub fn id(&self) -> &str {
        &self.0
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(ApiError::Unauthorized)?;

        Ok(CurrentUser(user_id.to_string()))
    }
}

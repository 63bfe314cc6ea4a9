use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use std::sync::Arc;

use super::AuthContext;
use crate::app::AppState;
use crate::error::ErrorResponse;

/// Extractor that requires a valid bearer token.
///
/// ```ignore
/// async fn protected_route(auth: RequireAuth) -> impl IntoResponse {
///     format!("Hello, {}", auth.display_name())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct RequireAuth(pub AuthContext);

impl std::ops::Deref for RequireAuth {
    type Target = AuthContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Debug)]
pub enum AuthError {
    MissingToken,
    InvalidFormat,
    InvalidToken,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let message = match self {
            AuthError::MissingToken => "Missing authorization token",
            AuthError::InvalidFormat => "Invalid authorization format",
            AuthError::InvalidToken => "Invalid or expired token",
        };

        let body = ErrorResponse {
            code: "UNAUTHORIZED".to_string(),
            message: message.to_string(),
            request_id: None,
        };

        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for RequireAuth {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|rejection| {
                    if rejection.is_missing() {
                        AuthError::MissingToken
                    } else {
                        AuthError::InvalidFormat
                    }
                })?;

        let token = bearer.token();
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        let claims = state.token_verifier.verify(token).map_err(|e| {
            tracing::warn!(error = %e, "JWT verification failed");
            AuthError::InvalidToken
        })?;

        let context = AuthContext::from_claims(&claims).map_err(|e| {
            tracing::warn!(error = %e, "Failed to build auth context");
            AuthError::InvalidToken
        })?;

        Ok(RequireAuth(context))
    }
}

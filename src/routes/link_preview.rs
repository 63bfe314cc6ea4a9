use axum::{
    extract::{Query, State},
    response::IntoResponse,
};
use std::sync::Arc;

use crate::api::DataResponse;
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::link_preview::{parse_target, LinkPreviewQuery};
use crate::error::{ApiError, ApiResult};
use crate::services::link_preview::fetch_preview;

/// GET /link-preview?url=
pub async fn link_preview(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LinkPreviewQuery>,
    _auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let url = parse_target(query.url.as_deref()).map_err(ApiError::bad_request)?;

    let preview = fetch_preview(&state.http_client, &state.cache, &url)
        .await
        .map_err(|e| {
            tracing::warn!(url = %url, error = %e, "Link preview failed");
            ApiError::upstream("Failed to fetch URL")
        })?;

    Ok(DataResponse::new(preview))
}

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use sqlx::types::Json as SqlJson;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{DataResponse, MessageResponse};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::activities::{Activity, ActivityRow, CreateActivityRequest, ACTIVITY_COLUMNS};
use crate::domain::non_blank;
use crate::error::{ApiError, ApiResult};
use crate::routes::enquiries::fetch_enquiry;

/// POST /enquiries/:enquiry_id/activities
pub async fn create_activity(
    State(state): State<Arc<AppState>>,
    Path(enquiry_id): Path<Uuid>,
    auth: RequireAuth,
    Json(req): Json<CreateActivityRequest>,
) -> ApiResult<impl IntoResponse> {
    let content = req.content.trim();
    if content.is_empty() {
        return Err(ApiError::bad_request("Content cannot be empty"));
    }

    fetch_enquiry(&state.db, enquiry_id).await?;

    let attendees: Option<Vec<String>> = req.attendees.map(|list| {
        list.into_iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect()
    });

    let row = sqlx::query_as::<_, ActivityRow>(&format!(
        r#"
        INSERT INTO enquiry_activities (enquiry_id, type, title, content, meeting_date, attendees)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {}
        "#,
        ACTIVITY_COLUMNS
    ))
    .bind(enquiry_id)
    .bind(req.activity_type.as_str())
    .bind(non_blank(req.title))
    .bind(content)
    .bind(req.meeting_date)
    .bind(attendees.map(SqlJson))
    .fetch_one(&state.db)
    .await?;

    tracing::info!(
        user_id = %auth.user_id,
        enquiry_id = %enquiry_id,
        activity_type = req.activity_type.as_str(),
        "Activity logged"
    );

    Ok((StatusCode::CREATED, DataResponse::new(Activity::from(row))))
}

/// DELETE /activities/:activity_id
pub async fn delete_activity(
    State(state): State<Arc<AppState>>,
    Path(activity_id): Path<Uuid>,
    _auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let result = sqlx::query("DELETE FROM enquiry_activities WHERE id = $1")
        .bind(activity_id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Activity not found"));
    }

    Ok(MessageResponse::new("Activity deleted"))
}

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{DataResponse, MessageResponse};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::deliverables::{
    Deliverable, DeliverableInput, UpdateDeliverableRequest, DELIVERABLE_COLUMNS,
    UNTITLED_DELIVERABLE,
};
use crate::error::{ApiError, ApiResult};
use crate::routes::projects::fetch_project;
use crate::services::deliverables::{insert_deliverable, DeliverableOwner};

/// GET /projects/:project_id/deliverables
pub async fn list_project_deliverables(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
    _auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    fetch_project(&state.db, project_id).await?;

    let deliverables = sqlx::query_as::<_, Deliverable>(&format!(
        "SELECT {} FROM deliverables WHERE project_id = $1 ORDER BY created_at",
        DELIVERABLE_COLUMNS
    ))
    .bind(project_id)
    .fetch_all(&state.db)
    .await?;

    Ok(DataResponse::new(deliverables))
}

/// POST /projects/:project_id/deliverables
pub async fn create_deliverable(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
    _auth: RequireAuth,
    Json(req): Json<DeliverableInput>,
) -> ApiResult<impl IntoResponse> {
    fetch_project(&state.db, project_id).await?;

    let deliverable =
        insert_deliverable(&state.db, DeliverableOwner::Project(project_id), &req.normalize())
            .await?;

    tracing::info!(
        project_id = %project_id,
        deliverable_id = %deliverable.id,
        "Deliverable created"
    );

    Ok((StatusCode::CREATED, DataResponse::new(deliverable)))
}

/// PUT /deliverables/:deliverable_id
///
/// Absent fields are kept. A blank name resets to the default name.
pub async fn update_deliverable(
    State(state): State<Arc<AppState>>,
    Path(deliverable_id): Path<Uuid>,
    _auth: RequireAuth,
    Json(req): Json<UpdateDeliverableRequest>,
) -> ApiResult<impl IntoResponse> {
    let aspect_ratio = req.effective_aspect_ratio();
    let name = req.name.map(|n| {
        let n = n.trim();
        if n.is_empty() {
            UNTITLED_DELIVERABLE.to_string()
        } else {
            n.to_string()
        }
    });
    let trimmed = |v: Option<String>| v.map(|v| v.trim().to_string());

    let deliverable = sqlx::query_as::<_, Deliverable>(&format!(
        r#"
        UPDATE deliverables SET
            name = COALESCE($2, name),
            frame_rate = COALESCE($3, frame_rate),
            aspect_ratio = COALESCE($4, aspect_ratio),
            width = COALESCE($5, width),
            height = COALESCE($6, height),
            duration = COALESCE($7, duration),
            description = COALESCE($8, description)
        WHERE id = $1
        RETURNING {}
        "#,
        DELIVERABLE_COLUMNS
    ))
    .bind(deliverable_id)
    .bind(name)
    .bind(trimmed(req.frame_rate))
    .bind(aspect_ratio)
    .bind(req.width)
    .bind(req.height)
    .bind(trimmed(req.duration))
    .bind(trimmed(req.description))
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Deliverable not found"))?;

    Ok(DataResponse::new(deliverable))
}

/// DELETE /deliverables/:deliverable_id
pub async fn delete_deliverable(
    State(state): State<Arc<AppState>>,
    Path(deliverable_id): Path<Uuid>,
    _auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let result = sqlx::query("DELETE FROM deliverables WHERE id = $1")
        .bind(deliverable_id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Deliverable not found"));
    }

    Ok(MessageResponse::new("Deliverable deleted"))
}

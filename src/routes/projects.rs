//! Project routes
//!
//! Projects come out of enquiry conversion; these handlers cover viewing,
//! approval and the gate into production.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{DataResponse, MessageResponse, Paginated, PaginationParams};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::checklists::ProductionReadiness;
use crate::domain::deliverables::{Deliverable, DELIVERABLE_COLUMNS};
use crate::domain::enquiries::{Enquiry, EnquiryRow, ENQUIRY_COLUMNS};
use crate::domain::projects::{
    ApproveProjectResponse, Project, ProjectDetail, ProjectListItem, ProjectRow, ProjectStatus,
    UpdateProjectCompanyRequest, PROJECT_COLUMNS,
};
use crate::error::{ApiError, ApiResult};
use crate::routes::companies::{fetch_company, find_company};
use crate::routes::enquiries::find_contact;
use crate::services::checklist::{load_project_checklist, project_readiness};

/// Load a project or fail with 404
pub async fn fetch_project(db: &PgPool, project_id: Uuid) -> ApiResult<Project> {
    sqlx::query_as::<_, ProjectRow>(&format!(
        "SELECT {} FROM projects WHERE id = $1",
        PROJECT_COLUMNS
    ))
    .bind(project_id)
    .fetch_optional(db)
    .await?
    .map(Project::from)
    .ok_or_else(|| ApiError::not_found("Project not found"))
}

async fn set_status(
    db: &PgPool,
    project_id: Uuid,
    status: ProjectStatus,
    dropbox_path: Option<&str>,
) -> ApiResult<Project> {
    let row = sqlx::query_as::<_, ProjectRow>(&format!(
        r#"
        UPDATE projects SET status = $2, dropbox_path = COALESCE($3, dropbox_path), updated_at = NOW()
        WHERE id = $1
        RETURNING {}
        "#,
        PROJECT_COLUMNS
    ))
    .bind(project_id)
    .bind(status.as_str())
    .bind(dropbox_path)
    .fetch_one(db)
    .await?;

    Ok(row.into())
}

/// GET /projects
pub async fn list_projects(
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
    _auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM projects")
        .fetch_one(&state.db)
        .await?;

    let rows = sqlx::query_as::<_, ProjectRow>(&format!(
        "SELECT {} FROM projects ORDER BY created_at DESC LIMIT $1 OFFSET $2",
        PROJECT_COLUMNS
    ))
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await?;

    let project_ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let company_ids: Vec<Uuid> = rows.iter().map(|r| r.company_id).collect();

    let company_names: HashMap<Uuid, String> =
        sqlx::query_as::<_, (Uuid, String)>("SELECT id, name FROM companies WHERE id = ANY($1)")
            .bind(&company_ids)
            .fetch_all(&state.db)
            .await?
            .into_iter()
            .collect();

    let deliverable_counts: HashMap<Uuid, i64> = sqlx::query_as::<_, (Uuid, i64)>(
        "SELECT project_id, COUNT(*) FROM deliverables WHERE project_id = ANY($1) GROUP BY project_id",
    )
    .bind(&project_ids)
    .fetch_all(&state.db)
    .await?
    .into_iter()
    .collect();

    let data: Vec<ProjectListItem> = rows
        .into_iter()
        .map(|row| {
            let project = Project::from(row);
            ProjectListItem {
                company_name: company_names
                    .get(&project.company_id)
                    .cloned()
                    .unwrap_or_default(),
                deliverable_count: deliverable_counts.get(&project.id).copied().unwrap_or(0),
                project,
            }
        })
        .collect();

    Ok(Paginated::new(data, &pagination, total as u64))
}

/// GET /projects/:project_id
pub async fn get_project(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
    _auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let project = fetch_project(&state.db, project_id).await?;
    let company = fetch_company(&state.db, project.company_id).await?;

    let contact = match project.contact_id {
        Some(id) => find_contact(&state.db, id).await?,
        None => None,
    };

    let enquiry = match project.enquiry_id {
        Some(id) => sqlx::query_as::<_, EnquiryRow>(&format!(
            "SELECT {} FROM enquiries WHERE id = $1",
            ENQUIRY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .map(Enquiry::from),
        None => None,
    };

    let deliverables = sqlx::query_as::<_, Deliverable>(&format!(
        "SELECT {} FROM deliverables WHERE project_id = $1 ORDER BY created_at",
        DELIVERABLE_COLUMNS
    ))
    .bind(project_id)
    .fetch_all(&state.db)
    .await?;

    let checklist = load_project_checklist(&state.db, project_id).await?;
    let readiness = ProductionReadiness::evaluate(&checklist);

    Ok(DataResponse::new(ProjectDetail {
        project,
        company,
        contact,
        enquiry,
        deliverables,
        checklist,
        readiness,
    }))
}

/// DELETE /projects/:project_id
///
/// Deliverables and checklist items go with the project.
pub async fn delete_project(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
    auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let result = sqlx::query("DELETE FROM projects WHERE id = $1")
        .bind(project_id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Project not found"));
    }

    tracing::info!(user_id = %auth.user_id, project_id = %project_id, "Project deleted");

    Ok(MessageResponse::new("Project deleted"))
}

/// PUT /projects/:project_id/company
pub async fn update_project_company(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
    _auth: RequireAuth,
    Json(req): Json<UpdateProjectCompanyRequest>,
) -> ApiResult<impl IntoResponse> {
    if find_company(&state.db, req.company_id).await?.is_none() {
        return Err(ApiError::bad_request("Selected company not found"));
    }

    let row = sqlx::query_as::<_, ProjectRow>(&format!(
        "UPDATE projects SET company_id = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
        PROJECT_COLUMNS
    ))
    .bind(project_id)
    .bind(req.company_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Project not found"))?;

    Ok(DataResponse::new(Project::from(row)))
}

/// POST /projects/:project_id/approve
///
/// Creates the Dropbox project folder. A folder failure does not block
/// approval; the previous path is kept.
pub async fn approve_project(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
    auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let project = fetch_project(&state.db, project_id).await?;
    let company = fetch_company(&state.db, project.company_id).await?;

    let (folder_path, folder_created, folder_error) = match state
        .dropbox
        .create_project_folder(&company.name, &project.title)
        .await
    {
        Ok(folder) => (Some(folder.path), !folder.mock, None),
        Err(e) => {
            tracing::warn!(project_id = %project_id, error = %e, "Dropbox folder creation failed");
            (None, false, Some(e.to_string()))
        }
    };

    let project = set_status(
        &state.db,
        project_id,
        ProjectStatus::Approved,
        folder_path.as_deref(),
    )
    .await?;

    tracing::info!(
        user_id = %auth.user_id,
        project_id = %project_id,
        dropbox_path = ?project.dropbox_path,
        "Project approved"
    );

    Ok(DataResponse::new(ApproveProjectResponse {
        dropbox_path: project.dropbox_path.clone(),
        project,
        folder_created,
        folder_error,
    }))
}

/// POST /projects/:project_id/start-production
///
/// Requires an approved or active project whose required checklist items
/// are all done or waived.
pub async fn start_production(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
    auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let project = fetch_project(&state.db, project_id).await?;

    if !project.status.can_enter_production() {
        return Err(ApiError::conflict(format!(
            "Cannot start production from status {}",
            project.status.as_str()
        )));
    }

    let readiness = project_readiness(&state.db, project_id).await?;
    if !readiness.can_start {
        return Err(ApiError::conflict(readiness.blocking_message()));
    }

    let project = set_status(&state.db, project_id, ProjectStatus::InProduction, None).await?;

    tracing::info!(user_id = %auth.user_id, project_id = %project_id, "Production started");

    Ok(DataResponse::new(project))
}

#[cfg(test)]
mod tests {
    use crate::test_support::test_app;
    use axum::http::{Method, StatusCode};
    use serde_json::json;
    use sqlx::PgPool;

    #[sqlx::test]
    async fn production_waits_for_required_checklist_items(pool: PgPool) {
        let app = test_app(pool).await;
        let company_id = app.create("/companies", json!({ "name": "Acme Studios" })).await;
        let project_id = app.project_for(company_id).await;
        let start = format!("/projects/{}/start-production", project_id);

        let (status, body) = app.call(Method::POST, &start, None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["message"], "Cannot start production from status PROPOSED");

        let (status, body) = app
            .call(Method::POST, &format!("/projects/{}/approve", project_id), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["project"]["status"], "APPROVED");

        let (status, body) = app.call(Method::POST, &start, None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["message"]
            .as_str()
            .unwrap()
            .starts_with("Cannot start production: 5 required checklist item(s) pending"));

        let (_, checklist) = app
            .call(Method::GET, &format!("/projects/{}/checklist", project_id), None)
            .await;
        let required: Vec<String> = checklist["data"]
            .as_array()
            .unwrap()
            .iter()
            .filter(|item| item["required"] == true)
            .map(|item| item["id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(required.len(), 5);

        for (index, item_id) in required.iter().enumerate() {
            let change = if index == 0 {
                json!({ "status": "waived", "waived_reason": "Repeat client" })
            } else {
                json!({ "status": "done" })
            };
            let (status, _) = app
                .call(
                    Method::PUT,
                    &format!("/checklist-items/{}/status", item_id),
                    Some(change),
                )
                .await;
            assert_eq!(status, StatusCode::OK);
        }

        let (_, readiness) = app
            .call(Method::GET, &format!("/projects/{}/checklist/readiness", project_id), None)
            .await;
        assert_eq!(readiness["data"]["can_start"], true);

        let (status, body) = app.call(Method::POST, &start, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "IN_PRODUCTION");
    }
}

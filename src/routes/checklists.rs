//! Checklist routes
//!
//! Reusable checklist templates and the per-project production checklist
//! copied from them.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{DataResponse, MessageResponse};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::checklists::{
    next_sort_order, AddChecklistItemRequest, ChecklistItem, ChecklistItemRow, ChecklistTemplate,
    ChecklistTemplateItem, ChecklistTemplateRow, CreateTemplateItemRequest, CreateTemplateRequest,
    InitializeChecklistRequest, StatusChange, UpdateChecklistItemRequest, UpdateItemStatusRequest,
    UpdateTemplateItemRequest, UpdateTemplateRequest, CHECKLIST_ITEM_COLUMNS, DEFAULT_OWNER,
    TEMPLATE_COLUMNS, TEMPLATE_ITEM_COLUMNS,
};
use crate::domain::non_blank;
use crate::error::{ApiError, ApiResult};
use crate::routes::projects::fetch_project;
use crate::services::checklist::{
    initialize_project_checklist, load_project_checklist, project_readiness,
};

fn required_title(title: &str) -> ApiResult<&str> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ApiError::bad_request("Title is required"));
    }
    Ok(title)
}

fn owner_or_default(owner: Option<String>) -> String {
    non_blank(owner).unwrap_or_else(|| DEFAULT_OWNER.to_string())
}

// =============================================================================
// Templates
// =============================================================================

async fn fetch_template(db: &PgPool, template_id: Uuid) -> ApiResult<ChecklistTemplate> {
    let template = sqlx::query_as::<_, ChecklistTemplateRow>(&format!(
        "SELECT {} FROM checklist_templates WHERE id = $1",
        TEMPLATE_COLUMNS
    ))
    .bind(template_id)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| ApiError::not_found("Template not found"))?;

    let items = sqlx::query_as::<_, ChecklistTemplateItem>(&format!(
        "SELECT {} FROM checklist_template_items WHERE template_id = $1 ORDER BY sort_order",
        TEMPLATE_ITEM_COLUMNS
    ))
    .bind(template_id)
    .fetch_all(db)
    .await?;

    Ok(ChecklistTemplate { template, items })
}

/// GET /checklist-templates
pub async fn list_templates(
    State(state): State<Arc<AppState>>,
    _auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let templates = sqlx::query_as::<_, ChecklistTemplateRow>(&format!(
        "SELECT {} FROM checklist_templates ORDER BY name",
        TEMPLATE_COLUMNS
    ))
    .fetch_all(&state.db)
    .await?;

    let mut items_by_template: HashMap<Uuid, Vec<ChecklistTemplateItem>> = HashMap::new();
    for item in sqlx::query_as::<_, ChecklistTemplateItem>(&format!(
        "SELECT {} FROM checklist_template_items ORDER BY sort_order",
        TEMPLATE_ITEM_COLUMNS
    ))
    .fetch_all(&state.db)
    .await?
    {
        items_by_template.entry(item.template_id).or_default().push(item);
    }

    let templates: Vec<ChecklistTemplate> = templates
        .into_iter()
        .map(|template| ChecklistTemplate {
            items: items_by_template.remove(&template.id).unwrap_or_default(),
            template,
        })
        .collect();

    Ok(DataResponse::new(templates))
}

/// GET /checklist-templates/:template_id
pub async fn get_template(
    State(state): State<Arc<AppState>>,
    Path(template_id): Path<Uuid>,
    _auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    Ok(DataResponse::new(fetch_template(&state.db, template_id).await?))
}

/// POST /checklist-templates
///
/// At most one template is the default.
pub async fn create_template(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
    Json(req): Json<CreateTemplateRequest>,
) -> ApiResult<impl IntoResponse> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("Template name is required"));
    }

    let mut tx = state.db.begin().await?;

    if req.is_default {
        sqlx::query("UPDATE checklist_templates SET is_default = FALSE, updated_at = NOW() WHERE is_default")
            .execute(&mut *tx)
            .await?;
    }

    let template = sqlx::query_as::<_, ChecklistTemplateRow>(&format!(
        "INSERT INTO checklist_templates (name, description, is_default) VALUES ($1, $2, $3) RETURNING {}",
        TEMPLATE_COLUMNS
    ))
    .bind(name)
    .bind(non_blank(req.description))
    .bind(req.is_default)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(user_id = %auth.user_id, template_id = %template.id, "Checklist template created");

    Ok((
        StatusCode::CREATED,
        DataResponse::new(ChecklistTemplate {
            template,
            items: Vec::new(),
        }),
    ))
}

/// PATCH /checklist-templates/:template_id
pub async fn update_template(
    State(state): State<Arc<AppState>>,
    Path(template_id): Path<Uuid>,
    _auth: RequireAuth,
    Json(req): Json<UpdateTemplateRequest>,
) -> ApiResult<impl IntoResponse> {
    let name = match req.name.as_deref().map(str::trim) {
        Some("") => return Err(ApiError::bad_request("Template name cannot be empty")),
        other => other.map(str::to_string),
    };

    let mut tx = state.db.begin().await?;

    if req.is_default == Some(true) {
        sqlx::query(
            "UPDATE checklist_templates SET is_default = FALSE, updated_at = NOW() WHERE is_default AND id <> $1",
        )
        .bind(template_id)
        .execute(&mut *tx)
        .await?;
    }

    let updated = sqlx::query(
        r#"
        UPDATE checklist_templates SET
            name = COALESCE($2, name),
            description = CASE WHEN $3 THEN $4 ELSE description END,
            is_default = COALESCE($5, is_default),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(template_id)
    .bind(name)
    .bind(req.description.is_some())
    .bind(req.description.flatten().and_then(|d| non_blank(Some(d))))
    .bind(req.is_default)
    .execute(&mut *tx)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(ApiError::not_found("Template not found"));
    }

    tx.commit().await?;

    Ok(DataResponse::new(fetch_template(&state.db, template_id).await?))
}

/// DELETE /checklist-templates/:template_id
///
/// Project checklists already copied from the template are kept.
pub async fn delete_template(
    State(state): State<Arc<AppState>>,
    Path(template_id): Path<Uuid>,
    auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let result = sqlx::query("DELETE FROM checklist_templates WHERE id = $1")
        .bind(template_id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Template not found"));
    }

    tracing::info!(user_id = %auth.user_id, template_id = %template_id, "Checklist template deleted");

    Ok(MessageResponse::new("Template deleted"))
}

/// POST /checklist-templates/:template_id/items
pub async fn add_template_item(
    State(state): State<Arc<AppState>>,
    Path(template_id): Path<Uuid>,
    _auth: RequireAuth,
    Json(req): Json<CreateTemplateItemRequest>,
) -> ApiResult<impl IntoResponse> {
    let title = required_title(&req.title)?;

    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM checklist_templates WHERE id = $1)")
            .bind(template_id)
            .fetch_one(&state.db)
            .await?;
    if !exists {
        return Err(ApiError::not_found("Template not found"));
    }

    let current_max: Option<i32> = sqlx::query_scalar(
        "SELECT MAX(sort_order) FROM checklist_template_items WHERE template_id = $1",
    )
    .bind(template_id)
    .fetch_one(&state.db)
    .await?;

    let item = sqlx::query_as::<_, ChecklistTemplateItem>(&format!(
        r#"
        INSERT INTO checklist_template_items (template_id, title, description, required, default_owner, sort_order)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {}
        "#,
        TEMPLATE_ITEM_COLUMNS
    ))
    .bind(template_id)
    .bind(title)
    .bind(non_blank(req.description))
    .bind(req.required.unwrap_or(true))
    .bind(owner_or_default(req.default_owner))
    .bind(next_sort_order(current_max))
    .fetch_one(&state.db)
    .await?;

    Ok((StatusCode::CREATED, DataResponse::new(item)))
}

/// PATCH /checklist-template-items/:item_id
pub async fn update_template_item(
    State(state): State<Arc<AppState>>,
    Path(item_id): Path<Uuid>,
    _auth: RequireAuth,
    Json(req): Json<UpdateTemplateItemRequest>,
) -> ApiResult<impl IntoResponse> {
    let title = match req.title.as_deref() {
        Some(t) => Some(required_title(t)?.to_string()),
        None => None,
    };

    let item = sqlx::query_as::<_, ChecklistTemplateItem>(&format!(
        r#"
        UPDATE checklist_template_items SET
            title = COALESCE($2, title),
            description = CASE WHEN $3 THEN $4 ELSE description END,
            required = COALESCE($5, required),
            default_owner = COALESCE($6, default_owner),
            sort_order = COALESCE($7, sort_order)
        WHERE id = $1
        RETURNING {}
        "#,
        TEMPLATE_ITEM_COLUMNS
    ))
    .bind(item_id)
    .bind(title)
    .bind(req.description.is_some())
    .bind(req.description.flatten().and_then(|d| non_blank(Some(d))))
    .bind(req.required)
    .bind(non_blank(req.default_owner))
    .bind(req.sort_order)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Template item not found"))?;

    Ok(DataResponse::new(item))
}

/// DELETE /checklist-template-items/:item_id
pub async fn delete_template_item(
    State(state): State<Arc<AppState>>,
    Path(item_id): Path<Uuid>,
    _auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let result = sqlx::query("DELETE FROM checklist_template_items WHERE id = $1")
        .bind(item_id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Template item not found"));
    }

    Ok(MessageResponse::new("Template item deleted"))
}

// =============================================================================
// Project checklist
// =============================================================================

/// GET /projects/:project_id/checklist
pub async fn get_project_checklist(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
    _auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    fetch_project(&state.db, project_id).await?;
    Ok(DataResponse::new(load_project_checklist(&state.db, project_id).await?))
}

/// POST /projects/:project_id/checklist
///
/// Adds a custom item at the end of the checklist.
pub async fn add_custom_item(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
    _auth: RequireAuth,
    Json(req): Json<AddChecklistItemRequest>,
) -> ApiResult<impl IntoResponse> {
    let title = required_title(&req.title)?;
    fetch_project(&state.db, project_id).await?;

    let current_max: Option<i32> =
        sqlx::query_scalar("SELECT MAX(sort_order) FROM checklist_items WHERE project_id = $1")
            .bind(project_id)
            .fetch_one(&state.db)
            .await?;

    let row = sqlx::query_as::<_, ChecklistItemRow>(&format!(
        r#"
        INSERT INTO checklist_items (project_id, title, description, required, owner, sort_order, status)
        VALUES ($1, $2, $3, $4, $5, $6, 'missing')
        RETURNING {}
        "#,
        CHECKLIST_ITEM_COLUMNS
    ))
    .bind(project_id)
    .bind(title)
    .bind(non_blank(req.description))
    .bind(req.required.unwrap_or(true))
    .bind(owner_or_default(req.owner))
    .bind(next_sort_order(current_max))
    .fetch_one(&state.db)
    .await?;

    Ok((StatusCode::CREATED, DataResponse::new(ChecklistItem::from(row))))
}

/// POST /projects/:project_id/checklist/initialize
///
/// Replaces the checklist with a template's items. The body is optional;
/// without a template id the default template is used.
pub async fn initialize_checklist(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
    auth: RequireAuth,
    body: Option<Json<InitializeChecklistRequest>>,
) -> ApiResult<impl IntoResponse> {
    fetch_project(&state.db, project_id).await?;

    let template_id = body.and_then(|Json(req)| req.template_id);
    let result = initialize_project_checklist(&state.db, project_id, template_id).await?;

    tracing::info!(
        user_id = %auth.user_id,
        project_id = %project_id,
        items = result.items.len(),
        "Checklist initialized"
    );

    Ok((StatusCode::CREATED, DataResponse::new(result)))
}

/// GET /projects/:project_id/checklist/readiness
pub async fn get_readiness(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
    _auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    fetch_project(&state.db, project_id).await?;
    Ok(DataResponse::new(project_readiness(&state.db, project_id).await?))
}

/// PUT /checklist-items/:item_id/status
pub async fn update_item_status(
    State(state): State<Arc<AppState>>,
    Path(item_id): Path<Uuid>,
    auth: RequireAuth,
    Json(req): Json<UpdateItemStatusRequest>,
) -> ApiResult<impl IntoResponse> {
    let change = StatusChange::new(
        req.status,
        req.completed_by,
        req.waived_reason,
        Some(auth.display_name()),
        Utc::now(),
    );

    let row = sqlx::query_as::<_, ChecklistItemRow>(&format!(
        r#"
        UPDATE checklist_items SET
            status = $2,
            completed_at = $3,
            completed_by = $4,
            waived_reason = $5,
            updated_at = NOW()
        WHERE id = $1
        RETURNING {}
        "#,
        CHECKLIST_ITEM_COLUMNS
    ))
    .bind(item_id)
    .bind(change.status.as_str())
    .bind(change.completed_at)
    .bind(&change.completed_by)
    .bind(&change.waived_reason)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Checklist item not found"))?;

    tracing::info!(
        user_id = %auth.user_id,
        item_id = %item_id,
        status = change.status.as_str(),
        "Checklist item status updated"
    );

    Ok(DataResponse::new(ChecklistItem::from(row)))
}

/// PATCH /checklist-items/:item_id
pub async fn update_item(
    State(state): State<Arc<AppState>>,
    Path(item_id): Path<Uuid>,
    _auth: RequireAuth,
    Json(req): Json<UpdateChecklistItemRequest>,
) -> ApiResult<impl IntoResponse> {
    let title = match req.title.as_deref() {
        Some(t) => Some(required_title(t)?.to_string()),
        None => None,
    };

    let row = sqlx::query_as::<_, ChecklistItemRow>(&format!(
        r#"
        UPDATE checklist_items SET
            title = COALESCE($2, title),
            description = CASE WHEN $3 THEN $4 ELSE description END,
            owner = COALESCE($5, owner),
            due_date = CASE WHEN $6 THEN $7 ELSE due_date END,
            evidence_url = CASE WHEN $8 THEN $9 ELSE evidence_url END,
            updated_at = NOW()
        WHERE id = $1
        RETURNING {}
        "#,
        CHECKLIST_ITEM_COLUMNS
    ))
    .bind(item_id)
    .bind(title)
    .bind(req.description.is_some())
    .bind(req.description.flatten().and_then(|d| non_blank(Some(d))))
    .bind(non_blank(req.owner))
    .bind(req.due_date.is_some())
    .bind(req.due_date.flatten())
    .bind(req.evidence_url.is_some())
    .bind(req.evidence_url.flatten().and_then(|u| non_blank(Some(u))))
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Checklist item not found"))?;

    Ok(DataResponse::new(ChecklistItem::from(row)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_app;
    use axum::http::Method;
    use serde_json::json;

    #[test]
    fn titles_are_trimmed_and_required() {
        assert_eq!(required_title("  Contract signed ").unwrap(), "Contract signed");
        assert!(required_title("   ").is_err());
    }

    #[test]
    fn owner_falls_back_to_studio() {
        assert_eq!(owner_or_default(None), DEFAULT_OWNER);
        assert_eq!(owner_or_default(Some(" ".into())), DEFAULT_OWNER);
        assert_eq!(owner_or_default(Some("client".into())), "client");
    }

    async fn default_templates(pool: &PgPool) -> Vec<Uuid> {
        sqlx::query_scalar("SELECT id FROM checklist_templates WHERE is_default")
            .fetch_all(pool)
            .await
            .unwrap()
    }

    #[sqlx::test]
    async fn only_one_template_is_default(pool: PgPool) {
        let app = test_app(pool.clone()).await;
        assert_eq!(default_templates(&pool).await.len(), 1);

        let first = app
            .create("/checklist-templates", json!({ "name": "Animation", "is_default": true }))
            .await;
        assert_eq!(default_templates(&pool).await, vec![first]);

        let second = app
            .create("/checklist-templates", json!({ "name": "Live action", "is_default": true }))
            .await;
        assert_eq!(default_templates(&pool).await, vec![second]);

        let (status, _) = app
            .call(
                Method::PATCH,
                &format!("/checklist-templates/{}", first),
                Some(json!({ "is_default": true })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(default_templates(&pool).await, vec![first]);

        // The partial unique index backs the handlers up
        let direct = sqlx::query("UPDATE checklist_templates SET is_default = TRUE WHERE id = $1")
            .bind(second)
            .execute(&pool)
            .await;
        assert!(direct.is_err());
    }
}

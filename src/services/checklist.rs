//! Project checklist queries shared by the checklist routes, project views
//! and enquiry conversion.

use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::domain::checklists::{
    ChecklistItem, ChecklistItemRow, ChecklistTemplateItem, ChecklistTemplateRow,
    InitializeChecklistResponse, ProductionReadiness, CHECKLIST_ITEM_COLUMNS, TEMPLATE_COLUMNS,
    TEMPLATE_ITEM_COLUMNS,
};
use crate::error::{ApiError, ApiResult};

/// Checklist items of a project in display order
pub async fn load_project_checklist(db: &PgPool, project_id: Uuid) -> ApiResult<Vec<ChecklistItem>> {
    let rows = sqlx::query_as::<_, ChecklistItemRow>(&format!(
        "SELECT {} FROM checklist_items WHERE project_id = $1 ORDER BY sort_order, created_at",
        CHECKLIST_ITEM_COLUMNS
    ))
    .bind(project_id)
    .fetch_all(db)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn project_readiness(db: &PgPool, project_id: Uuid) -> ApiResult<ProductionReadiness> {
    let items = load_project_checklist(db, project_id).await?;
    Ok(ProductionReadiness::evaluate(&items))
}

/// Replace a project's checklist with copies of a template's items.
///
/// Without `template_id` the default template is used.
pub async fn initialize_project_checklist(
    db: &PgPool,
    project_id: Uuid,
    template_id: Option<Uuid>,
) -> ApiResult<InitializeChecklistResponse> {
    let template = match template_id {
        Some(id) => {
            sqlx::query_as::<_, ChecklistTemplateRow>(&format!(
                "SELECT {} FROM checklist_templates WHERE id = $1",
                TEMPLATE_COLUMNS
            ))
            .bind(id)
            .fetch_optional(db)
            .await?
        }
        None => {
            sqlx::query_as::<_, ChecklistTemplateRow>(&format!(
                "SELECT {} FROM checklist_templates WHERE is_default ORDER BY created_at LIMIT 1",
                TEMPLATE_COLUMNS
            ))
            .fetch_optional(db)
            .await?
        }
    }
    .ok_or_else(|| ApiError::not_found("No template found"))?;

    let template_items = sqlx::query_as::<_, ChecklistTemplateItem>(&format!(
        "SELECT {} FROM checklist_template_items WHERE template_id = $1 ORDER BY sort_order",
        TEMPLATE_ITEM_COLUMNS
    ))
    .bind(template.id)
    .fetch_all(db)
    .await?;

    let mut tx = db.begin().await?;

    sqlx::query("DELETE FROM checklist_items WHERE project_id = $1")
        .bind(project_id)
        .execute(&mut *tx)
        .await?;

    let mut items = Vec::with_capacity(template_items.len());
    for item in &template_items {
        let row = sqlx::query_as::<_, ChecklistItemRow>(&format!(
            r#"
            INSERT INTO checklist_items (project_id, title, description, required, owner, sort_order, status)
            VALUES ($1, $2, $3, $4, $5, $6, 'missing')
            RETURNING {}
            "#,
            CHECKLIST_ITEM_COLUMNS
        ))
        .bind(project_id)
        .bind(&item.title)
        .bind(&item.description)
        .bind(item.required)
        .bind(&item.default_owner)
        .bind(item.sort_order)
        .fetch_one(&mut *tx)
        .await?;
        items.push(ChecklistItem::from(row));
    }

    tx.commit().await?;

    info!(
        project_id = %project_id,
        template_id = %template.id,
        items = items.len(),
        "Project checklist initialized"
    );

    Ok(InitializeChecklistResponse {
        template_id: template.id,
        items,
    })
}

//! Enquiry to project conversion.
//!
//! The database writes happen in one transaction. Dropbox work, checklist
//! setup and attachment migration are best effort: each failure is logged,
//! reported as a warning and the conversion carries on. Nothing done in
//! Dropbox is undone when a later step fails.

use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::domain::attachments::{production_path, Attachment, MoveAttachmentsResult, ATTACHMENT_COLUMNS};
use crate::domain::deliverables::{Deliverable, NewDeliverable, DELIVERABLE_COLUMNS};
use crate::domain::enquiries::{EnquiryRow, EnquiryStatus, ENQUIRY_COLUMNS};
use crate::domain::projects::{ConversionResult, ConvertEnquiryRequest, ProjectStatus};
use crate::error::{ApiError, ApiResult};
use crate::services::checklist::initialize_project_checklist;
use crate::services::deliverables::{insert_deliverable, DeliverableOwner};

#[instrument(skip(state, req), fields(company_id = %req.company_id))]
pub async fn create_project_from_enquiry(
    state: &AppState,
    enquiry_id: Uuid,
    req: ConvertEnquiryRequest,
) -> ApiResult<ConversionResult> {
    let mut warnings = Vec::new();

    let enquiry = sqlx::query_as::<_, EnquiryRow>(&format!(
        "SELECT {} FROM enquiries WHERE id = $1",
        ENQUIRY_COLUMNS
    ))
    .bind(enquiry_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Enquiry not found"))?;

    let existing_project: Option<Uuid> =
        sqlx::query_scalar("SELECT id FROM projects WHERE enquiry_id = $1")
            .bind(enquiry_id)
            .fetch_optional(&state.db)
            .await?;
    if existing_project.is_some() || EnquiryStatus::from_db(&enquiry.status) == EnquiryStatus::Converted {
        return Err(ApiError::conflict(
            "Enquiry has already been converted to a project",
        ));
    }

    let project_title = req.project_title.trim().to_string();
    if project_title.is_empty() {
        return Err(ApiError::bad_request("Project title is required"));
    }

    let company_name: String = sqlx::query_scalar("SELECT name FROM companies WHERE id = $1")
        .bind(req.company_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::bad_request("Selected company not found"))?;

    let contact_id = match req.contact_id {
        Some(id) => {
            let found: Option<Uuid> = sqlx::query_scalar("SELECT id FROM contacts WHERE id = $1")
                .bind(id)
                .fetch_optional(&state.db)
                .await?;
            if found.is_none() {
                warn!(contact_id = %id, "Contact not found, converting without contact");
                warnings.push("Selected contact not found; project created without a contact".to_string());
            }
            found
        }
        None => None,
    };

    // Dropbox folder tree
    let dropbox_path = match state
        .dropbox
        .create_project_folder(&company_name, &project_title)
        .await
    {
        Ok(folder) => {
            let structure = state.dropbox.create_standard_folders(&folder.path).await;
            warnings.extend(
                structure
                    .errors
                    .into_iter()
                    .map(|e| format!("Dropbox subfolder not created: {}", e)),
            );

            let refs = state
                .dropbox
                .upload_reference_links(&folder.path, &enquiry.reference_links.0)
                .await;
            warnings.extend(
                refs.errors
                    .into_iter()
                    .map(|e| format!("Reference link not uploaded: {}", e)),
            );

            Some(folder.path)
        }
        Err(e) => {
            error!(enquiry_id = %enquiry_id, error = %e, "Dropbox folder creation failed");
            warnings.push(format!("Dropbox folder creation failed: {}", e));
            None
        }
    };

    let deliverables: Vec<NewDeliverable> = if req.deliverables.is_empty() {
        sqlx::query_as::<_, Deliverable>(&format!(
            "SELECT {} FROM deliverables WHERE enquiry_id = $1 ORDER BY created_at",
            DELIVERABLE_COLUMNS
        ))
        .bind(enquiry_id)
        .fetch_all(&state.db)
        .await?
        .iter()
        .map(NewDeliverable::from)
        .collect()
    } else {
        req.deliverables.into_iter().map(|d| d.normalize()).collect()
    };

    let mut tx = state.db.begin().await?;

    let project_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO projects
            (title, status, company_id, contact_id, enquiry_id, dropbox_path, budget, budget_min, budget_max)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING id
        "#,
    )
    .bind(&project_title)
    .bind(ProjectStatus::Proposed.as_str())
    .bind(req.company_id)
    .bind(contact_id)
    .bind(enquiry_id)
    .bind(&dropbox_path)
    .bind(&enquiry.budget)
    .bind(&enquiry.budget_min)
    .bind(&enquiry.budget_max)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            ApiError::conflict("Enquiry has already been converted to a project")
        }
        other => ApiError::Database(other),
    })?;

    for deliverable in &deliverables {
        insert_deliverable(&mut *tx, DeliverableOwner::Project(project_id), deliverable).await?;
    }

    sqlx::query("UPDATE enquiries SET status = $2, updated_at = NOW() WHERE id = $1")
        .bind(enquiry_id)
        .bind(EnquiryStatus::Converted.as_str())
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    let checklist_items = match initialize_project_checklist(&state.db, project_id, None).await {
        Ok(checklist) => checklist.items.len(),
        Err(e) => {
            warn!(project_id = %project_id, error = %e, "Checklist initialization failed");
            warnings.push(format!("Checklist not initialized: {}", e.public_message()));
            0
        }
    };

    let mut attachments_moved = 0;
    if let Some(path) = &dropbox_path {
        match move_attachments_to_production(state, enquiry_id, path).await {
            Ok(moved) => {
                attachments_moved = moved.moved;
                warnings.extend(moved.errors);
            }
            Err(e) => {
                warn!(project_id = %project_id, error = %e, "Attachment migration failed");
                warnings.push(format!("Attachments not moved: {}", e.public_message()));
            }
        }
    }

    info!(
        enquiry_id = %enquiry_id,
        project_id = %project_id,
        dropbox_path = ?dropbox_path,
        deliverables = deliverables.len(),
        checklist_items = checklist_items,
        attachments_moved = attachments_moved,
        warnings = warnings.len(),
        "Enquiry converted to project"
    );

    Ok(ConversionResult {
        project_id,
        dropbox_path,
        deliverables_created: deliverables.len(),
        checklist_items,
        attachments_moved,
        warnings,
    })
}

/// Upload every attachment not yet moved into the project folder, routed
/// to a subfolder by extension, and record where it went.
#[instrument(skip(state))]
pub async fn move_attachments_to_production(
    state: &AppState,
    enquiry_id: Uuid,
    project_path: &str,
) -> ApiResult<MoveAttachmentsResult> {
    let mut result = MoveAttachmentsResult::default();

    if !state.dropbox.is_configured() {
        result.errors.push("Dropbox credentials not configured".to_string());
        return Ok(result);
    }

    let attachments = sqlx::query_as::<_, Attachment>(&format!(
        "SELECT {} FROM enquiry_attachments WHERE enquiry_id = $1 AND NOT moved_to_production \
         ORDER BY uploaded_at",
        ATTACHMENT_COLUMNS
    ))
    .bind(enquiry_id)
    .fetch_all(&state.db)
    .await?;

    for attachment in attachments {
        let contents = match state.attachments.read(attachment.id).await {
            Ok(Some(contents)) => contents,
            Ok(None) => {
                result
                    .errors
                    .push(format!("Could not read {}: file not found", attachment.filename));
                continue;
            }
            Err(e) => {
                result
                    .errors
                    .push(format!("Could not read {}: {}", attachment.filename, e));
                continue;
            }
        };

        let destination = production_path(project_path, &attachment.filename);
        let stored_path = match state.dropbox.upload(&destination, contents).await {
            Ok(path) => path,
            Err(e) => {
                warn!(attachment_id = %attachment.id, error = %e, "Attachment upload failed");
                result
                    .errors
                    .push(format!("Failed to upload {}: {}", attachment.filename, e));
                continue;
            }
        };

        sqlx::query(
            r#"
            UPDATE enquiry_attachments
            SET moved_to_production = TRUE, production_path = $2, dropbox_path = $2
            WHERE id = $1
            "#,
        )
        .bind(attachment.id)
        .bind(&stored_path)
        .execute(&state.db)
        .await?;

        result.moved += 1;
    }

    info!(
        enquiry_id = %enquiry_id,
        moved = result.moved,
        errors = result.errors.len(),
        "Attachments moved to production"
    );

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_app;
    use serde_json::json;
    use sqlx::PgPool;

    fn convert_request(company_id: Uuid) -> ConvertEnquiryRequest {
        ConvertEnquiryRequest {
            company_id,
            project_title: "  Launch Film ".to_string(),
            contact_id: None,
            deliverables: Vec::new(),
        }
    }

    #[sqlx::test]
    async fn conversion_marks_enquiry_converted_and_copies_deliverables(pool: PgPool) {
        let app = test_app(pool).await;
        let company_id = app.create("/companies", json!({ "name": "Acme Studios" })).await;
        let enquiry_id = app
            .create(
                "/enquiries",
                json!({
                    "raw_content": "Launch film plus a cutdown",
                    "deliverables": [
                        { "name": "Hero film", "width": 1920, "height": 1080 },
                        { "name": "Cutdown" }
                    ]
                }),
            )
            .await;

        let result = create_project_from_enquiry(&app.state, enquiry_id, convert_request(company_id))
            .await
            .unwrap();

        assert_eq!(result.deliverables_created, 2);
        assert_eq!(result.checklist_items, 6);
        assert!(result.dropbox_path.as_deref().unwrap().ends_with("Launch Film"));
        assert!(result
            .warnings
            .iter()
            .any(|w| w == "Dropbox credentials not configured"));

        let status: String = sqlx::query_scalar("SELECT status FROM enquiries WHERE id = $1")
            .bind(enquiry_id)
            .fetch_one(&app.state.db)
            .await
            .unwrap();
        assert_eq!(status, EnquiryStatus::Converted.as_str());

        let (title, project_status): (String, String) =
            sqlx::query_as("SELECT title, status FROM projects WHERE id = $1")
                .bind(result.project_id)
                .fetch_one(&app.state.db)
                .await
                .unwrap();
        assert_eq!(title, "Launch Film");
        assert_eq!(project_status, ProjectStatus::Proposed.as_str());

        let copied: Vec<(Option<String>, Option<String>)> = sqlx::query_as(
            "SELECT name, aspect_ratio FROM deliverables WHERE project_id = $1 ORDER BY name",
        )
        .bind(result.project_id)
        .fetch_all(&app.state.db)
        .await
        .unwrap();
        assert_eq!(
            copied,
            vec![
                (Some("Cutdown".to_string()), None),
                (Some("Hero film".to_string()), Some("16:9".to_string())),
            ]
        );

        // The enquiry keeps its own rows
        let originals: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM deliverables WHERE enquiry_id = $1")
                .bind(enquiry_id)
                .fetch_one(&app.state.db)
                .await
                .unwrap();
        assert_eq!(originals, 2);
    }

    #[sqlx::test]
    async fn second_conversion_is_a_conflict(pool: PgPool) {
        let app = test_app(pool).await;
        let company_id = app.create("/companies", json!({ "name": "Acme Studios" })).await;
        let enquiry_id = app
            .create("/enquiries", json!({ "raw_content": "Launch film" }))
            .await;

        create_project_from_enquiry(&app.state, enquiry_id, convert_request(company_id))
            .await
            .unwrap();
        let err = create_project_from_enquiry(&app.state, enquiry_id, convert_request(company_id))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));

        let projects: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM projects WHERE enquiry_id = $1")
            .bind(enquiry_id)
            .fetch_one(&app.state.db)
            .await
            .unwrap();
        assert_eq!(projects, 1);
    }

    #[sqlx::test]
    async fn request_deliverables_replace_the_enquiry_ones(pool: PgPool) {
        let app = test_app(pool).await;
        let company_id = app.create("/companies", json!({ "name": "Acme Studios" })).await;
        let enquiry_id = app
            .create(
                "/enquiries",
                json!({ "raw_content": "Launch film", "deliverables": [{ "name": "Hero film" }] }),
            )
            .await;

        let mut req = convert_request(company_id);
        req.deliverables = serde_json::from_value(json!([{ "name": " " }])).unwrap();
        let result = create_project_from_enquiry(&app.state, enquiry_id, req)
            .await
            .unwrap();
        assert_eq!(result.deliverables_created, 1);

        let names: Vec<Option<String>> =
            sqlx::query_scalar("SELECT name FROM deliverables WHERE project_id = $1")
                .bind(result.project_id)
                .fetch_all(&app.state.db)
                .await
                .unwrap();
        assert_eq!(names, vec![Some("Untitled Deliverable".to_string())]);
    }
}

//! Enquiry routes
//!
//! Inbound client requests: capture, AI parsing, archiving and conversion
//! into projects.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use sqlx::{types::Json as SqlJson, PgPool, Postgres, Transaction};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{DataResponse, MessageResponse, Paginated, PaginationParams};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::db::contains_pattern;
use crate::domain::activities::{Activity, ActivityRow, ACTIVITY_COLUMNS};
use crate::domain::attachments::{Attachment, ATTACHMENT_COLUMNS};
use crate::domain::companies::{
    candidate_search_terms, rank_candidates, CandidateRow, Company, COMPANY_COLUMNS,
};
use crate::domain::contacts::{Contact, CONTACT_COLUMNS};
use crate::domain::deliverables::{Deliverable, DELIVERABLE_COLUMNS};
use crate::domain::enquiries::{
    list_description, CreateEnquiryRequest, Enquiry, EnquiryDetail, EnquiryListItem, EnquiryRow,
    EnquiryStatus, ParseEnquiryRequest, ParseEnquiryResponse, UpdateEnquiryRequest,
    ENQUIRY_COLUMNS,
};
use crate::domain::non_blank;
use crate::domain::projects::{ConvertEnquiryRequest, ProjectSummary, PROJECT_SUMMARY_COLUMNS};
use crate::error::{ApiError, ApiResult};
use crate::middleware::RequestIdExt;
use crate::routes::companies::find_company;
use crate::services::conversion;
use crate::services::deliverables::{insert_deliverable, DeliverableOwner};

/// Companies pulled from the database before scoring
const CANDIDATE_POOL: i64 = 10;

pub async fn fetch_enquiry(db: &PgPool, enquiry_id: Uuid) -> ApiResult<EnquiryRow> {
    sqlx::query_as::<_, EnquiryRow>(&format!(
        "SELECT {} FROM enquiries WHERE id = $1",
        ENQUIRY_COLUMNS
    ))
    .bind(enquiry_id)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| ApiError::not_found("Enquiry not found"))
}

pub async fn find_contact(db: &PgPool, contact_id: Uuid) -> ApiResult<Option<Contact>> {
    Ok(sqlx::query_as::<_, Contact>(&format!(
        "SELECT {} FROM contacts WHERE id = $1",
        CONTACT_COLUMNS
    ))
    .bind(contact_id)
    .fetch_optional(db)
    .await?)
}

async fn enquiry_deliverables(db: &PgPool, enquiry_ids: &[Uuid]) -> ApiResult<Vec<Deliverable>> {
    Ok(sqlx::query_as::<_, Deliverable>(&format!(
        "SELECT {} FROM deliverables WHERE enquiry_id = ANY($1) ORDER BY created_at",
        DELIVERABLE_COLUMNS
    ))
    .bind(enquiry_ids)
    .fetch_all(db)
    .await?)
}

/// GET /enquiries
///
/// Archived enquiries are hidden; newest first.
pub async fn list_enquiries(
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
    _auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let archived = EnquiryStatus::Archived.as_str();

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM enquiries WHERE status <> $1")
        .bind(archived)
        .fetch_one(&state.db)
        .await?;

    let rows = sqlx::query_as::<_, EnquiryRow>(&format!(
        "SELECT {} FROM enquiries WHERE status <> $1 ORDER BY received_at DESC LIMIT $2 OFFSET $3",
        ENQUIRY_COLUMNS
    ))
    .bind(archived)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await?;

    let enquiry_ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let company_ids: Vec<Uuid> = rows.iter().filter_map(|r| r.company_id).collect();
    let contact_ids: Vec<Uuid> = rows.iter().filter_map(|r| r.contact_id).collect();

    let companies: HashMap<Uuid, Company> = sqlx::query_as::<_, Company>(&format!(
        "SELECT {} FROM companies WHERE id = ANY($1)",
        COMPANY_COLUMNS
    ))
    .bind(&company_ids)
    .fetch_all(&state.db)
    .await?
    .into_iter()
    .map(|c| (c.id, c))
    .collect();

    let contacts: HashMap<Uuid, Contact> = sqlx::query_as::<_, Contact>(&format!(
        "SELECT {} FROM contacts WHERE id = ANY($1)",
        CONTACT_COLUMNS
    ))
    .bind(&contact_ids)
    .fetch_all(&state.db)
    .await?
    .into_iter()
    .map(|c| (c.id, c))
    .collect();

    let mut projects: HashMap<Uuid, ProjectSummary> = sqlx::query_as::<_, ProjectSummary>(&format!(
        "SELECT {} FROM projects WHERE enquiry_id = ANY($1)",
        PROJECT_SUMMARY_COLUMNS
    ))
    .bind(&enquiry_ids)
    .fetch_all(&state.db)
    .await?
    .into_iter()
    .filter_map(|p| p.enquiry_id.map(|id| (id, p)))
    .collect();

    let mut deliverables: HashMap<Uuid, Vec<Deliverable>> = HashMap::new();
    for d in enquiry_deliverables(&state.db, &enquiry_ids).await? {
        if let Some(enquiry_id) = d.enquiry_id {
            deliverables.entry(enquiry_id).or_default().push(d);
        }
    }

    let data: Vec<EnquiryListItem> = rows
        .into_iter()
        .map(|row| {
            let enquiry = Enquiry::from(row);
            EnquiryListItem {
                title: enquiry.project_title.clone(),
                description: list_description(
                    enquiry.project_description.as_deref(),
                    &enquiry.raw_content,
                ),
                // Several enquiries can share a company or contact
                company: enquiry.company_id.and_then(|id| companies.get(&id).cloned()),
                contact: enquiry.contact_id.and_then(|id| contacts.get(&id).cloned()),
                project: projects.remove(&enquiry.id),
                deliverables: deliverables.remove(&enquiry.id).unwrap_or_default(),
                enquiry,
            }
        })
        .collect();

    Ok(Paginated::new(data, &pagination, total as u64))
}

/// GET /enquiries/:enquiry_id
pub async fn get_enquiry(
    State(state): State<Arc<AppState>>,
    Path(enquiry_id): Path<Uuid>,
    _auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let enquiry = Enquiry::from(fetch_enquiry(&state.db, enquiry_id).await?);

    let company = match enquiry.company_id {
        Some(id) => find_company(&state.db, id).await?,
        None => None,
    };
    let contact = match enquiry.contact_id {
        Some(id) => find_contact(&state.db, id).await?,
        None => None,
    };

    let project = sqlx::query_as::<_, ProjectSummary>(&format!(
        "SELECT {} FROM projects WHERE enquiry_id = $1",
        PROJECT_SUMMARY_COLUMNS
    ))
    .bind(enquiry_id)
    .fetch_optional(&state.db)
    .await?;

    let attachments = sqlx::query_as::<_, Attachment>(&format!(
        "SELECT {} FROM enquiry_attachments WHERE enquiry_id = $1 ORDER BY uploaded_at DESC",
        ATTACHMENT_COLUMNS
    ))
    .bind(enquiry_id)
    .fetch_all(&state.db)
    .await?;

    let activities = sqlx::query_as::<_, ActivityRow>(&format!(
        "SELECT {} FROM enquiry_activities WHERE enquiry_id = $1 ORDER BY created_at DESC",
        ACTIVITY_COLUMNS
    ))
    .bind(enquiry_id)
    .fetch_all(&state.db)
    .await?
    .into_iter()
    .map(Activity::from)
    .collect();

    let deliverables = enquiry_deliverables(&state.db, &[enquiry_id]).await?;

    Ok(DataResponse::new(EnquiryDetail {
        enquiry,
        company,
        contact,
        project,
        attachments,
        activities,
        deliverables,
    }))
}

/// Resolve the company named on a new enquiry: reuse one with the same
/// name (filling in a missing website) or create it.
async fn company_by_name(
    tx: &mut Transaction<'_, Postgres>,
    name: &str,
    website: Option<&str>,
) -> ApiResult<Uuid> {
    let existing: Option<(Uuid, Option<String>)> = sqlx::query_as(
        "SELECT id, website FROM companies WHERE LOWER(TRIM(name)) = LOWER($1) ORDER BY created_at LIMIT 1",
    )
    .bind(name)
    .fetch_optional(&mut **tx)
    .await?;

    match existing {
        Some((id, current_website)) => {
            if let (Some(website), None) = (website, non_blank(current_website)) {
                sqlx::query("UPDATE companies SET website = $2, updated_at = NOW() WHERE id = $1")
                    .bind(id)
                    .bind(website)
                    .execute(&mut **tx)
                    .await?;
            }
            Ok(id)
        }
        None => {
            let id: Uuid = sqlx::query_scalar(
                "INSERT INTO companies (name, website) VALUES ($1, $2) RETURNING id",
            )
            .bind(name)
            .bind(website)
            .fetch_one(&mut **tx)
            .await?;
            tracing::info!(company_id = %id, name = name, "Company created from enquiry");
            Ok(id)
        }
    }
}

/// POST /enquiries
pub async fn create_enquiry(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
    Json(req): Json<CreateEnquiryRequest>,
) -> ApiResult<impl IntoResponse> {
    let raw_content = req.raw_content.trim().to_string();
    if raw_content.is_empty() {
        return Err(ApiError::bad_request("Content cannot be empty"));
    }

    let number_of_deliverables = req.deliverable_count();
    let reference_links: Vec<String> = req
        .reference_links
        .iter()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect();

    let mut tx = state.db.begin().await?;

    let company_id = match (req.company_id, non_blank(req.company_name.clone())) {
        (Some(id), _) => {
            let found: Option<Uuid> = sqlx::query_scalar("SELECT id FROM companies WHERE id = $1")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
            Some(found.ok_or_else(|| ApiError::bad_request("Selected company not found"))?)
        }
        (None, Some(name)) => {
            let website = non_blank(req.company_website.clone());
            Some(company_by_name(&mut tx, &name, website.as_deref()).await?)
        }
        (None, None) => None,
    };

    if let Some(contact_id) = req.contact_id {
        let found: Option<Uuid> = sqlx::query_scalar("SELECT id FROM contacts WHERE id = $1")
            .bind(contact_id)
            .fetch_optional(&mut *tx)
            .await?;
        if found.is_none() {
            return Err(ApiError::bad_request("Selected contact not found"));
        }
    }

    let row = sqlx::query_as::<_, EnquiryRow>(&format!(
        r#"
        INSERT INTO enquiries
            (raw_content, status, company_id, contact_id, project_title, project_summary,
             project_description, budget, budget_min, budget_max, timeline, framerate,
             aspect_ratio, tone, reference_links, number_of_deliverables)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
        RETURNING {}
        "#,
        ENQUIRY_COLUMNS
    ))
    .bind(&raw_content)
    .bind(EnquiryStatus::Pending.as_str())
    .bind(company_id)
    .bind(req.contact_id)
    .bind(non_blank(req.project_title))
    .bind(non_blank(req.project_summary))
    .bind(non_blank(req.project_description))
    .bind(non_blank(req.budget))
    .bind(non_blank(req.budget_min))
    .bind(non_blank(req.budget_max))
    .bind(non_blank(req.timeline))
    .bind(non_blank(req.framerate))
    .bind(non_blank(req.aspect_ratio))
    .bind(non_blank(req.tone))
    .bind(SqlJson(&reference_links))
    .bind(number_of_deliverables)
    .fetch_one(&mut *tx)
    .await?;

    let deliverable_count = req.deliverables.len();
    for input in req.deliverables {
        insert_deliverable(&mut *tx, DeliverableOwner::Enquiry(row.id), &input.normalize()).await?;
    }

    tx.commit().await?;

    tracing::info!(
        user_id = %auth.user_id,
        enquiry_id = %row.id,
        company_id = ?company_id,
        deliverables = deliverable_count,
        "Enquiry created"
    );

    Ok((StatusCode::CREATED, DataResponse::new(Enquiry::from(row))))
}

/// PATCH /enquiries/:enquiry_id
///
/// `company_id: null` clears the company.
pub async fn update_enquiry(
    State(state): State<Arc<AppState>>,
    Path(enquiry_id): Path<Uuid>,
    _auth: RequireAuth,
    Json(req): Json<UpdateEnquiryRequest>,
) -> ApiResult<impl IntoResponse> {
    let raw_content = match req.raw_content.as_deref().map(str::trim) {
        Some("") => return Err(ApiError::bad_request("Content cannot be empty")),
        other => other.map(str::to_string),
    };

    if let Some(Some(company_id)) = req.company_id {
        if find_company(&state.db, company_id).await?.is_none() {
            return Err(ApiError::bad_request("Selected company not found"));
        }
    }

    let row = sqlx::query_as::<_, EnquiryRow>(&format!(
        r#"
        UPDATE enquiries SET
            raw_content = COALESCE($2, raw_content),
            company_id = CASE WHEN $3 THEN $4 ELSE company_id END,
            updated_at = NOW()
        WHERE id = $1
        RETURNING {}
        "#,
        ENQUIRY_COLUMNS
    ))
    .bind(enquiry_id)
    .bind(raw_content)
    .bind(req.company_id.is_some())
    .bind(req.company_id.flatten())
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Enquiry not found"))?;

    Ok(DataResponse::new(Enquiry::from(row)))
}

/// DELETE /enquiries/:enquiry_id
pub async fn delete_enquiry(
    State(state): State<Arc<AppState>>,
    Path(enquiry_id): Path<Uuid>,
    auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let enquiry = fetch_enquiry(&state.db, enquiry_id).await?;

    let has_project: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM projects WHERE enquiry_id = $1)")
            .bind(enquiry_id)
            .fetch_one(&state.db)
            .await?;

    if has_project || EnquiryStatus::from_db(&enquiry.status) == EnquiryStatus::Converted {
        return Err(ApiError::conflict(
            "Cannot delete enquiry that has been converted to a project. Archive it instead.",
        ));
    }

    let attachment_ids: Vec<Uuid> =
        sqlx::query_scalar("SELECT id FROM enquiry_attachments WHERE enquiry_id = $1")
            .bind(enquiry_id)
            .fetch_all(&state.db)
            .await?;

    sqlx::query("DELETE FROM enquiries WHERE id = $1")
        .bind(enquiry_id)
        .execute(&state.db)
        .await?;

    // Attachment rows cascade; their stored files do not
    for id in attachment_ids {
        if let Err(e) = state.attachments.delete(id).await {
            tracing::warn!(attachment_id = %id, error = %e, "Failed to delete attachment file");
        }
    }

    tracing::info!(user_id = %auth.user_id, enquiry_id = %enquiry_id, "Enquiry deleted");

    Ok(MessageResponse::new("Enquiry deleted"))
}

/// POST /enquiries/:enquiry_id/archive
pub async fn archive_enquiry(
    State(state): State<Arc<AppState>>,
    Path(enquiry_id): Path<Uuid>,
    _auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let row = sqlx::query_as::<_, EnquiryRow>(&format!(
        "UPDATE enquiries SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
        ENQUIRY_COLUMNS
    ))
    .bind(enquiry_id)
    .bind(EnquiryStatus::Archived.as_str())
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Enquiry not found"))?;

    Ok(DataResponse::new(Enquiry::from(row)))
}

/// POST /enquiries/parse
///
/// Extract structured fields with the LLM and suggest matching companies.
pub async fn parse_enquiry(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    _auth: RequireAuth,
    Json(req): Json<ParseEnquiryRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.raw_content.trim().is_empty() {
        return Err(ApiError::bad_request("Content cannot be empty"));
    }

    let parsed = state
        .llm_client
        .parse_enquiry(&req.raw_content, headers.request_id())
        .await?;

    let patterns: Vec<String> = candidate_search_terms(&parsed.client_name)
        .iter()
        .map(|term| contains_pattern(term))
        .collect();

    let rows = sqlx::query_as::<_, CandidateRow>(
        r#"
        SELECT c.id, c.name, c.company_email,
               (SELECT COUNT(*) FROM contacts ct WHERE ct.company_id = c.id) AS contact_count
        FROM companies c
        WHERE c.name ILIKE ANY($1)
        ORDER BY c.name
        LIMIT $2
        "#,
    )
    .bind(&patterns)
    .bind(CANDIDATE_POOL)
    .fetch_all(&state.db)
    .await?;

    let candidates = rank_candidates(rows, &parsed.client_name);

    tracing::info!(
        client_name = %parsed.client_name,
        candidates = candidates.len(),
        "Company candidates ranked"
    );

    Ok(DataResponse::new(ParseEnquiryResponse::new(parsed, candidates)))
}

/// POST /enquiries/:enquiry_id/convert
pub async fn convert_enquiry(
    State(state): State<Arc<AppState>>,
    Path(enquiry_id): Path<Uuid>,
    auth: RequireAuth,
    Json(req): Json<ConvertEnquiryRequest>,
) -> ApiResult<impl IntoResponse> {
    tracing::info!(
        user_id = %auth.user_id,
        enquiry_id = %enquiry_id,
        "Converting enquiry to project"
    );

    let result = conversion::create_project_from_enquiry(&state, enquiry_id, req).await?;

    Ok((StatusCode::CREATED, DataResponse::new(result)))
}

#[cfg(test)]
mod tests {
    use crate::test_support::test_app;
    use axum::http::{Method, StatusCode};
    use serde_json::json;
    use sqlx::PgPool;

    #[sqlx::test]
    async fn converted_enquiry_cannot_be_deleted(pool: PgPool) {
        let app = test_app(pool).await;
        let company_id = app.create("/companies", json!({ "name": "Acme Studios" })).await;
        let project_id = app.project_for(company_id).await;

        let (_, project) = app
            .call(Method::GET, &format!("/projects/{}", project_id), None)
            .await;
        let enquiry_id = project["data"]["enquiry_id"].as_str().unwrap().to_string();

        let (status, body) = app
            .call(Method::DELETE, &format!("/enquiries/{}", enquiry_id), None)
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(
            body["message"],
            "Cannot delete enquiry that has been converted to a project. Archive it instead."
        );

        let (status, _) = app
            .call(Method::POST, &format!("/enquiries/{}/archive", enquiry_id), None)
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[sqlx::test]
    async fn pending_enquiry_is_deleted(pool: PgPool) {
        let app = test_app(pool).await;
        let enquiry_id = app
            .create("/enquiries", json!({ "raw_content": "Quick social cutdowns" }))
            .await;

        let (status, _) = app
            .call(Method::DELETE, &format!("/enquiries/{}", enquiry_id), None)
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = app
            .call(Method::GET, &format!("/enquiries/{}", enquiry_id), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[sqlx::test]
    async fn blank_content_is_rejected(pool: PgPool) {
        let app = test_app(pool).await;
        let (status, body) = app
            .call(Method::POST, "/enquiries", Some(json!({ "raw_content": "   " })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Content cannot be empty");
    }
}

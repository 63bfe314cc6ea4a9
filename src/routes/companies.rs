//! Company routes
//!
//! Client companies, their logos and search.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{DataResponse, MessageResponse};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::db::contains_pattern;
use crate::domain::companies::{
    favicon_url, Company, CompanyDetail, CompanySearchQuery, CompanyWithCounts,
    CreateCompanyRequest, LogoBatchResponse, LogoResponse, UpdateCompanyRequest, COMPANY_COLUMNS,
};
use crate::domain::contacts::{Contact, CONTACT_COLUMNS};
use crate::domain::non_blank;
use crate::domain::projects::{ProjectSummary, PROJECT_SUMMARY_COLUMNS};
use crate::error::{ApiError, ApiResult};

const SEARCH_LIMIT: i64 = 20;

/// Load a company or fail with 404
pub async fn fetch_company(db: &PgPool, company_id: Uuid) -> ApiResult<Company> {
    find_company(db, company_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Company not found"))
}

pub async fn find_company(db: &PgPool, company_id: Uuid) -> ApiResult<Option<Company>> {
    Ok(sqlx::query_as::<_, Company>(&format!(
        "SELECT {} FROM companies WHERE id = $1",
        COMPANY_COLUMNS
    ))
    .bind(company_id)
    .fetch_optional(db)
    .await?)
}

/// GET /companies
pub async fn list_companies(
    State(state): State<Arc<AppState>>,
    _auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let companies = sqlx::query_as::<_, CompanyWithCounts>(
        r#"
        SELECT c.*,
               (SELECT COUNT(*) FROM projects p WHERE p.company_id = c.id) AS project_count,
               (SELECT COUNT(*) FROM contacts ct WHERE ct.company_id = c.id) AS contact_count
        FROM companies c
        ORDER BY c.name
        "#,
    )
    .fetch_all(&state.db)
    .await?;

    Ok(DataResponse::new(companies))
}

/// POST /companies
///
/// Names are not unique; a second company with the same name is allowed.
pub async fn create_company(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
    Json(req): Json<CreateCompanyRequest>,
) -> ApiResult<impl IntoResponse> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("Company name is required"));
    }

    let company = sqlx::query_as::<_, Company>(&format!(
        r#"
        INSERT INTO companies (name, company_email, company_phone, street, city, state, postcode, abn, website)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING {}
        "#,
        COMPANY_COLUMNS
    ))
    .bind(name)
    .bind(non_blank(req.company_email))
    .bind(non_blank(req.company_phone))
    .bind(non_blank(req.street))
    .bind(non_blank(req.city))
    .bind(non_blank(req.state))
    .bind(non_blank(req.postcode))
    .bind(non_blank(req.abn))
    .bind(non_blank(req.website))
    .fetch_one(&state.db)
    .await?;

    tracing::info!(
        user_id = %auth.user_id,
        company_id = %company.id,
        name = %company.name,
        "Company created"
    );

    Ok((StatusCode::CREATED, DataResponse::new(company)))
}

/// GET /companies/search?q=
///
/// Case-insensitive substring match on name or email.
pub async fn search_companies(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CompanySearchQuery>,
    _auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let q = query.q.trim();
    if q.is_empty() {
        return Ok(DataResponse::new(Vec::<Company>::new()));
    }

    let companies = sqlx::query_as::<_, Company>(&format!(
        "SELECT {} FROM companies WHERE name ILIKE $1 OR company_email ILIKE $1 ORDER BY name LIMIT $2",
        COMPANY_COLUMNS
    ))
    .bind(contains_pattern(q))
    .bind(SEARCH_LIMIT)
    .fetch_all(&state.db)
    .await?;

    Ok(DataResponse::new(companies))
}

/// GET /companies/:company_id
pub async fn get_company(
    State(state): State<Arc<AppState>>,
    Path(company_id): Path<Uuid>,
    _auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let company = fetch_company(&state.db, company_id).await?;

    let projects = sqlx::query_as::<_, ProjectSummary>(&format!(
        "SELECT {} FROM projects WHERE company_id = $1 ORDER BY created_at DESC",
        PROJECT_SUMMARY_COLUMNS
    ))
    .bind(company_id)
    .fetch_all(&state.db)
    .await?;

    let contacts = sqlx::query_as::<_, Contact>(&format!(
        "SELECT {} FROM contacts WHERE company_id = $1 ORDER BY first_name, last_name",
        CONTACT_COLUMNS
    ))
    .bind(company_id)
    .fetch_all(&state.db)
    .await?;

    Ok(DataResponse::new(CompanyDetail {
        company,
        projects,
        contacts,
    }))
}

/// PATCH /companies/:company_id
pub async fn update_company(
    State(state): State<Arc<AppState>>,
    Path(company_id): Path<Uuid>,
    _auth: RequireAuth,
    Json(req): Json<UpdateCompanyRequest>,
) -> ApiResult<impl IntoResponse> {
    let name = match req.name.as_deref().map(str::trim) {
        Some("") => return Err(ApiError::bad_request("Company name cannot be empty")),
        other => other.map(str::to_string),
    };

    let company = sqlx::query_as::<_, Company>(&format!(
        r#"
        UPDATE companies SET
            name = COALESCE($2, name),
            company_email = COALESCE($3, company_email),
            company_phone = COALESCE($4, company_phone),
            street = COALESCE($5, street),
            city = COALESCE($6, city),
            state = COALESCE($7, state),
            postcode = COALESCE($8, postcode),
            abn = COALESCE($9, abn),
            website = COALESCE($10, website),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {}
        "#,
        COMPANY_COLUMNS
    ))
    .bind(company_id)
    .bind(name)
    .bind(req.company_email.map(|v| v.trim().to_string()))
    .bind(req.company_phone.map(|v| v.trim().to_string()))
    .bind(req.street.map(|v| v.trim().to_string()))
    .bind(req.city.map(|v| v.trim().to_string()))
    .bind(req.state.map(|v| v.trim().to_string()))
    .bind(req.postcode.map(|v| v.trim().to_string()))
    .bind(req.abn.map(|v| v.trim().to_string()))
    .bind(req.website.map(|v| v.trim().to_string()))
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Company not found"))?;

    Ok(DataResponse::new(company))
}

/// DELETE /companies/:company_id
///
/// Refused while projects reference the company; contacts cascade.
pub async fn delete_company(
    State(state): State<Arc<AppState>>,
    Path(company_id): Path<Uuid>,
    auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    fetch_company(&state.db, company_id).await?;

    let project_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM projects WHERE company_id = $1")
        .bind(company_id)
        .fetch_one(&state.db)
        .await?;
    if project_count > 0 {
        return Err(ApiError::conflict(format!(
            "Cannot delete company with {} active project(s)",
            project_count
        )));
    }

    sqlx::query("DELETE FROM companies WHERE id = $1")
        .bind(company_id)
        .execute(&state.db)
        .await?;

    tracing::info!(user_id = %auth.user_id, company_id = %company_id, "Company deleted");

    Ok(MessageResponse::new("Company deleted"))
}

async fn set_logo(db: &PgPool, company_id: Uuid, logo_url: &str) -> ApiResult<Company> {
    Ok(sqlx::query_as::<_, Company>(&format!(
        "UPDATE companies SET logo_url = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
        COMPANY_COLUMNS
    ))
    .bind(company_id)
    .bind(logo_url)
    .fetch_one(db)
    .await?)
}

/// POST /companies/:company_id/logo
pub async fn fetch_company_logo(
    State(state): State<Arc<AppState>>,
    Path(company_id): Path<Uuid>,
    _auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let company = fetch_company(&state.db, company_id).await?;

    let website = non_blank(company.website)
        .ok_or_else(|| ApiError::bad_request("Company has no website"))?;

    let logo_url = favicon_url(&website);
    let company = set_logo(&state.db, company_id, &logo_url).await?;

    Ok(DataResponse::new(LogoResponse { logo_url, company }))
}

/// POST /companies/logos
///
/// Fill in logos for every company with a website but no logo.
pub async fn fetch_missing_logos(
    State(state): State<Arc<AppState>>,
    _auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let pending: Vec<(Uuid, String)> = sqlx::query_as(
        r#"
        SELECT id, website FROM companies
        WHERE website IS NOT NULL AND TRIM(website) <> ''
          AND (logo_url IS NULL OR logo_url = '')
        ORDER BY name
        "#,
    )
    .fetch_all(&state.db)
    .await?;

    let mut result = LogoBatchResponse {
        total_processed: pending.len(),
        ..Default::default()
    };

    for (company_id, website) in pending {
        match set_logo(&state.db, company_id, &favicon_url(&website)).await {
            Ok(_) => result.updated += 1,
            Err(e) => {
                tracing::warn!(company_id = %company_id, error = %e, "Failed to set company logo");
                result.failed += 1;
            }
        }
    }

    tracing::info!(
        processed = result.total_processed,
        updated = result.updated,
        failed = result.failed,
        "Company logos fetched"
    );

    Ok(DataResponse::new(result))
}

//! Contact routes
//!
//! People at client companies, plus spreadsheet import.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use sqlx::PgPool;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{DataResponse, MessageResponse};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::contacts::{
    detect_column_mapping, row_error, Contact, ContactDetail, ContactGroup, ContactGroupCompany,
    ContactListItem, CreateContactRequest, DetectMappingRequest, FindOrCreateContactResponse,
    ImportContactsRequest, ImportContactsResult, ImportRow, CONTACT_COLUMNS,
};
use crate::domain::enquiries::EnquirySummary;
use crate::domain::projects::{ProjectSummary, PROJECT_SUMMARY_COLUMNS};
use crate::error::{ApiError, ApiResult};
use crate::routes::companies::{fetch_company, find_company};

async fn fetch_contact(db: &PgPool, contact_id: Uuid) -> ApiResult<Contact> {
    sqlx::query_as::<_, Contact>(&format!(
        "SELECT {} FROM contacts WHERE id = $1",
        CONTACT_COLUMNS
    ))
    .bind(contact_id)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| ApiError::not_found("Contact not found"))
}

async fn insert_contact(db: &PgPool, req: &CreateContactRequest) -> ApiResult<Contact> {
    Ok(sqlx::query_as::<_, Contact>(&format!(
        r#"
        INSERT INTO contacts (company_id, first_name, last_name, email, phone, job_title)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {}
        "#,
        CONTACT_COLUMNS
    ))
    .bind(req.company_id)
    .bind(&req.first_name)
    .bind(&req.last_name)
    .bind(&req.email)
    .bind(&req.phone)
    .bind(&req.job_title)
    .fetch_one(db)
    .await?)
}

/// Validate a create request and make sure its company exists
async fn validated(db: &PgPool, req: CreateContactRequest) -> ApiResult<CreateContactRequest> {
    let req = req.normalized();
    if req.first_name.is_empty() {
        return Err(ApiError::bad_request("First name is required"));
    }
    if find_company(db, req.company_id).await?.is_none() {
        return Err(ApiError::bad_request("Selected company not found"));
    }
    Ok(req)
}

/// GET /contacts
///
/// Companies that have contacts, each with its contacts and their latest
/// enquiry date.
pub async fn list_contacts_grouped(
    State(state): State<Arc<AppState>>,
    _auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let companies: Vec<(Uuid, String, Option<String>)> = sqlx::query_as(
        r#"
        SELECT c.id, c.name, c.xero_contact_id FROM companies c
        WHERE EXISTS (SELECT 1 FROM contacts ct WHERE ct.company_id = c.id)
        ORDER BY c.name
        "#,
    )
    .fetch_all(&state.db)
    .await?;

    let contacts = sqlx::query_as::<_, ContactListItem>(
        r#"
        SELECT ct.*,
               (SELECT MAX(e.received_at) FROM enquiries e WHERE e.contact_id = ct.id) AS latest_enquiry_at
        FROM contacts ct
        ORDER BY ct.first_name, ct.last_name
        "#,
    )
    .fetch_all(&state.db)
    .await?;

    let mut by_company: HashMap<Uuid, Vec<ContactListItem>> = HashMap::new();
    for contact in contacts {
        by_company
            .entry(contact.contact.company_id)
            .or_default()
            .push(contact);
    }

    let groups: Vec<ContactGroup> = companies
        .into_iter()
        .map(|(id, name, xero_contact_id)| ContactGroup {
            contacts: by_company.remove(&id).unwrap_or_default(),
            company: ContactGroupCompany {
                id,
                name,
                xero_contact_id,
            },
        })
        .collect();

    Ok(DataResponse::new(groups))
}

/// POST /contacts
pub async fn create_contact(
    State(state): State<Arc<AppState>>,
    _auth: RequireAuth,
    Json(req): Json<CreateContactRequest>,
) -> ApiResult<impl IntoResponse> {
    let req = validated(&state.db, req).await?;
    let contact = insert_contact(&state.db, &req).await?;

    tracing::info!(
        contact_id = %contact.id,
        company_id = %contact.company_id,
        name = %contact.full_name(),
        "Contact created"
    );

    Ok((StatusCode::CREATED, DataResponse::new(contact)))
}

/// POST /contacts/find-or-create
///
/// Matches on company and first name, plus last name when one is given.
pub async fn find_or_create_contact(
    State(state): State<Arc<AppState>>,
    _auth: RequireAuth,
    Json(req): Json<CreateContactRequest>,
) -> ApiResult<impl IntoResponse> {
    let req = validated(&state.db, req).await?;

    let existing = sqlx::query_as::<_, Contact>(&format!(
        r#"
        SELECT {} FROM contacts
        WHERE company_id = $1 AND first_name = $2 AND ($3::text IS NULL OR last_name = $3)
        ORDER BY created_at
        LIMIT 1
        "#,
        CONTACT_COLUMNS
    ))
    .bind(req.company_id)
    .bind(&req.first_name)
    .bind(&req.last_name)
    .fetch_optional(&state.db)
    .await?;

    let (contact, created, status) = match existing {
        Some(contact) => (contact, false, StatusCode::OK),
        None => (insert_contact(&state.db, &req).await?, true, StatusCode::CREATED),
    };

    Ok((
        status,
        DataResponse::new(FindOrCreateContactResponse { contact, created }),
    ))
}

/// GET /contacts/:contact_id
pub async fn get_contact(
    State(state): State<Arc<AppState>>,
    Path(contact_id): Path<Uuid>,
    _auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let contact = fetch_contact(&state.db, contact_id).await?;
    let company = fetch_company(&state.db, contact.company_id).await?;

    let enquiries = sqlx::query_as::<_, EnquirySummary>(
        "SELECT id, project_title, status, received_at FROM enquiries \
         WHERE contact_id = $1 ORDER BY received_at DESC",
    )
    .bind(contact_id)
    .fetch_all(&state.db)
    .await?;

    let projects = sqlx::query_as::<_, ProjectSummary>(&format!(
        "SELECT {} FROM projects WHERE contact_id = $1 ORDER BY created_at DESC",
        PROJECT_SUMMARY_COLUMNS
    ))
    .bind(contact_id)
    .fetch_all(&state.db)
    .await?;

    Ok(DataResponse::new(ContactDetail {
        contact,
        company,
        enquiries,
        projects,
    }))
}

/// DELETE /contacts/:contact_id
pub async fn delete_contact(
    State(state): State<Arc<AppState>>,
    Path(contact_id): Path<Uuid>,
    _auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let result = sqlx::query("DELETE FROM contacts WHERE id = $1")
        .bind(contact_id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Contact not found"));
    }

    Ok(MessageResponse::new("Contact deleted"))
}

/// POST /contacts/import/mapping
pub async fn detect_mapping(
    _auth: RequireAuth,
    Json(req): Json<DetectMappingRequest>,
) -> impl IntoResponse {
    DataResponse::new(detect_column_mapping(&req.headers))
}

/// POST /contacts/import
///
/// Row problems are reported per row and never abort the import.
pub async fn import_contacts(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
    Json(req): Json<ImportContactsRequest>,
) -> ApiResult<impl IntoResponse> {
    let mapping = match &req.mapping {
        Some(mapping) => mapping.clone(),
        None if !req.headers.is_empty() => detect_column_mapping(&req.headers),
        None => {
            let headers: BTreeSet<&String> = req.records.iter().flat_map(|r| r.keys()).collect();
            let headers: Vec<&String> = headers.into_iter().collect();
            detect_column_mapping(&headers)
        }
    };
    let columns = req.column_order(&mapping);

    let mut result = ImportContactsResult::default();
    // Lower-cased company name -> id (None when no such company)
    let mut companies: HashMap<String, Option<Uuid>> = HashMap::new();

    for (index, record) in req.records.iter().enumerate() {
        let row = ImportRow::from_record(record, &mapping, &columns);

        let Some((first_name, company_name)) = row.required() else {
            result.skipped += 1;
            result.errors.push(row_error(
                index,
                "Missing required fields (firstName or companyName)",
            ));
            continue;
        };

        let key = company_name.to_lowercase();
        let company_id = match companies.get(&key) {
            Some(cached) => *cached,
            None => {
                let found: Option<Uuid> = sqlx::query_scalar(
                    "SELECT id FROM companies WHERE LOWER(TRIM(name)) = $1 ORDER BY created_at LIMIT 1",
                )
                .bind(&key)
                .fetch_optional(&state.db)
                .await?;
                companies.insert(key, found);
                found
            }
        };

        let Some(company_id) = company_id else {
            result.skipped += 1;
            result
                .errors
                .push(row_error(index, format!("Company \"{}\" not found", company_name)));
            continue;
        };

        let duplicate: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM contacts
                WHERE company_id = $1 AND first_name = $2
                  AND last_name IS NOT DISTINCT FROM $3
                  AND ($4::text IS NULL OR email = $4)
            )
            "#,
        )
        .bind(company_id)
        .bind(first_name)
        .bind(&row.last_name)
        .bind(&row.email)
        .fetch_one(&state.db)
        .await?;

        if duplicate {
            result.skipped += 1;
            result.errors.push(row_error(
                index,
                format!("Contact \"{}\" already exists", row.display_name()),
            ));
            continue;
        }

        let contact = CreateContactRequest {
            company_id,
            first_name: first_name.to_string(),
            last_name: row.last_name.clone(),
            email: row.email.clone(),
            phone: row.phone.clone(),
            job_title: row.job_title.clone(),
        };

        match insert_contact(&state.db, &contact).await {
            Ok(_) => result.imported += 1,
            Err(e) => {
                tracing::warn!(row = index + 1, error = %e, "Contact import row failed");
                result.skipped += 1;
                result.errors.push(row_error(index, e.public_message()));
            }
        }
    }

    result.success = result.imported > 0;

    tracing::info!(
        user_id = %auth.user_id,
        imported = result.imported,
        skipped = result.skipped,
        "Contacts imported"
    );

    Ok(DataResponse::new(result))
}

#[cfg(test)]
mod tests {
    use crate::test_support::test_app;
    use axum::http::{Method, StatusCode};
    use serde_json::json;
    use sqlx::PgPool;

    #[sqlx::test]
    async fn import_follows_sheet_column_order(pool: PgPool) {
        let app = test_app(pool.clone()).await;
        app.create("/companies", json!({ "name": "Acme Studios" })).await;

        let (status, body) = app
            .call(
                Method::POST,
                "/contacts/import",
                Some(json!({
                    "headers": ["Name", "Contact Name", "Company"],
                    "records": [
                        { "Name": "Ada", "Contact Name": "Grace", "Company": " acme studios " },
                        { "Name": "Lin", "Company": "Nobody Ltd" },
                        { "Name": "Ada", "Contact Name": "Grace", "Company": "Acme Studios" }
                    ]
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["imported"], 1);
        assert_eq!(body["data"]["skipped"], 2);
        assert_eq!(
            body["data"]["errors"],
            json!([
                "Row 2: Company \"Nobody Ltd\" not found",
                "Row 3: Contact \"Grace\" already exists"
            ])
        );

        let names: Vec<String> = sqlx::query_scalar("SELECT first_name FROM contacts")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(names, vec!["Grace".to_string()]);
    }
}

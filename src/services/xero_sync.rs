//! Stored Xero connection and the contact to company sync.

use chrono::Utc;
use sqlx::PgPool;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::db::contains_pattern;
use crate::domain::xero::{SyncResult, TokenSet, XeroConnection, XeroContact};
use crate::error::{ApiError, ApiResult};
use crate::services::xero::{XeroClient, XeroError};

const RECONNECT_MESSAGE: &str = "Authentication expired. Please reconnect to Xero.";

pub async fn load_connection(db: &PgPool) -> ApiResult<Option<XeroConnection>> {
    Ok(sqlx::query_as::<_, XeroConnection>(
        "SELECT access_token, refresh_token, tenant_id, expires_at, updated_at \
         FROM xero_connections WHERE id = 1",
    )
    .fetch_optional(db)
    .await?)
}

/// Save a token set. A refresh response without a new refresh token or
/// tenant keeps the stored ones.
pub async fn store_tokens(db: &PgPool, tokens: &TokenSet, tenant_id: Option<&str>) -> ApiResult<()> {
    sqlx::query(
        r#"
        INSERT INTO xero_connections (id, access_token, refresh_token, tenant_id, expires_at, updated_at)
        VALUES (1, $1, $2, $3, $4, NOW())
        ON CONFLICT (id) DO UPDATE SET
            access_token = EXCLUDED.access_token,
            refresh_token = COALESCE(EXCLUDED.refresh_token, xero_connections.refresh_token),
            tenant_id = COALESCE(EXCLUDED.tenant_id, xero_connections.tenant_id),
            expires_at = EXCLUDED.expires_at,
            updated_at = NOW()
        "#,
    )
    .bind(&tokens.access_token)
    .bind(&tokens.refresh_token)
    .bind(tenant_id)
    .bind(tokens.expires_at(Utc::now()))
    .execute(db)
    .await?;

    Ok(())
}

pub async fn store_tenant(db: &PgPool, tenant_id: &str) -> ApiResult<()> {
    sqlx::query("UPDATE xero_connections SET tenant_id = $1, updated_at = NOW() WHERE id = 1")
        .bind(tenant_id)
        .execute(db)
        .await?;
    Ok(())
}

/// Returns whether a connection was removed
pub async fn delete_connection(db: &PgPool) -> ApiResult<bool> {
    let result = sqlx::query("DELETE FROM xero_connections").execute(db).await?;
    Ok(result.rows_affected() > 0)
}

/// Access token for API calls, refreshed first when it is about to expire
async fn usable_connection(db: &PgPool, client: &XeroClient) -> ApiResult<XeroConnection> {
    let connection = load_connection(db)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Not connected to Xero".to_string()))?;

    if !connection.needs_refresh(Utc::now()) {
        return Ok(connection);
    }

    let refresh_token = connection
        .refresh_token
        .as_deref()
        .ok_or_else(|| ApiError::Unauthorized(RECONNECT_MESSAGE.to_string()))?;

    let tokens = client.refresh(refresh_token).await.map_err(|e| {
        warn!(error = %e, "Xero token refresh failed");
        ApiError::Unauthorized(RECONNECT_MESSAGE.to_string())
    })?;

    store_tokens(db, &tokens, None).await?;
    info!("Xero access token refreshed");

    load_connection(db)
        .await?
        .ok_or_else(|| ApiError::internal("Xero connection vanished after refresh"))
}

/// Pull customers from Xero and upsert them as companies.
#[instrument(skip_all)]
pub async fn sync_contacts_from_xero(db: &PgPool, client: &XeroClient) -> ApiResult<SyncResult> {
    let connection = usable_connection(db, client).await?;

    let tenant_id = match connection.tenant_id.clone() {
        Some(tenant) => tenant,
        None => {
            let tenant = client.fallback_tenant_id().map(str::to_string).ok_or_else(|| {
                ApiError::bad_request("No Xero organisation selected. Please reconnect to Xero.")
            })?;
            store_tenant(db, &tenant).await?;
            tenant
        }
    };

    let customers = client
        .fetch_customers(&connection.access_token, &tenant_id)
        .await
        .map_err(|e| match e {
            e if e.is_unauthorized() => ApiError::Unauthorized(RECONNECT_MESSAGE.to_string()),
            XeroError::Api { status, .. } => {
                ApiError::upstream(format!("Failed to fetch contacts from Xero ({})", status))
            }
            XeroError::Http(e) => ApiError::upstream(format!("Failed to fetch contacts from Xero: {}", e)),
        })?;

    let mut result = SyncResult {
        total: customers.len(),
        ..Default::default()
    };

    for contact in &customers {
        let Some(name) = contact.display_name() else {
            continue;
        };

        if update_linked_company(db, contact, &name).await? {
            result.updated += 1;
        } else if link_matching_company(db, contact, &name).await? {
            result.matched += 1;
        } else {
            create_company_from_contact(db, contact, &name).await?;
            result.created += 1;
        }
    }

    info!(
        created = result.created,
        updated = result.updated,
        matched = result.matched,
        total = result.total,
        "Xero sync completed"
    );

    Ok(result)
}

async fn update_linked_company(db: &PgPool, contact: &XeroContact, name: &str) -> ApiResult<bool> {
    let address = contact.address();

    let updated = sqlx::query(
        r#"
        UPDATE companies SET
            name = $2,
            company_email = COALESCE($3, company_email),
            company_phone = COALESCE($4, company_phone),
            street = COALESCE($5, street),
            city = COALESCE($6, city),
            state = COALESCE($7, state),
            postcode = COALESCE($8, postcode),
            abn = COALESCE($9, abn),
            xero_synced_at = NOW(),
            updated_at = NOW()
        WHERE xero_contact_id = $1
        "#,
    )
    .bind(&contact.contact_id)
    .bind(name)
    .bind(contact.email())
    .bind(contact.phone())
    .bind(address.address_line1)
    .bind(address.city)
    .bind(address.region)
    .bind(address.postal_code)
    .bind(contact.abn())
    .execute(db)
    .await?;

    Ok(updated.rows_affected() > 0)
}

/// Link an unlinked company whose name contains the Xero contact name
async fn link_matching_company(db: &PgPool, contact: &XeroContact, name: &str) -> ApiResult<bool> {
    let candidate: Option<Uuid> = sqlx::query_scalar(
        "SELECT id FROM companies WHERE xero_contact_id IS NULL AND name ILIKE $1 ORDER BY name LIMIT 1",
    )
    .bind(contains_pattern(name))
    .fetch_optional(db)
    .await?;

    let Some(company_id) = candidate else {
        return Ok(false);
    };

    sqlx::query(
        r#"
        UPDATE companies SET
            xero_contact_id = $2,
            company_email = COALESCE($3, company_email),
            company_phone = COALESCE($4, company_phone),
            xero_synced_at = NOW(),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(company_id)
    .bind(&contact.contact_id)
    .bind(contact.email())
    .bind(contact.phone())
    .execute(db)
    .await?;

    Ok(true)
}

async fn create_company_from_contact(db: &PgPool, contact: &XeroContact, name: &str) -> ApiResult<()> {
    let address = contact.address();

    sqlx::query(
        r#"
        INSERT INTO companies
            (name, company_email, company_phone, street, city, state, postcode, abn, xero_contact_id, xero_synced_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())
        "#,
    )
    .bind(name)
    .bind(contact.email())
    .bind(contact.phone())
    .bind(address.address_line1)
    .bind(address.city)
    .bind(address.region)
    .bind(address.postal_code)
    .bind(contact.abn())
    .bind(&contact.contact_id)
    .execute(db)
    .await?;

    Ok(())
}

/// Delete every company that came from Xero, with its projects, enquiries
/// and contacts. Returns the number of companies removed.
pub async fn clear_synced_companies(db: &PgPool) -> ApiResult<u64> {
    let mut tx = db.begin().await?;

    for table in ["projects", "enquiries", "contacts"] {
        sqlx::query(&format!(
            "DELETE FROM {} WHERE company_id IN (SELECT id FROM companies WHERE xero_contact_id IS NOT NULL)",
            table
        ))
        .execute(&mut *tx)
        .await?;
    }

    let deleted = sqlx::query("DELETE FROM companies WHERE xero_contact_id IS NOT NULL")
        .execute(&mut *tx)
        .await?
        .rows_affected();

    tx.commit().await?;

    info!(deleted = deleted, "Cleared Xero-synced companies");
    Ok(deleted)
}

//! Xero connection routes
//!
//! OAuth connect/callback, contact sync and cleanup. Tokens stay on the
//! server; the browser only ever sees the consent redirect.

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Redirect},
};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::api::{DataResponse, MessageResponse};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::xero::{
    settings_redirect, CallbackQuery, ClearSyncedResponse, ConnectResponse, XeroStatus,
};
use crate::error::{ApiError, ApiResult};
use crate::services::cache::keys;
use crate::services::xero_sync;
use crate::services::XeroClient;

const OAUTH_STATE_TTL: Duration = Duration::from_secs(600);

fn configured_client(state: &AppState) -> ApiResult<&XeroClient> {
    state
        .xero
        .as_ref()
        .ok_or_else(|| ApiError::bad_request("Xero is not configured"))
}

/// GET /xero/status
pub async fn status(
    State(state): State<Arc<AppState>>,
    _auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let connection = xero_sync::load_connection(&state.db).await?;

    Ok(DataResponse::new(XeroStatus::new(
        state.xero.is_some(),
        connection.as_ref(),
    )))
}

/// POST /xero/connect
///
/// Returns the consent URL. The `state` value is single use and expires
/// after ten minutes.
pub async fn connect(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let client = configured_client(&state)?;

    let oauth_state = Uuid::new_v4().simple().to_string();
    state
        .cache
        .set_with_ttl(&keys::xero_oauth_state(&oauth_state), &auth.user_id, OAUTH_STATE_TTL)
        .await?;

    Ok(DataResponse::new(ConnectResponse {
        url: client.authorize_url(&oauth_state),
    }))
}

/// GET /xero/callback
///
/// Public: Xero redirects the browser here. Every outcome ends in a
/// redirect back to the settings page.
pub async fn callback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CallbackQuery>,
) -> Redirect {
    let outcome = complete_callback(&state, query).await;
    if let Err(message) = &outcome {
        tracing::warn!(error = %message, "Xero callback failed");
    }
    Redirect::to(&settings_redirect(
        &state.settings.app_base_url,
        outcome.as_ref().map(|_| ()).map_err(String::as_str),
    ))
}

async fn complete_callback(state: &AppState, query: CallbackQuery) -> Result<(), String> {
    if let Some(error) = query.error {
        return Err(error);
    }

    let client = state
        .xero
        .as_ref()
        .ok_or_else(|| "Xero is not configured".to_string())?;

    let oauth_state = query
        .state
        .ok_or_else(|| "Missing OAuth state".to_string())?;
    let issued_to: Option<String> = state
        .cache
        .take(&keys::xero_oauth_state(&oauth_state))
        .await
        .map_err(|e| e.to_string())?;
    let Some(user_id) = issued_to else {
        return Err("Invalid or expired OAuth state".to_string());
    };

    let code = query
        .code
        .ok_or_else(|| "Missing authorization code".to_string())?;

    let tokens = client
        .exchange_code(&code)
        .await
        .map_err(|e| format!("Token exchange failed: {}", e))?;

    xero_sync::store_tokens(&state.db, &tokens, None)
        .await
        .map_err(|e| e.public_message())?;

    match client.first_tenant(&tokens.access_token).await {
        Ok(Some(tenant)) => {
            tracing::info!(
                tenant_id = %tenant.tenant_id,
                tenant_name = tenant.tenant_name.as_deref().unwrap_or("unnamed"),
                "Xero organisation selected"
            );
            if let Err(e) = xero_sync::store_tenant(&state.db, &tenant.tenant_id).await {
                tracing::warn!(error = %e, "Failed to store Xero tenant");
            }
        }
        Ok(None) => tracing::warn!("Xero connection has no organisations"),
        Err(e) => tracing::warn!(error = %e, "Failed to fetch Xero tenants"),
    }

    tracing::info!(user_id = %user_id, "Xero connected");
    Ok(())
}

/// POST /xero/sync
pub async fn sync(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let client = configured_client(&state)?;
    let result = xero_sync::sync_contacts_from_xero(&state.db, client).await?;

    tracing::info!(
        user_id = %auth.user_id,
        created = result.created,
        updated = result.updated,
        matched = result.matched,
        total = result.total,
        "Xero contacts synced"
    );

    Ok(DataResponse::new(result))
}

/// DELETE /xero/connection
pub async fn disconnect(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    if xero_sync::delete_connection(&state.db).await? {
        tracing::info!(user_id = %auth.user_id, "Xero disconnected");
    }
    Ok(MessageResponse::with_code(
        "Disconnected from Xero",
        "XERO_DISCONNECTED",
    ))
}

/// DELETE /xero/companies
///
/// Removes every Xero-linked company together with its contacts,
/// enquiries and projects.
pub async fn clear_companies(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let deleted = xero_sync::clear_synced_companies(&state.db).await?;

    tracing::warn!(user_id = %auth.user_id, deleted, "Xero-synced companies cleared");

    Ok(DataResponse::new(ClearSyncedResponse { deleted }))
}

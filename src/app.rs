use axum::{http::HeaderValue, Router};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::auth::TokenVerifier;
use crate::config::Settings;
use crate::middleware::request_id_layer;
use crate::routes;
use crate::services::{AttachmentStore, DropboxClient, LlmClient, RedisCache, XeroClient};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub settings: Settings,
    pub token_verifier: TokenVerifier,
    pub cache: RedisCache,
    pub llm_client: LlmClient,
    pub dropbox: DropboxClient,
    /// `None` when the Xero app registration is not configured
    pub xero: Option<XeroClient>,
    pub attachments: Arc<dyn AttachmentStore>,
    /// Shared HTTP client for one-off fetches (link previews)
    pub http_client: reqwest::Client,
}

/// Build the complete application with all middleware
pub fn create_app(state: Arc<AppState>) -> Router {
    let cors = build_cors_layer(&state.settings);

    // DEBUG spans keep per-request overhead low at INFO level
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
        .on_response(DefaultOnResponse::new().level(Level::DEBUG));

    let (set_request_id, propagate_request_id) = request_id_layer();

    // Routes at root level, no /api prefix
    Router::new()
        .merge(routes::api_router(state.settings.max_attachment_bytes))
        // Middleware stack (applied bottom-up)
        .layer(propagate_request_id)
        .layer(trace_layer)
        .layer(set_request_id)
        .layer(cors)
        .with_state(state)
}

fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<HeaderValue> = settings
        .cors_allow_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    // Longer preflight cache in dev to cut down on OPTIONS requests
    let max_age = if settings.env.is_dev() {
        std::time::Duration::from_secs(86400)
    } else {
        std::time::Duration::from_secs(3600)
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(AllowMethods::list([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::PATCH,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::list([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::ACCEPT,
            axum::http::HeaderName::from_static("x-request-id"),
        ]))
        .expose_headers([
            axum::http::header::CONTENT_DISPOSITION,
            axum::http::HeaderName::from_static("x-request-id"),
        ])
        .allow_credentials(true)
        .max_age(max_age)
}

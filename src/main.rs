mod api;
mod app;
mod auth;
mod config;
mod db;
mod domain;
mod error;
mod logging;
mod middleware;
mod routes;
mod services;
#[cfg(test)]
mod test_support;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

use services::{DropboxClient, LlmClient, LocalAttachmentStore, RedisCache, XeroClient};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let settings = config::Settings::from_env()?;

    logging::init_logging(&settings.env);

    tracing::info!(
        env = ?settings.env,
        server_addr = %settings.server_addr,
        "Starting Grizzle Master backend"
    );

    let pool = db::create_pool(&settings).await?;
    db::run_migrations(&pool).await?;

    let cache = RedisCache::new(&settings.redis_url, settings.redis_cache_ttl_seconds).await?;
    tracing::info!("Redis cache initialized");

    let llm_client = LlmClient::new(
        &settings.llm_api_url,
        &settings.llm_model,
        settings.llm_api_key.as_deref(),
        settings.llm_timeout_seconds,
        settings.llm_max_tokens,
    )?;

    // Model servers are often started after the backend; only warn
    tokio::spawn({
        let llm_client = llm_client.clone();
        async move {
            match llm_client.health_check().await {
                Ok(()) => tracing::info!("LLM service is reachable"),
                Err(e) => tracing::warn!(error = %e, "LLM health check failed - parsing will fail until it is up"),
            }
        }
    });

    let dropbox = DropboxClient::new(&settings.dropbox)?;

    let xero = match settings.xero.clone() {
        Some(xero_settings) => Some(XeroClient::new(xero_settings)?),
        None => {
            tracing::info!("Xero not configured; Xero endpoints disabled");
            None
        }
    };

    let attachments = LocalAttachmentStore::new(&settings.attachments_dir).await?;

    let token_verifier = auth::TokenVerifier::new(
        &settings.auth_jwt_secret,
        &settings.auth_jwt_audience,
        settings.auth_jwt_issuer.as_deref(),
    );

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("Failed to create HTTP client")?;

    let state = Arc::new(app::AppState {
        db: pool,
        settings: settings.clone(),
        token_verifier,
        cache,
        llm_client,
        dropbox,
        xero,
        attachments: Arc::new(attachments),
        http_client,
    });

    let app = app::create_app(state);

    let listener = tokio::net::TcpListener::bind(&settings.server_addr).await?;
    tracing::info!("Listening on {}", settings.server_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

//! Database connection pool management

use anyhow::{Context, Result};
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    PgPool,
};
use std::str::FromStr;
use std::time::Duration;

use crate::config::Settings;

/// Create a PostgreSQL connection pool
pub async fn create_pool(settings: &Settings) -> Result<PgPool> {
    let connect_options = PgConnectOptions::from_str(&settings.database_url)
        .context("Invalid DATABASE_URL")?
        .application_name("grizzle-master");

    let pool = PgPoolOptions::new()
        .max_connections(settings.database_max_connections)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(300))
        .max_lifetime(Duration::from_secs(1800))
        .connect_with(connect_options)
        .await
        .context("Failed to connect to PostgreSQL")?;

    tracing::info!(
        max_connections = settings.database_max_connections,
        "Database connection pool established"
    );

    Ok(pool)
}

/// Apply the embedded migrations in `migrations/`
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("Failed to run database migrations")?;

    tracing::info!("Database migrations applied");
    Ok(())
}

/// Lightweight health check for database connectivity
pub async fn health_check(pool: &PgPool) -> bool {
    sqlx::query("SELECT 1").fetch_one(pool).await.is_ok()
}

/// Escape `%`, `_` and `\` so user input matches literally inside `LIKE`/`ILIKE`.
pub fn like_escape(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// `%input%` with LIKE metacharacters escaped
pub fn contains_pattern(input: &str) -> String {
    format!("%{}%", like_escape(input))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_metacharacters_are_escaped() {
        assert_eq!(like_escape("100%_done\\"), "100\\%\\_done\\\\");
        assert_eq!(contains_pattern("Red Bull"), "%Red Bull%");
        assert_eq!(contains_pattern("50%"), "%50\\%%");
    }
}

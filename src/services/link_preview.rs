//! Fetches pages for link previews, with results cached in Redis.

use anyhow::{Context, Result};
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::domain::link_preview::{extract_metadata, LinkPreview};
use crate::services::cache::{keys, RedisCache};

const USER_AGENT: &str = "Mozilla/5.0 (compatible; LinkPreviewBot/1.0)";
const FETCH_TIMEOUT: Duration = Duration::from_secs(5);
/// Metadata lives in `<head>`; anything past this is never parsed
const MAX_PAGE_BYTES: usize = 512 * 1024;

/// Fetch (or read from cache) the preview for `url`.
///
/// Previews are cached for the cache's default TTL.
pub async fn fetch_preview(http: &Client, cache: &RedisCache, url: &Url) -> Result<LinkPreview> {
    let key = keys::link_preview(url.as_str());
    if let Some(hit) = cache.get::<LinkPreview>(&key).await {
        return Ok(hit);
    }

    let response = http
        .get(url.clone())
        .header(reqwest::header::USER_AGENT, USER_AGENT)
        .timeout(FETCH_TIMEOUT)
        .send()
        .await
        .context("Failed to fetch URL")?
        .error_for_status()
        .context("Failed to fetch URL")?;

    // Redirects change the base for relative image/icon links
    let final_url = response.url().clone();
    let html = read_capped(response, MAX_PAGE_BYTES).await?;

    let mut preview = extract_metadata(&html, &final_url);
    preview.url = url.to_string();
    debug!(url = %url, title = %preview.title, "Built link preview");

    if let Err(e) = cache.set(&key, &preview).await {
        warn!(url = %url, error = %e, "Failed to cache link preview");
    }

    Ok(preview)
}

/// Read at most `limit` bytes of the body, decoding lossily.
async fn read_capped(mut response: Response, limit: usize) -> Result<String> {
    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await.context("Failed to read page body")? {
        let room = limit - body.len();
        if chunk.len() >= room {
            body.extend_from_slice(&chunk[..room]);
            break;
        }
        body.extend_from_slice(&chunk);
    }
    Ok(String::from_utf8_lossy(&body).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(body: &str) -> Response {
        Response::from(axum::http::Response::new(body.to_string()))
    }

    #[tokio::test]
    async fn page_body_is_truncated_at_the_cap() {
        let html = read_capped(response("<title>Reel</title><p>tail</p>"), 18)
            .await
            .unwrap();
        assert_eq!(html, "<title>Reel</title");
    }

    #[tokio::test]
    async fn short_pages_are_read_whole() {
        let html = read_capped(response("<title>Reel</title>"), MAX_PAGE_BYTES)
            .await
            .unwrap();
        assert_eq!(html, "<title>Reel</title>");
    }
}

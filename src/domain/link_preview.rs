//! Open Graph link previews for reference links

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkPreview {
    pub title: String,
    pub description: String,
    pub image: Option<String>,
    pub favicon: String,
    pub site_name: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LinkPreviewQuery {
    #[serde(default)]
    pub url: Option<String>,
}

/// Validate the requested URL; only absolute http(s) URLs are fetched
pub fn parse_target(raw: Option<&str>) -> Result<Url, &'static str> {
    let raw = raw
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or("URL parameter is required")?;
    let url = Url::parse(raw).map_err(|_| "Invalid URL")?;

    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        _ => Err("Invalid URL"),
    }
}

fn meta_property(property: &str) -> Regex {
    Regex::new(&format!(
        r#"(?i)<meta[^>]*property=["']{}["'][^>]*content=["']([^"']*)["']"#,
        regex::escape(property)
    ))
    .expect("valid meta regex")
}

static OG_TITLE: Lazy<Regex> = Lazy::new(|| meta_property("og:title"));
static OG_DESCRIPTION: Lazy<Regex> = Lazy::new(|| meta_property("og:description"));
static OG_IMAGE: Lazy<Regex> = Lazy::new(|| meta_property("og:image"));
static OG_SITE_NAME: Lazy<Regex> = Lazy::new(|| meta_property("og:site_name"));
static TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<title[^>]*>([^<]*)</title>").expect("valid title regex"));
static META_DESCRIPTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<meta[^>]*name=["']description["'][^>]*content=["']([^"']*)["']"#)
        .expect("valid description regex")
});
static ICON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<link[^>]*rel=["'](?:icon|shortcut icon)["'][^>]*href=["']([^"']*)["']"#)
        .expect("valid icon regex")
});

fn capture(re: &Regex, html: &str) -> Option<String> {
    re.captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn absolute(base: &Url, href: &str) -> Option<String> {
    if href.starts_with("http") {
        return Some(href.to_string());
    }
    base.join(href).ok().map(String::from)
}

/// Build a preview from a fetched page
pub fn extract_metadata(html: &str, page: &Url) -> LinkPreview {
    let host = page.host_str().unwrap_or_default().to_string();

    let favicon = capture(&ICON, html)
        .and_then(|href| absolute(page, &href))
        .unwrap_or_else(|| format!("{}://{}/favicon.ico", page.scheme(), authority(page)));

    LinkPreview {
        title: capture(&OG_TITLE, html)
            .or_else(|| capture(&TITLE, html))
            .unwrap_or_else(|| host.clone()),
        description: capture(&OG_DESCRIPTION, html)
            .or_else(|| capture(&META_DESCRIPTION, html))
            .unwrap_or_default(),
        image: capture(&OG_IMAGE, html).and_then(|src| absolute(page, &src)),
        favicon,
        site_name: capture(&OG_SITE_NAME, html).unwrap_or(host),
        url: page.to_string(),
    }
}

/// `host[:port]`
fn authority(url: &Url) -> String {
    match url.port() {
        Some(port) => format!("{}:{}", url.host_str().unwrap_or_default(), port),
        None => url.host_str().unwrap_or_default().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_must_be_http_url() {
        assert_eq!(parse_target(None), Err("URL parameter is required"));
        assert_eq!(parse_target(Some("  ")), Err("URL parameter is required"));
        assert_eq!(parse_target(Some("not a url")), Err("Invalid URL"));
        assert_eq!(parse_target(Some("ftp://files.example.com")), Err("Invalid URL"));
        assert!(parse_target(Some("https://vimeo.com/123")).is_ok());
    }

    #[test]
    fn open_graph_tags_take_priority() {
        let html = r#"<html><head>
            <title>Fallback title</title>
            <meta property="og:title" content="Brand Film">
            <meta property='og:description' content='A short film'>
            <meta property="og:image" content="/img/poster.jpg">
            <meta property="og:site_name" content="Vimeo">
            <link rel="icon" href="/favicon.png">
        </head></html>"#;
        let page = Url::parse("https://vimeo.com/123").unwrap();

        let preview = extract_metadata(html, &page);
        assert_eq!(preview.title, "Brand Film");
        assert_eq!(preview.description, "A short film");
        assert_eq!(preview.image.as_deref(), Some("https://vimeo.com/img/poster.jpg"));
        assert_eq!(preview.site_name, "Vimeo");
        assert_eq!(preview.favicon, "https://vimeo.com/favicon.png");
        assert_eq!(preview.url, "https://vimeo.com/123");
    }

    #[test]
    fn falls_back_to_title_and_host() {
        let html = r#"<TITLE>Plain page</TITLE><meta name="description" content="Just text">"#;
        let page = Url::parse("http://example.com:8080/a/b").unwrap();

        let preview = extract_metadata(html, &page);
        assert_eq!(preview.title, "Plain page");
        assert_eq!(preview.description, "Just text");
        assert_eq!(preview.image, None);
        assert_eq!(preview.site_name, "example.com");
        assert_eq!(preview.favicon, "http://example.com:8080/favicon.ico");

        let empty = extract_metadata("", &page);
        assert_eq!(empty.title, "example.com");
        assert_eq!(empty.description, "");
    }
}

//! Dropbox client for project folders and file uploads.
//!
//! Credentials are either an app key + refresh token (access tokens are
//! fetched and cached until shortly before they expire) or a static access
//! token. With neither configured the client runs in mock mode: project
//! folder paths are still computed so projects get a path, but nothing is
//! sent to Dropbox.

use anyhow::{Context, Result};
use axum::body::Bytes;
use backoff::{future::retry, ExponentialBackoff, ExponentialBackoffBuilder};
use chrono::{DateTime, Datelike, Duration as ChronoDuration, Utc};
use futures::future::join_all;
use parking_lot::RwLock;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::config::DropboxSettings;

const TOKEN_URL: &str = "https://api.dropboxapi.com/oauth2/token";
const CREATE_FOLDER_URL: &str = "https://api.dropboxapi.com/2/files/create_folder_v2";
const UPLOAD_URL: &str = "https://content.dropboxapi.com/2/files/upload";

/// Subfolders created inside every project folder
pub const STANDARD_FOLDERS: [&str; 7] = ["_Previews", "AE", "Assets", "Brief", "C4D", "Footage", "Ref"];

/// Refresh cached access tokens this long before Dropbox expires them
const TOKEN_EXPIRY_SKEW_SECONDS: i64 = 60;

#[derive(Debug, Error)]
pub enum DropboxError {
    #[error("Dropbox credentials not configured")]
    NotConfigured,

    #[error("Dropbox authentication failed: {0}")]
    Auth(String),

    #[error("Dropbox API error {status}: {summary}")]
    Api { status: u16, summary: String },

    #[error("Dropbox request failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Clone)]
enum Credentials {
    Refresh {
        app_key: String,
        app_secret: Option<String>,
        refresh_token: String,
    },
    Static(String),
}

impl Credentials {
    fn from_settings(settings: &DropboxSettings) -> Option<Self> {
        match (&settings.refresh_token, &settings.app_key, &settings.access_token) {
            (Some(refresh_token), Some(app_key), _) => Some(Self::Refresh {
                app_key: app_key.clone(),
                app_secret: settings.app_secret.clone(),
                refresh_token: refresh_token.clone(),
            }),
            (_, _, Some(token)) => Some(Self::Static(token.clone())),
            (Some(_), None, None) => {
                warn!("DROPBOX_REFRESH_TOKEN is set without DROPBOX_APP_KEY; Dropbox disabled");
                None
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct FileMetadata {
    #[serde(default)]
    path_display: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateFolderResponse {
    metadata: FileMetadata,
}

/// A project folder in Dropbox
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectFolder {
    pub path: String,
    /// The folder was already there (409 conflict)
    pub existed: bool,
    /// Credentials are missing and nothing was created
    pub mock: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FolderStructureResult {
    pub created: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ReferenceUploadResult {
    pub uploaded: usize,
    pub errors: Vec<String>,
}

/// Dropbox API client.
#[derive(Clone)]
pub struct DropboxClient {
    http: Client,
    credentials: Option<Credentials>,
    token: Arc<RwLock<Option<CachedToken>>>,
    projects_root: String,
}

impl DropboxClient {
    pub fn new(settings: &DropboxSettings) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("Failed to create Dropbox HTTP client")?;

        let credentials = Credentials::from_settings(settings);
        match &credentials {
            Some(Credentials::Refresh { .. }) => info!("Dropbox client using refresh token"),
            Some(Credentials::Static(_)) => info!("Dropbox client using static access token"),
            None => warn!("No Dropbox credentials found; folder creation runs in mock mode"),
        }

        Ok(Self {
            http,
            credentials,
            token: Arc::new(RwLock::new(None)),
            projects_root: settings.projects_root.trim_end_matches('/').to_string(),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }

    async fn access_token(&self) -> Result<String, DropboxError> {
        let (app_key, app_secret, refresh_token) = match &self.credentials {
            None => return Err(DropboxError::NotConfigured),
            Some(Credentials::Static(token)) => return Ok(token.clone()),
            Some(Credentials::Refresh {
                app_key,
                app_secret,
                refresh_token,
            }) => (app_key, app_secret, refresh_token),
        };

        if let Some(cached) = self.token.read().as_ref() {
            if cached.expires_at - ChronoDuration::seconds(TOKEN_EXPIRY_SKEW_SECONDS) > Utc::now() {
                return Ok(cached.access_token.clone());
            }
        }

        debug!("Refreshing Dropbox access token");

        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
            ("client_id", app_key.as_str()),
        ];
        if let Some(secret) = app_secret {
            form.push(("client_secret", secret.as_str()));
        }

        let response = self.http.post(TOKEN_URL).form(&form).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DropboxError::Auth(format!("{}: {}", status, body)));
        }

        let token: TokenResponse = response.json().await?;
        let expires_at = Utc::now() + ChronoDuration::seconds(token.expires_in.unwrap_or(14_400));

        *self.token.write() = Some(CachedToken {
            access_token: token.access_token.clone(),
            expires_at,
        });

        Ok(token.access_token)
    }

    /// Send a request, retrying rate limits (429) and server errors with
    /// exponential backoff. Other responses are returned to the caller.
    async fn send_with_retry<F>(&self, build: F) -> Result<Response, DropboxError>
    where
        F: Fn(&str) -> RequestBuilder,
    {
        let token = self.access_token().await?;

        retry(retry_policy(), || async {
            let response = build(&token).send().await.map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    backoff::Error::transient(DropboxError::Http(e))
                } else {
                    backoff::Error::permanent(DropboxError::Http(e))
                }
            })?;

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                let retry_after = retry_after(&response);
                let summary = response.text().await.unwrap_or_default();
                warn!(status = %status, "Dropbox asked us to back off");
                let err = DropboxError::Api {
                    status: status.as_u16(),
                    summary,
                };
                return Err(match retry_after {
                    Some(wait) => backoff::Error::retry_after(err, wait),
                    None => backoff::Error::transient(err),
                });
            }

            Ok(response)
        })
        .await
    }

    /// Create a folder. A 409 conflict means it already exists.
    #[instrument(skip(self))]
    pub async fn create_folder(&self, path: &str) -> Result<ProjectFolder, DropboxError> {
        let body = json!({ "path": path, "autorename": false });

        let response = self
            .send_with_retry(|token| self.http.post(CREATE_FOLDER_URL).bearer_auth(token).json(&body))
            .await?;

        match response.status() {
            status if status.is_success() => {
                let created: CreateFolderResponse = response.json().await?;
                Ok(ProjectFolder {
                    path: created.metadata.path_display.unwrap_or_else(|| path.to_string()),
                    existed: false,
                    mock: false,
                })
            }
            StatusCode::CONFLICT => {
                debug!(path = path, "Dropbox folder already exists");
                Ok(ProjectFolder {
                    path: path.to_string(),
                    existed: true,
                    mock: false,
                })
            }
            status => Err(api_error(status, response).await),
        }
    }

    /// Upload a file in `add` mode; name clashes are auto-renamed.
    /// Returns the stored path.
    #[instrument(skip(self, contents), fields(size = contents.len()))]
    pub async fn upload(&self, path: &str, contents: Bytes) -> Result<String, DropboxError> {
        let arg = dropbox_api_arg(&json!({
            "path": path,
            "mode": "add",
            "autorename": true,
            "mute": false,
        }));

        let response = self
            .send_with_retry(|token| {
                self.http
                    .post(UPLOAD_URL)
                    .bearer_auth(token)
                    .header("Dropbox-API-Arg", arg.as_str())
                    .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                    .body(contents.clone())
            })
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(api_error(status, response).await);
        }

        let metadata: FileMetadata = response.json().await?;
        Ok(metadata.path_display.unwrap_or_else(|| path.to_string()))
    }

    /// Create `<root>/<client>/<YY_MM> - <title>`.
    ///
    /// In mock mode the computed path is returned without contacting Dropbox.
    pub async fn create_project_folder(
        &self,
        client_name: &str,
        project_title: &str,
    ) -> Result<ProjectFolder, DropboxError> {
        let path = project_folder_path(
            &self.projects_root,
            client_name,
            project_title,
            chrono::Local::now().date_naive(),
        );

        if !self.is_configured() {
            warn!(path = %path, "Dropbox not configured; returning mock project path");
            return Ok(ProjectFolder {
                path,
                existed: false,
                mock: true,
            });
        }

        self.create_folder(&path).await
    }

    /// Create the standard subfolders, one at a time.
    pub async fn create_standard_folders(&self, project_path: &str) -> FolderStructureResult {
        let mut result = FolderStructureResult::default();

        if !self.is_configured() {
            result.created = STANDARD_FOLDERS.len();
            return result;
        }

        for folder in STANDARD_FOLDERS {
            let path = format!("{}/{}", project_path, folder);
            match self.create_folder(&path).await {
                Ok(_) => result.created += 1,
                Err(e) => {
                    warn!(path = %path, error = %e, "Failed to create project subfolder");
                    result.errors.push(format!("{}: {}", folder, e));
                }
            }
        }

        info!(
            project_path = project_path,
            created = result.created,
            total = STANDARD_FOLDERS.len(),
            "Standard folder structure created"
        );
        result
    }

    /// Upload an Internet Shortcut into `Ref/` for each reference link.
    pub async fn upload_reference_links(
        &self,
        project_path: &str,
        links: &[String],
    ) -> ReferenceUploadResult {
        let mut result = ReferenceUploadResult::default();
        if links.is_empty() {
            return result;
        }
        if !self.is_configured() {
            result.uploaded = links.len();
            return result;
        }

        let uploads = links.iter().enumerate().map(|(index, link)| async move {
            let path = format!(
                "{}/Ref/{}.url",
                project_path,
                reference_shortcut_name(link, index)
            );
            let outcome = self.upload(&path, Bytes::from(internet_shortcut(link))).await;
            (link, outcome)
        });

        for (link, outcome) in join_all(uploads).await {
            match outcome {
                Ok(_) => result.uploaded += 1,
                Err(e) => {
                    warn!(url = %link, error = %e, "Failed to upload reference link");
                    result.errors.push(format!("{}: {}", link, e));
                }
            }
        }

        info!(
            uploaded = result.uploaded,
            total = links.len(),
            "Reference links uploaded"
        );
        result
    }
}

fn retry_policy() -> ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(250))
        .with_max_interval(Duration::from_secs(10))
        .with_max_elapsed_time(Some(Duration::from_secs(30)))
        .build()
}

fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

async fn api_error(status: StatusCode, response: Response) -> DropboxError {
    let body = response.text().await.unwrap_or_default();
    // Error bodies look like {"error_summary": "path/not_found/..", ...}
    let summary = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("error_summary").and_then(|s| s.as_str()).map(str::to_string))
        .unwrap_or(body);

    DropboxError::Api {
        status: status.as_u16(),
        summary,
    }
}

/// Strip characters Dropbox (and Windows sync clients) reject in names
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// `<root>/<client>/<YY_MM> - <title>`
pub fn project_folder_path(root: &str, client_name: &str, project_title: &str, date: impl Datelike) -> String {
    format!(
        "{}/{}/{:02}_{:02} - {}",
        root.trim_end_matches('/'),
        sanitize_name(client_name),
        date.year().rem_euclid(100),
        date.month(),
        sanitize_name(project_title)
    )
}

/// File stem for a reference link shortcut: the host without `www.`, dots
/// replaced by underscores. Unparsable links get `Reference_<n>`.
pub fn reference_shortcut_name(link: &str, index: usize) -> String {
    Url::parse(link)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .map(|host| host.replacen("www.", "", 1).replace('.', "_"))
        .unwrap_or_else(|| format!("Reference_{}", index + 1))
}

/// Windows Internet Shortcut (`.url`) file body
pub fn internet_shortcut(link: &str) -> String {
    format!("[InternetShortcut]\nURL={}\n", link)
}

/// JSON for the `Dropbox-API-Arg` header. HTTP headers must be ASCII, so
/// every non-ASCII character is written as a `\uXXXX` escape.
pub fn dropbox_api_arg(value: &serde_json::Value) -> String {
    let raw = value.to_string();
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii() {
            out.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{:04x}", unit));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn project_path_uses_year_month_prefix() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        assert_eq!(
            project_folder_path("/clients - grizzle/", "Red Bull", "Air Race: Final Cut?", date),
            "/clients - grizzle/Red Bull/25_03 - Air Race Final Cut"
        );
    }

    #[test]
    fn names_are_sanitized() {
        assert_eq!(sanitize_name(r#"A/B\C:D*E?F"G<H>I|J"#), "ABCDEFGHIJ");
        assert_eq!(sanitize_name("  Acme  "), "Acme");
    }

    #[test]
    fn shortcut_names_come_from_host() {
        assert_eq!(reference_shortcut_name("https://www.vimeo.com/123", 0), "vimeo_com");
        assert_eq!(reference_shortcut_name("http://player.vimeo.com/x", 0), "player_vimeo_com");
        assert_eq!(reference_shortcut_name("not a url", 2), "Reference_3");
        assert_eq!(
            internet_shortcut("https://vimeo.com/1"),
            "[InternetShortcut]\nURL=https://vimeo.com/1\n"
        );
    }

    #[test]
    fn api_arg_escapes_non_ascii() {
        let arg = dropbox_api_arg(&json!({ "path": "/Café/🎬.mov" }));
        assert!(arg.is_ascii());
        assert!(arg.contains("Caf\\u00e9"));
        assert!(arg.contains("\\ud83c\\udfac"));

        // Still valid JSON that decodes to the original path
        let decoded: serde_json::Value = serde_json::from_str(&arg).unwrap();
        assert_eq!(decoded["path"], "/Café/🎬.mov");
    }

    #[test]
    fn credentials_select_mode() {
        let mut settings = DropboxSettings {
            projects_root: "/clients - grizzle".into(),
            ..Default::default()
        };
        assert!(Credentials::from_settings(&settings).is_none());

        settings.access_token = Some("static".into());
        assert!(matches!(
            Credentials::from_settings(&settings),
            Some(Credentials::Static(_))
        ));

        settings.refresh_token = Some("refresh".into());
        settings.app_key = Some("key".into());
        assert!(matches!(
            Credentials::from_settings(&settings),
            Some(Credentials::Refresh { .. })
        ));
    }

    #[tokio::test]
    async fn mock_mode_returns_computed_path() {
        let client = DropboxClient::new(&DropboxSettings {
            projects_root: "/clients - grizzle".into(),
            ..Default::default()
        })
        .unwrap();

        let folder = client.create_project_folder("Acme", "Launch").await.unwrap();
        assert!(folder.mock);
        assert!(folder.path.starts_with("/clients - grizzle/Acme/"));
        assert!(folder.path.ends_with(" - Launch"));

        let structure = client.create_standard_folders(&folder.path).await;
        assert_eq!(structure.created, STANDARD_FOLDERS.len());

        assert!(matches!(
            client.upload("/x", Bytes::from_static(b"x")).await,
            Err(DropboxError::NotConfigured)
        ));
    }
}

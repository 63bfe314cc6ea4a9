//! Enquiry attachment types and production folder routing

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Enquiry attachment entity
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Attachment {
    pub id: Uuid,
    pub enquiry_id: Uuid,
    pub filename: String,
    pub file_size: i64,
    pub mime_type: Option<String>,
    pub dropbox_path: Option<String>,
    pub moved_to_production: bool,
    pub production_path: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

pub const ATTACHMENT_COLUMNS: &str = "id, enquiry_id, filename, file_size, mime_type, dropbox_path, \
     moved_to_production, production_path, uploaded_at";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DownloadQuery {
    #[serde(default)]
    pub download: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadUrlResponse {
    pub url: String,
    pub filename: String,
}

/// Outcome of copying an enquiry's attachments into the project folder
#[derive(Debug, Clone, Default, Serialize)]
pub struct MoveAttachmentsResult {
    pub moved: usize,
    pub errors: Vec<String>,
}

/// Project subfolder an attachment belongs in, by file extension
pub fn production_folder(filename: &str) -> &'static str {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "pdf" | "doc" | "docx" | "txt" => "Brief",
        "jpg" | "jpeg" | "png" | "gif" | "webp" | "svg" => "Ref",
        "mp4" | "mov" | "avi" | "mkv" | "wmv" => "Footage",
        "aep" | "aet" => "AE",
        "c4d" => "C4D",
        _ => "Assets",
    }
}

/// Destination path of an attachment inside a project folder
pub fn production_path(project_path: &str, filename: &str) -> String {
    format!(
        "{}/{}/{}",
        project_path.trim_end_matches('/'),
        production_folder(filename),
        filename
    )
}

/// `Content-Disposition` value for serving an attachment
pub fn content_disposition(filename: &str, download: bool) -> String {
    let kind = if download { "attachment" } else { "inline" };
    let safe: String = filename
        .chars()
        .map(|c| if c == '"' || c.is_control() { '_' } else { c })
        .collect();
    format!("{}; filename=\"{}\"", kind, safe)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn files_route_by_extension() {
        assert_eq!(production_folder("Brief v2.PDF"), "Brief");
        assert_eq!(production_folder("notes.txt"), "Brief");
        assert_eq!(production_folder("moodboard.webp"), "Ref");
        assert_eq!(production_folder("interview.MOV"), "Footage");
        assert_eq!(production_folder("titles.aep"), "AE");
        assert_eq!(production_folder("scene.c4d"), "C4D");
        assert_eq!(production_folder("fonts.zip"), "Assets");
        assert_eq!(production_folder("README"), "Assets");
    }

    #[test]
    fn production_path_joins_folder() {
        assert_eq!(
            production_path("/clients - grizzle/Acme/25_03 - Launch/", "logo.png"),
            "/clients - grizzle/Acme/25_03 - Launch/Ref/logo.png"
        );
    }

    #[test]
    fn disposition_is_inline_unless_downloading() {
        assert_eq!(content_disposition("a.pdf", false), "inline; filename=\"a.pdf\"");
        assert_eq!(
            content_disposition("say \"hi\".pdf", true),
            "attachment; filename=\"say _hi_.pdf\""
        );
    }
}

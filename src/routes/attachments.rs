//! Enquiry attachment routes
//!
//! Upload, download and delete files attached to enquiries. Bytes live in
//! the configured [`AttachmentStore`](crate::services::AttachmentStore).

use axum::{
    extract::{multipart::MultipartError, Multipart, Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::IntoResponse,
};
use axum::body::Bytes;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{DataResponse, MessageResponse};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::attachments::{
    content_disposition, Attachment, DownloadQuery, DownloadUrlResponse, ATTACHMENT_COLUMNS,
};
use crate::error::{ApiError, ApiResult};
use crate::routes::enquiries::fetch_enquiry;

const FILE_FIELD: &str = "file";

const KIB: usize = 1024;
const MIB: usize = 1024 * KIB;

/// "50MB", "1.5MB", "512KB", or plain bytes below a kilobyte
fn size_limit_message(max_bytes: usize) -> String {
    let size = if max_bytes >= MIB {
        one_decimal(max_bytes as f64 / MIB as f64, "MB")
    } else if max_bytes >= KIB {
        one_decimal(max_bytes as f64 / KIB as f64, "KB")
    } else {
        format!("{} bytes", max_bytes)
    };
    format!("File size exceeds {} limit", size)
}

fn one_decimal(value: f64, unit: &str) -> String {
    let text = format!("{:.1}", value);
    format!("{}{}", text.strip_suffix(".0").unwrap_or(&text), unit)
}

fn multipart_error(e: MultipartError, max_bytes: usize) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::bad_request(size_limit_message(max_bytes))
    } else {
        ApiError::bad_request(e.body_text())
    }
}

async fn fetch_attachment(state: &AppState, attachment_id: Uuid) -> ApiResult<Attachment> {
    sqlx::query_as::<_, Attachment>(&format!(
        "SELECT {} FROM enquiry_attachments WHERE id = $1",
        ATTACHMENT_COLUMNS
    ))
    .bind(attachment_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Attachment not found"))
}

/// POST /enquiries/:enquiry_id/attachments
///
/// Multipart upload with the file in the `file` field.
pub async fn upload_attachment(
    State(state): State<Arc<AppState>>,
    Path(enquiry_id): Path<Uuid>,
    auth: RequireAuth,
    mut multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let max_bytes = state.settings.max_attachment_bytes;

    let mut upload: Option<(String, Option<String>, Bytes)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_bytes))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = field
            .file_name()
            .map(str::to_string)
            .filter(|f| !f.trim().is_empty())
            .unwrap_or_else(|| "attachment".to_string());
        let mime_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.map_err(|e| multipart_error(e, max_bytes))?;

        upload = Some((filename, mime_type, data));
        break;
    }

    let (filename, mime_type, data) =
        upload.ok_or_else(|| ApiError::bad_request("No file provided"))?;

    if data.len() > max_bytes {
        return Err(ApiError::bad_request(size_limit_message(max_bytes)));
    }

    fetch_enquiry(&state.db, enquiry_id).await?;

    // Row first so the stored file can be named by its id
    let attachment = sqlx::query_as::<_, Attachment>(&format!(
        r#"
        INSERT INTO enquiry_attachments (enquiry_id, filename, file_size, mime_type)
        VALUES ($1, $2, $3, $4)
        RETURNING {}
        "#,
        ATTACHMENT_COLUMNS
    ))
    .bind(enquiry_id)
    .bind(&filename)
    .bind(data.len() as i64)
    .bind(&mime_type)
    .fetch_one(&state.db)
    .await?;

    if let Err(e) = state.attachments.save(attachment.id, data).await {
        sqlx::query("DELETE FROM enquiry_attachments WHERE id = $1")
            .bind(attachment.id)
            .execute(&state.db)
            .await?;
        return Err(ApiError::Internal(e));
    }

    tracing::info!(
        user_id = %auth.user_id,
        enquiry_id = %enquiry_id,
        attachment_id = %attachment.id,
        filename = %attachment.filename,
        size = attachment.file_size,
        "Attachment uploaded"
    );

    Ok((StatusCode::CREATED, DataResponse::new(attachment)))
}

/// GET /attachments/:attachment_id?download=
///
/// Serves the file inline, or as a download with `download=true`.
pub async fn download_attachment(
    State(state): State<Arc<AppState>>,
    Path(attachment_id): Path<Uuid>,
    Query(query): Query<DownloadQuery>,
    _auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let attachment = fetch_attachment(&state, attachment_id).await?;

    let data = state
        .attachments
        .read(attachment_id)
        .await?
        .ok_or_else(|| ApiError::not_found("File not found on server"))?;

    let content_type = attachment
        .mime_type
        .as_deref()
        .and_then(|m| HeaderValue::from_str(m).ok())
        .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"));

    // Filenames may be UTF-8; header values accept the raw bytes
    let disposition =
        HeaderValue::from_bytes(content_disposition(&attachment.filename, query.download).as_bytes())
            .map_err(|e| ApiError::internal(format!("Invalid Content-Disposition: {}", e)))?;

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_LENGTH, HeaderValue::from(data.len())),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        data,
    ))
}

/// GET /attachments/:attachment_id/url
pub async fn get_download_url(
    State(state): State<Arc<AppState>>,
    Path(attachment_id): Path<Uuid>,
    _auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let attachment = fetch_attachment(&state, attachment_id).await?;

    Ok(DataResponse::new(DownloadUrlResponse {
        url: format!("/attachments/{}?download=true", attachment.id),
        filename: attachment.filename,
    }))
}

/// DELETE /attachments/:attachment_id
///
/// Removing the stored file is best effort.
pub async fn delete_attachment(
    State(state): State<Arc<AppState>>,
    Path(attachment_id): Path<Uuid>,
    auth: RequireAuth,
) -> ApiResult<impl IntoResponse> {
    let attachment = fetch_attachment(&state, attachment_id).await?;

    sqlx::query("DELETE FROM enquiry_attachments WHERE id = $1")
        .bind(attachment_id)
        .execute(&state.db)
        .await?;

    if let Err(e) = state.attachments.delete(attachment_id).await {
        tracing::warn!(attachment_id = %attachment_id, error = %e, "Failed to delete attachment file");
    }

    tracing::info!(
        user_id = %auth.user_id,
        attachment_id = %attachment_id,
        filename = %attachment.filename,
        "Attachment deleted"
    );

    Ok(MessageResponse::new("Attachment deleted"))
}

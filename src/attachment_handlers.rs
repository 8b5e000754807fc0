// src/attachment_handlers.rs
//! Request attachments: multipart upload, listing, download and deletion.
//! Files land under uploads/requests/{request_id}/ with a unique stored
//! name; metadata lives in the attachments table.

use actix_files::NamedFile;
use actix_multipart::Multipart;
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use futures_util::StreamExt;
use std::io::Write;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::handlers::ApiResponse;
use crate::models::Attachment;
use crate::request_handlers::check_request_exists;
use crate::AppState;

const ATTACHMENT_FILES_DIR: &str = "uploads/requests";
const MAX_FILE_SIZE: usize = 10 * 1024 * 1024;

const ALLOWED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "application/pdf",
    "text/plain",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
];

fn validate_mime_type(mime: &str) -> ApiResult<()> {
    if ALLOWED_MIME_TYPES.contains(&mime) {
        Ok(())
    } else {
        Err(ApiError::bad_request(&format!("File type '{}' is not allowed", mime)))
    }
}

fn validate_file_size(size: usize) -> ApiResult<()> {
    if size > MAX_FILE_SIZE {
        Err(ApiError::bad_request("File exceeds the 10 MB limit"))
    } else {
        Ok(())
    }
}

/// Collapse anything path-hostile in the original name
fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

fn generate_unique_filename(original: &str) -> String {
    let sanitized = sanitize_filename(original);
    format!("{}_{}", &Uuid::new_v4().to_string()[..8], sanitized)
}

// ==================== LIST ====================

pub async fn get_attachments(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let request_id = path.into_inner();

    check_request_exists(&app_state.db_pool, &request_id).await?;

    let attachments: Vec<Attachment> = sqlx::query_as(
        "SELECT * FROM attachments WHERE request_id = ? ORDER BY created_at ASC"
    )
        .bind(&request_id)
        .fetch_all(&app_state.db_pool)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(attachments)))
}

// ==================== UPLOAD ====================

pub async fn upload_attachment(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    mut payload: Multipart,
    user_id: Option<String>,
) -> ApiResult<HttpResponse> {
    let request_id = path.into_inner();

    check_request_exists(&app_state.db_pool, &request_id).await?;

    let mut file_bytes: Option<Vec<u8>> = None;
    let mut original_filename: Option<String> = None;
    let mut content_type: Option<String> = None;

    while let Some(item) = payload.next().await {
        let mut field = item.map_err(|e| ApiError::bad_request(&format!("Multipart error: {}", e)))?;

        let content_disposition = field.content_disposition();
        let field_name = content_disposition.get_name().unwrap_or("");

        if field_name == "file" {
            let filename = content_disposition
                .get_filename()
                .ok_or_else(|| ApiError::bad_request("Filename not provided"))?
                .to_string();

            let mime = field.content_type()
                .map(|m| m.to_string())
                .unwrap_or_else(|| "application/octet-stream".to_string());

            validate_mime_type(&mime)?;

            let mut bytes = Vec::new();
            while let Some(chunk) = field.next().await {
                let chunk = chunk.map_err(|e| ApiError::bad_request(&format!("Read error: {}", e)))?;
                bytes.extend_from_slice(&chunk);
                validate_file_size(bytes.len())?;
            }

            file_bytes = Some(bytes);
            original_filename = Some(filename);
            content_type = Some(mime);
        }
    }

    let file_bytes = file_bytes.ok_or_else(|| ApiError::bad_request("No file provided"))?;
    let original_filename = original_filename.ok_or_else(|| ApiError::bad_request("No filename"))?;
    let content_type = content_type.unwrap_or_else(|| "application/octet-stream".to_string());

    let dir = format!("{}/{}", ATTACHMENT_FILES_DIR, request_id);
    std::fs::create_dir_all(&dir)
        .map_err(|e| ApiError::InternalServerError(format!("Failed to create directory: {}", e)))?;

    let stored_filename = generate_unique_filename(&original_filename);
    let file_path = format!("{}/{}", dir, stored_filename);

    let mut f = std::fs::File::create(&file_path)
        .map_err(|e| ApiError::InternalServerError(format!("Failed to create file: {}", e)))?;
    f.write_all(&file_bytes)
        .map_err(|e| ApiError::InternalServerError(format!("Failed to write file: {}", e)))?;

    let id = Uuid::new_v4().to_string();
    let now = Utc::now();

    sqlx::query(
        r#"INSERT INTO attachments
           (id, request_id, original_filename, stored_filename, file_path, file_size, mime_type, uploaded_by, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#
    )
        .bind(&id)
        .bind(&request_id)
        .bind(&original_filename)
        .bind(&stored_filename)
        .bind(&file_path)
        .bind(file_bytes.len() as i64)
        .bind(&content_type)
        .bind(&user_id)
        .bind(&now)
        .execute(&app_state.db_pool)
        .await?;

    let created: Attachment = sqlx::query_as("SELECT * FROM attachments WHERE id = ?")
        .bind(&id)
        .fetch_one(&app_state.db_pool)
        .await?;

    app_state.board.invalidate();

    log::info!("Uploaded attachment {} for request {}", original_filename, request_id);
    Ok(HttpResponse::Created().json(ApiResponse::success(created)))
}

// ==================== DOWNLOAD ====================

pub async fn download_attachment(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<(String, String)>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let (request_id, attachment_id) = path.into_inner();

    let attachment: Attachment = sqlx::query_as(
        "SELECT * FROM attachments WHERE id = ? AND request_id = ?"
    )
        .bind(&attachment_id)
        .bind(&request_id)
        .fetch_optional(&app_state.db_pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Attachment"))?;

    let file = NamedFile::open(&attachment.file_path)
        .map_err(|_| ApiError::not_found("Attachment file"))?;

    Ok(file.into_response(&http_request))
}

// ==================== DELETE ====================

pub async fn delete_attachment(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<(String, String)>,
) -> ApiResult<HttpResponse> {
    let (request_id, attachment_id) = path.into_inner();

    let attachment: Attachment = sqlx::query_as(
        "SELECT * FROM attachments WHERE id = ? AND request_id = ?"
    )
        .bind(&attachment_id)
        .bind(&request_id)
        .fetch_optional(&app_state.db_pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Attachment"))?;

    sqlx::query("DELETE FROM attachments WHERE id = ?")
        .bind(&attachment_id)
        .execute(&app_state.db_pool)
        .await?;

    if let Err(e) = std::fs::remove_file(&attachment.file_path) {
        log::warn!("Failed to remove attachment file {}: {}", attachment.file_path, e);
    }

    app_state.board.invalidate();

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        (),
        "Attachment deleted successfully".to_string(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("stage plan.pdf"), "stage_plan.pdf");
        assert_eq!(sanitize_filename("../../etc/passwd"), ".._.._etc_passwd");
        assert_eq!(sanitize_filename("score-v2.txt"), "score-v2.txt");
    }

    #[test]
    fn test_unique_filename_keeps_extension() {
        let name = generate_unique_filename("score.pdf");
        assert!(name.ends_with("_score.pdf"));
        assert_ne!(generate_unique_filename("score.pdf"), name);
    }

    #[test]
    fn test_mime_and_size_validation() {
        assert!(validate_mime_type("application/pdf").is_ok());
        assert!(validate_mime_type("application/x-msdownload").is_err());
        assert!(validate_file_size(1024).is_ok());
        assert!(validate_file_size(MAX_FILE_SIZE + 1).is_err());
    }
}

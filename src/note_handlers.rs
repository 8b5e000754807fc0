// src/note_handlers.rs
//! Free-text notes appended to a request.

use actix_web::{web, HttpResponse};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::error::{ApiError, ApiResult};
use crate::handlers::ApiResponse;
use crate::models::{CreateNoteRequest, Note};
use crate::request_handlers::check_request_exists;
use crate::AppState;

pub async fn get_notes(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let request_id = path.into_inner();

    check_request_exists(&app_state.db_pool, &request_id).await?;

    let notes: Vec<Note> = sqlx::query_as(
        "SELECT * FROM notes WHERE request_id = ? ORDER BY created_at ASC"
    )
        .bind(&request_id)
        .fetch_all(&app_state.db_pool)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(notes)))
}

pub async fn create_note(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    note: web::Json<CreateNoteRequest>,
    author: String,
) -> ApiResult<HttpResponse> {
    note.validate()?;
    let request_id = path.into_inner();

    check_request_exists(&app_state.db_pool, &request_id).await?;

    let id = Uuid::new_v4().to_string();
    let now = Utc::now();

    sqlx::query(
        "INSERT INTO notes (id, request_id, author, body, created_at) VALUES (?, ?, ?, ?, ?)"
    )
        .bind(&id)
        .bind(&request_id)
        .bind(&author)
        .bind(note.body.trim())
        .bind(&now)
        .execute(&app_state.db_pool)
        .await?;

    let created: Note = sqlx::query_as("SELECT * FROM notes WHERE id = ?")
        .bind(&id)
        .fetch_one(&app_state.db_pool)
        .await?;

    app_state.board.invalidate();

    Ok(HttpResponse::Created().json(ApiResponse::success(created)))
}

pub async fn delete_note(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<(String, String)>,
) -> ApiResult<HttpResponse> {
    let (request_id, note_id) = path.into_inner();

    let result = sqlx::query("DELETE FROM notes WHERE id = ? AND request_id = ?")
        .bind(&note_id)
        .bind(&request_id)
        .execute(&app_state.db_pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Note"));
    }

    app_state.board.invalidate();

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        (),
        "Note deleted successfully".to_string(),
    )))
}

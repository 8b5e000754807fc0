// src/song_handlers.rs
//! Song catalog. Availability is two independent flags: instrumental
//! backing and lyric sheets.

use actix_web::{web, HttpResponse};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::equipment_handlers::CatalogListQuery;
use crate::error::{ApiError, ApiResult};
use crate::handlers::ApiResponse;
use crate::models::{
    CreateSongRequest, SetArchivedRequest, SetSongAvailabilityRequest, Song, UpdateSongRequest,
};
use crate::AppState;

pub async fn get_songs(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<CatalogListQuery>,
) -> ApiResult<HttpResponse> {
    let rows: Vec<Song> = if query.include_archived.unwrap_or(false) {
        sqlx::query_as("SELECT * FROM songs ORDER BY title ASC")
            .fetch_all(&app_state.db_pool)
            .await?
    } else {
        sqlx::query_as("SELECT * FROM songs WHERE archived = 0 ORDER BY title ASC")
            .fetch_all(&app_state.db_pool)
            .await?
    };

    Ok(HttpResponse::Ok().json(ApiResponse::success(rows)))
}

pub async fn get_song(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let song_id = path.into_inner();

    let song: Song = sqlx::query_as("SELECT * FROM songs WHERE id = ?")
        .bind(&song_id)
        .fetch_optional(&app_state.db_pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Song"))?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(song)))
}

pub async fn create_song(
    app_state: web::Data<Arc<AppState>>,
    song: web::Json<CreateSongRequest>,
    user_id: String,
) -> ApiResult<HttpResponse> {
    song.validate()?;

    let existing: Option<(String,)> = sqlx::query_as(
        "SELECT id FROM songs WHERE LOWER(title) = LOWER(?) AND COALESCE(LOWER(author), '') = COALESCE(LOWER(?), '')"
    )
        .bind(&song.title)
        .bind(&song.author)
        .fetch_optional(&app_state.db_pool)
        .await?;

    if existing.is_some() {
        return Err(ApiError::catalog_name_taken("Song", &song.title));
    }

    let id = Uuid::new_v4().to_string();
    let now = Utc::now();

    sqlx::query(
        r#"INSERT INTO songs
           (id, title, author, instrumental, lyrics, archived, created_by, updated_by, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, 0, ?, ?, ?, ?)"#
    )
        .bind(&id)
        .bind(&song.title)
        .bind(&song.author)
        .bind(song.instrumental as i32)
        .bind(song.lyrics as i32)
        .bind(&user_id)
        .bind(&user_id)
        .bind(&now)
        .bind(&now)
        .execute(&app_state.db_pool)
        .await?;

    let created: Song = sqlx::query_as("SELECT * FROM songs WHERE id = ?")
        .bind(&id)
        .fetch_one(&app_state.db_pool)
        .await?;

    log::info!("Created song: {} ({})", created.title, id);
    Ok(HttpResponse::Created().json(ApiResponse::success(created)))
}

pub async fn update_song(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    update: web::Json<UpdateSongRequest>,
    user_id: String,
) -> ApiResult<HttpResponse> {
    update.validate()?;
    let song_id = path.into_inner();

    let existing: Song = sqlx::query_as("SELECT * FROM songs WHERE id = ?")
        .bind(&song_id)
        .fetch_optional(&app_state.db_pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Song"))?;

    let now = Utc::now();
    let title = update.title.as_ref().unwrap_or(&existing.title);
    let author = update.author.clone().or(existing.author);

    sqlx::query(
        "UPDATE songs SET title = ?, author = ?, updated_by = ?, updated_at = ? WHERE id = ?"
    )
        .bind(title)
        .bind(&author)
        .bind(&user_id)
        .bind(&now)
        .bind(&song_id)
        .execute(&app_state.db_pool)
        .await?;

    let updated: Song = sqlx::query_as("SELECT * FROM songs WHERE id = ?")
        .bind(&song_id)
        .fetch_one(&app_state.db_pool)
        .await?;

    app_state.board.invalidate();

    Ok(HttpResponse::Ok().json(ApiResponse::success(updated)))
}

/// Toggle either availability flag independently; an omitted flag is left
/// untouched.
pub async fn set_song_availability(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    body: web::Json<SetSongAvailabilityRequest>,
    user_id: String,
) -> ApiResult<HttpResponse> {
    let song_id = path.into_inner();

    let existing: Song = sqlx::query_as("SELECT * FROM songs WHERE id = ?")
        .bind(&song_id)
        .fetch_optional(&app_state.db_pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Song"))?;

    let instrumental = body.instrumental.unwrap_or(existing.instrumental);
    let lyrics = body.lyrics.unwrap_or(existing.lyrics);

    sqlx::query(
        "UPDATE songs SET instrumental = ?, lyrics = ?, updated_by = ?, updated_at = ? WHERE id = ?"
    )
        .bind(instrumental as i32)
        .bind(lyrics as i32)
        .bind(&user_id)
        .bind(Utc::now())
        .bind(&song_id)
        .execute(&app_state.db_pool)
        .await?;

    let updated: Song = sqlx::query_as("SELECT * FROM songs WHERE id = ?")
        .bind(&song_id)
        .fetch_one(&app_state.db_pool)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(updated)))
}

pub async fn set_song_archived(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    body: web::Json<SetArchivedRequest>,
    user_id: String,
) -> ApiResult<HttpResponse> {
    let song_id = path.into_inner();

    let result = sqlx::query(
        "UPDATE songs SET archived = ?, updated_by = ?, updated_at = ? WHERE id = ?"
    )
        .bind(body.archived as i32)
        .bind(&user_id)
        .bind(Utc::now())
        .bind(&song_id)
        .execute(&app_state.db_pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Song"));
    }

    let updated: Song = sqlx::query_as("SELECT * FROM songs WHERE id = ?")
        .bind(&song_id)
        .fetch_one(&app_state.db_pool)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(updated)))
}

pub async fn delete_song(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let song_id = path.into_inner();

    let references: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM request_songs WHERE song_id = ?"
    )
        .bind(&song_id)
        .fetch_one(&app_state.db_pool)
        .await?;

    if references.0 > 0 {
        return Err(ApiError::bad_request(
            &format!("Cannot delete song: {} requests reference it; archive it instead", references.0)
        ));
    }

    let result = sqlx::query("DELETE FROM songs WHERE id = ?")
        .bind(&song_id)
        .execute(&app_state.db_pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Song"));
    }

    app_state.board.invalidate();

    log::info!("Deleted song: {}", song_id);
    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        (),
        "Song deleted successfully".to_string(),
    )))
}

// src/venue_handlers.rs
//! Venue catalog with a single availability flag.

use actix_web::{web, HttpResponse};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::equipment_handlers::CatalogListQuery;
use crate::error::{ApiError, ApiResult};
use crate::handlers::ApiResponse;
use crate::models::{
    CreateVenueRequest, SetArchivedRequest, SetVenueAvailabilityRequest, UpdateVenueRequest, Venue,
};
use crate::AppState;

pub async fn get_venues(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<CatalogListQuery>,
) -> ApiResult<HttpResponse> {
    let rows: Vec<Venue> = if query.include_archived.unwrap_or(false) {
        sqlx::query_as("SELECT * FROM venues ORDER BY name ASC")
            .fetch_all(&app_state.db_pool)
            .await?
    } else {
        sqlx::query_as("SELECT * FROM venues WHERE archived = 0 ORDER BY name ASC")
            .fetch_all(&app_state.db_pool)
            .await?
    };

    Ok(HttpResponse::Ok().json(ApiResponse::success(rows)))
}

pub async fn get_venue(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let venue_id = path.into_inner();

    let venue: Venue = sqlx::query_as("SELECT * FROM venues WHERE id = ?")
        .bind(&venue_id)
        .fetch_optional(&app_state.db_pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Venue"))?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(venue)))
}

pub async fn create_venue(
    app_state: web::Data<Arc<AppState>>,
    venue: web::Json<CreateVenueRequest>,
    user_id: String,
) -> ApiResult<HttpResponse> {
    venue.validate()?;

    let existing: Option<(String,)> = sqlx::query_as(
        "SELECT id FROM venues WHERE LOWER(name) = LOWER(?)"
    )
        .bind(&venue.name)
        .fetch_optional(&app_state.db_pool)
        .await?;

    if existing.is_some() {
        return Err(ApiError::catalog_name_taken("Venue", &venue.name));
    }

    let id = Uuid::new_v4().to_string();
    let now = Utc::now();

    sqlx::query(
        r#"INSERT INTO venues
           (id, name, location, capacity, available, archived, created_by, updated_by, created_at, updated_at)
           VALUES (?, ?, ?, ?, 1, 0, ?, ?, ?, ?)"#
    )
        .bind(&id)
        .bind(&venue.name)
        .bind(&venue.location)
        .bind(&venue.capacity)
        .bind(&user_id)
        .bind(&user_id)
        .bind(&now)
        .bind(&now)
        .execute(&app_state.db_pool)
        .await?;

    let created: Venue = sqlx::query_as("SELECT * FROM venues WHERE id = ?")
        .bind(&id)
        .fetch_one(&app_state.db_pool)
        .await?;

    log::info!("Created venue: {} ({})", created.name, id);
    Ok(HttpResponse::Created().json(ApiResponse::success(created)))
}

pub async fn update_venue(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    update: web::Json<UpdateVenueRequest>,
    user_id: String,
) -> ApiResult<HttpResponse> {
    update.validate()?;
    let venue_id = path.into_inner();

    let existing: Venue = sqlx::query_as("SELECT * FROM venues WHERE id = ?")
        .bind(&venue_id)
        .fetch_optional(&app_state.db_pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Venue"))?;

    if let Some(ref new_name) = update.name {
        if new_name.to_lowercase() != existing.name.to_lowercase() {
            let duplicate: Option<(String,)> = sqlx::query_as(
                "SELECT id FROM venues WHERE LOWER(name) = LOWER(?) AND id != ?"
            )
                .bind(new_name)
                .bind(&venue_id)
                .fetch_optional(&app_state.db_pool)
                .await?;

            if duplicate.is_some() {
                return Err(ApiError::catalog_name_taken("Venue", new_name));
            }
        }
    }

    let now = Utc::now();
    let name = update.name.as_ref().unwrap_or(&existing.name);
    let location = update.location.clone().or(existing.location);
    let capacity = update.capacity.or(existing.capacity);

    sqlx::query(
        "UPDATE venues SET name = ?, location = ?, capacity = ?, updated_by = ?, updated_at = ? WHERE id = ?"
    )
        .bind(name)
        .bind(&location)
        .bind(&capacity)
        .bind(&user_id)
        .bind(&now)
        .bind(&venue_id)
        .execute(&app_state.db_pool)
        .await?;

    let updated: Venue = sqlx::query_as("SELECT * FROM venues WHERE id = ?")
        .bind(&venue_id)
        .fetch_one(&app_state.db_pool)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(updated)))
}

pub async fn set_venue_availability(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    body: web::Json<SetVenueAvailabilityRequest>,
    user_id: String,
) -> ApiResult<HttpResponse> {
    let venue_id = path.into_inner();

    let result = sqlx::query(
        "UPDATE venues SET available = ?, updated_by = ?, updated_at = ? WHERE id = ?"
    )
        .bind(body.available as i32)
        .bind(&user_id)
        .bind(Utc::now())
        .bind(&venue_id)
        .execute(&app_state.db_pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Venue"));
    }

    let updated: Venue = sqlx::query_as("SELECT * FROM venues WHERE id = ?")
        .bind(&venue_id)
        .fetch_one(&app_state.db_pool)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(updated)))
}

pub async fn set_venue_archived(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    body: web::Json<SetArchivedRequest>,
    user_id: String,
) -> ApiResult<HttpResponse> {
    let venue_id = path.into_inner();

    let result = sqlx::query(
        "UPDATE venues SET archived = ?, updated_by = ?, updated_at = ? WHERE id = ?"
    )
        .bind(body.archived as i32)
        .bind(&user_id)
        .bind(Utc::now())
        .bind(&venue_id)
        .execute(&app_state.db_pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Venue"));
    }

    let updated: Venue = sqlx::query_as("SELECT * FROM venues WHERE id = ?")
        .bind(&venue_id)
        .fetch_one(&app_state.db_pool)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(updated)))
}

pub async fn delete_venue(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let venue_id = path.into_inner();

    let references: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM request_venues WHERE venue_id = ?"
    )
        .bind(&venue_id)
        .fetch_one(&app_state.db_pool)
        .await?;

    if references.0 > 0 {
        return Err(ApiError::bad_request(
            &format!("Cannot delete venue: {} requests reference it; archive it instead", references.0)
        ));
    }

    let result = sqlx::query("DELETE FROM venues WHERE id = ?")
        .bind(&venue_id)
        .execute(&app_state.db_pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Venue"));
    }

    log::info!("Deleted venue: {}", venue_id);
    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        (),
        "Venue deleted successfully".to_string(),
    )))
}

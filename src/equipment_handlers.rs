// src/equipment_handlers.rs
//! Equipment catalog: CRUD plus the bounded availability counter.

use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::error::{ApiError, ApiResult};
use crate::handlers::ApiResponse;
use crate::models::{
    clamp_available, CreateEquipmentRequest, Equipment, SetArchivedRequest,
    SetEquipmentAvailabilityRequest, UpdateEquipmentRequest,
};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CatalogListQuery {
    /// Include archived rows (admin panels); defaults to false
    pub include_archived: Option<bool>,
}

// ==================== LIST / DETAIL ====================

pub async fn get_equipment(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<CatalogListQuery>,
) -> ApiResult<HttpResponse> {
    let rows: Vec<Equipment> = if query.include_archived.unwrap_or(false) {
        sqlx::query_as("SELECT * FROM equipment ORDER BY name ASC")
            .fetch_all(&app_state.db_pool)
            .await?
    } else {
        sqlx::query_as("SELECT * FROM equipment WHERE archived = 0 ORDER BY name ASC")
            .fetch_all(&app_state.db_pool)
            .await?
    };

    Ok(HttpResponse::Ok().json(ApiResponse::success(rows)))
}

pub async fn get_equipment_by_id(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let equipment_id = path.into_inner();

    let equipment: Equipment = sqlx::query_as("SELECT * FROM equipment WHERE id = ?")
        .bind(&equipment_id)
        .fetch_optional(&app_state.db_pool)
        .await?
        .ok_or_else(|| ApiError::equipment_not_found(&equipment_id))?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(equipment)))
}

// ==================== CREATE ====================

pub async fn create_equipment(
    app_state: web::Data<Arc<AppState>>,
    equipment: web::Json<CreateEquipmentRequest>,
    user_id: String,
) -> ApiResult<HttpResponse> {
    equipment.validate()?;

    let existing: Option<(String,)> = sqlx::query_as(
        "SELECT id FROM equipment WHERE LOWER(name) = LOWER(?)"
    )
        .bind(&equipment.name)
        .fetch_optional(&app_state.db_pool)
        .await?;

    if existing.is_some() {
        return Err(ApiError::catalog_name_taken("Equipment", &equipment.name));
    }

    let id = Uuid::new_v4().to_string();
    let now = Utc::now();
    // a new row starts fully available unless told otherwise
    let available = clamp_available(
        equipment.available.unwrap_or(equipment.quantity),
        equipment.quantity,
    );

    sqlx::query(
        r#"INSERT INTO equipment
           (id, name, description, quantity, available, archived, created_by, updated_by, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, 0, ?, ?, ?, ?)"#
    )
        .bind(&id)
        .bind(&equipment.name)
        .bind(&equipment.description)
        .bind(equipment.quantity)
        .bind(available)
        .bind(&user_id)
        .bind(&user_id)
        .bind(&now)
        .bind(&now)
        .execute(&app_state.db_pool)
        .await?;

    let created: Equipment = sqlx::query_as("SELECT * FROM equipment WHERE id = ?")
        .bind(&id)
        .fetch_one(&app_state.db_pool)
        .await?;

    log::info!("Created equipment: {} ({})", created.name, id);
    Ok(HttpResponse::Created().json(ApiResponse::success(created)))
}

// ==================== UPDATE ====================

pub async fn update_equipment(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    update: web::Json<UpdateEquipmentRequest>,
    user_id: String,
) -> ApiResult<HttpResponse> {
    update.validate()?;
    let equipment_id = path.into_inner();

    let existing: Equipment = sqlx::query_as("SELECT * FROM equipment WHERE id = ?")
        .bind(&equipment_id)
        .fetch_optional(&app_state.db_pool)
        .await?
        .ok_or_else(|| ApiError::equipment_not_found(&equipment_id))?;

    if let Some(ref new_name) = update.name {
        if new_name.to_lowercase() != existing.name.to_lowercase() {
            let duplicate: Option<(String,)> = sqlx::query_as(
                "SELECT id FROM equipment WHERE LOWER(name) = LOWER(?) AND id != ?"
            )
                .bind(new_name)
                .bind(&equipment_id)
                .fetch_optional(&app_state.db_pool)
                .await?;

            if duplicate.is_some() {
                return Err(ApiError::catalog_name_taken("Equipment", new_name));
            }
        }
    }

    let now = Utc::now();
    let name = update.name.as_ref().unwrap_or(&existing.name);
    let description = update.description.clone().or(existing.description);
    let quantity = update.quantity.unwrap_or(existing.quantity);
    // shrinking the stock pulls availability down with it
    let available = clamp_available(existing.available, quantity);

    sqlx::query(
        r#"UPDATE equipment
           SET name = ?, description = ?, quantity = ?, available = ?, updated_by = ?, updated_at = ?
           WHERE id = ?"#
    )
        .bind(name)
        .bind(&description)
        .bind(quantity)
        .bind(available)
        .bind(&user_id)
        .bind(&now)
        .bind(&equipment_id)
        .execute(&app_state.db_pool)
        .await?;

    let updated: Equipment = sqlx::query_as("SELECT * FROM equipment WHERE id = ?")
        .bind(&equipment_id)
        .fetch_one(&app_state.db_pool)
        .await?;

    app_state.board.invalidate();

    log::info!("Updated equipment: {} ({})", updated.name, equipment_id);
    Ok(HttpResponse::Ok().json(ApiResponse::success(updated)))
}

/// Availability toggle from the admin panel. Out-of-range values clamp to
/// [0, quantity], which also makes the update idempotent.
pub async fn set_equipment_availability(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    body: web::Json<SetEquipmentAvailabilityRequest>,
    user_id: String,
) -> ApiResult<HttpResponse> {
    let equipment_id = path.into_inner();

    let existing: Equipment = sqlx::query_as("SELECT * FROM equipment WHERE id = ?")
        .bind(&equipment_id)
        .fetch_optional(&app_state.db_pool)
        .await?
        .ok_or_else(|| ApiError::equipment_not_found(&equipment_id))?;

    let available = clamp_available(body.available, existing.quantity);

    sqlx::query(
        "UPDATE equipment SET available = ?, updated_by = ?, updated_at = ? WHERE id = ?"
    )
        .bind(available)
        .bind(&user_id)
        .bind(Utc::now())
        .bind(&equipment_id)
        .execute(&app_state.db_pool)
        .await?;

    let updated: Equipment = sqlx::query_as("SELECT * FROM equipment WHERE id = ?")
        .bind(&equipment_id)
        .fetch_one(&app_state.db_pool)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(updated)))
}

pub async fn set_equipment_archived(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    body: web::Json<SetArchivedRequest>,
    user_id: String,
) -> ApiResult<HttpResponse> {
    let equipment_id = path.into_inner();

    let result = sqlx::query(
        "UPDATE equipment SET archived = ?, updated_by = ?, updated_at = ? WHERE id = ?"
    )
        .bind(body.archived as i32)
        .bind(&user_id)
        .bind(Utc::now())
        .bind(&equipment_id)
        .execute(&app_state.db_pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::equipment_not_found(&equipment_id));
    }

    let updated: Equipment = sqlx::query_as("SELECT * FROM equipment WHERE id = ?")
        .bind(&equipment_id)
        .fetch_one(&app_state.db_pool)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(updated)))
}

// ==================== DELETE ====================

pub async fn delete_equipment(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let equipment_id = path.into_inner();

    // Rows referenced by requests are archived, not deleted
    let references: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM request_equipment WHERE equipment_id = ?"
    )
        .bind(&equipment_id)
        .fetch_one(&app_state.db_pool)
        .await?;

    if references.0 > 0 {
        return Err(ApiError::bad_request(
            &format!("Cannot delete equipment: {} requests reference it; archive it instead", references.0)
        ));
    }

    let result = sqlx::query("DELETE FROM equipment WHERE id = ?")
        .bind(&equipment_id)
        .execute(&app_state.db_pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::equipment_not_found(&equipment_id));
    }

    app_state.board.invalidate();

    log::info!("Deleted equipment: {}", equipment_id);
    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        (),
        "Equipment deleted successfully".to_string(),
    )))
}

pub async fn check_equipment_exists(pool: &SqlitePool, equipment_id: &str) -> ApiResult<()> {
    let exists: Option<(String,)> = sqlx::query_as("SELECT id FROM equipment WHERE id = ?")
        .bind(equipment_id)
        .fetch_optional(pool)
        .await?;
    exists
        .map(|_| ())
        .ok_or_else(|| ApiError::equipment_not_found(equipment_id))
}

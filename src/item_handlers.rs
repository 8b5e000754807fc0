// src/item_handlers.rs
//! Catalog items (banners, props, printed material and the like).

use actix_web::{web, HttpResponse};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::equipment_handlers::CatalogListQuery;
use crate::error::{ApiError, ApiResult};
use crate::handlers::ApiResponse;
use crate::models::{
    CreateItemRequest, Item, SetArchivedRequest, SetItemAvailabilityRequest, UpdateItemRequest,
};
use crate::AppState;

pub async fn get_items(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<CatalogListQuery>,
) -> ApiResult<HttpResponse> {
    let rows: Vec<Item> = if query.include_archived.unwrap_or(false) {
        sqlx::query_as("SELECT * FROM items ORDER BY name ASC")
            .fetch_all(&app_state.db_pool)
            .await?
    } else {
        sqlx::query_as("SELECT * FROM items WHERE archived = 0 ORDER BY name ASC")
            .fetch_all(&app_state.db_pool)
            .await?
    };

    Ok(HttpResponse::Ok().json(ApiResponse::success(rows)))
}

pub async fn get_item(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let item_id = path.into_inner();

    let item: Item = sqlx::query_as("SELECT * FROM items WHERE id = ?")
        .bind(&item_id)
        .fetch_optional(&app_state.db_pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Item"))?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(item)))
}

pub async fn create_item(
    app_state: web::Data<Arc<AppState>>,
    item: web::Json<CreateItemRequest>,
    user_id: String,
) -> ApiResult<HttpResponse> {
    item.validate()?;

    let existing: Option<(String,)> = sqlx::query_as(
        "SELECT id FROM items WHERE LOWER(name) = LOWER(?)"
    )
        .bind(&item.name)
        .fetch_optional(&app_state.db_pool)
        .await?;

    if existing.is_some() {
        return Err(ApiError::catalog_name_taken("Item", &item.name));
    }

    let id = Uuid::new_v4().to_string();
    let now = Utc::now();

    sqlx::query(
        r#"INSERT INTO items
           (id, name, description, available, archived, created_by, updated_by, created_at, updated_at)
           VALUES (?, ?, ?, 1, 0, ?, ?, ?, ?)"#
    )
        .bind(&id)
        .bind(&item.name)
        .bind(&item.description)
        .bind(&user_id)
        .bind(&user_id)
        .bind(&now)
        .bind(&now)
        .execute(&app_state.db_pool)
        .await?;

    let created: Item = sqlx::query_as("SELECT * FROM items WHERE id = ?")
        .bind(&id)
        .fetch_one(&app_state.db_pool)
        .await?;

    log::info!("Created item: {} ({})", created.name, id);
    Ok(HttpResponse::Created().json(ApiResponse::success(created)))
}

pub async fn update_item(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    update: web::Json<UpdateItemRequest>,
    user_id: String,
) -> ApiResult<HttpResponse> {
    update.validate()?;
    let item_id = path.into_inner();

    let existing: Item = sqlx::query_as("SELECT * FROM items WHERE id = ?")
        .bind(&item_id)
        .fetch_optional(&app_state.db_pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Item"))?;

    if let Some(ref new_name) = update.name {
        if new_name.to_lowercase() != existing.name.to_lowercase() {
            let duplicate: Option<(String,)> = sqlx::query_as(
                "SELECT id FROM items WHERE LOWER(name) = LOWER(?) AND id != ?"
            )
                .bind(new_name)
                .bind(&item_id)
                .fetch_optional(&app_state.db_pool)
                .await?;

            if duplicate.is_some() {
                return Err(ApiError::catalog_name_taken("Item", new_name));
            }
        }
    }

    let now = Utc::now();
    let name = update.name.as_ref().unwrap_or(&existing.name);
    let description = update.description.clone().or(existing.description);

    sqlx::query(
        "UPDATE items SET name = ?, description = ?, updated_by = ?, updated_at = ? WHERE id = ?"
    )
        .bind(name)
        .bind(&description)
        .bind(&user_id)
        .bind(&now)
        .bind(&item_id)
        .execute(&app_state.db_pool)
        .await?;

    let updated: Item = sqlx::query_as("SELECT * FROM items WHERE id = ?")
        .bind(&item_id)
        .fetch_one(&app_state.db_pool)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(updated)))
}

pub async fn set_item_availability(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    body: web::Json<SetItemAvailabilityRequest>,
    user_id: String,
) -> ApiResult<HttpResponse> {
    let item_id = path.into_inner();

    let result = sqlx::query(
        "UPDATE items SET available = ?, updated_by = ?, updated_at = ? WHERE id = ?"
    )
        .bind(body.available as i32)
        .bind(&user_id)
        .bind(Utc::now())
        .bind(&item_id)
        .execute(&app_state.db_pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Item"));
    }

    let updated: Item = sqlx::query_as("SELECT * FROM items WHERE id = ?")
        .bind(&item_id)
        .fetch_one(&app_state.db_pool)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(updated)))
}

pub async fn set_item_archived(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    body: web::Json<SetArchivedRequest>,
    user_id: String,
) -> ApiResult<HttpResponse> {
    let item_id = path.into_inner();

    let result = sqlx::query(
        "UPDATE items SET archived = ?, updated_by = ?, updated_at = ? WHERE id = ?"
    )
        .bind(body.archived as i32)
        .bind(&user_id)
        .bind(Utc::now())
        .bind(&item_id)
        .execute(&app_state.db_pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Item"));
    }

    let updated: Item = sqlx::query_as("SELECT * FROM items WHERE id = ?")
        .bind(&item_id)
        .fetch_one(&app_state.db_pool)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(updated)))
}

pub async fn delete_item(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let item_id = path.into_inner();

    let references: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM request_items WHERE item_id = ?"
    )
        .bind(&item_id)
        .fetch_one(&app_state.db_pool)
        .await?;

    if references.0 > 0 {
        return Err(ApiError::bad_request(
            &format!("Cannot delete item: {} requests reference it; archive it instead", references.0)
        ));
    }

    let result = sqlx::query("DELETE FROM items WHERE id = ?")
        .bind(&item_id)
        .execute(&app_state.db_pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Item"));
    }

    log::info!("Deleted item: {}", item_id);
    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        (),
        "Item deleted successfully".to_string(),
    )))
}

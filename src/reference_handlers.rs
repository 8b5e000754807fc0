// src/reference_handlers.rs
//! Read-only reference tables: statuses, priorities, request types. Rows
//! are seeded at migration time (db.rs) and define the pipeline and the
//! sort orderings.

use actix_web::{web, HttpResponse};
use std::sync::Arc;

use crate::error::ApiResult;
use crate::handlers::ApiResponse;
use crate::models::{Priority, RequestType, Status};
use crate::AppState;

pub async fn get_statuses(
    app_state: web::Data<Arc<AppState>>,
) -> ApiResult<HttpResponse> {
    let statuses: Vec<Status> = sqlx::query_as("SELECT * FROM statuses ORDER BY value ASC")
        .fetch_all(&app_state.db_pool)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(statuses)))
}

pub async fn get_priorities(
    app_state: web::Data<Arc<AppState>>,
) -> ApiResult<HttpResponse> {
    let priorities: Vec<Priority> = sqlx::query_as("SELECT * FROM priorities ORDER BY value ASC")
        .fetch_all(&app_state.db_pool)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(priorities)))
}

pub async fn get_request_types(
    app_state: web::Data<Arc<AppState>>,
) -> ApiResult<HttpResponse> {
    let types: Vec<RequestType> = sqlx::query_as("SELECT * FROM request_types ORDER BY value ASC")
        .fetch_all(&app_state.db_pool)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(types)))
}

// src/handlers.rs
use actix_web::{web, HttpResponse};
use std::sync::Arc;
use serde::{Serialize, Deserialize};
use chrono::{DateTime, Utc};
use crate::AppState;
use crate::error::ApiResult;
use crate::models::DashboardStats;

// ==================== COMMON STRUCTURES ====================

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn success_with_message(data: T, message: String) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

#[derive(Debug, Deserialize)]
pub struct PaginationQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub search: Option<String>,
}

impl PaginationQuery {
    pub fn normalize(&self) -> (i64, i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let per_page = self.per_page.unwrap_or(20).clamp(1, 100);
        let offset = (page - 1) * per_page;
        (page, per_page, offset)
    }
}

// ==================== DASHBOARD STATISTICS ====================

pub async fn get_dashboard_stats(
    app_state: web::Data<Arc<AppState>>,
) -> ApiResult<HttpResponse> {
    let total_requests: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM requests")
        .fetch_one(&app_state.db_pool)
        .await?;

    // Everything left of the 'Done' column counts as open
    let open_requests: (i64,) = sqlx::query_as(
        r#"SELECT COUNT(*) FROM requests r
           JOIN statuses s ON r.status_id = s.id
           WHERE s.value < COALESCE((SELECT value FROM statuses WHERE name = 'Done'), 1000000)"#
    )
        .fetch_one(&app_state.db_pool)
        .await?;

    let due_this_week: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM requests WHERE due_at IS NOT NULL AND due_at BETWEEN datetime('now') AND datetime('now', '+7 days')"
    )
        .fetch_one(&app_state.db_pool)
        .await?;

    let unassigned: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM requests r WHERE NOT EXISTS (SELECT 1 FROM request_assignees a WHERE a.request_id = r.id)"
    )
        .fetch_one(&app_state.db_pool)
        .await?;

    let total_equipment: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM equipment WHERE archived = 0")
        .fetch_one(&app_state.db_pool)
        .await?;
    let total_songs: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM songs WHERE archived = 0")
        .fetch_one(&app_state.db_pool)
        .await?;
    let total_venues: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM venues WHERE archived = 0")
        .fetch_one(&app_state.db_pool)
        .await?;
    let total_items: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM items WHERE archived = 0")
        .fetch_one(&app_state.db_pool)
        .await?;

    let stats = DashboardStats {
        total_requests: total_requests.0,
        open_requests: open_requests.0,
        due_this_week: due_this_week.0,
        unassigned_requests: unassigned.0,
        total_equipment: total_equipment.0,
        total_songs: total_songs.0,
        total_venues: total_venues.0,
        total_items: total_items.0,
    };

    Ok(HttpResponse::Ok().json(ApiResponse::success(stats)))
}

// ==================== RECENT ACTIVITY ====================

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ActivityEntry {
    pub id: String,
    pub user_id: Option<String>,
    pub username: Option<String>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub async fn get_recent_activity(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<PaginationQuery>,
) -> ApiResult<HttpResponse> {
    let (page, per_page, offset) = query.normalize();

    let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM audit_logs")
        .fetch_one(&app_state.db_pool)
        .await?;

    let entries: Vec<ActivityEntry> = sqlx::query_as(
        r#"SELECT
            al.id,
            al.user_id,
            u.username as username,
            al.action,
            al.entity_type,
            al.entity_id,
            al.description,
            al.created_at
           FROM audit_logs al
           LEFT JOIN users u ON al.user_id = u.id
           ORDER BY al.created_at DESC
           LIMIT ? OFFSET ?"#
    )
        .bind(per_page)
        .bind(offset)
        .fetch_all(&app_state.db_pool)
        .await?;

    let total_pages = (total.0 + per_page - 1) / per_page;

    let response = PaginatedResponse {
        data: entries,
        total: total.0,
        page,
        per_page,
        total_pages,
    };

    Ok(HttpResponse::Ok().json(ApiResponse::success(response)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_normalize_defaults() {
        let q = PaginationQuery { page: None, per_page: None, search: None };
        assert_eq!(q.normalize(), (1, 20, 0));
    }

    #[test]
    fn test_pagination_normalize_clamps() {
        let q = PaginationQuery { page: Some(0), per_page: Some(1000), search: None };
        assert_eq!(q.normalize(), (1, 100, 0));

        let q = PaginationQuery { page: Some(3), per_page: Some(10), search: None };
        assert_eq!(q.normalize(), (3, 10, 20));
    }
}

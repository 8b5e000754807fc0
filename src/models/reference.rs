// src/models/reference.rs
//! Ordered reference tables attached to every request.

use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

/// Pipeline stage. `value` is the total order used for kanban columns and
/// the status sort comparator.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Status {
    pub id: String,
    pub name: String,
    pub value: i64,
    pub color: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Priority {
    pub id: String,
    pub name: String,
    pub value: i64,
    pub color: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Request category. `notice_days` is the minimum lead time between
/// submission and due date; `warning` is the advisory text shown when the
/// lead time falls short.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct RequestType {
    pub id: String,
    pub name: String,
    pub value: i64,
    pub notice_days: i64,
    pub warning: Option<String>,
    pub color: Option<String>,
    pub created_at: DateTime<Utc>,
}

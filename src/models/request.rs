// src/models/request.rs
use serde::{Deserialize, Serialize};
use validator::Validate;
use chrono::{DateTime, Utc};

// ==================== REQUEST ====================

/// A unit of work submitted via the 5W1H form. `when` and `where` clash
/// with both SQL and Rust keywords, hence the trailing underscore; the JSON
/// surface keeps the original names.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Request {
    pub id: String,
    pub who: String,
    pub what: String,
    #[serde(rename = "when")]
    pub when_: String,
    #[serde(rename = "where")]
    pub where_: String,
    pub why: String,
    pub how: String,
    pub info: Option<String>,
    pub due_at: Option<DateTime<Utc>>,
    /// Ordered step descriptions, stored as a JSON array
    pub flow: Option<String>,
    pub status_id: String,
    pub priority_id: String,
    pub type_id: String,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Request {
    pub fn flow_steps(&self) -> Vec<String> {
        self.flow
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default()
    }
}

/// Request row joined with its reference names, as served to the board and
/// list views.
#[derive(Debug, Serialize, sqlx::FromRow, Clone)]
pub struct RequestRow {
    pub id: String,
    pub who: String,
    pub what: String,
    #[serde(rename = "when")]
    pub when_: String,
    #[serde(rename = "where")]
    pub where_: String,
    pub why: String,
    pub how: String,
    pub info: Option<String>,
    pub due_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub status_id: String,
    pub status_name: String,
    pub status_value: i64,
    pub status_color: Option<String>,
    pub priority_id: String,
    pub priority_name: String,
    pub priority_value: i64,
    pub type_id: String,
    pub type_name: String,
}

/// Full detail view: the row plus every association.
#[derive(Debug, Serialize)]
pub struct RequestDetail {
    #[serde(flatten)]
    pub request: Request,
    pub flow_steps: Vec<String>,
    pub status: super::Status,
    pub priority: super::Priority,
    pub request_type: super::RequestType,
    pub equipment: Vec<RequestEquipment>,
    pub songs: Vec<super::Song>,
    pub venues: Vec<super::Venue>,
    pub items: Vec<super::Item>,
    pub assignees: Vec<Assignee>,
    pub notes: Vec<super::Note>,
    pub attachments: Vec<Attachment>,
}

/// Equipment association carrying the requested amount
#[derive(Debug, Serialize, sqlx::FromRow, Clone)]
pub struct RequestEquipment {
    pub equipment_id: String,
    pub name: String,
    pub amount: i64,
}

#[derive(Debug, Serialize, sqlx::FromRow, Clone)]
pub struct Assignee {
    pub user_id: String,
    pub username: String,
}

// ==================== SUBMISSION / UPDATE DTOS ====================

#[derive(Debug, Deserialize, Validate, Clone)]
pub struct EquipmentSelection {
    pub equipment_id: String,
    #[validate(range(min = 1, message = "Amount must be at least 1"))]
    pub amount: i64,
}

/// Wizard submission payload. The 5W1H fields are checked step by step by
/// the wizard validator, so the derive limits itself to lengths.
#[derive(Debug, Deserialize, Validate, Clone, Default)]
pub struct SubmitRequestRequest {
    #[validate(length(max = 255, message = "Who cannot exceed 255 characters"))]
    pub who: String,

    #[validate(length(max = 1000, message = "What cannot exceed 1000 characters"))]
    pub what: String,

    #[serde(rename = "when", default)]
    #[validate(length(max = 255, message = "When cannot exceed 255 characters"))]
    pub when_: String,

    #[serde(rename = "where", default)]
    #[validate(length(max = 255, message = "Where cannot exceed 255 characters"))]
    pub where_: String,

    #[validate(length(max = 1000, message = "Why cannot exceed 1000 characters"))]
    pub why: String,

    #[validate(length(max = 1000, message = "How cannot exceed 1000 characters"))]
    pub how: String,

    #[validate(length(max = 2000, message = "Info cannot exceed 2000 characters"))]
    pub info: Option<String>,

    pub due_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub flow: Vec<String>,

    pub type_id: String,
    pub priority_id: Option<String>,

    #[serde(default)]
    #[validate(nested)]
    pub equipment: Vec<EquipmentSelection>,
    #[serde(default)]
    pub songs: Vec<String>,
    #[serde(default)]
    pub venues: Vec<String>,
    #[serde(default)]
    pub items: Vec<String>,
}

/// Successful submission response. `notice_warning` is advisory: the
/// request was created either way.
#[derive(Debug, Serialize)]
pub struct SubmitRequestResponse {
    pub id: String,
    pub notice_warning: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateRequestRequest {
    #[validate(length(min = 1, max = 255, message = "Who must be between 1 and 255 characters"))]
    pub who: Option<String>,

    #[validate(length(min = 1, max = 1000, message = "What must be between 1 and 1000 characters"))]
    pub what: Option<String>,

    #[serde(rename = "when")]
    #[validate(length(min = 1, max = 255, message = "When must be between 1 and 255 characters"))]
    pub when_: Option<String>,

    #[serde(rename = "where")]
    #[validate(length(min = 1, max = 255, message = "Where must be between 1 and 255 characters"))]
    pub where_: Option<String>,

    #[validate(length(min = 1, max = 1000, message = "Why must be between 1 and 1000 characters"))]
    pub why: Option<String>,

    #[validate(length(min = 1, max = 1000, message = "How must be between 1 and 1000 characters"))]
    pub how: Option<String>,

    #[validate(length(max = 2000, message = "Info cannot exceed 2000 characters"))]
    pub info: Option<String>,

    pub due_at: Option<DateTime<Utc>>,
    pub flow: Option<Vec<String>>,
    pub priority_id: Option<String>,
    pub type_id: Option<String>,
}

/// Kanban drag-drop: move a card to another column
#[derive(Debug, Deserialize)]
pub struct UpdateRequestStatusRequest {
    pub status_id: String,
}

#[derive(Debug, Deserialize)]
pub struct AssignMemberRequest {
    pub user_id: String,
}

// ==================== ATTACHMENT ====================

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Attachment {
    pub id: String,
    pub request_id: String,
    pub original_filename: String,
    pub stored_filename: String,
    pub file_path: String,
    pub file_size: i64,
    pub mime_type: String,
    pub uploaded_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

// src/models/song.rs
use serde::{Deserialize, Serialize};
use validator::Validate;
use chrono::{DateTime, Utc};

// ==================== SONG ====================

/// Availability splits into two independent flags: whether the instrumental
/// backing and the lyric sheets are on hand.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Song {
    pub id: String,
    pub title: String,
    pub author: Option<String>,
    pub instrumental: bool,
    pub lyrics: bool,
    pub archived: bool,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate, Clone)]
pub struct CreateSongRequest {
    #[validate(length(min = 1, max = 255, message = "Title must be between 1 and 255 characters"))]
    pub title: String,

    #[validate(length(max = 255, message = "Author cannot exceed 255 characters"))]
    pub author: Option<String>,

    #[serde(default)]
    pub instrumental: bool,
    #[serde(default)]
    pub lyrics: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateSongRequest {
    #[validate(length(min = 1, max = 255, message = "Title must be between 1 and 255 characters"))]
    pub title: Option<String>,

    #[validate(length(max = 255, message = "Author cannot exceed 255 characters"))]
    pub author: Option<String>,
}

/// Either flag may be toggled on its own
#[derive(Debug, Deserialize)]
pub struct SetSongAvailabilityRequest {
    pub instrumental: Option<bool>,
    pub lyrics: Option<bool>,
}

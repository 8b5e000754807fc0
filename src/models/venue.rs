// src/models/venue.rs
use serde::{Deserialize, Serialize};
use validator::Validate;
use chrono::{DateTime, Utc};

// ==================== VENUE ====================

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Venue {
    pub id: String,
    pub name: String,
    pub location: Option<String>,
    pub capacity: Option<i64>,
    pub available: bool,
    pub archived: bool,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate, Clone)]
pub struct CreateVenueRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    pub name: String,

    #[validate(length(max = 255, message = "Location cannot exceed 255 characters"))]
    pub location: Option<String>,

    #[validate(range(min = 1, max = 100000, message = "Capacity must be between 1 and 100000"))]
    pub capacity: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateVenueRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    pub name: Option<String>,

    #[validate(length(max = 255, message = "Location cannot exceed 255 characters"))]
    pub location: Option<String>,

    #[validate(range(min = 1, max = 100000, message = "Capacity must be between 1 and 100000"))]
    pub capacity: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SetVenueAvailabilityRequest {
    pub available: bool,
}

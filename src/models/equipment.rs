// src/models/equipment.rs
use serde::{Deserialize, Serialize};
use validator::Validate;
use chrono::{DateTime, Utc};

// ==================== EQUIPMENT ====================

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Equipment {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub quantity: i64,
    /// Units currently available. Invariant: 0 <= available <= quantity.
    pub available: i64,
    pub archived: bool,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate, Clone)]
pub struct CreateEquipmentRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    pub name: String,

    #[validate(length(max = 1000, message = "Description cannot exceed 1000 characters"))]
    pub description: Option<String>,

    #[validate(range(min = 0, message = "Quantity cannot be negative"))]
    pub quantity: i64,

    pub available: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateEquipmentRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    pub name: Option<String>,

    #[validate(length(max = 1000, message = "Description cannot exceed 1000 characters"))]
    pub description: Option<String>,

    #[validate(range(min = 0, message = "Quantity cannot be negative"))]
    pub quantity: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SetEquipmentAvailabilityRequest {
    pub available: i64,
}

#[derive(Debug, Deserialize)]
pub struct SetArchivedRequest {
    pub archived: bool,
}

/// Availability updates clamp rather than reject out-of-range values, so a
/// repeated update lands on the same result.
pub fn clamp_available(requested: i64, quantity: i64) -> i64 {
    requested.clamp(0, quantity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_available_bounds() {
        assert_eq!(clamp_available(-5, 10), 0);
        assert_eq!(clamp_available(20, 10), 10);
        assert_eq!(clamp_available(7, 10), 7);
        assert_eq!(clamp_available(0, 0), 0);
    }

    #[test]
    fn test_clamp_available_idempotent() {
        let once = clamp_available(-5, 10);
        assert_eq!(clamp_available(once, 10), once);
        let over = clamp_available(10 + 10, 10);
        assert_eq!(clamp_available(over, 10), over);
    }
}

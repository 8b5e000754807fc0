// src/models/mod.rs

pub mod equipment;
pub mod item;
pub mod note;
pub mod reference;
pub mod request;
pub mod song;
pub mod venue;

pub use equipment::*;
pub use item::*;
pub use note::*;
pub use reference::*;
pub use request::*;
pub use song::*;
pub use venue::*;

use serde::Serialize;

// ==================== COMMON / SHARED ====================

/// Aggregate counters for the admin dashboard
#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub total_requests: i64,
    pub open_requests: i64,
    pub due_this_week: i64,
    pub unassigned_requests: i64,
    pub total_equipment: i64,
    pub total_songs: i64,
    pub total_venues: i64,
    pub total_items: i64,
}

// src/board.rs
//! In-memory board cache and the optimistic status-change command.
//!
//! The cache holds the full card set the list and kanban views are derived
//! from. Invalidation is deliberately coarse: every request mutation drops
//! the whole snapshot and the next read refetches. The one exception is a
//! kanban drag-drop: the status command patches the cached card in place
//! before the database confirms, keeping a snapshot to restore if the
//! write fails.

use std::sync::Mutex;

use serde::Serialize;

use crate::listing::{group_by_status, RequestCard};
use crate::models::Status;

// ==================== CACHE ====================

#[derive(Debug, Default)]
pub struct BoardCache {
    cards: Mutex<Option<Vec<RequestCard>>>,
}

impl BoardCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached snapshot, if warm
    pub fn get(&self) -> Option<Vec<RequestCard>> {
        self.cards.lock().unwrap().clone()
    }

    /// Replace the snapshot after a refetch
    pub fn set(&self, cards: Vec<RequestCard>) {
        *self.cards.lock().unwrap() = Some(cards);
    }

    /// Drop the snapshot; the next read loads through
    pub fn invalidate(&self) {
        *self.cards.lock().unwrap() = None;
    }

    /// Optimistically move a card to another status. Returns the command
    /// holding the previous value, or None when the cache is cold or the
    /// card is unknown (nothing to patch, nothing to roll back).
    pub fn apply_status(&self, request_id: &str, next: CardStatus) -> Option<StatusChange> {
        let mut guard = self.cards.lock().unwrap();
        let cards = guard.as_mut()?;
        let card = cards.iter_mut().find(|c| c.row.id == request_id)?;

        let prev = CardStatus {
            status_id: card.row.status_id.clone(),
            status_name: card.row.status_name.clone(),
            status_value: card.row.status_value,
            status_color: card.row.status_color.clone(),
        };
        next.write_to(card);

        Some(StatusChange {
            request_id: request_id.to_string(),
            prev,
        })
    }
}

// ==================== STATUS COMMAND ====================

#[derive(Debug, Clone, PartialEq)]
pub struct CardStatus {
    pub status_id: String,
    pub status_name: String,
    pub status_value: i64,
    pub status_color: Option<String>,
}

impl CardStatus {
    pub fn from_status(status: &Status) -> Self {
        Self {
            status_id: status.id.clone(),
            status_name: status.name.clone(),
            status_value: status.value,
            status_color: status.color.clone(),
        }
    }

    fn write_to(&self, card: &mut RequestCard) {
        card.row.status_id = self.status_id.clone();
        card.row.status_name = self.status_name.clone();
        card.row.status_value = self.status_value;
        card.row.status_color = self.status_color.clone();
    }
}

/// Snapshot of a card's status before an optimistic move. Dropping the
/// command confirms the move; `rollback` restores the snapshot.
#[derive(Debug)]
pub struct StatusChange {
    request_id: String,
    prev: CardStatus,
}

impl StatusChange {
    pub fn rollback(self, cache: &BoardCache) {
        let mut guard = cache.cards.lock().unwrap();
        if let Some(cards) = guard.as_mut() {
            if let Some(card) = cards.iter_mut().find(|c| c.row.id == self.request_id) {
                self.prev.write_to(card);
            }
        }
    }
}

// ==================== COLUMNS ====================

#[derive(Debug, Serialize)]
pub struct BoardColumn {
    pub status_id: String,
    pub status_name: String,
    pub status_value: i64,
    pub status_color: Option<String>,
    pub requests: Vec<RequestCard>,
}

/// Kanban columns in status order. Every known status gets a column, empty
/// or not; cards with a status missing from the reference list (possible
/// mid-migration) are dropped from the board rather than invented a column.
pub fn build_columns(statuses: &[Status], cards: &[RequestCard]) -> Vec<BoardColumn> {
    let mut groups = group_by_status(cards);

    let mut ordered: Vec<&Status> = statuses.iter().collect();
    ordered.sort_by_key(|s| s.value);

    ordered
        .into_iter()
        .map(|status| BoardColumn {
            status_id: status.id.clone(),
            status_name: status.name.clone(),
            status_value: status.value,
            status_color: status.color.clone(),
            requests: groups.remove(&status.value).unwrap_or_default(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RequestRow;
    use chrono::{TimeZone, Utc};

    fn card(id: &str, status_value: i64) -> RequestCard {
        RequestCard {
            row: RequestRow {
                id: id.to_string(),
                who: "Choir".to_string(),
                what: "Lighting".to_string(),
                when_: "Friday".to_string(),
                where_: "Hall".to_string(),
                why: "Concert".to_string(),
                how: "Rig".to_string(),
                info: None,
                due_at: None,
                created_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
                status_id: format!("status-{}", status_value),
                status_name: format!("Stage {}", status_value),
                status_value,
                status_color: None,
                priority_id: "prio".to_string(),
                priority_name: "Normal".to_string(),
                priority_value: 20,
                type_id: "type".to_string(),
                type_name: "General".to_string(),
            },
            equipment: vec![],
            songs: vec![],
            assignees: vec![],
        }
    }

    fn status(value: i64) -> Status {
        Status {
            id: format!("status-{}", value),
            name: format!("Stage {}", value),
            value,
            color: None,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn next_status() -> CardStatus {
        CardStatus {
            status_id: "status-30".to_string(),
            status_name: "Stage 30".to_string(),
            status_value: 30,
            status_color: None,
        }
    }

    #[test]
    fn test_apply_status_patches_cached_card() {
        let cache = BoardCache::new();
        cache.set(vec![card("a", 10), card("b", 20)]);

        let change = cache.apply_status("a", next_status());
        assert!(change.is_some());

        let cards = cache.get().unwrap();
        let a = cards.iter().find(|c| c.row.id == "a").unwrap();
        assert_eq!(a.row.status_value, 30);
        assert_eq!(a.row.status_id, "status-30");
    }

    #[test]
    fn test_rollback_restores_snapshot() {
        let cache = BoardCache::new();
        cache.set(vec![card("a", 10)]);

        let change = cache.apply_status("a", next_status()).unwrap();
        change.rollback(&cache);

        let cards = cache.get().unwrap();
        assert_eq!(cards[0].row.status_value, 10);
        assert_eq!(cards[0].row.status_id, "status-10");
        assert_eq!(cards[0].row.status_name, "Stage 10");
    }

    #[test]
    fn test_apply_status_on_cold_cache_is_noop() {
        let cache = BoardCache::new();
        assert!(cache.apply_status("a", next_status()).is_none());

        cache.set(vec![card("a", 10)]);
        assert!(cache.apply_status("missing", next_status()).is_none());
    }

    #[test]
    fn test_invalidate_clears_snapshot() {
        let cache = BoardCache::new();
        cache.set(vec![card("a", 10)]);
        assert!(cache.get().is_some());
        cache.invalidate();
        assert!(cache.get().is_none());
    }

    #[test]
    fn test_build_columns_includes_empty_and_orders_by_value() {
        let statuses = vec![status(30), status(10), status(20)];
        let cards = vec![card("a", 10), card("b", 10), card("c", 30)];

        let columns = build_columns(&statuses, &cards);
        let values: Vec<i64> = columns.iter().map(|c| c.status_value).collect();
        assert_eq!(values, vec![10, 20, 30]);
        assert_eq!(columns[0].requests.len(), 2);
        assert_eq!(columns[1].requests.len(), 0);
        assert_eq!(columns[2].requests.len(), 1);
    }
}

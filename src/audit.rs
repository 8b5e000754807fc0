// src/audit.rs - audit logging helpers

use sqlx::SqlitePool;
use uuid::Uuid;
use chrono::Utc;
use actix_web::HttpRequest;

/// Write an event to audit_logs
pub async fn log_activity(
    pool: &SqlitePool,
    user_id: Option<&str>,
    action: &str,
    entity_type: &str,
    entity_id: Option<&str>,
    description: Option<&str>,
    changes: Option<&str>,
    request: Option<&HttpRequest>,
) -> Result<(), sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now();

    let ip_address = request.and_then(|req| {
        req.connection_info()
            .realip_remote_addr()
            .map(|s| s.to_string())
    });

    let user_agent = request.and_then(|req| {
        req.headers()
            .get("User-Agent")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
    });

    sqlx::query(
        r#"INSERT INTO audit_logs
           (id, user_id, action, entity_type, entity_id, description, changes, ip_address, user_agent, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#
    )
    .bind(&id)
    .bind(user_id)
    .bind(action)
    .bind(entity_type)
    .bind(entity_id)
    .bind(description)
    .bind(changes)
    .bind(&ip_address)
    .bind(&user_agent)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

/// Short form for frequent call sites
pub async fn audit(
    pool: &SqlitePool,
    user_id: &str,
    action: &str,
    entity_type: &str,
    entity_id: &str,
    description: &str,
    request: &HttpRequest,
) {
    if let Err(e) = log_activity(
        pool,
        Some(user_id),
        action,
        entity_type,
        Some(entity_id),
        Some(description),
        None,
        Some(request),
    ).await {
        log::error!("Failed to write audit log: {}", e);
    }
}

/// Audit with a serialized field-level change set attached
pub async fn audit_with_changes(
    pool: &SqlitePool,
    user_id: &str,
    action: &str,
    entity_type: &str,
    entity_id: &str,
    description: &str,
    changes: &ChangeSet,
    request: &HttpRequest,
) {
    let serialized = changes.to_json();
    if let Err(e) = log_activity(
        pool,
        Some(user_id),
        action,
        entity_type,
        Some(entity_id),
        Some(description),
        serialized.as_deref(),
        Some(request),
    ).await {
        log::error!("Failed to write audit log: {}", e);
    }
}

// ==================== CHANGE SET ====================

#[derive(Debug, Clone)]
enum Change {
    Created { field: String, value: String },
    Updated { field: String, old: String, new: String },
    Deleted { field: String, value: String },
}

/// Collects field-level diffs for one mutation. Unchanged fields are
/// silently skipped so the audit row only carries real differences.
#[derive(Debug, Default, Clone)]
pub struct ChangeSet {
    changes: Vec<Change>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created(&mut self, field: &str, value: &str) {
        self.changes.push(Change::Created {
            field: field.to_string(),
            value: value.to_string(),
        });
    }

    pub fn deleted(&mut self, field: &str, value: &str) {
        self.changes.push(Change::Deleted {
            field: field.to_string(),
            value: value.to_string(),
        });
    }

    pub fn add(&mut self, field: &str, old: &str, new: &str) {
        if old != new {
            self.changes.push(Change::Updated {
                field: field.to_string(),
                old: old.to_string(),
                new: new.to_string(),
            });
        }
    }

    pub fn add_opt(&mut self, field: &str, old: &Option<String>, new: &Option<String>) {
        if old != new {
            self.changes.push(Change::Updated {
                field: field.to_string(),
                old: old.clone().unwrap_or_default(),
                new: new.clone().unwrap_or_default(),
            });
        }
    }

    pub fn add_i64(&mut self, field: &str, old: i64, new: i64) {
        if old != new {
            self.add(field, &old.to_string(), &new.to_string());
        }
    }

    pub fn add_bool(&mut self, field: &str, old: bool, new: bool) {
        if old != new {
            self.add(field, &old.to_string(), &new.to_string());
        }
    }

    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    pub fn to_description(&self) -> String {
        self.changes
            .iter()
            .map(|change| match change {
                Change::Created { field, value } => format!("{}='{}'", field, value),
                Change::Updated { field, old, new } => format!("{}: '{}' -> '{}'", field, old, new),
                Change::Deleted { field, value } => format!("{}='{}'", field, value),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// JSON payload for the audit row's `changes` column
    pub fn to_json(&self) -> Option<String> {
        if self.changes.is_empty() {
            return None;
        }
        let entries: Vec<serde_json::Value> = self.changes
            .iter()
            .map(|change| match change {
                Change::Created { field, value } => serde_json::json!({
                    "field": field, "kind": "created", "value": value,
                }),
                Change::Updated { field, old, new } => serde_json::json!({
                    "field": field, "kind": "updated", "old": old, "new": new,
                }),
                Change::Deleted { field, value } => serde_json::json!({
                    "field": field, "kind": "deleted", "value": value,
                }),
            })
            .collect();
        serde_json::to_string(&entries).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_changeset_skips_equal_values() {
        let mut cs = ChangeSet::new();
        cs.add("who", "Choir", "Choir");
        cs.add_i64("amount", 2, 2);
        assert!(!cs.has_changes());
        assert!(cs.to_json().is_none());
    }

    #[test]
    fn test_changeset_describes_updates() {
        let mut cs = ChangeSet::new();
        cs.add("status", "New", "Accepted");
        cs.add_opt("info", &None, &Some("extra chairs".to_string()));
        assert!(cs.has_changes());

        let desc = cs.to_description();
        assert!(desc.contains("status: 'New' -> 'Accepted'"));
        assert!(desc.contains("info"));
    }

    #[test]
    fn test_changeset_json_round_trip() {
        let mut cs = ChangeSet::new();
        cs.created("name", "Fog Machine");
        cs.deleted("archived", "false");

        let json = cs.to_json().unwrap();
        let parsed: Vec<serde_json::Value> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0]["kind"], "created");
        assert_eq!(parsed[1]["kind"], "deleted");
    }
}

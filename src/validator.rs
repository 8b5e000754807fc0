// src/validator.rs - Centralized validation module
use std::collections::HashMap;
use serde::Serialize;
use chrono::{DateTime, Utc};
use crate::error::ApiError;
use crate::models::RequestType;

// ==================== VALIDATION RESULT ====================

#[derive(Debug, Default, Serialize)]
pub struct ValidationResult {
    pub errors: HashMap<String, Vec<String>>,
    pub warnings: HashMap<String, Vec<String>>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    pub fn merge(&mut self, other: ValidationResult) {
        for (field, errors) in other.errors {
            self.errors.entry(field).or_default().extend(errors);
        }
        for (field, warnings) in other.warnings {
            self.warnings.entry(field).or_default().extend(warnings);
        }
    }

    pub fn to_api_error(&self) -> ApiError {
        let message = self.errors
            .iter()
            .map(|(field, errors)| format!("{}: {}", field, errors.join(", ")))
            .collect::<Vec<_>>()
            .join("; ");

        ApiError::ValidationError(message)
    }
}

// ==================== FIELD VALIDATORS ====================

pub struct FieldValidator;

impl FieldValidator {
    pub fn not_empty(value: &str, field: &str) -> Result<(), String> {
        if value.trim().is_empty() {
            Err(format!("{} cannot be empty", field))
        } else {
            Ok(())
        }
    }

    pub fn length(value: &str, field: &str, min: Option<usize>, max: Option<usize>) -> Result<(), String> {
        let len = value.len();

        if let Some(min_len) = min {
            if len < min_len {
                return Err(format!("{} must be at least {} characters", field, min_len));
            }
        }

        if let Some(max_len) = max {
            if len > max_len {
                return Err(format!("{} must not exceed {} characters", field, max_len));
            }
        }

        Ok(())
    }

    pub fn range<T: PartialOrd + std::fmt::Display>(
        value: T,
        field: &str,
        min: Option<T>,
        max: Option<T>
    ) -> Result<(), String> {
        if let Some(min_val) = min {
            if value < min_val {
                return Err(format!("{} must be at least {}", field, min_val));
            }
        }

        if let Some(max_val) = max {
            if value > max_val {
                return Err(format!("{} must not exceed {}", field, max_val));
            }
        }

        Ok(())
    }

}

// ==================== NOTICE PERIOD ====================

/// Advisory lead-time check: compares the chosen due date against the
/// request type's notice period (days converted to hours) and returns a
/// warning when the gap is insufficient. Never blocks a submission.
pub fn notice_warning(
    due_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    request_type: &RequestType,
) -> Option<String> {
    let due = due_at?;
    if request_type.notice_days <= 0 {
        return None;
    }

    let required_hours = request_type.notice_days * 24;
    let gap_hours = due.signed_duration_since(now).num_hours();

    if gap_hours < required_hours {
        Some(request_type.warning.clone().unwrap_or_else(|| {
            format!(
                "{} requests need at least {} days of notice",
                request_type.name, request_type.notice_days
            )
        }))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn request_type(notice_days: i64, warning: Option<&str>) -> RequestType {
        RequestType {
            id: "type-1".to_string(),
            name: "Event Support".to_string(),
            value: 40,
            notice_days,
            warning: warning.map(|w| w.to_string()),
            color: None,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_notice_warning_insufficient_gap() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let rt = request_type(3, Some("Needs three days."));

        let due = Some(now + Duration::days(2));
        assert_eq!(notice_warning(due, now, &rt), Some("Needs three days.".to_string()));
    }

    #[test]
    fn test_notice_warning_sufficient_gap() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let rt = request_type(3, Some("Needs three days."));

        let due = Some(now + Duration::days(4));
        assert_eq!(notice_warning(due, now, &rt), None);
    }

    #[test]
    fn test_notice_warning_no_due_date_or_notice() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let rt = request_type(3, None);
        assert_eq!(notice_warning(None, now, &rt), None);

        let rt = request_type(0, None);
        assert_eq!(notice_warning(Some(now), now, &rt), None);
    }

    #[test]
    fn test_notice_warning_default_text() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let rt = request_type(3, None);
        let warning = notice_warning(Some(now + Duration::hours(1)), now, &rt).unwrap();
        assert!(warning.contains("Event Support"));
        assert!(warning.contains('3'));
    }

    #[test]
    fn test_field_validators() {
        assert!(FieldValidator::not_empty("  ", "who").is_err());
        assert!(FieldValidator::not_empty("x", "who").is_ok());
        assert!(FieldValidator::length("abc", "name", Some(5), None).is_err());
        assert!(FieldValidator::range(5, "amount", Some(1), Some(10)).is_ok());
        assert!(FieldValidator::range(0, "amount", Some(1), None).is_err());
    }
}

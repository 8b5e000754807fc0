// src/wizard.rs
//! Multi-step form wizard for request submission. The wizard is an owned
//! draft plus a guarded step cursor: a step may only be entered once every
//! prior step validates. Submission is handled by the HTTP layer; the
//! wizard records the outcome (terminal submitted state, or an error string
//! that keeps it on Review for retry).

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::{Display, EnumString};

use crate::models::{RequestType, SubmitRequestRequest};
use crate::validator::{notice_warning, FieldValidator, ValidationResult};

// ==================== STEPS ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum WizardStep {
    Who,
    What,
    Schedule,
    Where,
    Why,
    How,
    Extras,
    Review,
}

impl WizardStep {
    pub const ALL: [WizardStep; 8] = [
        WizardStep::Who,
        WizardStep::What,
        WizardStep::Schedule,
        WizardStep::Where,
        WizardStep::Why,
        WizardStep::How,
        WizardStep::Extras,
        WizardStep::Review,
    ];

    fn index(self) -> usize {
        Self::ALL.iter().position(|s| *s == self).unwrap_or(0)
    }

    pub fn next(self) -> Option<WizardStep> {
        Self::ALL.get(self.index() + 1).copied()
    }

    pub fn prev(self) -> Option<WizardStep> {
        self.index().checked_sub(1).map(|i| Self::ALL[i])
    }
}

// ==================== STEP VALIDATION ====================

/// Validate one step of a draft in isolation
pub fn validate_step(draft: &SubmitRequestRequest, step: WizardStep) -> ValidationResult {
    let mut result = ValidationResult::new();

    match step {
        WizardStep::Who => {
            if let Err(e) = FieldValidator::not_empty(&draft.who, "who") {
                result.add_error("who", e);
            }
            if let Err(e) = FieldValidator::length(&draft.who, "who", None, Some(255)) {
                result.add_error("who", e);
            }
        }
        WizardStep::What => {
            if let Err(e) = FieldValidator::not_empty(&draft.what, "what") {
                result.add_error("what", e);
            }
        }
        WizardStep::Schedule => {
            if let Err(e) = FieldValidator::not_empty(&draft.when_, "when") {
                result.add_error("when", e);
            }
        }
        WizardStep::Where => {
            if let Err(e) = FieldValidator::not_empty(&draft.where_, "where") {
                result.add_error("where", e);
            }
        }
        WizardStep::Why => {
            if let Err(e) = FieldValidator::not_empty(&draft.why, "why") {
                result.add_error("why", e);
            }
        }
        WizardStep::How => {
            if let Err(e) = FieldValidator::not_empty(&draft.how, "how") {
                result.add_error("how", e);
            }
        }
        WizardStep::Extras => {
            for selection in &draft.equipment {
                if let Err(e) = FieldValidator::range(selection.amount, "amount", Some(1), None) {
                    result.add_error("equipment", e);
                }
            }
        }
        WizardStep::Review => {
            if draft.type_id.trim().is_empty() {
                result.add_error("type", "A request type must be selected");
            }
        }
    }

    result
}

/// Validate the whole draft; error keys carry the offending step name so a
/// blocked submit can send the user back to it.
pub fn validate_submission(draft: &SubmitRequestRequest) -> ValidationResult {
    let mut result = ValidationResult::new();
    for step in WizardStep::ALL {
        result.merge(validate_step(draft, step));
    }
    result
}

pub fn first_invalid_step(draft: &SubmitRequestRequest) -> Option<WizardStep> {
    WizardStep::ALL
        .into_iter()
        .find(|step| !validate_step(draft, *step).is_valid())
}

// ==================== WIZARD STATE MACHINE ====================

#[derive(Debug)]
pub struct Wizard {
    pub draft: SubmitRequestRequest,
    step: WizardStep,
    last_error: Option<String>,
    submitted_id: Option<String>,
}

impl Default for Wizard {
    fn default() -> Self {
        Self::new()
    }
}

impl Wizard {
    pub fn new() -> Self {
        Self::with_draft(SubmitRequestRequest::default())
    }

    pub fn with_draft(draft: SubmitRequestRequest) -> Self {
        Self {
            draft,
            step: WizardStep::Who,
            last_error: None,
            submitted_id: None,
        }
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Terminal state carrying the created row's identifier
    pub fn submitted_id(&self) -> Option<&str> {
        self.submitted_id.as_deref()
    }

    pub fn is_submitted(&self) -> bool {
        self.submitted_id.is_some()
    }

    /// A step may be entered only if every prior step is valid
    pub fn can_enter(&self, step: WizardStep) -> bool {
        WizardStep::ALL
            .iter()
            .take_while(|s| **s != step)
            .all(|s| validate_step(&self.draft, *s).is_valid())
    }

    pub fn goto(&mut self, step: WizardStep) -> Result<(), WizardStep> {
        if self.is_submitted() {
            return Err(self.step);
        }
        if self.can_enter(step) {
            self.step = step;
            Ok(())
        } else {
            // stay where the first gap is
            Err(first_invalid_step(&self.draft).unwrap_or(self.step))
        }
    }

    pub fn advance(&mut self) -> Result<WizardStep, WizardStep> {
        match self.step.next() {
            Some(next) => self.goto(next).map(|_| self.step),
            None => Err(self.step),
        }
    }

    pub fn back(&mut self) {
        if let Some(prev) = self.step.prev() {
            self.step = prev;
        }
    }

    /// Non-blocking lead-time check against the chosen request type
    pub fn notice_check(&self, request_type: &RequestType, now: DateTime<Utc>) -> Option<String> {
        notice_warning(self.draft.due_at, now, request_type)
    }

    /// Record a successful submission; the wizard becomes terminal
    pub fn mark_submitted(&mut self, request_id: String) {
        self.last_error = None;
        self.submitted_id = Some(request_id);
    }

    /// Record a failed submission; the wizard stays on Review for retry
    pub fn mark_failed(&mut self, error: String) {
        self.step = WizardStep::Review;
        self.last_error = Some(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EquipmentSelection;

    fn complete_draft() -> SubmitRequestRequest {
        SubmitRequestRequest {
            who: "Choir".to_string(),
            what: "Stage Lighting".to_string(),
            when_: "Saturday 19:00".to_string(),
            where_: "Main hall".to_string(),
            why: "Spring concert".to_string(),
            how: "Full rig".to_string(),
            type_id: "type-1".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_steps_are_ordered() {
        assert_eq!(WizardStep::Who.next(), Some(WizardStep::What));
        assert_eq!(WizardStep::Review.next(), None);
        assert_eq!(WizardStep::Who.prev(), None);
        assert_eq!(WizardStep::Review.prev(), Some(WizardStep::Extras));
    }

    #[test]
    fn test_cannot_skip_past_invalid_step() {
        let mut wizard = Wizard::new();
        // empty draft: Who is invalid, Review unreachable
        assert!(!wizard.can_enter(WizardStep::What));
        assert_eq!(wizard.goto(WizardStep::Review), Err(WizardStep::Who));
        assert_eq!(wizard.step(), WizardStep::Who);
    }

    #[test]
    fn test_advance_through_valid_draft() {
        let mut wizard = Wizard::new();
        wizard.draft = complete_draft();

        for expected in [
            WizardStep::What,
            WizardStep::Schedule,
            WizardStep::Where,
            WizardStep::Why,
            WizardStep::How,
            WizardStep::Extras,
            WizardStep::Review,
        ] {
            assert_eq!(wizard.advance(), Ok(expected));
        }
        assert_eq!(wizard.advance(), Err(WizardStep::Review));
    }

    #[test]
    fn test_first_invalid_step_reports_gap() {
        let mut draft = complete_draft();
        draft.why = String::new();
        assert_eq!(first_invalid_step(&draft), Some(WizardStep::Why));

        let complete = complete_draft();
        assert_eq!(first_invalid_step(&complete), None);
    }

    #[test]
    fn test_extras_rejects_zero_amount() {
        let mut draft = complete_draft();
        draft.equipment.push(EquipmentSelection {
            equipment_id: "eq-1".to_string(),
            amount: 0,
        });
        assert!(!validate_step(&draft, WizardStep::Extras).is_valid());
        assert_eq!(first_invalid_step(&draft), Some(WizardStep::Extras));
    }

    #[test]
    fn test_submission_validation_collects_all_gaps() {
        let draft = SubmitRequestRequest::default();
        let result = validate_submission(&draft);
        assert!(!result.is_valid());
        assert!(result.errors.contains_key("who"));
        assert!(result.errors.contains_key("how"));
        assert!(result.errors.contains_key("type"));
    }

    #[test]
    fn test_submitted_is_terminal() {
        let mut wizard = Wizard::new();
        wizard.draft = complete_draft();
        wizard.mark_submitted("req-123".to_string());

        assert!(wizard.is_submitted());
        assert_eq!(wizard.submitted_id(), Some("req-123"));
        assert!(wizard.goto(WizardStep::Who).is_err());
    }

    #[test]
    fn test_failed_submission_stays_on_review() {
        let mut wizard = Wizard::new();
        wizard.draft = complete_draft();
        wizard.mark_failed("database unavailable".to_string());

        assert!(!wizard.is_submitted());
        assert_eq!(wizard.step(), WizardStep::Review);
        assert_eq!(wizard.last_error(), Some("database unavailable"));

        // retry is possible: a later success clears the error
        wizard.mark_submitted("req-456".to_string());
        assert!(wizard.last_error().is_none());
    }
}

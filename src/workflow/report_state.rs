//! # Technician Report State Machine
//!
//! A report carries only its status tag. Legal moves are decided by the pure
//! [`ReportStatus::next`] table; field guards are checked by
//! [`TechnicianReport::apply`] once the move itself is known to be legal.
//!
//! ```text
//! DRAFT --submit--> SUBMITTED --approve--> APPROVED --start_work--> IN_PROGRESS --complete--> COMPLETED
//!                             \--reject--> REJECTED
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{WorkflowError, WorkflowResult};
use crate::models::TechnicianReport;

pub const MAX_DIAGNOSIS_LENGTH: usize = 500;
pub const MAX_ACTION_PLAN_LENGTH: usize = 500;

// ============================================================================
// Status tag
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "text", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportStatus {
    Draft,
    Submitted,
    Approved,
    Rejected,
    InProgress,
    Completed,
}

impl ReportStatus {
    pub const ALL: [ReportStatus; 6] = [
        ReportStatus::Draft,
        ReportStatus::Submitted,
        ReportStatus::Approved,
        ReportStatus::Rejected,
        ReportStatus::InProgress,
        ReportStatus::Completed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ReportStatus::Draft => "DRAFT",
            ReportStatus::Submitted => "SUBMITTED",
            ReportStatus::Approved => "APPROVED",
            ReportStatus::Rejected => "REJECTED",
            ReportStatus::InProgress => "IN_PROGRESS",
            ReportStatus::Completed => "COMPLETED",
        }
    }

    /// The transition table. Guards on report fields are not consulted here.
    pub fn next(self, action: ReportAction) -> WorkflowResult<ReportStatus> {
        match (self, action) {
            (ReportStatus::Draft, ReportAction::Submit) => Ok(ReportStatus::Submitted),
            (ReportStatus::Submitted, ReportAction::Approve) => Ok(ReportStatus::Approved),
            (ReportStatus::Submitted, ReportAction::Reject) => Ok(ReportStatus::Rejected),
            (ReportStatus::Approved, ReportAction::StartWork) => Ok(ReportStatus::InProgress),
            (ReportStatus::InProgress, ReportAction::Complete) => Ok(ReportStatus::Completed),
            (state, action) => Err(WorkflowError::StateTransition { action, state }),
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ReportStatus::Rejected | ReportStatus::Completed)
    }

    /// Only drafts accept edits from the technician.
    pub fn technician_can_modify(self) -> bool {
        self == ReportStatus::Draft
    }

    /// Checks an in-place operation (`Update`, `Delete`) against the tag.
    pub fn ensure_modifiable(self, action: ReportAction) -> WorkflowResult<()> {
        if self.technician_can_modify() {
            Ok(())
        } else {
            Err(WorkflowError::StateTransition { action, state: self })
        }
    }

    /// Drafts are hidden from the customer.
    pub fn customer_can_see(self) -> bool {
        self != ReportStatus::Draft
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportStatus {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        ReportStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == wanted)
            .ok_or_else(|| WorkflowError::validation(format!("unknown report status: {}", s)))
    }
}

// ============================================================================
// Actions
// ============================================================================

/// Operations gated by the report's status. `Update` and `Delete` never move
/// the report; they are only legal on a draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportAction {
    Submit,
    Approve,
    Reject,
    StartWork,
    Complete,
    Update,
    Delete,
}

impl fmt::Display for ReportAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReportAction::Submit => "submit",
            ReportAction::Approve => "approve",
            ReportAction::Reject => "reject",
            ReportAction::StartWork => "start work on",
            ReportAction::Complete => "complete",
            ReportAction::Update => "update",
            ReportAction::Delete => "delete",
        })
    }
}

// ============================================================================
// Guards
// ============================================================================

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

/// Fields a report must carry before it can leave DRAFT or be approved.
pub fn validate_for_submission(report: &TechnicianReport) -> WorkflowResult<()> {
    if is_blank(report.diagnosis.as_deref()) {
        return Err(WorkflowError::validation("Diagnosis is required before submitting"));
    }
    if report.estimated_cost.is_none() {
        return Err(WorkflowError::validation("Estimated cost is required before submitting"));
    }
    if is_blank(report.action_plan.as_deref()) {
        return Err(WorkflowError::validation("Action plan is required before submitting"));
    }
    Ok(())
}

pub fn validate_for_work_start(report: &TechnicianReport) -> WorkflowResult<()> {
    if report.estimated_time_seconds.is_none() {
        return Err(WorkflowError::validation(
            "Estimated time is required before starting work",
        ));
    }
    Ok(())
}

impl TechnicianReport {
    /// Moves the report along one edge of the state machine.
    ///
    /// On failure the report is untouched. On success the status and
    /// `last_updated_at` change; nothing else does.
    pub fn apply(&mut self, action: ReportAction) -> WorkflowResult<ReportStatus> {
        let next = self.status.next(action)?;
        match action {
            ReportAction::Submit | ReportAction::Approve => validate_for_submission(self)?,
            ReportAction::StartWork => validate_for_work_start(self)?,
            ReportAction::Reject | ReportAction::Complete | ReportAction::Update | ReportAction::Delete => {}
        }
        self.status = next;
        self.last_updated_at = Utc::now();
        Ok(next)
    }

    pub fn customer_can_see(&self) -> bool {
        self.status.customer_can_see()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    const ACTIONS: [ReportAction; 5] = [
        ReportAction::Submit,
        ReportAction::Approve,
        ReportAction::Reject,
        ReportAction::StartWork,
        ReportAction::Complete,
    ];

    fn complete_report(status: ReportStatus) -> TechnicianReport {
        let mut report = TechnicianReport::draft(Uuid::new_v4(), Uuid::new_v4());
        report.diagnosis = Some("Cracked screen".to_string());
        report.action_plan = Some("Replace the display assembly".to_string());
        report.estimated_cost = Some(150_000);
        report.estimated_time_seconds = Some(7_200);
        report.status = status;
        report
    }

    #[test]
    fn test_exactly_five_legal_edges() {
        let legal: Vec<_> = ReportStatus::ALL
            .iter()
            .flat_map(|s| ACTIONS.iter().map(move |a| (*s, *a)))
            .filter(|(s, a)| s.next(*a).is_ok())
            .collect();

        assert_eq!(
            legal,
            vec![
                (ReportStatus::Draft, ReportAction::Submit),
                (ReportStatus::Submitted, ReportAction::Approve),
                (ReportStatus::Submitted, ReportAction::Reject),
                (ReportStatus::Approved, ReportAction::StartWork),
                (ReportStatus::InProgress, ReportAction::Complete),
            ]
        );
    }

    #[test]
    fn test_illegal_action_leaves_report_unchanged() {
        for status in ReportStatus::ALL {
            for action in ACTIONS {
                if status.next(action).is_ok() {
                    continue;
                }
                let mut report = complete_report(status);
                let before = report.clone();
                let err = report.apply(action).unwrap_err();
                assert!(
                    matches!(err, WorkflowError::StateTransition { action: a, state: s } if a == action && s == status),
                    "unexpected error for {:?} + {:?}: {:?}",
                    status,
                    action,
                    err
                );
                assert_eq!(report, before);
            }
        }
    }

    #[test]
    fn test_reject_on_approved_report() {
        let mut report = complete_report(ReportStatus::Approved);
        let err = report.apply(ReportAction::Reject).unwrap_err();
        assert_eq!(err.to_string(), "cannot reject a report in APPROVED state");
        assert_eq!(report.status, ReportStatus::Approved);
    }

    #[test]
    fn test_submit_requires_complete_fields() {
        let mut blank_diagnosis = complete_report(ReportStatus::Draft);
        blank_diagnosis.diagnosis = Some("   ".to_string());

        let mut blank_plan = complete_report(ReportStatus::Draft);
        blank_plan.action_plan = None;

        let mut no_cost = complete_report(ReportStatus::Draft);
        no_cost.estimated_cost = None;

        for mut report in [blank_diagnosis, blank_plan, no_cost] {
            let err = report.apply(ReportAction::Submit).unwrap_err();
            assert!(matches!(err, WorkflowError::Validation(_)), "{:?}", err);
            assert_eq!(report.status, ReportStatus::Draft);
        }
    }

    #[test]
    fn test_approve_rechecks_completeness() {
        let mut report = complete_report(ReportStatus::Submitted);
        report.diagnosis = None;
        assert!(matches!(
            report.apply(ReportAction::Approve),
            Err(WorkflowError::Validation(_))
        ));
        assert_eq!(report.status, ReportStatus::Submitted);
    }

    #[test]
    fn test_start_work_requires_estimated_time() {
        let mut report = complete_report(ReportStatus::Approved);
        report.estimated_time_seconds = None;
        assert!(matches!(
            report.apply(ReportAction::StartWork),
            Err(WorkflowError::Validation(_))
        ));
        assert_eq!(report.status, ReportStatus::Approved);
    }

    #[test]
    fn test_full_happy_path() {
        let mut report = complete_report(ReportStatus::Draft);
        for (action, expected) in [
            (ReportAction::Submit, ReportStatus::Submitted),
            (ReportAction::Approve, ReportStatus::Approved),
            (ReportAction::StartWork, ReportStatus::InProgress),
            (ReportAction::Complete, ReportStatus::Completed),
        ] {
            assert_eq!(report.apply(action).unwrap(), expected);
        }
        assert!(report.status.is_terminal());
    }

    #[test]
    fn test_edits_refused_outside_draft() {
        assert!(ReportStatus::Draft.ensure_modifiable(ReportAction::Update).is_ok());
        let err = ReportStatus::Submitted
            .ensure_modifiable(ReportAction::Update)
            .unwrap_err();
        assert_eq!(err.to_string(), "cannot update a report in SUBMITTED state");

        // Edits are not edges of the machine.
        for status in ReportStatus::ALL {
            assert!(status.next(ReportAction::Update).is_err());
            assert!(status.next(ReportAction::Delete).is_err());
        }
    }

    #[test]
    fn test_capabilities_follow_tag() {
        for status in ReportStatus::ALL {
            assert_eq!(status.technician_can_modify(), status == ReportStatus::Draft);
            assert_eq!(status.customer_can_see(), status != ReportStatus::Draft);
        }
    }

    #[test]
    fn test_status_parsing_is_case_insensitive() {
        assert_eq!("in_progress".parse::<ReportStatus>().unwrap(), ReportStatus::InProgress);
        assert_eq!(" Submitted ".parse::<ReportStatus>().unwrap(), ReportStatus::Submitted);
        assert!("archived".parse::<ReportStatus>().is_err());
    }
}

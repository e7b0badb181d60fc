//! Pure eligibility predicates.
//!
//! UI affordances ("is the forward button enabled?") and server-side enforcement both call into
//! this module, so the two can never disagree. Nothing here touches a store or the network.

use serde::{Deserialize, Serialize};

use super::domain::{Operation, PstoDecision};
use super::machine::accepted_operations;
use super::repository::ApplicationRecord;

/// Machine-readable reason a business guard refused a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardFailure {
    ProvincialDecisionRecorded,
    NotReturned,
    ProvincialApprovalMissing,
    AssessmentAlreadyConducted,
    AssessmentNotConducted,
    AssessmentReportAlreadySubmitted,
    AssessmentReportMissing,
    AlreadyForwarded,
    NotForwarded,
    RegionalDecisionRecorded,
}

impl GuardFailure {
    pub const fn code(self) -> &'static str {
        match self {
            GuardFailure::ProvincialDecisionRecorded => "provincial_decision_recorded",
            GuardFailure::NotReturned => "not_returned",
            GuardFailure::ProvincialApprovalMissing => "provincial_approval_missing",
            GuardFailure::AssessmentAlreadyConducted => "assessment_already_conducted",
            GuardFailure::AssessmentNotConducted => "assessment_not_conducted",
            GuardFailure::AssessmentReportAlreadySubmitted => "assessment_report_already_submitted",
            GuardFailure::AssessmentReportMissing => "assessment_report_missing",
            GuardFailure::AlreadyForwarded => "already_forwarded",
            GuardFailure::NotForwarded => "not_forwarded",
            GuardFailure::RegionalDecisionRecorded => "regional_decision_recorded",
        }
    }
}

/// How a forward request on an already-forwarded record is answered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReforwardPolicy {
    /// Refuse with an invalid-transition error.
    #[default]
    Reject,
    /// Report the current record without committing or notifying again.
    Acknowledge,
}

impl ReforwardPolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "reject" => Some(Self::Reject),
            "acknowledge" | "idempotent" => Some(Self::Acknowledge),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            ReforwardPolicy::Reject => "reject",
            ReforwardPolicy::Acknowledge => "acknowledge",
        }
    }
}

/// Why the record may not be forwarded to the regional office yet, if anything.
pub fn forward_blocker(record: &ApplicationRecord) -> Option<GuardFailure> {
    if record.forwarded_to_dost {
        return Some(GuardFailure::AlreadyForwarded);
    }
    if record.psto_decision != Some(PstoDecision::Approved) {
        return Some(GuardFailure::ProvincialApprovalMissing);
    }
    if !record.tna_conducted {
        return Some(GuardFailure::AssessmentNotConducted);
    }
    if !record.tna_report_submitted {
        return Some(GuardFailure::AssessmentReportMissing);
    }
    None
}

pub fn can_forward(record: &ApplicationRecord) -> bool {
    forward_blocker(record).is_none()
}

pub fn can_review_by_provincial_office(record: &ApplicationRecord) -> bool {
    record.psto_decision.is_none()
}

pub fn can_resubmit(record: &ApplicationRecord) -> bool {
    record.psto_decision == Some(PstoDecision::Returned)
}

pub fn can_mark_assessment_conducted(record: &ApplicationRecord) -> bool {
    record.psto_decision == Some(PstoDecision::Approved) && !record.tna_conducted
}

pub fn can_submit_assessment_report(record: &ApplicationRecord) -> bool {
    record.tna_conducted && !record.tna_report_submitted
}

pub fn can_review_by_regional_office(record: &ApplicationRecord) -> bool {
    record.forwarded_to_dost && record.dost_decision.is_none()
}

/// Business guard for `operation`, evaluated after structural legality.
pub fn blocker(record: &ApplicationRecord, operation: Operation) -> Option<GuardFailure> {
    match operation {
        Operation::SubmitApplication => None,
        Operation::ReviewByProvincialOffice => (!can_review_by_provincial_office(record))
            .then_some(GuardFailure::ProvincialDecisionRecorded),
        Operation::ResubmitAfterReturn => {
            (!can_resubmit(record)).then_some(GuardFailure::NotReturned)
        }
        Operation::MarkAssessmentConducted => {
            if record.psto_decision != Some(PstoDecision::Approved) {
                Some(GuardFailure::ProvincialApprovalMissing)
            } else if !can_mark_assessment_conducted(record) {
                Some(GuardFailure::AssessmentAlreadyConducted)
            } else {
                None
            }
        }
        Operation::SubmitAssessmentReport => {
            if !record.tna_conducted {
                Some(GuardFailure::AssessmentNotConducted)
            } else if !can_submit_assessment_report(record) {
                Some(GuardFailure::AssessmentReportAlreadySubmitted)
            } else {
                None
            }
        }
        Operation::ForwardToRegionalOffice => forward_blocker(record),
        Operation::ReviewByRegionalOffice => {
            if !record.forwarded_to_dost {
                Some(GuardFailure::NotForwarded)
            } else if !can_review_by_regional_office(record) {
                Some(GuardFailure::RegionalDecisionRecorded)
            } else {
                None
            }
        }
    }
}

/// Operations that would pass both the transition table and the business guards right now.
pub fn available_operations(record: &ApplicationRecord) -> Vec<Operation> {
    accepted_operations(record.state)
        .iter()
        .copied()
        .filter(|operation| blocker(record, *operation).is_none())
        .collect()
}

/// Every data-model invariant the record currently breaks. Empty for a healthy record.
pub fn invariant_violations(record: &ApplicationRecord) -> Vec<String> {
    let mut violations = Vec::new();

    if record.forwarded_to_dost
        && !(record.psto_decision == Some(PstoDecision::Approved)
            && record.tna_conducted
            && record.tna_report_submitted)
    {
        violations.push("forwarded without approval and completed assessment".to_string());
    }
    if record.forwarded_at.is_some() != record.forwarded_to_dost {
        violations.push("forwarded_at disagrees with forwarded_to_dost".to_string());
    }
    if record.tna_report_submitted && !record.tna_conducted {
        violations.push("assessment report without conducted assessment".to_string());
    }
    if record.tna_conducted && record.psto_decision != Some(PstoDecision::Approved) {
        violations.push("assessment conducted without provincial approval".to_string());
    }
    if record.dost_decision.is_some() && !record.forwarded_to_dost {
        violations.push("regional decision on a record never forwarded".to_string());
    }
    let derived = record.derived_state();
    if record.state != derived {
        violations.push(format!(
            "state {} does not match derived {}",
            record.state, derived
        ));
    }
    if record.history.len() as u64 != record.version {
        violations.push(format!(
            "history length {} does not match version {}",
            record.history.len(),
            record.version
        ));
    }

    violations
}

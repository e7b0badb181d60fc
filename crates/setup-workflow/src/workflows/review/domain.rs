use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque storage key for an application record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub Uuid);

impl RecordId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Human-readable application code shown to proponents and reviewers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationId(pub String);

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of an already-authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(pub String);

impl ActorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Roles recognised by the review workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Proponent,
    ProvincialReviewer,
    AssessmentScheduler,
    RegionalReviewer,
}

impl Role {
    pub const fn label(self) -> &'static str {
        match self {
            Role::Proponent => "proponent",
            Role::ProvincialReviewer => "provincial_reviewer",
            Role::AssessmentScheduler => "assessment_scheduler",
            Role::RegionalReviewer => "regional_reviewer",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "proponent" => Some(Role::Proponent),
            "provincial_reviewer" | "psto" => Some(Role::ProvincialReviewer),
            "assessment_scheduler" | "tna" => Some(Role::AssessmentScheduler),
            "regional_reviewer" | "dost" => Some(Role::RegionalReviewer),
            _ => None,
        }
    }
}

/// Lifecycle position of an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewState {
    PendingPstoReview,
    PstoApproved,
    PstoReturned,
    PstoRejected,
    TnaConducted,
    TnaReportSubmitted,
    ForwardedToDost,
    DostApproved,
    DostRejected,
}

impl ReviewState {
    pub const ALL: [ReviewState; 9] = [
        ReviewState::PendingPstoReview,
        ReviewState::PstoApproved,
        ReviewState::PstoReturned,
        ReviewState::PstoRejected,
        ReviewState::TnaConducted,
        ReviewState::TnaReportSubmitted,
        ReviewState::ForwardedToDost,
        ReviewState::DostApproved,
        ReviewState::DostRejected,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            ReviewState::PendingPstoReview => "pending_psto_review",
            ReviewState::PstoApproved => "psto_approved",
            ReviewState::PstoReturned => "psto_returned",
            ReviewState::PstoRejected => "psto_rejected",
            ReviewState::TnaConducted => "tna_conducted",
            ReviewState::TnaReportSubmitted => "tna_report_submitted",
            ReviewState::ForwardedToDost => "forwarded_to_dost",
            ReviewState::DostApproved => "dost_approved",
            ReviewState::DostRejected => "dost_rejected",
        }
    }

    /// Terminal states freeze the record for the rest of its life.
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            ReviewState::PstoRejected | ReviewState::DostApproved | ReviewState::DostRejected
        )
    }
}

impl fmt::Display for ReviewState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// First-tier outcome recorded by the provincial office.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PstoDecision {
    Approved,
    Returned,
    Rejected,
}

/// Final outcome recorded by the regional office.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DostDecision {
    Approved,
    Rejected,
}

/// Decision as supplied by a reviewer; each tier narrows it to what it accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approved,
    Returned,
    Rejected,
}

impl ReviewDecision {
    pub const fn label(self) -> &'static str {
        match self {
            ReviewDecision::Approved => "approved",
            ReviewDecision::Returned => "returned",
            ReviewDecision::Rejected => "rejected",
        }
    }

    pub const fn requires_comment(self) -> bool {
        !matches!(self, ReviewDecision::Approved)
    }
}

impl From<ReviewDecision> for PstoDecision {
    fn from(value: ReviewDecision) -> Self {
        match value {
            ReviewDecision::Approved => PstoDecision::Approved,
            ReviewDecision::Returned => PstoDecision::Returned,
            ReviewDecision::Rejected => PstoDecision::Rejected,
        }
    }
}

impl TryFrom<ReviewDecision> for DostDecision {
    type Error = ReviewDecision;

    fn try_from(value: ReviewDecision) -> Result<Self, Self::Error> {
        match value {
            ReviewDecision::Approved => Ok(DostDecision::Approved),
            ReviewDecision::Rejected => Ok(DostDecision::Rejected),
            ReviewDecision::Returned => Err(value),
        }
    }
}

/// Every operation the workflow exposes, including record creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    SubmitApplication,
    ReviewByProvincialOffice,
    ResubmitAfterReturn,
    MarkAssessmentConducted,
    SubmitAssessmentReport,
    ForwardToRegionalOffice,
    ReviewByRegionalOffice,
}

impl Operation {
    pub const fn label(self) -> &'static str {
        match self {
            Operation::SubmitApplication => "submit_application",
            Operation::ReviewByProvincialOffice => "review_by_provincial_office",
            Operation::ResubmitAfterReturn => "resubmit_after_return",
            Operation::MarkAssessmentConducted => "mark_assessment_conducted",
            Operation::SubmitAssessmentReport => "submit_assessment_report",
            Operation::ForwardToRegionalOffice => "forward_to_regional_office",
            Operation::ReviewByRegionalOffice => "review_by_regional_office",
        }
    }

    /// Role the authorizer is asked about before the operation runs.
    pub const fn required_role(self) -> Role {
        match self {
            Operation::SubmitApplication | Operation::ResubmitAfterReturn => Role::Proponent,
            Operation::ReviewByProvincialOffice | Operation::ForwardToRegionalOffice => {
                Role::ProvincialReviewer
            }
            Operation::MarkAssessmentConducted | Operation::SubmitAssessmentReport => {
                Role::AssessmentScheduler
            }
            Operation::ReviewByRegionalOffice => Role::RegionalReviewer,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Kind of document attached to an application. Contents live in the document service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    LetterOfIntent,
    EnterpriseProfile,
    BusinessPermit,
    FinancialStatement,
    AssessmentReport,
    Other,
}

/// Opaque pointer to a stored document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentReference {
    pub kind: DocumentKind,
    pub name: String,
    pub storage_key: String,
}

/// Proponent-provided payload that opens a new application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationSubmission {
    pub enterprise_name: String,
    #[serde(default)]
    pub documents: Vec<DocumentReference>,
}

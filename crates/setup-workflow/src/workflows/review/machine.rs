//! Review state machine.
//!
//! `state` on a record is never written directly: it is recomputed from the decision fields after
//! every mutation via [`derive_state`]. The transition table lives in [`accepted_operations`],
//! an exhaustive match over states, and [`plan`] turns a requested command into the mutation a
//! store must commit.

use chrono::{DateTime, Utc};

use super::audit::AuditDecision;
use super::domain::{
    DocumentReference, DostDecision, Operation, PstoDecision, ReviewDecision, ReviewState,
};
use super::guards::{self, GuardFailure, ReforwardPolicy};
use super::repository::ApplicationRecord;

/// The subset of record fields the lifecycle state is derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecisionFields {
    pub psto_decision: Option<PstoDecision>,
    pub dost_decision: Option<DostDecision>,
    pub tna_conducted: bool,
    pub tna_report_submitted: bool,
    pub forwarded_to_dost: bool,
}

impl DecisionFields {
    pub fn of(record: &ApplicationRecord) -> Self {
        Self {
            psto_decision: record.psto_decision,
            dost_decision: record.dost_decision,
            tna_conducted: record.tna_conducted,
            tna_report_submitted: record.tna_report_submitted,
            forwarded_to_dost: record.forwarded_to_dost,
        }
    }

    pub fn state(self) -> ReviewState {
        derive_state(
            self.psto_decision,
            self.dost_decision,
            self.tna_conducted,
            self.tna_report_submitted,
            self.forwarded_to_dost,
        )
    }
}

pub fn derive_state(
    psto_decision: Option<PstoDecision>,
    dost_decision: Option<DostDecision>,
    tna_conducted: bool,
    tna_report_submitted: bool,
    forwarded_to_dost: bool,
) -> ReviewState {
    match dost_decision {
        Some(DostDecision::Approved) => return ReviewState::DostApproved,
        Some(DostDecision::Rejected) => return ReviewState::DostRejected,
        None => {}
    }
    if forwarded_to_dost {
        return ReviewState::ForwardedToDost;
    }
    match psto_decision {
        None => ReviewState::PendingPstoReview,
        Some(PstoDecision::Returned) => ReviewState::PstoReturned,
        Some(PstoDecision::Rejected) => ReviewState::PstoRejected,
        Some(PstoDecision::Approved) if tna_report_submitted => ReviewState::TnaReportSubmitted,
        Some(PstoDecision::Approved) if tna_conducted => ReviewState::TnaConducted,
        Some(PstoDecision::Approved) => ReviewState::PstoApproved,
    }
}

/// Operations that are structurally legal from a state. Business guards still apply.
pub const fn accepted_operations(state: ReviewState) -> &'static [Operation] {
    match state {
        ReviewState::PendingPstoReview => &[Operation::ReviewByProvincialOffice],
        ReviewState::PstoReturned => &[Operation::ResubmitAfterReturn],
        ReviewState::PstoApproved => &[
            Operation::MarkAssessmentConducted,
            Operation::ForwardToRegionalOffice,
        ],
        ReviewState::TnaConducted => &[
            Operation::SubmitAssessmentReport,
            Operation::ForwardToRegionalOffice,
        ],
        ReviewState::TnaReportSubmitted => &[Operation::ForwardToRegionalOffice],
        ReviewState::ForwardedToDost => &[Operation::ReviewByRegionalOffice],
        ReviewState::PstoRejected | ReviewState::DostApproved | ReviewState::DostRejected => &[],
    }
}

/// Field-level change a commit applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordMutation {
    SetProvincialDecision(PstoDecision),
    ClearProvincialDecision,
    MarkAssessmentConducted,
    AttachAssessmentReport(DocumentReference),
    Forward { at: DateTime<Utc> },
    SetRegionalDecision(DostDecision),
}

impl RecordMutation {
    pub fn apply_to_fields(&self, fields: &mut DecisionFields) {
        match self {
            RecordMutation::SetProvincialDecision(decision) => {
                fields.psto_decision = Some(*decision)
            }
            RecordMutation::ClearProvincialDecision => fields.psto_decision = None,
            RecordMutation::MarkAssessmentConducted => fields.tna_conducted = true,
            RecordMutation::AttachAssessmentReport(_) => fields.tna_report_submitted = true,
            RecordMutation::Forward { .. } => fields.forwarded_to_dost = true,
            RecordMutation::SetRegionalDecision(decision) => {
                fields.dost_decision = Some(*decision)
            }
        }
    }

    /// Writes the mutated fields. Callers recompute `state` afterwards.
    pub fn apply(&self, record: &mut ApplicationRecord) {
        let mut fields = DecisionFields::of(record);
        self.apply_to_fields(&mut fields);
        record.psto_decision = fields.psto_decision;
        record.dost_decision = fields.dost_decision;
        record.tna_conducted = fields.tna_conducted;
        record.tna_report_submitted = fields.tna_report_submitted;
        record.forwarded_to_dost = fields.forwarded_to_dost;

        match self {
            RecordMutation::AttachAssessmentReport(report) => {
                record.assessment_report = Some(report.clone())
            }
            RecordMutation::Forward { at } => record.forwarded_at = Some(*at),
            _ => {}
        }
    }

    pub fn resulting_state(&self, record: &ApplicationRecord) -> ReviewState {
        let mut fields = DecisionFields::of(record);
        self.apply_to_fields(&mut fields);
        fields.state()
    }
}

/// A requested transition with its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionCommand {
    ReviewByProvincialOffice {
        decision: ReviewDecision,
        comment: Option<String>,
    },
    ResubmitAfterReturn,
    MarkAssessmentConducted,
    SubmitAssessmentReport {
        report: DocumentReference,
    },
    ForwardToRegionalOffice {
        at: DateTime<Utc>,
    },
    ReviewByRegionalOffice {
        decision: ReviewDecision,
        comment: Option<String>,
    },
}

impl TransitionCommand {
    pub const fn operation(&self) -> Operation {
        match self {
            TransitionCommand::ReviewByProvincialOffice { .. } => {
                Operation::ReviewByProvincialOffice
            }
            TransitionCommand::ResubmitAfterReturn => Operation::ResubmitAfterReturn,
            TransitionCommand::MarkAssessmentConducted => Operation::MarkAssessmentConducted,
            TransitionCommand::SubmitAssessmentReport { .. } => Operation::SubmitAssessmentReport,
            TransitionCommand::ForwardToRegionalOffice { .. } => {
                Operation::ForwardToRegionalOffice
            }
            TransitionCommand::ReviewByRegionalOffice { .. } => Operation::ReviewByRegionalOffice,
        }
    }

    pub fn comment(&self) -> Option<&str> {
        match self {
            TransitionCommand::ReviewByProvincialOffice { comment, .. }
            | TransitionCommand::ReviewByRegionalOffice { comment, .. } => comment
                .as_deref()
                .map(str::trim)
                .filter(|comment| !comment.is_empty()),
            _ => None,
        }
    }

    /// Payload checks that do not depend on the record.
    pub fn validate(&self) -> Result<(), TransitionRejection> {
        match self {
            TransitionCommand::ReviewByProvincialOffice { decision, .. } => {
                self.require_comment_for(*decision)
            }
            TransitionCommand::ReviewByRegionalOffice { decision, .. } => {
                if DostDecision::try_from(*decision).is_err() {
                    return Err(TransitionRejection::Validation(format!(
                        "regional office decision must be approved or rejected, got {}",
                        decision.label()
                    )));
                }
                self.require_comment_for(*decision)
            }
            TransitionCommand::SubmitAssessmentReport { report } => {
                if report.storage_key.trim().is_empty() {
                    return Err(TransitionRejection::Validation(
                        "assessment report reference must not be empty".to_string(),
                    ));
                }
                Ok(())
            }
            TransitionCommand::ResubmitAfterReturn
            | TransitionCommand::MarkAssessmentConducted
            | TransitionCommand::ForwardToRegionalOffice { .. } => Ok(()),
        }
    }

    fn require_comment_for(&self, decision: ReviewDecision) -> Result<(), TransitionRejection> {
        if decision.requires_comment() && self.comment().is_none() {
            return Err(TransitionRejection::Validation(format!(
                "a comment is required when the decision is {}",
                decision.label()
            )));
        }
        Ok(())
    }

    fn mutation(&self) -> Result<(RecordMutation, AuditDecision), TransitionRejection> {
        let planned = match self {
            TransitionCommand::ReviewByProvincialOffice { decision, .. } => {
                let audit = match decision {
                    ReviewDecision::Approved => AuditDecision::Approved,
                    ReviewDecision::Returned => AuditDecision::Returned,
                    ReviewDecision::Rejected => AuditDecision::Rejected,
                };
                (
                    RecordMutation::SetProvincialDecision(PstoDecision::from(*decision)),
                    audit,
                )
            }
            TransitionCommand::ResubmitAfterReturn => (
                RecordMutation::ClearProvincialDecision,
                AuditDecision::Resubmitted,
            ),
            TransitionCommand::MarkAssessmentConducted => (
                RecordMutation::MarkAssessmentConducted,
                AuditDecision::AssessmentConducted,
            ),
            TransitionCommand::SubmitAssessmentReport { report } => (
                RecordMutation::AttachAssessmentReport(report.clone()),
                AuditDecision::AssessmentReportSubmitted,
            ),
            TransitionCommand::ForwardToRegionalOffice { at } => {
                (RecordMutation::Forward { at: *at }, AuditDecision::Forwarded)
            }
            TransitionCommand::ReviewByRegionalOffice { decision, .. } => {
                let dost = DostDecision::try_from(*decision).map_err(|decision| {
                    TransitionRejection::Validation(format!(
                        "regional office decision must be approved or rejected, got {}",
                        decision.label()
                    ))
                })?;
                let audit = match dost {
                    DostDecision::Approved => AuditDecision::Approved,
                    DostDecision::Rejected => AuditDecision::Rejected,
                };
                (RecordMutation::SetRegionalDecision(dost), audit)
            }
        };
        Ok(planned)
    }
}

/// What the engine should do with an accepted command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    Commit {
        mutation: RecordMutation,
        decision: AuditDecision,
        comment: Option<String>,
        resulting_state: ReviewState,
    },
    /// Re-forward under the acknowledging policy: nothing to write.
    Acknowledge,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionRejection {
    Validation(String),
    Invalid {
        operation: Operation,
        state: ReviewState,
    },
    Guard(GuardFailure),
}

/// Decide whether `command` may run against `record` and, if so, what to commit.
pub fn plan(
    record: &ApplicationRecord,
    command: &TransitionCommand,
    reforward: ReforwardPolicy,
) -> Result<Plan, TransitionRejection> {
    let operation = command.operation();
    let state = record.state;
    let invalid = TransitionRejection::Invalid { operation, state };

    if state.is_terminal() {
        return Err(invalid);
    }

    command.validate()?;

    if operation == Operation::ForwardToRegionalOffice && state == ReviewState::ForwardedToDost {
        return match reforward {
            ReforwardPolicy::Reject => Err(invalid),
            ReforwardPolicy::Acknowledge => Ok(Plan::Acknowledge),
        };
    }

    if !accepted_operations(state).contains(&operation) {
        return Err(invalid);
    }

    if let Some(failure) = guards::blocker(record, operation) {
        return Err(TransitionRejection::Guard(failure));
    }

    let (mutation, decision) = command.mutation()?;
    let resulting_state = mutation.resulting_state(record);

    Ok(Plan::Commit {
        mutation,
        decision,
        comment: command.comment().map(str::to_string),
        resulting_state,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_state_covers_every_reachable_combination() {
        use PstoDecision::*;
        let cases = [
            ((None, None, false, false, false), ReviewState::PendingPstoReview),
            ((Some(Returned), None, false, false, false), ReviewState::PstoReturned),
            ((Some(Rejected), None, false, false, false), ReviewState::PstoRejected),
            ((Some(Approved), None, false, false, false), ReviewState::PstoApproved),
            ((Some(Approved), None, true, false, false), ReviewState::TnaConducted),
            ((Some(Approved), None, true, true, false), ReviewState::TnaReportSubmitted),
            ((Some(Approved), None, true, true, true), ReviewState::ForwardedToDost),
            (
                (Some(Approved), Some(DostDecision::Approved), true, true, true),
                ReviewState::DostApproved,
            ),
            (
                (Some(Approved), Some(DostDecision::Rejected), true, true, true),
                ReviewState::DostRejected,
            ),
        ];

        for ((psto, dost, tna, report, forwarded), expected) in cases {
            assert_eq!(
                derive_state(psto, dost, tna, report, forwarded),
                expected,
                "fields {psto:?} {dost:?} {tna} {report} {forwarded}"
            );
        }
    }

    #[test]
    fn terminal_states_accept_nothing() {
        for state in ReviewState::ALL {
            assert_eq!(
                accepted_operations(state).is_empty(),
                state.is_terminal(),
                "{state}"
            );
        }
    }

    #[test]
    fn regional_review_rejects_returned_decision() {
        let command = TransitionCommand::ReviewByRegionalOffice {
            decision: ReviewDecision::Returned,
            comment: Some("send back".to_string()),
        };
        assert!(matches!(
            command.validate(),
            Err(TransitionRejection::Validation(_))
        ));
    }

    #[test]
    fn blank_comment_does_not_satisfy_rejection() {
        let command = TransitionCommand::ReviewByProvincialOffice {
            decision: ReviewDecision::Rejected,
            comment: Some("   ".to_string()),
        };
        assert!(matches!(
            command.validate(),
            Err(TransitionRejection::Validation(_))
        ));

        let approve = TransitionCommand::ReviewByProvincialOffice {
            decision: ReviewDecision::Approved,
            comment: None,
        };
        assert!(approve.validate().is_ok());
    }
}

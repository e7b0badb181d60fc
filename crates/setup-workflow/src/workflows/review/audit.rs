//! Append-only review history.
//!
//! Every committed transition contributes exactly one [`HistoryEntry`]. Entries are numbered by the
//! record version they produced, so the trail doubles as the compliance answer to "who decided
//! what, and when".

use std::io;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{ActorId, ReviewState, Role};

/// What a history entry records having happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditDecision {
    Submitted,
    Approved,
    Returned,
    Rejected,
    Resubmitted,
    AssessmentConducted,
    AssessmentReportSubmitted,
    Forwarded,
}

impl AuditDecision {
    pub const fn label(self) -> &'static str {
        match self {
            AuditDecision::Submitted => "submitted",
            AuditDecision::Approved => "approved",
            AuditDecision::Returned => "returned",
            AuditDecision::Rejected => "rejected",
            AuditDecision::Resubmitted => "resubmitted",
            AuditDecision::AssessmentConducted => "assessment_conducted",
            AuditDecision::AssessmentReportSubmitted => "assessment_report_submitted",
            AuditDecision::Forwarded => "forwarded",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub version: u64,
    pub actor: ActorId,
    pub role: Role,
    pub decision: AuditDecision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub resulting_state: ReviewState,
}

/// Ordered history of a single record. Only the commit path can extend it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditTrail(Vec<HistoryEntry>);

impl AuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.0.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.0.iter()
    }

    /// Entries must arrive in version order with no gaps.
    pub(crate) fn append(&mut self, entry: HistoryEntry) -> Result<(), AuditError> {
        let expected = self.0.len() as u64 + 1;
        if entry.version != expected {
            return Err(AuditError::OutOfOrder {
                expected,
                found: entry.version,
            });
        }
        self.0.push(entry);
        Ok(())
    }

    /// Write the trail as CSV for compliance review.
    pub fn write_csv<W: io::Write>(&self, writer: W) -> Result<(), AuditError> {
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record([
            "version",
            "timestamp",
            "actor",
            "role",
            "decision",
            "resulting_state",
            "comment",
        ])?;
        for entry in &self.0 {
            csv.write_record([
                entry.version.to_string().as_str(),
                entry.timestamp.to_rfc3339().as_str(),
                entry.actor.0.as_str(),
                entry.role.label(),
                entry.decision.label(),
                entry.resulting_state.label(),
                entry.comment.as_deref().unwrap_or(""),
            ])?;
        }
        csv.flush()?;
        Ok(())
    }
}

impl<'a> IntoIterator for &'a AuditTrail {
    type Item = &'a HistoryEntry;
    type IntoIter = std::slice::Iter<'a, HistoryEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("history entry out of order (expected version {expected}, found {found})")]
    OutOfOrder { expected: u64, found: u64 },
    #[error("failed to encode audit trail: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to write audit trail: {0}")]
    Io(#[from] io::Error),
}

// Approval gate
//
// Decides whether a candidate may run unattended. Low-risk SELECTs pass with a
// synthesized approval; everything else produces an ApprovalRequest and the run
// suspends until a Decision is supplied from outside.

use serde::{Deserialize, Serialize};

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

use crate::error::{Result, SqlGateError};
use crate::query::{QueryCandidate, RiskLevel};

/// Decision kinds a reviewer may be offered
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    Approve,
    Edit,
    Reject,
}

impl std::fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecisionKind::Approve => write!(f, "approve"),
            DecisionKind::Edit => write!(f, "edit"),
            DecisionKind::Reject => write!(f, "reject"),
        }
    }
}

/// A reviewer's resolution of an approval request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Decision {
    /// Run the candidate as generated
    Approve,

    /// Run different SQL instead of the candidate
    Edit { edited_sql: String },

    /// Do not run anything
    Reject {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl Decision {
    /// Create an edit decision
    pub fn edit(edited_sql: impl Into<String>) -> Self {
        Decision::Edit {
            edited_sql: edited_sql.into(),
        }
    }

    /// Create a reject decision with a reason
    pub fn reject(reason: impl Into<String>) -> Self {
        Decision::Reject {
            reason: Some(reason.into()),
        }
    }

    /// The kind of this decision
    pub fn kind(&self) -> DecisionKind {
        match self {
            Decision::Approve => DecisionKind::Approve,
            Decision::Edit { .. } => DecisionKind::Edit,
            Decision::Reject { .. } => DecisionKind::Reject,
        }
    }
}

/// Structured payload describing a pending human decision
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct ApprovalRequest {
    /// Candidate under review
    pub candidate: QueryCandidate,

    /// Message shown to the reviewer
    pub message: String,

    /// Decisions the reviewer may make (never empty)
    pub allowed_decisions: Vec<DecisionKind>,
}

impl ApprovalRequest {
    /// Whether the given decision kind is offered
    pub fn allows(&self, kind: DecisionKind) -> bool {
        self.allowed_decisions.contains(&kind)
    }
}

/// Result of running a candidate through the gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// Policy approved the candidate; no human involved
    AutoApproved(Decision),

    /// A human has to decide
    ApprovalRequired(ApprovalRequest),
}

/// Approval policy
#[derive(Debug, Clone, Copy, Default)]
pub struct ApprovalGate;

impl ApprovalGate {
    pub fn new() -> Self {
        Self
    }

    /// Apply the auto-approval policy to a candidate
    pub fn evaluate(&self, candidate: &QueryCandidate) -> GateOutcome {
        if candidate.is_auto_approvable() {
            return GateOutcome::AutoApproved(Decision::Approve);
        }

        GateOutcome::ApprovalRequired(ApprovalRequest {
            candidate: candidate.clone(),
            message: Self::review_message(candidate),
            allowed_decisions: Self::allowed_decisions(candidate.risk_level),
        })
    }

    /// Critical candidates may only be approved or rejected outright
    pub fn allowed_decisions(risk: RiskLevel) -> Vec<DecisionKind> {
        match risk {
            RiskLevel::Critical => vec![DecisionKind::Approve, DecisionKind::Reject],
            _ => vec![DecisionKind::Approve, DecisionKind::Edit, DecisionKind::Reject],
        }
    }

    /// Check a decision against the pending request
    pub fn validate(&self, request: &ApprovalRequest, decision: &Decision) -> Result<()> {
        let kind = decision.kind();
        if !request.allows(kind) {
            return Err(SqlGateError::DecisionNotAllowed {
                decision: kind,
                allowed: request.allowed_decisions.clone(),
            });
        }

        match decision {
            Decision::Edit { edited_sql } if edited_sql.trim().is_empty() => Err(
                SqlGateError::invalid_decision("edited_sql must not be empty"),
            ),
            _ => Ok(()),
        }
    }

    fn review_message(candidate: &QueryCandidate) -> String {
        format!(
            "{} **Approval required**\n\n\
             This operation carries {} risk and needs your approval before it runs.\n\n\
             **Operation**: {}\n\
             **Table**: {}\n\
             **Estimated rows**: {}",
            candidate.risk_level.emoji(),
            candidate.risk_level.label(),
            candidate.operation_type,
            candidate.affected_table,
            candidate.estimated_rows,
        )
    }
}

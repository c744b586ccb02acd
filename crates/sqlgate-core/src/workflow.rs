// Workflow run state machine
//
// RunState is the whole state of one assistant run on a thread. It is plain
// serde data: a run suspended at WaitingApproval can be written anywhere and
// resumed later from the deserialized copy.
//
//   analyzing -> analyzed -> auto_approved    -> executed | rejected | error
//                         -> waiting_approval -> executed | rejected | error
//
// Transitions are methods on RunState. Each one checks the stage it starts
// from, so the controller cannot skip the gate or execute twice.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

use crate::approval::{ApprovalGate, ApprovalRequest, Decision, GateOutcome};
use crate::error::{Result, SqlGateError};
use crate::executor::{ExecutionResult, ExecutionStage};
use crate::query::QueryCandidate;

/// Node names used to tag transcript messages
pub mod nodes {
    pub const ANALYZE_REQUEST: &str = "analyze_request";
    pub const CHECK_APPROVAL: &str = "check_approval";
    pub const EXECUTE_SQL: &str = "execute_sql";
}

/// Stage marker of a run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Analyzing,
    Analyzed,
    AutoApproved,
    WaitingApproval,
    Executed,
    Rejected,
    Error,
}

impl Stage {
    /// Whether the stage ends the run
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Executed | Stage::Rejected | Stage::Error)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Analyzing => write!(f, "analyzing"),
            Stage::Analyzed => write!(f, "analyzed"),
            Stage::AutoApproved => write!(f, "auto_approved"),
            Stage::WaitingApproval => write!(f, "waiting_approval"),
            Stage::Executed => write!(f, "executed"),
            Stage::Rejected => write!(f, "rejected"),
            Stage::Error => write!(f, "error"),
        }
    }
}

impl From<ExecutionStage> for Stage {
    fn from(stage: ExecutionStage) -> Self {
        match stage {
            ExecutionStage::Executed => Stage::Executed,
            ExecutionStage::Rejected => Stage::Rejected,
            ExecutionStage::Error => Stage::Error,
        }
    }
}

/// Assistant transcript entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct RunMessage {
    /// Workflow node that produced the message
    pub node: String,
    /// Markdown content
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Full state of one run, keyed by thread
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct RunState {
    pub thread_id: Uuid,
    pub user_request: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate: Option<QueryCandidate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_request: Option<ApprovalRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_result: Option<ExecutionResult>,
    pub stage: Stage,
    pub is_complete: bool,
    #[serde(default)]
    pub messages: Vec<RunMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunState {
    /// Fresh run for a user request
    pub fn new(thread_id: Uuid, user_request: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            thread_id,
            user_request: user_request.into(),
            candidate: None,
            approval_request: None,
            decision: None,
            execution_result: None,
            stage: Stage::Analyzing,
            is_complete: false,
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the run is suspended on a human decision
    pub fn is_awaiting_approval(&self) -> bool {
        self.stage == Stage::WaitingApproval && self.decision.is_none()
    }

    /// analyzing -> analyzed
    pub fn record_analysis(&mut self, candidate: QueryCandidate) -> Result<()> {
        self.expect_stage(Stage::Analyzing)?;
        self.push_message(nodes::ANALYZE_REQUEST, analysis_message(&candidate));
        self.candidate = Some(candidate);
        self.stage = Stage::Analyzed;
        Ok(())
    }

    /// analyzed -> auto_approved | waiting_approval
    pub fn apply_gate(&mut self, outcome: GateOutcome) -> Result<()> {
        self.expect_stage(Stage::Analyzed)?;
        match outcome {
            GateOutcome::AutoApproved(decision) => {
                self.approval_request = None;
                self.decision = Some(decision);
                self.stage = Stage::AutoApproved;
            }
            GateOutcome::ApprovalRequired(request) => {
                self.push_message(nodes::CHECK_APPROVAL, request.message.clone());
                self.approval_request = Some(request);
                self.stage = Stage::WaitingApproval;
            }
        }
        self.touch();
        Ok(())
    }

    /// Resolve the pending approval request with an external decision
    ///
    /// The stage stays `waiting_approval` until the executor produces a
    /// terminal result.
    pub fn accept_decision(&mut self, gate: &ApprovalGate, decision: Decision) -> Result<()> {
        if !self.is_awaiting_approval() {
            return Err(SqlGateError::NotAwaitingApproval {
                thread_id: self.thread_id,
                stage: self.stage,
            });
        }

        let request = self.approval_request.as_ref().ok_or_else(|| {
            SqlGateError::Internal(anyhow::anyhow!(
                "run {} is waiting without an approval request",
                self.thread_id
            ))
        })?;
        gate.validate(request, &decision)?;

        self.decision = Some(decision);
        self.touch();
        Ok(())
    }

    /// Whether a decision is in place and nothing has run yet
    pub fn ready_for_execution(&self) -> bool {
        self.decision.is_some()
            && matches!(self.stage, Stage::AutoApproved | Stage::WaitingApproval)
    }

    /// Record the terminal result
    pub fn complete(&mut self, result: ExecutionResult) {
        self.push_message(nodes::EXECUTE_SQL, result.summary.clone());
        self.stage = result.stage.into();
        self.execution_result = Some(result);
        self.is_complete = true;
    }

    /// Terminate the run with an error result
    pub fn fail(&mut self, message: impl Into<String>) {
        self.complete(ExecutionResult::error(message));
    }

    fn expect_stage(&self, expected: Stage) -> Result<()> {
        if self.stage == expected {
            Ok(())
        } else {
            Err(SqlGateError::Internal(anyhow::anyhow!(
                "run {} expected stage {} but is {}",
                self.thread_id,
                expected,
                self.stage
            )))
        }
    }

    fn push_message(&mut self, node: &str, content: String) {
        let now = Utc::now();
        self.messages.push(RunMessage {
            node: node.to_string(),
            content,
            created_at: now,
        });
        self.updated_at = now;
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

fn analysis_message(candidate: &QueryCandidate) -> String {
    format!(
        "📊 **SQL analysis complete**\n\n\
         Generated SQL:\n\n```sql\n{}\n```\n\n\
         **Description**: {}\n\
         **Table**: {}\n\
         **Operation**: {}\n\
         **Estimated rows**: {}\n\
         **Risk**: {} {}",
        candidate.sql,
        candidate.description,
        candidate.affected_table,
        candidate.operation_type,
        candidate.estimated_rows,
        candidate.risk_level.emoji(),
        candidate.risk_level.label(),
    )
}

// Workflow events for streaming
//
// WorkflowEvent tracks a run through analysis, the approval gate and
// execution. Hosts forward these to SSE clients; tests collect them with
// InMemoryEventEmitter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

use crate::approval::{Decision, DecisionKind};
use crate::query::{OperationType, RiskLevel};
use crate::workflow::Stage;

/// Events emitted while a run progresses
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// A new run started on the thread
    RunStarted {
        thread_id: Uuid,
        user_request: String,
        timestamp: DateTime<Utc>,
    },

    /// SQL was generated and classified
    SqlGenerated {
        thread_id: Uuid,
        sql: String,
        operation_type: OperationType,
        risk_level: RiskLevel,
        used_fallback: bool,
        timestamp: DateTime<Utc>,
    },

    /// The gate approved the query without a human
    AutoApproved {
        thread_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// The run is suspended on a human decision
    ApprovalRequested {
        thread_id: Uuid,
        message: String,
        allowed_decisions: Vec<DecisionKind>,
        timestamp: DateTime<Utc>,
    },

    /// A human decision resumed the run
    DecisionReceived {
        thread_id: Uuid,
        decision: Decision,
        timestamp: DateTime<Utc>,
    },

    /// The run reached a terminal stage through the executor
    ExecutionCompleted {
        thread_id: Uuid,
        stage: Stage,
        summary: String,
        timestamp: DateTime<Utc>,
    },

    /// The run ended on an error before execution
    RunFailed {
        thread_id: Uuid,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl WorkflowEvent {
    pub fn run_started(thread_id: Uuid, user_request: impl Into<String>) -> Self {
        WorkflowEvent::RunStarted {
            thread_id,
            user_request: user_request.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn sql_generated(
        thread_id: Uuid,
        sql: impl Into<String>,
        operation_type: OperationType,
        risk_level: RiskLevel,
        used_fallback: bool,
    ) -> Self {
        WorkflowEvent::SqlGenerated {
            thread_id,
            sql: sql.into(),
            operation_type,
            risk_level,
            used_fallback,
            timestamp: Utc::now(),
        }
    }

    pub fn auto_approved(thread_id: Uuid) -> Self {
        WorkflowEvent::AutoApproved {
            thread_id,
            timestamp: Utc::now(),
        }
    }

    pub fn approval_requested(
        thread_id: Uuid,
        message: impl Into<String>,
        allowed_decisions: Vec<DecisionKind>,
    ) -> Self {
        WorkflowEvent::ApprovalRequested {
            thread_id,
            message: message.into(),
            allowed_decisions,
            timestamp: Utc::now(),
        }
    }

    pub fn decision_received(thread_id: Uuid, decision: Decision) -> Self {
        WorkflowEvent::DecisionReceived {
            thread_id,
            decision,
            timestamp: Utc::now(),
        }
    }

    pub fn execution_completed(thread_id: Uuid, stage: Stage, summary: impl Into<String>) -> Self {
        WorkflowEvent::ExecutionCompleted {
            thread_id,
            stage,
            summary: summary.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn run_failed(thread_id: Uuid, error: impl Into<String>) -> Self {
        WorkflowEvent::RunFailed {
            thread_id,
            error: error.into(),
            timestamp: Utc::now(),
        }
    }

    /// Thread the event belongs to
    pub fn thread_id(&self) -> Uuid {
        match self {
            WorkflowEvent::RunStarted { thread_id, .. }
            | WorkflowEvent::SqlGenerated { thread_id, .. }
            | WorkflowEvent::AutoApproved { thread_id, .. }
            | WorkflowEvent::ApprovalRequested { thread_id, .. }
            | WorkflowEvent::DecisionReceived { thread_id, .. }
            | WorkflowEvent::ExecutionCompleted { thread_id, .. }
            | WorkflowEvent::RunFailed { thread_id, .. } => *thread_id,
        }
    }

    /// Event name, matching the serialized `type` tag
    pub fn event_type(&self) -> &'static str {
        match self {
            WorkflowEvent::RunStarted { .. } => "run_started",
            WorkflowEvent::SqlGenerated { .. } => "sql_generated",
            WorkflowEvent::AutoApproved { .. } => "auto_approved",
            WorkflowEvent::ApprovalRequested { .. } => "approval_requested",
            WorkflowEvent::DecisionReceived { .. } => "decision_received",
            WorkflowEvent::ExecutionCompleted { .. } => "execution_completed",
            WorkflowEvent::RunFailed { .. } => "run_failed",
        }
    }
}

// Error types for the SQL assistant workflow

use thiserror::Error;
use uuid::Uuid;

use crate::approval::DecisionKind;
use crate::workflow::Stage;

/// Result type alias for SQL assistant operations
pub type Result<T> = std::result::Result<T, SqlGateError>;

/// Errors that can occur while driving an assistant run
///
/// Problems inside a run (model failure, unknown tables, missing decisions)
/// resolve into a terminal `ExecutionResult` instead. These errors are for
/// the caller: bad resume requests, store failures, misconfiguration.
#[derive(Debug, Error)]
pub enum SqlGateError {
    /// LLM driver error
    #[error("LLM error: {0}")]
    Llm(String),

    /// Run state store error
    #[error("Run state store error: {0}")]
    Store(String),

    /// Event emission error
    #[error("Event emission error: {0}")]
    EventEmission(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No run state exists for the thread
    #[error("Thread not found: {0}")]
    ThreadNotFound(Uuid),

    /// Resume was called on a run that is not suspended
    #[error("Thread {thread_id} is not awaiting approval (stage: {stage})")]
    NotAwaitingApproval { thread_id: Uuid, stage: Stage },

    /// The decision kind is not offered by the pending approval request
    #[error("Decision '{decision}' is not allowed (allowed: {allowed:?})")]
    DecisionNotAllowed {
        decision: DecisionKind,
        allowed: Vec<DecisionKind>,
    },

    /// The decision is offered but its payload is unusable
    #[error("Invalid decision: {0}")]
    InvalidDecision(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl SqlGateError {
    /// Create an LLM error
    pub fn llm(msg: impl Into<String>) -> Self {
        SqlGateError::Llm(msg.into())
    }

    /// Create a run state store error
    pub fn store(msg: impl Into<String>) -> Self {
        SqlGateError::Store(msg.into())
    }

    /// Create an event emission error
    pub fn event(msg: impl Into<String>) -> Self {
        SqlGateError::EventEmission(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        SqlGateError::Configuration(msg.into())
    }

    /// Create an invalid decision error
    pub fn invalid_decision(msg: impl Into<String>) -> Self {
        SqlGateError::InvalidDecision(msg.into())
    }

    /// Create a thread not found error
    pub fn thread_not_found(thread_id: Uuid) -> Self {
        SqlGateError::ThreadNotFound(thread_id)
    }
}

// SQL Assistant Abstraction
//
// This crate provides a DB-agnostic implementation of a SQL assistant with a
// human approval step (request → SQL → risk → gate → execute).
//
// Key design decisions:
// - Uses traits (EventEmitter, RunStateStore, LlmDriver) for pluggable backends
// - Suspension at the approval gate is a persisted RunState, resumed by an
//   explicit call with a Decision
// - Decisions are a sum type; an edit always carries its SQL
// - Risk classification is pure text inspection against an injected MockDataset
// - Execution is simulated; the dataset is never modified
// - Emits WorkflowEvent for SSE streaming

pub mod approval;
pub mod assistant;
pub mod classifier;
pub mod config;
pub mod dataset;
pub mod error;
pub mod events;
pub mod executor;
pub mod generator;
pub mod llm;
pub mod query;
pub mod traits;
pub mod workflow;

// In-memory implementations for hosts and testing
pub mod memory;

// Re-exports for convenience
pub use approval::{ApprovalGate, ApprovalRequest, Decision, DecisionKind, GateOutcome};
pub use assistant::{RunOutcome, SqlAssistant};
pub use classifier::classify;
pub use config::{AssistantConfig, AssistantConfigBuilder};
pub use dataset::MockDataset;
pub use error::{Result, SqlGateError};
pub use events::WorkflowEvent;
pub use executor::{ExecutionResult, ExecutionStage, MockExecutor};
pub use generator::{GeneratedSql, SqlGenerator};
pub use query::{OperationType, QueryCandidate, RiskLevel};
pub use traits::{EventEmitter, RunStateStore};
pub use workflow::{RunMessage, RunState, Stage};

// LLM driver types re-exports
pub use llm::{
    BoxedLlmDriver, LlmCallConfig, LlmCompletionMetadata, LlmDriver, LlmMessage, LlmMessageRole,
    LlmResponse, LlmResponseStream, LlmStreamEvent,
};

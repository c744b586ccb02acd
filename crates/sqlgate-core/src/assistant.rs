// SQL Assistant workflow controller
//
// Sequences one run per thread:
// - Generating SQL via SqlGenerator
// - Classifying it against the MockDataset
// - Passing it through the ApprovalGate
// - Executing it via MockExecutor, now or after a resume
//
// Every decision lives in those components; this file only orders the steps,
// persists RunState through RunStateStore and emits WorkflowEvents.
//
// `start` and `resume` hold a per-thread lock from load to final save, so a
// suspended run is resumed at most once and a resume never lands on top of a
// newer run.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

use crate::approval::{ApprovalGate, ApprovalRequest, Decision, GateOutcome};
use crate::classifier::classify;
use crate::config::AssistantConfig;
use crate::dataset::MockDataset;
use crate::error::{Result, SqlGateError};
use crate::events::WorkflowEvent;
use crate::executor::{ExecutionResult, MockExecutor};
use crate::generator::SqlGenerator;
use crate::llm::LlmDriver;
use crate::traits::{EventEmitter, RunStateStore};
use crate::workflow::RunState;

/// What a start or resume call ended with
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// The run reached a terminal stage
    Completed {
        thread_id: Uuid,
        result: ExecutionResult,
    },

    /// The run is suspended until `resume` is called with a decision
    Interrupted {
        thread_id: Uuid,
        approval_request: ApprovalRequest,
    },
}

impl RunOutcome {
    pub fn thread_id(&self) -> Uuid {
        match self {
            RunOutcome::Completed { thread_id, .. } | RunOutcome::Interrupted { thread_id, .. } => {
                *thread_id
            }
        }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, RunOutcome::Interrupted { .. })
    }

    /// Terminal result, if the run completed
    pub fn result(&self) -> Option<&ExecutionResult> {
        match self {
            RunOutcome::Completed { result, .. } => Some(result),
            RunOutcome::Interrupted { .. } => None,
        }
    }

    /// Pending request, if the run is suspended
    pub fn approval_request(&self) -> Option<&ApprovalRequest> {
        match self {
            RunOutcome::Interrupted {
                approval_request, ..
            } => Some(approval_request),
            RunOutcome::Completed { .. } => None,
        }
    }
}

/// The SQL assistant
///
/// Orchestrates runs with pluggable backends for:
/// - Event emission (EventEmitter)
/// - Run state persistence (RunStateStore)
/// - SQL generation (LlmDriver)
pub struct SqlAssistant<E, S>
where
    E: EventEmitter,
    S: RunStateStore,
{
    generator: SqlGenerator,
    gate: ApprovalGate,
    executor: MockExecutor,
    dataset: Arc<MockDataset>,
    event_emitter: Arc<E>,
    state_store: Arc<S>,
    thread_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl<E, S> SqlAssistant<E, S>
where
    E: EventEmitter,
    S: RunStateStore,
{
    /// Create a new assistant
    pub fn new<L>(
        config: AssistantConfig,
        llm_driver: L,
        dataset: MockDataset,
        event_emitter: E,
        state_store: S,
    ) -> Self
    where
        L: LlmDriver + 'static,
    {
        Self::with_arcs(
            config,
            Arc::new(llm_driver),
            Arc::new(dataset),
            Arc::new(event_emitter),
            Arc::new(state_store),
        )
    }

    /// Create a new assistant with Arc-wrapped components
    pub fn with_arcs(
        config: AssistantConfig,
        llm_driver: Arc<dyn LlmDriver>,
        dataset: Arc<MockDataset>,
        event_emitter: Arc<E>,
        state_store: Arc<S>,
    ) -> Self {
        Self {
            generator: SqlGenerator::new(llm_driver, config),
            gate: ApprovalGate::new(),
            executor: MockExecutor::new(dataset.clone()),
            dataset,
            event_emitter,
            state_store,
            thread_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_thread(&self, thread_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = self
            .thread_locks
            .lock()
            .await
            .entry(thread_id)
            .or_default()
            .clone();
        lock.lock_owned().await
    }

    /// Dataset the assistant classifies and executes against
    pub fn dataset(&self) -> &MockDataset {
        &self.dataset
    }

    /// Allocate a fresh thread id
    pub fn create_thread(&self) -> Uuid {
        let thread_id = Uuid::now_v7();
        debug!(thread_id = %thread_id, "Created thread");
        thread_id
    }

    /// Current state of a thread
    pub async fn get_state(&self, thread_id: Uuid) -> Result<Option<RunState>> {
        self.state_store.load(thread_id).await
    }

    /// Put a previously persisted run back into the store so it can be resumed
    pub async fn restore(&self, state: RunState) -> Result<()> {
        let _guard = self.lock_thread(state.thread_id).await;
        info!(thread_id = %state.thread_id, stage = %state.stage, "Restoring run state");
        self.state_store.save(&state).await
    }

    /// Start a run for a natural-language request
    ///
    /// Any earlier run on the thread is replaced. Returns `Interrupted` when
    /// the candidate needs a human decision, `Completed` otherwise. A failed
    /// model call completes the run with an error result.
    pub async fn start(&self, thread_id: Uuid, user_request: &str) -> Result<RunOutcome> {
        let _guard = self.lock_thread(thread_id).await;
        info!(thread_id = %thread_id, "Starting run");

        let mut state = RunState::new(thread_id, user_request);
        self.state_store.save(&state).await?;
        self.event_emitter
            .emit(WorkflowEvent::run_started(thread_id, user_request))
            .await?;

        // Analyze
        let generated = match self.generator.generate(user_request).await {
            Ok(generated) => generated,
            Err(e) => {
                warn!(thread_id = %thread_id, error = %e, "SQL generation failed");
                let message = format!("SQL generation failed: {}", e);
                state.fail(&message);
                self.state_store.save(&state).await?;
                self.event_emitter
                    .emit(WorkflowEvent::run_failed(thread_id, message))
                    .await?;
                return Ok(Self::completed(&state));
            }
        };

        let candidate = classify(&generated.sql, &generated.description, &self.dataset);
        info!(
            thread_id = %thread_id,
            operation = %candidate.operation_type,
            table = %candidate.affected_table,
            risk = ?candidate.risk_level,
            fallback = generated.used_fallback,
            "Classified SQL candidate"
        );
        self.event_emitter
            .emit(WorkflowEvent::sql_generated(
                thread_id,
                &candidate.sql,
                candidate.operation_type,
                candidate.risk_level,
                generated.used_fallback,
            ))
            .await?;

        // Gate
        let outcome = self.gate.evaluate(&candidate);
        state.record_analysis(candidate)?;
        state.apply_gate(outcome.clone())?;

        match outcome {
            GateOutcome::AutoApproved(_) => {
                self.event_emitter
                    .emit(WorkflowEvent::auto_approved(thread_id))
                    .await?;
                self.execute_and_finish(state).await
            }
            GateOutcome::ApprovalRequired(request) => {
                info!(
                    thread_id = %thread_id,
                    allowed = ?request.allowed_decisions,
                    "Run suspended for approval"
                );
                self.state_store.save(&state).await?;
                self.event_emitter
                    .emit(WorkflowEvent::approval_requested(
                        thread_id,
                        &request.message,
                        request.allowed_decisions.clone(),
                    ))
                    .await?;
                Ok(RunOutcome::Interrupted {
                    thread_id,
                    approval_request: request,
                })
            }
        }
    }

    /// Resume a suspended run with a human decision
    ///
    /// A decision the pending request does not offer is refused and the run
    /// stays suspended.
    pub async fn resume(&self, thread_id: Uuid, decision: Decision) -> Result<RunOutcome> {
        let _guard = self.lock_thread(thread_id).await;
        let mut state = self
            .state_store
            .load(thread_id)
            .await?
            .ok_or_else(|| SqlGateError::thread_not_found(thread_id))?;

        if let Err(e) = state.accept_decision(&self.gate, decision.clone()) {
            warn!(thread_id = %thread_id, error = %e, "Resume refused");
            return Err(e);
        }

        info!(thread_id = %thread_id, decision = %decision.kind(), "Resuming run");
        self.event_emitter
            .emit(WorkflowEvent::decision_received(thread_id, decision))
            .await?;

        self.execute_and_finish(state).await
    }

    async fn execute_and_finish(&self, mut state: RunState) -> Result<RunOutcome> {
        let thread_id = state.thread_id;

        let result = match state.candidate.as_ref() {
            Some(candidate) => self.executor.execute(candidate, state.decision.as_ref()),
            None => ExecutionResult::error("no query candidate to execute"),
        };
        state.complete(result);
        self.state_store.save(&state).await?;

        info!(thread_id = %thread_id, stage = %state.stage, "Run completed");
        self.event_emitter
            .emit(WorkflowEvent::execution_completed(
                thread_id,
                state.stage,
                state
                    .execution_result
                    .as_ref()
                    .map(|r| r.summary.as_str())
                    .unwrap_or_default(),
            ))
            .await?;

        Ok(Self::completed(&state))
    }

    fn completed(state: &RunState) -> RunOutcome {
        RunOutcome::Completed {
            thread_id: state.thread_id,
            result: state
                .execution_result
                .clone()
                .unwrap_or_else(|| ExecutionResult::error("run ended without a result")),
        }
    }
}

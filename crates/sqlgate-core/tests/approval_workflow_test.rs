// Integration tests for the approval workflow
//
// Drive full runs through SqlAssistant with a mock driver and in-memory
// backends: auto-approval, suspension, every decision kind, resume errors,
// transport failures, resuming from a serialized state and concurrent
// resumes on one thread.

use sqlgate_core::memory::{
    FailingLlmDriver, InMemoryEventEmitter, InMemoryRunStateStore, MockLlmDriver,
};
use sqlgate_core::{
    AssistantConfig, Decision, DecisionKind, EventEmitter, ExecutionStage, MockDataset,
    OperationType, RiskLevel, RunOutcome, RunState, RunStateStore, SqlAssistant, SqlGateError,
    Stage, WorkflowEvent,
};
use std::sync::Arc;
use uuid::Uuid;

type TestAssistant = SqlAssistant<InMemoryEventEmitter, InMemoryRunStateStore>;

struct Harness {
    assistant: TestAssistant,
    events: Arc<InMemoryEventEmitter>,
    store: Arc<InMemoryRunStateStore>,
}

async fn harness(sql: &str) -> Harness {
    let driver = MockLlmDriver::with_sql(sql, "generated for test").await;
    harness_with_driver(Arc::new(driver))
}

fn harness_with_driver(driver: Arc<dyn sqlgate_core::LlmDriver>) -> Harness {
    let events = Arc::new(InMemoryEventEmitter::new());
    let store = Arc::new(InMemoryRunStateStore::new());
    let assistant = SqlAssistant::with_arcs(
        AssistantConfig::default(),
        driver,
        Arc::new(MockDataset::seeded()),
        events.clone(),
        store.clone(),
    );
    Harness {
        assistant,
        events,
        store,
    }
}

#[tokio::test]
async fn test_delete_without_where_rejected_with_reason() {
    let h = harness("DELETE FROM orders").await;
    let thread_id = h.assistant.create_thread();

    let outcome = h
        .assistant
        .start(thread_id, "delete all orders")
        .await
        .unwrap();

    let request = outcome.approval_request().expect("run should suspend");
    assert_eq!(request.candidate.operation_type, OperationType::Delete);
    assert_eq!(request.candidate.risk_level, RiskLevel::Critical);
    assert_eq!(request.candidate.affected_table, "orders");
    assert_eq!(request.candidate.estimated_rows, 5);
    assert_eq!(
        request.allowed_decisions,
        vec![DecisionKind::Approve, DecisionKind::Reject]
    );

    let state = h.assistant.get_state(thread_id).await.unwrap().unwrap();
    assert_eq!(state.stage, Stage::WaitingApproval);
    assert!(!state.is_complete);
    assert!(state.execution_result.is_none());

    let outcome = h
        .assistant
        .resume(thread_id, Decision::reject("too risky"))
        .await
        .unwrap();

    let result = outcome.result().expect("run should complete");
    assert_eq!(result.stage, ExecutionStage::Rejected);
    assert!(result.summary.contains("too risky"));
    assert!(result.executed_sql.is_none());

    let state = h.assistant.get_state(thread_id).await.unwrap().unwrap();
    assert_eq!(state.stage, Stage::Rejected);
    assert!(state.is_complete);

    // The dataset is untouched
    assert_eq!(h.assistant.dataset().row_count("orders"), 5);

    assert_eq!(
        h.events.event_types().await,
        vec![
            "run_started",
            "sql_generated",
            "approval_requested",
            "decision_received",
            "execution_completed",
        ]
    );
}

#[tokio::test]
async fn test_select_is_auto_approved_and_executed() {
    let h = harness("SELECT * FROM users").await;
    let thread_id = h.assistant.create_thread();

    let outcome = h.assistant.start(thread_id, "list users").await.unwrap();

    assert!(!outcome.is_interrupted());
    let result = outcome.result().unwrap();
    assert_eq!(result.stage, ExecutionStage::Executed);
    assert!(!result.rows.is_empty() && result.rows.len() <= 5);
    assert_eq!(result.rows[0]["email"], "alice@example.com");

    let state = h.assistant.get_state(thread_id).await.unwrap().unwrap();
    assert_eq!(state.stage, Stage::Executed);
    assert!(state.approval_request.is_none());
    assert_eq!(state.decision, Some(Decision::Approve));
    assert!(state.is_complete);
    assert_eq!(state.messages.len(), 2);

    assert_eq!(
        h.events.event_types().await,
        vec![
            "run_started",
            "sql_generated",
            "auto_approved",
            "execution_completed",
        ]
    );
}

#[tokio::test]
async fn test_edit_runs_edited_sql_and_keeps_candidate() {
    let h = harness("UPDATE products SET stock = 0 WHERE category = 'toys'").await;
    let thread_id = h.assistant.create_thread();

    let outcome = h.assistant.start(thread_id, "zero toy stock").await.unwrap();
    let request = outcome.approval_request().unwrap();
    assert_eq!(request.candidate.risk_level, RiskLevel::Medium);
    assert!(request.allows(DecisionKind::Edit));

    let outcome = h
        .assistant
        .resume(thread_id, Decision::edit("SELECT * FROM products"))
        .await
        .unwrap();

    let result = outcome.result().unwrap();
    assert_eq!(result.stage, ExecutionStage::Executed);
    assert_eq!(result.executed_sql.as_deref(), Some("SELECT * FROM products"));
    assert_eq!(result.rows.len(), 3);
    assert!(result
        .summary
        .contains("UPDATE products SET stock = 0 WHERE category = 'toys'"));

    let state = h.assistant.get_state(thread_id).await.unwrap().unwrap();
    let candidate = state.candidate.unwrap();
    assert_eq!(
        candidate.sql,
        "UPDATE products SET stock = 0 WHERE category = 'toys'"
    );
}

#[tokio::test]
async fn test_approve_high_risk_delete() {
    let h = harness("DELETE FROM orders WHERE status = 'cancelled'").await;
    let thread_id = h.assistant.create_thread();

    let outcome = h.assistant.start(thread_id, "clean up").await.unwrap();
    let request = outcome.approval_request().unwrap();
    assert_eq!(request.candidate.risk_level, RiskLevel::High);
    assert_eq!(request.candidate.estimated_rows, 2);

    let outcome = h
        .assistant
        .resume(thread_id, Decision::Approve)
        .await
        .unwrap();
    let result = outcome.result().unwrap();
    assert_eq!(result.stage, ExecutionStage::Executed);
    assert!(result.summary.contains("Deleted 2 rows"));
    assert!(result.summary.contains("simulated"));
}

#[tokio::test]
async fn test_disallowed_decision_keeps_run_suspended() {
    let h = harness("DROP TABLE users").await;
    let thread_id = h.assistant.create_thread();

    h.assistant.start(thread_id, "drop users").await.unwrap();

    let err = h
        .assistant
        .resume(thread_id, Decision::edit("SELECT * FROM users"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SqlGateError::DecisionNotAllowed {
            decision: DecisionKind::Edit,
            ..
        }
    ));

    let state = h.assistant.get_state(thread_id).await.unwrap().unwrap();
    assert!(state.is_awaiting_approval());

    let outcome = h
        .assistant
        .resume(thread_id, Decision::Reject { reason: None })
        .await
        .unwrap();
    assert_eq!(outcome.result().unwrap().stage, ExecutionStage::Rejected);
}

#[tokio::test]
async fn test_resume_unknown_thread() {
    let h = harness("SELECT 1").await;
    let thread_id = Uuid::now_v7();

    let err = h
        .assistant
        .resume(thread_id, Decision::Approve)
        .await
        .unwrap_err();
    assert!(matches!(err, SqlGateError::ThreadNotFound(id) if id == thread_id));
}

#[tokio::test]
async fn test_resume_twice_is_refused() {
    let h = harness("UPDATE users SET role = 'admin'").await;
    let thread_id = h.assistant.create_thread();

    h.assistant.start(thread_id, "promote everyone").await.unwrap();
    h.assistant
        .resume(thread_id, Decision::Approve)
        .await
        .unwrap();

    let err = h
        .assistant
        .resume(thread_id, Decision::Approve)
        .await
        .unwrap_err();
    assert!(matches!(err, SqlGateError::NotAwaitingApproval { .. }));
}

#[tokio::test]
async fn test_transport_failure_completes_with_error() {
    let h = harness_with_driver(Arc::new(FailingLlmDriver::new("connection refused")));
    let thread_id = h.assistant.create_thread();

    let outcome = h.assistant.start(thread_id, "anything").await.unwrap();

    let result = outcome.result().unwrap();
    assert_eq!(result.stage, ExecutionStage::Error);
    assert!(result.error.as_deref().unwrap().contains("connection refused"));

    let state = h.store.load(thread_id).await.unwrap().unwrap();
    assert_eq!(state.stage, Stage::Error);
    assert!(state.is_complete);
    assert!(state.candidate.is_none());

    assert_eq!(
        h.events.event_types().await,
        vec!["run_started", "run_failed"]
    );
}

#[tokio::test]
async fn test_unparseable_reply_uses_fallback_query() {
    let driver = MockLlmDriver::new();
    driver.add_response("Sorry, I only speak prose.").await;
    let h = harness_with_driver(Arc::new(driver));
    let thread_id = h.assistant.create_thread();

    let outcome = h.assistant.start(thread_id, "whatever").await.unwrap();

    let result = outcome.result().unwrap();
    assert_eq!(result.stage, ExecutionStage::Executed);
    assert_eq!(
        result.executed_sql.as_deref(),
        Some("SELECT * FROM orders LIMIT 10")
    );
    assert_eq!(result.rows.len(), 5);
}

#[tokio::test]
async fn test_resume_from_serialized_state() {
    let h = harness("DELETE FROM orders").await;
    let thread_id = h.assistant.create_thread();
    h.assistant.start(thread_id, "delete all orders").await.unwrap();

    let suspended = h.assistant.get_state(thread_id).await.unwrap().unwrap();
    let persisted = serde_json::to_string(&suspended).unwrap();

    // A fresh assistant, as after a restart
    let restarted = harness("SELECT 1").await;
    let restored: RunState = serde_json::from_str(&persisted).unwrap();
    restarted.assistant.restore(restored).await.unwrap();

    let outcome = restarted
        .assistant
        .resume(thread_id, Decision::Approve)
        .await
        .unwrap();

    match outcome {
        RunOutcome::Completed { thread_id: id, result } => {
            assert_eq!(id, thread_id);
            assert_eq!(result.stage, ExecutionStage::Executed);
            assert!(result.summary.contains("Deleted 5 rows"));
        }
        other => panic!("expected completed run, got {:?}", other),
    }
}

#[tokio::test]
async fn test_threads_are_isolated() {
    let h = harness("DELETE FROM orders").await;
    let a = h.assistant.create_thread();
    let b = h.assistant.create_thread();

    h.assistant.start(a, "first").await.unwrap();
    h.assistant.start(b, "second").await.unwrap();
    h.assistant
        .resume(a, Decision::reject("no"))
        .await
        .unwrap();

    let state_b = h.assistant.get_state(b).await.unwrap().unwrap();
    assert!(state_b.is_awaiting_approval());
    assert_eq!(h.events.events_for(b).await.len(), 3);
}

#[tokio::test]
async fn test_blank_edit_keeps_run_suspended() {
    let h = harness("UPDATE users SET name = 'x' WHERE id = 1").await;
    let thread_id = h.assistant.create_thread();

    let outcome = h.assistant.start(thread_id, "rename user").await.unwrap();
    assert!(outcome.is_interrupted());

    let err = h
        .assistant
        .resume(thread_id, Decision::edit("   "))
        .await
        .unwrap_err();
    assert!(matches!(err, SqlGateError::InvalidDecision(_)));

    let state = h.assistant.get_state(thread_id).await.unwrap().unwrap();
    assert_eq!(state.stage, Stage::WaitingApproval);
    assert!(state.decision.is_none());
    assert!(state.execution_result.is_none());

    // a usable edit still goes through
    let outcome = h
        .assistant
        .resume(thread_id, Decision::edit("UPDATE users SET name = 'y' WHERE id = 1"))
        .await
        .unwrap();
    assert_eq!(outcome.result().unwrap().stage, ExecutionStage::Executed);
}

/// Emitter that yields to the scheduler before recording, so concurrent
/// calls interleave at every emit
#[derive(Default)]
struct YieldingEmitter {
    inner: InMemoryEventEmitter,
}

#[async_trait::async_trait]
impl EventEmitter for YieldingEmitter {
    async fn emit(&self, event: WorkflowEvent) -> sqlgate_core::Result<()> {
        tokio::task::yield_now().await;
        self.inner.emit(event).await
    }
}

async fn yielding_assistant(
    sql: &str,
) -> (
    SqlAssistant<YieldingEmitter, InMemoryRunStateStore>,
    Arc<YieldingEmitter>,
) {
    let driver = MockLlmDriver::with_sql(sql, "generated for test").await;
    let events = Arc::new(YieldingEmitter::default());
    let assistant = SqlAssistant::with_arcs(
        AssistantConfig::default(),
        Arc::new(driver),
        Arc::new(MockDataset::seeded()),
        events.clone(),
        Arc::new(InMemoryRunStateStore::new()),
    );
    (assistant, events)
}

#[tokio::test]
async fn test_concurrent_resumes_execute_once() {
    let (assistant, events) = yielding_assistant("DELETE FROM orders").await;
    let thread_id = assistant.create_thread();
    assert!(assistant
        .start(thread_id, "delete all orders")
        .await
        .unwrap()
        .is_interrupted());

    let (first, second) = tokio::join!(
        assistant.resume(thread_id, Decision::reject("too risky")),
        assistant.resume(thread_id, Decision::Approve),
    );

    let (winner, loser) = match (first, second) {
        (Ok(outcome), Err(err)) | (Err(err), Ok(outcome)) => (outcome, err),
        other => panic!("expected exactly one successful resume, got {:?}", other),
    };
    assert!(matches!(loser, SqlGateError::NotAwaitingApproval { .. }));

    let state = assistant.get_state(thread_id).await.unwrap().unwrap();
    let result = winner.result().unwrap();
    assert_eq!(state.execution_result.as_ref(), Some(result));
    assert_eq!(Stage::from(result.stage), state.stage);

    let completions = events
        .inner
        .event_types()
        .await
        .into_iter()
        .filter(|t| *t == "execution_completed")
        .count();
    assert_eq!(completions, 1);
}

#[tokio::test]
async fn test_resume_does_not_overwrite_newer_run() {
    let (assistant, _events) = yielding_assistant("DELETE FROM orders").await;
    let thread_id = assistant.create_thread();
    assistant.start(thread_id, "first").await.unwrap();

    let (resumed, restarted) = tokio::join!(
        assistant.resume(thread_id, Decision::Approve),
        assistant.start(thread_id, "second"),
    );
    assert!(resumed.is_ok());
    assert!(restarted.unwrap().is_interrupted());

    // the resume finishes before the new run starts, so the new run survives
    let state = assistant.get_state(thread_id).await.unwrap().unwrap();
    assert_eq!(state.user_request, "second");
    assert_eq!(state.stage, Stage::WaitingApproval);
}

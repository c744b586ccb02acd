// In-memory implementations for hosts and testing
//
// These implementations keep all data in memory, which suits:
// - The bundled HTTP host (runs do not survive a restart)
// - Unit and integration tests
// - Quick prototyping

use async_trait::async_trait;
use futures::stream;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::error::{Result, SqlGateError};
use crate::events::WorkflowEvent;
use crate::llm::{
    LlmCallConfig, LlmCompletionMetadata, LlmDriver, LlmMessage, LlmResponseStream,
    LlmStreamEvent,
};
use crate::traits::{EventEmitter, RunStateStore};
use crate::workflow::RunState;

// ============================================================================
// InMemoryRunStateStore - Stores run state in memory
// ============================================================================

/// In-memory run state store
///
/// Stores run state in a HashMap keyed by thread ID. Suspended runs stay
/// until they are resumed, replaced or deleted.
#[derive(Debug, Default, Clone)]
pub struct InMemoryRunStateStore {
    states: Arc<RwLock<HashMap<Uuid, RunState>>>,
}

impl InMemoryRunStateStore {
    /// Create a new in-memory run state store
    pub fn new() -> Self {
        Self {
            states: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of stored runs
    pub async fn len(&self) -> usize {
        self.states.read().await.len()
    }

    /// Whether the store is empty
    pub async fn is_empty(&self) -> bool {
        self.states.read().await.is_empty()
    }

    /// Clear all runs
    pub async fn clear(&self) {
        self.states.write().await.clear();
    }
}

#[async_trait]
impl RunStateStore for InMemoryRunStateStore {
    async fn save(&self, state: &RunState) -> Result<()> {
        self.states
            .write()
            .await
            .insert(state.thread_id, state.clone());
        Ok(())
    }

    async fn load(&self, thread_id: Uuid) -> Result<Option<RunState>> {
        Ok(self.states.read().await.get(&thread_id).cloned())
    }

    async fn delete(&self, thread_id: Uuid) -> Result<bool> {
        Ok(self.states.write().await.remove(&thread_id).is_some())
    }

    async fn list_threads(&self) -> Result<Vec<Uuid>> {
        let mut threads: Vec<Uuid> = self.states.read().await.keys().copied().collect();
        // v7 ids sort by creation time
        threads.sort();
        Ok(threads)
    }
}

// ============================================================================
// Event emitters
// ============================================================================

/// Event emitter that collects events in memory
#[derive(Debug, Default, Clone)]
pub struct InMemoryEventEmitter {
    events: Arc<RwLock<Vec<WorkflowEvent>>>,
}

impl InMemoryEventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events emitted so far
    pub async fn events(&self) -> Vec<WorkflowEvent> {
        self.events.read().await.clone()
    }

    /// Events emitted for one thread
    pub async fn events_for(&self, thread_id: Uuid) -> Vec<WorkflowEvent> {
        self.events
            .read()
            .await
            .iter()
            .filter(|e| e.thread_id() == thread_id)
            .cloned()
            .collect()
    }

    /// Event type names, in emission order
    pub async fn event_types(&self) -> Vec<&'static str> {
        self.events
            .read()
            .await
            .iter()
            .map(|e| e.event_type())
            .collect()
    }

    pub async fn clear(&self) {
        self.events.write().await.clear();
    }
}

#[async_trait]
impl EventEmitter for InMemoryEventEmitter {
    async fn emit(&self, event: WorkflowEvent) -> Result<()> {
        self.events.write().await.push(event);
        Ok(())
    }
}

/// Event emitter that drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventEmitter;

#[async_trait]
impl EventEmitter for NoopEventEmitter {
    async fn emit(&self, _event: WorkflowEvent) -> Result<()> {
        Ok(())
    }
}

/// Default capacity of the broadcast channel
pub const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// Event emitter that fans events out to live subscribers
///
/// Events emitted while nobody is subscribed are dropped. Slow subscribers
/// that fall more than the channel capacity behind lose the oldest events.
#[derive(Debug, Clone)]
pub struct BroadcastEventEmitter {
    sender: broadcast::Sender<WorkflowEvent>,
}

impl BroadcastEventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastEventEmitter {
    fn default() -> Self {
        Self::new(DEFAULT_BROADCAST_CAPACITY)
    }
}

#[async_trait]
impl EventEmitter for BroadcastEventEmitter {
    async fn emit(&self, event: WorkflowEvent) -> Result<()> {
        if self.sender.send(event).is_err() {
            tracing::trace!("No SSE subscribers, event dropped");
        }
        Ok(())
    }
}

// ============================================================================
// MockLlmDriver - Returns predefined responses
// ============================================================================

/// Mock LLM driver for testing
///
/// Returns predefined responses in sequence and records every call.
#[derive(Debug, Default)]
pub struct MockLlmDriver {
    responses: Arc<RwLock<Vec<String>>>,
    call_index: Arc<RwLock<usize>>,
    call_log: Arc<RwLock<Vec<Vec<LlmMessage>>>>,
}

impl MockLlmDriver {
    /// Create a new mock LLM driver
    pub fn new() -> Self {
        Self::default()
    }

    /// Driver that answers every call with SQL wrapped in the expected JSON
    pub async fn with_sql(sql: &str, description: &str) -> Self {
        let driver = Self::new();
        driver.add_sql_response(sql, description).await;
        driver
    }

    /// Add a raw text response to the queue
    pub async fn add_response(&self, text: &str) {
        self.responses.write().await.push(text.to_string());
    }

    /// Add a well-formed generation response to the queue
    pub async fn add_sql_response(&self, sql: &str, description: &str) {
        let body = serde_json::json!({
            "sql": sql,
            "description": description,
            "reasoning": "mock",
        });
        self.add_response(&body.to_string()).await;
    }

    /// Get the call log
    pub async fn calls(&self) -> Vec<Vec<LlmMessage>> {
        self.call_log.read().await.clone()
    }

    /// Reset the driver
    pub async fn reset(&self) {
        self.responses.write().await.clear();
        *self.call_index.write().await = 0;
        self.call_log.write().await.clear();
    }
}

#[async_trait]
impl LlmDriver for MockLlmDriver {
    async fn chat_completion_stream(
        &self,
        messages: Vec<LlmMessage>,
        config: &LlmCallConfig,
    ) -> Result<LlmResponseStream> {
        self.call_log.write().await.push(messages);

        let mut index = self.call_index.write().await;
        let responses = self.responses.read().await;

        // The last response repeats once the queue is exhausted
        let text = responses
            .get(*index)
            .or_else(|| responses.last())
            .cloned()
            .unwrap_or_else(|| "Mock response (no more responses configured)".to_string());

        *index += 1;
        drop(index);
        drop(responses);

        let events = vec![
            Ok(LlmStreamEvent::TextDelta(text)),
            Ok(LlmStreamEvent::Done(LlmCompletionMetadata {
                model: Some(config.model.clone()),
                finish_reason: Some("stop".to_string()),
                ..Default::default()
            })),
        ];

        Ok(Box::pin(stream::iter(events)))
    }
}

// ============================================================================
// FailingLlmDriver - Always fails at the transport level
// ============================================================================

/// LLM driver whose calls always fail
///
/// Useful for testing transport error handling.
#[derive(Debug, Clone)]
pub struct FailingLlmDriver {
    error_message: String,
}

impl FailingLlmDriver {
    pub fn new(error_message: impl Into<String>) -> Self {
        Self {
            error_message: error_message.into(),
        }
    }
}

impl Default for FailingLlmDriver {
    fn default() -> Self {
        Self::new("LLM request failed")
    }
}

#[async_trait]
impl LlmDriver for FailingLlmDriver {
    async fn chat_completion_stream(
        &self,
        _messages: Vec<LlmMessage>,
        _config: &LlmCallConfig,
    ) -> Result<LlmResponseStream> {
        Err(SqlGateError::llm(self.error_message.clone()))
    }
}

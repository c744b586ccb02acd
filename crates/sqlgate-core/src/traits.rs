// Core traits for pluggable backends
//
// These traits keep the assistant independent of where runs are kept and
// where events go:
// - In-memory implementations for hosts, examples and testing
// - Durable implementations can be plugged in by a host
// - Channel-based implementations for streaming

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::events::WorkflowEvent;
use crate::workflow::RunState;

// ============================================================================
// EventEmitter - For streaming events during a run
// ============================================================================

/// Trait for emitting events while a run progresses
///
/// Implementations can:
/// - Send events to a channel for SSE streaming
/// - Collect events in memory for testing
/// - Do nothing (no-op implementation)
#[async_trait]
pub trait EventEmitter: Send + Sync {
    /// Emit a single event
    async fn emit(&self, event: WorkflowEvent) -> Result<()>;

    /// Emit multiple events
    async fn emit_batch(&self, events: Vec<WorkflowEvent>) -> Result<()> {
        for event in events {
            self.emit(event).await?;
        }
        Ok(())
    }
}

// ============================================================================
// RunStateStore - For persisting run state between start and resume
// ============================================================================

/// Trait for storing run state, keyed by thread
///
/// A run suspended at the approval gate lives only here until it is resumed.
#[async_trait]
pub trait RunStateStore: Send + Sync {
    /// Insert or replace the state of a thread
    async fn save(&self, state: &RunState) -> Result<()>;

    /// Load the state of a thread
    async fn load(&self, thread_id: Uuid) -> Result<Option<RunState>>;

    /// Remove the state of a thread, returning whether anything was removed
    async fn delete(&self, thread_id: Uuid) -> Result<bool>;

    /// All threads with stored state
    async fn list_threads(&self) -> Result<Vec<Uuid>>;
}

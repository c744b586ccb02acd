// OpenAI LLM Driver
//
// Implementation of LlmDriver for OpenAI-compatible chat completion APIs.
// Responses are always streamed; each SSE chunk becomes an LlmStreamEvent.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::Client;

use sqlgate_core::error::{Result, SqlGateError};
use sqlgate_core::llm::{
    LlmCallConfig, LlmCompletionMetadata, LlmDriver, LlmMessage, LlmResponseStream,
    LlmStreamEvent,
};

use crate::types::{ChatRequest, OpenAiErrorResponse, OpenAiMessage, OpenAiStreamChunk};

/// Default chat completions endpoint
pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";

const CHAT_COMPLETIONS_PATH: &str = "/chat/completions";

/// OpenAI LLM Driver
///
/// Production driver for OpenAI's API and compatible servers.
///
/// # Example
///
/// ```ignore
/// use sqlgate_openai::OpenAILlmDriver;
///
/// let driver = OpenAILlmDriver::from_env()?;
/// // or
/// let driver = OpenAILlmDriver::new("your-api-key");
/// // or with custom endpoint
/// let driver = OpenAILlmDriver::with_base_url("your-api-key", "http://localhost:11434/v1/chat/completions");
/// ```
#[derive(Clone)]
pub struct OpenAILlmDriver {
    client: Client,
    api_key: String,
    api_url: String,
}

impl OpenAILlmDriver {
    /// Create a new driver with the given API key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_API_URL)
    }

    /// Create a new driver from OPENAI_API_KEY and, if set, OPENAI_BASE_URL
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| SqlGateError::config("OPENAI_API_KEY environment variable not set"))?;

        match std::env::var("OPENAI_BASE_URL") {
            Ok(base_url) if !base_url.trim().is_empty() => Ok(Self::with_base_url(
                api_key,
                chat_completions_url(&base_url),
            )),
            _ => Ok(Self::new(api_key)),
        }
    }

    /// Create a new driver with a custom API URL (for OpenAI-compatible APIs)
    pub fn with_base_url(api_key: impl Into<String>, api_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            api_url: api_url.into(),
        }
    }

    /// Get the API URL
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn build_request(messages: &[LlmMessage], config: &LlmCallConfig) -> ChatRequest {
        ChatRequest {
            model: config.model.clone(),
            messages: messages
                .iter()
                .map(|m| OpenAiMessage {
                    role: m.role.as_str().to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            stream: true,
        }
    }
}

/// Endpoint URL for a base URL such as `https://api.openai.com/v1`
pub fn chat_completions_url(base_url: &str) -> String {
    let base = base_url.trim().trim_end_matches('/');
    if base.ends_with(CHAT_COMPLETIONS_PATH) {
        base.to_string()
    } else {
        format!("{}{}", base, CHAT_COMPLETIONS_PATH)
    }
}

/// Convert one SSE data payload into stream events
///
/// A chunk may carry the final text delta together with its finish reason,
/// so text is emitted before `Done`. Role-only deltas and the `[DONE]`
/// sentinel yield nothing.
fn parse_chunk(data: &str, model: &str) -> Vec<LlmStreamEvent> {
    if data == "[DONE]" {
        return Vec::new();
    }

    let chunk = match serde_json::from_str::<OpenAiStreamChunk>(data) {
        Ok(chunk) => chunk,
        Err(e) => {
            return vec![LlmStreamEvent::Error(format!(
                "Failed to parse OpenAI chunk: {}",
                e
            ))]
        }
    };

    let Some(choice) = chunk.choices.first() else {
        return Vec::new();
    };

    let mut events = Vec::new();

    if let Some(content) = choice.delta.content.as_ref().filter(|c| !c.is_empty()) {
        events.push(LlmStreamEvent::TextDelta(content.clone()));
    }

    if let Some(finish_reason) = &choice.finish_reason {
        events.push(LlmStreamEvent::Done(LlmCompletionMetadata {
            total_tokens: chunk.usage.as_ref().map(|u| u.total_tokens),
            model: Some(chunk.model.clone().unwrap_or_else(|| model.to_string())),
            finish_reason: Some(finish_reason.clone()),
        }));
    }

    events
}

#[async_trait]
impl LlmDriver for OpenAILlmDriver {
    async fn chat_completion_stream(
        &self,
        messages: Vec<LlmMessage>,
        config: &LlmCallConfig,
    ) -> Result<LlmResponseStream> {
        let request = Self::build_request(&messages, config);

        tracing::debug!(
            model = %config.model,
            messages = messages.len(),
            "Sending chat completion request"
        );

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| SqlGateError::llm(format!("Failed to send OpenAI request: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<OpenAiErrorResponse>(&error_text)
                .map(|e| e.error.message)
                .unwrap_or(error_text);
            tracing::warn!(status = %status, "OpenAI API request failed");
            return Err(SqlGateError::llm(format!(
                "OpenAI API request failed with status {}: {}",
                status, detail
            )));
        }

        let model = config.model.clone();
        let event_stream = response.bytes_stream().eventsource();

        let converted_stream = event_stream.flat_map(move |result| {
            let events = match result {
                Ok(event) => parse_chunk(&event.data, &model),
                Err(e) => vec![LlmStreamEvent::Error(format!("Stream error: {}", e))],
            };
            futures::stream::iter(events.into_iter().map(Ok))
        });

        Ok(Box::pin(converted_stream))
    }
}

impl std::fmt::Debug for OpenAILlmDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAILlmDriver")
            .field("api_url", &self.api_url())
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

// OpenAI Driver Implementation
//
// This crate provides an OpenAI-compatible LLM driver implementation.
// It implements the LlmDriver trait from sqlgate-core, so the SQL generator
// can call OpenAI's chat completion API or any server speaking the same
// protocol.

mod driver;
mod types;

#[cfg(test)]
mod tests;

pub use driver::{chat_completions_url, OpenAILlmDriver, DEFAULT_API_URL};
pub use types::{ChatRequest, OpenAiMessage};

// Re-export core types for convenience
pub use sqlgate_core::llm::LlmDriver;

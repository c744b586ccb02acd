// SQL generator
//
// Turns a natural-language request into SQL with one completion call. The
// model is asked for a JSON object; when the reply does not contain one that
// parses, the configured fallback query is used instead. A broken reply is
// never an error. A failed call to the driver is.

use serde::Deserialize;
use std::sync::Arc;

use crate::config::AssistantConfig;
use crate::error::Result;
use crate::llm::{LlmCallConfig, LlmDriver, LlmMessage};

/// Schema-aware instructions for the model
pub const SCHEMA_PROMPT: &str = r#"You are a SQL expert assistant. The user describes what they need in natural language and you write the matching SQL statement.

Available tables:
1. orders - order records
   - id (integer, primary key)
   - customer (string, customer name)
   - amount (number, order total)
   - status (string: completed/pending/cancelled)
   - created_at (date)

2. users - user accounts
   - id (integer, primary key)
   - name (string, user name)
   - email (string, email address)
   - role (string: admin/user)

3. products - product catalog
   - id (integer, primary key)
   - name (string, product name)
   - price (number, unit price)
   - stock (integer, units in stock)
   - category (string, product category)

Answer with a JSON object of this shape:
{
  "sql": "the SQL statement",
  "description": "what the statement does, in one sentence",
  "reasoning": "short explanation of how the SQL was written"
}

Return only the JSON object and nothing else."#;

/// SQL proposed by the generator, not yet classified
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedSql {
    pub sql: String,
    pub description: String,
    pub reasoning: Option<String>,
    /// The model's reply could not be used and the fallback query was substituted
    pub used_fallback: bool,
}

#[derive(Debug, Deserialize)]
struct GenerationPayload {
    sql: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    reasoning: Option<String>,
}

/// Generates SQL candidates through an LLM driver
#[derive(Clone)]
pub struct SqlGenerator {
    driver: Arc<dyn LlmDriver>,
    config: AssistantConfig,
}

impl SqlGenerator {
    pub fn new(driver: Arc<dyn LlmDriver>, config: AssistantConfig) -> Self {
        Self { driver, config }
    }

    /// Messages sent to the model for a request
    pub fn build_messages(&self, user_request: &str) -> Vec<LlmMessage> {
        let system = self
            .config
            .system_prompt
            .as_deref()
            .unwrap_or(SCHEMA_PROMPT);
        vec![LlmMessage::system(system), LlmMessage::user(user_request)]
    }

    /// Generate SQL for a natural-language request
    pub async fn generate(&self, user_request: &str) -> Result<GeneratedSql> {
        let messages = self.build_messages(user_request);
        let call_config = LlmCallConfig::from(&self.config);

        let response = self.driver.chat_completion(messages, &call_config).await?;

        match parse_generation(&response.text) {
            Some(generated) => {
                tracing::debug!(sql = %generated.sql, "Parsed generated SQL");
                Ok(generated)
            }
            None => {
                tracing::warn!(
                    response_len = response.text.len(),
                    "Model reply held no usable JSON, using fallback query"
                );
                Ok(self.fallback())
            }
        }
    }

    fn fallback(&self) -> GeneratedSql {
        GeneratedSql {
            sql: self.config.fallback_sql.clone(),
            description: self.config.fallback_description.clone(),
            reasoning: None,
            used_fallback: true,
        }
    }
}

impl std::fmt::Debug for SqlGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlGenerator")
            .field("model", &self.config.model)
            .finish()
    }
}

/// Substring from the first `{` to the last `}`
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Parse a model reply into generated SQL, `None` if it is unusable
pub fn parse_generation(text: &str) -> Option<GeneratedSql> {
    let json = extract_json_object(text)?;
    let payload: GenerationPayload = serde_json::from_str(json).ok()?;

    if payload.sql.trim().is_empty() {
        return None;
    }

    Some(GeneratedSql {
        sql: payload.sql,
        description: payload.description,
        reasoning: payload.reasoning,
        used_fallback: false,
    })
}

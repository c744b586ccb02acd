// Assistant configuration
//
// AssistantConfig is a DB-agnostic configuration struct that can be:
// - Created directly for standalone usage
// - Deserialized from a host's configuration
// - Built with AssistantConfigBuilder

use serde::{Deserialize, Serialize};

/// Query used when the model's answer cannot be parsed
pub const DEFAULT_FALLBACK_SQL: &str = "SELECT * FROM orders LIMIT 10";

/// Description attached to the fallback query
pub const DEFAULT_FALLBACK_DESCRIPTION: &str = "Show the first 10 rows of the orders table";

/// Configuration for the SQL assistant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    /// Model identifier (e.g., "gpt-4o-mini")
    pub model: String,

    /// Temperature for LLM sampling (0.0 - 2.0)
    #[serde(default)]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate per response
    #[serde(default)]
    pub max_tokens: Option<u32>,

    /// Replaces the built-in schema-aware system prompt
    #[serde(default)]
    pub system_prompt: Option<String>,

    /// Query used when generation output cannot be parsed
    #[serde(default = "default_fallback_sql")]
    pub fallback_sql: String,

    /// Description of the fallback query
    #[serde(default = "default_fallback_description")]
    pub fallback_description: String,
}

fn default_fallback_sql() -> String {
    DEFAULT_FALLBACK_SQL.to_string()
}

fn default_fallback_description() -> String {
    DEFAULT_FALLBACK_DESCRIPTION.to_string()
}

impl AssistantConfig {
    /// Create a new configuration for the given model
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    /// Set temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set max tokens
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Override the system prompt
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: None,
            max_tokens: None,
            system_prompt: None,
            fallback_sql: default_fallback_sql(),
            fallback_description: default_fallback_description(),
        }
    }
}

/// Builder for AssistantConfig with fluent API
pub struct AssistantConfigBuilder {
    config: AssistantConfig,
}

impl AssistantConfigBuilder {
    /// Start building a new configuration
    pub fn new() -> Self {
        Self {
            config: AssistantConfig::default(),
        }
    }

    /// Set the model
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    /// Set temperature
    pub fn temperature(mut self, temp: f32) -> Self {
        self.config.temperature = Some(temp);
        self
    }

    /// Set max tokens
    pub fn max_tokens(mut self, tokens: u32) -> Self {
        self.config.max_tokens = Some(tokens);
        self
    }

    /// Override the system prompt
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    /// Set the fallback query and its description
    pub fn fallback(mut self, sql: impl Into<String>, description: impl Into<String>) -> Self {
        self.config.fallback_sql = sql.into();
        self.config.fallback_description = description.into();
        self
    }

    /// Build the configuration
    pub fn build(self) -> AssistantConfig {
        self.config
    }
}

impl Default for AssistantConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

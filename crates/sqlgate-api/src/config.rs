// Server configuration
//
// Everything the binary needs comes from the environment (after `.env` is
// loaded). Unset values fall back to the defaults below.

use axum::http::HeaderValue;
use sqlgate_core::AssistantConfig;

/// Default listen address
pub const DEFAULT_ADDR: &str = "0.0.0.0:9000";

/// Configuration for the API server
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    /// Listen address (SQLGATE_ADDR)
    pub addr: Option<String>,
    /// Prefix for API routes, e.g. "/api" (API_PREFIX)
    pub api_prefix: String,
    /// Comma-separated allowed origins (CORS_ALLOWED_ORIGINS)
    pub cors_allowed_origins: Option<String>,
    /// Model used for SQL generation (SQLGATE_MODEL)
    pub model: Option<String>,
}

impl ServerConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            addr: std::env::var("SQLGATE_ADDR").ok(),
            api_prefix: std::env::var("API_PREFIX").unwrap_or_default(),
            cors_allowed_origins: std::env::var("CORS_ALLOWED_ORIGINS").ok(),
            model: std::env::var("SQLGATE_MODEL").ok(),
        }
    }

    /// Listen address with default
    pub fn addr(&self) -> String {
        self.addr
            .clone()
            .filter(|a| !a.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ADDR.to_string())
    }

    /// Parsed CORS origins; empty means same-origin only
    pub fn cors_origins(&self) -> Vec<HeaderValue> {
        self.cors_allowed_origins
            .as_deref()
            .map(parse_origins)
            .unwrap_or_default()
    }

    /// Assistant configuration for this server
    pub fn assistant_config(&self) -> AssistantConfig {
        match self.model.as_deref().filter(|m| !m.trim().is_empty()) {
            Some(model) => AssistantConfig::new(model),
            None => AssistantConfig::default(),
        }
    }
}

/// Parse a comma-separated origin list, skipping invalid entries
pub fn parse_origins(raw: &str) -> Vec<HeaderValue> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect()
}

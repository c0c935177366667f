//! Text generation via the Gemini `generateContent` API.
//!
//! `TextGenerator` is the seam the summarization gateway talks to; the Gemini
//! client is the production implementation. One request per call, no retry.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

// ============================================================================
// TextGenerator trait
// ============================================================================

/// Abstraction over text-generation providers.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate text for `prompt`. `Ok(None)` means the provider answered
    /// successfully but the response carried no usable text.
    async fn generate(&self, prompt: &str) -> Result<Option<String>, GenerateError>;

    /// Provider name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Invalid response body: {0}")]
    InvalidResponse(String),

    #[error("Missing API key")]
    MissingApiKey,
}

// ============================================================================
// Config
// ============================================================================

/// Gemini client configuration
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
}

impl From<&crate::config::GeminiConfig> for GenerationConfig {
    fn from(cfg: &crate::config::GeminiConfig) -> Self {
        Self {
            api_key: cfg.resolved_api_key(),
            model: cfg.model.clone(),
            timeout: Duration::from_secs(cfg.timeout_seconds),
        }
    }
}

// ============================================================================
// Gemini API structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<GeminiContent>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorResponse {
    error: Option<GeminiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    code: u16,
    message: String,
}

/// Pull `candidates[0].content.parts[0].text` out of a response, if present
/// and non-empty.
pub fn extract_text(body: &serde_json::Value) -> Option<String> {
    body.pointer("/candidates/0/content/parts/0/text")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

// ============================================================================
// GeminiClient
// ============================================================================

#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    config: GenerationConfig,
    base_url: String,
}

impl GeminiClient {
    pub fn new(config: GenerationConfig) -> Result<Self, GenerateError> {
        Self::with_base_url(config, DEFAULT_BASE_URL.to_string())
    }

    /// Create a client against a custom endpoint (tests, proxies).
    pub fn with_base_url(config: GenerationConfig, base_url: String) -> Result<Self, GenerateError> {
        if config.api_key.trim().is_empty() {
            return Err(GenerateError::MissingApiKey);
        }

        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            config,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(cfg: &crate::config::GeminiConfig) -> Result<Self, GenerateError> {
        Self::with_base_url(GenerationConfig::from(cfg), cfg.base_url.clone())
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    async fn generate_once(&self, prompt: &str) -> Result<Option<String>, GenerateError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.config.model);

        let request = GenerateRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: prompt.to_string(),
                }],
            }],
        };

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.config.api_key.as_str())])
            .json(&request)
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let error_detail = serde_json::from_str::<GeminiErrorResponse>(&error_body)
                .ok()
                .and_then(|e| e.error);

            let (code, message) = error_detail
                .map(|e| (e.code, e.message))
                .unwrap_or((status.as_u16(), error_body));

            tracing::error!(code = code, message = %message, "Gemini API error");

            return Err(GenerateError::Api { code, message });
        }

        let raw = response.text().await?;
        let body: serde_json::Value = serde_json::from_str(&raw)
            .map_err(|e| GenerateError::InvalidResponse(e.to_string()))?;

        let text = extract_text(&body);
        if text.is_none() {
            tracing::warn!(model = %self.config.model, "Gemini response carried no candidate text");
        }
        Ok(text)
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<Option<String>, GenerateError> {
        self.generate_once(prompt).await
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

// ============================================================================
// TESTS
// ============================================================================

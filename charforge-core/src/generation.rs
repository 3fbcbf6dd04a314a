//! Text generation for Charforge
//!
//! Provides a `TextGenerationClient` trait and a Gemini `generateContent`
//! implementation. The client is stateless: every call carries the full
//! system instruction and the full ordered transcript.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;

use crate::config::GenerationConfig;
use crate::models::{Speaker, Turn};

// ============================================================================
// TextGenerationClient trait
// ============================================================================

/// Abstraction over generative-text providers.
#[async_trait]
pub trait TextGenerationClient: Send + Sync {
    /// Generate the next assistant message for `transcript`.
    /// Implementations must send turns in order with their roles intact.
    async fn generate(
        &self,
        system_instruction: &str,
        transcript: &[Turn],
    ) -> Result<String, GenerationError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Response contained no text")]
    EmptyResponse,

    #[error("Missing API key")]
    MissingApiKey,

    #[error("All {attempts} retry attempts failed")]
    RetryExhausted { attempts: usize },
}

impl GenerationError {
    /// Client errors other than rate limiting will fail the same way again.
    fn is_retryable(&self) -> bool {
        match self {
            GenerationError::Api { code, .. } => *code == 429 || *code >= 500,
            GenerationError::Http(_) | GenerationError::EmptyResponse => true,
            GenerationError::MissingApiKey | GenerationError::RetryExhausted { .. } => false,
        }
    }
}

// ============================================================================
// Config
// ============================================================================

/// Gemini generation client configuration
#[derive(Debug, Clone)]
pub struct GeminiClientConfig {
    pub api_key: String,
    pub model: String,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
    pub timeout: Duration,
}

impl GeminiClientConfig {
    pub fn new(api_key: Option<String>, model: String) -> Self {
        let api_key = api_key
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
            .unwrap_or_default();

        Self {
            api_key,
            model,
            max_retries: 3,
            retry_delay_ms: 1000,
            timeout: Duration::from_secs(60),
        }
    }
}

impl From<&GenerationConfig> for GeminiClientConfig {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_delay_ms: config.retry_delay_ms,
            timeout: Duration::from_secs(config.timeout_seconds),
            ..Self::new(Some(config.api_key.clone()), config.model.clone())
        }
    }
}

// ============================================================================
// Gemini API structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    system_instruction: GeminiContent,
    contents: Vec<GeminiContent>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
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

fn role_for(speaker: Speaker) -> &'static str {
    match speaker {
        Speaker::User => "user",
        Speaker::Assistant => "model",
    }
}

fn build_request(system_instruction: &str, transcript: &[Turn]) -> GeminiRequest {
    GeminiRequest {
        system_instruction: GeminiContent {
            role: None,
            parts: vec![GeminiPart {
                text: system_instruction.to_string(),
            }],
        },
        contents: transcript
            .iter()
            .map(|turn| GeminiContent {
                role: Some(role_for(turn.speaker).to_string()),
                parts: vec![GeminiPart {
                    text: turn.text.clone(),
                }],
            })
            .collect(),
    }
}

// ============================================================================
// GeminiGenerationClient
// ============================================================================

/// Gemini client: calls the `generateContent` endpoint.
#[derive(Debug, Clone)]
pub struct GeminiGenerationClient {
    client: Client,
    config: GeminiClientConfig,
    base_url: String,
}

impl GeminiGenerationClient {
    pub fn new(config: GeminiClientConfig) -> Result<Self, GenerationError> {
        Self::with_base_url(
            config,
            "https://generativelanguage.googleapis.com/v1beta".to_string(),
        )
    }

    /// Create a client with a custom base URL (for testing / proxies)
    pub fn with_base_url(
        config: GeminiClientConfig,
        base_url: String,
    ) -> Result<Self, GenerationError> {
        if config.api_key.is_empty() {
            return Err(GenerationError::MissingApiKey);
        }

        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            config,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &GenerationConfig) -> Result<Self, GenerationError> {
        Self::with_base_url(GeminiClientConfig::from(config), config.base_url.clone())
    }

    async fn generate_once(&self, request: &GeminiRequest) -> Result<String, GenerationError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.config.model, self.config.api_key
        );

        let response = self.client.post(&url).json(request).send().await?;

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

            return Err(GenerationError::Api { code, message });
        }

        let gemini_response: GeminiResponse = response.json().await?;

        let text: String = gemini_response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| content.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(GenerationError::EmptyResponse);
        }

        Ok(text)
    }
}

#[async_trait]
impl TextGenerationClient for GeminiGenerationClient {
    async fn generate(
        &self,
        system_instruction: &str,
        transcript: &[Turn],
    ) -> Result<String, GenerationError> {
        let request = build_request(system_instruction, transcript);

        let retry_strategy = ExponentialBackoff::from_millis(self.config.retry_delay_ms)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.config.max_retries);

        let result = RetryIf::spawn(
            retry_strategy,
            || self.generate_once(&request),
            |e: &GenerationError| e.is_retryable(),
        )
        .await;

        match result {
            Ok(text) => Ok(text),
            Err(e) if e.is_retryable() => {
                tracing::error!(
                    attempts = self.config.max_retries,
                    error = %e,
                    "All generation retry attempts failed"
                );
                Err(GenerationError::RetryExhausted {
                    attempts: self.config.max_retries,
                })
            }
            Err(e) => Err(e),
        }
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

// ============================================================================
// TESTS
// ============================================================================

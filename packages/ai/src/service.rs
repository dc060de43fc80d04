// ABOUTME: AI service for making text generation calls to Anthropic Claude
// ABOUTME: Handles API requests, response parsing, and JSON extraction from model output

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use marketwise_config::{
    ANTHROPIC_API_KEY, ANTHROPIC_MODEL, MARKETWISE_HTTP_CONNECT_TIMEOUT_SECS,
    MARKETWISE_HTTP_REQUEST_TIMEOUT_SECS,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_MAX_TOKENS: u32 = 1024;
const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error)]
pub enum AIServiceError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("No API key configured")]
    NoApiKey,

    #[error("Invalid response format")]
    InvalidResponse,
}

pub type AIServiceResult<T> = Result<T, AIServiceError>;

/// A single prompt sent to the text generation service
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    pub fn with_system(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Anything that can turn a prompt into unstructured text.
///
/// Calls may be slow (tens of seconds) and may fail; callers own retries.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate_text(&self, request: GenerationRequest)
        -> AIServiceResult<AIResponse<String>>;
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[allow(dead_code)]
    id: String,
    content: Vec<ContentBlock>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    #[allow(dead_code)]
    content_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

#[derive(Debug, Clone)]
pub struct AIResponse<T> {
    pub data: T,
    pub usage: Usage,
}

/// Connection settings for [`AIService`]
#[derive(Debug, Clone)]
pub struct AIServiceConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub api_url: String,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for AIServiceConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            api_url: ANTHROPIC_API_URL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }
}

impl AIServiceConfig {
    /// API key is read from ANTHROPIC_API_KEY, model from ANTHROPIC_MODEL
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let api_key = env::var(ANTHROPIC_API_KEY).ok().filter(|k| !k.is_empty());
        if api_key.is_none() {
            warn!("ANTHROPIC_API_KEY not set - text generation requests will fail");
        }

        let model = env::var(ANTHROPIC_MODEL).unwrap_or(defaults.model);
        if model != DEFAULT_MODEL {
            info!("Using custom Anthropic model: {}", model);
        }

        let secs = |name: &str, default: Duration| {
            env::var(name)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        Self {
            api_key,
            model,
            api_url: defaults.api_url,
            request_timeout: secs(MARKETWISE_HTTP_REQUEST_TIMEOUT_SECS, defaults.request_timeout),
            connect_timeout: secs(MARKETWISE_HTTP_CONNECT_TIMEOUT_SECS, defaults.connect_timeout),
        }
    }
}

/// AI service for making text generation calls
pub struct AIService {
    client: Client,
    config: AIServiceConfig,
}

impl AIService {
    /// Create the service with an HTTP client honouring the configured timeouts
    pub fn new(config: AIServiceConfig) -> AIServiceResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self { client, config })
    }

    /// Create the service from environment variables
    pub fn from_env() -> AIServiceResult<Self> {
        Self::new(AIServiceConfig::from_env())
    }

    /// Get the model being used by this service
    pub fn model(&self) -> &str {
        &self.config.model
    }

    async fn send(&self, request: &AnthropicRequest) -> AIServiceResult<AnthropicResponse> {
        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or(AIServiceError::NoApiKey)?;

        info!(
            "Making Anthropic API request: model={}, max_tokens={}",
            request.model, request.max_tokens
        );

        let response = self
            .client
            .post(&self.config.api_url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    let secs = self.config.request_timeout.as_secs();
                    error!("Anthropic API request timed out after {} seconds", secs);
                    AIServiceError::Timeout(secs)
                } else if e.is_connect() {
                    error!("Failed to connect to Anthropic API: {}", e);
                    AIServiceError::ApiError(format!(
                        "Connection failed: {}. Please check your internet connection.",
                        e
                    ))
                } else {
                    error!("Anthropic API request failed: {}", e);
                    AIServiceError::RequestFailed(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!("Anthropic API error: {} - {}", status, error_text);
            return Err(AIServiceError::ApiError(format!(
                "API returned {}: {}",
                status, error_text
            )));
        }

        response
            .json::<AnthropicResponse>()
            .await
            .map_err(|e| AIServiceError::ParseError(e.to_string()))
    }
}

#[async_trait]
impl TextGenerator for AIService {
    async fn generate_text(
        &self,
        request: GenerationRequest,
    ) -> AIServiceResult<AIResponse<String>> {
        let body = AnthropicRequest {
            model: self.config.model.clone(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            messages: vec![Message {
                role: "user".to_string(),
                content: request.prompt,
            }],
            system: request.system_prompt,
        };

        let response = self.send(&body).await?;

        // Extract text from the first content block
        let text = response
            .content
            .first()
            .ok_or(AIServiceError::InvalidResponse)?
            .text
            .clone();

        info!(
            "Text generation finished: {} tokens used",
            response.usage.total_tokens()
        );

        Ok(AIResponse {
            data: text,
            usage: response.usage,
        })
    }
}

/// Parse model output as JSON, tolerating markdown code fences around it
pub fn parse_json_response<T: for<'de> Deserialize<'de>>(text: &str) -> AIServiceResult<T> {
    // Strip markdown code fences if present (```json ... ```)
    let cleaned_text = text.trim();
    let json_text = if cleaned_text.starts_with("```") {
        // Find the first newline after opening fence
        let start = cleaned_text.find('\n').map(|i| i + 1).unwrap_or(0);
        // Search for the closing fence after the opening one
        let end = cleaned_text[start..]
            .rfind("```")
            .map(|i| i + start)
            .unwrap_or(cleaned_text.len());
        cleaned_text[start..end].trim()
    } else {
        cleaned_text
    };

    serde_json::from_str(json_text).map_err(|e| {
        let snippet: String = json_text.chars().take(500).collect();
        error!("JSON parsing failed: {}. JSON snippet: {}", e, snippet);
        AIServiceError::ParseError(format!("Failed to parse JSON: {}", e))
    })
}

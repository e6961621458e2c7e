//! AI module for per-row text generation
//!
//! Talks to an OpenAI-compatible chat-completions endpoint. The pipeline only
//! sees the [`TextGenerator`] trait, so tests and alternative services plug in
//! without touching the batch code.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rowwise::ai::{ChatClient, GeneratorConfig, GenerationRequest, TextGenerator};
//!
//! let config = GeneratorConfig::from_env()?;
//! let client = ChatClient::new(&config)?;
//! let request = GenerationRequest::new(&config.directive_text, "Summarize", "aspirin, ibuprofen");
//! let text = client.generate(&request).await?;
//! ```

pub mod prompt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::error::{GenerationError, GenerationResult};

pub use prompt::{ChatMessage, GenerationRequest, Role, DEFAULT_DIRECTIVE};

/// Default chat-completions endpoint
pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

/// Default model
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Default per-call timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Delay between retries in milliseconds
const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

/// Anything that turns a generation request into text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest<'_>) -> GenerationResult<String>;
}

/// Configuration of the external service, passed to the client and the
/// row transformer at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Chat-completions URL
    pub service_endpoint: String,
    /// System directive sent ahead of every instruction
    pub directive_text: String,
    /// Timeout applied to each call
    #[serde(with = "duration_secs")]
    pub per_call_timeout: Duration,
    /// Model name
    pub model: String,
    /// Bearer token
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Attempts per row (1 = no retry)
    pub max_attempts: u32,
    /// Pause between attempts
    #[serde(with = "duration_millis")]
    pub retry_delay: Duration,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            service_endpoint: DEFAULT_ENDPOINT.to_string(),
            directive_text: DEFAULT_DIRECTIVE.to_string(),
            per_call_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            max_attempts: 1,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        }
    }
}

impl GeneratorConfig {
    /// Build a config from the environment (a `.env` file is loaded first).
    ///
    /// - `OPENAI_API_KEY` (required)
    /// - `ROWWISE_ENDPOINT`, `ROWWISE_MODEL`, `ROWWISE_DIRECTIVE`, `ROWWISE_TIMEOUT_SECS` (optional)
    pub fn from_env() -> GenerationResult<Self> {
        let _ = dotenvy::dotenv();

        let api_key = env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| GenerationError::MissingApiKey("OPENAI_API_KEY not set".to_string()))?;

        let mut config = Self::default().with_api_key(api_key);

        if let Ok(endpoint) = env::var("ROWWISE_ENDPOINT") {
            config = config.with_endpoint(&endpoint);
        }
        if let Ok(model) = env::var("ROWWISE_MODEL") {
            config = config.with_model(&model);
        }
        if let Ok(directive) = env::var("ROWWISE_DIRECTIVE") {
            config = config.with_directive(&directive);
        }
        if let Some(secs) = env::var("ROWWISE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok())
        {
            config = config.with_timeout(Duration::from_secs(secs));
        }

        Ok(config)
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.service_endpoint = endpoint.to_string();
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_directive(mut self, directive: &str) -> Self {
        self.directive_text = directive.to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.per_call_timeout = timeout;
        self
    }

    /// Set attempts per row; zero is treated as one.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

/// Chat-completions client
#[derive(Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// API error response
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl ChatClient {
    /// Create a client. Fails when the config carries no API key.
    pub fn new(config: &GeneratorConfig) -> GenerationResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| GenerationError::MissingApiKey("no API key configured".to_string()))?;

        let http = reqwest::Client::builder()
            .timeout(config.per_call_timeout)
            .build()
            .map_err(|e| GenerationError::RequestFailed(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: config.service_endpoint.clone(),
            api_key,
            model: config.model.clone(),
            timeout: config.per_call_timeout,
        })
    }

    async fn call_api(&self, request: &GenerationRequest<'_>) -> GenerationResult<String> {
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: request.messages(),
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorBody>(&text)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| text.chars().take(500).collect());
            return Err(GenerationError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        parse_completion(&text)
    }

    fn transport_error(&self, e: reqwest::Error) -> GenerationError {
        if e.is_timeout() {
            GenerationError::Timeout(self.timeout)
        } else {
            GenerationError::RequestFailed(e.to_string())
        }
    }
}

#[async_trait]
impl TextGenerator for ChatClient {
    async fn generate(&self, request: &GenerationRequest<'_>) -> GenerationResult<String> {
        self.call_api(request).await
    }
}

/// Extract the first choice's text from a chat-completions body.
fn parse_completion(body: &str) -> GenerationResult<String> {
    let response: ChatCompletionResponse =
        serde_json::from_str(body).map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| GenerationError::InvalidResponse("no choices in response".to_string()))?;

    match choice.message.content {
        Some(text) => Ok(text),
        None => Err(GenerationError::EmptyResponse),
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

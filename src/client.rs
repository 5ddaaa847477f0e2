use crate::error::{AugmentError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;

/// Default chat-completions API root.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// One message in a chat-completions request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Body of a chat-completions request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f64,
}

impl CompletionRequest {
    /// A request carrying a single user message.
    pub fn user(model: &str, prompt: &str, max_tokens: u32, temperature: f64) -> Self {
        Self {
            model: model.to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens,
            temperature,
        }
    }

    /// Content of the first message, i.e. the rendered prompt.
    pub fn prompt(&self) -> &str {
        self.messages
            .first()
            .map(|m| m.content.as_str())
            .unwrap_or("")
    }
}

/// A remote text-generation service.
///
/// Implementations perform exactly one request per call and report every
/// failure as an error; retrying is the caller's job.
///
/// # Example
///
/// ```ignore
/// use llm_batch_augment::*;
///
/// struct Echo;
///
/// impl CompletionClient for Echo {
///     async fn complete(&self, request: &CompletionRequest) -> Result<String> {
///         Ok(request.prompt().to_uppercase())
///     }
/// }
/// ```
pub trait CompletionClient: Send + Sync + 'static {
    /// Send one request and return the trimmed text of the first choice.
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl Future<Output = Result<String>> + Send;
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
        }
    }

    /// Build a client from the `OPENAI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            AugmentError::InvalidConfig("OPENAI_API_KEY is not set".to_string())
        })?;
        Ok(Self::new(api_key))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

impl CompletionClient for OpenAiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let resp = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(AugmentError::Status { status, body });
        }

        let body = resp.text().await?;
        extract_content(&body)
    }
}

#[derive(Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Pull `choices[0].message.content` out of a response body, trimmed.
///
/// A body that isn't JSON at all (a gateway error page, a truncated read)
/// is an [`AugmentError::Json`] and gets retried. Valid JSON without a
/// completion is [`AugmentError::MalformedResponse`].
pub fn extract_content(body: &str) -> Result<String> {
    let completion: ChatCompletion = serde_json::from_str(body).inspect_err(|e| {
        tracing::debug!(
            "Undecodable completion body ({}): {}",
            e,
            body.chars().take(200).collect::<String>()
        );
    })?;

    completion
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|content| content.trim().to_string())
        .ok_or_else(|| AugmentError::MalformedResponse("response has no choices".to_string()))
}

//! Generative AI providers.
//!
//! Chat goes to Groq's OpenAI-compatible completions API and images to
//! ClipDrop's text-to-image API. Handlers only see [`GenerativeProvider`],
//! so tests can substitute a fake.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Default Groq API base URL.
pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Default ClipDrop API base URL.
pub const CLIPDROP_BASE_URL: &str = "https://clipdrop-api.co";

/// Chat model used for completions.
pub const GROQ_CHAT_MODEL: &str = "llama-3.1-8b-instant";

/// Error type for provider calls.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with an error status.
    #[error("{provider} returned {status}: {body}")]
    Api {
        /// Provider name.
        provider: &'static str,
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// The provider answered 2xx with an unexpected body.
    #[error("unexpected {provider} response: {reason}")]
    Malformed {
        /// Provider name.
        provider: &'static str,
        /// What was wrong.
        reason: String,
    },
}

/// Performs chat and image generation on behalf of a user.
#[async_trait]
pub trait GenerativeProvider: Send + Sync {
    /// Name reported for chat responses.
    fn chat_provider(&self) -> &'static str {
        "Groq"
    }

    /// Name reported for image responses.
    fn image_provider(&self) -> &'static str {
        "ClipDrop"
    }

    /// Complete a chat prompt.
    async fn chat(&self, prompt: &str) -> Result<String, ProviderError>;

    /// Generate a PNG image from a prompt.
    async fn image(&self, prompt: &str) -> Result<Vec<u8>, ProviderError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: String,
}

/// Groq + ClipDrop over HTTP.
#[derive(Debug, Clone)]
pub struct HttpProvider {
    client: Client,
    groq_url: String,
    groq_api_key: String,
    clipdrop_url: String,
    clipdrop_api_key: String,
}

impl HttpProvider {
    /// Create a provider against the public Groq and ClipDrop endpoints.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        groq_api_key: impl Into<String>,
        clipdrop_api_key: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            groq_url: GROQ_BASE_URL.to_string(),
            groq_api_key: groq_api_key.into(),
            clipdrop_url: CLIPDROP_BASE_URL.to_string(),
            clipdrop_api_key: clipdrop_api_key.into(),
        })
    }

    /// Point the provider at other base URLs (mock servers, proxies).
    #[must_use]
    pub fn with_base_urls(mut self, groq_url: &str, clipdrop_url: &str) -> Self {
        self.groq_url = groq_url.trim_end_matches('/').to_string();
        self.clipdrop_url = clipdrop_url.trim_end_matches('/').to_string();
        self
    }

    async fn check(
        provider: &'static str,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body: String = response
            .text()
            .await
            .unwrap_or_default()
            .chars()
            .take(512)
            .collect();
        Err(ProviderError::Api {
            provider,
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl GenerativeProvider for HttpProvider {
    async fn chat(&self, prompt: &str) -> Result<String, ProviderError> {
        let url = format!("{}/chat/completions", self.groq_url);
        let request = ChatRequest {
            model: GROQ_CHAT_MODEL,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.groq_api_key)
            .json(&request)
            .send()
            .await?;
        let response = Self::check("Groq", response).await?;

        let body: ChatResponse = response.json().await?;
        body.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::Malformed {
                provider: "Groq",
                reason: "no choices".into(),
            })
    }

    async fn image(&self, prompt: &str) -> Result<Vec<u8>, ProviderError> {
        let url = format!("{}/text-to-image/v1", self.clipdrop_url);
        let form = reqwest::multipart::Form::new().text("prompt", prompt.to_string());

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.clipdrop_api_key)
            .multipart(form)
            .send()
            .await?;
        let response = Self::check("ClipDrop", response).await?;

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(ProviderError::Malformed {
                provider: "ClipDrop",
                reason: "empty image".into(),
            });
        }
        Ok(bytes.to_vec())
    }
}

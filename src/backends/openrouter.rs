//! OpenRouter adapter speaking the OpenAI-compatible chat completions API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::ReviewError;
use crate::review::sse::{event_data, sse_review_stream};
use crate::review::{ReviewProvider, ReviewStream};

use super::http::ensure_success;

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
const STREAM_DONE_MARKER: &str = "[DONE]";

/// Configuration for the OpenRouter client.
#[derive(Debug, Clone)]
pub struct OpenRouterConfig {
    /// API key for authentication with OpenRouter.
    pub api_key: String,
    /// Endpoint base, overridable for tests.
    pub base_url: String,
    /// Optional `HTTP-Referer` attribution header.
    pub referer: Option<String>,
    /// Optional `X-Title` attribution header.
    pub title: Option<String>,
    /// Request timeout in seconds.
    pub timeout_seconds: Option<u64>,
}

/// Client for the OpenRouter aggregator.
#[derive(Debug, Clone)]
pub struct OpenRouter {
    config: Arc<OpenRouterConfig>,
    client: Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatRequestMessage<'a>>,
    stream: bool,
}

#[derive(Serialize)]
struct ChatRequestMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize, Debug)]
struct ChatChoice {
    message: ChatMessageBody,
}

#[derive(Deserialize, Debug)]
struct ChatMessageBody {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize, Debug)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize, Debug)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize, Debug)]
struct StreamDelta {
    content: Option<String>,
}

impl OpenRouter {
    pub fn new(api_key: impl Into<String>, timeout_seconds: Option<u64>) -> Self {
        let mut builder = Client::builder();
        if let Some(sec) = timeout_seconds {
            builder = builder.timeout(Duration::from_secs(sec));
        }
        Self::with_client(
            builder.build().expect("Failed to build reqwest Client"),
            api_key,
            DEFAULT_BASE_URL,
            timeout_seconds,
        )
    }

    /// Creates a client with an injected HTTP client and endpoint base.
    pub fn with_client(
        client: Client,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout_seconds: Option<u64>,
    ) -> Self {
        Self {
            config: Arc::new(OpenRouterConfig {
                api_key: api_key.into(),
                base_url: base_url.into().trim_end_matches('/').to_string(),
                referer: None,
                title: None,
                timeout_seconds,
            }),
            client,
        }
    }

    /// Sets the attribution headers OpenRouter uses for app rankings.
    pub fn with_attribution(
        mut self,
        referer: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        let config = Arc::make_mut(&mut self.config);
        config.referer = Some(referer.into());
        config.title = Some(title.into());
        self
    }

    fn check_ready(&self, cancel: &CancellationToken) -> Result<(), ReviewError> {
        if self.config.api_key.is_empty() {
            return Err(ReviewError::AuthError(
                "Missing OpenRouter API key".to_string(),
            ));
        }
        if cancel.is_cancelled() {
            return Err(ReviewError::Cancelled);
        }
        Ok(())
    }

    async fn post_chat(
        &self,
        prompt: &str,
        model: &str,
        stream: bool,
    ) -> Result<reqwest::Response, ReviewError> {
        let body = ChatRequest {
            model,
            messages: vec![ChatRequestMessage {
                role: "user",
                content: prompt,
            }],
            stream,
        };

        if log::log_enabled!(log::Level::Trace) {
            if let Ok(json) = serde_json::to_string(&body) {
                log::trace!("OpenRouter request payload: {json}");
            }
        }

        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&body);
        if let Some(referer) = &self.config.referer {
            request = request.header("HTTP-Referer", referer);
        }
        if let Some(title) = &self.config.title {
            request = request.header("X-Title", title);
        }
        if let Some(timeout) = self.config.timeout_seconds {
            request = request.timeout(Duration::from_secs(timeout));
        }

        let response = request.send().await?;
        log::debug!("OpenRouter HTTP status: {}", response.status());
        ensure_success(response, "OpenRouter API").await
    }
}

#[async_trait]
impl ReviewProvider for OpenRouter {
    fn name(&self) -> &str {
        "OpenRouter"
    }

    async fn review(
        &self,
        prompt: &str,
        model: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ReviewError> {
        self.check_ready(cancel)?;

        let response = self.post_chat(prompt, model, false).await?;
        if cancel.is_cancelled() {
            return Err(ReviewError::Cancelled);
        }

        let parsed: ChatResponse = response.json().await?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .unwrap_or_default();
        if text.is_empty() {
            return Err(ReviewError::EmptyResponse(self.name().to_string()));
        }
        Ok(text)
    }

    async fn review_stream(
        &self,
        prompt: &str,
        model: &str,
        cancel: CancellationToken,
    ) -> Result<ReviewStream, ReviewError> {
        self.check_ready(&cancel)?;

        let response = self.post_chat(prompt, model, true).await?;

        Ok(sse_review_stream(response, cancel, |event| {
            let Some(data) = event_data(event) else {
                return Ok(None);
            };
            if data.is_empty() || data == STREAM_DONE_MARKER {
                return Ok(None);
            }
            let chunk: StreamChunk = serde_json::from_str(&data)?;
            let content = chunk
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.delta.content)
                .unwrap_or_default();
            Ok((!content.is_empty()).then_some(content))
        }))
    }
}

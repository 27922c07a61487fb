//! Google Gemini adapter using the Generative Language API.
//!
//! Non-streaming reviews go through `generateContent`; streaming reviews use
//! `streamGenerateContent?alt=sse`, which delivers one JSON response object
//! per SSE event.

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

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Configuration for the Google client.
#[derive(Debug)]
pub struct GoogleConfig {
    /// API key for the Generative Language API.
    pub api_key: String,
    /// Endpoint base, overridable for tests.
    pub base_url: String,
    /// Request timeout in seconds.
    pub timeout_seconds: Option<u64>,
}

/// Client for Google's Gemini models.
///
/// Configuration is shared through `Arc`, making clones cheap.
#[derive(Debug, Clone)]
pub struct Google {
    config: Arc<GoogleConfig>,
    client: Client,
}

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Deserialize, Debug)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize, Debug)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize, Debug)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

impl GenerateContentResponse {
    fn text(&self) -> String {
        self.candidates
            .iter()
            .filter_map(|candidate| candidate.content.as_ref())
            .flat_map(|content| content.parts.iter())
            .map(|part| part.text.as_str())
            .collect()
    }
}

impl Google {
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
            config: Arc::new(GoogleConfig {
                api_key: api_key.into(),
                base_url: base_url.into().trim_end_matches('/').to_string(),
                timeout_seconds,
            }),
            client,
        }
    }

    fn check_ready(&self, cancel: &CancellationToken) -> Result<(), ReviewError> {
        if self.config.api_key.is_empty() {
            return Err(ReviewError::AuthError("Missing Google API key".to_string()));
        }
        if cancel.is_cancelled() {
            return Err(ReviewError::Cancelled);
        }
        Ok(())
    }

    async fn post_generate(
        &self,
        endpoint: String,
        prompt: &str,
    ) -> Result<reqwest::Response, ReviewError> {
        let body = GenerateContentRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text: prompt }],
            }],
        };

        if log::log_enabled!(log::Level::Trace) {
            if let Ok(json) = serde_json::to_string(&body) {
                log::trace!("Google request payload: {json}");
            }
        }

        let mut request = self
            .client
            .post(endpoint)
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body);
        if let Some(timeout) = self.config.timeout_seconds {
            request = request.timeout(Duration::from_secs(timeout));
        }

        let response = request.send().await?;
        log::debug!("Google HTTP status: {}", response.status());
        ensure_success(response, "Google API").await
    }
}

#[async_trait]
impl ReviewProvider for Google {
    fn name(&self) -> &str {
        "Google"
    }

    async fn review(
        &self,
        prompt: &str,
        model: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ReviewError> {
        self.check_ready(cancel)?;

        let endpoint = format!("{}/models/{model}:generateContent", self.config.base_url);
        let response = self.post_generate(endpoint, prompt).await?;

        if cancel.is_cancelled() {
            return Err(ReviewError::Cancelled);
        }

        let parsed: GenerateContentResponse = response.json().await?;
        let text = parsed.text();
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

        let endpoint = format!(
            "{}/models/{model}:streamGenerateContent?alt=sse",
            self.config.base_url
        );
        let response = self.post_generate(endpoint, prompt).await?;

        Ok(sse_review_stream(response, cancel, |event| {
            let Some(data) = event_data(event) else {
                return Ok(None);
            };
            if data.is_empty() {
                return Ok(None);
            }
            let chunk: GenerateContentResponse = serde_json::from_str(&data)?;
            let text = chunk.text();
            Ok((!text.is_empty()).then_some(text))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn client_for(server: &mockito::ServerGuard) -> Google {
        Google::with_client(Client::new(), "test-key", server.url(), None)
    }

    #[tokio::test]
    async fn review_returns_candidate_text() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/models/gemini-2.0-flash:generateContent")
            .match_header("x-goog-api-key", "test-key")
            .with_status(200)
            .with_body(
                r#"{"candidates":[{"content":{"parts":[{"text":"Looks "},{"text":"good"}]}}]}"#,
            )
            .create_async()
            .await;

        let text = client_for(&server)
            .review("review this", "gemini-2.0-flash", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(text, "Looks good");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn missing_api_key_is_an_auth_error() {
        let google = Google::with_client(Client::new(), "", DEFAULT_BASE_URL, None);
        let err = google
            .review("code", "gemini-2.0-flash", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewError::AuthError(_)));
    }

    #[tokio::test]
    async fn unauthorized_status_maps_to_auth_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/models/gemini-2.0-flash:generateContent")
            .with_status(403)
            .with_body("API key not valid")
            .create_async()
            .await;

        let err = client_for(&server)
            .review("code", "gemini-2.0-flash", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewError::AuthError(_)));
    }

    #[tokio::test]
    async fn empty_candidates_map_to_empty_response() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/models/gemini-2.0-flash:generateContent")
            .with_status(200)
            .with_body(r#"{"candidates":[]}"#)
            .create_async()
            .await;

        let err = client_for(&server)
            .review("code", "gemini-2.0-flash", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewError::EmptyResponse(_)));
    }

    #[tokio::test]
    async fn pre_cancelled_token_fails_without_a_request() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        // No server: the call must fail before any network activity.
        let google = Google::with_client(Client::new(), "key", "http://127.0.0.1:1", None);
        let err = google
            .review("code", "gemini-2.0-flash", &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn streaming_concatenates_sse_chunks() {
        let mut server = mockito::Server::new_async().await;
        let body = concat!(
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hello\"}]}}]}\n\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\" world\"}]}}]}\n\n",
        );
        server
            .mock("POST", "/models/gemini-2.0-flash:streamGenerateContent?alt=sse")
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let stream = client_for(&server)
            .review_stream("code", "gemini-2.0-flash", CancellationToken::new())
            .await
            .unwrap();
        let chunks: Vec<_> = stream.map(|r| r.unwrap()).collect().await;

        assert_eq!(chunks, vec!["Hello".to_string(), " world".to_string()]);
    }
}

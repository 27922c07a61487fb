//! Concrete provider adapters.

#[cfg(feature = "google")]
pub mod google;
#[cfg(feature = "openrouter")]
pub mod openrouter;

#[cfg(any(feature = "google", feature = "openrouter"))]
pub(crate) mod http {
    use reqwest::{Response, StatusCode};

    use crate::error::ReviewError;

    /// Maps a non-2xx response to the error taxonomy: credential failures
    /// become `AuthError`, everything else `HttpError`, with the provider
    /// body passed through verbatim.
    pub(crate) async fn ensure_success(
        response: Response,
        context: &str,
    ) -> Result<Response, ReviewError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = format!("{context} returned {status}: {body}");
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            Err(ReviewError::AuthError(message))
        } else {
            Err(ReviewError::HttpError(message))
        }
    }
}

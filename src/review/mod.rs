//! Core request types shared between the controller, the provider adapters
//! and the history store.

pub mod prompt;
pub(crate) mod sse;
pub mod traits;

use serde::{Deserialize, Serialize};

pub use traits::{ProviderRegistry, ReviewProvider, ReviewStream};

/// Which provider backend serves a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Google,
    OpenRouter,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Google => "google",
            ProviderKind::OpenRouter => "openrouter",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Human language the review output should be written in.
///
/// Affects prompt construction only; never mutated mid-flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputLanguage {
    #[default]
    En,
    Km,
    Es,
    Fr,
    Zh,
    Ja,
    Ko,
    Vi,
    Th,
}

impl OutputLanguage {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputLanguage::En => "en",
            OutputLanguage::Km => "km",
            OutputLanguage::Es => "es",
            OutputLanguage::Fr => "fr",
            OutputLanguage::Zh => "zh",
            OutputLanguage::Ja => "ja",
            OutputLanguage::Ko => "ko",
            OutputLanguage::Vi => "vi",
            OutputLanguage::Th => "th",
        }
    }
}

/// One review submission. Created at submission time, released when the
/// request reaches a terminal state.
#[derive(Debug, Clone)]
pub struct ReviewRequest {
    /// The source code to review. Must be non-empty after trimming.
    pub code: String,
    /// Provider selection, immutable for the request's lifetime.
    pub provider: ProviderKind,
    /// Model identifier passed through to the provider.
    pub model: String,
    /// Language the review text should be written in.
    pub output_language: OutputLanguage,
}

/// UI-observable status of the controller. Single source of truth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestState {
    /// No request has been submitted, or the last one was cleared.
    Idle,
    /// A request is running.
    InFlight {
        /// Whether the request uses the streaming code path. Read once at
        /// submission; toggling the preference mid-flight has no effect.
        streaming: bool,
    },
    /// The provider returned a complete response.
    Completed { text: String },
    /// The user cancelled after some content had arrived; the partial text
    /// is a usable, if incomplete, result.
    Cancelled { partial_text: String },
    /// The request failed, or was cancelled before any content arrived.
    Errored { message: String },
}

impl RequestState {
    pub fn is_in_flight(&self) -> bool {
        matches!(self, RequestState::InFlight { .. })
    }

    /// Final text a viewer should display, if any. Errored and in-flight
    /// states expose no text here, so an error message and review content
    /// can never surface together.
    pub fn display_text(&self) -> Option<&str> {
        match self {
            RequestState::Completed { text } => Some(text),
            RequestState::Cancelled { partial_text } => Some(partial_text),
            _ => None,
        }
    }
}

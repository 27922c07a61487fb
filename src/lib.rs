//! NobiCode core: a streaming code-review client for LLM providers.
//!
//! The crate is organized around a small state machine, the
//! [`ReviewController`], which takes a code snippet, fans it out to one of
//! the provider backends (Google Gemini or OpenRouter), accumulates the
//! streamed response, and drives a bounded-frequency display pipeline with a
//! debounced markdown formatting pass. Finished and cancelled-partial
//! reviews land in a bounded history store.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use nobicode::backends::google::Google;
//! use nobicode::{
//!     MemoryHistory, OutputLanguage, ProviderKind, ProviderRegistry, ReviewController,
//!     ReviewRequest,
//! };
//!
//! # async fn run() -> Result<(), nobicode::ReviewError> {
//! let mut providers = ProviderRegistry::new();
//! providers.register(ProviderKind::Google, Arc::new(Google::new("api-key", None)));
//!
//! let controller = ReviewController::new(providers, Arc::new(MemoryHistory::new()));
//! let state = controller
//!     .submit(
//!         ReviewRequest {
//!             code: "fn main() { println!(\"hi\"); }".to_string(),
//!             provider: ProviderKind::Google,
//!             model: "gemini-2.0-flash".to_string(),
//!             output_language: OutputLanguage::En,
//!         },
//!         true,
//!     )
//!     .await?;
//! println!("{:?}", state.display_text());
//! # Ok(())
//! # }
//! ```

pub mod backends;
pub mod config;
pub mod controller;
pub mod display;
pub mod error;
pub mod history;
pub mod review;

pub use config::ReviewConfig;
pub use controller::ReviewController;
pub use error::ReviewError;
pub use history::{
    HistoryEntry, HistoryRecorder, JsonHistoryStore, MemoryHistory, NewHistoryEntry, SaveReceipt,
};
pub use review::{
    OutputLanguage, ProviderKind, ProviderRegistry, RequestState, ReviewProvider, ReviewRequest,
    ReviewStream,
};

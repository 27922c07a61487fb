use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::Stream;
use tokio_util::sync::CancellationToken;

use crate::error::ReviewError;

use super::ProviderKind;

/// A finite, non-restartable stream of review text fragments.
pub type ReviewStream = Pin<Box<dyn Stream<Item = Result<String, ReviewError>> + Send>>;

/// Uniform capability over the concrete review backends.
///
/// Contract: if `cancel` is already triggered when a method is called, the
/// call fails immediately with [`ReviewError::Cancelled`] and no chunk is
/// produced. Streamed fragments are non-overlapping and order-preserving;
/// their concatenation equals the full response text.
#[async_trait]
pub trait ReviewProvider: Send + Sync {
    /// Provider display name, used in error messages.
    fn name(&self) -> &str;

    /// Sends the prompt and returns the full response text in one piece.
    async fn review(
        &self,
        prompt: &str,
        model: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ReviewError>;

    /// Sends the prompt and returns a lazy stream of text fragments. The
    /// stream observes `cancel` at each chunk boundary and yields
    /// [`ReviewError::Cancelled`] once the signal is seen.
    async fn review_stream(
        &self,
        prompt: &str,
        model: &str,
        cancel: CancellationToken,
    ) -> Result<ReviewStream, ReviewError>;
}

/// Explicitly constructed set of provider clients, built once at startup and
/// handed to the controller. Replaces any notion of process-global clients.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderKind, Arc<dyn ReviewProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the client serving `kind`.
    pub fn register(&mut self, kind: ProviderKind, provider: Arc<dyn ReviewProvider>) {
        self.providers.insert(kind, provider);
    }

    pub fn get(&self, kind: ProviderKind) -> Result<Arc<dyn ReviewProvider>, ReviewError> {
        self.providers.get(&kind).cloned().ok_or_else(|| {
            ReviewError::InvalidInput(format!("no provider registered for {kind}"))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .finish()
    }
}

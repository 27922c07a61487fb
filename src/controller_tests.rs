use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::error::ReviewError;
use crate::history::MemoryHistory;
use crate::review::{
    OutputLanguage, ProviderKind, ProviderRegistry, RequestState, ReviewProvider, ReviewRequest,
    ReviewStream,
};

use super::ReviewController;

type ChunkFeed = mpsc::UnboundedReceiver<Result<String, ReviewError>>;

/// Scriptable provider: either a fixed buffered response, a fixed chunk
/// sequence, or a live channel feed for tests that need to interleave
/// chunks with controller calls.
#[derive(Default)]
struct FakeProvider {
    buffered: Mutex<Option<Result<String, ReviewError>>>,
    buffered_gate: Mutex<Option<oneshot::Receiver<()>>>,
    chunks: Mutex<Option<Vec<Result<String, ReviewError>>>>,
    feed: Mutex<Option<ChunkFeed>>,
    stream_error: Mutex<Option<ReviewError>>,
    last_cancel: Mutex<Option<CancellationToken>>,
}

impl FakeProvider {
    fn with_buffered(text: &str) -> Arc<Self> {
        let provider = Self::default();
        *provider.buffered.lock().unwrap() = Some(Ok(text.to_string()));
        Arc::new(provider)
    }

    fn with_chunks(chunks: Vec<Result<String, ReviewError>>) -> Arc<Self> {
        let provider = Self::default();
        *provider.chunks.lock().unwrap() = Some(chunks);
        Arc::new(provider)
    }

    fn with_feed() -> (Arc<Self>, mpsc::UnboundedSender<Result<String, ReviewError>>) {
        let provider = Self::default();
        let (tx, rx) = mpsc::unbounded_channel();
        *provider.feed.lock().unwrap() = Some(rx);
        (Arc::new(provider), tx)
    }

    fn set_chunks(&self, chunks: Vec<Result<String, ReviewError>>) {
        *self.chunks.lock().unwrap() = Some(chunks);
    }

    fn last_cancel(&self) -> CancellationToken {
        self.last_cancel
            .lock()
            .unwrap()
            .clone()
            .expect("provider was never called")
    }
}

#[async_trait]
impl ReviewProvider for FakeProvider {
    fn name(&self) -> &str {
        "Fake"
    }

    async fn review(
        &self,
        _prompt: &str,
        _model: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ReviewError> {
        *self.last_cancel.lock().unwrap() = Some(cancel.clone());
        let gate = self.buffered_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        self.buffered
            .lock()
            .unwrap()
            .take()
            .expect("no buffered response scripted")
    }

    async fn review_stream(
        &self,
        _prompt: &str,
        _model: &str,
        cancel: CancellationToken,
    ) -> Result<ReviewStream, ReviewError> {
        *self.last_cancel.lock().unwrap() = Some(cancel.clone());
        if let Some(err) = self.stream_error.lock().unwrap().take() {
            return Err(err);
        }
        if let Some(rx) = self.feed.lock().unwrap().take() {
            let feed = stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            });
            return Ok(Box::pin(feed));
        }
        let chunks = self
            .chunks
            .lock()
            .unwrap()
            .take()
            .expect("no chunks scripted");
        Ok(Box::pin(stream::iter(chunks)))
    }
}

fn controller_with(provider: Arc<FakeProvider>) -> (ReviewController, Arc<MemoryHistory>) {
    let mut registry = ProviderRegistry::new();
    registry.register(ProviderKind::Google, provider);
    let history = Arc::new(MemoryHistory::new());
    (ReviewController::new(registry, history.clone()), history)
}

fn request(code: &str) -> ReviewRequest {
    ReviewRequest {
        code: code.to_string(),
        provider: ProviderKind::Google,
        model: "test-model".to_string(),
        output_language: OutputLanguage::En,
    }
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached within 2s");
}

#[tokio::test]
async fn rejects_blank_code_without_a_state_change() {
    let (controller, history) = controller_with(FakeProvider::with_buffered("unused"));

    let err = controller.submit(request("   \n\t"), false).await.unwrap_err();

    assert!(matches!(err, ReviewError::InvalidInput(_)));
    assert_eq!(controller.state(), RequestState::Idle);
    assert!(history.entries().is_empty());
}

#[tokio::test]
async fn rejects_unregistered_provider() {
    let (controller, _history) = controller_with(FakeProvider::with_buffered("unused"));

    let mut req = request("fn main() {}");
    req.provider = ProviderKind::OpenRouter;
    let err = controller.submit(req, false).await.unwrap_err();

    assert!(matches!(err, ReviewError::InvalidInput(_)));
    assert_eq!(controller.state(), RequestState::Idle);
}

#[tokio::test]
async fn buffered_completion_saves_history() {
    let (controller, history) = controller_with(FakeProvider::with_buffered("Solid work."));

    let state = controller.submit(request("fn main() {}"), false).await.unwrap();

    assert_eq!(
        state,
        RequestState::Completed {
            text: "Solid work.".to_string()
        }
    );
    let entries = history.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].response, "Solid work.");
    assert_eq!(entries[0].model, "test-model");
    assert!(controller.last_save().is_some());
    assert!(controller.rendered_html().unwrap().contains("Solid work."));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn buffered_mode_exposes_no_intermediate_text() {
    let provider = FakeProvider::with_buffered("done");
    let (gate_tx, gate_rx) = oneshot::channel();
    *provider.buffered_gate.lock().unwrap() = Some(gate_rx);
    let (controller, _history) = controller_with(provider);

    let task = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.submit(request("let x = 1;"), false).await })
    };
    wait_for(|| controller.state().is_in_flight()).await;

    assert_eq!(controller.state(), RequestState::InFlight { streaming: false });
    assert_eq!(controller.live_text(), None);

    gate_tx.send(()).unwrap();
    let state = task.await.unwrap().unwrap();
    assert_eq!(
        state,
        RequestState::Completed {
            text: "done".to_string()
        }
    );
}

#[tokio::test]
async fn streaming_completion_concatenates_chunks() {
    let provider = FakeProvider::with_chunks(vec![
        Ok("## Review\n".to_string()),
        Ok("Looks ".to_string()),
        Ok("good.".to_string()),
    ]);
    let (controller, history) = controller_with(provider);

    let state = controller.submit(request("fn main() {}"), true).await.unwrap();

    assert_eq!(
        state,
        RequestState::Completed {
            text: "## Review\nLooks good.".to_string()
        }
    );
    assert_eq!(history.entries()[0].response, "## Review\nLooks good.");
}

#[tokio::test]
async fn empty_stream_is_an_empty_response_error() {
    let provider = FakeProvider::with_chunks(vec![]);
    let (controller, history) = controller_with(provider);

    let state = controller.submit(request("fn main() {}"), true).await.unwrap();

    match &state {
        RequestState::Errored { message } => assert!(message.contains("Fake")),
        other => panic!("expected Errored, got {other:?}"),
    }
    assert!(history.entries().is_empty());
}

#[tokio::test]
async fn stream_error_discards_partial_content() {
    let provider = FakeProvider::with_chunks(vec![
        Ok("some partial text".to_string()),
        Err(ReviewError::HttpError("connection reset".to_string())),
    ]);
    let (controller, history) = controller_with(provider);

    let state = controller.submit(request("fn main() {}"), true).await.unwrap();

    match &state {
        RequestState::Errored { message } => assert!(message.contains("connection reset")),
        other => panic!("expected Errored, got {other:?}"),
    }
    // Error and review content are mutually exclusive.
    assert_eq!(state.display_text(), None);
    assert_eq!(controller.rendered_html(), None);
    assert_eq!(controller.live_text(), None);
    assert!(history.entries().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_with_content_preserves_and_saves_the_partial() {
    let (provider, feed) = FakeProvider::with_feed();
    let (controller, history) = controller_with(provider);

    let task = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.submit(request("fn main() {}"), true).await })
    };

    feed.send(Ok("Hello".to_string())).unwrap();
    feed.send(Ok(" world".to_string())).unwrap();
    wait_for(|| controller.live_text().as_deref() == Some("Hello world")).await;

    controller.cancel();

    let expected = RequestState::Cancelled {
        partial_text: "Hello world".to_string(),
    };
    // cancel() settles the state synchronously, before the task unwinds.
    assert_eq!(controller.state(), expected);

    let state = task.await.unwrap().unwrap();
    assert_eq!(state, expected);

    let entries = history.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].response, "Hello world");
    assert!(controller.rendered_html().unwrap().contains("Hello world"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_without_content_errors_and_saves_nothing() {
    let (provider, _feed) = FakeProvider::with_feed();
    let (controller, history) = controller_with(provider);

    let task = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.submit(request("fn main() {}"), true).await })
    };
    wait_for(|| controller.state().is_in_flight()).await;

    controller.cancel();

    let state = task.await.unwrap().unwrap();
    assert_eq!(
        state,
        RequestState::Errored {
            message: "review cancelled".to_string()
        }
    );
    assert!(history.entries().is_empty());
    assert_eq!(controller.rendered_html(), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn double_cancel_is_idempotent() {
    let (provider, feed) = FakeProvider::with_feed();
    let (controller, history) = controller_with(provider);

    let task = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.submit(request("fn main() {}"), true).await })
    };
    feed.send(Ok("partial".to_string())).unwrap();
    wait_for(|| controller.live_text().as_deref() == Some("partial")).await;

    controller.cancel();
    let first = controller.state();
    controller.cancel();

    assert_eq!(controller.state(), first);
    task.await.unwrap().unwrap();
    assert_eq!(history.entries().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn new_submission_supersedes_and_silently_discards_the_prior() {
    let (provider, feed) = FakeProvider::with_feed();
    let (controller, history) = controller_with(provider.clone());

    let first = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.submit(request("fn first() {}"), true).await })
    };
    feed.send(Ok("orphaned partial".to_string())).unwrap();
    wait_for(|| controller.live_text().as_deref() == Some("orphaned partial")).await;
    let first_token = provider.last_cancel();

    provider.set_chunks(vec![Ok("second result".to_string())]);
    let state = controller.submit(request("fn second() {}"), true).await.unwrap();

    // The prior request was cancelled and its partial discarded without a
    // history entry; the new request starts from an empty buffer.
    assert!(first_token.is_cancelled());
    assert_eq!(
        state,
        RequestState::Completed {
            text: "second result".to_string()
        }
    );
    let entries = history.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].response, "second result");
    assert_eq!(entries[0].code, "fn second() {}");

    let first_outcome = first.await.unwrap().unwrap();
    assert_ne!(
        first_outcome,
        RequestState::Cancelled {
            partial_text: "orphaned partial".to_string()
        }
    );
}

#[tokio::test]
async fn provider_reported_cancellation_converges_on_the_error_branch() {
    let provider = Arc::new(FakeProvider::default());
    *provider.stream_error.lock().unwrap() = Some(ReviewError::Cancelled);
    let (controller, history) = controller_with(provider);

    let state = controller.submit(request("fn main() {}"), true).await.unwrap();

    assert_eq!(
        state,
        RequestState::Errored {
            message: "review cancelled".to_string()
        }
    );
    assert!(history.entries().is_empty());
}

#[tokio::test]
async fn clear_returns_to_idle_after_a_terminal_state() {
    let (controller, _history) = controller_with(FakeProvider::with_buffered("done"));

    controller.submit(request("fn main() {}"), false).await.unwrap();
    assert!(matches!(controller.state(), RequestState::Completed { .. }));

    controller.clear();
    assert_eq!(controller.state(), RequestState::Idle);
    assert_eq!(controller.rendered_html(), None);
    assert_eq!(controller.last_save(), None);
}

#[tokio::test]
async fn cancel_while_idle_is_a_no_op() {
    let (controller, _history) = controller_with(FakeProvider::with_buffered("unused"));
    controller.cancel();
    assert_eq!(controller.state(), RequestState::Idle);
}

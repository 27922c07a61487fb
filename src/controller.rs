//! Request controller: the state machine coordinating submission,
//! cancellation, single-flight enforcement and the streaming display
//! pipeline.
//!
//! All state transitions happen behind one mutex and between await points,
//! so a request runs as a sequence of atomic steps on a single logical
//! thread. The only suspension points are the provider call, the frame
//! interval and the cancellation signal.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::display::scheduler::FRAME_INTERVAL;
use crate::display::{ChunkAccumulator, RenderScheduler};
use crate::error::ReviewError;
use crate::history::{HistoryRecorder, NewHistoryEntry, SaveReceipt};
use crate::review::prompt::build_review_prompt;
use crate::review::{ProviderRegistry, RequestState, ReviewProvider, ReviewRequest};

/// Coordinates a single review request from submission through chunk
/// accumulation, debounced rendering, completion, error and cancellation.
///
/// At most one request is in flight at a time; a newer submission supersedes
/// and cancels the previous one. Clones share the same state.
#[derive(Clone)]
pub struct ReviewController {
    providers: ProviderRegistry,
    history: Arc<dyn HistoryRecorder>,
    inner: Arc<Mutex<ControllerInner>>,
}

struct ControllerInner {
    state: RequestState,
    /// Monotonic submission counter. A finished drive task only touches
    /// shared state when its generation still matches, which keeps a
    /// superseded request from resurrecting anything.
    generation: u64,
    /// Present only while a request is in flight.
    active: Option<ActiveRequest>,
    /// Kept across terminal states so the rendered output stays visible.
    scheduler: Option<Arc<Mutex<RenderScheduler>>>,
    last_save: Option<SaveReceipt>,
}

struct ActiveRequest {
    request: ReviewRequest,
    cancel: CancellationToken,
    accumulator: ChunkAccumulator,
}

impl ReviewController {
    pub fn new(providers: ProviderRegistry, history: Arc<dyn HistoryRecorder>) -> Self {
        Self {
            providers,
            history,
            inner: Arc::new(Mutex::new(ControllerInner {
                state: RequestState::Idle,
                generation: 0,
                active: None,
                scheduler: None,
                last_save: None,
            })),
        }
    }

    /// Runs one review request to a terminal state.
    ///
    /// `streaming` is the mode flag read once at submission; toggling the
    /// preference while the request runs has no effect on it. An empty code
    /// snippet or an unregistered provider is rejected before any state
    /// transition.
    pub async fn submit(
        &self,
        request: ReviewRequest,
        streaming: bool,
    ) -> Result<RequestState, ReviewError> {
        if request.code.trim().is_empty() {
            return Err(ReviewError::InvalidInput("no code to review".to_string()));
        }
        let provider = self.providers.get(request.provider)?;

        let (generation, cancel, accumulator, scheduler) = self.begin(&request, streaming);
        let prompt = build_review_prompt(&request.code, request.output_language);

        let outcome = if streaming {
            self.drive_streaming(
                provider.as_ref(),
                &prompt,
                &request.model,
                &cancel,
                &accumulator,
                &scheduler,
            )
            .await
        } else {
            self.drive_buffered(provider.as_ref(), &prompt, &request.model, &cancel)
                .await
        };

        Ok(match outcome {
            Ok(text) => self.complete(generation, text),
            Err(err) if err.is_cancelled() => self.settle_cancellation(generation),
            Err(err) => self.fail(generation, err),
        })
    }

    /// Cancels the in-flight request, if any. The partial-content fork is
    /// applied synchronously so the user-visible result appears without
    /// waiting for the provider call to unwind. Calling this twice, or while
    /// idle, is a no-op.
    pub fn cancel(&self) {
        let mut inner = self.lock_inner();
        if !inner.state.is_in_flight() {
            return;
        }
        if let Some(active) = &inner.active {
            active.cancel.cancel();
        }
        self.apply_cancellation_branch(&mut inner);
    }

    /// Current UI-observable status.
    pub fn state(&self) -> RequestState {
        self.lock_inner().state.clone()
    }

    /// Raw streamed text flushed so far. Only a streaming request exposes
    /// this surface; buffered mode has no observable intermediate text.
    pub fn live_text(&self) -> Option<String> {
        let inner = self.lock_inner();
        if !matches!(inner.state, RequestState::InFlight { streaming: true }) {
            return None;
        }
        let scheduler = inner.scheduler.clone()?;
        drop(inner);
        let scheduler = scheduler.lock().expect("scheduler lock poisoned");
        Some(scheduler.visible().to_string())
    }

    /// Formatted output of the last render pass. Not exposed when the
    /// request errored, so an error message and review content can never be
    /// shown together.
    pub fn rendered_html(&self) -> Option<String> {
        let inner = self.lock_inner();
        match inner.state {
            RequestState::Idle | RequestState::Errored { .. } => return None,
            _ => {}
        }
        let scheduler = inner.scheduler.clone()?;
        drop(inner);
        let scheduler = scheduler.lock().expect("scheduler lock poisoned");
        Some(scheduler.rendered().to_string())
    }

    /// Receipt from the most recent history save, for the near-capacity
    /// warning.
    pub fn last_save(&self) -> Option<SaveReceipt> {
        self.lock_inner().last_save
    }

    /// Returns to `Idle`, clearing any terminal result. No-op while a
    /// request is in flight.
    pub fn clear(&self) {
        let mut inner = self.lock_inner();
        if inner.state.is_in_flight() {
            return;
        }
        inner.state = RequestState::Idle;
        inner.scheduler = None;
        inner.last_save = None;
    }

    /// Sets up the in-flight record: supersedes any prior request, resets
    /// the accumulator and installs a fresh cancellation token.
    fn begin(
        &self,
        request: &ReviewRequest,
        streaming: bool,
    ) -> (
        u64,
        CancellationToken,
        ChunkAccumulator,
        Arc<Mutex<RenderScheduler>>,
    ) {
        let mut inner = self.lock_inner();

        // Single-flight: an implicitly superseded request is cancelled and
        // its partial content discarded silently; only an explicit cancel()
        // saves partials.
        if let Some(prior) = inner.active.take() {
            log::debug!("superseding in-flight review request");
            prior.cancel.cancel();
        }

        inner.generation += 1;
        let generation = inner.generation;

        let cancel = CancellationToken::new();
        let accumulator = ChunkAccumulator::new();
        accumulator.reset();
        let scheduler = Arc::new(Mutex::new(RenderScheduler::new(accumulator.clone())));

        inner.state = RequestState::InFlight { streaming };
        inner.last_save = None;
        inner.scheduler = Some(scheduler.clone());
        inner.active = Some(ActiveRequest {
            request: request.clone(),
            cancel: cancel.clone(),
            accumulator: accumulator.clone(),
        });

        (generation, cancel, accumulator, scheduler)
    }

    /// Streaming drive loop: one cooperative task selecting over the chunk
    /// stream, the frame cadence and the cancellation signal.
    async fn drive_streaming(
        &self,
        provider: &dyn ReviewProvider,
        prompt: &str,
        model: &str,
        cancel: &CancellationToken,
        accumulator: &ChunkAccumulator,
        scheduler: &Arc<Mutex<RenderScheduler>>,
    ) -> Result<String, ReviewError> {
        let mut stream = tokio::select! {
            _ = cancel.cancelled() => return Err(ReviewError::Cancelled),
            opened = provider.review_stream(prompt, model, cancel.clone()) => opened?,
        };

        let mut frames = tokio::time::interval(FRAME_INTERVAL);
        frames.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Err(ReviewError::Cancelled),
                _ = frames.tick() => {
                    let mut sched = scheduler.lock().expect("scheduler lock poisoned");
                    sched.on_frame();
                    sched.maybe_render(Instant::now());
                }
                chunk = stream.next() => match chunk {
                    Some(Ok(delta)) => {
                        accumulator.append(&delta);
                        scheduler
                            .lock()
                            .expect("scheduler lock poisoned")
                            .mark_dirty(Instant::now());
                    }
                    Some(Err(err)) => return Err(err),
                    None => break,
                },
            }
        }

        let full_text = accumulator.snapshot();
        if full_text.is_empty() {
            return Err(ReviewError::EmptyResponse(provider.name().to_string()));
        }
        Ok(full_text)
    }

    /// Non-streaming path: the full text is installed atomically on
    /// completion, with no partial state ever observable.
    async fn drive_buffered(
        &self,
        provider: &dyn ReviewProvider,
        prompt: &str,
        model: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ReviewError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(ReviewError::Cancelled),
            result = provider.review(prompt, model, cancel) => result,
        }
    }

    fn complete(&self, generation: u64, text: String) -> RequestState {
        let mut inner = self.lock_inner();
        if inner.generation != generation || !inner.state.is_in_flight() {
            return inner.state.clone();
        }

        let active = inner.active.take().expect("in-flight without active request");
        if let Some(scheduler) = &inner.scheduler {
            scheduler
                .lock()
                .expect("scheduler lock poisoned")
                .finalize(&text);
        }
        inner.last_save = self.record(&active.request, &text);
        inner.state = RequestState::Completed { text };
        inner.state.clone()
    }

    fn fail(&self, generation: u64, err: ReviewError) -> RequestState {
        let mut inner = self.lock_inner();
        if inner.generation != generation || !inner.state.is_in_flight() {
            return inner.state.clone();
        }

        inner.active = None;
        if let Some(scheduler) = &inner.scheduler {
            scheduler
                .lock()
                .expect("scheduler lock poisoned")
                .teardown();
        }
        log::warn!("review request failed: {err}");
        inner.state = RequestState::Errored {
            message: err.to_string(),
        };
        inner.state.clone()
    }

    /// Applied when the drive task observes a cancellation. If `cancel()`
    /// already settled the state synchronously this is a no-op; a superseded
    /// generation never touches shared state.
    fn settle_cancellation(&self, generation: u64) -> RequestState {
        let mut inner = self.lock_inner();
        if inner.generation != generation || !inner.state.is_in_flight() {
            return inner.state.clone();
        }
        self.apply_cancellation_branch(&mut inner);
        inner.state.clone()
    }

    /// The content/no-content fork shared by `cancel()` and the drive task:
    /// partial text is preserved and persisted, an empty buffer degrades to
    /// a plain cancellation error.
    fn apply_cancellation_branch(&self, inner: &mut MutexGuard<'_, ControllerInner>) {
        let active = inner.active.take().expect("in-flight without active request");
        let partial = active.accumulator.snapshot();

        if partial.is_empty() {
            if let Some(scheduler) = &inner.scheduler {
                scheduler
                    .lock()
                    .expect("scheduler lock poisoned")
                    .teardown();
            }
            inner.state = RequestState::Errored {
                message: ReviewError::Cancelled.to_string(),
            };
            return;
        }

        if let Some(scheduler) = &inner.scheduler {
            scheduler
                .lock()
                .expect("scheduler lock poisoned")
                .finalize(&partial);
        }
        inner.last_save = self.record(&active.request, &partial);
        inner.state = RequestState::Cancelled {
            partial_text: partial,
        };
    }

    fn record(&self, request: &ReviewRequest, text: &str) -> Option<SaveReceipt> {
        let entry = NewHistoryEntry {
            code: request.code.clone(),
            response: text.to_string(),
            provider: request.provider,
            model: request.model.clone(),
            language: request.output_language,
        };
        match self.history.save(entry) {
            Ok(receipt) => {
                if receipt.near_capacity {
                    log::info!("review history near capacity: {} entries", receipt.saved_count);
                }
                Some(receipt)
            }
            Err(err) => {
                log::warn!("failed to save review to history: {err}");
                None
            }
        }
    }

    fn lock_inner(&self) -> MutexGuard<'_, ControllerInner> {
        self.inner.lock().expect("controller lock poisoned")
    }
}

impl std::fmt::Debug for ReviewController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReviewController")
            .field("state", &self.lock_inner().state)
            .finish()
    }
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod tests;

//! Incremental server-sent-events decoding for the streaming backends.
//!
//! Network chunks may split an event anywhere, including inside a multi-byte
//! UTF-8 sequence; the decoder buffers until a complete event is available.

use bytes::Bytes;
use futures::stream::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::error::ReviewError;

use super::traits::ReviewStream;

const EVENT_DELIMITER: &str = "\n\n";

/// Accumulates raw bytes and yields complete SSE events.
#[derive(Default)]
pub(crate) struct SseDecoder {
    text: String,
    partial_utf8: Vec<u8>,
}

impl SseDecoder {
    /// Feeds raw bytes and returns every complete event they unlock, in order.
    pub(crate) fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.partial_utf8.extend_from_slice(bytes);
        match std::str::from_utf8(&self.partial_utf8) {
            Ok(valid) => {
                self.text.push_str(valid);
                self.partial_utf8.clear();
            }
            Err(err) => {
                // Keep the trailing incomplete sequence for the next feed.
                let valid_up_to = err.valid_up_to();
                if valid_up_to == 0 {
                    return Vec::new();
                }
                let valid = String::from_utf8_lossy(&self.partial_utf8[..valid_up_to]).into_owned();
                self.text.push_str(&valid);
                self.partial_utf8.drain(..valid_up_to);
            }
        }
        self.drain_events()
    }

    fn drain_events(&mut self) -> Vec<String> {
        let mut events = Vec::new();
        while let Some(pos) = self.text.find(EVENT_DELIMITER) {
            let end = pos + EVENT_DELIMITER.len();
            events.push(self.text[..end].to_string());
            self.text.drain(..end);
        }
        events
    }
}

/// Joins the `data:` lines of one SSE event. Returns `None` for events that
/// carry no data field (comments, keep-alives).
pub(crate) fn event_data(event: &str) -> Option<String> {
    let mut payload: Option<String> = None;
    for line in event.lines() {
        if let Some(rest) = line.strip_prefix("data:") {
            let rest = rest.strip_prefix(' ').unwrap_or(rest);
            match payload.as_mut() {
                Some(existing) => {
                    existing.push('\n');
                    existing.push_str(rest);
                }
                None => payload = Some(rest.to_string()),
            }
        }
    }
    payload
}

struct SseStreamState<F> {
    decoder: SseDecoder,
    cancel: CancellationToken,
    parse: F,
    finished: bool,
}

/// Wraps an SSE response body into a stream of review text fragments.
///
/// `parse` maps one complete event to zero or one fragment. The cancellation
/// token is checked at every chunk boundary; once it fires, the stream yields
/// a single [`ReviewError::Cancelled`] and produces nothing further.
pub(crate) fn sse_review_stream<F>(
    response: reqwest::Response,
    cancel: CancellationToken,
    parse: F,
) -> ReviewStream
where
    F: Fn(&str) -> Result<Option<String>, ReviewError> + Send + 'static,
{
    let state = SseStreamState {
        decoder: SseDecoder::default(),
        cancel,
        parse,
        finished: false,
    };

    let stream = response
        .bytes_stream()
        .scan(state, |state, chunk| {
            let results = next_fragments(state, chunk);
            async move { Some(results) }
        })
        .flat_map(futures::stream::iter);

    Box::pin(stream)
}

fn next_fragments<F>(
    state: &mut SseStreamState<F>,
    chunk: Result<Bytes, reqwest::Error>,
) -> Vec<Result<String, ReviewError>>
where
    F: Fn(&str) -> Result<Option<String>, ReviewError>,
{
    if state.finished {
        return Vec::new();
    }
    if state.cancel.is_cancelled() {
        state.finished = true;
        return vec![Err(ReviewError::Cancelled)];
    }

    let bytes = match chunk {
        Ok(bytes) => bytes,
        Err(err) => {
            state.finished = true;
            return vec![Err(ReviewError::HttpError(err.to_string()))];
        }
    };

    state
        .decoder
        .feed(&bytes)
        .iter()
        .filter_map(|event| match (state.parse)(event) {
            Ok(Some(fragment)) => Some(Ok(fragment)),
            Ok(None) => None,
            Err(err) => Some(Err(err)),
        })
        .collect()
}

#[cfg(test)]
#[path = "sse_tests.rs"]
mod tests;

use std::time::{Duration, Instant};

use super::accumulator::ChunkAccumulator;
use super::markdown::render_markdown;

/// Cadence at which pending flushes are applied, roughly one paint
/// opportunity at 60 fps. The scheduler itself is mechanism-agnostic: any
/// driver that calls [`RenderScheduler::on_frame`] with a bounded period
/// satisfies the contract.
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Idle gap before the formatting pass re-runs during streaming.
const RENDER_DEBOUNCE: Duration = Duration::from_millis(150);
/// Longer gap once the payload is large enough that formatting gets costly.
const RENDER_DEBOUNCE_LARGE: Duration = Duration::from_millis(300);
/// Payload size above which the longer debounce applies.
const LARGE_PAYLOAD_BYTES: usize = 5_000;

/// Decouples "a chunk arrived" from "the display must repaint".
///
/// Tracks two derived values: the raw `visible` text, refreshed at most once
/// per frame, and the formatted `rendered` HTML, refreshed only after an
/// idle gap so the expensive markdown pass does not run on every frame.
pub struct RenderScheduler {
    accumulator: ChunkAccumulator,
    visible: String,
    rendered: String,
    /// Length of the visible text the rendered value was produced from.
    /// Append-only input makes a length comparison equivalent to an equality
    /// check between the two.
    rendered_src_len: usize,
    flush_pending: bool,
    last_append: Option<Instant>,
}

impl RenderScheduler {
    pub fn new(accumulator: ChunkAccumulator) -> Self {
        Self {
            accumulator,
            visible: String::new(),
            rendered: String::new(),
            rendered_src_len: 0,
            flush_pending: false,
            last_append: None,
        }
    }

    /// Called on each append. Multiple calls before the next frame coalesce
    /// into one pending flush.
    pub fn mark_dirty(&mut self, now: Instant) {
        self.flush_pending = true;
        self.last_append = Some(now);
    }

    /// Applies the pending flush, if any: copies an accumulator snapshot into
    /// the visible value. Returns whether a flush happened.
    pub fn on_frame(&mut self) -> bool {
        if !self.flush_pending {
            return false;
        }
        self.visible = self.accumulator.snapshot();
        self.flush_pending = false;
        true
    }

    /// Re-runs the formatting pass once the debounce gap has elapsed since
    /// the last append. Returns whether formatting ran.
    pub fn maybe_render(&mut self, now: Instant) -> bool {
        if self.visible.len() == self.rendered_src_len {
            return false;
        }
        let Some(last_append) = self.last_append else {
            return false;
        };
        if now.duration_since(last_append) < self.debounce_gap() {
            return false;
        }
        self.render_visible();
        true
    }

    /// Installs the complete final text, bypassing both the frame flush and
    /// the formatting debounce.
    pub fn finalize(&mut self, full_text: &str) {
        self.visible = full_text.to_string();
        self.flush_pending = false;
        self.last_append = None;
        self.render_visible();
    }

    /// Drops any pending flush and debounce state so a stale timer cannot
    /// resurrect output after the request ended.
    pub fn teardown(&mut self) {
        self.flush_pending = false;
        self.last_append = None;
    }

    pub fn visible(&self) -> &str {
        &self.visible
    }

    pub fn rendered(&self) -> &str {
        &self.rendered
    }

    fn debounce_gap(&self) -> Duration {
        if self.visible.len() > LARGE_PAYLOAD_BYTES {
            RENDER_DEBOUNCE_LARGE
        } else {
            RENDER_DEBOUNCE
        }
    }

    fn render_visible(&mut self) {
        self.rendered = render_markdown(&self.visible);
        self.rendered_src_len = self.visible.len();
    }
}

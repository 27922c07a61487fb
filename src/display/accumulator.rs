use std::sync::{Arc, Mutex};

/// Append-only buffer collecting streamed text fragments, independent of any
/// rendering cadence.
///
/// The handle is cheaply clonable; all clones observe the same buffer.
/// While a request is active the buffer only grows, so every snapshot is a
/// contiguous prefix of the eventual full text.
#[derive(Clone, Default)]
pub struct ChunkAccumulator {
    buffer: Arc<Mutex<String>>,
}

impl ChunkAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears the buffer. Called exactly once per new request, before the
    /// first chunk can arrive.
    pub fn reset(&self) {
        self.buffer.lock().expect("accumulator lock poisoned").clear();
    }

    /// Appends a fragment. An empty chunk is a no-op; this operation cannot
    /// fail and has no effect on any rendering surface.
    pub fn append(&self, chunk: &str) {
        if chunk.is_empty() {
            return;
        }
        self.buffer
            .lock()
            .expect("accumulator lock poisoned")
            .push_str(chunk);
    }

    /// Current buffer contents. Safe to call at any time.
    pub fn snapshot(&self) -> String {
        self.buffer.lock().expect("accumulator lock poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().expect("accumulator lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ChunkAccumulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkAccumulator")
            .field("len", &self.len())
            .finish()
    }
}

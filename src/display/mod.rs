//! Streaming display pipeline: chunk accumulation, bounded-frequency flush
//! and the debounced markdown formatting pass.

pub mod accumulator;
pub mod markdown;
pub mod scheduler;

pub use accumulator::ChunkAccumulator;
pub use scheduler::RenderScheduler;

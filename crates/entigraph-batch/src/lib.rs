//! Entigraph Batch
//!
//! Rate-limited, checkpointed batch processing over entity sets. The
//! orchestrator fans entities out to a bounded worker pool for
//! classification and embedding, commits results through a single
//! writer, and checkpoints progress after every sub-batch so an
//! interrupted run resumes without repeating committed work.

pub mod checkpoint;
pub mod limiter;
pub mod orchestrator;
pub mod retry;

pub use checkpoint::CheckpointStore;
pub use limiter::CallLimiter;
pub use orchestrator::{BatchOrchestrator, EntityOutcome};

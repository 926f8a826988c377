//! The assistant turn pipeline.

pub mod blocking;
pub mod enricher;
pub mod history;
pub mod normalizer;
pub mod sources;
pub mod thread_lock;
pub mod turn;

pub use enricher::{enrich, EnrichmentOutcome};
pub use normalizer::{substitute_citations, NormalizedTick, RunNormalizer, Terminal};
pub use thread_lock::{ThreadBusy, ThreadLockMap};
pub use turn::{TurnCoordinator, TurnError, TurnRequest};

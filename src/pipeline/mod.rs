//! Incremental re-processing pipeline.
//!
//! Every email carries the fingerprints of the prompts that produced its
//! stored category and actions. A pass runs in three steps:
//! 1. `decision::decide()`: the fingerprint differs or the value is missing
//! 2. `stages`: categorize / extract through the LLM
//! 3. `orchestrator`: persist only the changed fields, then update memory
//!
//! Model calls are paced by `pacing::RateLimiter`; up-to-date emails cost nothing.

pub mod decision;
pub mod fingerprint;
pub mod orchestrator;
pub mod pacing;
pub mod stages;
pub mod types;

pub use decision::{Decision, decide};
pub use fingerprint::{PromptFingerprint, PromptFingerprints, fingerprint};
pub use orchestrator::BatchOrchestrator;
pub use pacing::RateLimiter;
pub use types::{EmailOutcome, OutcomeStatus, PassSummary, ProcessedEmail};

//! Listing-acquisition engine.
//!
//! Leaves first: [`extract`] reads one detail panel, [`scroll`] loads the
//! result list, [`listing`] runs one target, [`orchestrator`] runs many.

pub mod extract;
pub mod listing;
pub mod orchestrator;
pub mod policy;
pub mod scroll;

pub use extract::DetailExtractor;
pub use listing::{AcquireError, CandidateOutcome, ListingAcquirer, SkipReason, TargetAcquirer};
pub use orchestrator::{NoopReporter, ProgressReporter, RunOutcome, TargetOrchestrator};
pub use policy::{AcquisitionPolicy, RetryPolicy, ScrollPolicy};
pub use scroll::ScrollLoader;

pub mod acquisition;
pub mod api;
pub mod core;
pub mod export;
pub mod jobs;
pub mod scraping;
pub mod tools;

// --- Primary core exports ---
pub use core::types;
pub use core::types::*;
pub use core::AppState;

pub use acquisition::{AcquisitionPolicy, RunOutcome};
pub use tools::harvest;

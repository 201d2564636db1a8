pub mod runner;
pub mod store;

pub use runner::spawn_search_job;
pub use store::{AcquisitionJob, JobHandle, JobStatus, JobStore};

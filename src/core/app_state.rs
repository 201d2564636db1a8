use crate::core::config::HarvestConfig;
use crate::jobs::JobStore;
use crate::scraping::browser::BrowserLauncher;
use crate::tools::harvest::HarvestSettings;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

#[derive(Clone)]
pub struct AppState {
    /// File-based config loaded from `maps-harvest.json` (env-var fallback for all fields).
    pub config: Arc<HarvestConfig>,
    pub settings: HarvestSettings,
    pub jobs: Arc<JobStore>,
    pub launcher: Arc<dyn BrowserLauncher>,
    // Bounds how many jobs hold a browser session at once.
    pub job_slots: Arc<Semaphore>,
    pub job_timeout_secs: u64,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("jobs", &self.jobs.len())
            .field("free_job_slots", &self.job_slots.available_permits())
            .field("job_timeout_secs", &self.job_timeout_secs)
            .finish()
    }
}

impl AppState {
    pub fn new(config: HarvestConfig, launcher: Arc<dyn BrowserLauncher>) -> Self {
        let max_jobs = config.server.resolve_max_concurrent_jobs();
        Self {
            settings: HarvestSettings::from_config(&config),
            job_timeout_secs: config.server.resolve_job_timeout_secs(),
            job_slots: Arc::new(Semaphore::new(max_jobs)),
            jobs: Arc::new(JobStore::with_retention(Duration::from_secs(
                config.server.resolve_job_retention_secs(),
            ))),
            launcher,
            config: Arc::new(config),
        }
    }
}

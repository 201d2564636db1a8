//! Entry points that own a browser session for the length of one run.

use crate::acquisition::listing::{ListingAcquirer, TargetAcquirer};
use crate::acquisition::orchestrator::{ProgressReporter, RunOutcome, TargetOrchestrator};
use crate::acquisition::policy::AcquisitionPolicy;
use crate::core::config::HarvestConfig;
use crate::core::types::{AcquisitionTarget, Record};
use crate::scraping::browser::{BrowserLauncher, LaunchOptions};
use crate::scraping::locators::{Locators, MAPS_START_URL};
use anyhow::{Context, Result};
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Everything a run needs besides the browser itself.
#[derive(Debug, Clone)]
pub struct HarvestSettings {
    pub policy: AcquisitionPolicy,
    pub locators: Locators,
    pub launch: LaunchOptions,
    pub start_url: String,
}

impl Default for HarvestSettings {
    fn default() -> Self {
        Self {
            policy: AcquisitionPolicy::default(),
            locators: Locators::default(),
            launch: LaunchOptions::default(),
            start_url: MAPS_START_URL.to_string(),
        }
    }
}

impl HarvestSettings {
    pub fn from_config(config: &HarvestConfig) -> Self {
        Self {
            policy: config.policy,
            locators: Locators::default(),
            launch: config.browser.launch_options(),
            start_url: config.browser.resolve_start_url(),
        }
    }

    pub fn acquirer(&self) -> ListingAcquirer {
        ListingAcquirer::new(self.policy, self.locators.clone()).with_start_url(self.start_url.clone())
    }
}

/// One base query fanned out over several qualifiers (cities).
#[derive(Debug, Clone, PartialEq)]
pub struct MultiTargetRequest {
    pub query: String,
    pub filters: Option<String>,
    pub qualifiers: Vec<String>,
    pub per_target_goal: usize,
    pub total_goal: usize,
}

impl MultiTargetRequest {
    /// Split `total_goal` over the qualifiers, each getting at least
    /// `min_results_per_target`.
    pub fn split_total(
        query: &str,
        filters: Option<&str>,
        qualifiers: Vec<String>,
        total_goal: usize,
        policy: &AcquisitionPolicy,
    ) -> Self {
        Self {
            query: query.to_string(),
            filters: filters.map(str::to_string),
            per_target_goal: policy.per_target_goal(total_goal, qualifiers.len()),
            qualifiers,
            total_goal,
        }
    }

    /// `per_target_goal` for every qualifier; the total is their sum.
    pub fn per_target(query: &str, filters: Option<&str>, qualifiers: Vec<String>, per_target_goal: usize) -> Self {
        let per_target_goal = per_target_goal.max(1);
        Self {
            query: query.to_string(),
            filters: filters.map(str::to_string),
            total_goal: per_target_goal * qualifiers.len().max(1),
            per_target_goal,
            qualifiers,
        }
    }

    pub fn targets(&self) -> Vec<AcquisitionTarget> {
        if self.qualifiers.is_empty() {
            return vec![AcquisitionTarget::compose(
                &self.query,
                self.filters.as_deref(),
                None,
                self.per_target_goal,
            )];
        }
        self.qualifiers
            .iter()
            .map(|q| {
                AcquisitionTarget::compose(&self.query, self.filters.as_deref(), Some(q), self.per_target_goal)
            })
            .collect()
    }
}

/// Split a comma-separated list, dropping blanks.
pub fn parse_qualifiers(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Single-target run: launch, acquire, close.
///
/// Only a launch failure is an error; a failed search yields no records.
pub async fn run_single_target(
    launcher: &dyn BrowserLauncher,
    settings: &HarvestSettings,
    query: &str,
    goal: usize,
    cancel: &CancellationToken,
) -> Result<Vec<Record>> {
    let mut session = launcher
        .launch(&settings.launch)
        .await
        .context("failed to launch browser")?;

    let target = AcquisitionTarget::new(query, goal);
    let result = {
        let page = session.page();
        settings
            .acquirer()
            .acquire(page, &target, &HashSet::new(), cancel)
            .await
    };
    session.close().await;

    let records = match result {
        Ok(records) => records,
        Err(e) => {
            warn!("Search '{}' produced no records: {}", query, e);
            Vec::new()
        }
    };
    info!("Final result: {} records for '{}'", records.len(), query);
    Ok(records)
}

/// Multi-target run over one browser session.
pub async fn run_multi_target(
    launcher: &dyn BrowserLauncher,
    settings: &HarvestSettings,
    request: &MultiTargetRequest,
    reporter: &dyn ProgressReporter,
    cancel: &CancellationToken,
) -> Result<RunOutcome> {
    let targets = request.targets();
    info!(
        "Starting '{}' across {} targets ({} per target, {} total)",
        request.query,
        targets.len(),
        request.per_target_goal,
        request.total_goal
    );

    let mut session = launcher
        .launch(&settings.launch)
        .await
        .context("failed to launch browser")?;

    let outcome = {
        let page = session.page();
        TargetOrchestrator::new(settings.acquirer(), &settings.policy)
            .run(page, &targets, request.total_goal, reporter, cancel)
            .await
    };
    session.close().await;

    if outcome.shortfall == 0 {
        info!("Run complete: {} records, target reached", outcome.records.len());
    } else {
        info!(
            "Run complete: partial target ({}/{})",
            outcome.records.len(),
            outcome.total_goal
        );
    }
    Ok(outcome)
}

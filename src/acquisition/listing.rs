//! Single-target acquisition: search, load, open every candidate, dedup.

use crate::acquisition::extract::DetailExtractor;
use crate::acquisition::policy::AcquisitionPolicy;
use crate::acquisition::scroll::ScrollLoader;
use crate::core::types::{AcquisitionTarget, DedupKey, Record};
use crate::scraping::browser::{BrowserError, BrowserPage, ListingHandle};
use crate::scraping::locators::{Locators, MAPS_START_URL};
use async_trait::async_trait;
use std::collections::HashSet;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("search for '{query}' failed after {attempts} attempts: {source}")]
    Navigation {
        query: String,
        attempts: u32,
        #[source]
        source: BrowserError,
    },

    #[error(transparent)]
    Browser(#[from] BrowserError),

    #[error("acquisition cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    ClickFailed(String),
    DetailNotRendered,
    EmptyName,
    Duplicate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CandidateOutcome {
    Extracted(Record),
    Skipped(SkipReason),
}

/// One acquisition pass over one target. The orchestrator only depends on this.
#[async_trait]
pub trait TargetAcquirer: Send + Sync {
    /// Returns at most `floor(goal * overcollect_ratio)` named records whose
    /// keys are absent from `known` and unique among themselves.
    async fn acquire(
        &self,
        page: &dyn BrowserPage,
        target: &AcquisitionTarget,
        known: &HashSet<DedupKey>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Record>, AcquireError>;
}

pub struct ListingAcquirer {
    policy: AcquisitionPolicy,
    locators: Locators,
    start_url: String,
}

impl ListingAcquirer {
    pub fn new(policy: AcquisitionPolicy, locators: Locators) -> Self {
        Self {
            policy,
            locators,
            start_url: MAPS_START_URL.to_string(),
        }
    }

    pub fn with_start_url(mut self, start_url: impl Into<String>) -> Self {
        self.start_url = start_url.into();
        self
    }

    pub fn policy(&self) -> &AcquisitionPolicy {
        &self.policy
    }

    /// Navigate to the start page and submit `query`, retrying the whole sequence.
    pub async fn submit_search(
        &self,
        page: &dyn BrowserPage,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<(), AcquireError> {
        let attempts = self.policy.navigation_retries.max(1);
        let mut attempt = 1;
        loop {
            if cancel.is_cancelled() {
                return Err(AcquireError::Cancelled);
            }
            match self.try_submit(page, query).await {
                Ok(()) => return Ok(()),
                Err(source) if attempt >= attempts => {
                    return Err(AcquireError::Navigation {
                        query: query.to_string(),
                        attempts,
                        source,
                    });
                }
                Err(e) => {
                    warn!("Search attempt {}/{} failed: {}, retrying", attempt, attempts, e);
                    page.wait(self.policy.navigation_delay_ms).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn try_submit(&self, page: &dyn BrowserPage, query: &str) -> Result<(), BrowserError> {
        page.navigate(&self.start_url, self.policy.navigation_timeout())
            .await?;
        page.fill_and_submit(&self.locators.search_box, query).await?;
        page.wait_for(&self.locators.result_anchor, self.policy.results_timeout())
            .await
    }

    /// Open one candidate and turn it into an outcome. Never fails.
    pub async fn process_candidate(
        &self,
        page: &dyn BrowserPage,
        candidate: &dyn ListingHandle,
        known: &HashSet<DedupKey>,
        seen: &mut HashSet<DedupKey>,
    ) -> CandidateOutcome {
        page.wait(self.policy.pre_click_delay_ms).await;

        if let Err(e) = candidate.click().await {
            page.wait(self.policy.recovery_delay_ms).await;
            return CandidateOutcome::Skipped(SkipReason::ClickFailed(e.to_string()));
        }

        let rendered = page
            .wait_for(&self.locators.name, self.policy.detail_timeout())
            .await
            .is_ok()
            || page
                .wait_for(&self.locators.name_fallback, self.policy.detail_fallback_timeout())
                .await
                .is_ok();
        if !rendered {
            return CandidateOutcome::Skipped(SkipReason::DetailNotRendered);
        }

        let extractor = DetailExtractor::new(&self.locators, self.policy.retry, self.policy.detail_timeout());
        let record = extractor.extract(page, Some(candidate)).await;
        if !record.has_name() {
            return CandidateOutcome::Skipped(SkipReason::EmptyName);
        }

        let key = record.dedup_key();
        if known.contains(&key) || !seen.insert(key) {
            return CandidateOutcome::Skipped(SkipReason::Duplicate);
        }
        CandidateOutcome::Extracted(record)
    }
}

#[async_trait]
impl TargetAcquirer for ListingAcquirer {
    async fn acquire(
        &self,
        page: &dyn BrowserPage,
        target: &AcquisitionTarget,
        known: &HashSet<DedupKey>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Record>, AcquireError> {
        info!("🔎 Searching '{}' (goal {})", target.query, target.goal);
        self.submit_search(page, &target.query, cancel).await?;

        ScrollLoader::new(self.policy.scroll, self.locators.result_anchor)
            .load_candidates(page, target.goal, cancel)
            .await;

        let anchors = page.all_matches(&self.locators.result_anchor).await?;
        let candidates: Vec<Box<dyn ListingHandle>> =
            anchors.iter().map(|anchor| anchor.related_parent()).collect();
        let cap = self.policy.record_cap(target.goal);
        info!(
            "Total candidates: {}, collecting up to {} records",
            candidates.len(),
            cap
        );

        let mut records = Vec::new();
        let mut seen = HashSet::new();
        for (idx, candidate) in candidates.iter().enumerate() {
            if cancel.is_cancelled() {
                info!("Acquisition of '{}' cancelled with {} records", target.query, records.len());
                break;
            }

            match self
                .process_candidate(page, candidate.as_ref(), known, &mut seen)
                .await
            {
                CandidateOutcome::Extracted(record) => {
                    records.push(record);
                    debug!("Extracted record {}: {}", records.len(), candidate.describe());
                    if records.len() >= cap {
                        info!("Reached {} records for goal {}", records.len(), target.goal);
                        break;
                    }
                }
                CandidateOutcome::Skipped(SkipReason::Duplicate) => {
                    debug!("Skipping duplicate at candidate {}", idx + 1);
                }
                CandidateOutcome::Skipped(reason) => {
                    warn!("Skipping candidate {}: {:?}", idx + 1, reason);
                }
            }
        }

        info!("'{}' yielded {} records", target.query, records.len());
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraping::scripted::{Render, ScriptedListing, ScriptedPage};

    fn acquirer() -> ListingAcquirer {
        ListingAcquirer::new(AcquisitionPolicy::default().without_delays(), Locators::default())
    }

    fn places(n: usize) -> Vec<ScriptedListing> {
        (0..n)
            .map(|i| ScriptedListing::place(&format!("Place {i}"), &format!("{i} Main St")))
            .collect()
    }

    #[tokio::test]
    async fn skips_failures_blanks_and_duplicates() {
        let page = ScriptedPage::new(vec![
            ScriptedListing::place("Anatolia Grill", "1 King St"),
            ScriptedListing::place("ANATOLIA  grill", " 1 king st"),
            ScriptedListing::place("Bosphorus", "2 King St").failing_click(),
            ScriptedListing::place("Galata", "3 King St").render(Render::Never),
            ScriptedListing::place("Ghost", "4 King St").blank_name_reads(99),
            ScriptedListing::place("Kapadokya", "5 King St").render(Render::FallbackOnly),
        ]);
        let target = AcquisitionTarget::new("turkish food", 10);

        let records = acquirer()
            .acquire(&page, &target, &HashSet::new(), &CancellationToken::new())
            .await
            .unwrap();

        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Anatolia Grill", "Kapadokya"]);
        assert!(records.iter().all(Record::has_name));
    }

    #[tokio::test]
    async fn stops_at_one_and_a_half_times_goal() {
        let page = ScriptedPage::new(places(20));
        let target = AcquisitionTarget::new("q", 4);

        let records = acquirer()
            .acquire(&page, &target, &HashSet::new(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(records.len(), 6);
        assert_eq!(page.log().clicks.len(), 6);
    }

    #[tokio::test]
    async fn known_keys_are_skipped() {
        let page = ScriptedPage::new(places(3));
        let known: HashSet<DedupKey> = [DedupKey::new("place 1", "1 main st")].into();

        let records = acquirer()
            .acquire(&page, &AcquisitionTarget::new("q", 10), &known, &CancellationToken::new())
            .await
            .unwrap();

        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Place 0", "Place 2"]);
    }

    #[tokio::test]
    async fn navigation_is_retried() {
        let page = ScriptedPage::new(places(2)).failing_navigations(2);
        let records = acquirer()
            .acquire(&page, &AcquisitionTarget::new("q", 5), &HashSet::new(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(page.log().navigations, 3);
    }

    #[tokio::test]
    async fn navigation_failure_after_all_attempts() {
        let page = ScriptedPage::new(places(2)).failing_navigations(3);
        let err = acquirer()
            .acquire(&page, &AcquisitionTarget::new("q", 5), &HashSet::new(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AcquireError::Navigation { attempts: 3, .. }));
        assert!(page.log().searches.is_empty());
    }

    #[tokio::test]
    async fn empty_result_list_is_a_navigation_error() {
        let page = ScriptedPage::new(Vec::new());
        let err = acquirer()
            .acquire(&page, &AcquisitionTarget::new("q", 5), &HashSet::new(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AcquireError::Navigation { .. }));
        assert_eq!(page.log().searches.len(), 3);
    }

    #[tokio::test]
    async fn cancelled_before_search() {
        let page = ScriptedPage::new(places(2));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = acquirer()
            .acquire(&page, &AcquisitionTarget::new("q", 5), &HashSet::new(), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, AcquireError::Cancelled));
        assert_eq!(page.log().navigations, 0);
    }

    #[tokio::test]
    async fn click_failure_reports_reason() {
        let page = ScriptedPage::new(vec![ScriptedListing::place("A", "B").failing_click()]);
        page.fill_and_submit(&Locators::default().search_box, "q").await.unwrap();
        let handles = page.all_matches(&Locators::default().result_anchor).await.unwrap();

        let outcome = acquirer()
            .process_candidate(&page, handles[0].as_ref(), &HashSet::new(), &mut HashSet::new())
            .await;

        assert!(matches!(outcome, CandidateOutcome::Skipped(SkipReason::ClickFailed(_))));
    }
}

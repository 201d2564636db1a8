//! Tuning constants for the acquisition engine.
//!
//! The over-collection ratios (2× candidates, 1.5× records, +10 on backfill) are
//! empirical values. They are kept as named fields so a config file can override
//! them without touching the loops.

use serde::Deserialize;
use std::time::Duration;

pub const NAVIGATION_RETRY_COUNT: u32 = 3;
pub const EXTRACT_RETRY_COUNT: u32 = 2;
pub const EXTRACT_RETRY_DELAY_MS: u64 = 1_000;
pub const MAX_NO_CHANGE_SCROLLS: u32 = 8;
pub const SCROLL_WAIT_MS: u64 = 3_000;
pub const PLACE_DETAIL_TIMEOUT_MS: u64 = 15_000;
pub const PLACE_DETAIL_FALLBACK_TIMEOUT_MS: u64 = 5_000;
pub const NAVIGATION_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_PAGE_TIMEOUT_MS: u64 = 30_000;

/// Retry policy for transient empty detail reads.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub retries: u32,
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: EXTRACT_RETRY_COUNT,
            backoff_ms: EXTRACT_RETRY_DELAY_MS,
        }
    }
}

/// Randomised extra scroll applied once per loader iteration.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScrollJitter {
    pub enabled: bool,
    pub min_delta: i64,
    pub max_delta: i64,
    pub min_wait_ms: u64,
    pub max_wait_ms: u64,
}

impl Default for ScrollJitter {
    fn default() -> Self {
        Self {
            enabled: true,
            min_delta: 8_000,
            max_delta: 12_000,
            min_wait_ms: 1_000,
            max_wait_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScrollPolicy {
    /// Candidate target is `max(min_target * overfetch_factor, min_candidates)`.
    pub overfetch_factor: usize,
    pub min_candidates: usize,
    pub scroll_delta: i64,
    pub settle_ms: u64,
    pub max_no_change: u32,
    /// Hard ceiling on loop iterations regardless of growth.
    pub max_iterations: u32,
    pub perturb_forward: i64,
    pub perturb_forward_wait_ms: u64,
    pub perturb_back: i64,
    pub perturb_back_wait_ms: u64,
    pub jitter: ScrollJitter,
}

impl Default for ScrollPolicy {
    fn default() -> Self {
        Self {
            overfetch_factor: 2,
            min_candidates: 100,
            scroll_delta: 15_000,
            settle_ms: SCROLL_WAIT_MS,
            max_no_change: MAX_NO_CHANGE_SCROLLS,
            max_iterations: 200,
            perturb_forward: 20_000,
            perturb_forward_wait_ms: 2_000,
            perturb_back: 5_000,
            perturb_back_wait_ms: 1_000,
            jitter: ScrollJitter::default(),
        }
    }
}

impl ScrollPolicy {
    pub fn candidate_target(&self, min_target: usize) -> usize {
        min_target
            .saturating_mul(self.overfetch_factor)
            .max(self.min_candidates)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct AcquisitionPolicy {
    pub navigation_retries: u32,
    pub navigation_delay_ms: u64,
    pub navigation_timeout_ms: u64,
    /// Timeout for the result list to show up after a search is submitted.
    pub results_timeout_ms: u64,
    pub detail_timeout_ms: u64,
    pub detail_fallback_timeout_ms: u64,
    pub pre_click_delay_ms: u64,
    pub recovery_delay_ms: u64,
    /// Early stop once a single pass holds `floor(goal * overcollect_ratio)` records.
    pub overcollect_ratio: f64,
    pub backfill_targets: usize,
    pub backfill_overshoot: usize,
    pub min_results_per_target: usize,
    pub retry: RetryPolicy,
    pub scroll: ScrollPolicy,
}

impl Default for AcquisitionPolicy {
    fn default() -> Self {
        Self {
            navigation_retries: NAVIGATION_RETRY_COUNT,
            navigation_delay_ms: 2_000,
            navigation_timeout_ms: NAVIGATION_TIMEOUT_MS,
            results_timeout_ms: DEFAULT_PAGE_TIMEOUT_MS,
            detail_timeout_ms: PLACE_DETAIL_TIMEOUT_MS,
            detail_fallback_timeout_ms: PLACE_DETAIL_FALLBACK_TIMEOUT_MS,
            pre_click_delay_ms: 500,
            recovery_delay_ms: 1_000,
            overcollect_ratio: 1.5,
            backfill_targets: 2,
            backfill_overshoot: 10,
            min_results_per_target: 1,
            retry: RetryPolicy::default(),
            scroll: ScrollPolicy::default(),
        }
    }
}

impl AcquisitionPolicy {
    /// Upper bound on records one acquirer pass may return for `goal`.
    pub fn record_cap(&self, goal: usize) -> usize {
        let cap = (goal as f64 * self.overcollect_ratio).floor();
        (cap as usize).max(1)
    }

    /// Per-target goal when `total_goal` is split over `target_count` targets.
    pub fn per_target_goal(&self, total_goal: usize, target_count: usize) -> usize {
        (total_goal / target_count.max(1))
            .max(self.min_results_per_target)
            .max(1)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn results_timeout(&self) -> Duration {
        Duration::from_millis(self.results_timeout_ms)
    }

    pub fn detail_timeout(&self) -> Duration {
        Duration::from_millis(self.detail_timeout_ms)
    }

    pub fn detail_fallback_timeout(&self) -> Duration {
        Duration::from_millis(self.detail_fallback_timeout_ms)
    }

    /// Same policy with every wait and jitter zeroed; used by dry runs and tests.
    pub fn without_delays(mut self) -> Self {
        self.navigation_delay_ms = 0;
        self.pre_click_delay_ms = 0;
        self.recovery_delay_ms = 0;
        self.retry.backoff_ms = 0;
        self.scroll.settle_ms = 0;
        self.scroll.perturb_forward_wait_ms = 0;
        self.scroll.perturb_back_wait_ms = 0;
        self.scroll.jitter.enabled = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_cap_never_exceeds_ratio() {
        let policy = AcquisitionPolicy::default();
        assert_eq!(policy.record_cap(15), 22);
        assert_eq!(policy.record_cap(10), 15);
        assert_eq!(policy.record_cap(1), 1);
        assert_eq!(policy.record_cap(0), 1);
    }

    #[test]
    fn candidate_target_overfetches_with_floor() {
        let scroll = ScrollPolicy::default();
        assert_eq!(scroll.candidate_target(20), 100);
        assert_eq!(scroll.candidate_target(80), 160);
    }

    #[test]
    fn per_target_goal_is_floored() {
        let mut policy = AcquisitionPolicy::default();
        assert_eq!(policy.per_target_goal(45, 3), 15);
        assert_eq!(policy.per_target_goal(2, 3), 1);
        policy.min_results_per_target = 15;
        assert_eq!(policy.per_target_goal(20, 4), 15);
    }

    #[test]
    fn policy_overrides_from_partial_json() {
        let policy: AcquisitionPolicy =
            serde_json::from_str(r#"{"backfill_overshoot": 5, "scroll": {"max_no_change": 3}}"#)
                .unwrap();
        assert_eq!(policy.backfill_overshoot, 5);
        assert_eq!(policy.scroll.max_no_change, 3);
        assert_eq!(policy.scroll.min_candidates, 100);
        assert_eq!(policy.retry.retries, 2);
    }
}

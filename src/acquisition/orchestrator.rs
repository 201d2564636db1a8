//! Multi-target runs with cross-target dedup and bounded backfill.

use crate::acquisition::listing::{AcquireError, TargetAcquirer};
use crate::acquisition::policy::AcquisitionPolicy;
use crate::core::types::{AcquisitionTarget, DedupKey, Record};
use crate::scraping::browser::BrowserPage;
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Receives the accumulated records after every target and backfill pass.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, records: &[Record], current_label: &str);
}

pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _records: &[Record], _current_label: &str) {}
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub records: Vec<Record>,
    pub total_goal: usize,
    /// How many records short of `total_goal` the run ended. Not an error.
    pub shortfall: usize,
    pub cancelled: bool,
}

pub struct TargetOrchestrator<A> {
    acquirer: A,
    backfill_targets: usize,
    backfill_overshoot: usize,
}

impl<A: TargetAcquirer> TargetOrchestrator<A> {
    pub fn new(acquirer: A, policy: &AcquisitionPolicy) -> Self {
        Self {
            acquirer,
            backfill_targets: policy.backfill_targets,
            backfill_overshoot: policy.backfill_overshoot,
        }
    }

    pub fn acquirer(&self) -> &A {
        &self.acquirer
    }

    /// Acquire every target in order, then backfill from the first few targets
    /// while the run is short of `total_goal`.
    ///
    /// A failing target contributes zero records and never aborts the run.
    pub async fn run(
        &self,
        page: &dyn BrowserPage,
        targets: &[AcquisitionTarget],
        total_goal: usize,
        reporter: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> RunOutcome {
        let mut records: Vec<Record> = Vec::new();
        let mut keys: HashSet<DedupKey> = HashSet::new();
        let mut cancelled = false;

        for target in targets {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            info!("📍 Acquiring target '{}'", target.display_label());
            let Some(found) = self.acquire_one(page, target, &keys, cancel).await else {
                cancelled = true;
                break;
            };
            let added = merge(&mut records, &mut keys, found, target.label.as_deref(), None);
            info!(
                "Target '{}' added {} records ({} total)",
                target.display_label(),
                added,
                records.len()
            );
            reporter.report(&records, target.display_label());
        }

        if !cancelled && records.len() < total_goal {
            for target in targets.iter().take(self.backfill_targets) {
                let shortfall = total_goal.saturating_sub(records.len());
                if shortfall == 0 {
                    break;
                }
                if cancel.is_cancelled() {
                    cancelled = true;
                    break;
                }

                let backfill = target.with_goal(shortfall + self.backfill_overshoot);
                info!(
                    "Backfilling {} records from '{}' (goal {})",
                    shortfall,
                    target.display_label(),
                    backfill.goal
                );
                let Some(found) = self.acquire_one(page, &backfill, &keys, cancel).await else {
                    cancelled = true;
                    break;
                };
                let added = merge(
                    &mut records,
                    &mut keys,
                    found,
                    target.label.as_deref(),
                    Some(total_goal),
                );
                info!("Backfill from '{}' added {} records", target.display_label(), added);
                reporter.report(&records, target.display_label());
            }
        }

        cancelled |= cancel.is_cancelled();
        let shortfall = total_goal.saturating_sub(records.len());
        if shortfall > 0 {
            warn!(
                "Run ended with {} of {} records ({} short)",
                records.len(),
                total_goal,
                shortfall
            );
        }

        RunOutcome {
            records,
            total_goal,
            shortfall,
            cancelled,
        }
    }

    /// `None` when the acquirer observed cancellation before producing anything.
    async fn acquire_one(
        &self,
        page: &dyn BrowserPage,
        target: &AcquisitionTarget,
        keys: &HashSet<DedupKey>,
        cancel: &CancellationToken,
    ) -> Option<Vec<Record>> {
        match self.acquirer.acquire(page, target, keys, cancel).await {
            Ok(found) => Some(found),
            Err(AcquireError::Cancelled) => None,
            Err(e) => {
                warn!("Target '{}' failed: {}", target.display_label(), e);
                Some(Vec::new())
            }
        }
    }
}

/// Append records with unseen keys, labelling them; stops at `limit` if given.
fn merge(
    records: &mut Vec<Record>,
    keys: &mut HashSet<DedupKey>,
    found: Vec<Record>,
    label: Option<&str>,
    limit: Option<usize>,
) -> usize {
    let before = records.len();
    for mut record in found {
        if limit.is_some_and(|limit| records.len() >= limit) {
            break;
        }
        if !record.has_name() || !keys.insert(record.dedup_key()) {
            continue;
        }
        record.target_label = label.map(str::to_string);
        records.push(record);
    }
    records.len() - before
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraping::scripted::ScriptedPage;
    use async_trait::async_trait;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    fn batch(prefix: &str, range: std::ops::Range<usize>) -> Vec<Record> {
        range
            .map(|i| Record {
                name: format!("{prefix} {i}"),
                address: format!("{i} Via Roma"),
                ..Default::default()
            })
            .collect()
    }

    /// Answers each query with the next scripted batch and records the goals it saw.
    #[derive(Default)]
    struct ScriptedAcquirer {
        batches: Mutex<HashMap<String, VecDeque<Result<Vec<Record>, String>>>>,
        calls: Mutex<Vec<(String, usize, usize)>>,
    }

    impl ScriptedAcquirer {
        fn then(self, query: &str, batch: Vec<Record>) -> Self {
            self.push(query, Ok(batch))
        }

        fn then_fail(self, query: &str) -> Self {
            self.push(query, Err("navigation failed".into()))
        }

        fn push(self, query: &str, response: Result<Vec<Record>, String>) -> Self {
            self.batches
                .lock()
                .unwrap()
                .entry(query.to_string())
                .or_default()
                .push_back(response);
            self
        }

        fn calls(&self) -> Vec<(String, usize, usize)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TargetAcquirer for ScriptedAcquirer {
        async fn acquire(
            &self,
            _page: &dyn BrowserPage,
            target: &AcquisitionTarget,
            known: &HashSet<DedupKey>,
            _cancel: &CancellationToken,
        ) -> Result<Vec<Record>, AcquireError> {
            self.calls
                .lock()
                .unwrap()
                .push((target.query.clone(), target.goal, known.len()));
            let next = self
                .batches
                .lock()
                .unwrap()
                .get_mut(&target.query)
                .and_then(VecDeque::pop_front)
                .unwrap_or(Ok(Vec::new()));
            next.map_err(|reason| {
                AcquireError::Browser(crate::scraping::browser::BrowserError::Session(reason))
            })
        }
    }

    #[derive(Default)]
    struct CountingReporter {
        seen: Mutex<Vec<(usize, String)>>,
    }

    impl ProgressReporter for CountingReporter {
        fn report(&self, records: &[Record], current_label: &str) {
            self.seen
                .lock()
                .unwrap()
                .push((records.len(), current_label.to_string()));
        }
    }

    fn cities(goal: usize) -> Vec<AcquisitionTarget> {
        ["Milan", "Rome", "Turin"]
            .into_iter()
            .map(|city| AcquisitionTarget::compose("travel agency", None, Some(city), goal))
            .collect()
    }

    #[tokio::test]
    async fn backfills_first_targets_until_goal() {
        let mut milan_backfill = batch("Milan", 15..23);
        milan_backfill.extend(batch("Milan", 0..2));
        let acquirer = ScriptedAcquirer::default()
            .then("travel agency Milan", batch("Milan", 0..15))
            .then("travel agency Rome", batch("Rome", 0..10))
            .then("travel agency Turin", batch("Turin", 0..5))
            .then("travel agency Milan", milan_backfill)
            .then("travel agency Rome", batch("Rome", 10..30));
        let reporter = CountingReporter::default();

        let orchestrator = TargetOrchestrator::new(acquirer, &AcquisitionPolicy::default());
        let outcome = orchestrator
            .run(
                &ScriptedPage::default(),
                &cities(15),
                45,
                &reporter,
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(outcome.records.len(), 45);
        assert_eq!(outcome.shortfall, 0);
        assert!(!outcome.cancelled);

        let goals: Vec<usize> = orchestrator.acquirer().calls().iter().map(|(_, goal, _)| *goal).collect();
        // Milan backfill asks for 15 short + 10; Rome then asks for the remaining 7 + 10.
        assert_eq!(goals, vec![15, 15, 15, 25, 17]);

        let keys: HashSet<DedupKey> = outcome.records.iter().map(Record::dedup_key).collect();
        assert_eq!(keys.len(), outcome.records.len());

        let milan = outcome
            .records
            .iter()
            .filter(|r| r.target_label.as_deref() == Some("Milan"))
            .count();
        assert_eq!(milan, 23);
        assert!(outcome.records.iter().all(|r| r.target_label.is_some()));

        let counts: Vec<usize> = reporter.seen.lock().unwrap().iter().map(|(n, _)| *n).collect();
        assert_eq!(counts, vec![15, 25, 30, 38, 45]);
    }

    #[tokio::test]
    async fn failing_target_contributes_nothing() {
        let acquirer = ScriptedAcquirer::default()
            .then("travel agency Milan", batch("Milan", 0..3))
            .then_fail("travel agency Rome")
            .then("travel agency Turin", batch("Turin", 0..3));

        let orchestrator = TargetOrchestrator::new(acquirer, &AcquisitionPolicy::default());
        let outcome = orchestrator
            .run(
                &ScriptedPage::default(),
                &cities(2),
                6,
                &NoopReporter,
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(outcome.records.len(), 6);
        assert_eq!(outcome.shortfall, 0);
        assert_eq!(orchestrator.acquirer().calls().len(), 3);
    }

    #[tokio::test]
    async fn shortfall_is_reported_not_raised() {
        let acquirer = ScriptedAcquirer::default()
            .then("travel agency Milan", batch("Milan", 0..4))
            .then("travel agency Rome", batch("Milan", 0..4));

        let orchestrator = TargetOrchestrator::new(acquirer, &AcquisitionPolicy::default());
        let outcome = orchestrator
            .run(
                &ScriptedPage::default(),
                &cities(10),
                30,
                &NoopReporter,
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(outcome.records.len(), 4);
        assert_eq!(outcome.shortfall, 26);
        // Three primaries plus exactly two backfill passes.
        let calls = orchestrator.acquirer().calls();
        assert_eq!(calls.len(), 5);
        // Backfill passes see every key collected so far.
        assert_eq!(calls[3].2, 4);
    }

    #[tokio::test]
    async fn cancelled_run_keeps_partial_results() {
        let acquirer = ScriptedAcquirer::default().then("travel agency Milan", batch("Milan", 0..3));
        let cancel = CancellationToken::new();
        let reporter = CountingReporter::default();
        let orchestrator = TargetOrchestrator::new(acquirer, &AcquisitionPolicy::default());

        struct CancelAfterFirst<'a>(&'a CancellationToken, &'a CountingReporter);
        impl ProgressReporter for CancelAfterFirst<'_> {
            fn report(&self, records: &[Record], label: &str) {
                self.1.report(records, label);
                self.0.cancel();
            }
        }

        let outcome = orchestrator
            .run(
                &ScriptedPage::default(),
                &cities(5),
                15,
                &CancelAfterFirst(&cancel, &reporter),
                &cancel,
            )
            .await;

        assert!(outcome.cancelled);
        assert_eq!(outcome.records.len(), 3);
        assert_eq!(orchestrator.acquirer().calls().len(), 1);
    }
}

use crate::core::app_state::AppState;
use crate::jobs::store::JobHandle;
use crate::tools::harvest::{run_multi_target, MultiTargetRequest};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Run a multi-target search job in the background.
///
/// The job waits for a free browser slot, then runs under the configured
/// wall-clock limit. Timeouts and cancellation keep whatever records the job
/// has reported so far.
pub fn spawn_search_job(state: &AppState, job: JobHandle, request: MultiTargetRequest) -> JoinHandle<()> {
    let launcher = state.launcher.clone();
    let settings = state.settings.clone();
    let slots = state.job_slots.clone();
    let timeout_secs = state.job_timeout_secs;

    tokio::spawn(async move {
        let id = job.id();
        let cancel = job.cancel_token().clone();

        let permit = tokio::select! {
            permit = slots.acquire_owned() => permit,
            _ = cancel.cancelled() => {
                info!("Job {} cancelled while queued", id);
                job.mark_cancelled();
                return;
            }
        };
        let Ok(_permit) = permit else {
            job.fail("job queue is closed");
            return;
        };

        job.mark_running();
        info!("Job {} running: '{}'", id, request.query);

        let run = run_multi_target(launcher.as_ref(), &settings, &request, &job, &cancel);
        match tokio::time::timeout(Duration::from_secs(timeout_secs), run).await {
            Ok(Ok(outcome)) => job.complete(outcome),
            Ok(Err(e)) => {
                error!("Job {} failed: {:#}", id, e);
                job.fail(format!("{:#}", e));
            }
            Err(_) => {
                warn!("Job {} timed out after {}s", id, timeout_secs);
                cancel.cancel();
                job.time_out(timeout_secs);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::policy::AcquisitionPolicy;
    use crate::core::config::HarvestConfig;
    use crate::jobs::store::{AcquisitionJob, JobStatus};
    use crate::scraping::scripted::{ScriptedLauncher, ScriptedListing, ScriptedPage};
    use std::sync::Arc;

    fn state(launcher: ScriptedLauncher) -> AppState {
        let mut config = HarvestConfig::default();
        config.policy = AcquisitionPolicy::default().without_delays();
        config.server.max_concurrent_jobs = Some(2);
        config.server.job_timeout_secs = Some(60);
        AppState::new(config, Arc::new(launcher))
    }

    fn request() -> MultiTargetRequest {
        MultiTargetRequest::per_target("bakery", None, vec!["Milan".into(), "Rome".into()], 2)
    }

    #[tokio::test]
    async fn completed_job_holds_records() {
        let page = ScriptedPage::default()
            .with_results("bakery Milan", vec![ScriptedListing::place("Forno", "Via A 1")])
            .with_results("bakery Rome", vec![ScriptedListing::place("Pane", "Via B 2")]);
        let state = state(ScriptedLauncher::new(page));
        let req = request();
        let job = state
            .jobs
            .insert(AcquisitionJob::new(req.query.clone(), req.targets(), req.total_goal));

        spawn_search_job(&state, job.clone(), req).await.unwrap();

        let snap = job.snapshot();
        assert_eq!(snap.status, JobStatus::Completed);
        assert_eq!(snap.records.len(), 2);
        assert_eq!(snap.records[1].target_label.as_deref(), Some("Rome"));
    }

    #[tokio::test]
    async fn launch_failure_marks_error() {
        let state = state(ScriptedLauncher::failing());
        let req = request();
        let job = state
            .jobs
            .insert(AcquisitionJob::new(req.query.clone(), req.targets(), req.total_goal));

        spawn_search_job(&state, job.clone(), req).await.unwrap();

        let snap = job.snapshot();
        assert_eq!(snap.status, JobStatus::Error);
        assert!(snap.error.unwrap().contains("failed to launch browser"));
    }

    #[tokio::test]
    async fn timeout_keeps_partial_records_and_closes_session() {
        let page = ScriptedPage::default()
            .with_results("bakery Milan", vec![ScriptedListing::place("Forno", "Via A 1")])
            .hanging_on("bakery Rome");
        let launcher = ScriptedLauncher::new(page);
        let mut config = HarvestConfig::default();
        config.policy = AcquisitionPolicy::default().without_delays();
        config.server.max_concurrent_jobs = Some(1);
        config.server.job_timeout_secs = Some(1);
        let state = AppState::new(config, Arc::new(launcher.clone()));
        let req = request();
        let job = state
            .jobs
            .insert(AcquisitionJob::new(req.query.clone(), req.targets(), req.total_goal));

        spawn_search_job(&state, job.clone(), req).await.unwrap();

        let snap = job.snapshot();
        assert_eq!(snap.status, JobStatus::Timeout);
        assert_eq!(snap.records.len(), 1);
        assert_eq!(snap.records[0].target_label.as_deref(), Some("Milan"));
        assert!(job.cancel_token().is_cancelled());
        assert_eq!(launcher.launches(), 1);
        assert_eq!(launcher.closes(), 1);
        assert_eq!(launcher.page().log().searches.last().map(String::as_str), Some("bakery Rome"));
    }

    #[tokio::test]
    async fn cancelled_while_queued() {
        let state = state(ScriptedLauncher::default());
        let _held = state.job_slots.clone().acquire_many_owned(2).await.unwrap();
        let req = request();
        let job = state
            .jobs
            .insert(AcquisitionJob::new(req.query.clone(), req.targets(), req.total_goal));

        let task = spawn_search_job(&state, job.clone(), req);
        state.jobs.cancel(&job.id());
        task.await.unwrap();

        assert_eq!(job.snapshot().status, JobStatus::Cancelled);
    }
}

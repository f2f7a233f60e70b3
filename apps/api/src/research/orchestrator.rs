//! Research orchestrator: executes a job's section DAG.
//!
//! Flow per job: load → reset stale running stages → loop {
//!   honour cancellation → mark blocked → launch ready (bounded) →
//!   wait for a result or a cancel wake-up
//! } → derive final status, cost and confidence.
//!
//! Every stage transition is persisted as it happens, so a crash mid-job leaves
//! an accurate picture that `recover_interrupted` can resume from.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{Mutex, Notify};
use tokio::task::{self, JoinError, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::llm_client::pricing::UsageTotals;
use crate::research::generator::{
    GeneratedSection, SectionFailure, SectionGenerator, SectionRequest,
};
use crate::research::job::{ResearchJob, StageRecord};
use crate::research::plan::{blocked_sections, ready_sections, status_pairs};
use crate::research::sections::SectionId;
use crate::research::status::{aggregate_confidence, derive_job_status, JobStatus, StageStatus};
use crate::research::store::JobStore;

/// Fallback re-read of the cancel flag while stages are in flight.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_secs(2);

type StageResult = Result<GeneratedSection, SectionFailure>;

#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<dyn JobStore>,
    generator: Arc<dyn SectionGenerator>,
    max_parallel_stages: usize,
    /// Wake-ups for the jobs currently being run.
    cancel_signals: Arc<Mutex<HashMap<Uuid, Arc<Notify>>>>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn JobStore>,
        generator: Arc<dyn SectionGenerator>,
        max_parallel_stages: usize,
    ) -> Self {
        Self {
            store,
            generator,
            max_parallel_stages: max_parallel_stages.max(1),
            cancel_signals: Arc::default(),
        }
    }

    /// Runs every pending stage of a job to a terminal state and returns the
    /// derived job status. Terminal jobs are left untouched.
    ///
    /// If the run is cut short by an error, in-flight generators are aborted
    /// and the job is marked failed so it can be rerun.
    pub async fn run_job(&self, job_id: Uuid) -> Result<JobStatus, AppError> {
        let mut job = self
            .store
            .get_job(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Job {job_id} not found")))?;

        if !job.status.is_active() {
            info!("Job {} is already {}, skipping", job_id, job.status);
            return Ok(job.status);
        }

        let signal = Arc::new(Notify::new());
        self.cancel_signals
            .lock()
            .await
            .insert(job_id, Arc::clone(&signal));

        let mut stages = Vec::new();
        let result = self.drive(&mut job, &mut stages, &signal).await;
        self.cancel_signals.lock().await.remove(&job_id);

        if let Err(e) = &result {
            self.abandon(&mut job, &stages, e).await;
        }
        result
    }

    /// Wakes the run of `job_id`, if one is in progress, so a cancel takes
    /// effect without waiting for the running stages to finish.
    pub async fn signal_cancel(&self, job_id: Uuid) {
        if let Some(signal) = self.cancel_signals.lock().await.get(&job_id) {
            signal.notify_one();
        }
    }

    async fn drive(
        &self,
        job: &mut ResearchJob,
        stages: &mut Vec<StageRecord>,
        cancel_signal: &Notify,
    ) -> Result<JobStatus, AppError> {
        let job_id = job.id;
        *stages = self.store.get_stages(job_id).await?;

        // Stages left running by a previous process never reported back.
        for stage in stages.iter_mut().filter(|s| s.status == StageStatus::Running) {
            warn!("Resetting interrupted stage {} of job {}", stage.section, job_id);
            stage.reset();
            self.store.update_stage(stage).await?;
        }

        job.status = JobStatus::Running;
        job.started_at.get_or_insert_with(Utc::now);
        job.finished_at = None;
        job.error_message = None;
        self.store.update_job(job).await?;
        info!(
            "Running job {} for '{}' ({} sections)",
            job_id,
            job.subject.company_name,
            stages.len()
        );

        // Dropping the set aborts every generator still in flight.
        let mut in_flight: JoinSet<StageResult> = JoinSet::new();
        let mut running: HashMap<task::Id, (SectionId, Instant)> = HashMap::new();
        let mut poll = tokio::time::interval(CANCEL_POLL_INTERVAL);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        poll.tick().await;
        let mut cancelled = false;

        loop {
            if !cancelled && self.cancel_requested(job_id).await? {
                cancelled = true;
                info!("Cancellation requested for job {job_id}");
                in_flight.abort_all();
                for stage in stages
                    .iter_mut()
                    .filter(|s| matches!(s.status, StageStatus::Pending | StageStatus::Running))
                {
                    stage.status = StageStatus::Cancelled;
                    stage.finished_at = Some(Utc::now());
                    self.store.update_stage(stage).await?;
                }
            }

            for section in blocked_sections(&status_pairs(stages)) {
                let reason = blocking_reason(section, stages);
                if let Some(stage) = stages.iter_mut().find(|s| s.section == section) {
                    stage.status = StageStatus::Blocked;
                    stage.error_message = Some(reason);
                    stage.finished_at = Some(Utc::now());
                    self.store.update_stage(stage).await?;
                }
            }

            if !cancelled {
                let capacity = self.max_parallel_stages.saturating_sub(in_flight.len());
                let ready = ready_sections(&status_pairs(stages));
                for section in ready.into_iter().take(capacity) {
                    let request = build_request(job, stages, section);
                    if let Some(stage) = stages.iter_mut().find(|s| s.section == section) {
                        stage.status = StageStatus::Running;
                        stage.started_at = Some(Utc::now());
                        self.store.update_stage(stage).await?;
                    }

                    let generator = Arc::clone(&self.generator);
                    let handle = in_flight.spawn(async move { generator.generate(&request).await });
                    running.insert(handle.id(), (section, Instant::now()));
                    info!("Job {}: started section {}", job_id, section);
                }
            }

            if in_flight.is_empty() {
                break;
            }

            let joined = tokio::select! {
                joined = in_flight.join_next_with_id() => joined,
                _ = cancel_signal.notified(), if !cancelled => continue,
                _ = poll.tick(), if !cancelled => continue,
            };
            let Some(joined) = joined else {
                break;
            };
            let (task_id, outcome) = match joined {
                Ok((id, result)) => (id, Ok(result)),
                Err(e) => (e.id(), Err(e)),
            };
            let Some((section, started)) = running.remove(&task_id) else {
                continue;
            };

            // A result that landed before the abort keeps its output.
            if let Some(stage) = stages.iter_mut().find(|s| s.section == section) {
                apply_outcome(job, stage, outcome, started.elapsed());
                self.store.update_stage(stage).await?;
                self.store.update_job(job).await?;
            }
        }

        self.finalize(job, stages).await
    }

    /// Best-effort cleanup after a failed run. Stages the store still shows
    /// as unfinished get the outcome already known in memory, or are marked
    /// failed, and the job itself is marked failed so it can be rerun.
    async fn abandon(&self, job: &mut ResearchJob, stages: &[StageRecord], cause: &AppError) {
        error!("Job {} interrupted: {cause}", job.id);
        let stored = match self.store.get_stages(job.id).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Could not reload stages of job {}: {e}", job.id);
                stages.to_vec()
            }
        };

        let now = Utc::now();
        let unfinished =
            |s: &StageRecord| matches!(s.status, StageStatus::Pending | StageStatus::Running);
        for stage in stored.into_iter().filter(|s| unfinished(s)) {
            let section = stage.section;
            let known = stages
                .iter()
                .find(|known| known.section == section && !unfinished(*known));
            let stage = match known {
                Some(known) => known.clone(),
                None => StageRecord {
                    status: StageStatus::Failed,
                    error_message: Some(format!("Interrupted: {cause}")),
                    finished_at: Some(now),
                    ..stage
                },
            };
            if let Err(e) = self.store.update_stage(&stage).await {
                warn!(
                    "Could not settle section {} of job {}: {e}",
                    stage.section, job.id
                );
            }
        }

        job.status = JobStatus::Failed;
        job.error_message = Some(format!("Job interrupted: {cause}"));
        job.finished_at = Some(now);
        if let Err(e) = self.store.update_job(job).await {
            error!("Could not mark job {} failed: {e}", job.id);
        }
    }

    /// Returns ids of jobs that were queued or running when the process last
    /// stopped, after marking them queued again.
    pub async fn recover_interrupted(&self) -> Result<Vec<Uuid>, AppError> {
        let ids = self.store.unfinished_job_ids().await?;
        for id in &ids {
            if let Some(mut job) = self.store.get_job(*id).await? {
                if job.status != JobStatus::Queued {
                    job.status = JobStatus::Queued;
                    self.store.update_job(&job).await?;
                }
            }
        }
        if !ids.is_empty() {
            info!("Recovered {} interrupted research jobs", ids.len());
        }
        Ok(ids)
    }

    async fn cancel_requested(&self, job_id: Uuid) -> Result<bool, AppError> {
        Ok(self
            .store
            .get_job(job_id)
            .await?
            .map(|j| j.cancel_requested)
            .unwrap_or(false))
    }

    async fn finalize(
        &self,
        job: &mut ResearchJob,
        stages: &[StageRecord],
    ) -> Result<JobStatus, AppError> {
        let status = derive_job_status(&status_pairs(stages));

        job.status = status;
        job.confidence = aggregate_confidence(
            stages
                .iter()
                .filter(|s| s.status == StageStatus::Completed)
                .filter_map(|s| s.confidence),
        );
        job.error_message = match status {
            JobStatus::Failed => Some(failure_summary(stages)),
            _ => None,
        };
        job.finished_at = Some(Utc::now());
        self.store.update_job(job).await?;

        info!(
            "Job {} finished: status={}, cost=${:.4}, confidence={:?}",
            job.id, status, job.total_cost_usd, job.confidence
        );
        Ok(status)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Helpers
// ────────────────────────────────────────────────────────────────────────────

/// Builds the generator request with the content of every completed upstream section.
fn build_request(job: &ResearchJob, stages: &[StageRecord], section: SectionId) -> SectionRequest {
    let upstream = section.upstream_within(&job.sections);
    let context: BTreeMap<SectionId, serde_json::Value> = stages
        .iter()
        .filter(|s| upstream.contains(&s.section) && s.status == StageStatus::Completed)
        .filter_map(|s| s.output.clone().map(|output| (s.section, output)))
        .collect();

    SectionRequest {
        subject: job.subject.clone(),
        section,
        context,
    }
}

fn apply_outcome(
    job: &mut ResearchJob,
    stage: &mut StageRecord,
    outcome: Result<StageResult, JoinError>,
    elapsed: Duration,
) {
    stage.duration_ms = Some(elapsed.as_millis() as i64);
    stage.finished_at = Some(Utc::now());

    match outcome {
        Ok(Ok(generated)) => {
            stage.status = StageStatus::Completed;
            stage.attempts += generated.attempts as i32;
            stage.confidence = generated.output.confidence.map(|c| c.score());
            stage.confidence_rationale = generated.output.confidence_rationale;
            stage.sources = generated.output.sources;
            stage.output = Some(generated.output.content);
            stage.error_message = None;
            record_usage(job, stage, generated.usage);
            info!(
                "Job {}: section {} completed in {}ms",
                job.id,
                stage.section,
                elapsed.as_millis()
            );
        }
        Ok(Err(failure)) => {
            stage.status = StageStatus::Failed;
            stage.attempts += failure.attempts as i32;
            stage.error_message = Some(failure.message);
            record_usage(job, stage, failure.usage);
            warn!(
                "Job {}: section {} failed: {}",
                job.id,
                stage.section,
                stage.error_message.as_deref().unwrap_or_default()
            );
        }
        Err(e) if e.is_cancelled() => {
            stage.status = StageStatus::Cancelled;
        }
        Err(e) => {
            error!("Job {}: section {} panicked: {e}", job.id, stage.section);
            stage.status = StageStatus::Failed;
            stage.error_message = Some("Section generator crashed".to_string());
        }
    }
}

fn record_usage(
    job: &mut ResearchJob,
    stage: &mut StageRecord,
    usage: UsageTotals,
) {
    stage.cost_usd += usage.cost_usd;
    stage.input_tokens += usage.input_tokens as i64;
    stage.output_tokens += usage.output_tokens as i64;
    job.total_cost_usd += usage.cost_usd;
    job.input_tokens += usage.input_tokens as i64;
    job.output_tokens += usage.output_tokens as i64;
}

fn blocking_reason(section: SectionId, stages: &[StageRecord]) -> String {
    let failed: Vec<&str> = section
        .hard_dependencies()
        .iter()
        .filter(|dep| {
            stages
                .iter()
                .any(|s| s.section == **dep && s.status.is_unsuccessful())
        })
        .map(|dep| dep.as_str())
        .collect();
    format!("Blocked by unsuccessful dependency: {}", failed.join(", "))
}

fn failure_summary(stages: &[StageRecord]) -> String {
    match stages.iter().find(|s| s.section == SectionId::Foundation) {
        Some(foundation) if foundation.status != StageStatus::Completed => format!(
            "Foundation research did not complete: {}",
            foundation
                .error_message
                .as_deref()
                .unwrap_or(foundation.status.as_str())
        ),
        _ => "No sections completed".to_string(),
    }
}

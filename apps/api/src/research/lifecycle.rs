//! Job lifecycle operations behind the HTTP handlers: create, rerun, cancel.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::research::job::{JobSubject, ResearchJob, StageRecord};
use crate::research::plan::{plan_rerun, status_pairs, RerunPlan};
use crate::research::queue::JobQueue;
use crate::research::sections::{expand_selection, SectionId};
use crate::research::status::{JobStatus, StageStatus};
use crate::research::store::JobStore;

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    #[serde(flatten)]
    pub subject: JobSubject,
    /// Section ids to produce. Empty or absent means the full report.
    #[serde(default)]
    pub sections: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RerunRequest {
    #[serde(default)]
    pub sections: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct JobDetail {
    pub job: ResearchJob,
    pub stages: Vec<StageRecord>,
}

#[derive(Debug, Serialize)]
pub struct RerunResponse {
    pub plan: RerunPlan,
    #[serde(flatten)]
    pub detail: JobDetail,
}

fn parse_sections(raw: &[String]) -> Result<Vec<SectionId>, AppError> {
    raw.iter()
        .map(|s| {
            s.trim()
                .parse::<SectionId>()
                .map_err(AppError::Validation)
        })
        .collect()
}

pub async fn load_detail(store: &dyn JobStore, job_id: Uuid) -> Result<JobDetail, AppError> {
    let job = store
        .get_job(job_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Job {job_id} not found")))?;
    let stages = store.get_stages(job_id).await?;
    Ok(JobDetail { job, stages })
}

/// Validates the request, persists a queued job with one stage per section
/// (closed over hard dependencies) and hands it to the queue.
pub async fn create_job(
    store: &dyn JobStore,
    queue: &JobQueue,
    req: CreateJobRequest,
) -> Result<JobDetail, AppError> {
    let mut subject = req.subject;
    subject.company_name = subject.company_name.trim().to_string();
    if subject.company_name.is_empty() {
        return Err(AppError::Validation("company_name is required".to_string()));
    }

    let requested = parse_sections(req.sections.as_deref().unwrap_or_default())?;
    let sections = expand_selection(&requested);

    let (job, stages) = ResearchJob::new(subject, sections);
    store.insert_job(&job, &stages).await?;
    queue.enqueue(job.id).await?;

    info!(
        "Created research job {} for '{}' ({} sections)",
        job.id,
        job.subject.company_name,
        stages.len()
    );
    Ok(JobDetail { job, stages })
}

/// Resets the planned stages of a finished job and queues it again.
pub async fn request_rerun(
    store: &dyn JobStore,
    queue: &JobQueue,
    job_id: Uuid,
    req: RerunRequest,
) -> Result<RerunResponse, AppError> {
    let JobDetail { mut job, mut stages } = load_detail(store, job_id).await?;
    if job.status.is_active() || queue.is_active(job_id).await {
        return Err(AppError::Conflict(format!(
            "Job {job_id} is still {}; wait for it to finish or cancel it",
            job.status
        )));
    }

    let requested = req
        .sections
        .as_deref()
        .map(parse_sections)
        .transpose()?;
    let plan = plan_rerun(&status_pairs(&stages), requested.as_deref())?;

    for stage in stages
        .iter_mut()
        .filter(|s| plan.sections.contains(&s.section))
    {
        stage.reset();
        store.update_stage(stage).await?;
    }

    store.set_cancel_requested(job_id, false).await?;
    job.cancel_requested = false;
    job.status = JobStatus::Queued;
    job.finished_at = None;
    job.error_message = None;
    store.update_job(&job).await?;
    queue.enqueue(job_id).await?;

    info!(
        "Rerun of job {} queued: {} sections",
        job_id,
        plan.sections.len()
    );
    Ok(RerunResponse {
        plan,
        detail: JobDetail { job, stages },
    })
}

/// Flags a job for cancellation and wakes its worker. A job that no worker
/// holds is cancelled on the spot.
pub async fn request_cancel(
    store: &dyn JobStore,
    queue: &JobQueue,
    job_id: Uuid,
) -> Result<JobDetail, AppError> {
    let JobDetail { mut job, mut stages } = load_detail(store, job_id).await?;
    if !job.status.is_active() {
        return Err(AppError::Conflict(format!(
            "Job {job_id} is already {}",
            job.status
        )));
    }

    store.set_cancel_requested(job_id, true).await?;
    job.cancel_requested = true;

    if queue.is_active(job_id).await {
        queue.signal_cancel(job_id).await;
    } else {
        // No worker holds the job, so nothing else will finalize it.
        let now = Utc::now();
        for stage in stages
            .iter_mut()
            .filter(|s| matches!(s.status, StageStatus::Pending | StageStatus::Running))
        {
            stage.status = StageStatus::Cancelled;
            stage.finished_at = Some(now);
            store.update_stage(stage).await?;
        }
        job.status = JobStatus::Cancelled;
        job.finished_at = Some(now);
        store.update_job(&job).await?;
    }

    info!("Cancellation requested for job {job_id}");
    Ok(JobDetail { job, stages })
}

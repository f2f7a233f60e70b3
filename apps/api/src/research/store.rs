//! Job persistence. `PgJobStore` backs production; `MemoryJobStore` is used
//! when no database is configured and in tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::research::{ResearchJobRow, ResearchStageRow};
use crate::research::job::{JobSubject, ResearchJob, Source, StageRecord};
use crate::research::sections::SectionId;
use crate::research::status::JobStatus;

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert_job(&self, job: &ResearchJob, stages: &[StageRecord]) -> Result<(), AppError>;
    async fn get_job(&self, id: Uuid) -> Result<Option<ResearchJob>, AppError>;
    async fn list_jobs(&self, limit: i64) -> Result<Vec<ResearchJob>, AppError>;
    /// Stages of a job in canonical section order.
    async fn get_stages(&self, job_id: Uuid) -> Result<Vec<StageRecord>, AppError>;
    /// Persists progress and outcome fields. Never touches `cancel_requested`,
    /// which only `set_cancel_requested` writes.
    async fn update_job(&self, job: &ResearchJob) -> Result<(), AppError>;
    async fn set_cancel_requested(&self, id: Uuid, value: bool) -> Result<(), AppError>;
    async fn update_stage(&self, stage: &StageRecord) -> Result<(), AppError>;
    /// Jobs still queued or running, oldest first.
    async fn unfinished_job_ids(&self) -> Result<Vec<Uuid>, AppError>;
}

// ────────────────────────────────────────────────────────────────────────────
// In-memory store
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct MemoryState {
    jobs: HashMap<Uuid, ResearchJob>,
    stages: HashMap<Uuid, Vec<StageRecord>>,
}

#[derive(Clone, Default)]
pub struct MemoryJobStore {
    inner: Arc<RwLock<MemoryState>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert_job(&self, job: &ResearchJob, stages: &[StageRecord]) -> Result<(), AppError> {
        let mut state = self.inner.write().await;
        if state.jobs.contains_key(&job.id) {
            return Err(AppError::Conflict(format!("Job {} already exists", job.id)));
        }
        let mut stages = stages.to_vec();
        stages.sort_by_key(|s| s.section);
        state.jobs.insert(job.id, job.clone());
        state.stages.insert(job.id, stages);
        Ok(())
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<ResearchJob>, AppError> {
        Ok(self.inner.read().await.jobs.get(&id).cloned())
    }

    async fn list_jobs(&self, limit: i64) -> Result<Vec<ResearchJob>, AppError> {
        let state = self.inner.read().await;
        let mut jobs: Vec<ResearchJob> = state.jobs.values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs.truncate(limit.max(0) as usize);
        Ok(jobs)
    }

    async fn get_stages(&self, job_id: Uuid) -> Result<Vec<StageRecord>, AppError> {
        Ok(self
            .inner
            .read()
            .await
            .stages
            .get(&job_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn update_job(&self, job: &ResearchJob) -> Result<(), AppError> {
        let mut state = self.inner.write().await;
        match state.jobs.get_mut(&job.id) {
            Some(existing) => {
                let cancel_requested = existing.cancel_requested;
                *existing = job.clone();
                existing.cancel_requested = cancel_requested;
                Ok(())
            }
            None => Err(AppError::NotFound(format!("Job {} not found", job.id))),
        }
    }

    async fn set_cancel_requested(&self, id: Uuid, value: bool) -> Result<(), AppError> {
        let mut state = self.inner.write().await;
        let job = state
            .jobs
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Job {id} not found")))?;
        job.cancel_requested = value;
        Ok(())
    }

    async fn update_stage(&self, stage: &StageRecord) -> Result<(), AppError> {
        let mut state = self.inner.write().await;
        let existing = state
            .stages
            .get_mut(&stage.job_id)
            .and_then(|stages| stages.iter_mut().find(|s| s.section == stage.section))
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "Stage {} of job {} not found",
                    stage.section, stage.job_id
                ))
            })?;
        *existing = stage.clone();
        Ok(())
    }

    async fn unfinished_job_ids(&self) -> Result<Vec<Uuid>, AppError> {
        let state = self.inner.read().await;
        let mut jobs: Vec<&ResearchJob> = state
            .jobs
            .values()
            .filter(|j| j.status.is_active())
            .collect();
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs.into_iter().map(|j| j.id).collect())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Postgres store
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn insert_job(&self, job: &ResearchJob, stages: &[StageRecord]) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        let sections: Vec<String> = job.sections.iter().map(|s| s.to_string()).collect();
        sqlx::query(
            r#"
            INSERT INTO research_jobs
                (id, company_name, company_domain, ticker, geography, industry, notes,
                 sections, status, cancel_requested, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(job.id)
        .bind(&job.subject.company_name)
        .bind(&job.subject.company_domain)
        .bind(&job.subject.ticker)
        .bind(&job.subject.geography)
        .bind(&job.subject.industry)
        .bind(&job.subject.notes)
        .bind(&sections)
        .bind(job.status.as_str())
        .bind(job.cancel_requested)
        .bind(job.created_at)
        .execute(&mut *tx)
        .await?;

        for stage in stages {
            sqlx::query(
                "INSERT INTO research_stages (job_id, section, status) VALUES ($1, $2, $3)",
            )
            .bind(stage.job_id)
            .bind(stage.section.as_str())
            .bind(stage.status.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<ResearchJob>, AppError> {
        let row: Option<ResearchJobRow> =
            sqlx::query_as("SELECT * FROM research_jobs WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(job_from_row).transpose()
    }

    async fn list_jobs(&self, limit: i64) -> Result<Vec<ResearchJob>, AppError> {
        let rows: Vec<ResearchJobRow> =
            sqlx::query_as("SELECT * FROM research_jobs ORDER BY created_at DESC LIMIT $1")
                .bind(limit)
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(job_from_row).collect()
    }

    async fn get_stages(&self, job_id: Uuid) -> Result<Vec<StageRecord>, AppError> {
        let rows: Vec<ResearchStageRow> =
            sqlx::query_as("SELECT * FROM research_stages WHERE job_id = $1")
                .bind(job_id)
                .fetch_all(&self.pool)
                .await?;
        let mut stages = rows
            .into_iter()
            .map(stage_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        stages.sort_by_key(|s| s.section);
        Ok(stages)
    }

    async fn update_job(&self, job: &ResearchJob) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE research_jobs SET
                status = $2, total_cost_usd = $3,
                input_tokens = $4, output_tokens = $5, confidence = $6,
                error_message = $7, started_at = $8, finished_at = $9
            WHERE id = $1
            "#,
        )
        .bind(job.id)
        .bind(job.status.as_str())
        .bind(job.total_cost_usd)
        .bind(job.input_tokens)
        .bind(job.output_tokens)
        .bind(job.confidence)
        .bind(&job.error_message)
        .bind(job.started_at)
        .bind(job.finished_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Job {} not found", job.id)));
        }
        Ok(())
    }

    async fn set_cancel_requested(&self, id: Uuid, value: bool) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE research_jobs SET cancel_requested = $2 WHERE id = $1")
            .bind(id)
            .bind(value)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Job {id} not found")));
        }
        Ok(())
    }

    async fn update_stage(&self, stage: &StageRecord) -> Result<(), AppError> {
        let sources = serde_json::to_value(&stage.sources)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to serialize sources: {e}")))?;

        let result = sqlx::query(
            r#"
            UPDATE research_stages SET
                status = $3, attempts = $4, output = $5, sources = $6,
                confidence = $7, confidence_rationale = $8, cost_usd = $9,
                input_tokens = $10, output_tokens = $11, duration_ms = $12,
                error_message = $13, started_at = $14, finished_at = $15
            WHERE job_id = $1 AND section = $2
            "#,
        )
        .bind(stage.job_id)
        .bind(stage.section.as_str())
        .bind(stage.status.as_str())
        .bind(stage.attempts)
        .bind(&stage.output)
        .bind(&sources)
        .bind(stage.confidence)
        .bind(&stage.confidence_rationale)
        .bind(stage.cost_usd)
        .bind(stage.input_tokens)
        .bind(stage.output_tokens)
        .bind(stage.duration_ms)
        .bind(&stage.error_message)
        .bind(stage.started_at)
        .bind(stage.finished_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "Stage {} of job {} not found",
                stage.section, stage.job_id
            )));
        }
        Ok(())
    }

    async fn unfinished_job_ids(&self) -> Result<Vec<Uuid>, AppError> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT id FROM research_jobs WHERE status IN ('queued', 'running') ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}

fn corrupt(what: String) -> AppError {
    AppError::Internal(anyhow::anyhow!("Corrupt research row: {what}"))
}

fn job_from_row(row: ResearchJobRow) -> Result<ResearchJob, AppError> {
    let sections = row
        .sections
        .iter()
        .map(|s| s.parse::<SectionId>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(corrupt)?;
    let status = row.status.parse::<JobStatus>().map_err(corrupt)?;

    Ok(ResearchJob {
        id: row.id,
        subject: JobSubject {
            company_name: row.company_name,
            company_domain: row.company_domain,
            ticker: row.ticker,
            geography: row.geography,
            industry: row.industry,
            notes: row.notes,
        },
        sections,
        status,
        cancel_requested: row.cancel_requested,
        total_cost_usd: row.total_cost_usd,
        input_tokens: row.input_tokens,
        output_tokens: row.output_tokens,
        confidence: row.confidence,
        error_message: row.error_message,
        created_at: row.created_at,
        started_at: row.started_at,
        finished_at: row.finished_at,
    })
}

fn stage_from_row(row: ResearchStageRow) -> Result<StageRecord, AppError> {
    let sources: Vec<Source> = serde_json::from_value(row.sources)
        .map_err(|e| corrupt(format!("sources: {e}")))?;

    Ok(StageRecord {
        job_id: row.job_id,
        section: row.section.parse().map_err(corrupt)?,
        status: row.status.parse().map_err(corrupt)?,
        attempts: row.attempts,
        output: row.output,
        sources,
        confidence: row.confidence,
        confidence_rationale: row.confidence_rationale,
        cost_usd: row.cost_usd,
        input_tokens: row.input_tokens,
        output_tokens: row.output_tokens,
        duration_ms: row.duration_ms,
        error_message: row.error_message,
        started_at: row.started_at,
        finished_at: row.finished_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::research::status::StageStatus;

    fn new_job(name: &str) -> (ResearchJob, Vec<StageRecord>) {
        ResearchJob::new(
            JobSubject {
                company_name: name.to_string(),
                ..Default::default()
            },
            vec![SectionId::Foundation, SectionId::CompanyOverview],
        )
    }

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryJobStore::new();
        let (job, stages) = new_job("Acme");
        store.insert_job(&job, &stages).await.unwrap();

        let loaded = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(loaded.subject.company_name, "Acme");

        let loaded_stages = store.get_stages(job.id).await.unwrap();
        assert_eq!(
            loaded_stages.iter().map(|s| s.section).collect::<Vec<_>>(),
            vec![SectionId::Foundation, SectionId::CompanyOverview]
        );
    }

    #[tokio::test]
    async fn test_memory_store_rejects_duplicate_insert() {
        let store = MemoryJobStore::new();
        let (job, stages) = new_job("Acme");
        store.insert_job(&job, &stages).await.unwrap();
        assert!(matches!(
            store.insert_job(&job, &stages).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_memory_store_update_stage() {
        let store = MemoryJobStore::new();
        let (job, mut stages) = new_job("Acme");
        store.insert_job(&job, &stages).await.unwrap();

        stages[0].status = StageStatus::Completed;
        stages[0].cost_usd = 0.42;
        store.update_stage(&stages[0]).await.unwrap();

        let loaded = store.get_stages(job.id).await.unwrap();
        assert_eq!(loaded[0].status, StageStatus::Completed);
        assert!((loaded[0].cost_usd - 0.42).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_memory_store_update_job_keeps_cancel_flag() {
        let store = MemoryJobStore::new();
        let (mut job, stages) = new_job("Acme");
        store.insert_job(&job, &stages).await.unwrap();

        store.set_cancel_requested(job.id, true).await.unwrap();
        job.status = JobStatus::Running;
        store.update_job(&job).await.unwrap();

        let loaded = store.get_job(job.id).await.unwrap().unwrap();
        assert!(loaded.cancel_requested);
        assert_eq!(loaded.status, JobStatus::Running);
    }

    #[tokio::test]
    async fn test_memory_store_update_missing_stage_is_not_found() {
        let store = MemoryJobStore::new();
        let stage = StageRecord::pending(Uuid::new_v4(), SectionId::Foundation);
        assert!(matches!(
            store.update_stage(&stage).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_memory_store_unfinished_filters_terminal_jobs() {
        let store = MemoryJobStore::new();
        let (queued, stages_a) = new_job("Queued Co");
        let (mut done, stages_b) = new_job("Done Co");
        done.status = JobStatus::Completed;
        store.insert_job(&queued, &stages_a).await.unwrap();
        store.insert_job(&done, &stages_b).await.unwrap();

        assert_eq!(store.unfinished_job_ids().await.unwrap(), vec![queued.id]);
    }

    #[tokio::test]
    async fn test_memory_store_list_is_newest_first_and_limited() {
        let store = MemoryJobStore::new();
        let (mut older, s1) = new_job("Older");
        older.created_at -= chrono::Duration::minutes(5);
        let (newer, s2) = new_job("Newer");
        store.insert_job(&older, &s1).await.unwrap();
        store.insert_job(&newer, &s2).await.unwrap();

        let listed = store.list_jobs(1).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, newer.id);
    }

    #[test]
    fn test_stage_from_row_rejects_unknown_section() {
        let row = ResearchStageRow {
            job_id: Uuid::new_v4(),
            section: "horoscope".to_string(),
            status: "pending".to_string(),
            attempts: 0,
            output: None,
            sources: serde_json::json!([]),
            confidence: None,
            confidence_rationale: None,
            cost_usd: 0.0,
            input_tokens: 0,
            output_tokens: 0,
            duration_ms: None,
            error_message: None,
            started_at: None,
            finished_at: None,
        };
        assert!(matches!(stage_from_row(row), Err(AppError::Internal(_))));
    }
}

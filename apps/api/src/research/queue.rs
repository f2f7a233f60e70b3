//! Single in-process job queue.
//!
//! Jobs are handed to a fixed pool of worker tasks over an mpsc channel. The
//! `active` set covers both queued and running jobs, which keeps `enqueue`
//! idempotent and lets handlers refuse reruns of a job that is still in flight.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{error, info};
use uuid::Uuid;

use crate::errors::AppError;
use crate::research::orchestrator::Orchestrator;

#[derive(Clone)]
pub struct JobQueue {
    sender: mpsc::UnboundedSender<Uuid>,
    active: Arc<Mutex<HashSet<Uuid>>>,
    orchestrator: Orchestrator,
}

impl JobQueue {
    /// Spawns `workers` tasks that run queued jobs through the orchestrator.
    pub fn start(orchestrator: Orchestrator, workers: usize) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel::<Uuid>();
        let receiver = Arc::new(Mutex::new(receiver));
        let active: Arc<Mutex<HashSet<Uuid>>> = Arc::default();

        for worker in 0..workers.max(1) {
            let receiver = Arc::clone(&receiver);
            let active = Arc::clone(&active);
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                loop {
                    let next = receiver.lock().await.recv().await;
                    let Some(job_id) = next else {
                        break;
                    };

                    info!(worker, "Picked up research job {job_id}");
                    match orchestrator.run_job(job_id).await {
                        Ok(status) => info!(worker, "Research job {job_id} finished: {status}"),
                        Err(e) => error!(worker, "Research job {job_id} aborted: {e}"),
                    }
                    active.lock().await.remove(&job_id);
                }
                info!(worker, "Job queue closed, worker exiting");
            });
        }

        Self {
            sender,
            active,
            orchestrator,
        }
    }

    /// Queues a job. Returns `false` when it is already queued or running.
    pub async fn enqueue(&self, job_id: Uuid) -> Result<bool, AppError> {
        let mut active = self.active.lock().await;
        if !active.insert(job_id) {
            return Ok(false);
        }
        if self.sender.send(job_id).is_err() {
            active.remove(&job_id);
            return Err(AppError::Internal(anyhow::anyhow!(
                "Job queue is not accepting work"
            )));
        }
        Ok(true)
    }

    pub async fn is_active(&self, job_id: Uuid) -> bool {
        self.active.lock().await.contains(&job_id)
    }

    /// Interrupts the worker running `job_id`. The cancel flag must already
    /// be set in the store.
    pub async fn signal_cancel(&self, job_id: Uuid) {
        self.orchestrator.signal_cancel(job_id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;

    use crate::llm_client::pricing::UsageTotals;
    use crate::research::generator::{
        GeneratedSection, SectionFailure, SectionGenerator, SectionOutput, SectionRequest,
    };
    use crate::research::job::{JobSubject, ResearchJob};
    use crate::research::sections::SectionId;
    use crate::research::status::JobStatus;
    use crate::research::store::{JobStore, MemoryJobStore};

    struct SlowGenerator;

    #[async_trait]
    impl SectionGenerator for SlowGenerator {
        async fn generate(
            &self,
            _request: &SectionRequest,
        ) -> Result<GeneratedSection, SectionFailure> {
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok(GeneratedSection {
                output: SectionOutput {
                    content: json!({"ok": true}),
                    sources: vec![],
                    confidence: None,
                    confidence_rationale: None,
                },
                usage: UsageTotals::default(),
                attempts: 1,
            })
        }
    }

    async fn wait_until_idle(queue: &JobQueue, job_id: Uuid) {
        for _ in 0..200 {
            if !queue.is_active(job_id).await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {job_id} never finished");
    }

    #[tokio::test]
    async fn test_enqueue_runs_job_and_is_idempotent() {
        let store = Arc::new(MemoryJobStore::new());
        let orchestrator = Orchestrator::new(store.clone(), Arc::new(SlowGenerator), 2);
        let queue = JobQueue::start(orchestrator, 1);

        let subject = JobSubject {
            company_name: "Acme".to_string(),
            ..Default::default()
        };
        let (job, stages) = ResearchJob::new(subject, vec![SectionId::Foundation]);
        store.insert_job(&job, &stages).await.unwrap();

        assert!(queue.enqueue(job.id).await.unwrap());
        assert!(!queue.enqueue(job.id).await.unwrap());
        assert!(queue.is_active(job.id).await);

        wait_until_idle(&queue, job.id).await;
        let job = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_unknown_job_does_not_stall_worker() {
        let store = Arc::new(MemoryJobStore::new());
        let orchestrator = Orchestrator::new(store.clone(), Arc::new(SlowGenerator), 1);
        let queue = JobQueue::start(orchestrator, 1);

        let missing = Uuid::new_v4();
        assert!(queue.enqueue(missing).await.unwrap());
        wait_until_idle(&queue, missing).await;

        let subject = JobSubject {
            company_name: "Acme".to_string(),
            ..Default::default()
        };
        let (job, stages) = ResearchJob::new(subject, vec![SectionId::Foundation]);
        store.insert_job(&job, &stages).await.unwrap();
        queue.enqueue(job.id).await.unwrap();
        wait_until_idle(&queue, job.id).await;

        let job = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::research::sections::SectionId;
use crate::research::status::{JobStatus, StageStatus};

/// The company a report is about, plus the analyst's framing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobSubject {
    pub company_name: String,
    #[serde(default)]
    pub company_domain: Option<String>,
    #[serde(default)]
    pub ticker: Option<String>,
    #[serde(default)]
    pub geography: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    /// Free-form analyst notes ("focus on EMEA logistics spend").
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchJob {
    pub id: Uuid,
    #[serde(flatten)]
    pub subject: JobSubject,
    /// Sections in canonical order, closed over hard dependencies.
    pub sections: Vec<SectionId>,
    pub status: JobStatus,
    pub cancel_requested: bool,
    /// Cumulative spend, including every rerun.
    pub total_cost_usd: f64,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub confidence: Option<f64>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ResearchJob {
    /// Creates a queued job and one pending stage per section.
    pub fn new(subject: JobSubject, sections: Vec<SectionId>) -> (Self, Vec<StageRecord>) {
        let id = Uuid::new_v4();
        let stages = sections
            .iter()
            .map(|section| StageRecord::pending(id, *section))
            .collect();
        let job = Self {
            id,
            subject,
            sections,
            status: JobStatus::Queued,
            cancel_requested: false,
            total_cost_usd: 0.0,
            input_tokens: 0,
            output_tokens: 0,
            confidence: None,
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        };
        (job, stages)
    }
}

/// A citation attached to a section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    #[serde(default)]
    pub title: Option<String>,
    pub url: String,
}

/// One section of a job: its status, output and what it cost.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    pub job_id: Uuid,
    pub section: SectionId,
    pub status: StageStatus,
    pub attempts: i32,
    pub output: Option<Value>,
    pub sources: Vec<Source>,
    pub confidence: Option<f64>,
    pub confidence_rationale: Option<String>,
    /// Spend of the latest run of this stage.
    pub cost_usd: f64,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub duration_ms: Option<i64>,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl StageRecord {
    pub fn pending(job_id: Uuid, section: SectionId) -> Self {
        Self {
            job_id,
            section,
            status: StageStatus::Pending,
            attempts: 0,
            output: None,
            sources: Vec::new(),
            confidence: None,
            confidence_rationale: None,
            cost_usd: 0.0,
            input_tokens: 0,
            output_tokens: 0,
            duration_ms: None,
            error_message: None,
            started_at: None,
            finished_at: None,
        }
    }

    /// Returns the stage to a fresh pending state, discarding the previous run.
    pub fn reset(&mut self) {
        *self = Self::pending(self.job_id, self.section);
    }
}

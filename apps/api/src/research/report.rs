//! Report assembly from a job's stages. Works on partial jobs too: anything
//! not completed is listed as a gap.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::news::normalize::normalize_url;
use crate::research::job::{ResearchJob, Source, StageRecord};
use crate::research::sections::SectionId;
use crate::research::status::{JobStatus, StageStatus};

#[derive(Debug, Serialize)]
pub struct ReportSection {
    pub section: SectionId,
    pub title: &'static str,
    pub content: Value,
    pub sources: Vec<Source>,
    pub confidence: Option<f64>,
    pub confidence_rationale: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReportGap {
    pub section: SectionId,
    pub title: &'static str,
    pub status: StageStatus,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ResearchReport {
    pub job_id: Uuid,
    pub company_name: String,
    pub status: JobStatus,
    pub confidence: Option<f64>,
    pub total_cost_usd: f64,
    pub generated_at: DateTime<Utc>,
    pub sections: Vec<ReportSection>,
    pub gaps: Vec<ReportGap>,
    /// Every cited source once, in first-cited order.
    pub sources: Vec<Source>,
}

pub fn build_report(job: &ResearchJob, stages: &[StageRecord]) -> ResearchReport {
    let mut ordered: Vec<&StageRecord> = stages.iter().collect();
    ordered.sort_by_key(|s| s.section);

    let mut sections = Vec::new();
    let mut gaps = Vec::new();
    for stage in ordered {
        match (&stage.status, &stage.output) {
            (StageStatus::Completed, Some(content)) => sections.push(ReportSection {
                section: stage.section,
                title: stage.section.title(),
                content: content.clone(),
                sources: stage.sources.clone(),
                confidence: stage.confidence,
                confidence_rationale: stage.confidence_rationale.clone(),
            }),
            _ => gaps.push(ReportGap {
                section: stage.section,
                title: stage.section.title(),
                status: stage.status,
                reason: stage.error_message.clone(),
            }),
        }
    }

    let sources = consolidate_sources(sections.iter().flat_map(|s| s.sources.iter()));

    ResearchReport {
        job_id: job.id,
        company_name: job.subject.company_name.clone(),
        status: job.status,
        confidence: job.confidence,
        total_cost_usd: job.total_cost_usd,
        generated_at: Utc::now(),
        sections,
        gaps,
        sources,
    }
}

/// Deduplicates by normalized URL, keeping the first title seen and filling
/// it in from later citations when the first had none.
fn consolidate_sources<'a>(sources: impl IntoIterator<Item = &'a Source>) -> Vec<Source> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut keys: Vec<String> = Vec::new();
    let mut out: Vec<Source> = Vec::new();

    for source in sources {
        let key = normalize_url(&source.url).unwrap_or_else(|| source.url.clone());
        if seen.insert(key.clone()) {
            keys.push(key);
            out.push(source.clone());
        } else if let Some(index) = keys.iter().position(|k| *k == key) {
            if out[index].title.is_none() {
                out[index].title = source.title.clone();
            }
        }
    }
    out
}

//! Stage and job status, and the rules that derive a job's status from its stages.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::research::sections::SectionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Completed,
    Failed,
    /// A hard dependency failed, was blocked, or was cancelled.
    Blocked,
    Cancelled,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Pending => "pending",
            StageStatus::Running => "running",
            StageStatus::Completed => "completed",
            StageStatus::Failed => "failed",
            StageStatus::Blocked => "blocked",
            StageStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, StageStatus::Pending | StageStatus::Running)
    }

    /// Terminal and unsuccessful: the stage is eligible for a rerun and blocks
    /// anything that hard-depends on it.
    pub fn is_unsuccessful(&self) -> bool {
        matches!(
            self,
            StageStatus::Failed | StageStatus::Blocked | StageStatus::Cancelled
        )
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(StageStatus::Pending),
            "running" => Ok(StageStatus::Running),
            "completed" => Ok(StageStatus::Completed),
            "failed" => Ok(StageStatus::Failed),
            "blocked" => Ok(StageStatus::Blocked),
            "cancelled" => Ok(StageStatus::Cancelled),
            other => Err(format!("unknown stage status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    CompletedWithErrors,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::CompletedWithErrors => "completed_with_errors",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Running)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "completed_with_errors" => Ok(JobStatus::CompletedWithErrors),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(format!("unknown job status '{other}'")),
        }
    }
}

/// Derives the overall job status from `(section, status)` pairs.
///
/// Precedence: running work, then pending work, then the terminal outcome.
/// A job whose foundation never completed is failed, because every other
/// section is built on it.
pub fn derive_job_status(stages: &[(SectionId, StageStatus)]) -> JobStatus {
    if stages.is_empty() {
        return JobStatus::Queued;
    }

    let count = |wanted: StageStatus| stages.iter().filter(|(_, s)| *s == wanted).count();

    if count(StageStatus::Running) > 0 {
        return JobStatus::Running;
    }

    let pending = count(StageStatus::Pending);
    if pending > 0 {
        return if pending == stages.len() {
            JobStatus::Queued
        } else {
            JobStatus::Running
        };
    }

    let completed = count(StageStatus::Completed);
    if completed == stages.len() {
        return JobStatus::Completed;
    }
    if count(StageStatus::Cancelled) > 0 {
        return JobStatus::Cancelled;
    }

    let foundation_ok = stages
        .iter()
        .find(|(section, _)| *section == SectionId::Foundation)
        .map(|(_, status)| *status == StageStatus::Completed)
        .unwrap_or(true);

    if completed == 0 || !foundation_ok {
        JobStatus::Failed
    } else {
        JobStatus::CompletedWithErrors
    }
}

/// Self-reported confidence attached to each generated section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    pub fn score(&self) -> f64 {
        match self {
            ConfidenceLevel::High => 0.9,
            ConfidenceLevel::Medium => 0.6,
            ConfidenceLevel::Low => 0.3,
        }
    }

    pub fn from_score(score: f64) -> Self {
        if score >= 0.75 {
            ConfidenceLevel::High
        } else if score >= 0.45 {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }

    /// Lenient parse of model output ("High", "medium-high", "LOW confidence").
    pub fn parse_lenient(raw: &str) -> Option<Self> {
        let lower = raw.trim().to_lowercase();
        if lower.starts_with("high") {
            Some(ConfidenceLevel::High)
        } else if lower.starts_with("med") {
            Some(ConfidenceLevel::Medium)
        } else if lower.starts_with("low") {
            Some(ConfidenceLevel::Low)
        } else {
            None
        }
    }
}

/// Mean confidence over the stages that produced one.
pub fn aggregate_confidence(scores: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, n) = scores
        .into_iter()
        .fold((0.0_f64, 0_usize), |(sum, n), s| (sum + s, n + 1));
    (n > 0).then(|| (sum / n as f64).clamp(0.0, 1.0))
}

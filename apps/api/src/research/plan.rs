//! Scheduling decisions over a job's stages: what can run now, what is blocked,
//! and which stages a partial rerun has to reset.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use crate::errors::AppError;
use crate::research::job::StageRecord;
use crate::research::sections::{dependents_within, SectionId};
use crate::research::status::StageStatus;

pub fn status_pairs(stages: &[StageRecord]) -> Vec<(SectionId, StageStatus)> {
    stages.iter().map(|s| (s.section, s.status)).collect()
}

/// Pending sections whose hard dependencies have completed and whose soft
/// dependencies (when part of the job) have reached a terminal state.
pub fn ready_sections(stages: &[(SectionId, StageStatus)]) -> Vec<SectionId> {
    let status: HashMap<SectionId, StageStatus> = stages.iter().copied().collect();

    let mut ready: Vec<SectionId> = stages
        .iter()
        .filter(|(_, s)| *s == StageStatus::Pending)
        .map(|(section, _)| *section)
        .filter(|section| {
            let hard_ok = section.hard_dependencies().iter().all(|dep| {
                status
                    .get(dep)
                    .map(|s| *s == StageStatus::Completed)
                    .unwrap_or(true)
            });
            let soft_ok = section
                .soft_dependencies()
                .iter()
                .all(|dep| status.get(dep).map(|s| s.is_terminal()).unwrap_or(true));
            hard_ok && soft_ok
        })
        .collect();
    ready.sort();
    ready
}

/// Pending sections that can never run because a hard dependency ended
/// unsuccessfully, followed transitively through other blocked sections.
pub fn blocked_sections(stages: &[(SectionId, StageStatus)]) -> Vec<SectionId> {
    let mut status: HashMap<SectionId, StageStatus> = stages.iter().copied().collect();
    let mut blocked: BTreeSet<SectionId> = BTreeSet::new();

    loop {
        let newly: Vec<SectionId> = status
            .iter()
            .filter(|(_, s)| **s == StageStatus::Pending)
            .map(|(section, _)| *section)
            .filter(|section| {
                section.hard_dependencies().iter().any(|dep| {
                    status
                        .get(dep)
                        .map(|s| s.is_unsuccessful())
                        .unwrap_or(false)
                })
            })
            .collect();

        if newly.is_empty() {
            break;
        }
        for section in newly {
            status.insert(section, StageStatus::Blocked);
            blocked.insert(section);
        }
    }
    blocked.into_iter().collect()
}

/// The set of stages a rerun resets, in canonical order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RerunPlan {
    /// Sections named by the caller (or every unsuccessful one).
    pub requested: Vec<SectionId>,
    /// `requested` plus everything downstream of it within the job.
    pub sections: Vec<SectionId>,
}

/// Plans a partial rerun. With no explicit request, every failed, blocked or
/// cancelled stage is rerun. Downstream dependents are always included so no
/// section keeps output built on stale inputs.
pub fn plan_rerun(
    stages: &[(SectionId, StageStatus)],
    requested: Option<&[SectionId]>,
) -> Result<RerunPlan, AppError> {
    let job_sections: Vec<SectionId> = stages.iter().map(|(s, _)| *s).collect();

    let requested: Vec<SectionId> = match requested {
        Some(sections) if !sections.is_empty() => {
            let unknown: Vec<String> = sections
                .iter()
                .filter(|s| !job_sections.contains(s))
                .map(|s| s.to_string())
                .collect();
            if !unknown.is_empty() {
                return Err(AppError::Validation(format!(
                    "Sections not part of this job: {}",
                    unknown.join(", ")
                )));
            }
            let mut sections = sections.to_vec();
            sections.sort();
            sections.dedup();
            sections
        }
        _ => stages
            .iter()
            .filter(|(_, s)| s.is_unsuccessful())
            .map(|(section, _)| *section)
            .collect(),
    };

    if requested.is_empty() {
        return Err(AppError::Validation(
            "Nothing to rerun: no failed, blocked or cancelled sections".to_string(),
        ));
    }

    let mut affected: BTreeSet<SectionId> = requested.iter().copied().collect();
    for section in &requested {
        affected.extend(dependents_within(*section, &job_sections));
    }

    Ok(RerunPlan {
        requested,
        sections: affected.into_iter().collect(),
    })
}

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::research::job::ResearchJob;
use crate::research::lifecycle::{
    create_job, load_detail, request_cancel, request_rerun, CreateJobRequest, JobDetail,
    RerunRequest, RerunResponse,
};
use crate::research::report::{build_report, ResearchReport};
use crate::research::sections::SectionId;
use crate::state::AppState;

const DEFAULT_LIST_LIMIT: i64 = 50;
const MAX_LIST_LIMIT: i64 = 200;

#[derive(Serialize)]
pub struct SectionInfo {
    pub id: SectionId,
    pub title: &'static str,
    pub description: &'static str,
    pub hard_dependencies: &'static [SectionId],
    pub soft_dependencies: &'static [SectionId],
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
}

/// GET /api/v1/research/sections
pub async fn handle_list_sections() -> Json<Vec<SectionInfo>> {
    Json(
        SectionId::ALL
            .iter()
            .map(|s| SectionInfo {
                id: *s,
                title: s.title(),
                description: s.description(),
                hard_dependencies: s.hard_dependencies(),
                soft_dependencies: s.soft_dependencies(),
            })
            .collect(),
    )
}

/// POST /api/v1/research/jobs
pub async fn handle_create_job(
    State(state): State<AppState>,
    Json(req): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<JobDetail>), AppError> {
    let detail = create_job(state.jobs.as_ref(), &state.queue, req).await?;
    Ok((StatusCode::ACCEPTED, Json(detail)))
}

/// GET /api/v1/research/jobs
pub async fn handle_list_jobs(
    State(state): State<AppState>,
    Query(params): Query<ListQuery>,
) -> Result<Json<Vec<ResearchJob>>, AppError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);
    Ok(Json(state.jobs.list_jobs(limit).await?))
}

/// GET /api/v1/research/jobs/:id
pub async fn handle_get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobDetail>, AppError> {
    Ok(Json(load_detail(state.jobs.as_ref(), id).await?))
}

/// POST /api/v1/research/jobs/:id/rerun
pub async fn handle_rerun_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<(StatusCode, Json<RerunResponse>), AppError> {
    let req = parse_rerun_body(&body)?;
    let response = request_rerun(state.jobs.as_ref(), &state.queue, id, req).await?;
    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// An empty body reruns the default selection; anything else must be a valid
/// rerun request.
fn parse_rerun_body(body: &[u8]) -> Result<RerunRequest, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(RerunRequest::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| AppError::Validation(format!("Invalid rerun request body: {e}")))
}

/// POST /api/v1/research/jobs/:id/cancel
pub async fn handle_cancel_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<JobDetail>), AppError> {
    let detail = request_cancel(state.jobs.as_ref(), &state.queue, id).await?;
    Ok((StatusCode::ACCEPTED, Json(detail)))
}

/// GET /api/v1/research/jobs/:id/report
pub async fn handle_get_report(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ResearchReport>, AppError> {
    let detail = load_detail(state.jobs.as_ref(), id).await?;
    Ok(Json(build_report(&detail.job, &detail.stages)))
}

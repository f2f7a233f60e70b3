use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::news::article::{EntityKind, TrackedEntity};
use crate::news::digest::{build_digest, Digest};
use crate::news::refresh::{refresh_all, refresh_entity, RefreshAllSummary, RefreshSummary};
use crate::state::AppState;

const DEFAULT_PER_CATEGORY: usize = 5;
const MAX_PER_CATEGORY: usize = 50;
const MAX_DIGEST_DAYS: i64 = 365;

#[derive(Deserialize)]
pub struct CreateEntityRequest {
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub company: Option<String>,
    pub domain: Option<String>,
}

#[derive(Deserialize)]
pub struct DigestQuery {
    pub days: Option<i64>,
    pub per_category: Option<usize>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl CreateEntityRequest {
    fn into_entity(self) -> Result<TrackedEntity, AppError> {
        let kind: EntityKind = self.kind.trim().parse().map_err(AppError::Validation)?;
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::Validation("name must not be empty".to_string()));
        }
        let mut aliases: Vec<String> = Vec::new();
        for alias in self.aliases {
            let alias = alias.trim().to_string();
            if !alias.is_empty() && !alias.eq_ignore_ascii_case(&name) && !aliases.contains(&alias) {
                aliases.push(alias);
            }
        }
        Ok(TrackedEntity::new(
            kind,
            name,
            aliases,
            non_empty(self.company),
            non_empty(self.domain),
        ))
    }
}

async fn load_entity(state: &AppState, id: Uuid) -> Result<TrackedEntity, AppError> {
    state
        .news_store
        .get_entity(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Entity {id} not found")))
}

/// POST /api/v1/news/entities
pub async fn handle_create_entity(
    State(state): State<AppState>,
    Json(req): Json<CreateEntityRequest>,
) -> Result<(StatusCode, Json<TrackedEntity>), AppError> {
    let entity = req.into_entity()?;
    state.news_store.insert_entity(&entity).await?;
    Ok((StatusCode::CREATED, Json(entity)))
}

/// GET /api/v1/news/entities
pub async fn handle_list_entities(
    State(state): State<AppState>,
) -> Result<Json<Vec<TrackedEntity>>, AppError> {
    Ok(Json(state.news_store.list_entities(false).await?))
}

/// DELETE /api/v1/news/entities/:id
pub async fn handle_delete_entity(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if state.news_store.delete_entity(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("Entity {id} not found")))
    }
}

/// POST /api/v1/news/entities/:id/refresh
pub async fn handle_refresh_entity(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RefreshSummary>, AppError> {
    let entity = load_entity(&state, id).await?;
    let summary = refresh_entity(
        state.news_store.as_ref(),
        &state.news_fetcher,
        &entity,
        state.config.news_lookback_days,
    )
    .await?;
    Ok(Json(summary))
}

/// POST /api/v1/news/refresh
pub async fn handle_refresh_all(
    State(state): State<AppState>,
) -> Result<Json<RefreshAllSummary>, AppError> {
    let summary = refresh_all(
        state.news_store.as_ref(),
        &state.news_fetcher,
        state.config.news_lookback_days,
    )
    .await?;
    Ok(Json(summary))
}

/// GET /api/v1/news/entities/:id/digest
pub async fn handle_digest(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<DigestQuery>,
) -> Result<Json<Digest>, AppError> {
    let days = params.days.unwrap_or(state.config.news_lookback_days);
    if !(1..=MAX_DIGEST_DAYS).contains(&days) {
        return Err(AppError::Validation(format!(
            "days must be between 1 and {MAX_DIGEST_DAYS}"
        )));
    }
    let per_category = params
        .per_category
        .unwrap_or(DEFAULT_PER_CATEGORY)
        .clamp(1, MAX_PER_CATEGORY);

    let entity = load_entity(&state, id).await?;
    let now = Utc::now();
    let since = now - Duration::days(days);
    let articles = state.news_store.recent_articles(id, since).await?;
    Ok(Json(build_digest(&entity, &articles, since, now, per_category)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(kind: &str, name: &str, aliases: &[&str]) -> CreateEntityRequest {
        CreateEntityRequest {
            kind: kind.to_string(),
            name: name.to_string(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
            company: Some("  ".to_string()),
            domain: None,
        }
    }

    #[test]
    fn test_entity_request_cleans_aliases() {
        let entity = request("company", " Acme ", &["ACME", "Acme Corp", " Acme Corp ", ""])
            .into_entity()
            .unwrap();
        assert_eq!(entity.name, "Acme");
        assert_eq!(entity.aliases, vec!["Acme Corp".to_string()]);
        assert!(entity.company.is_none());
        assert!(entity.active);
    }

    #[test]
    fn test_entity_request_rejects_bad_input() {
        assert!(matches!(
            request("planet", "Mars", &[]).into_entity(),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            request("person", "   ", &[]).into_entity(),
            Err(AppError::Validation(_))
        ));
    }
}

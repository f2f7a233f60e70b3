pub mod health;

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::news::handlers as news;
use crate::research::handlers as research;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Research API
        .route(
            "/api/v1/research/sections",
            get(research::handle_list_sections),
        )
        .route(
            "/api/v1/research/jobs",
            get(research::handle_list_jobs).post(research::handle_create_job),
        )
        .route("/api/v1/research/jobs/:id", get(research::handle_get_job))
        .route(
            "/api/v1/research/jobs/:id/rerun",
            post(research::handle_rerun_job),
        )
        .route(
            "/api/v1/research/jobs/:id/cancel",
            post(research::handle_cancel_job),
        )
        .route(
            "/api/v1/research/jobs/:id/report",
            get(research::handle_get_report),
        )
        // News API
        .route(
            "/api/v1/news/entities",
            get(news::handle_list_entities).post(news::handle_create_entity),
        )
        .route("/api/v1/news/entities/:id", delete(news::handle_delete_entity))
        .route(
            "/api/v1/news/entities/:id/refresh",
            post(news::handle_refresh_entity),
        )
        .route(
            "/api/v1/news/entities/:id/digest",
            get(news::handle_digest),
        )
        .route("/api/v1/news/refresh", post(news::handle_refresh_all))
        .with_state(state)
}

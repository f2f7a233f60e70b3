use std::sync::Arc;

use crate::config::Config;
use crate::news::fetch::NewsFetcher;
use crate::news::store::NewsStore;
use crate::research::queue::JobQueue;
use crate::research::store::JobStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub jobs: Arc<dyn JobStore>,
    /// Hands job ids to the background workers.
    pub queue: JobQueue,
    pub news_store: Arc<dyn NewsStore>,
    pub news_fetcher: Arc<NewsFetcher>,
}

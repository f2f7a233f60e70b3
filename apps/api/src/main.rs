mod config;
mod db;
mod errors;
mod llm_client;
mod models;
mod news;
mod research;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::create_pool;
use crate::llm_client::LlmClient;
use crate::news::dedup::DedupConfig;
use crate::news::fetch::{FetchSettings, NewsFetcher};
use crate::news::refresh::spawn_periodic_refresh;
use crate::news::sources::{FeedSource, LlmNewsSource, NewsSource};
use crate::news::store::{MemoryNewsStore, NewsStore, PgNewsStore};
use crate::research::generator::LlmSectionGenerator;
use crate::research::orchestrator::Orchestrator;
use crate::research::queue::JobQueue;
use crate::research::store::{JobStore, MemoryJobStore, PgJobStore};
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Dossier API v{}", env!("CARGO_PKG_VERSION"));

    let (jobs, news_store): (Arc<dyn JobStore>, Arc<dyn NewsStore>) = match &config.database_url {
        Some(url) => {
            let pool = create_pool(url).await?;
            (
                Arc::new(PgJobStore::new(pool.clone())),
                Arc::new(PgNewsStore::new(pool)),
            )
        }
        None => {
            warn!("DATABASE_URL not set; jobs and news are kept in memory only");
            (
                Arc::new(MemoryJobStore::new()),
                Arc::new(MemoryNewsStore::new()),
            )
        }
    };

    let llm = LlmClient::new(config.anthropic_api_key.clone())?;
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    // Research pipeline
    let generator = Arc::new(LlmSectionGenerator::new(
        llm.clone(),
        config.stage_max_attempts,
    ));
    let orchestrator = Orchestrator::new(jobs.clone(), generator, config.max_parallel_stages);
    let recovered = orchestrator.recover_interrupted().await?;
    let queue = JobQueue::start(orchestrator, config.job_workers);
    for job_id in recovered {
        queue.enqueue(job_id).await?;
    }
    info!(
        "Research queue started ({} workers, {} parallel stages)",
        config.job_workers, config.max_parallel_stages
    );

    // News pipeline
    let feed: Option<Arc<dyn NewsSource>> = match &config.news_api_url {
        Some(url) => Some(Arc::new(FeedSource::new(
            url.clone(),
            config.news_api_key.clone(),
        )?)),
        None => None,
    };
    let llm_news: Option<Arc<dyn NewsSource>> = if config.news_llm_enabled {
        Some(Arc::new(LlmNewsSource::new(llm)))
    } else {
        None
    };
    info!(
        "News layers: feed={}, llm={}",
        feed.is_some(),
        llm_news.is_some()
    );
    let news_fetcher = Arc::new(NewsFetcher::new(
        feed,
        llm_news,
        FetchSettings {
            min_feed_results: config.news_min_feed_results,
            llm_always: config.news_llm_always,
            dedup: DedupConfig {
                jaccard_threshold: config.dedup_jaccard_threshold,
                signature_window_days: config.dedup_signature_window_days,
                ..DedupConfig::default()
            },
        },
    ));

    if let Some(secs) = config.news_refresh_interval_secs.filter(|s| *s > 0) {
        spawn_periodic_refresh(
            news_store.clone(),
            news_fetcher.clone(),
            config.news_lookback_days,
            Duration::from_secs(secs),
        );
        info!("Periodic news refresh every {secs}s");
    }

    let state = AppState {
        config: config.clone(),
        jobs,
        queue,
        news_store,
        news_fetcher,
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

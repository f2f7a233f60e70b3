//! Two-layer news fetch.
//!
//! Layer 1 (feed) always runs when configured. Layer 2 (LLM web search) runs
//! when layer 1 came back thin or failed, or on every fetch when configured
//! to. Results are merged feed-first and deduplicated within the batch.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::errors::AppError;
use crate::llm_client::pricing::UsageTotals;
use crate::news::article::{NewsArticle, RawArticle, TrackedEntity};
use crate::news::dedup::{dedup_batch, DedupConfig, DuplicateRecord};
use crate::news::normalize::normalize_url;
use crate::news::sources::NewsSource;

#[derive(Debug, Clone, Copy)]
pub struct FetchSettings {
    /// Below this many feed results the LLM layer is consulted.
    pub min_feed_results: usize,
    /// Consult the LLM layer on every fetch.
    pub llm_always: bool,
    pub dedup: DedupConfig,
}

/// What one layer contributed to a fetch.
#[derive(Debug, Clone, Serialize)]
pub struct LayerReport {
    pub source: &'static str,
    pub articles: usize,
    pub error: Option<String>,
}

#[derive(Debug)]
pub struct FetchResult {
    pub articles: Vec<NewsArticle>,
    pub duplicates: Vec<DuplicateRecord>,
    pub layers: Vec<LayerReport>,
    pub usage: UsageTotals,
}

pub struct NewsFetcher {
    feed: Option<Arc<dyn NewsSource>>,
    llm: Option<Arc<dyn NewsSource>>,
    settings: FetchSettings,
}

impl NewsFetcher {
    pub fn new(
        feed: Option<Arc<dyn NewsSource>>,
        llm: Option<Arc<dyn NewsSource>>,
        settings: FetchSettings,
    ) -> Self {
        Self {
            feed,
            llm,
            settings,
        }
    }

    pub fn dedup_config(&self) -> DedupConfig {
        self.settings.dedup
    }

    /// Fetches news about `entity` published in `[since, now]`. Fails only
    /// when every layer that ran failed.
    pub async fn fetch(
        &self,
        entity: &TrackedEntity,
        since: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<FetchResult, AppError> {
        let mut layers = Vec::new();
        let mut usage = UsageTotals::default();
        let mut raw: Vec<RawArticle> = Vec::new();

        let mut feed_count = 0;
        let mut feed_failed = false;
        if let Some(feed) = &self.feed {
            match feed.search(entity, since, now).await {
                Ok(batch) => {
                    feed_count = batch.articles.len();
                    usage.add(batch.usage);
                    raw.extend(batch.articles);
                    layers.push(LayerReport {
                        source: feed.name(),
                        articles: feed_count,
                        error: None,
                    });
                }
                Err(e) => {
                    warn!("Feed layer failed for '{}', degrading: {e}", entity.name);
                    feed_failed = true;
                    layers.push(LayerReport {
                        source: feed.name(),
                        articles: 0,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        let wants_llm = self.settings.llm_always
            || feed_failed
            || feed_count < self.settings.min_feed_results;
        if let Some(llm) = self.llm.as_ref().filter(|_| wants_llm) {
            match llm.search(entity, since, now).await {
                Ok(batch) => {
                    usage.add(batch.usage);
                    let received = batch.articles.len();
                    let kept: Vec<RawArticle> = batch
                        .articles
                        .into_iter()
                        .filter(|a| llm_article_acceptable(a, since, now))
                        .collect();
                    if kept.len() < received {
                        info!(
                            "Dropped {} LLM articles for '{}' without a valid URL or date in range",
                            received - kept.len(),
                            entity.name
                        );
                    }
                    layers.push(LayerReport {
                        source: llm.name(),
                        articles: kept.len(),
                        error: None,
                    });
                    raw.extend(kept);
                }
                Err(e) => {
                    warn!("LLM news layer failed for '{}': {e}", entity.name);
                    layers.push(LayerReport {
                        source: llm.name(),
                        articles: 0,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        if layers.is_empty() {
            warn!("No news sources configured; nothing fetched for '{}'", entity.name);
        } else if layers.iter().all(|l| l.error.is_some()) {
            let errors: Vec<String> = layers
                .iter()
                .filter_map(|l| l.error.as_ref().map(|e| format!("{}: {e}", l.source)))
                .collect();
            return Err(AppError::Upstream(format!(
                "All news sources failed for '{}': {}",
                entity.name,
                errors.join("; ")
            )));
        }

        let articles: Vec<NewsArticle> = raw
            .into_iter()
            .filter_map(|r| NewsArticle::from_raw(entity, r, now))
            .collect();
        let outcome = dedup_batch(&[], articles, &self.settings.dedup);

        info!(
            "Fetched {} unique articles for '{}' ({} merged)",
            outcome.unique.len(),
            entity.name,
            outcome.duplicates.len()
        );
        Ok(FetchResult {
            articles: outcome.unique,
            duplicates: outcome.duplicates,
            layers,
            usage,
        })
    }
}

/// LLM articles need a real http(s) URL and a publish date inside the window
/// (compared by calendar day, since models usually report bare dates).
fn llm_article_acceptable(article: &RawArticle, since: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    if normalize_url(&article.url).is_none() {
        return false;
    }
    match article.published_at {
        Some(published) => {
            published.date_naive() >= since.date_naive() && published <= now + Duration::days(1)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::TimeZone;

    use crate::news::article::{ArticleOrigin, EntityKind};
    use crate::news::sources::SourceBatch;

    struct StaticSource {
        name: &'static str,
        result: Result<Vec<RawArticle>, String>,
        calls: AtomicUsize,
    }

    impl StaticSource {
        fn ok(name: &'static str, articles: Vec<RawArticle>) -> Arc<Self> {
            Arc::new(Self {
                name,
                result: Ok(articles),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                result: Err("503 from provider".to_string()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl NewsSource for StaticSource {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn search(
            &self,
            _entity: &TrackedEntity,
            _since: DateTime<Utc>,
            _until: DateTime<Utc>,
        ) -> Result<SourceBatch, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.result {
                Ok(articles) => Ok(SourceBatch {
                    articles: articles.clone(),
                    usage: UsageTotals {
                        cost_usd: 0.01,
                        ..Default::default()
                    },
                }),
                Err(msg) => Err(AppError::Upstream(msg.clone())),
            }
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn entity() -> TrackedEntity {
        TrackedEntity::new(EntityKind::Company, "Acme".to_string(), vec![], None, None)
    }

    fn raw(title: &str, url: &str, days_ago: Option<i64>, origin: ArticleOrigin) -> RawArticle {
        RawArticle {
            title: title.to_string(),
            url: url.to_string(),
            publisher: None,
            published_at: days_ago.map(|d| now() - Duration::days(d)),
            summary: None,
            category_hint: None,
            origin,
        }
    }

    fn settings(min_feed_results: usize, llm_always: bool) -> FetchSettings {
        FetchSettings {
            min_feed_results,
            llm_always,
            dedup: DedupConfig::default(),
        }
    }

    fn fetcher(
        feed: Option<Arc<StaticSource>>,
        llm: Option<Arc<StaticSource>>,
        settings: FetchSettings,
    ) -> NewsFetcher {
        NewsFetcher::new(
            feed.map(|f| f as Arc<dyn NewsSource>),
            llm.map(|l| l as Arc<dyn NewsSource>),
            settings,
        )
    }

    fn feed_articles(n: usize) -> Vec<RawArticle> {
        let topics = ["berlin office", "solar roof", "charity run", "new logo", "podcast"];
        (0..n)
            .map(|i| {
                raw(
                    &format!("Acme {} story", topics[i % topics.len()]),
                    &format!("https://feed.com/{i}"),
                    Some(1),
                    ArticleOrigin::Feed,
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn test_enough_feed_results_skip_llm() {
        let feed = StaticSource::ok("feed", feed_articles(5));
        let llm = StaticSource::ok("llm", vec![]);
        let fetcher = fetcher(Some(feed.clone()), Some(llm.clone()), settings(5, false));

        let result = fetcher.fetch(&entity(), now() - Duration::days(14), now()).await.unwrap();
        assert_eq!(result.articles.len(), 5);
        assert_eq!(llm.calls(), 0);
        assert_eq!(result.layers.len(), 1);
    }

    #[tokio::test]
    async fn test_thin_feed_falls_back_to_llm_and_merges() {
        let feed = StaticSource::ok(
            "feed",
            vec![raw("Acme raises $5M seed", "https://feed.com/seed", Some(2), ArticleOrigin::Feed)],
        );
        let llm = StaticSource::ok(
            "llm",
            vec![
                raw("Acme raises $5M in seed funding", "https://other.com/x", Some(2), ArticleOrigin::Llm),
                raw("Acme opens a lab in Austin", "https://lab.com/austin", Some(3), ArticleOrigin::Llm),
                raw("Acme opens a lab in Austin", "not-a-url", Some(3), ArticleOrigin::Llm),
                raw("Old Acme news", "https://old.com/1", Some(90), ArticleOrigin::Llm),
                raw("Undated Acme news", "https://undated.com/1", None, ArticleOrigin::Llm),
            ],
        );
        let fetcher = fetcher(Some(feed.clone()), Some(llm.clone()), settings(5, false));

        let result = fetcher.fetch(&entity(), now() - Duration::days(14), now()).await.unwrap();
        assert_eq!(llm.calls(), 1);
        assert_eq!(result.articles.len(), 2);
        assert_eq!(result.articles[0].url, "https://feed.com/seed");
        assert_eq!(result.articles[0].origin, ArticleOrigin::Both);
        assert_eq!(result.duplicates.len(), 1);
        assert_eq!(result.layers[1].articles, 2);
        assert!((result.usage.cost_usd - 0.02).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_feed_error_degrades_to_llm() {
        let feed = StaticSource::failing("feed");
        let llm = StaticSource::ok(
            "llm",
            vec![raw("Acme wins award", "https://award.com/a", Some(1), ArticleOrigin::Llm)],
        );
        let fetcher = fetcher(Some(feed), Some(llm.clone()), settings(0, false));

        let result = fetcher.fetch(&entity(), now() - Duration::days(14), now()).await.unwrap();
        assert_eq!(llm.calls(), 1);
        assert_eq!(result.articles.len(), 1);
        assert!(result.layers[0].error.is_some());
    }

    #[tokio::test]
    async fn test_all_layers_failing_is_error() {
        let fetcher = fetcher(
            Some(StaticSource::failing("feed")),
            Some(StaticSource::failing("llm")),
            settings(5, false),
        );
        let err = fetcher
            .fetch(&entity(), now() - Duration::days(14), now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Upstream(_)));
    }

    #[tokio::test]
    async fn test_llm_always_runs_even_with_full_feed() {
        let feed = StaticSource::ok("feed", feed_articles(10));
        let llm = StaticSource::ok("llm", vec![]);
        let fetcher = fetcher(Some(feed), Some(llm.clone()), settings(5, true));
        fetcher.fetch(&entity(), now() - Duration::days(14), now()).await.unwrap();
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_llm_only_configuration() {
        let llm = StaticSource::ok(
            "llm",
            vec![raw("Acme hires CFO", "https://hr.com/cfo", Some(1), ArticleOrigin::Llm)],
        );
        let fetcher = fetcher(None, Some(llm.clone()), settings(5, false));
        let result = fetcher.fetch(&entity(), now() - Duration::days(14), now()).await.unwrap();
        assert_eq!(result.articles.len(), 1);
        assert_eq!(llm.calls(), 1);
    }
}

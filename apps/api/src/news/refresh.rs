//! Refresh = fetch, dedup against what is stored, persist survivors.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::news::article::TrackedEntity;
use crate::news::dedup::{dedup_batch, DuplicateRecord};
use crate::news::fetch::{LayerReport, NewsFetcher};
use crate::news::store::NewsStore;

#[derive(Debug, Serialize)]
pub struct RefreshSummary {
    pub entity_id: Uuid,
    pub entity_name: String,
    /// Unique articles returned by the fetch.
    pub fetched: usize,
    /// Articles newly persisted.
    pub stored: usize,
    pub duplicates: Vec<DuplicateRecord>,
    pub layers: Vec<LayerReport>,
    pub cost_usd: f64,
}

#[derive(Debug, Serialize)]
pub struct RefreshFailure {
    pub entity_id: Uuid,
    pub entity_name: String,
    pub error: String,
}

#[derive(Debug, Default, Serialize)]
pub struct RefreshAllSummary {
    pub refreshed: Vec<RefreshSummary>,
    pub failed: Vec<RefreshFailure>,
}

pub async fn refresh_entity(
    store: &dyn NewsStore,
    fetcher: &NewsFetcher,
    entity: &TrackedEntity,
    lookback_days: i64,
) -> Result<RefreshSummary, AppError> {
    let now = Utc::now();
    let since = now - Duration::days(lookback_days);
    let fetched = fetcher.fetch(entity, since, now).await?;
    let fetched_count = fetched.articles.len();

    // Stored stories slightly older than the window can still be the same event.
    let config = fetcher.dedup_config();
    let existing = store
        .recent_articles(entity.id, since - Duration::days(config.signature_window_days))
        .await?;
    let outcome = dedup_batch(&existing, fetched.articles, &config);

    let stored = store.insert_articles(&outcome.unique).await?;
    store.mark_refreshed(entity.id, now).await?;

    let mut duplicates = fetched.duplicates;
    duplicates.extend(outcome.duplicates);

    info!(
        "Refreshed '{}': {} fetched, {} stored, {} duplicates",
        entity.name,
        fetched_count,
        stored,
        duplicates.len()
    );
    Ok(RefreshSummary {
        entity_id: entity.id,
        entity_name: entity.name.clone(),
        fetched: fetched_count,
        stored,
        duplicates,
        layers: fetched.layers,
        cost_usd: fetched.usage.cost_usd,
    })
}

/// Refreshes every active entity in turn. One entity failing does not stop
/// the rest.
pub async fn refresh_all(
    store: &dyn NewsStore,
    fetcher: &NewsFetcher,
    lookback_days: i64,
) -> Result<RefreshAllSummary, AppError> {
    let entities = store.list_entities(true).await?;
    let mut summary = RefreshAllSummary::default();
    for entity in &entities {
        match refresh_entity(store, fetcher, entity, lookback_days).await {
            Ok(done) => summary.refreshed.push(done),
            Err(e) => {
                warn!("Refresh failed for '{}': {e}", entity.name);
                summary.failed.push(RefreshFailure {
                    entity_id: entity.id,
                    entity_name: entity.name.clone(),
                    error: e.to_string(),
                });
            }
        }
    }
    Ok(summary)
}

pub fn spawn_periodic_refresh(
    store: Arc<dyn NewsStore>,
    fetcher: Arc<NewsFetcher>,
    lookback_days: i64,
    every: StdDuration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // First tick fires immediately; skip it so startup stays quick.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match refresh_all(store.as_ref(), &fetcher, lookback_days).await {
                Ok(summary) => info!(
                    "Periodic news refresh: {} refreshed, {} failed",
                    summary.refreshed.len(),
                    summary.failed.len()
                ),
                Err(e) => error!("Periodic news refresh could not list entities: {e}"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use chrono::DateTime;

    use crate::llm_client::pricing::UsageTotals;
    use crate::news::article::{ArticleOrigin, EntityKind, RawArticle};
    use crate::news::dedup::DedupConfig;
    use crate::news::fetch::FetchSettings;
    use crate::news::sources::{NewsSource, SourceBatch};
    use crate::news::store::MemoryNewsStore;

    struct FixedFeed {
        titles: Vec<(&'static str, &'static str)>,
        fail_for: Option<&'static str>,
    }

    #[async_trait]
    impl NewsSource for FixedFeed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn search(
            &self,
            entity: &TrackedEntity,
            _since: DateTime<Utc>,
            until: DateTime<Utc>,
        ) -> Result<SourceBatch, AppError> {
            if self.fail_for == Some(entity.name.as_str()) {
                return Err(AppError::Upstream("feed down".to_string()));
            }
            Ok(SourceBatch {
                articles: self
                    .titles
                    .iter()
                    .map(|(title, url)| RawArticle {
                        title: title.to_string(),
                        url: url.to_string(),
                        publisher: Some("Wire".to_string()),
                        published_at: Some(until - Duration::hours(6)),
                        summary: None,
                        category_hint: None,
                        origin: ArticleOrigin::Feed,
                    })
                    .collect(),
                usage: UsageTotals::default(),
            })
        }
    }

    fn fetcher(feed: FixedFeed) -> NewsFetcher {
        NewsFetcher::new(
            Some(Arc::new(feed) as Arc<dyn NewsSource>),
            None,
            FetchSettings {
                min_feed_results: 0,
                llm_always: false,
                dedup: DedupConfig::default(),
            },
        )
    }

    fn company(name: &str) -> TrackedEntity {
        TrackedEntity::new(EntityKind::Company, name.to_string(), vec![], None, None)
    }

    #[tokio::test]
    async fn test_second_refresh_stores_nothing_new() {
        let store = MemoryNewsStore::new();
        let acme = company("Acme");
        store.insert_entity(&acme).await.unwrap();
        let fetcher = fetcher(FixedFeed {
            titles: vec![
                ("Acme raises $40M Series B", "https://wire.com/a"),
                ("Acme opens Denver office", "https://wire.com/b"),
            ],
            fail_for: None,
        });

        let first = refresh_entity(&store, &fetcher, &acme, 14).await.unwrap();
        assert_eq!(first.fetched, 2);
        assert_eq!(first.stored, 2);

        let second = refresh_entity(&store, &fetcher, &acme, 14).await.unwrap();
        assert_eq!(second.stored, 0);
        assert_eq!(second.duplicates.len(), 2);
        assert!(second.duplicates.iter().all(|d| d.against_stored));

        let refreshed = store.get_entity(acme.id).await.unwrap().unwrap();
        assert!(refreshed.last_refreshed_at.is_some());
    }

    #[tokio::test]
    async fn test_refresh_all_collects_failures() {
        let store = MemoryNewsStore::new();
        store.insert_entity(&company("Acme")).await.unwrap();
        store.insert_entity(&company("Broken")).await.unwrap();
        let fetcher = fetcher(FixedFeed {
            titles: vec![("Company news roundup", "https://wire.com/r")],
            fail_for: Some("Broken"),
        });

        let summary = refresh_all(&store, &fetcher, 7).await.unwrap();
        assert_eq!(summary.refreshed.len(), 1);
        assert_eq!(summary.refreshed[0].entity_name, "Acme");
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].entity_name, "Broken");
    }
}

//! Tracked entities and their articles. Same split as the research store:
//! Postgres in production, in-memory otherwise.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::news::{NewsArticleRow, TrackedEntityRow};
use crate::news::article::{NewsArticle, TrackedEntity};

#[async_trait]
pub trait NewsStore: Send + Sync {
    /// Conflict when an entity of the same kind and name (any case) exists.
    async fn insert_entity(&self, entity: &TrackedEntity) -> Result<(), AppError>;
    async fn get_entity(&self, id: Uuid) -> Result<Option<TrackedEntity>, AppError>;
    async fn list_entities(&self, active_only: bool) -> Result<Vec<TrackedEntity>, AppError>;
    /// Removes the entity and its articles. Returns false when it did not exist.
    async fn delete_entity(&self, id: Uuid) -> Result<bool, AppError>;
    async fn mark_refreshed(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), AppError>;
    /// Articles dated (or, when undated, fetched) at or after `since`, newest first.
    async fn recent_articles(
        &self,
        entity_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<NewsArticle>, AppError>;
    /// Inserts articles, skipping any whose normalized URL is already stored
    /// for the entity. Returns how many were inserted.
    async fn insert_articles(&self, articles: &[NewsArticle]) -> Result<usize, AppError>;
}

fn newest_first(articles: &mut [NewsArticle]) {
    articles.sort_by(|a, b| b.effective_date().cmp(&a.effective_date()));
}

// ────────────────────────────────────────────────────────────────────────────
// In-memory store
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct MemoryState {
    entities: HashMap<Uuid, TrackedEntity>,
    articles: HashMap<Uuid, Vec<NewsArticle>>,
}

#[derive(Clone, Default)]
pub struct MemoryNewsStore {
    inner: Arc<RwLock<MemoryState>>,
}

impl MemoryNewsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NewsStore for MemoryNewsStore {
    async fn insert_entity(&self, entity: &TrackedEntity) -> Result<(), AppError> {
        let mut state = self.inner.write().await;
        let name = entity.name.to_lowercase();
        let exists = state
            .entities
            .values()
            .any(|e| e.kind == entity.kind && e.name.to_lowercase() == name);
        if exists {
            return Err(AppError::Conflict(format!(
                "A {} named '{}' is already tracked",
                entity.kind.as_str(),
                entity.name
            )));
        }
        state.entities.insert(entity.id, entity.clone());
        Ok(())
    }

    async fn get_entity(&self, id: Uuid) -> Result<Option<TrackedEntity>, AppError> {
        Ok(self.inner.read().await.entities.get(&id).cloned())
    }

    async fn list_entities(&self, active_only: bool) -> Result<Vec<TrackedEntity>, AppError> {
        let state = self.inner.read().await;
        let mut entities: Vec<TrackedEntity> = state
            .entities
            .values()
            .filter(|e| !active_only || e.active)
            .cloned()
            .collect();
        entities.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        Ok(entities)
    }

    async fn delete_entity(&self, id: Uuid) -> Result<bool, AppError> {
        let mut state = self.inner.write().await;
        state.articles.remove(&id);
        Ok(state.entities.remove(&id).is_some())
    }

    async fn mark_refreshed(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), AppError> {
        let mut state = self.inner.write().await;
        let entity = state
            .entities
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Entity {id} not found")))?;
        entity.last_refreshed_at = Some(at);
        Ok(())
    }

    async fn recent_articles(
        &self,
        entity_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<NewsArticle>, AppError> {
        let state = self.inner.read().await;
        let mut articles: Vec<NewsArticle> = state
            .articles
            .get(&entity_id)
            .map(|list| {
                list.iter()
                    .filter(|a| a.effective_date() >= since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        newest_first(&mut articles);
        Ok(articles)
    }

    async fn insert_articles(&self, articles: &[NewsArticle]) -> Result<usize, AppError> {
        let mut state = self.inner.write().await;
        let mut inserted = 0;
        for article in articles {
            if !state.entities.contains_key(&article.entity_id) {
                return Err(AppError::NotFound(format!(
                    "Entity {} not found",
                    article.entity_id
                )));
            }
            let list = state.articles.entry(article.entity_id).or_default();
            if list
                .iter()
                .any(|a| a.normalized_url == article.normalized_url)
            {
                continue;
            }
            list.push(article.clone());
            inserted += 1;
        }
        Ok(inserted)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Postgres store
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct PgNewsStore {
    pool: PgPool,
}

impl PgNewsStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NewsStore for PgNewsStore {
    async fn insert_entity(&self, entity: &TrackedEntity) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO tracked_entities
                (id, kind, name, aliases, company, domain, active, last_refreshed_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(entity.id)
        .bind(entity.kind.as_str())
        .bind(&entity.name)
        .bind(&entity.aliases)
        .bind(&entity.company)
        .bind(&entity.domain)
        .bind(entity.active)
        .bind(entity.last_refreshed_at)
        .bind(entity.created_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(format!(
                "A {} named '{}' is already tracked",
                entity.kind.as_str(),
                entity.name
            )));
        }
        Ok(())
    }

    async fn get_entity(&self, id: Uuid) -> Result<Option<TrackedEntity>, AppError> {
        let row: Option<TrackedEntityRow> =
            sqlx::query_as("SELECT * FROM tracked_entities WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(entity_from_row).transpose()
    }

    async fn list_entities(&self, active_only: bool) -> Result<Vec<TrackedEntity>, AppError> {
        let rows: Vec<TrackedEntityRow> = sqlx::query_as(
            "SELECT * FROM tracked_entities WHERE active OR NOT $1 ORDER BY lower(name)",
        )
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(entity_from_row).collect()
    }

    async fn delete_entity(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM tracked_entities WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_refreshed(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE tracked_entities SET last_refreshed_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Entity {id} not found")));
        }
        Ok(())
    }

    async fn recent_articles(
        &self,
        entity_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<NewsArticle>, AppError> {
        let rows: Vec<NewsArticleRow> = sqlx::query_as(
            r#"
            SELECT * FROM news_articles
            WHERE entity_id = $1 AND COALESCE(published_at, fetched_at) >= $2
            ORDER BY COALESCE(published_at, fetched_at) DESC
            "#,
        )
        .bind(entity_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(article_from_row).collect()
    }

    async fn insert_articles(&self, articles: &[NewsArticle]) -> Result<usize, AppError> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for article in articles {
            let result = sqlx::query(
                r#"
                INSERT INTO news_articles
                    (id, entity_id, title, url, normalized_url, publisher, published_at,
                     summary, category, signature, fingerprint, origin, fetched_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                ON CONFLICT (entity_id, normalized_url) DO NOTHING
                "#,
            )
            .bind(article.id)
            .bind(article.entity_id)
            .bind(&article.title)
            .bind(&article.url)
            .bind(&article.normalized_url)
            .bind(&article.publisher)
            .bind(article.published_at)
            .bind(&article.summary)
            .bind(article.category.as_str())
            .bind(&article.signature)
            .bind(&article.fingerprint)
            .bind(article.origin.as_str())
            .bind(article.fetched_at)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected() as usize;
        }
        tx.commit().await?;
        Ok(inserted)
    }
}

fn corrupt(what: String) -> AppError {
    AppError::Internal(anyhow::anyhow!("Corrupt news row: {what}"))
}

fn entity_from_row(row: TrackedEntityRow) -> Result<TrackedEntity, AppError> {
    Ok(TrackedEntity {
        id: row.id,
        kind: row.kind.parse().map_err(corrupt)?,
        name: row.name,
        aliases: row.aliases,
        company: row.company,
        domain: row.domain,
        active: row.active,
        last_refreshed_at: row.last_refreshed_at,
        created_at: row.created_at,
    })
}

fn article_from_row(row: NewsArticleRow) -> Result<NewsArticle, AppError> {
    Ok(NewsArticle {
        id: row.id,
        entity_id: row.entity_id,
        title: row.title,
        url: row.url,
        normalized_url: row.normalized_url,
        publisher: row.publisher,
        published_at: row.published_at,
        summary: row.summary,
        category: row.category.parse().map_err(corrupt)?,
        signature: row.signature,
        fingerprint: row.fingerprint,
        origin: row.origin.parse().map_err(corrupt)?,
        fetched_at: row.fetched_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use crate::news::article::{ArticleOrigin, EntityKind, RawArticle};

    fn entity(name: &str) -> TrackedEntity {
        TrackedEntity::new(EntityKind::Company, name.to_string(), vec![], None, None)
    }

    fn article(entity: &TrackedEntity, url: &str, days_ago: i64) -> NewsArticle {
        let now = Utc::now();
        NewsArticle::from_raw(
            entity,
            RawArticle {
                title: format!("Story at {url}"),
                url: url.to_string(),
                publisher: None,
                published_at: Some(now - Duration::days(days_ago)),
                summary: None,
                category_hint: None,
                origin: ArticleOrigin::Feed,
            },
            now,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_entity_name_conflicts() {
        let store = MemoryNewsStore::new();
        store.insert_entity(&entity("Acme")).await.unwrap();
        let err = store.insert_entity(&entity("ACME")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let person = TrackedEntity::new(EntityKind::Person, "Acme".to_string(), vec![], None, None);
        store.insert_entity(&person).await.unwrap();
    }

    #[tokio::test]
    async fn test_insert_skips_known_urls_and_recent_filters() {
        let store = MemoryNewsStore::new();
        let acme = entity("Acme");
        store.insert_entity(&acme).await.unwrap();

        let inserted = store
            .insert_articles(&[
                article(&acme, "https://a.com/1", 1),
                article(&acme, "https://a.com/2", 30),
            ])
            .await
            .unwrap();
        assert_eq!(inserted, 2);

        let again = store
            .insert_articles(&[article(&acme, "https://www.a.com/1/", 1)])
            .await
            .unwrap();
        assert_eq!(again, 0);

        let recent = store
            .recent_articles(acme.id, Utc::now() - Duration::days(7))
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].url, "https://a.com/1");
    }

    #[tokio::test]
    async fn test_delete_removes_articles() {
        let store = MemoryNewsStore::new();
        let acme = entity("Acme");
        store.insert_entity(&acme).await.unwrap();
        store
            .insert_articles(&[article(&acme, "https://a.com/1", 1)])
            .await
            .unwrap();

        assert!(store.delete_entity(acme.id).await.unwrap());
        assert!(!store.delete_entity(acme.id).await.unwrap());
        assert!(store.get_entity(acme.id).await.unwrap().is_none());
        assert!(store
            .recent_articles(acme.id, Utc::now() - Duration::days(7))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_list_active_only() {
        let store = MemoryNewsStore::new();
        let mut dormant = entity("Beta");
        dormant.active = false;
        store.insert_entity(&entity("Acme")).await.unwrap();
        store.insert_entity(&dormant).await.unwrap();

        assert_eq!(store.list_entities(false).await.unwrap().len(), 2);
        let active = store.list_entities(true).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "Acme");
    }
}

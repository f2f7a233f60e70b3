use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct TrackedEntityRow {
    pub id: Uuid,
    pub kind: String,
    pub name: String,
    pub aliases: Vec<String>,
    pub company: Option<String>,
    pub domain: Option<String>,
    pub active: bool,
    pub last_refreshed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct NewsArticleRow {
    pub id: Uuid,
    pub entity_id: Uuid,
    pub title: String,
    pub url: String,
    pub normalized_url: String,
    pub publisher: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub summary: Option<String>,
    pub category: String,
    pub signature: Option<String>,
    pub fingerprint: String,
    pub origin: String,
    pub fetched_at: DateTime<Utc>,
}

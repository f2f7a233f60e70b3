use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::news::category::{resolve_category, NewsCategory};
use crate::news::fingerprint::{fingerprint, hex_digest};
use crate::news::normalize::normalize_url;
use crate::news::signature::extract_signature;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Company,
    Person,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Company => "company",
            EntityKind::Person => "person",
        }
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "company" => Ok(EntityKind::Company),
            "person" => Ok(EntityKind::Person),
            other => Err(format!("unknown entity kind '{other}'")),
        }
    }
}

/// A company or person whose news is followed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedEntity {
    pub id: Uuid,
    pub kind: EntityKind,
    pub name: String,
    pub aliases: Vec<String>,
    /// Employer of a tracked person, used to disambiguate searches.
    pub company: Option<String>,
    pub domain: Option<String>,
    pub active: bool,
    pub last_refreshed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TrackedEntity {
    pub fn new(
        kind: EntityKind,
        name: String,
        aliases: Vec<String>,
        company: Option<String>,
        domain: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            name,
            aliases,
            company,
            domain,
            active: true,
            last_refreshed_at: None,
            created_at: Utc::now(),
        }
    }
}

/// Which fetch layer produced an article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArticleOrigin {
    Feed,
    Llm,
    /// Reported by both layers and merged.
    Both,
}

impl ArticleOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArticleOrigin::Feed => "feed",
            ArticleOrigin::Llm => "llm",
            ArticleOrigin::Both => "both",
        }
    }

    pub fn merge(self, other: ArticleOrigin) -> ArticleOrigin {
        if self == other {
            self
        } else {
            ArticleOrigin::Both
        }
    }
}

impl fmt::Display for ArticleOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArticleOrigin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "feed" => Ok(ArticleOrigin::Feed),
            "llm" => Ok(ArticleOrigin::Llm),
            "both" => Ok(ArticleOrigin::Both),
            other => Err(format!("unknown article origin '{other}'")),
        }
    }
}

/// An article as a source reported it, before enrichment.
#[derive(Debug, Clone, PartialEq)]
pub struct RawArticle {
    pub title: String,
    pub url: String,
    pub publisher: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub summary: Option<String>,
    /// Category label suggested by the source, if any.
    pub category_hint: Option<String>,
    pub origin: ArticleOrigin,
}

/// A stored, enriched article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsArticle {
    pub id: Uuid,
    pub entity_id: Uuid,
    pub title: String,
    pub url: String,
    pub normalized_url: String,
    pub publisher: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub summary: Option<String>,
    pub category: NewsCategory,
    pub signature: Option<String>,
    pub fingerprint: String,
    pub origin: ArticleOrigin,
    pub fetched_at: DateTime<Utc>,
}

impl NewsArticle {
    /// Enriches a raw article with its dedup keys and category. Articles with
    /// a blank title or a URL that does not normalize are rejected.
    pub fn from_raw(entity: &TrackedEntity, raw: RawArticle, fetched_at: DateTime<Utc>) -> Option<Self> {
        let title = raw.title.trim().to_string();
        if title.is_empty() {
            return None;
        }
        let normalized_url = normalize_url(&raw.url)?;
        let summary = raw.summary.filter(|s| !s.trim().is_empty());

        let signature = extract_signature(&entity.name, &title, summary.as_deref());
        let fingerprint = fingerprint(&title, summary.as_deref())
            .unwrap_or_else(|| hex_digest(&normalized_url));
        let category = resolve_category(raw.category_hint.as_deref(), &title, summary.as_deref());

        Some(Self {
            id: Uuid::new_v4(),
            entity_id: entity.id,
            title,
            url: raw.url.trim().to_string(),
            normalized_url,
            publisher: raw.publisher.filter(|p| !p.trim().is_empty()),
            published_at: raw.published_at,
            summary,
            category,
            signature,
            fingerprint,
            origin: raw.origin,
            fetched_at,
        })
    }

    /// Publication date, or the fetch time when the source gave none.
    pub fn effective_date(&self) -> DateTime<Utc> {
        self.published_at.unwrap_or(self.fetched_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity() -> TrackedEntity {
        TrackedEntity::new(EntityKind::Company, "Acme".to_string(), vec![], None, None)
    }

    fn raw(title: &str, url: &str) -> RawArticle {
        RawArticle {
            title: title.to_string(),
            url: url.to_string(),
            publisher: Some(" ".to_string()),
            published_at: None,
            summary: None,
            category_hint: None,
            origin: ArticleOrigin::Feed,
        }
    }

    #[test]
    fn test_from_raw_enriches() {
        let article = NewsArticle::from_raw(
            &entity(),
            raw("Acme raises $10M seed round", "https://www.techwire.com/acme?utm_source=x"),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(article.normalized_url, "https://techwire.com/acme");
        assert_eq!(article.category, NewsCategory::Funding);
        assert_eq!(article.signature.as_deref(), Some("funding:acme:10m"));
        assert_eq!(article.publisher, None);
        assert_eq!(article.fingerprint.len(), 32);
    }

    #[test]
    fn test_from_raw_rejects_bad_input() {
        assert!(NewsArticle::from_raw(&entity(), raw("  ", "https://a.com/x"), Utc::now()).is_none());
        assert!(NewsArticle::from_raw(&entity(), raw("Acme news", "javascript:void(0)"), Utc::now()).is_none());
    }

    #[test]
    fn test_origin_merge() {
        assert_eq!(ArticleOrigin::Feed.merge(ArticleOrigin::Feed), ArticleOrigin::Feed);
        assert_eq!(ArticleOrigin::Feed.merge(ArticleOrigin::Llm), ArticleOrigin::Both);
        assert_eq!(ArticleOrigin::Both.merge(ArticleOrigin::Llm), ArticleOrigin::Both);
    }
}

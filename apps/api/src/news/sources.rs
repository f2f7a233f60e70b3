//! News sources behind the `NewsSource` seam.
//!
//! `FeedSource` is the deterministic layer: a NewsAPI-style search endpoint.
//! `LlmNewsSource` is the fallback layer: the model searches the web and
//! reports what it found as JSON.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use crate::errors::AppError;
use crate::llm_client::pricing::UsageTotals;
use crate::llm_client::prompts::{JSON_ONLY_SYSTEM, SOURCING_INSTRUCTION};
use crate::llm_client::{CallOptions, LlmClient};
use crate::news::article::{ArticleOrigin, EntityKind, RawArticle, TrackedEntity};
use crate::news::category::NewsCategory;
use crate::news::prompts::{NEWS_SEARCH_TEMPLATE, NEWS_SYSTEM};

const FEED_PAGE_SIZE: u32 = 50;
const LLM_MAX_RESULTS: u32 = 15;
const LLM_MAX_TOKENS: u32 = 6144;

/// What one source returned, and what it cost.
#[derive(Debug, Default)]
pub struct SourceBatch {
    pub articles: Vec<RawArticle>,
    pub usage: UsageTotals,
}

#[async_trait]
pub trait NewsSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn search(
        &self,
        entity: &TrackedEntity,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<SourceBatch, AppError>;
}

/// Accepts RFC 3339 timestamps and bare `YYYY-MM-DD` dates.
pub fn parse_published(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| Utc.from_utc_datetime(&dt))
}

/// Search expression for the feed: the quoted name (or any alias) for a
/// company, the quoted name plus employer for a person.
pub fn search_terms(entity: &TrackedEntity) -> String {
    let quoted = |s: &str| format!("\"{}\"", s.trim().replace('"', ""));
    match entity.kind {
        EntityKind::Company => std::iter::once(entity.name.as_str())
            .chain(entity.aliases.iter().map(String::as_str))
            .filter(|s| !s.trim().is_empty())
            .map(quoted)
            .collect::<Vec<_>>()
            .join(" OR "),
        EntityKind::Person => match entity.company.as_deref().filter(|c| !c.trim().is_empty()) {
            Some(company) => format!("{} AND {}", quoted(entity.name.as_str()), quoted(company)),
            None => quoted(entity.name.as_str()),
        },
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Layer 1: feed
// ────────────────────────────────────────────────────────────────────────────

pub struct FeedSource {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl FeedSource {
    pub fn new(base_url: String, api_key: Option<String>) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }
}

#[derive(Debug, Deserialize)]
struct FeedResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    articles: Vec<FeedArticle>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeedArticle {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    published_at: Option<String>,
    #[serde(default)]
    source: Option<FeedPublisher>,
}

#[derive(Debug, Deserialize)]
struct FeedPublisher {
    #[serde(default)]
    name: Option<String>,
}

/// Parses a feed response body. Provider-reported errors and placeholder
/// entries for removed articles are handled here.
pub fn parse_feed_response(body: &str) -> Result<Vec<RawArticle>, AppError> {
    let response: FeedResponse = serde_json::from_str(body)
        .map_err(|e| AppError::Upstream(format!("Feed returned invalid JSON: {e}")))?;

    if response.status.as_deref() == Some("error") {
        return Err(AppError::Upstream(format!(
            "Feed reported an error: {}",
            response.message.unwrap_or_default()
        )));
    }

    Ok(response
        .articles
        .into_iter()
        .filter_map(|a| {
            let title = a.title.filter(|t| !t.trim().is_empty() && t.as_str() != "[Removed]")?;
            let url = a.url.filter(|u| !u.trim().is_empty())?;
            Some(RawArticle {
                title,
                url,
                publisher: a.source.and_then(|s| s.name),
                published_at: a.published_at.as_deref().and_then(parse_published),
                summary: a.description,
                category_hint: None,
                origin: ArticleOrigin::Feed,
            })
        })
        .collect())
}

#[async_trait]
impl NewsSource for FeedSource {
    fn name(&self) -> &'static str {
        "feed"
    }

    async fn search(
        &self,
        entity: &TrackedEntity,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<SourceBatch, AppError> {
        let query = search_terms(entity);
        let params = [
            ("q", query.clone()),
            ("from", since.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
            ("to", until.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
            ("sortBy", "publishedAt".to_string()),
            ("language", "en".to_string()),
            ("pageSize", FEED_PAGE_SIZE.to_string()),
        ];

        let mut request = self.client.get(&self.base_url).query(&params);
        if let Some(key) = &self.api_key {
            request = request.header("X-Api-Key", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Feed request failed: {e}")))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::Upstream(format!("Feed response unreadable: {e}")))?;
        if !status.is_success() {
            return Err(AppError::Upstream(format!(
                "Feed returned {}: {}",
                status.as_u16(),
                body.chars().take(200).collect::<String>()
            )));
        }

        let articles = parse_feed_response(&body)?;
        debug!("Feed returned {} articles for {query}", articles.len());
        Ok(SourceBatch {
            articles,
            usage: UsageTotals::default(),
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Layer 2: LLM web search
// ────────────────────────────────────────────────────────────────────────────

pub struct LlmNewsSource {
    llm: LlmClient,
}

impl LlmNewsSource {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

#[derive(Debug, Deserialize)]
struct LlmArticleList {
    #[serde(default)]
    articles: Vec<LlmArticle>,
}

#[derive(Debug, Deserialize)]
struct LlmArticle {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    publisher: Option<String>,
    #[serde(default)]
    published_date: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    category: Option<String>,
}

fn subject_block(entity: &TrackedEntity) -> String {
    let mut lines = vec![
        format!("Name: {}", entity.name),
        format!("Type: {}", entity.kind.as_str()),
    ];
    if !entity.aliases.is_empty() {
        lines.push(format!("Also known as: {}", entity.aliases.join(", ")));
    }
    if let Some(company) = &entity.company {
        lines.push(format!("Works at: {company}"));
    }
    if let Some(domain) = &entity.domain {
        lines.push(format!("Website: {domain}"));
    }
    lines.join("\n")
}

pub fn build_news_prompt(
    entity: &TrackedEntity,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
) -> String {
    let categories = NewsCategory::PRIORITY
        .iter()
        .map(|c| format!("\"{}\"", c.as_str()))
        .collect::<Vec<_>>()
        .join(" | ");

    NEWS_SEARCH_TEMPLATE
        .replace("{subject_block}", &subject_block(entity))
        .replace("{since}", &since.format("%Y-%m-%d").to_string())
        .replace("{until}", &until.format("%Y-%m-%d").to_string())
        .replace("{max_results}", &LLM_MAX_RESULTS.to_string())
        .replace("{categories}", &categories)
        .replace("{sourcing_instruction}", SOURCING_INSTRUCTION)
        .replace("{json_only}", JSON_ONLY_SYSTEM)
}

fn into_raw(list: LlmArticleList) -> Vec<RawArticle> {
    list.articles
        .into_iter()
        .filter_map(|a| {
            Some(RawArticle {
                title: a.title.filter(|t| !t.trim().is_empty())?,
                url: a.url.filter(|u| !u.trim().is_empty())?,
                publisher: a.publisher,
                published_at: a.published_date.as_deref().and_then(parse_published),
                summary: a.summary,
                category_hint: a.category,
                origin: ArticleOrigin::Llm,
            })
        })
        .collect()
}

#[async_trait]
impl NewsSource for LlmNewsSource {
    fn name(&self) -> &'static str {
        "llm"
    }

    async fn search(
        &self,
        entity: &TrackedEntity,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<SourceBatch, AppError> {
        let prompt = build_news_prompt(entity, since, until);
        let options = CallOptions {
            max_tokens: LLM_MAX_TOKENS,
            web_search: true,
        };

        let (list, usage): (LlmArticleList, UsageTotals) = self
            .llm
            .call_json(&prompt, NEWS_SYSTEM, options)
            .await
            .map_err(|e| AppError::Llm(format!("News search for '{}' failed: {e}", entity.name)))?;

        let articles = into_raw(list);
        info!(
            entity = %entity.name,
            articles = articles.len(),
            cost_usd = usage.cost_usd,
            "LLM news search complete"
        );
        Ok(SourceBatch { articles, usage })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    use crate::llm_client::parse_json_text;

    fn company() -> TrackedEntity {
        TrackedEntity::new(
            EntityKind::Company,
            "Acme Robotics".to_string(),
            vec!["Acme".to_string()],
            None,
            Some("acme.ai".to_string()),
        )
    }

    #[test]
    fn test_parse_feed_response() {
        let body = r#"{
            "status": "ok",
            "totalResults": 3,
            "articles": [
                {"source": {"id": null, "name": "TechWire"}, "title": "Acme raises $10M",
                 "url": "https://techwire.com/acme", "description": "Seed round.",
                 "publishedAt": "2024-05-30T08:15:00Z"},
                {"source": {"name": "X"}, "title": "[Removed]", "url": "https://removed.com"},
                {"title": "No url here"}
            ]
        }"#;
        let articles = parse_feed_response(body).unwrap();
        assert_eq!(articles.len(), 1);
        let a = &articles[0];
        assert_eq!(a.publisher.as_deref(), Some("TechWire"));
        assert_eq!(a.origin, ArticleOrigin::Feed);
        assert_eq!(
            a.published_at,
            Some(Utc.with_ymd_and_hms(2024, 5, 30, 8, 15, 0).unwrap())
        );
    }

    #[test]
    fn test_parse_feed_error_status() {
        let body = r#"{"status": "error", "code": "apiKeyInvalid", "message": "Your API key is invalid"}"#;
        let err = parse_feed_response(body).unwrap_err();
        assert!(matches!(err, AppError::Upstream(msg) if msg.contains("invalid")));
    }

    #[test]
    fn test_parse_published_formats() {
        assert_eq!(parse_published("2024-05-01").unwrap().day(), 1);
        assert!(parse_published("2024-05-01T10:00:00+02:00").is_some());
        assert!(parse_published("last Tuesday").is_none());
    }

    #[test]
    fn test_search_terms() {
        assert_eq!(search_terms(&company()), r#""Acme Robotics" OR "Acme""#);

        let person = TrackedEntity::new(
            EntityKind::Person,
            "Jane Doe".to_string(),
            vec![],
            Some("Acme Robotics".to_string()),
            None,
        );
        assert_eq!(search_terms(&person), r#""Jane Doe" AND "Acme Robotics""#);
    }

    #[test]
    fn test_llm_article_list_mapping() {
        let text = r#"```json
        {"articles": [
            {"title": "Acme opens plant", "url": "https://news.com/a", "publisher": "News",
             "published_date": "2024-05-20", "summary": "A plant.", "category": "product"},
            {"title": "Missing url"}
        ]}
        ```"#;
        let list: LlmArticleList = parse_json_text(text).unwrap();
        let articles = into_raw(list);
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].origin, ArticleOrigin::Llm);
        assert_eq!(articles[0].category_hint.as_deref(), Some("product"));
    }

    #[test]
    fn test_news_prompt_is_filled() {
        let since = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let until = Utc.with_ymd_and_hms(2024, 5, 15, 0, 0, 0).unwrap();
        let prompt = build_news_prompt(&company(), since, until);
        assert!(prompt.contains("2024-05-01"));
        assert!(prompt.contains("Also known as: Acme"));
        assert!(prompt.contains("\"mergers_acquisitions\""));
        assert!(!prompt.contains("{subject_block}"));
        assert!(!prompt.contains("{max_results}"));
    }
}

//! Per-entity digest: recent articles grouped by category in priority order.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::news::article::{ArticleOrigin, NewsArticle, TrackedEntity};
use crate::news::category::NewsCategory;

const NAME_IN_TITLE: f64 = 1.0;
const NAME_IN_SUMMARY: f64 = 0.6;
const ALIAS_MENTION: f64 = 0.5;
const NO_MENTION: f64 = 0.2;

#[derive(Debug, Serialize)]
pub struct DigestItem {
    pub title: String,
    pub url: String,
    pub publisher: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub summary: Option<String>,
    pub origin: ArticleOrigin,
    pub relevance: f64,
}

#[derive(Debug, Serialize)]
pub struct DigestCategory {
    pub category: NewsCategory,
    /// Articles in the window for this category, before the cap.
    pub total: usize,
    pub articles: Vec<DigestItem>,
}

#[derive(Debug, Serialize)]
pub struct Digest {
    pub entity_id: Uuid,
    pub entity_name: String,
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
    pub total_articles: usize,
    pub categories: Vec<DigestCategory>,
}

/// How directly an article is about the entity.
pub fn relevance(entity: &TrackedEntity, article: &NewsArticle) -> f64 {
    let name = entity.name.to_lowercase();
    let title = article.title.to_lowercase();
    let summary = article
        .summary
        .as_deref()
        .map(str::to_lowercase)
        .unwrap_or_default();

    if title.contains(&name) {
        return NAME_IN_TITLE;
    }
    if summary.contains(&name) {
        return NAME_IN_SUMMARY;
    }
    let alias_hit = entity
        .aliases
        .iter()
        .map(|a| a.trim().to_lowercase())
        .filter(|a| !a.is_empty())
        .any(|a| title.contains(&a) || summary.contains(&a));
    if alias_hit {
        ALIAS_MENTION
    } else {
        NO_MENTION
    }
}

/// Builds the digest for articles dated in `[since, now]`. Undated articles
/// count from when they were fetched. Each category lists its newest
/// articles first, at most `per_category` of them.
pub fn build_digest(
    entity: &TrackedEntity,
    articles: &[NewsArticle],
    since: DateTime<Utc>,
    now: DateTime<Utc>,
    per_category: usize,
) -> Digest {
    let mut buckets: HashMap<NewsCategory, Vec<&NewsArticle>> = HashMap::new();
    let mut total_articles = 0;
    for article in articles {
        let date = article.effective_date();
        if date < since || date > now {
            continue;
        }
        total_articles += 1;
        buckets.entry(article.category).or_default().push(article);
    }

    let categories = NewsCategory::PRIORITY
        .iter()
        .filter_map(|category| {
            let mut items = buckets.remove(category)?;
            items.sort_by(|a, b| {
                b.effective_date()
                    .cmp(&a.effective_date())
                    .then_with(|| relevance(entity, b).total_cmp(&relevance(entity, a)))
            });
            let total = items.len();
            Some(DigestCategory {
                category: *category,
                total,
                articles: items
                    .into_iter()
                    .take(per_category)
                    .map(|a| DigestItem {
                        title: a.title.clone(),
                        url: a.url.clone(),
                        publisher: a.publisher.clone(),
                        published_at: a.published_at,
                        summary: a.summary.clone(),
                        origin: a.origin,
                        relevance: relevance(entity, a),
                    })
                    .collect(),
            })
        })
        .collect();

    Digest {
        entity_id: entity.id,
        entity_name: entity.name.clone(),
        since,
        until: now,
        total_articles,
        categories,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    use crate::news::article::{EntityKind, RawArticle};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn entity() -> TrackedEntity {
        TrackedEntity::new(
            EntityKind::Company,
            "Acme Robotics".to_string(),
            vec!["ACR".to_string()],
            None,
            None,
        )
    }

    fn article(title: &str, summary: Option<&str>, days_ago: i64) -> NewsArticle {
        let e = entity();
        NewsArticle::from_raw(
            &e,
            RawArticle {
                title: title.to_string(),
                url: format!("https://news.com/{}", title.replace(' ', "-")),
                publisher: None,
                published_at: Some(now() - Duration::days(days_ago)),
                summary: summary.map(String::from),
                category_hint: None,
                origin: ArticleOrigin::Feed,
            },
            now(),
        )
        .unwrap()
    }

    #[test]
    fn test_relevance_levels() {
        let e = entity();
        assert_eq!(relevance(&e, &article("Acme Robotics opens plant", None, 1)), 1.0);
        assert_eq!(
            relevance(&e, &article("Plant opens", Some("Acme Robotics said"), 1)),
            0.6
        );
        assert_eq!(relevance(&e, &article("ACR stock climbs", None, 1)), 0.5);
        assert_eq!(relevance(&e, &article("Robots are everywhere", None, 1)), 0.2);
    }

    #[test]
    fn test_categories_in_priority_order_newest_first() {
        let articles = vec![
            article("Acme Robotics unveils arm", None, 3),
            article("Acme Robotics raises $20M", None, 5),
            article("Acme Robotics launches app", None, 1),
            article("Acme Robotics acquires Gripco", None, 2),
        ];
        let digest = build_digest(&entity(), &articles, now() - Duration::days(14), now(), 10);

        let order: Vec<NewsCategory> = digest.categories.iter().map(|c| c.category).collect();
        assert_eq!(
            order,
            vec![
                NewsCategory::Funding,
                NewsCategory::MergersAcquisitions,
                NewsCategory::Product
            ]
        );
        let product = &digest.categories[2];
        assert_eq!(product.articles[0].title, "Acme Robotics launches app");
        assert_eq!(product.articles[1].title, "Acme Robotics unveils arm");
        assert_eq!(digest.total_articles, 4);
    }

    #[test]
    fn test_window_and_cap() {
        let articles = vec![
            article("Acme Robotics unveils arm", None, 1),
            article("Acme Robotics launches app", None, 2),
            article("Acme Robotics debuts gripper", None, 3),
            article("Acme Robotics introduces old thing", None, 40),
        ];
        let digest = build_digest(&entity(), &articles, now() - Duration::days(14), now(), 2);
        assert_eq!(digest.total_articles, 3);
        assert_eq!(digest.categories.len(), 1);
        assert_eq!(digest.categories[0].total, 3);
        assert_eq!(digest.categories[0].articles.len(), 2);
    }

    #[test]
    fn test_empty_digest() {
        let digest = build_digest(&entity(), &[], now() - Duration::days(7), now(), 5);
        assert!(digest.categories.is_empty());
        assert_eq!(digest.total_articles, 0);
    }
}

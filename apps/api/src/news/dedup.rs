//! Layered deduplication.
//!
//! Each incoming article is checked against stored articles first, then
//! against the survivors of its own batch. Layers run in order and the first
//! hit wins:
//!   1. same normalized URL
//!   2. same event signature with publish dates inside the window; a
//!      signature without an amount also needs some title overlap
//!   3. same content fingerprint
//!   4. title token Jaccard at or above the threshold
//!
//! A duplicate of a stored article is dropped. A duplicate inside the batch is
//! merged into the earlier survivor so no information is lost.

use std::collections::HashSet;

use serde::Serialize;

use crate::news::article::NewsArticle;
use crate::news::category::NewsCategory;
use crate::news::fingerprint::{jaccard, token_set};
use crate::news::signature::{has_amount, within_window};

#[derive(Debug, Clone, Copy)]
pub struct DedupConfig {
    pub jaccard_threshold: f64,
    pub signature_window_days: i64,
    /// Title Jaccard an amount-less signature match must reach.
    pub event_title_jaccard: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            jaccard_threshold: 0.6,
            signature_window_days: 3,
            event_title_jaccard: 0.3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateReason {
    SameUrl,
    SameEvent,
    SameFingerprint,
    SimilarTitle,
}

#[derive(Debug, Clone, Serialize)]
pub struct DuplicateRecord {
    pub title: String,
    pub url: String,
    /// URL of the article this one duplicates.
    pub duplicate_of: String,
    pub reason: DuplicateReason,
    /// Title similarity, for `similar_title` hits.
    pub similarity: Option<f64>,
    /// True when the match was an already-stored article.
    pub against_stored: bool,
}

#[derive(Debug, Default)]
pub struct DedupOutcome {
    pub unique: Vec<NewsArticle>,
    pub duplicates: Vec<DuplicateRecord>,
}

struct Indexed {
    article: NewsArticle,
    title_tokens: HashSet<String>,
}

impl Indexed {
    fn new(article: NewsArticle) -> Self {
        let title_tokens = token_set(&article.title);
        Self {
            article,
            title_tokens,
        }
    }
}

/// Runs the layers in order over `pool` and returns the first hit.
fn find_match(
    candidate: &Indexed,
    pool: &[Indexed],
    config: &DedupConfig,
) -> Option<(usize, DuplicateReason, Option<f64>)> {
    let c = &candidate.article;

    if let Some(i) = pool
        .iter()
        .position(|p| p.article.normalized_url == c.normalized_url)
    {
        return Some((i, DuplicateReason::SameUrl, None));
    }

    if let Some(signature) = &c.signature {
        let weak = !has_amount(signature);
        if let Some(i) = pool.iter().position(|p| {
            p.article.signature.as_ref() == Some(signature)
                && within_window(
                    p.article.published_at,
                    c.published_at,
                    config.signature_window_days,
                )
                && (!weak
                    || jaccard(&p.title_tokens, &candidate.title_tokens)
                        >= config.event_title_jaccard)
        }) {
            return Some((i, DuplicateReason::SameEvent, None));
        }
    }

    if let Some(i) = pool
        .iter()
        .position(|p| p.article.fingerprint == c.fingerprint)
    {
        return Some((i, DuplicateReason::SameFingerprint, None));
    }

    pool.iter()
        .enumerate()
        .map(|(i, p)| (i, jaccard(&p.title_tokens, &candidate.title_tokens)))
        .filter(|(_, score)| *score >= config.jaccard_threshold)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(i, score)| (i, DuplicateReason::SimilarTitle, Some(score)))
}

/// Folds a duplicate's extra information into the surviving article.
fn merge_into(survivor: &mut NewsArticle, duplicate: &NewsArticle) {
    survivor.origin = survivor.origin.merge(duplicate.origin);
    if survivor.summary.is_none() {
        survivor.summary = duplicate.summary.clone();
    }
    if survivor.published_at.is_none() {
        survivor.published_at = duplicate.published_at;
    }
    if survivor.publisher.is_none() {
        survivor.publisher = duplicate.publisher.clone();
    }
    if survivor.signature.is_none() {
        survivor.signature = duplicate.signature.clone();
    }
    if survivor.category == NewsCategory::General {
        survivor.category = duplicate.category;
    }
}

fn record(
    duplicate: &NewsArticle,
    of: &NewsArticle,
    reason: DuplicateReason,
    similarity: Option<f64>,
    against_stored: bool,
) -> DuplicateRecord {
    DuplicateRecord {
        title: duplicate.title.clone(),
        url: duplicate.url.clone(),
        duplicate_of: of.url.clone(),
        reason,
        similarity,
        against_stored,
    }
}

/// Deduplicates `incoming` against `existing` and against itself. Incoming
/// order matters: earlier articles survive, so callers put the more reliable
/// layer first.
pub fn dedup_batch(
    existing: &[NewsArticle],
    incoming: Vec<NewsArticle>,
    config: &DedupConfig,
) -> DedupOutcome {
    let stored: Vec<Indexed> = existing.iter().cloned().map(Indexed::new).collect();
    let mut survivors: Vec<Indexed> = Vec::new();
    let mut duplicates = Vec::new();

    for article in incoming {
        let candidate = Indexed::new(article);

        if let Some((i, reason, similarity)) = find_match(&candidate, &stored, config) {
            duplicates.push(record(
                &candidate.article,
                &stored[i].article,
                reason,
                similarity,
                true,
            ));
            continue;
        }

        if let Some((i, reason, similarity)) = find_match(&candidate, &survivors, config) {
            duplicates.push(record(
                &candidate.article,
                &survivors[i].article,
                reason,
                similarity,
                false,
            ));
            merge_into(&mut survivors[i].article, &candidate.article);
            continue;
        }

        survivors.push(candidate);
    }

    DedupOutcome {
        unique: survivors.into_iter().map(|s| s.article).collect(),
        duplicates,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    use crate::news::article::{ArticleOrigin, EntityKind, RawArticle, TrackedEntity};

    fn entity() -> TrackedEntity {
        TrackedEntity::new(EntityKind::Company, "Acme".to_string(), vec![], None, None)
    }

    fn article(
        title: &str,
        url: &str,
        summary: Option<&str>,
        days_ago: Option<i64>,
        origin: ArticleOrigin,
    ) -> NewsArticle {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        NewsArticle::from_raw(
            &entity(),
            RawArticle {
                title: title.to_string(),
                url: url.to_string(),
                publisher: None,
                published_at: days_ago.map(|d| now - Duration::days(d)),
                summary: summary.map(String::from),
                category_hint: None,
                origin,
            },
            now,
        )
        .unwrap()
    }

    #[test]
    fn test_same_url_against_stored_is_dropped() {
        let stored = vec![article(
            "Acme opens Berlin office",
            "https://news.com/acme-berlin",
            None,
            Some(2),
            ArticleOrigin::Feed,
        )];
        let incoming = vec![article(
            "Acme expands to Germany",
            "https://www.news.com/acme-berlin/?utm_campaign=x",
            None,
            Some(2),
            ArticleOrigin::Llm,
        )];
        let outcome = dedup_batch(&stored, incoming, &DedupConfig::default());
        assert!(outcome.unique.is_empty());
        assert_eq!(outcome.duplicates.len(), 1);
        assert_eq!(outcome.duplicates[0].reason, DuplicateReason::SameUrl);
        assert!(outcome.duplicates[0].against_stored);
    }

    #[test]
    fn test_same_event_within_window_merges_in_batch() {
        let incoming = vec![
            article(
                "Acme raises $50M Series B",
                "https://a.com/1",
                None,
                Some(1),
                ArticleOrigin::Feed,
            ),
            article(
                "Investors pour $50 million into Acme funding round",
                "https://b.com/2",
                Some("Led by Sequoia."),
                Some(2),
                ArticleOrigin::Llm,
            ),
        ];
        let outcome = dedup_batch(&[], incoming, &DedupConfig::default());
        assert_eq!(outcome.unique.len(), 1);
        assert_eq!(outcome.duplicates[0].reason, DuplicateReason::SameEvent);
        assert!(!outcome.duplicates[0].against_stored);

        let survivor = &outcome.unique[0];
        assert_eq!(survivor.url, "https://a.com/1");
        assert_eq!(survivor.origin, ArticleOrigin::Both);
        assert_eq!(survivor.summary.as_deref(), Some("Led by Sequoia."));
    }

    #[test]
    fn test_same_event_outside_window_is_kept() {
        let incoming = vec![
            article("Acme raises $5M", "https://a.com/1", None, Some(1), ArticleOrigin::Feed),
            article(
                "Acme raises another $5M from insiders",
                "https://b.com/2",
                None,
                Some(30),
                ArticleOrigin::Feed,
            ),
        ];
        let outcome = dedup_batch(&[], incoming, &DedupConfig::default());
        assert_eq!(outcome.unique.len(), 2);
    }

    #[test]
    fn test_amountless_events_need_title_overlap() {
        let incoming = vec![
            article("Acme appoints Jane Doe as new CFO", "https://a.com/1", None, Some(1), ArticleOrigin::Feed),
            article(
                "Acme CEO John Roe steps down after board dispute",
                "https://b.com/2",
                None,
                Some(1),
                ArticleOrigin::Feed,
            ),
            article("Acme launches robot vacuum", "https://c.com/3", None, Some(1), ArticleOrigin::Feed),
            article(
                "Acme unveils enterprise cloud platform",
                "https://d.com/4",
                None,
                Some(1),
                ArticleOrigin::Feed,
            ),
        ];
        assert_eq!(incoming[0].signature, incoming[1].signature);
        assert_eq!(incoming[2].signature, incoming[3].signature);

        let outcome = dedup_batch(&[], incoming, &DedupConfig::default());
        assert_eq!(outcome.unique.len(), 4);
        assert!(outcome.duplicates.is_empty());
    }

    #[test]
    fn test_amountless_event_with_overlapping_titles_merges() {
        let incoming = vec![
            article("Acme appoints Jane Doe as new CFO", "https://a.com/1", None, Some(1), ArticleOrigin::Feed),
            article(
                "Acme names Jane Doe chief financial officer",
                "https://b.com/2",
                None,
                Some(2),
                ArticleOrigin::Llm,
            ),
        ];
        let outcome = dedup_batch(&[], incoming, &DedupConfig::default());
        assert_eq!(outcome.unique.len(), 1);
        // {acme, jane, doe} of 9 tokens: under the title threshold, over the event bar
        assert_eq!(outcome.duplicates[0].reason, DuplicateReason::SameEvent);
    }

    #[test]
    fn test_same_fingerprint() {
        let incoming = vec![
            article(
                "Acme quietly updates its logo",
                "https://a.com/logo",
                Some("The design team shipped it"),
                None,
                ArticleOrigin::Feed,
            ),
            article(
                "Its logo: Acme quietly updates",
                "https://syndicated.com/x",
                Some("The design team shipped it"),
                None,
                ArticleOrigin::Feed,
            ),
        ];
        let outcome = dedup_batch(&[], incoming, &DedupConfig::default());
        assert_eq!(outcome.unique.len(), 1);
        assert_eq!(outcome.duplicates[0].reason, DuplicateReason::SameFingerprint);
    }

    #[test]
    fn test_similar_title() {
        let incoming = vec![
            article(
                "Acme warehouse robots reach Europe market",
                "https://a.com/robots",
                None,
                None,
                ArticleOrigin::Feed,
            ),
            article(
                "Acme warehouse robots reach European market",
                "https://b.com/robots",
                None,
                None,
                ArticleOrigin::Feed,
            ),
        ];
        let outcome = dedup_batch(&[], incoming, &DedupConfig::default());
        assert_eq!(outcome.unique.len(), 1);
        let dup = &outcome.duplicates[0];
        assert_eq!(dup.reason, DuplicateReason::SimilarTitle);
        // {acme, warehouse, robots, reach, market} + europe / european
        assert!((dup.similarity.unwrap() - 5.0 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_distinct_articles_survive() {
        let incoming = vec![
            article("Acme hires new head of sales", "https://a.com/1", None, None, ArticleOrigin::Feed),
            article("Acme sponsors city marathon", "https://b.com/2", None, None, ArticleOrigin::Feed),
        ];
        let outcome = dedup_batch(&[], incoming, &DedupConfig::default());
        assert_eq!(outcome.unique.len(), 2);
        assert!(outcome.duplicates.is_empty());
    }
}

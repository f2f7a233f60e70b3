use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::news::signature::{detect_event, EventType};

/// Digest buckets. Declaration order is the digest's display priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NewsCategory {
    Funding,
    MergersAcquisitions,
    Earnings,
    Leadership,
    Product,
    Partnership,
    Legal,
    Layoffs,
    General,
}

impl NewsCategory {
    pub const PRIORITY: [NewsCategory; 9] = [
        NewsCategory::Funding,
        NewsCategory::MergersAcquisitions,
        NewsCategory::Earnings,
        NewsCategory::Leadership,
        NewsCategory::Product,
        NewsCategory::Partnership,
        NewsCategory::Legal,
        NewsCategory::Layoffs,
        NewsCategory::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NewsCategory::Funding => "funding",
            NewsCategory::MergersAcquisitions => "mergers_acquisitions",
            NewsCategory::Earnings => "earnings",
            NewsCategory::Leadership => "leadership",
            NewsCategory::Product => "product",
            NewsCategory::Partnership => "partnership",
            NewsCategory::Legal => "legal",
            NewsCategory::Layoffs => "layoffs",
            NewsCategory::General => "general",
        }
    }

    pub fn from_event(event: EventType) -> Self {
        match event {
            EventType::Acquisition => NewsCategory::MergersAcquisitions,
            EventType::Funding => NewsCategory::Funding,
            EventType::Earnings => NewsCategory::Earnings,
            EventType::Leadership => NewsCategory::Leadership,
            EventType::Layoffs => NewsCategory::Layoffs,
            EventType::Partnership => NewsCategory::Partnership,
            EventType::ProductLaunch => NewsCategory::Product,
            EventType::Legal => NewsCategory::Legal,
        }
    }

    /// Accepts the labels models tend to produce ("M&A", "Product Launch",
    /// "funding round") as well as the canonical ids.
    pub fn parse_lenient(raw: &str) -> Option<Self> {
        let key: String = raw
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '&' { c } else { '_' })
            .collect();
        let key = key.trim_matches('_');

        let category = match key {
            "funding" | "funding_round" | "fundraising" | "investment" | "financing" => {
                NewsCategory::Funding
            }
            "mergers_acquisitions" | "m&a" | "m_a" | "merger" | "mergers" | "acquisition"
            | "acquisitions" => NewsCategory::MergersAcquisitions,
            "earnings" | "financial_results" | "results" | "financials" => NewsCategory::Earnings,
            "leadership" | "executive" | "executives" | "people" | "management" => {
                NewsCategory::Leadership
            }
            "product" | "product_launch" | "products" | "launch" => NewsCategory::Product,
            "partnership" | "partnerships" | "alliance" => NewsCategory::Partnership,
            "legal" | "regulatory" | "litigation" | "legal_regulatory" => NewsCategory::Legal,
            "layoffs" | "layoff" | "restructuring" | "job_cuts" => NewsCategory::Layoffs,
            "general" | "other" | "news" => NewsCategory::General,
            _ => return None,
        };
        Some(category)
    }
}

impl fmt::Display for NewsCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NewsCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NewsCategory::PRIORITY
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown news category '{s}'"))
    }
}

/// Keyword classification: the title decides first, the summary breaks ties
/// for headlines with no recognizable event.
pub fn classify(title: &str, summary: Option<&str>) -> NewsCategory {
    detect_event(title)
        .or_else(|| summary.and_then(detect_event))
        .map(NewsCategory::from_event)
        .unwrap_or(NewsCategory::General)
}

/// Uses a provider-supplied label when it is recognizable and specific,
/// otherwise the keyword classifier.
pub fn resolve_category(hint: Option<&str>, title: &str, summary: Option<&str>) -> NewsCategory {
    match hint.and_then(NewsCategory::parse_lenient) {
        Some(category) if category != NewsCategory::General => category,
        _ => classify(title, summary),
    }
}

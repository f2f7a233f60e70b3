//! Event signatures: a compact key for "the same real-world event" that stays
//! stable across outlets that word their headlines differently.
//!
//! Format: `{event}:{subject-slug}[:{amount}]`, e.g. `funding:acme-robotics:50m`.
//! Amounts are rescaled to the largest of `k`, `m` or `b`, so `$1,500 million`
//! and `$1.5 billion` both read `1.5b`.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Acquisition,
    Funding,
    Earnings,
    Leadership,
    Layoffs,
    Partnership,
    ProductLaunch,
    Legal,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Acquisition => "acquisition",
            EventType::Funding => "funding",
            EventType::Earnings => "earnings",
            EventType::Leadership => "leadership",
            EventType::Layoffs => "layoffs",
            EventType::Partnership => "partnership",
            EventType::ProductLaunch => "product_launch",
            EventType::Legal => "legal",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Checked in order; the first match wins. Deal and money words come before
// the generic verbs of product and partnership news.
static EVENT_PATTERNS: Lazy<Vec<(EventType, Regex)>> = Lazy::new(|| {
    vec![
        (
            EventType::Acquisition,
            Regex::new(
                r"(?i)\b(acquires?|acquired|acquisition|to acquire|buys|bought|buyout|takeover|merger|merges?|merged)\b",
            )
            .expect("valid regex"),
        ),
        (
            EventType::Layoffs,
            Regex::new(
                r"(?i)\b(layoffs?|lays off|laid off|job cuts|cuts? \d[\d,]* (jobs|roles|staff|employees)|workforce reduction|redundanc(y|ies))\b",
            )
            .expect("valid regex"),
        ),
        (
            EventType::Funding,
            Regex::new(
                r"(?i)\b(raises?|raised|funding|series [a-h]|seed round|pre-seed|funding round|investment round|venture round|valuation)\b",
            )
            .expect("valid regex"),
        ),
        (
            EventType::Earnings,
            Regex::new(
                r"(?i)\b(earnings|quarterly results|annual results|q[1-4] (results|revenue|profit)|revenue (rose|fell|grew|jumped|dropped)|net (income|loss)|profit warning|guidance|beats estimates|misses estimates)\b",
            )
            .expect("valid regex"),
        ),
        (
            EventType::Legal,
            Regex::new(
                r"(?i)\b(lawsuit|sues|sued|settles?|settlement|antitrust|fined|fines|penalty|indicted|investigation|probe|class action|court rules?)\b",
            )
            .expect("valid regex"),
        ),
        (
            EventType::Leadership,
            Regex::new(
                r"(?i)\b(ceo|cfo|cto|coo|chief [a-z]+ officer|appoints?|appointed|names new|steps down|stepping down|resigns?|resigned|succeeds|successor|board chair)\b",
            )
            .expect("valid regex"),
        ),
        (
            EventType::Partnership,
            Regex::new(
                r"(?i)\b(partners? with|partnership|teams up|collaborat(e|es|ion)|alliance|joint venture|signs deal with)\b",
            )
            .expect("valid regex"),
        ),
        (
            EventType::ProductLaunch,
            Regex::new(
                r"(?i)\b(launch(es|ed)?|unveils?|unveiled|introduces?|introduced|rolls out|debuts?|now available|announces new)\b",
            )
            .expect("valid regex"),
        ),
    ]
});

static AMOUNT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:\$|usd\s?|€|eur\s?|£|gbp\s?)\s?(\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+(?:[.,]\d+)?)\s*(billion|bn|b|million|mn|mln|m|thousand|k)?\b",
    )
    .expect("valid regex")
});

// `1,500` and `2,000,000.5`: every comma is followed by exactly three digits.
static GROUPED_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,3}(?:,\d{3})+(?:\.\d+)?$").expect("valid regex"));

/// Detects the event type of a headline (or any text) by keyword.
pub fn detect_event(text: &str) -> Option<EventType> {
    EVENT_PATTERNS
        .iter()
        .find(|(_, pattern)| pattern.is_match(text))
        .map(|(event, _)| *event)
}

/// Extracts the first money amount as a compact token: `$2.5 billion` → `2.5b`,
/// `$2,000,000` → `2m`. A comma is a thousands separator when followed by
/// three digits and a decimal mark otherwise (`€1,5 million` → `1.5m`).
pub fn extract_amount(text: &str) -> Option<String> {
    let captures = AMOUNT_PATTERN.captures(text)?;
    let raw = captures.get(1)?.as_str();
    let number: f64 = if GROUPED_NUMBER.is_match(raw) {
        raw.replace(',', "")
    } else {
        raw.replace(',', ".")
    }
    .parse()
    .ok()?;

    let scale = match captures.get(2).map(|m| m.as_str().to_ascii_lowercase()) {
        Some(u) if u.starts_with('b') => 1e9,
        Some(u) if u.starts_with('m') => 1e6,
        Some(u) if u == "k" || u == "thousand" => 1e3,
        _ => 1.0,
    };
    Some(compact_amount(number * scale))
}

fn compact_amount(value: f64) -> String {
    let (scaled, unit) = if value >= 1e9 {
        (value / 1e9, "b")
    } else if value >= 1e6 {
        (value / 1e6, "m")
    } else if value >= 1e3 {
        (value / 1e3, "k")
    } else {
        (value, "")
    };
    format!("{}{unit}", trim_decimal(&format!("{scaled:.3}")))
}

fn trim_decimal(number: &str) -> String {
    if number.contains('.') {
        number
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    } else {
        number.to_string()
    }
}

/// Lowercase ASCII slug: alphanumeric runs joined by `-`.
pub fn slugify(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Builds the signature of an article about `subject`. The event type comes
/// from the title; the amount from the title, then the summary. Articles with
/// no recognizable event have no signature.
pub fn extract_signature(subject: &str, title: &str, summary: Option<&str>) -> Option<String> {
    let event = detect_event(title)?;
    let subject = slugify(subject);
    if subject.is_empty() {
        return None;
    }

    let amount = match event {
        EventType::Acquisition | EventType::Funding | EventType::Earnings | EventType::Legal => {
            extract_amount(title).or_else(|| summary.and_then(extract_amount))
        }
        _ => None,
    };

    Some(match amount {
        Some(amount) => format!("{event}:{subject}:{amount}"),
        None => format!("{event}:{subject}"),
    })
}

/// Whether a signature carries an amount. Amount-less signatures name only
/// the event type and subject, so they are a weaker match.
pub fn has_amount(signature: &str) -> bool {
    signature.split(':').count() > 2
}

/// Dates within `window_days` of each other, or either date unknown.
pub fn within_window(
    a: Option<DateTime<Utc>>,
    b: Option<DateTime<Utc>>,
    window_days: i64,
) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => (a - b).abs() <= Duration::days(window_days),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_detects_event_types() {
        assert_eq!(
            detect_event("Acme to acquire Beta Corp for $2B"),
            Some(EventType::Acquisition)
        );
        assert_eq!(
            detect_event("Acme raises $50M Series B led by Sequoia"),
            Some(EventType::Funding)
        );
        assert_eq!(
            detect_event("Acme lays off 200 staff amid slowdown"),
            Some(EventType::Layoffs)
        );
        assert_eq!(
            detect_event("Acme Q3 results beat estimates"),
            Some(EventType::Earnings)
        );
        assert_eq!(
            detect_event("Acme names Jane Doe as new CEO"),
            Some(EventType::Leadership)
        );
        assert_eq!(
            detect_event("Acme partners with Globex on logistics AI"),
            Some(EventType::Partnership)
        );
        assert_eq!(
            detect_event("Acme unveils its next-gen robot arm"),
            Some(EventType::ProductLaunch)
        );
        assert_eq!(
            detect_event("Regulators open antitrust probe into Acme"),
            Some(EventType::Legal)
        );
        assert_eq!(detect_event("Acme's office gets a new coat of paint"), None);
    }

    #[test]
    fn test_amount_normalization() {
        assert_eq!(extract_amount("a $2.5 billion deal").as_deref(), Some("2.5b"));
        assert_eq!(extract_amount("raises $50M").as_deref(), Some("50m"));
        assert_eq!(extract_amount("raises $50 million").as_deref(), Some("50m"));
        assert_eq!(extract_amount("for €1.50bn").as_deref(), Some("1.5b"));
        assert_eq!(extract_amount("paid $300").as_deref(), Some("300"));
        assert_eq!(extract_amount("no money here"), None);
    }

    #[test]
    fn test_amount_thousands_separators() {
        assert_eq!(extract_amount("$1,500 million").as_deref(), Some("1.5b"));
        assert_eq!(extract_amount("$1.5 million").as_deref(), Some("1.5m"));
        assert_eq!(extract_amount("$2,000,000").as_deref(), Some("2m"));
        assert_eq!(extract_amount("$2,000,000"), extract_amount("$2 million"));
        assert_eq!(extract_amount("$12,500").as_deref(), Some("12.5k"));
        assert_eq!(extract_amount("€1,5 million").as_deref(), Some("1.5m"));
        assert_eq!(extract_amount("$0.5 billion").as_deref(), Some("500m"));
    }

    #[test]
    fn test_signature_is_stable_across_wording() {
        let a = extract_signature("Acme Robotics", "Acme Robotics raises $50M Series B", None);
        let b = extract_signature(
            "Acme Robotics",
            "Robot maker Acme secures funding round",
            Some("The company raised $50 million from investors."),
        );
        assert_eq!(a.as_deref(), Some("funding:acme-robotics:50m"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_signature_without_amount_for_leadership() {
        assert_eq!(
            extract_signature("Acme", "Acme CFO steps down after $1B writedown", None).as_deref(),
            Some("leadership:acme")
        );
        assert!(!has_amount("leadership:acme"));
        assert!(has_amount("funding:acme-robotics:50m"));
    }

    #[test]
    fn test_untyped_article_has_no_signature() {
        assert_eq!(extract_signature("Acme", "A day in the life at Acme", None), None);
    }

    #[test]
    fn test_window() {
        let d1 = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let d2 = Utc.with_ymd_and_hms(2024, 5, 3, 18, 0, 0).unwrap();
        let d3 = Utc.with_ymd_and_hms(2024, 5, 10, 9, 0, 0).unwrap();
        assert!(within_window(Some(d1), Some(d2), 3));
        assert!(!within_window(Some(d1), Some(d3), 3));
        assert!(within_window(None, Some(d3), 3));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("  Acme Robotics, Inc. "), "acme-robotics-inc");
        assert_eq!(slugify("!!!"), "");
    }
}

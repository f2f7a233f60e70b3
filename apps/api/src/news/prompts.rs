// Prompt constants for the LLM news layer.

pub const NEWS_SYSTEM: &str = "You are a news research assistant for a business development team. \
    You search the web for recent, verifiable news about a specific company or person \
    and report only articles you actually found.";

/// Replace `{subject_block}`, `{since}`, `{until}`, `{max_results}`,
/// `{categories}`, `{sourcing_instruction}` and `{json_only}` before sending.
pub const NEWS_SEARCH_TEMPLATE: &str = r#"Find news articles about the subject below published between {since} and {until} (inclusive).

SUBJECT
{subject_block}

Rules:
- Only include articles that are clearly about this subject, not a different entity with a similar name.
- Every article must have the real URL of the article page you found. Do not construct or guess URLs.
- Prefer original reporting and press releases over aggregator pages.
- Report each real-world event once, using the most authoritative source.
- Return at most {max_results} articles, newest first.

{sourcing_instruction}

Return a JSON object with this EXACT schema:
{
  "articles": [
    {
      "title": "Headline as published",
      "url": "https://...",
      "publisher": "Outlet name",
      "published_date": "YYYY-MM-DD",
      "summary": "1-2 sentence factual summary",
      "category": one of {categories}
    }
  ]
}
If nothing relevant was published in the period, return {"articles": []}.

{json_only}"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_placeholders() {
        for placeholder in [
            "{subject_block}",
            "{since}",
            "{until}",
            "{max_results}",
            "{categories}",
            "{sourcing_instruction}",
            "{json_only}",
        ] {
            assert!(NEWS_SEARCH_TEMPLATE.contains(placeholder), "{placeholder}");
        }
    }
}

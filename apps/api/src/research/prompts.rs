// All LLM prompt constants for the research orchestrator.
// Reuses cross-cutting fragments from llm_client::prompts.

use crate::research::sections::SectionId;

/// System prompt shared by every research section.
pub const RESEARCH_SYSTEM: &str = "You are a senior business development research analyst \
    preparing a company intelligence brief for an account team. \
    You are precise, cite your sources, and never speculate beyond the evidence.";

/// Section prompt template. Replace every `{placeholder}` before sending.
pub const SECTION_PROMPT_TEMPLATE: &str = r#"Prepare the "{section_title}" section of a company intelligence report.

COMPANY
{company_block}

PRIOR RESEARCH (outputs of earlier sections, JSON keyed by section id; may be empty)
{context_json}

SECTION INSTRUCTIONS
{section_instructions}

{sourcing_instruction}

{confidence_instruction}

Return a JSON object with this EXACT top-level schema (no extra top-level fields):
{
  "content": <object following the section instructions>,
  "sources": [{"title": "Source title", "url": "https://..."}],
  "confidence": {"level": "high" | "medium" | "low", "rationale": "one sentence"}
}

{json_only}"#;

/// Per-section instructions, including the shape of `content`.
pub fn section_instructions(section: SectionId) -> &'static str {
    match section {
        SectionId::Foundation => FOUNDATION_INSTRUCTIONS,
        SectionId::CompanyOverview => COMPANY_OVERVIEW_INSTRUCTIONS,
        SectionId::FinancialSnapshot => FINANCIAL_SNAPSHOT_INSTRUCTIONS,
        SectionId::SegmentAnalysis => SEGMENT_ANALYSIS_INSTRUCTIONS,
        SectionId::MarketTrends => MARKET_TRENDS_INSTRUCTIONS,
        SectionId::PeerBenchmarking => PEER_BENCHMARKING_INSTRUCTIONS,
        SectionId::KeyExecutives => KEY_EXECUTIVES_INSTRUCTIONS,
        SectionId::RecentNews => RECENT_NEWS_INSTRUCTIONS,
        SectionId::ConversationStarters => CONVERSATION_STARTERS_INSTRUCTIONS,
        SectionId::ExecSummary => EXEC_SUMMARY_INSTRUCTIONS,
        SectionId::Appendix => APPENDIX_INSTRUCTIONS,
    }
}

const FOUNDATION_INSTRUCTIONS: &str = r#"Establish the canonical facts every later section will rely on.
Disambiguate the company first: if several companies share the name, use the domain,
ticker and geography to pick the right one and say which in "disambiguation".
"content" schema:
{
  "legal_name": "...", "also_known_as": ["..."], "website": "...",
  "headquarters": "City, Country", "founded": 1999,
  "ownership": "public" | "private" | "pe_backed" | "subsidiary" | "government" | "unknown",
  "ticker": "EXCH:SYM" | null, "parent_company": "..." | null,
  "employee_count": {"value": 12000, "as_of": "2024"} | null,
  "industry": "...", "primary_markets": ["..."],
  "fiscal_year_end": "December" | null,
  "disambiguation": "..."
}"#;

const COMPANY_OVERVIEW_INSTRUCTIONS: &str = r#"Describe what the company does and how it makes money.
"content" schema:
{
  "description": "2-3 sentence plain-language description",
  "business_model": "...",
  "products_and_services": [{"name": "...", "description": "..."}],
  "customers": "who buys and why",
  "geographic_footprint": ["..."],
  "history_highlights": [{"year": 2015, "event": "..."}],
  "strategic_priorities": ["..."]
}"#;

const FINANCIAL_SNAPSHOT_INSTRUCTIONS: &str = r#"Summarize the latest reported financials. Prefer audited or filed figures;
state the period and currency of every figure. For private companies use credible
estimates and label them as estimates.
"content" schema:
{
  "currency": "USD", "latest_period": "FY2024",
  "revenue": {"value": 1.2e9, "period": "FY2024", "estimate": false} | null,
  "revenue_growth_pct": 8.5 | null,
  "gross_margin_pct": null, "operating_margin_pct": null, "net_income": null,
  "ebitda": null, "free_cash_flow": null, "total_debt": null, "cash": null,
  "market_cap": null,
  "trend_commentary": "...",
  "key_metrics": [{"name": "...", "value": "...", "period": "..."}]
}"#;

const SEGMENT_ANALYSIS_INSTRUCTIONS: &str = r#"Break the business down by reported segment (or by product line / region when
segments are not reported). Use the financial snapshot for totals.
"content" schema:
{
  "segmentation_basis": "reported_segments" | "product_lines" | "regions",
  "segments": [{
    "name": "...", "revenue_share_pct": 40.0 | null, "growth_trend": "growing" | "flat" | "declining" | "unknown",
    "highlights": ["..."], "challenges": ["..."]
  }]
}"#;

const MARKET_TRENDS_INSTRUCTIONS: &str = r#"Identify the industry and macro trends most relevant to this company.
"content" schema:
{
  "trends": [{"trend": "...", "impact": "tailwind" | "headwind" | "mixed", "explanation": "..."}],
  "regulatory_watch": ["..."],
  "technology_shifts": ["..."]
}"#;

const PEER_BENCHMARKING_INSTRUCTIONS: &str = r#"Compare the company with its 3-5 closest competitors on the metrics available in the
financial snapshot. Use the same period and currency where possible and flag mismatches.
"content" schema:
{
  "peers": [{"name": "...", "why_comparable": "...", "revenue": null, "revenue_growth_pct": null,
             "operating_margin_pct": null, "employee_count": null}],
  "positioning": "where the company leads and lags",
  "comparability_notes": ["..."]
}"#;

const KEY_EXECUTIVES_INSTRUCTIONS: &str = r#"List the current leadership team and board. Only include people confirmed in a role
within the last 12 months.
"content" schema:
{
  "executives": [{"name": "...", "title": "...", "since": "2021" | null, "background": "...", "linkedin_url": null}],
  "board_members": [{"name": "...", "role": "Chair" | "Independent Director" | "...", "affiliation": "..."}],
  "recent_changes": [{"date": "2024-05", "change": "..."}]
}"#;

const RECENT_NEWS_INSTRUCTIONS: &str = r#"Collect material news from the last twelve months: deals, funding, earnings,
leadership changes, launches, partnerships, legal and regulatory events, layoffs.
Merge duplicate coverage of the same event into one item.
"content" schema:
{
  "items": [{"date": "YYYY-MM-DD", "headline": "...", "category": "funding" | "mergers_acquisitions" | "earnings" |
             "leadership" | "product" | "partnership" | "legal" | "layoffs" | "general",
             "summary": "...", "why_it_matters": "...", "url": "https://..."}]
}"#;

const CONVERSATION_STARTERS_INSTRUCTIONS: &str = r#"Write openers and discovery questions an account executive could use in a first
meeting, grounded in the prior research (overview, news and trends when present).
"content" schema:
{
  "openers": [{"line": "...", "grounded_in": "section id and fact"}],
  "discovery_questions": ["..."],
  "topics_to_avoid": ["..."]
}"#;

const EXEC_SUMMARY_INSTRUCTIONS: &str = r#"Synthesize the prior research into a one-page executive summary. Do NOT introduce
facts that are absent from the prior research.
"content" schema:
{
  "headline": "one sentence",
  "key_points": ["5-7 bullets"],
  "opportunities": ["..."],
  "risks": ["..."],
  "recommended_next_steps": ["..."]
}"#;

const APPENDIX_INSTRUCTIONS: &str = r#"Document methodology and data caveats for the report, based on the prior research.
Do not repeat the sources list; it is compiled separately.
"content" schema:
{
  "methodology": "...",
  "data_gaps": ["facts that could not be established"],
  "conflicting_information": [{"topic": "...", "details": "..."}],
  "as_of": "YYYY-MM-DD"
}"#;

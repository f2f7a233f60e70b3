//! Section catalog: the report sections and the dependency DAG between them.
//!
//! Hard dependencies must be part of any job that includes the section and must
//! complete before it can run. Soft dependencies only order execution and feed
//! extra context when the job happens to include them.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A report section. Declaration order is the canonical report order and is a
/// topological order of the dependency graph.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SectionId {
    Foundation,
    CompanyOverview,
    FinancialSnapshot,
    SegmentAnalysis,
    MarketTrends,
    PeerBenchmarking,
    KeyExecutives,
    RecentNews,
    ConversationStarters,
    ExecSummary,
    Appendix,
}

/// Sections whose output is report body content (everything except the
/// summary and the appendix).
const CONTENT_SECTIONS: &[SectionId] = &[
    SectionId::CompanyOverview,
    SectionId::FinancialSnapshot,
    SectionId::SegmentAnalysis,
    SectionId::MarketTrends,
    SectionId::PeerBenchmarking,
    SectionId::KeyExecutives,
    SectionId::RecentNews,
    SectionId::ConversationStarters,
];

const APPENDIX_INPUTS: &[SectionId] = &[
    SectionId::CompanyOverview,
    SectionId::FinancialSnapshot,
    SectionId::SegmentAnalysis,
    SectionId::MarketTrends,
    SectionId::PeerBenchmarking,
    SectionId::KeyExecutives,
    SectionId::RecentNews,
    SectionId::ConversationStarters,
    SectionId::ExecSummary,
];

impl SectionId {
    pub const ALL: [SectionId; 11] = [
        SectionId::Foundation,
        SectionId::CompanyOverview,
        SectionId::FinancialSnapshot,
        SectionId::SegmentAnalysis,
        SectionId::MarketTrends,
        SectionId::PeerBenchmarking,
        SectionId::KeyExecutives,
        SectionId::RecentNews,
        SectionId::ConversationStarters,
        SectionId::ExecSummary,
        SectionId::Appendix,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SectionId::Foundation => "foundation",
            SectionId::CompanyOverview => "company_overview",
            SectionId::FinancialSnapshot => "financial_snapshot",
            SectionId::SegmentAnalysis => "segment_analysis",
            SectionId::MarketTrends => "market_trends",
            SectionId::PeerBenchmarking => "peer_benchmarking",
            SectionId::KeyExecutives => "key_executives",
            SectionId::RecentNews => "recent_news",
            SectionId::ConversationStarters => "conversation_starters",
            SectionId::ExecSummary => "exec_summary",
            SectionId::Appendix => "appendix",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            SectionId::Foundation => "Research Foundation",
            SectionId::CompanyOverview => "Company Overview",
            SectionId::FinancialSnapshot => "Financial Snapshot",
            SectionId::SegmentAnalysis => "Segment Analysis",
            SectionId::MarketTrends => "Market Trends",
            SectionId::PeerBenchmarking => "Peer Benchmarking",
            SectionId::KeyExecutives => "Key Executives & Board",
            SectionId::RecentNews => "Recent News",
            SectionId::ConversationStarters => "Conversation Starters",
            SectionId::ExecSummary => "Executive Summary",
            SectionId::Appendix => "Appendix & Sources",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            SectionId::Foundation => {
                "Canonical facts about the company (legal name, HQ, ownership, size) used by every other section"
            }
            SectionId::CompanyOverview => "Business model, products, customers and history",
            SectionId::FinancialSnapshot => "Revenue, growth, profitability and key financial metrics",
            SectionId::SegmentAnalysis => "Performance and strategy by business segment",
            SectionId::MarketTrends => "Industry trends, tailwinds and headwinds affecting the company",
            SectionId::PeerBenchmarking => "Comparison against the closest competitors",
            SectionId::KeyExecutives => "Leadership team and board members",
            SectionId::RecentNews => "Material news from the last twelve months",
            SectionId::ConversationStarters => "Openers and questions for a business development meeting",
            SectionId::ExecSummary => "One-page synthesis of the whole report",
            SectionId::Appendix => "Consolidated sources and methodology notes",
        }
    }

    /// Sections that must be part of the job and complete first.
    pub fn hard_dependencies(&self) -> &'static [SectionId] {
        match self {
            SectionId::Foundation => &[],
            SectionId::CompanyOverview
            | SectionId::FinancialSnapshot
            | SectionId::MarketTrends
            | SectionId::KeyExecutives
            | SectionId::RecentNews
            | SectionId::Appendix => &[SectionId::Foundation],
            SectionId::SegmentAnalysis | SectionId::PeerBenchmarking => {
                &[SectionId::Foundation, SectionId::FinancialSnapshot]
            }
            SectionId::ConversationStarters => &[SectionId::CompanyOverview],
            SectionId::ExecSummary => &[SectionId::FinancialSnapshot, SectionId::CompanyOverview],
        }
    }

    /// Sections that run first and feed context only when the job includes them.
    pub fn soft_dependencies(&self) -> &'static [SectionId] {
        match self {
            SectionId::ConversationStarters => &[SectionId::RecentNews, SectionId::MarketTrends],
            SectionId::ExecSummary => CONTENT_SECTIONS,
            SectionId::Appendix => APPENDIX_INPUTS,
            _ => &[],
        }
    }

    /// Hard and soft dependencies that are present in `job_sections`.
    pub fn upstream_within(&self, job_sections: &[SectionId]) -> Vec<SectionId> {
        let mut upstream: Vec<SectionId> = self
            .hard_dependencies()
            .iter()
            .chain(self.soft_dependencies())
            .copied()
            .filter(|s| s != self && job_sections.contains(s))
            .collect();
        upstream.sort();
        upstream.dedup();
        upstream
    }
}

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SectionId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SectionId::ALL
            .iter()
            .copied()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| format!("unknown section '{s}'"))
    }
}

/// Closes a section selection over hard dependencies and returns it in
/// canonical order. An empty selection means the full report.
pub fn expand_selection(requested: &[SectionId]) -> Vec<SectionId> {
    if requested.is_empty() {
        return SectionId::ALL.to_vec();
    }

    let mut selected: BTreeSet<SectionId> = BTreeSet::new();
    let mut stack: Vec<SectionId> = requested.to_vec();
    while let Some(section) = stack.pop() {
        if selected.insert(section) {
            stack.extend(section.hard_dependencies().iter().copied());
        }
    }
    selected.into_iter().collect()
}

/// Every section in `job_sections` that transitively depends on `section`
/// through hard or soft edges. Does not include `section` itself.
pub fn dependents_within(section: SectionId, job_sections: &[SectionId]) -> Vec<SectionId> {
    let mut affected: BTreeSet<SectionId> = BTreeSet::new();
    let mut frontier = vec![section];

    while let Some(current) = frontier.pop() {
        for candidate in job_sections {
            if affected.contains(candidate) || *candidate == section {
                continue;
            }
            if candidate.upstream_within(job_sections).contains(&current) {
                affected.insert(*candidate);
                frontier.push(*candidate);
            }
        }
    }
    affected.into_iter().collect()
}

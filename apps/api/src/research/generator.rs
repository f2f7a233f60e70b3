//! Section generation: turns one section request into validated LLM output.
//!
//! `SectionGenerator` is the seam the orchestrator runs against. The default
//! backend is `LlmSectionGenerator`; tests plug in scripted generators.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::errors::AppError;
use crate::llm_client::pricing::UsageTotals;
use crate::llm_client::prompts::{CONFIDENCE_INSTRUCTION, JSON_ONLY_SYSTEM, SOURCING_INSTRUCTION};
use crate::llm_client::{parse_json_text, CallOptions, LlmClient, LlmError};
use crate::research::job::{JobSubject, Source};
use crate::research::prompts::{section_instructions, RESEARCH_SYSTEM, SECTION_PROMPT_TEMPLATE};
use crate::research::sections::SectionId;
use crate::research::status::ConfidenceLevel;

const DEFAULT_MAX_TOKENS: u32 = 4096;
const WEB_SEARCH_MAX_TOKENS: u32 = 8192;

// ────────────────────────────────────────────────────────────────────────────
// Data models
// ────────────────────────────────────────────────────────────────────────────

/// Everything a generator needs to produce one section.
#[derive(Debug, Clone)]
pub struct SectionRequest {
    pub subject: JobSubject,
    pub section: SectionId,
    /// Content of completed upstream sections, keyed by section.
    pub context: BTreeMap<SectionId, Value>,
}

/// Validated section output.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionOutput {
    pub content: Value,
    pub sources: Vec<Source>,
    pub confidence: Option<ConfidenceLevel>,
    pub confidence_rationale: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GeneratedSection {
    pub output: SectionOutput,
    pub usage: UsageTotals,
    pub attempts: u32,
}

/// A failed generation still reports what it spent.
#[derive(Debug, Clone)]
pub struct SectionFailure {
    pub message: String,
    pub usage: UsageTotals,
    pub attempts: u32,
}

#[async_trait]
pub trait SectionGenerator: Send + Sync {
    async fn generate(&self, request: &SectionRequest) -> Result<GeneratedSection, SectionFailure>;
}

/// Sections that need fresh public facts rather than synthesis of prior output.
pub fn uses_web_search(section: SectionId) -> bool {
    matches!(
        section,
        SectionId::Foundation
            | SectionId::FinancialSnapshot
            | SectionId::PeerBenchmarking
            | SectionId::KeyExecutives
            | SectionId::RecentNews
    )
}

// ────────────────────────────────────────────────────────────────────────────
// LlmSectionGenerator
// ────────────────────────────────────────────────────────────────────────────

pub struct LlmSectionGenerator {
    llm: LlmClient,
    max_attempts: u32,
}

impl LlmSectionGenerator {
    pub fn new(llm: LlmClient, max_attempts: u32) -> Self {
        Self {
            llm,
            max_attempts: max_attempts.max(1),
        }
    }
}

#[async_trait]
impl SectionGenerator for LlmSectionGenerator {
    async fn generate(&self, request: &SectionRequest) -> Result<GeneratedSection, SectionFailure> {
        let mut usage = UsageTotals::default();

        let prompt = build_section_prompt(request).map_err(|e| SectionFailure {
            message: e.to_string(),
            usage,
            attempts: 0,
        })?;

        let options = CallOptions {
            max_tokens: if uses_web_search(request.section) {
                WEB_SEARCH_MAX_TOKENS
            } else {
                DEFAULT_MAX_TOKENS
            },
            web_search: uses_web_search(request.section),
        };

        let mut last_error = String::new();
        for attempt in 1..=self.max_attempts {
            let response = match self.llm.call(&prompt, RESEARCH_SYSTEM, options).await {
                Ok(r) => r,
                Err(e) => {
                    // Transport-level retries already happened inside the client.
                    return Err(SectionFailure {
                        message: format!("LLM call failed: {e}"),
                        usage,
                        attempts: attempt,
                    });
                }
            };
            usage.add(response.usage_totals());

            let parsed = response
                .text()
                .ok_or(LlmError::EmptyContent)
                .and_then(|text| parse_section_output(&text));

            match parsed {
                Ok(output) => {
                    info!(
                        section = %request.section,
                        attempt,
                        cost_usd = usage.cost_usd,
                        "Section generated"
                    );
                    return Ok(GeneratedSection {
                        output,
                        usage,
                        attempts: attempt,
                    });
                }
                Err(e) => {
                    warn!(
                        "Section {} attempt {}/{} returned unusable output: {}",
                        request.section, attempt, self.max_attempts, e
                    );
                    last_error = e.to_string();
                }
            }
        }

        Err(SectionFailure {
            message: format!(
                "Malformed output after {} attempts: {}",
                self.max_attempts, last_error
            ),
            usage,
            attempts: self.max_attempts,
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Prompt building and output parsing
// ────────────────────────────────────────────────────────────────────────────

/// Fills the section template with the subject and upstream context.
pub fn build_section_prompt(request: &SectionRequest) -> Result<String, AppError> {
    let context: BTreeMap<&str, &Value> = request
        .context
        .iter()
        .map(|(section, value)| (section.as_str(), value))
        .collect();
    let context_json = serde_json::to_string_pretty(&context)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to serialize context: {e}")))?;

    Ok(SECTION_PROMPT_TEMPLATE
        .replace("{section_title}", request.section.title())
        .replace("{company_block}", &company_block(&request.subject))
        .replace("{section_instructions}", section_instructions(request.section))
        .replace("{sourcing_instruction}", SOURCING_INSTRUCTION)
        .replace("{confidence_instruction}", CONFIDENCE_INSTRUCTION)
        .replace("{json_only}", JSON_ONLY_SYSTEM)
        .replace("{context_json}", &context_json))
}

fn company_block(subject: &JobSubject) -> String {
    let mut lines = vec![format!("Name: {}", subject.company_name)];
    let optional = [
        ("Website domain", &subject.company_domain),
        ("Ticker", &subject.ticker),
        ("Geography", &subject.geography),
        ("Industry", &subject.industry),
        ("Analyst notes", &subject.notes),
    ];
    for (label, value) in optional {
        if let Some(value) = value.as_deref().filter(|v| !v.trim().is_empty()) {
            lines.push(format!("{label}: {}", value.trim()));
        }
    }
    lines.join("\n")
}

#[derive(Debug, Deserialize)]
struct RawSectionOutput {
    content: Value,
    #[serde(default)]
    sources: Vec<RawSource>,
    #[serde(default)]
    confidence: Option<RawConfidence>,
}

#[derive(Debug, Deserialize)]
struct RawSource {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawConfidence {
    Detailed {
        level: String,
        #[serde(default)]
        rationale: Option<String>,
    },
    Bare(String),
}

/// Parses and validates the model's section JSON. `content` must be a non-empty
/// object; sources without an http(s) URL are dropped and duplicates removed.
pub fn parse_section_output(text: &str) -> Result<SectionOutput, LlmError> {
    let raw: RawSectionOutput = parse_json_text(text)?;

    let content_ok = raw.content.as_object().map(|o| !o.is_empty()).unwrap_or(false);
    if !content_ok {
        return Err(LlmError::EmptyContent);
    }

    let mut seen = HashSet::new();
    let sources = raw
        .sources
        .into_iter()
        .filter_map(|s| {
            let url = s.url?.trim().to_string();
            let valid = url.starts_with("https://") || url.starts_with("http://");
            (valid && seen.insert(url.clone())).then(|| Source {
                title: s.title.filter(|t| !t.trim().is_empty()),
                url,
            })
        })
        .collect();

    let (confidence, confidence_rationale) = match raw.confidence {
        Some(RawConfidence::Detailed { level, rationale }) => {
            (ConfidenceLevel::parse_lenient(&level), rationale)
        }
        Some(RawConfidence::Bare(level)) => (ConfidenceLevel::parse_lenient(&level), None),
        None => (None, None),
    };

    Ok(SectionOutput {
        content: raw.content,
        sources,
        confidence,
        confidence_rationale,
    })
}

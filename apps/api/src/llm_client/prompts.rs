// Shared prompt constants and prompt-building utilities.
// Each module that needs LLM calls defines its own prompts.rs alongside it.
// This file contains cross-cutting prompt fragments.

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON value. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Common instruction appended to every research and news prompt.
pub const SOURCING_INSTRUCTION: &str = "\
    CRITICAL: Every factual claim must come from a source you can cite with a URL, \
    or from the prior research context provided to you. Do NOT invent figures, \
    names, dates or quotes. If a fact cannot be established, say so explicitly \
    (use null or \"not disclosed\") rather than guessing.";

/// Instruction for rating how well-supported an answer is.
pub const CONFIDENCE_INSTRUCTION: &str = "\
    Rate your confidence in the section as a whole: \
    - high: multiple independent, recent, authoritative sources agree \
    - medium: sources are limited, partially dated, or only partly consistent \
    - low: little public information, mostly inference, or conflicting sources";

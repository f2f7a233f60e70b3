//! Token pricing for `MODEL`, in USD.

use serde::{Deserialize, Serialize};

use super::Usage;

const INPUT_PER_MTOK: f64 = 3.0;
const OUTPUT_PER_MTOK: f64 = 15.0;
const CACHE_WRITE_PER_MTOK: f64 = 3.75;
const CACHE_READ_PER_MTOK: f64 = 0.30;
const WEB_SEARCH_PER_THOUSAND: f64 = 10.0;

/// Token counts and spend of one or more LLM calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageTotals {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub web_searches: u32,
    pub cost_usd: f64,
}

impl UsageTotals {
    pub fn from_usage(usage: &Usage) -> Self {
        let cache_write = usage.cache_creation_input_tokens.unwrap_or(0) as f64;
        let cache_read = usage.cache_read_input_tokens.unwrap_or(0) as f64;
        let web_searches = usage
            .server_tool_use
            .as_ref()
            .map(|s| s.web_search_requests)
            .unwrap_or(0);

        let cost_usd = usage.input_tokens as f64 * INPUT_PER_MTOK / 1_000_000.0
            + usage.output_tokens as f64 * OUTPUT_PER_MTOK / 1_000_000.0
            + cache_write * CACHE_WRITE_PER_MTOK / 1_000_000.0
            + cache_read * CACHE_READ_PER_MTOK / 1_000_000.0
            + web_searches as f64 * WEB_SEARCH_PER_THOUSAND / 1_000.0;

        Self {
            input_tokens: usage.input_tokens as u64,
            output_tokens: usage.output_tokens as u64,
            web_searches,
            cost_usd,
        }
    }

    pub fn add(&mut self, other: UsageTotals) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.web_searches += other.web_searches;
        self.cost_usd += other.cost_usd;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::ServerToolUsage;

    #[test]
    fn test_plain_token_cost() {
        let usage = Usage {
            input_tokens: 1_000_000,
            output_tokens: 100_000,
            ..Default::default()
        };
        let totals = UsageTotals::from_usage(&usage);
        // 3.00 + 1.50
        assert!((totals.cost_usd - 4.5).abs() < 1e-9, "cost was {}", totals.cost_usd);
    }

    #[test]
    fn test_web_search_cost() {
        let usage = Usage {
            server_tool_use: Some(ServerToolUsage {
                web_search_requests: 3,
            }),
            ..Default::default()
        };
        let totals = UsageTotals::from_usage(&usage);
        assert_eq!(totals.web_searches, 3);
        assert!((totals.cost_usd - 0.03).abs() < 1e-9);
    }

    #[test]
    fn test_add_accumulates() {
        let mut total = UsageTotals::default();
        total.add(UsageTotals {
            input_tokens: 10,
            output_tokens: 5,
            web_searches: 1,
            cost_usd: 0.5,
        });
        total.add(UsageTotals {
            input_tokens: 1,
            output_tokens: 1,
            web_searches: 0,
            cost_usd: 0.25,
        });
        assert_eq!(total.input_tokens, 11);
        assert_eq!(total.output_tokens, 6);
        assert_eq!(total.web_searches, 1);
        assert!((total.cost_usd - 0.75).abs() < 1e-9);
    }
}

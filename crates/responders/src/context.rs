//! Renders retrieved knowledge into the context block responders receive.

use consilium_common::ScoredRecord;
use consilium_common::validation::truncate_chars;
use tracing::debug;

pub const CONTEXT_HEADING: &str = "## Relevant Context from Knowledge Base";

/// Longest canonical text rendered per record, in characters.
pub const RECORD_TEXT_LIMIT: usize = 1000;

#[derive(Debug, Clone, Copy)]
pub struct ContextBuilder {
    max_records: usize,
    max_tokens: usize,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self {
            max_records: 3,
            max_tokens: 2048,
        }
    }
}

impl ContextBuilder {
    pub fn new(max_records: usize, max_tokens: usize) -> Self {
        Self {
            max_records,
            max_tokens,
        }
    }

    /// Plain-text block built from the best records, or an empty string.
    pub fn build(&self, records: &[ScoredRecord]) -> String {
        let mut parts = Vec::new();
        let mut token_count = estimate_tokens(CONTEXT_HEADING);

        for record in records.iter().take(self.max_records) {
            let part = format_record(record);
            let tokens = estimate_tokens(&part);
            if token_count + tokens > self.max_tokens {
                break;
            }
            token_count += tokens;
            parts.push(part);
        }

        if parts.is_empty() {
            return String::new();
        }

        debug!(
            records = parts.len(),
            estimated_tokens = token_count,
            "Built knowledge context"
        );

        format!("{CONTEXT_HEADING}\n\n{}", parts.join("\n\n"))
    }
}

pub fn format_record(scored: &ScoredRecord) -> String {
    format!(
        "**[{}]** (score {:.2})\n{}",
        scored.record.kind.label(),
        scored.score,
        truncate_chars(&scored.record.payload.canonical_text(), RECORD_TEXT_LIMIT)
    )
}

/// Rough estimate: ~4 chars per token.
pub fn estimate_tokens(text: &str) -> usize {
    text.len() / 4
}

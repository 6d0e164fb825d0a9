//! Token usage accounting for a single live connection.

use crate::protocol::UsageMetadata;
use serde::Serialize;

/// Running token counters reported by the server for the current connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UsageTotals {
    pub prompt_tokens: u64,
    pub response_tokens: u64,
    pub total_tokens: u64,
}

impl From<&UsageMetadata> for UsageTotals {
    fn from(usage: &UsageMetadata) -> Self {
        Self {
            prompt_tokens: usage.prompt_token_count.unwrap_or(0),
            response_tokens: usage.candidates_token_count.unwrap_or(0),
            total_tokens: usage.total_token_count.unwrap_or(0),
        }
    }
}

/// Accumulates the per-turn usage frames of one connection.
///
/// The owning client resets it once at the start of every connection attempt;
/// in between the counters only ever grow.
#[derive(Debug, Default)]
pub struct UsageAccumulator {
    totals: UsageTotals,
}

impl UsageAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zeroes all counters.
    pub fn reset(&mut self) {
        self.totals = UsageTotals::default();
    }

    /// Adds one usage frame to the running totals. Absent counts count as zero.
    pub fn accumulate(&mut self, usage: &UsageMetadata) {
        let turn = UsageTotals::from(usage);
        self.totals.prompt_tokens = self.totals.prompt_tokens.saturating_add(turn.prompt_tokens);
        self.totals.response_tokens = self
            .totals
            .response_tokens
            .saturating_add(turn.response_tokens);
        self.totals.total_tokens = self.totals.total_tokens.saturating_add(turn.total_tokens);
    }

    pub fn snapshot(&self) -> UsageTotals {
        self.totals
    }
}

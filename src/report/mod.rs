//! The four report aggregators and the bundle the store publishes.

mod blocks;
mod periods;
mod sessions;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cost::CostCalculator;
use crate::types::{
    BlockUsage, DailyUsage, MonthlyUsage, SessionUsage, TokenTotals, TokenUsage, UsageEntry,
    push_unique,
};

pub use blocks::{BLOCK_DURATION_MS, aggregate_blocks, block_start_millis};
pub use periods::{aggregate_daily, aggregate_monthly};
pub use sessions::{DEFAULT_PROJECT_PATH, SESSION_GAP_MINUTES, aggregate_sessions};

/// Every report computed from one entry pool under one cost mode.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Reports {
    pub daily: Vec<DailyUsage>,
    pub monthly: Vec<MonthlyUsage>,
    pub sessions: Vec<SessionUsage>,
    pub blocks: Vec<BlockUsage>,
    pub current_block: Option<BlockUsage>,
}

impl Reports {
    pub fn build(entries: &[UsageEntry], costs: &CostCalculator<'_>, now: DateTime<Utc>) -> Self {
        let blocks = aggregate_blocks(entries, costs, now);
        let current_block = blocks.iter().find(|block| block.is_active).cloned();
        Reports {
            daily: aggregate_daily(entries, costs),
            monthly: aggregate_monthly(entries, costs),
            sessions: aggregate_sessions(entries, costs),
            blocks,
            current_block,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.daily.is_empty()
            && self.monthly.is_empty()
            && self.sessions.is_empty()
            && self.blocks.is_empty()
    }
}

/// Running state for one report row.
#[derive(Default)]
struct UsageAccumulator {
    tokens: TokenUsage,
    cost_usd: f64,
    models: Vec<String>,
}

impl UsageAccumulator {
    fn add_entry(&mut self, entry: &UsageEntry, costs: &CostCalculator<'_>) {
        if let Some(usage) = entry.usage() {
            self.tokens.add(usage);
        }
        if let Some(model) = entry.model() {
            push_unique(&mut self.models, model);
        }
        self.cost_usd += costs.cost(entry);
    }

    fn finish(self) -> (TokenTotals, f64, Vec<String>) {
        (self.tokens.into(), self.cost_usd, self.models)
    }
}

use crate::pricing::PricingTable;
use crate::types::{CostMode, UsageEntry};

/// Prices entries under one [`CostMode`] against one pricing table.
#[derive(Debug, Clone, Copy)]
pub struct CostCalculator<'a> {
    mode: CostMode,
    pricing: &'a PricingTable,
}

impl<'a> CostCalculator<'a> {
    pub fn new(mode: CostMode, pricing: &'a PricingTable) -> Self {
        CostCalculator { mode, pricing }
    }

    pub fn cost(&self, entry: &UsageEntry) -> f64 {
        match self.mode {
            CostMode::Display => entry.cost_usd().unwrap_or(0.0),
            CostMode::Auto => entry
                .cost_usd()
                .unwrap_or_else(|| self.token_cost(entry)),
            CostMode::Calculate => self.token_cost(entry),
        }
    }

    /// Zero when the model is unknown or the entry carries no usage payload.
    pub fn token_cost(&self, entry: &UsageEntry) -> f64 {
        let (Some(model), Some(usage)) = (entry.model(), entry.usage()) else {
            return 0.0;
        };
        self.pricing
            .find(model)
            .map(|pricing| pricing.cost(usage))
            .unwrap_or(0.0)
    }
}

impl CostCalculator<'static> {
    pub fn bundled(mode: CostMode) -> Self {
        CostCalculator::new(mode, PricingTable::bundled())
    }
}

/// Cost of one entry under `mode` using the bundled pricing table.
pub fn calculate_cost(entry: &UsageEntry, mode: CostMode) -> f64 {
    CostCalculator::bundled(mode).cost(entry)
}

use std::collections::BTreeMap;

use super::UsageAccumulator;
use crate::cost::CostCalculator;
use crate::types::{DailyUsage, MonthlyUsage, UsageEntry};

/// Rows keyed by the date part of the raw timestamp, newest first.
pub fn aggregate_daily(entries: &[UsageEntry], costs: &CostCalculator<'_>) -> Vec<DailyUsage> {
    aggregate_by_key(entries, costs, daily_key)
        .map(|(date, acc)| {
            let (tokens, total_cost, models) = acc.finish();
            DailyUsage {
                date,
                tokens,
                total_cost,
                models,
            }
        })
        .collect()
}

/// Rows keyed by the year-month prefix of the raw timestamp, newest first.
pub fn aggregate_monthly(entries: &[UsageEntry], costs: &CostCalculator<'_>) -> Vec<MonthlyUsage> {
    aggregate_by_key(entries, costs, monthly_key)
        .map(|(month, acc)| {
            let (tokens, total_cost, models) = acc.finish();
            MonthlyUsage {
                month,
                tokens,
                total_cost,
                models,
            }
        })
        .collect()
}

fn aggregate_by_key(
    entries: &[UsageEntry],
    costs: &CostCalculator<'_>,
    key: fn(&str) -> &str,
) -> impl Iterator<Item = (String, UsageAccumulator)> {
    let mut map: BTreeMap<String, UsageAccumulator> = BTreeMap::new();
    for entry in entries {
        let Some(timestamp) = entry.timestamp() else {
            continue;
        };
        map.entry(key(timestamp).to_string())
            .or_default()
            .add_entry(entry, costs);
    }
    // zero-padded keys: lexicographic order is chronological
    map.into_iter().rev()
}

fn daily_key(timestamp: &str) -> &str {
    timestamp
        .split_once('T')
        .map_or(timestamp, |(date, _)| date)
}

fn monthly_key(timestamp: &str) -> &str {
    timestamp.get(..7).unwrap_or(timestamp)
}

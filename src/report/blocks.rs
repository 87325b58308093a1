use std::collections::BTreeMap;

use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, Utc};
use tracing::debug;

use super::UsageAccumulator;
use crate::cost::CostCalculator;
use crate::types::{BlockUsage, UsageEntry};

/// Length of a billing block: 5 hours.
pub const BLOCK_DURATION_MS: i64 = 5 * 60 * 60 * 1000;

/// Start of the epoch-aligned block containing `instant`, in epoch millis.
pub fn block_start_millis(instant: DateTime<Utc>) -> i64 {
    instant.timestamp_millis().div_euclid(BLOCK_DURATION_MS) * BLOCK_DURATION_MS
}

/// Groups entries into fixed 5-hour windows aligned to the UNIX epoch, newest
/// first. `is_active` is evaluated against `now`.
pub fn aggregate_blocks(
    entries: &[UsageEntry],
    costs: &CostCalculator<'_>,
    now: DateTime<Utc>,
) -> Vec<BlockUsage> {
    let mut map: BTreeMap<i64, UsageAccumulator> = BTreeMap::new();

    for entry in entries {
        let Some(instant) = entry.instant() else {
            if let Some(raw) = entry.timestamp() {
                debug!(timestamp = raw, "entry timestamp is not RFC 3339; left out of blocks");
            }
            continue;
        };
        map.entry(block_start_millis(instant))
            .or_default()
            .add_entry(entry, costs);
    }

    map.into_iter()
        .rev()
        .filter_map(|(start_ms, acc)| {
            let start_time = DateTime::<Utc>::from_timestamp_millis(start_ms)?;
            let end_time = start_time + ChronoDuration::milliseconds(BLOCK_DURATION_MS);
            let (tokens, total_cost, models) = acc.finish();
            Some(BlockUsage {
                block_id: start_time.to_rfc3339_opts(SecondsFormat::Millis, true),
                start_time,
                end_time,
                tokens,
                total_cost,
                models,
                is_active: now >= start_time && now < end_time,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn start_is_floor_of_epoch_millis() {
        let instant = Utc.with_ymd_and_hms(2024, 1, 15, 4, 59, 59).unwrap();
        let start = block_start_millis(instant);
        assert_eq!(start % BLOCK_DURATION_MS, 0);
        assert!(start <= instant.timestamp_millis());
        assert!(instant.timestamp_millis() - start < BLOCK_DURATION_MS);
        assert_eq!(
            DateTime::<Utc>::from_timestamp_millis(start).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 15, 2, 0, 0).unwrap()
        );
    }

    #[test]
    fn pre_epoch_instants_floor_downwards() {
        let instant = Utc.with_ymd_and_hms(1969, 12, 31, 23, 0, 0).unwrap();
        assert_eq!(block_start_millis(instant), -BLOCK_DURATION_MS);
    }
}

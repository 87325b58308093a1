use chrono::{DateTime, TimeZone, Utc};
use claudedeck::report::{BLOCK_DURATION_MS, block_start_millis};
use claudedeck::{
    CostCalculator, CostMode, PricingTable, Reports, UsageEntry, aggregate_blocks, aggregate_daily,
    aggregate_monthly, aggregate_sessions, calculate_cost, parse,
};
use serde_json::json;

const SONNET: &str = "claude-sonnet-4-20250514";
const OPUS: &str = "claude-opus-4-20250514";

fn line(timestamp: &str, model: &str, input: u64, output: u64, cost: Option<f64>) -> String {
    let mut value = json!({
        "timestamp": timestamp,
        "message": {
            "model": model,
            "usage": {
                "input_tokens": input,
                "output_tokens": output,
                "cache_creation_input_tokens": input / 10,
                "cache_read_input_tokens": input / 20
            }
        },
        "version": "1.0.0"
    });
    if let Some(cost) = cost {
        value["costUSD"] = json!(cost);
    }
    value.to_string()
}

fn entries(lines: &[String]) -> Vec<UsageEntry> {
    parse(&lines.join("\n"))
}

fn sample() -> Vec<UsageEntry> {
    entries(&[
        line("2024-03-01T00:30:00Z", SONNET, 1000, 500, Some(0.2)),
        line("2024-03-01T00:50:00Z", OPUS, 300, 100, None),
        line("2024-03-01T09:45:00Z", SONNET, 50, 25, None),
        line("2024-03-02T12:00:00Z", "some-unknown-model", 70, 30, None),
        line("2024-04-10T08:00:00Z", SONNET, 400, 40, Some(0.05)),
    ])
}

fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
}

fn auto() -> CostCalculator<'static> {
    CostCalculator::bundled(CostMode::Auto)
}

#[test]
fn row_totals_add_up() {
    let entries = sample();
    let costs = auto();
    let reports = Reports::build(&entries, &costs, at(2024, 3, 1, 10, 0, 0));
    let all_tokens = reports
        .daily
        .iter()
        .map(|r| r.tokens)
        .chain(reports.monthly.iter().map(|r| r.tokens))
        .chain(reports.sessions.iter().map(|r| r.tokens))
        .chain(reports.blocks.iter().map(|r| r.tokens));
    for t in all_tokens {
        assert_eq!(
            t.total_tokens,
            t.input_tokens + t.output_tokens + t.cache_creation_tokens + t.cache_read_tokens
        );
    }
}

#[test]
fn aggregation_is_idempotent() {
    let entries = sample();
    let costs = auto();
    let now = at(2024, 3, 1, 10, 0, 0);
    assert_eq!(aggregate_daily(&entries, &costs), aggregate_daily(&entries, &costs));
    assert_eq!(aggregate_monthly(&entries, &costs), aggregate_monthly(&entries, &costs));
    assert_eq!(aggregate_blocks(&entries, &costs, now), aggregate_blocks(&entries, &costs, now));
}

#[test]
fn input_order_does_not_change_reports() {
    let entries = sample();
    let mut reversed = entries.clone();
    reversed.reverse();
    let mut rotated = entries.clone();
    rotated.rotate_left(2);
    let costs = auto();

    let sessions = aggregate_sessions(&entries, &costs);
    assert_eq!(aggregate_sessions(&reversed, &costs), sessions);
    assert_eq!(aggregate_sessions(&rotated, &costs), sessions);

    let daily_tokens = |e: &[UsageEntry]| {
        aggregate_daily(e, &costs)
            .into_iter()
            .map(|r| (r.date, r.tokens))
            .collect::<Vec<_>>()
    };
    assert_eq!(daily_tokens(&reversed), daily_tokens(&entries));
}

#[test]
fn display_and_calculate_modes() {
    let entry = parse(&line("2024-03-01T00:00:00Z", SONNET, 1000, 500, Some(2.5))).remove(0);
    assert_eq!(calculate_cost(&entry, CostMode::Display), 2.5);
    assert_eq!(calculate_cost(&entry, CostMode::Auto), 2.5);
    let calculated = calculate_cost(&entry, CostMode::Calculate);
    assert!(calculated < 1.0);
    assert!(calculated > 0.0);
}

#[test]
fn sonnet_scenario_under_calculate() {
    let raw = r#"{"timestamp":"2024-03-01T00:00:00Z","message":{"model":"claude-sonnet-4-20250514","usage":{"input_tokens":1000,"output_tokens":500}}}"#;
    let costs = CostCalculator::bundled(CostMode::Calculate);
    let daily = aggregate_daily(&parse(raw), &costs);
    assert_eq!(daily.len(), 1);
    let row = &daily[0];
    assert_eq!(row.date, "2024-03-01");
    assert_eq!(row.tokens.input_tokens, 1000);
    assert_eq!(row.tokens.output_tokens, 500);
    assert_eq!(row.tokens.total_tokens, 1500);
    assert!((row.total_cost - 0.0105).abs() < 1e-12);
}

#[test]
fn bad_line_then_good_line_yields_one_entry() {
    let raw = format!("{{not json\n{}", line("2024-03-01T00:00:00Z", SONNET, 1, 1, None));
    assert_eq!(parse(&raw).len(), 1);
}

#[test]
fn empty_input_yields_no_rows() {
    let entries = parse("");
    assert!(entries.is_empty());
    let costs = auto();
    let now = at(2024, 3, 1, 0, 0, 0);
    assert!(aggregate_daily(&entries, &costs).is_empty());
    assert!(aggregate_monthly(&entries, &costs).is_empty());
    assert!(aggregate_sessions(&entries, &costs).is_empty());
    assert!(aggregate_blocks(&entries, &costs, now).is_empty());
    assert!(Reports::build(&entries, &costs, now).is_empty());
}

#[test]
fn block_boundaries_follow_epoch_floor() {
    let a = at(2024, 1, 15, 4, 59, 59);
    let b = at(2024, 1, 15, 5, 0, 1);
    let same = a.timestamp_millis() / BLOCK_DURATION_MS == b.timestamp_millis() / BLOCK_DURATION_MS;
    assert_eq!(block_start_millis(a) == block_start_millis(b), same);
    assert!(same);

    let c = at(2024, 1, 15, 6, 59, 59);
    let d = at(2024, 1, 15, 7, 0, 1);
    assert_ne!(block_start_millis(c), block_start_millis(d));

    let entries = entries(&[
        line("2024-01-15T06:59:59Z", SONNET, 10, 10, None),
        line("2024-01-15T07:00:01Z", SONNET, 10, 10, None),
    ]);
    let blocks = aggregate_blocks(&entries, &auto(), at(2024, 1, 15, 8, 0, 0));
    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks[0].block_id, "2024-01-15T07:00:00.000Z");
    assert!(blocks[0].is_active);
    assert!(!blocks[1].is_active);
}

#[test]
fn block_start_and_end_span_five_hours() {
    let entries = entries(&[line("2024-03-01T00:30:00Z", SONNET, 10, 10, None)]);
    let blocks = aggregate_blocks(&entries, &auto(), at(2030, 1, 1, 0, 0, 0));
    let block = &blocks[0];
    assert_eq!(block.start_time, at(2024, 2, 29, 22, 0, 0));
    assert_eq!(block.end_time, at(2024, 3, 1, 3, 0, 0));
    assert!(!block.is_active);
}

#[test]
fn active_block_depends_on_now() {
    let entries = sample();
    let costs = auto();
    let during = Reports::build(&entries, &costs, at(2024, 3, 1, 1, 30, 0));
    let current = during.current_block.expect("active block");
    assert_eq!(current.block_id, "2024-02-29T22:00:00.000Z");
    assert_eq!(current.models, vec![SONNET.to_string(), OPUS.to_string()]);

    let at_end = Reports::build(&entries, &costs, at(2024, 3, 1, 3, 0, 0));
    assert!(at_end.current_block.is_none());
}

#[test]
fn session_gap_is_thirty_minutes() {
    let costs = auto();
    let apart = |minutes: u32| {
        entries(&[
            line("2024-03-01T10:00:00Z", SONNET, 10, 10, None),
            line(&format!("2024-03-01T10:{minutes:02}:00Z"), SONNET, 10, 10, None),
        ])
    };
    assert_eq!(aggregate_sessions(&apart(31), &costs).len(), 2);
    assert_eq!(aggregate_sessions(&apart(29), &costs).len(), 1);
    assert_eq!(aggregate_sessions(&apart(30), &costs).len(), 1);
}

#[test]
fn sessions_are_newest_first_with_sequential_ids() {
    let sessions = aggregate_sessions(&sample(), &auto());
    let ids: Vec<&str> = sessions.iter().map(|s| s.session_id.as_str()).collect();
    assert_eq!(ids, vec!["session-4", "session-3", "session-2", "session-1"]);
    assert!(sessions.windows(2).all(|w| w[0].last_activity >= w[1].last_activity));
    assert_eq!(sessions[3].last_activity, at(2024, 3, 1, 0, 50, 0));
    assert_eq!(sessions[3].versions, vec!["1.0.0".to_string()]);
}

#[test]
fn rows_are_sorted_newest_first() {
    let costs = auto();
    let daily = aggregate_daily(&sample(), &costs);
    let dates: Vec<&str> = daily.iter().map(|r| r.date.as_str()).collect();
    assert_eq!(dates, vec!["2024-04-10", "2024-03-02", "2024-03-01"]);
    let monthly = aggregate_monthly(&sample(), &costs);
    let months: Vec<&str> = monthly.iter().map(|r| r.month.as_str()).collect();
    assert_eq!(months, vec!["2024-04", "2024-03"]);
}

#[test]
fn models_are_deduplicated() {
    let entries = entries(&[
        line("2024-03-01T00:00:00Z", SONNET, 1, 1, None),
        line("2024-03-01T00:01:00Z", SONNET, 1, 1, None),
        line("2024-03-01T00:02:00Z", OPUS, 1, 1, None),
    ]);
    let daily = aggregate_daily(&entries, &auto());
    assert_eq!(daily[0].models, vec![SONNET.to_string(), OPUS.to_string()]);
}

#[test]
fn unknown_model_costs_nothing_under_calculate() {
    let costs = CostCalculator::bundled(CostMode::Calculate);
    let daily = aggregate_daily(&sample(), &costs);
    let unknown = daily.iter().find(|r| r.date == "2024-03-02").unwrap();
    assert_eq!(unknown.total_cost, 0.0);
    assert_eq!(unknown.tokens.input_tokens, 70);
}

#[test]
fn entries_without_timestamps_are_left_out() {
    let mut lines = vec![line("2024-03-01T00:00:00Z", SONNET, 10, 10, None)];
    lines.push(json!({"message": {"model": SONNET, "usage": {"input_tokens": 99}}}).to_string());
    let entries = entries(&lines);
    assert_eq!(entries.len(), 2);
    let costs = auto();
    assert_eq!(aggregate_daily(&entries, &costs)[0].tokens.input_tokens, 10);
    assert_eq!(aggregate_sessions(&entries, &costs).len(), 1);
    assert_eq!(aggregate_blocks(&entries, &costs, at(2024, 3, 1, 0, 0, 0)).len(), 1);
}

#[test]
fn blank_timestamps_count_as_missing() {
    let raw = [
        json!({"timestamp": "", "message": {"model": SONNET, "usage": {"input_tokens": 7}}}).to_string(),
        json!({"timestamp": "   ", "message": {"model": SONNET, "usage": {"input_tokens": 9}}}).to_string(),
    ];
    let entries = entries(&raw);
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.timestamp().is_none()));

    let costs = auto();
    let now = at(2024, 3, 1, 0, 0, 0);
    assert!(aggregate_daily(&entries, &costs).is_empty());
    assert!(aggregate_monthly(&entries, &costs).is_empty());
    assert!(aggregate_sessions(&entries, &costs).is_empty());
    assert!(aggregate_blocks(&entries, &costs, now).is_empty());
}

#[test]
fn custom_pricing_table_drives_calculated_cost() {
    let mut table = PricingTable::default();
    table.insert(
        "house-model",
        claudedeck::Pricing {
            input_per_million: 1_000_000.0,
            ..Default::default()
        },
    );
    let costs = CostCalculator::new(CostMode::Calculate, &table);
    let entries = entries(&[line("2024-03-01T00:00:00Z", "house-model", 2, 0, None)]);
    assert_eq!(aggregate_daily(&entries, &costs)[0].total_cost, 2.0);
}

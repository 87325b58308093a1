use assert_cmd::prelude::*;
use serde_json::{Value, json};
use std::process::Command;

const FIXTURES: &str = "tests/fixtures";
const CONFIG: &str = "tests/fixtures/claudedeck.json";

fn claudedeck() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("claudedeck"));
    cmd.env_remove("RUST_LOG").env_remove("CLAUDE_CONFIG_DIR");
    cmd
}

fn run_stdout(args: &[&str]) -> String {
    let output = claudedeck()
        .args(["--data-dir", FIXTURES, "--config", CONFIG])
        .args(args)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    String::from_utf8(output).expect("utf-8 output")
}

fn run_json(args: &[&str]) -> Value {
    serde_json::from_str(&run_stdout(args)).expect("valid json output")
}

fn assert_close(value: &Value, expected: f64) {
    let actual = value.as_f64().expect("number");
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

#[test]
fn daily_report_matches_fixture() {
    let v = run_json(&["daily", "--json", "--order", "asc"]);
    assert_eq!(v["kind"], "daily");
    assert_eq!(v["cost_mode"], "auto");
    let rows = v["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0]["date"], "2024-12-01");
    assert_eq!(rows[0]["total_tokens"], json!(525));
    assert_close(&rows[0]["total_cost"], 0.3105);
    assert_eq!(
        rows[0]["models"],
        json!(["claude-sonnet-4-20250514", "claude-opus-4-20250514"])
    );
    assert_eq!(rows[1]["date"], "2024-12-02");
    assert_eq!(rows[1]["total_tokens"], json!(1700));
    assert_close(&rows[1]["total_cost"], 0.00164);
    assert_eq!(rows[2]["date"], "2025-01-03");
    assert_eq!(rows[2]["total_tokens"], json!(15));
    assert_eq!(v["totals"]["total_tokens"], json!(2240));
    assert_close(&v["totals"]["total_cost"], 0.32214);
}

#[test]
fn default_command_is_daily_newest_first() {
    let v = run_json(&["--json"]);
    assert_eq!(v["kind"], "daily");
    assert_eq!(v["rows"][0]["date"], "2025-01-03");
}

#[test]
fn monthly_report_matches_fixture() {
    let v = run_json(&["monthly", "--json"]);
    let rows = v["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["month"], "2025-01");
    assert_eq!(rows[0]["total_tokens"], json!(15));
    assert_eq!(rows[1]["month"], "2024-12");
    assert_eq!(rows[1]["total_tokens"], json!(2225));
    assert_eq!(rows[1]["cache_read_tokens"], json!(505));
}

#[test]
fn sessions_report_matches_fixture() {
    let v = run_json(&["sessions", "--json"]);
    let rows = v["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 4);
    let first = &rows[0]; // sorted by last_activity desc
    assert_eq!(first["session_id"], "session-4");
    assert_eq!(first["total_tokens"], json!(15));
    let oldest = &rows[3];
    assert_eq!(oldest["session_id"], "session-1");
    assert_eq!(oldest["total_tokens"], json!(465));
    assert_eq!(oldest["versions"], json!(["1.0.30"]));
    assert_eq!(oldest["project_path"], "Claude Code Sessions");
    assert_eq!(v["totals"]["total_tokens"], json!(2240));
}

#[test]
fn blocks_report_matches_fixture() {
    let v = run_json(&["blocks", "--json"]);
    let rows = v["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0]["block_id"], "2025-01-03T21:00:00.000Z");
    assert!(rows.iter().any(
        |r| r["block_id"] == "2024-12-01T08:00:00.000Z" && r["total_tokens"] == json!(465)
    ));
    assert!(rows.iter().any(
        |r| r["block_id"] == "2024-12-01T13:00:00.000Z" && r["total_tokens"] == json!(60)
    ));
    assert!(rows.iter().all(|r| r["is_active"] == json!(false)));
    assert!(v.get("current_block").is_none());
    assert_eq!(v["totals"]["total_tokens"], json!(2240));
}

#[test]
fn calculate_mode_ignores_logged_cost() {
    let v = run_json(&["daily", "--json", "--order", "asc", "--cost-mode", "calculate"]);
    assert_eq!(v["cost_mode"], "calculate");
    assert_close(&v["rows"][0]["total_cost"], 0.012009);
}

#[test]
fn display_mode_uses_logged_cost_only() {
    let v = run_json(&["daily", "--json", "--order", "asc", "--cost-mode", "display"]);
    assert_close(&v["rows"][0]["total_cost"], 0.30);
    assert_close(&v["rows"][1]["total_cost"], 0.0);
}

#[test]
fn csv_output_has_header_and_rows() {
    let out = run_stdout(&["daily", "--csv"]);
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(
        lines[0],
        "date,input_tokens,output_tokens,cache_creation_tokens,cache_read_tokens,total_tokens,total_cost,models"
    );
    assert_eq!(lines[1], "2025-01-03,10,5,0,0,15,0.01,claude-sonnet-4-20250514");
    assert!(lines[3].ends_with("claude-sonnet-4-20250514; claude-opus-4-20250514"));
}

#[test]
fn table_output_shows_totals() {
    let out = run_stdout(&["monthly", "--compact"]);
    assert!(out.contains("Monthly usage"));
    assert!(out.contains("2024-12"));
    assert!(out.contains("Total"));
}

#[test]
fn current_reports_no_active_block_for_old_logs() {
    let out = run_stdout(&["current"]);
    assert!(out.contains("No active block"));
    let v = run_json(&["current", "--json"]);
    assert_eq!(v, Value::Null);
}

#[test]
fn empty_data_dir_is_not_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    let output = claudedeck()
        .args(["--data-dir", tmp.path().to_str().unwrap(), "--config", CONFIG, "daily"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert!(String::from_utf8_lossy(&output).contains("No usage yet"));
}

#[test]
fn since_skips_older_log_files() {
    let out = run_stdout(&["daily", "--since", "2999-01-01"]);
    assert!(out.contains("No usage yet"));
}

#[test]
fn command_config_sets_cost_mode() {
    let tmp = tempfile::tempdir().unwrap();
    let config = tmp.path().join("claudedeck.json");
    std::fs::write(
        &config,
        r#"{ "commands": { "daily": { "cost_mode": "display", "order": "asc" } } }"#,
    )
    .unwrap();
    let output = claudedeck()
        .args(["--data-dir", FIXTURES, "--config", config.to_str().unwrap(), "daily", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let v: Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(v["cost_mode"], "display");
    assert_eq!(v["rows"][0]["date"], "2024-12-01");
}

#[test]
fn invalid_config_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let config = tmp.path().join("bad.json");
    std::fs::write(&config, r#"{ "defaults": { "cost_mode": "guess" } }"#).unwrap();
    claudedeck()
        .args(["--data-dir", FIXTURES, "--config", config.to_str().unwrap(), "daily"])
        .assert()
        .failure();
}

#[test]
fn invalid_timezone_is_rejected() {
    claudedeck()
        .args(["--data-dir", FIXTURES, "--config", CONFIG, "daily", "--timezone", "Mars/Olympus"])
        .assert()
        .failure();
}

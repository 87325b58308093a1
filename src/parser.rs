use serde_json::Value;
use tracing::warn;

use crate::types::{TokenUsage, UsageEntry};

/// Entries decoded from one blob plus the number of lines that were dropped.
#[derive(Debug, Default)]
pub struct ParsedBlob {
    pub entries: Vec<UsageEntry>,
    pub skipped_lines: usize,
}

impl ParsedBlob {
    /// A blob with content where not a single line decoded.
    pub fn is_malformed(&self) -> bool {
        self.entries.is_empty() && self.skipped_lines > 0
    }
}

/// Parses newline-delimited JSON into usage entries, dropping lines that are
/// not valid JSON.
pub fn parse(raw: &str) -> Vec<UsageEntry> {
    parse_blob(raw).entries
}

pub fn parse_blob(raw: &str) -> ParsedBlob {
    let mut parsed = ParsedBlob::default();
    for (idx, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(value) => parsed.entries.push(entry_from_value(&value)),
            Err(err) => {
                parsed.skipped_lines += 1;
                warn!(line = idx + 1, error = %err, "skipping malformed usage line");
            }
        }
    }
    parsed
}

/// Fields holding the wrong JSON type are treated as absent.
fn entry_from_value(value: &Value) -> UsageEntry {
    let message = value.get("message");
    let usage = message
        .and_then(|m| m.get("usage"))
        .filter(|u| u.is_object())
        .map(|u| TokenUsage {
            input_tokens: token_count(u.get("input_tokens")),
            output_tokens: token_count(u.get("output_tokens")),
            cache_creation_tokens: token_count(u.get("cache_creation_input_tokens")),
            cache_read_tokens: token_count(u.get("cache_read_input_tokens")),
        });

    UsageEntry::new(
        string_field(value.get("timestamp")).filter(|t| !t.trim().is_empty()),
        string_field(message.and_then(|m| m.get("model"))),
        usage,
        value
            .get("costUSD")
            .and_then(Value::as_f64)
            .filter(|cost| cost.is_finite() && *cost >= 0.0),
        string_field(value.get("version")),
    )
}

fn string_field(value: Option<&Value>) -> Option<String> {
    value.and_then(Value::as_str).map(str::to_string)
}

fn token_count(value: Option<&Value>) -> u64 {
    let Some(value) = value else { return 0 };
    value
        .as_u64()
        .or_else(|| {
            value
                .as_f64()
                .filter(|n| n.is_finite() && *n >= 0.0)
                .map(|n| n as u64)
        })
        .unwrap_or(0)
}

//! Display helpers shared by the table, watch and dashboard views.

use chrono::{DateTime, Utc};
use num_format::{Locale, ToFormattedString};

use crate::types::BlockUsage;

/// `1.2k`, `3.4m`, `1.0b`; raw below one thousand.
pub fn format_token_count(tokens: u64) -> String {
    let value = tokens as f64;
    if tokens >= 1_000_000_000 {
        format!("{:.1}b", value / 1_000_000_000.0)
    } else if tokens >= 1_000_000 {
        format!("{:.1}m", value / 1_000_000.0)
    } else if tokens >= 1_000 {
        format!("{:.1}k", value / 1_000.0)
    } else {
        tokens.to_string()
    }
}

/// `$0.01`, `$1.23k`, `$1.50m`, `$2.00b`.
pub fn format_currency(amount: f64) -> String {
    if amount >= 1_000_000_000.0 {
        format!("${:.2}b", amount / 1_000_000_000.0)
    } else if amount >= 1_000_000.0 {
        format!("${:.2}m", amount / 1_000_000.0)
    } else if amount >= 1_000.0 {
        format!("${:.2}k", amount / 1_000.0)
    } else {
        format!("${amount:.2}")
    }
}

/// Dollars with thousands separators: `$1,234.56`.
pub fn format_cost(value: f64) -> String {
    let cents = (value.max(0.0) * 100.0).round() as u64;
    format!("${}.{:02}", (cents / 100).to_formatted_string(&Locale::en), cents % 100)
}

pub fn format_tokens(value: u64, locale: &Locale) -> String {
    value.to_formatted_string(locale)
}

/// `claude-sonnet-4-20250514` becomes `sonnet-4`. Names without a
/// `claude-<family>-<major>-<digits>` run are returned unchanged.
pub fn format_model_name(model: &str) -> String {
    for (idx, _) in model.match_indices("claude-") {
        if let Some(short) = short_model_name(&model[idx + "claude-".len()..]) {
            return short;
        }
    }
    model.to_string()
}

fn short_model_name(rest: &str) -> Option<String> {
    let is_word = |c: char| c.is_ascii_alphanumeric() || c == '_';

    let family_len = rest.find(|c: char| !is_word(c))?;
    if family_len == 0 {
        return None;
    }
    let (family, rest) = rest.split_at(family_len);
    let rest = rest.strip_prefix('-')?;

    let major_len = rest.find(|c: char| !c.is_ascii_digit())?;
    if major_len == 0 {
        return None;
    }
    let (major, rest) = rest.split_at(major_len);
    let rest = rest.strip_prefix('-')?;

    if rest.starts_with(|c: char| c.is_ascii_digit()) {
        Some(format!("{family}-{major}"))
    } else {
        None
    }
}

/// Unique display names, sorted, comma-joined.
pub fn format_models_display(models: &[String]) -> String {
    let mut names: Vec<String> = models.iter().map(|m| format_model_name(m)).collect();
    names.sort();
    names.dedup();
    names.join(", ")
}

/// `2h 13m remaining`; never negative.
pub fn format_time_remaining(block: &BlockUsage, now: DateTime<Utc>) -> String {
    let minutes = (block.end_time - now).num_minutes().max(0);
    format!("{}h {}m remaining", minutes / 60, minutes % 60)
}

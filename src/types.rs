use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Default, ValueEnum, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CostMode {
    /// Use `costUSD` when present, otherwise calculate from tokens.
    #[default]
    Auto,
    /// Always calculate from tokens, ignoring `costUSD`.
    Calculate,
    /// Only show `costUSD`; entries without it cost nothing.
    Display,
}

/// Raw token counts as reported on one log line, also used as the running
/// counter inside accumulators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_tokens: u64,
    pub cache_read_tokens: u64,
}

impl TokenUsage {
    pub fn add(&mut self, other: &TokenUsage) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
        self.cache_creation_tokens = self
            .cache_creation_tokens
            .saturating_add(other.cache_creation_tokens);
        self.cache_read_tokens = self.cache_read_tokens.saturating_add(other.cache_read_tokens);
    }
}

/// Token counts embedded in every report row. `total_tokens` is only ever
/// produced from the four components, see [`TokenTotals::from`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenTotals {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_tokens: u64,
    pub cache_read_tokens: u64,
    pub total_tokens: u64,
}

impl From<TokenUsage> for TokenTotals {
    fn from(usage: TokenUsage) -> Self {
        TokenTotals {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            cache_creation_tokens: usage.cache_creation_tokens,
            cache_read_tokens: usage.cache_read_tokens,
            total_tokens: usage
                .input_tokens
                .saturating_add(usage.output_tokens)
                .saturating_add(usage.cache_creation_tokens)
                .saturating_add(usage.cache_read_tokens),
        }
    }
}

/// One parsed log line. Immutable once built by the parser.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageEntry {
    timestamp: Option<String>,
    instant: Option<DateTime<Utc>>,
    model: Option<String>,
    usage: Option<TokenUsage>,
    cost_usd: Option<f64>,
    version: Option<String>,
}

impl UsageEntry {
    pub(crate) fn new(
        timestamp: Option<String>,
        model: Option<String>,
        usage: Option<TokenUsage>,
        cost_usd: Option<f64>,
        version: Option<String>,
    ) -> Self {
        let instant = timestamp.as_deref().and_then(parse_timestamp);
        UsageEntry {
            timestamp,
            instant,
            model,
            usage,
            cost_usd,
            version,
        }
    }

    /// The timestamp exactly as written in the log line.
    pub fn timestamp(&self) -> Option<&str> {
        self.timestamp.as_deref()
    }

    /// The timestamp as an absolute instant, when it is valid RFC 3339.
    pub fn instant(&self) -> Option<DateTime<Utc>> {
        self.instant
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn usage(&self) -> Option<&TokenUsage> {
        self.usage.as_ref()
    }

    pub fn cost_usd(&self) -> Option<f64> {
        self.cost_usd
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }
}

pub(crate) fn parse_timestamp(ts: &str) -> Option<DateTime<Utc>> {
    chrono::DateTime::parse_from_rfc3339(ts)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyUsage {
    pub date: String,
    #[serde(flatten)]
    pub tokens: TokenTotals,
    pub total_cost: f64,
    pub models: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyUsage {
    pub month: String,
    #[serde(flatten)]
    pub tokens: TokenTotals,
    pub total_cost: f64,
    pub models: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockUsage {
    pub block_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(flatten)]
    pub tokens: TokenTotals,
    pub total_cost: f64,
    pub models: Vec<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionUsage {
    pub session_id: String,
    pub project_path: String,
    #[serde(flatten)]
    pub tokens: TokenTotals,
    pub total_cost: f64,
    pub models: Vec<String>,
    pub versions: Vec<String>,
    pub last_activity: DateTime<Utc>,
}

/// Shared view over the four report row kinds.
pub trait UsageRow {
    /// Grouping key shown in the first table column.
    fn key(&self) -> String;
    fn tokens(&self) -> &TokenTotals;
    fn total_cost(&self) -> f64;
    fn models(&self) -> &[String];
}

impl UsageRow for DailyUsage {
    fn key(&self) -> String {
        self.date.clone()
    }
    fn tokens(&self) -> &TokenTotals {
        &self.tokens
    }
    fn total_cost(&self) -> f64 {
        self.total_cost
    }
    fn models(&self) -> &[String] {
        &self.models
    }
}

impl UsageRow for MonthlyUsage {
    fn key(&self) -> String {
        self.month.clone()
    }
    fn tokens(&self) -> &TokenTotals {
        &self.tokens
    }
    fn total_cost(&self) -> f64 {
        self.total_cost
    }
    fn models(&self) -> &[String] {
        &self.models
    }
}

impl UsageRow for BlockUsage {
    fn key(&self) -> String {
        self.block_id.clone()
    }
    fn tokens(&self) -> &TokenTotals {
        &self.tokens
    }
    fn total_cost(&self) -> f64 {
        self.total_cost
    }
    fn models(&self) -> &[String] {
        &self.models
    }
}

impl UsageRow for SessionUsage {
    fn key(&self) -> String {
        self.session_id.clone()
    }
    fn tokens(&self) -> &TokenTotals {
        &self.tokens
    }
    fn total_cost(&self) -> f64 {
        self.total_cost
    }
    fn models(&self) -> &[String] {
        &self.models
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ReportTotals {
    #[serde(flatten)]
    pub tokens: TokenTotals,
    pub total_cost: f64,
}

impl ReportTotals {
    pub fn from_rows<R: UsageRow>(rows: &[R]) -> Self {
        let mut usage = TokenUsage::default();
        let mut total_cost = 0.0;
        for row in rows {
            let tokens = row.tokens();
            usage.add(&TokenUsage {
                input_tokens: tokens.input_tokens,
                output_tokens: tokens.output_tokens,
                cache_creation_tokens: tokens.cache_creation_tokens,
                cache_read_tokens: tokens.cache_read_tokens,
            });
            total_cost += row.total_cost();
        }
        ReportTotals {
            tokens: usage.into(),
            total_cost,
        }
    }
}

/// Appends `value` unless it is already present, keeping first-seen order.
pub(crate) fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|existing| existing == value) {
        list.push(value.to_string());
    }
}

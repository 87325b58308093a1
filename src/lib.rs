//! Usage aggregation for Claude Code JSONL logs.
//!
//! Raw log text flows through [`parser`] into [`UsageEntry`] values, is priced by
//! [`cost::CostCalculator`], and is rolled up by the aggregators in [`report`] into
//! daily, monthly, session and 5-hour block rows. [`store::ReportStore`] ties the
//! pipeline to a [`source::LogSource`] and holds the latest published reports.

pub mod cost;
pub mod format;
pub mod parser;
pub mod pricing;
pub mod report;
pub mod source;
pub mod store;
pub mod types;

pub use cost::{CostCalculator, calculate_cost};
pub use parser::{ParsedBlob, parse, parse_blob};
pub use pricing::{Pricing, PricingError, PricingTable};
pub use report::{
    Reports, aggregate_blocks, aggregate_daily, aggregate_monthly, aggregate_sessions,
};
pub use source::{FsLogSource, LogSource, SourceError};
pub use store::{LoadStatus, LoadSummary, ReportStore, StoreError};
pub use types::{
    BlockUsage, CostMode, DailyUsage, MonthlyUsage, ReportTotals, SessionUsage, TokenTotals,
    TokenUsage, UsageEntry, UsageRow,
};

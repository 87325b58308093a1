//! Load → parse → aggregate → publish.
//!
//! A [`ReportStore`] owns one [`LogSource`] and the latest entry pool and
//! reports built from it. It is an ordinary value: the caller decides who holds
//! it and which timer or file-change trigger calls [`ReportStore::load`] or
//! [`ReportStore::process_reports`]. Loads are serialized: a load issued while
//! another is in flight is rejected and leaves the held reports untouched.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cost::CostCalculator;
use crate::parser::{ParsedBlob, parse_blob};
use crate::pricing::PricingTable;
use crate::report::Reports;
use crate::source::{LogSource, SourceError};
use crate::types::{BlockUsage, CostMode, UsageEntry};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("a load is already in progress")]
    LoadInProgress,
    #[error("loading usage logs failed: {0}")]
    Source(#[from] SourceError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    Idle,
    Loading,
    Ready,
    /// The last load failed; reports still hold the previous good data.
    Error(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub blobs: usize,
    pub entries: usize,
    pub skipped_lines: usize,
    pub malformed_blobs: usize,
}

struct StoreState {
    status: LoadStatus,
    cost_mode: CostMode,
    entries: Arc<Vec<UsageEntry>>,
    reports: Arc<Reports>,
    last_load: Option<DateTime<Utc>>,
}

pub struct ReportStore<S> {
    source: S,
    pricing: PricingTable,
    state: RwLock<StoreState>,
}

impl<S> ReportStore<S> {
    pub fn new(source: S, pricing: PricingTable, cost_mode: CostMode) -> Self {
        ReportStore {
            source,
            pricing,
            state: RwLock::new(StoreState {
                status: LoadStatus::Idle,
                cost_mode,
                entries: Arc::new(Vec::new()),
                reports: Arc::new(Reports::default()),
                last_load: None,
            }),
        }
    }

    pub fn with_bundled_pricing(source: S, cost_mode: CostMode) -> Self {
        Self::new(source, PricingTable::bundled().clone(), cost_mode)
    }

    pub fn status(&self) -> LoadStatus {
        self.state.read().status.clone()
    }

    pub fn cost_mode(&self) -> CostMode {
        self.state.read().cost_mode
    }

    pub fn last_load_time(&self) -> Option<DateTime<Utc>> {
        self.state.read().last_load
    }

    pub fn entry_count(&self) -> usize {
        self.state.read().entries.len()
    }

    /// The chronologically sorted entry pool from the last successful load.
    pub fn entries(&self) -> Arc<Vec<UsageEntry>> {
        Arc::clone(&self.state.read().entries)
    }

    /// The latest published reports.
    pub fn reports(&self) -> Arc<Reports> {
        Arc::clone(&self.state.read().reports)
    }

    /// The active block as of the last report rebuild.
    pub fn current_block(&self) -> Option<BlockUsage> {
        self.state.read().reports.current_block.clone()
    }

    /// Re-runs every aggregator over the held pool with wall-clock `now`.
    pub fn process_reports(&self, mode: CostMode) -> Arc<Reports> {
        self.process_reports_at(mode, Utc::now())
    }

    pub fn process_reports_at(&self, mode: CostMode, now: DateTime<Utc>) -> Arc<Reports> {
        let mut state = self.state.write();
        self.rebuild(&mut state, mode, now);
        Arc::clone(&state.reports)
    }

    /// Rebuilds the reports once the published active block has ended at `now`.
    /// Returns whether a rebuild happened.
    pub fn expire_current_block(&self, now: DateTime<Utc>) -> bool {
        let mut state = self.state.write();
        let ended = state
            .reports
            .current_block
            .as_ref()
            .is_some_and(|block| now >= block.end_time);
        if ended {
            let mode = state.cost_mode;
            self.rebuild(&mut state, mode, now);
        }
        ended
    }

    /// Drops the entry pool and reports. An in-flight load keeps its status.
    pub fn clear(&self) {
        let mut state = self.state.write();
        state.entries = Arc::new(Vec::new());
        state.reports = Arc::new(Reports::default());
        state.last_load = None;
        if state.status != LoadStatus::Loading {
            state.status = LoadStatus::Idle;
        }
    }

    fn rebuild(&self, state: &mut StoreState, mode: CostMode, now: DateTime<Utc>) {
        let costs = CostCalculator::new(mode, &self.pricing);
        let reports = Reports::build(&state.entries, &costs, now);
        debug!(
            daily = reports.daily.len(),
            monthly = reports.monthly.len(),
            sessions = reports.sessions.len(),
            blocks = reports.blocks.len(),
            active_block = reports.current_block.is_some(),
            ?mode,
            "reports rebuilt"
        );
        state.cost_mode = mode;
        state.reports = Arc::new(reports);
    }

    fn begin_load(&self) -> Result<LoadGuard<'_>, StoreError> {
        let mut state = self.state.write();
        if state.status == LoadStatus::Loading {
            return Err(StoreError::LoadInProgress);
        }
        let previous = std::mem::replace(&mut state.status, LoadStatus::Loading);
        Ok(LoadGuard {
            state: &self.state,
            previous: Some(previous),
        })
    }
}

impl<S: LogSource> ReportStore<S> {
    /// Fetches blobs from the source, parses them into a fresh entry pool and
    /// rebuilds every report with the store's cost mode. An empty source is a
    /// successful load that empties the reports. A source failure moves the
    /// store to [`LoadStatus::Error`] and keeps the previous reports.
    pub async fn load(&self, since: Option<NaiveDate>) -> Result<LoadSummary, StoreError> {
        let mut guard = self.begin_load()?;

        let blobs = match self.source.load_usage_entries(since).await {
            Ok(blobs) => blobs,
            Err(err) => {
                guard.disarm();
                let message = err.to_string();
                warn!(error = %message, "usage load failed; keeping previous reports");
                self.state.write().status = LoadStatus::Error(message);
                return Err(err.into());
            }
        };
        if blobs.is_empty() {
            info!("no usage logs found");
        }

        let (entries, summary) = merge_blobs(&blobs);
        guard.disarm();

        let now = Utc::now();
        let mut state = self.state.write();
        state.entries = Arc::new(entries);
        state.last_load = Some(now);
        state.status = LoadStatus::Ready;
        let mode = state.cost_mode;
        self.rebuild(&mut state, mode, now);

        debug!(
            blobs = summary.blobs,
            entries = summary.entries,
            skipped_lines = summary.skipped_lines,
            malformed_blobs = summary.malformed_blobs,
            "usage load complete"
        );
        Ok(summary)
    }
}

/// Restores the pre-load status if a load future is dropped mid-flight.
struct LoadGuard<'a> {
    state: &'a RwLock<StoreState>,
    previous: Option<LoadStatus>,
}

impl LoadGuard<'_> {
    fn disarm(&mut self) {
        self.previous = None;
    }
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            self.state.write().status = previous;
        }
    }
}

fn merge_blobs(blobs: &[String]) -> (Vec<UsageEntry>, LoadSummary) {
    let parsed: Vec<ParsedBlob> = blobs.par_iter().map(|blob| parse_blob(blob)).collect();

    let mut summary = LoadSummary {
        blobs: blobs.len(),
        ..LoadSummary::default()
    };
    let mut entries = Vec::new();
    for (idx, blob) in parsed.into_iter().enumerate() {
        summary.skipped_lines += blob.skipped_lines;
        if blob.is_malformed() {
            summary.malformed_blobs += 1;
            warn!(blob = idx, lines = blob.skipped_lines, "skipping blob with no decodable lines");
            continue;
        }
        entries.extend(blob.entries);
    }
    sort_chronologically(&mut entries);
    summary.entries = entries.len();
    (entries, summary)
}

/// Stable: valid instants ascending, then unparseable timestamps, then entries
/// without a timestamp.
fn sort_chronologically(entries: &mut [UsageEntry]) {
    entries.sort_by_key(|entry| match (entry.instant(), entry.timestamp()) {
        (Some(instant), _) => (0u8, Some(instant)),
        (None, Some(_)) => (1, None),
        (None, None) => (2, None),
    });
}

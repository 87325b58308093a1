use chrono::{DateTime, Duration as ChronoDuration, Utc};

use super::UsageAccumulator;
use crate::cost::CostCalculator;
use crate::types::{SessionUsage, UsageEntry, push_unique};

/// Inactivity longer than this closes a session.
pub const SESSION_GAP_MINUTES: i64 = 30;

/// Log lines carry no project identity, so every session gets this label.
pub const DEFAULT_PROJECT_PATH: &str = "Claude Code Sessions";

struct SessionAccumulator {
    session_id: String,
    last_activity: DateTime<Utc>,
    usage: UsageAccumulator,
    versions: Vec<String>,
}

impl SessionAccumulator {
    fn new(session_id: String, started: DateTime<Utc>) -> Self {
        SessionAccumulator {
            session_id,
            last_activity: started,
            usage: UsageAccumulator::default(),
            versions: Vec::new(),
        }
    }

    fn add_entry(&mut self, instant: DateTime<Utc>, entry: &UsageEntry, costs: &CostCalculator<'_>) {
        self.last_activity = instant;
        self.usage.add_entry(entry, costs);
        if let Some(version) = entry.version() {
            push_unique(&mut self.versions, version);
        }
    }

    fn finish(self) -> SessionUsage {
        let (tokens, total_cost, models) = self.usage.finish();
        SessionUsage {
            session_id: self.session_id,
            project_path: DEFAULT_PROJECT_PATH.to_string(),
            tokens,
            total_cost,
            models,
            versions: self.versions,
            last_activity: self.last_activity,
        }
    }
}

/// Reconstructs sessions from timestamp gaps: a new session starts whenever
/// more than [`SESSION_GAP_MINUTES`] pass without activity. Interleaved work
/// inside one window collapses into a single session. Rows are returned most
/// recent activity first.
pub fn aggregate_sessions(entries: &[UsageEntry], costs: &CostCalculator<'_>) -> Vec<SessionUsage> {
    let mut timed: Vec<(DateTime<Utc>, &UsageEntry)> = entries
        .iter()
        .filter_map(|entry| entry.instant().map(|instant| (instant, entry)))
        .collect();
    timed.sort_by_key(|(instant, _)| *instant);

    let gap = ChronoDuration::minutes(SESSION_GAP_MINUTES);
    let mut sessions: Vec<SessionUsage> = Vec::new();
    let mut current: Option<SessionAccumulator> = None;
    let mut counter = 0usize;

    for (instant, entry) in timed {
        let starts_new = current
            .as_ref()
            .map_or(true, |session| instant - session.last_activity > gap);
        if starts_new {
            if let Some(done) = current.take() {
                sessions.push(done.finish());
            }
            counter += 1;
            current = Some(SessionAccumulator::new(format!("session-{counter}"), instant));
        }
        if let Some(session) = current.as_mut() {
            session.add_entry(instant, entry, costs);
        }
    }
    if let Some(done) = current {
        sessions.push(done.finish());
    }

    sessions.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
    sessions
}

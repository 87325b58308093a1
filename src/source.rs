//! Where raw log text comes from.

use std::future::Future;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use rayon::prelude::*;
use thiserror::Error;
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
use tracing::{debug, warn};
use walkdir::WalkDir;

pub const PROJECTS_DIR: &str = "projects";

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("walking {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("log reader task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("watching data directories: {0}")]
    Watch(#[from] notify::Error),
    #[error("{0}")]
    Unavailable(String),
}

/// Supplies raw usage logs: one text blob per source file, in no particular
/// order. Implementations decide how `since` narrows the result.
pub trait LogSource {
    fn load_usage_entries(
        &self,
        since: Option<NaiveDate>,
    ) -> impl Future<Output = Result<Vec<String>, SourceError>> + Send;
}

/// Reads `<data dir>/projects/**/*.jsonl` from disk.
#[derive(Debug, Clone)]
pub struct FsLogSource {
    data_dirs: Vec<PathBuf>,
}

impl FsLogSource {
    pub fn new(data_dirs: Vec<PathBuf>) -> Self {
        FsLogSource { data_dirs }
    }
}

impl LogSource for FsLogSource {
    fn load_usage_entries(
        &self,
        since: Option<NaiveDate>,
    ) -> impl Future<Output = Result<Vec<String>, SourceError>> + Send {
        let data_dirs = self.data_dirs.clone();
        async move {
            match tokio::task::spawn_blocking(move || read_blobs(&data_dirs, since)).await {
                Ok(result) => result,
                Err(err) => Err(SourceError::Join(err)),
            }
        }
    }
}

fn read_blobs(data_dirs: &[PathBuf], since: Option<NaiveDate>) -> Result<Vec<String>, SourceError> {
    let files: Vec<PathBuf> = collect_jsonl_files(data_dirs)?
        .into_iter()
        .filter(|path| modified_on_or_after(path, since))
        .collect();
    debug!(files = files.len(), "reading usage logs");

    let blobs = files
        .par_iter()
        .filter_map(|path| match std::fs::read_to_string(path) {
            Ok(content) => Some(content),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "skipping unreadable log file");
                None
            }
        })
        .collect();
    Ok(blobs)
}

/// Missing data directories are skipped; an unreadable projects root is an error.
pub fn collect_jsonl_files(data_dirs: &[PathBuf]) -> Result<Vec<PathBuf>, SourceError> {
    let mut files = Vec::new();
    for dir in data_dirs {
        let project_root = dir.join(PROJECTS_DIR);
        if !project_root.exists() {
            debug!(path = %project_root.display(), "no projects directory");
            continue;
        }
        for entry in WalkDir::new(&project_root).follow_links(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) if err.depth() == 0 => {
                    return Err(SourceError::Walk {
                        path: project_root.clone(),
                        source: err,
                    });
                }
                Err(err) => {
                    warn!(error = %err, "skipping unreadable path under projects");
                    continue;
                }
            };
            if entry.file_type().is_file() && is_jsonl(entry.path()) {
                files.push(entry.into_path());
            }
        }
    }
    Ok(files)
}

fn is_jsonl(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("jsonl")
}

/// Files whose modification date cannot be read are kept.
fn modified_on_or_after(path: &Path, since: Option<NaiveDate>) -> bool {
    let Some(since) = since else { return true };
    match std::fs::metadata(path).and_then(|m| m.modified()) {
        Ok(modified) => DateTime::<Utc>::from(modified).date_naive() >= since,
        Err(_) => true,
    }
}

/// Watches every existing data directory and sends `()` whenever a `.jsonl`
/// file is created, modified or removed. Keep the watcher alive as long as the
/// receiver is in use.
pub fn watch_data_dirs(
    data_dirs: &[PathBuf],
) -> Result<(RecommendedWatcher, UnboundedReceiver<()>), SourceError> {
    let (tx, rx) = unbounded_channel();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        let event = match res {
            Ok(event) => event,
            Err(err) => {
                warn!(error = %err, "file watch error");
                return;
            }
        };
        let relevant = matches!(
            event.kind,
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
        ) && event.paths.iter().any(|p| is_jsonl(p));
        if relevant {
            let _ = tx.send(());
        }
    })?;

    for dir in data_dirs.iter().filter(|d| d.exists()) {
        watcher.watch(dir, RecursiveMode::Recursive)?;
        debug!(path = %dir.display(), "watching data directory");
    }

    Ok((watcher, rx))
}

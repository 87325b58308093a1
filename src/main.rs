mod config;
mod output;
mod tui;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use claudedeck::source::watch_data_dirs;
use claudedeck::{CostMode, FsLogSource, PricingTable, ReportStore, StoreError};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{CommandConfig, DEFAULT_REFRESH_SECONDS, Order};
use crate::output::{OutputOptions, ReportKind};
use crate::tui::{Dashboard, DashboardView};

/// File events arriving within this window collapse into one reload.
const WATCH_DEBOUNCE: Duration = Duration::from_millis(100);
const INPUT_POLL: Duration = Duration::from_millis(100);
const BLOCK_CHECK: Duration = Duration::from_secs(1);

#[derive(Parser, Debug)]
#[command(name = "claudedeck", version, about = "Usage and cost reports from local Claude Code JSONL logs")]
struct Cli {
    /// Claude data dir (defaults: ~/.config/claude, ~/.claude). You can repeat this flag.
    #[arg(long = "data-dir", global = true)]
    data_dirs: Vec<PathBuf>,

    /// Optional config file (JSON). If omitted, tries ./claudedeck.json then the user config dir
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// auto: costUSD when present, else from tokens; calculate: always from tokens; display: costUSD only
    #[arg(long, global = true, value_enum)]
    cost_mode: Option<CostMode>,

    /// Skip log files last modified before this date (YYYY-MM-DD)
    #[arg(long, global = true)]
    since: Option<String>,

    /// Timezone for displayed times (IANA name, e.g. UTC, America/Los_Angeles)
    #[arg(long, global = true)]
    timezone: Option<String>,

    /// Locale for number formatting (e.g. en, fr, de). Falls back to en.
    #[arg(long, global = true)]
    locale: Option<String>,

    /// Output JSON instead of tables
    #[arg(long, global = true, num_args = 0..=1, default_missing_value = "true")]
    json: Option<bool>,

    /// Output CSV instead of tables
    #[arg(long, global = true, num_args = 0..=1, default_missing_value = "true")]
    csv: Option<bool>,

    /// Compact table (drop cache columns)
    #[arg(long, global = true, num_args = 0..=1, default_missing_value = "true")]
    compact: Option<bool>,

    /// Display order of rows
    #[arg(long, global = true, value_enum)]
    order: Option<Order>,

    /// JSON file of per-million-token prices overriding the bundled table
    #[arg(long, global = true)]
    pricing_file: Option<PathBuf>,

    /// Debug logging on stderr (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Default: usage aggregated by date
    Daily,
    /// Usage aggregated by month
    Monthly,
    /// Sessions reconstructed from 30-minute inactivity gaps
    Sessions,
    /// 5-hour billing blocks
    Blocks,
    /// Summary of the active 5-hour block
    Current,
    /// Keep reloading on log changes and on a timer
    Watch(WatchArgs),
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Daily => "daily",
            Command::Monthly => "monthly",
            Command::Sessions => "sessions",
            Command::Blocks => "blocks",
            Command::Current => "current",
            Command::Watch(_) => "watch",
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
struct WatchArgs {
    /// Reload interval when no file changes arrive (default 300)
    #[arg(long)]
    refresh_seconds: Option<u64>,

    /// Render as a TUI dashboard (q or Esc to quit)
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    tui: Option<bool>,
}

struct Settings {
    output: OutputOptions,
    since: Option<NaiveDate>,
    refresh_seconds: u64,
    tui: bool,
    pricing_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let file_cfg = config::load_config(cli.config.as_ref())?;
    let command = cli.command.clone().unwrap_or(Command::Daily);
    let settings = resolve_settings(
        &cli,
        &command,
        file_cfg.command(command.name()),
        file_cfg.defaults.as_ref(),
    )?;

    let data_dirs = config::resolve_data_dirs(&cli.data_dirs, file_cfg.data_dirs.as_deref())?;
    let pricing = load_pricing(settings.pricing_file.as_deref())?;
    debug!(models = pricing.len(), dirs = %display_paths(&data_dirs), "starting");

    let store = ReportStore::new(
        FsLogSource::new(data_dirs.clone()),
        pricing,
        settings.output.cost_mode,
    );
    let summary = store
        .load(settings.since)
        .await
        .context("Failed to load usage logs")?;
    info!(
        entries = summary.entries,
        skipped_lines = summary.skipped_lines,
        malformed_blobs = summary.malformed_blobs,
        "usage loaded"
    );

    if let Command::Watch(_) = command {
        return run_watch(&store, &data_dirs, &settings).await;
    }

    if summary.entries == 0 {
        println!(
            "No usage yet. Looked for JSONL logs under: {}",
            display_paths(&data_dirs)
        );
        return Ok(());
    }

    let reports = store.reports();
    match command {
        Command::Daily => output::print_report(ReportKind::Daily, &reports, &settings.output),
        Command::Monthly => output::print_report(ReportKind::Monthly, &reports, &settings.output),
        Command::Sessions => output::print_report(ReportKind::Sessions, &reports, &settings.output),
        Command::Blocks => output::print_report(ReportKind::Blocks, &reports, &settings.output),
        Command::Current => {
            output::print_current(reports.current_block.as_ref(), Utc::now(), &settings.output)
        }
        Command::Watch(_) => Ok(()),
    }
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn resolve_settings(
    cli: &Cli,
    command: &Command,
    cmd: Option<&CommandConfig>,
    defaults: Option<&CommandConfig>,
) -> Result<Settings> {
    let timezone = config::resolve_string(
        cli.timezone.as_ref(),
        cmd.and_then(|c| c.timezone.as_ref()),
        defaults.and_then(|d| d.timezone.as_ref()),
    );
    let locale = config::resolve_string(
        cli.locale.as_ref(),
        cmd.and_then(|c| c.locale.as_ref()),
        defaults.and_then(|d| d.locale.as_ref()),
    );
    let since = config::resolve_string(
        cli.since.as_ref(),
        cmd.and_then(|c| c.since.as_ref()),
        defaults.and_then(|d| d.since.as_ref()),
    );
    let watch_args = match command {
        Command::Watch(args) => args.clone(),
        _ => WatchArgs::default(),
    };

    let output = OutputOptions {
        json: config::resolve_value(cli.json, cmd.and_then(|c| c.json), defaults.and_then(|d| d.json), false),
        csv: config::resolve_value(cli.csv, cmd.and_then(|c| c.csv), defaults.and_then(|d| d.csv), false),
        compact: config::resolve_value(
            cli.compact,
            cmd.and_then(|c| c.compact),
            defaults.and_then(|d| d.compact),
            false,
        ),
        order: config::resolve_value(
            cli.order,
            cmd.and_then(|c| c.order),
            defaults.and_then(|d| d.order),
            Order::Desc,
        ),
        cost_mode: config::resolve_value(
            cli.cost_mode,
            cmd.and_then(|c| c.cost_mode),
            defaults.and_then(|d| d.cost_mode),
            CostMode::Auto,
        ),
        timezone: config::parse_timezone(timezone.as_deref())?,
        locale: config::resolve_locale(locale.as_deref()),
    };

    Ok(Settings {
        output,
        since: config::parse_date_opt(since.as_deref())?,
        refresh_seconds: config::resolve_value(
            watch_args.refresh_seconds,
            cmd.and_then(|c| c.refresh_seconds),
            defaults.and_then(|d| d.refresh_seconds),
            DEFAULT_REFRESH_SECONDS,
        )
        .max(1),
        tui: config::resolve_value(watch_args.tui, cmd.and_then(|c| c.tui), defaults.and_then(|d| d.tui), false),
        pricing_file: cli
            .pricing_file
            .clone()
            .or_else(|| cmd.and_then(|c| c.pricing_file.clone()))
            .or_else(|| defaults.and_then(|d| d.pricing_file.clone()))
            .map(|p| config::expand_tilde(&p)),
    })
}

fn load_pricing(overrides: Option<&Path>) -> Result<PricingTable> {
    let bundled = PricingTable::bundled().clone();
    let Some(path) = overrides else {
        return Ok(bundled);
    };
    let custom = PricingTable::from_file(path)
        .with_context(|| format!("Failed to load pricing file {}", path.display()))?;
    if custom.is_empty() {
        warn!(path = %path.display(), "pricing file lists no models; using bundled rates");
    }
    debug!(path = %path.display(), models = custom.len(), "pricing overrides loaded");
    Ok(bundled.with_overrides(custom))
}

async fn run_watch(store: &ReportStore<FsLogSource>, data_dirs: &[PathBuf], settings: &Settings) -> Result<()> {
    let (_watcher, mut changes) = watch_data_dirs(data_dirs)?;
    let mut dashboard = if settings.tui { Some(Dashboard::enter()?) } else { None };

    let mut refresh = tokio::time::interval(Duration::from_secs(settings.refresh_seconds));
    refresh.tick().await;
    let mut input = tokio::time::interval(INPUT_POLL);
    let mut rollover = tokio::time::interval(BLOCK_CHECK);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut stale = true;
    loop {
        if stale || dashboard.is_some() {
            redraw(store, dashboard.as_mut(), settings)?;
            stale = false;
        }

        tokio::select! {
            _ = &mut ctrl_c => break,
            change = changes.recv() => {
                if change.is_none() {
                    break;
                }
                tokio::time::sleep(WATCH_DEBOUNCE).await;
                while changes.try_recv().is_ok() {}
                debug!("log change detected");
                reload(store, settings.since).await;
                stale = true;
            }
            _ = refresh.tick() => {
                reload(store, settings.since).await;
                stale = true;
            }
            _ = rollover.tick() => {
                if store.expire_current_block(Utc::now()) {
                    debug!("active block ended");
                    stale = true;
                }
            }
            _ = input.tick(), if dashboard.is_some() => {
                if let Some(d) = dashboard.as_ref() {
                    if d.quit_requested()? {
                        break;
                    }
                }
            }
        }
    }
    Ok(())
}

async fn reload(store: &ReportStore<FsLogSource>, since: Option<NaiveDate>) {
    match store.load(since).await {
        Ok(summary) => debug!(entries = summary.entries, "reloaded"),
        Err(StoreError::LoadInProgress) => debug!("reload skipped: load already running"),
        Err(err) => warn!(error = %err, "reload failed; keeping previous reports"),
    }
}

fn redraw(store: &ReportStore<FsLogSource>, dashboard: Option<&mut Dashboard>, settings: &Settings) -> Result<()> {
    let reports = store.reports();
    let status = store.status();
    let now = Utc::now();
    match dashboard {
        Some(d) => d.draw(&DashboardView {
            reports: &reports,
            status: &status,
            last_load: store.last_load_time(),
            now,
            timezone: settings.output.timezone,
            locale: settings.output.locale,
        }),
        None => {
            output::print_watch_summary(&reports, &status, store.last_load_time(), now, &settings.output);
            Ok(())
        }
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    let parts: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
    parts.join(", ")
}

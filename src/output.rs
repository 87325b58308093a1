use std::io::Write;

use anyhow::Result;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use claudedeck::format::{
    format_cost, format_currency, format_models_display, format_time_remaining,
    format_token_count, format_tokens,
};
use claudedeck::{
    BlockUsage, CostMode, DailyUsage, LoadStatus, MonthlyUsage, ReportTotals, Reports,
    SessionUsage, TokenTotals, UsageRow,
};
use colored::Colorize;
use crossterm::terminal::size as terminal_size;
use num_format::Locale;
use serde::Serialize;

use crate::config::Order;

const COMPACT_BELOW_WIDTH: u16 = 120;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReportKind {
    Daily,
    Monthly,
    Sessions,
    Blocks,
}

impl ReportKind {
    fn as_str(self) -> &'static str {
        match self {
            ReportKind::Daily => "daily",
            ReportKind::Monthly => "monthly",
            ReportKind::Sessions => "sessions",
            ReportKind::Blocks => "blocks",
        }
    }
}

#[derive(Clone, Copy)]
pub struct OutputOptions {
    pub json: bool,
    pub csv: bool,
    pub compact: bool,
    pub order: Order,
    pub cost_mode: CostMode,
    pub timezone: Tz,
    pub locale: Locale,
}

#[derive(Serialize)]
struct JsonReport<'a, R: Serialize> {
    kind: &'static str,
    timezone: String,
    cost_mode: CostMode,
    rows: Vec<&'a R>,
    totals: ReportTotals,
    #[serde(skip_serializing_if = "Option::is_none")]
    current_block: Option<&'a BlockUsage>,
}

pub fn print_report(kind: ReportKind, reports: &Reports, opts: &OutputOptions) -> Result<()> {
    match kind {
        ReportKind::Daily => emit(kind, &reports.daily, None, opts, daily_table, daily_csv),
        ReportKind::Monthly => emit(kind, &reports.monthly, None, opts, monthly_table, monthly_csv),
        ReportKind::Sessions => emit(kind, &reports.sessions, None, opts, sessions_table, sessions_csv),
        ReportKind::Blocks => emit(
            kind,
            &reports.blocks,
            reports.current_block.as_ref(),
            opts,
            blocks_table,
            blocks_csv,
        ),
    }
}

type TableFn<R> = fn(&[&R], &ReportTotals, &OutputOptions, bool) -> SimpleTable;
type CsvFn<R> = fn(&R) -> Vec<String>;

fn emit<R: UsageRow + Serialize>(
    kind: ReportKind,
    rows: &[R],
    current_block: Option<&BlockUsage>,
    opts: &OutputOptions,
    table: TableFn<R>,
    csv_record: CsvFn<R>,
) -> Result<()> {
    let totals = ReportTotals::from_rows(rows);
    let ordered = ordered_rows(rows, opts.order);

    if opts.json {
        let report = JsonReport {
            kind: kind.as_str(),
            timezone: opts.timezone.name().to_string(),
            cost_mode: opts.cost_mode,
            rows: ordered,
            totals,
            current_block,
        };
        return write_json(&report);
    }
    if opts.csv {
        let mut out = std::io::stdout().lock();
        writeln!(out, "{}", csv_header(kind).join(","))?;
        for row in ordered {
            let record: Vec<String> = csv_record(row).iter().map(|f| csv_escape(f)).collect();
            writeln!(out, "{}", record.join(","))?;
        }
        return Ok(());
    }

    let compact = opts.compact || terminal_width() < COMPACT_BELOW_WIDTH;
    let title = match kind {
        ReportKind::Daily => "Daily usage",
        ReportKind::Monthly => "Monthly usage",
        ReportKind::Sessions => "Session usage",
        ReportKind::Blocks => "5-hour block usage",
    };
    println!("{}", title.bold());
    table(&ordered, &totals, opts, compact).print();
    Ok(())
}

fn ordered_rows<R>(rows: &[R], order: Order) -> Vec<&R> {
    match order {
        Order::Desc => rows.iter().collect(),
        Order::Asc => rows.iter().rev().collect(),
    }
}

pub fn write_json<T: Serialize>(value: &T) -> Result<()> {
    let mut out = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}

fn daily_table(rows: &[&DailyUsage], totals: &ReportTotals, opts: &OutputOptions, compact: bool) -> SimpleTable {
    period_table("Date", rows, totals, opts, compact)
}

fn monthly_table(rows: &[&MonthlyUsage], totals: &ReportTotals, opts: &OutputOptions, compact: bool) -> SimpleTable {
    period_table("Month", rows, totals, opts, compact)
}

fn period_table<R: UsageRow>(
    label: &str,
    rows: &[&R],
    totals: &ReportTotals,
    opts: &OutputOptions,
    compact: bool,
) -> SimpleTable {
    let mut table = SimpleTable::new(token_headers(label, &[], compact)).header_style(|s| s.cyan().bold());
    for row in rows {
        let mut cells = vec![row.key()];
        cells.extend(token_cells(row.tokens(), row.total_cost(), &opts.locale, compact));
        cells.push(models_cell(row.models()));
        table.add_row(cells);
    }
    table.set_footer(footer(totals, 0, &opts.locale, compact));
    table
}

fn sessions_table(rows: &[&SessionUsage], totals: &ReportTotals, opts: &OutputOptions, compact: bool) -> SimpleTable {
    let mut table = SimpleTable::new(token_headers("Session", &["Last Activity"], compact))
        .header_style(|s| s.cyan().bold());
    for row in rows {
        let mut cells = vec![row.session_id.clone(), local_time(row.last_activity, &opts.timezone)];
        cells.extend(token_cells(&row.tokens, row.total_cost, &opts.locale, compact));
        cells.push(models_cell(&row.models));
        table.add_row(cells);
    }
    table.set_footer(footer(totals, 1, &opts.locale, compact));
    table
}

fn blocks_table(rows: &[&BlockUsage], totals: &ReportTotals, opts: &OutputOptions, compact: bool) -> SimpleTable {
    let mut table = SimpleTable::new(token_headers("Block Start", &["Block End"], compact))
        .header_style(|s| s.cyan().bold());
    for row in rows {
        let start = local_time(row.start_time, &opts.timezone);
        let start = if row.is_active {
            format!("{start} {}", "(active)".green())
        } else {
            start
        };
        let mut cells = vec![start, local_time(row.end_time, &opts.timezone)];
        cells.extend(token_cells(&row.tokens, row.total_cost, &opts.locale, compact));
        cells.push(models_cell(&row.models));
        table.add_row(cells);
    }
    table.set_footer(footer(totals, 1, &opts.locale, compact));
    table
}

fn token_headers(label: &str, extra: &[&str], compact: bool) -> Vec<String> {
    let mut headers = vec![label.to_string()];
    headers.extend(extra.iter().map(|h| h.to_string()));
    let tokens: &[&str] = if compact {
        &["In", "Out", "Total", "Cost"]
    } else {
        &["Input", "Output", "C/W", "C/R", "Total", "Cost"]
    };
    headers.extend(tokens.iter().map(|h| h.to_string()));
    headers.push("Models".to_string());
    headers
}

fn token_cells(tokens: &TokenTotals, cost: f64, locale: &Locale, compact: bool) -> Vec<String> {
    if compact {
        vec![
            format_token_count(tokens.input_tokens),
            format_token_count(tokens.output_tokens),
            format_token_count(tokens.total_tokens),
            format_currency(cost),
        ]
    } else {
        vec![
            format_tokens(tokens.input_tokens, locale),
            format_tokens(tokens.output_tokens, locale),
            format_tokens(tokens.cache_creation_tokens, locale),
            format_tokens(tokens.cache_read_tokens, locale),
            format_tokens(tokens.total_tokens, locale),
            format_cost(cost),
        ]
    }
}

fn footer(totals: &ReportTotals, blank_after_label: usize, locale: &Locale, compact: bool) -> Vec<String> {
    let mut cells = vec!["Total".yellow().bold().to_string()];
    cells.extend(std::iter::repeat_n(String::new(), blank_after_label));
    cells.extend(
        token_cells(&totals.tokens, totals.total_cost, locale, compact)
            .into_iter()
            .map(|c| c.yellow().to_string()),
    );
    cells.push(String::new());
    cells
}

fn models_cell(models: &[String]) -> String {
    if models.is_empty() {
        "-".into()
    } else {
        format_models_display(models)
    }
}

fn local_time(instant: DateTime<Utc>, tz: &Tz) -> String {
    instant.with_timezone(tz).format("%Y-%m-%d %H:%M").to_string()
}

const TOKEN_FIELDS: [&str; 5] = [
    "input_tokens",
    "output_tokens",
    "cache_creation_tokens",
    "cache_read_tokens",
    "total_tokens",
];

fn csv_header(kind: ReportKind) -> Vec<&'static str> {
    let (leading, trailing): (&[&str], &[&str]) = match kind {
        ReportKind::Daily => (&["date"], &["total_cost", "models"]),
        ReportKind::Monthly => (&["month"], &["total_cost", "models"]),
        ReportKind::Sessions => (
            &["session_id", "project_path", "last_activity"],
            &["total_cost", "models", "versions"],
        ),
        ReportKind::Blocks => (
            &["block_id", "start_time", "end_time"],
            &["total_cost", "models", "is_active"],
        ),
    };
    leading
        .iter()
        .chain(TOKEN_FIELDS.iter())
        .chain(trailing.iter())
        .copied()
        .collect()
}

fn token_fields(tokens: &TokenTotals) -> [String; 5] {
    [
        tokens.input_tokens.to_string(),
        tokens.output_tokens.to_string(),
        tokens.cache_creation_tokens.to_string(),
        tokens.cache_read_tokens.to_string(),
        tokens.total_tokens.to_string(),
    ]
}

fn daily_csv(row: &DailyUsage) -> Vec<String> {
    period_csv(row)
}

fn monthly_csv(row: &MonthlyUsage) -> Vec<String> {
    period_csv(row)
}

fn period_csv<R: UsageRow>(row: &R) -> Vec<String> {
    let mut fields = vec![row.key()];
    fields.extend(token_fields(row.tokens()));
    fields.push(row.total_cost().to_string());
    fields.push(row.models().join("; "));
    fields
}

fn sessions_csv(row: &SessionUsage) -> Vec<String> {
    let mut fields = vec![
        row.session_id.clone(),
        row.project_path.clone(),
        row.last_activity.to_rfc3339(),
    ];
    fields.extend(token_fields(&row.tokens));
    fields.push(row.total_cost.to_string());
    fields.push(row.models.join("; "));
    fields.push(row.versions.join("; "));
    fields
}

fn blocks_csv(row: &BlockUsage) -> Vec<String> {
    let mut fields = vec![
        row.block_id.clone(),
        row.start_time.to_rfc3339(),
        row.end_time.to_rfc3339(),
    ];
    fields.extend(token_fields(&row.tokens));
    fields.push(row.total_cost.to_string());
    fields.push(row.models.join("; "));
    fields.push(row.is_active.to_string());
    fields
}

fn csv_escape(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// One-screen summary of the active block.
pub fn print_current(block: Option<&BlockUsage>, now: DateTime<Utc>, opts: &OutputOptions) -> Result<()> {
    if opts.json {
        return write_json(&block);
    }
    for line in current_block_lines(block, now, &opts.timezone) {
        println!("{line}");
    }
    Ok(())
}

fn current_block_lines(block: Option<&BlockUsage>, now: DateTime<Utc>, tz: &Tz) -> Vec<String> {
    let Some(block) = block.filter(|b| b.tokens.total_tokens > 0) else {
        return vec!["No active block".dimmed().to_string()];
    };
    let mut lines = vec![
        format!(
            "{} {} - {} ({})",
            "Current block".bold(),
            local_time(block.start_time, tz),
            block.end_time.with_timezone(tz).format("%H:%M"),
            tz.name()
        ),
        format!(
            "  {} tokens  {} cost",
            format_token_count(block.tokens.total_tokens).cyan().bold(),
            format_currency(block.total_cost).yellow().bold()
        ),
    ];
    if !block.models.is_empty() {
        lines.push(format!("  Models: {}", format_models_display(&block.models)));
    }
    lines.push(format!("  {}", format_time_remaining(block, now)));
    lines
}

/// Redraws the plain watch view: active block, today's row and load state.
pub fn print_watch_summary(
    reports: &Reports,
    status: &LoadStatus,
    last_load: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    opts: &OutputOptions,
) {
    print!("\x1B[2J\x1B[H");
    for line in current_block_lines(reports.current_block.as_ref(), now, &opts.timezone) {
        println!("{line}");
    }
    println!();

    let today = now.format("%Y-%m-%d").to_string();
    match reports.daily.iter().find(|row| row.date == today) {
        Some(row) => println!(
            "{} {} tokens  {}  {}",
            "Today".bold(),
            format_tokens(row.tokens.total_tokens, &opts.locale),
            format_cost(row.total_cost),
            models_cell(&row.models)
        ),
        None => println!("{} {}", "Today".bold(), "no usage yet".dimmed()),
    }
    println!();

    let updated = last_load
        .map(|t| t.with_timezone(&opts.timezone).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "never".into());
    match status {
        LoadStatus::Error(message) => println!(
            "{} {}",
            format!("Last update failed: {message}").red(),
            format!("(showing data from {updated})").dimmed()
        ),
        _ => println!("{}", format!("Updated {updated} · Ctrl+C to quit").dimmed()),
    }
}

fn terminal_width() -> u16 {
    terminal_size().map(|(w, _)| w).unwrap_or(COMPACT_BELOW_WIDTH)
}

/// Box-drawn table; cell widths ignore ANSI color codes.
pub struct SimpleTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    header_style: Option<fn(&str) -> colored::ColoredString>,
    footer: Option<Vec<String>>,
}

impl SimpleTable {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
            header_style: None,
            footer: None,
        }
    }

    pub fn header_style(mut self, f: fn(&str) -> colored::ColoredString) -> Self {
        self.header_style = Some(f);
        self
    }

    pub fn add_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    pub fn set_footer(&mut self, footer: Vec<String>) {
        self.footer = Some(footer);
    }

    pub fn print(&self) {
        print!("{}", self.render());
    }

    fn render(&self) -> String {
        let widths = self.column_widths();
        let mut out = String::new();

        out.push_str(&border(&widths, '┌', '┬', '┐'));
        let header: Vec<String> = self
            .headers
            .iter()
            .enumerate()
            .map(|(i, h)| {
                let padded = format!("{:width$}", h, width = widths[i]);
                match self.header_style {
                    Some(style) => style(&padded).to_string(),
                    None => padded,
                }
            })
            .collect();
        out.push_str(&line(&header, &widths));
        out.push_str(&border(&widths, '├', '┼', '┤'));
        for row in &self.rows {
            out.push_str(&line(row, &widths));
        }
        if let Some(footer) = &self.footer {
            out.push_str(&border(&widths, '├', '┼', '┤'));
            out.push_str(&line(footer, &widths));
        }
        out.push_str(&border(&widths, '└', '┴', '┘'));
        out
    }

    fn column_widths(&self) -> Vec<usize> {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.chars().count()).collect();
        for row in self.rows.iter().chain(self.footer.iter()) {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(visible_width(cell));
            }
        }
        widths
    }
}

fn border(widths: &[usize], left: char, mid: char, right: char) -> String {
    let segments: Vec<String> = widths.iter().map(|w| "─".repeat(w + 2)).collect();
    format!("{left}{}{right}\n", segments.join(&mid.to_string()))
}

fn line(cells: &[String], widths: &[usize]) -> String {
    let mut out = String::from("│");
    for (cell, width) in cells.iter().zip(widths) {
        let pad = width.saturating_sub(visible_width(cell));
        out.push_str(&format!(" {cell}{} │", " ".repeat(pad)));
    }
    out.push('\n');
    out
}

fn visible_width(s: &str) -> usize {
    strip_ansi(s).chars().count()
}

fn strip_ansi(s: &str) -> String {
    let mut result = String::new();
    let mut in_escape = false;
    for c in s.chars() {
        if c == '\x1b' {
            in_escape = true;
        } else if in_escape {
            if c == 'm' {
                in_escape = false;
            }
        } else {
            result.push(c);
        }
    }
    result
}

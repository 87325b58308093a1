use std::io::Stdout;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use claudedeck::format::{
    format_cost, format_currency, format_models_display, format_time_remaining,
    format_token_count, format_tokens,
};
use claudedeck::{LoadStatus, Reports};
use crossterm::{
    ExecutableCommand,
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use num_format::Locale;
use ratatui::{
    Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block as TuiBlock, Borders, Cell, Paragraph, Row as TuiRow, Table as TuiTable},
};

const MAX_BLOCK_ROWS: usize = 12;

pub struct DashboardView<'a> {
    pub reports: &'a Reports,
    pub status: &'a LoadStatus,
    pub last_load: Option<DateTime<Utc>>,
    pub now: DateTime<Utc>,
    pub timezone: Tz,
    pub locale: Locale,
}

/// Alternate-screen dashboard; the terminal is restored on drop.
pub struct Dashboard {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl Dashboard {
    pub fn enter() -> Result<Self> {
        let mut stdout = std::io::stdout();
        enable_raw_mode().context("enable raw mode")?;
        stdout
            .execute(EnterAlternateScreen)
            .context("enter alternate screen")?;
        let mut terminal = Terminal::new(CrosstermBackend::new(stdout)).context("init terminal")?;
        terminal.clear().ok();
        Ok(Dashboard { terminal })
    }

    pub fn draw(&mut self, view: &DashboardView<'_>) -> Result<()> {
        self.terminal.draw(|f| render(f, view)).context("draw dashboard")?;
        Ok(())
    }

    /// Drains pending key events without blocking.
    pub fn quit_requested(&self) -> Result<bool> {
        while event::poll(Duration::ZERO)? {
            if let Event::Key(k) = event::read()? {
                if k.kind != KeyEventKind::Press {
                    continue;
                }
                let ctrl_c = k.code == KeyCode::Char('c') && k.modifiers.contains(KeyModifiers::CONTROL);
                if ctrl_c || matches!(k.code, KeyCode::Char('q') | KeyCode::Esc) {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        disable_raw_mode().ok();
        let _ = self.terminal.backend_mut().execute(LeaveAlternateScreen);
        let _ = self.terminal.show_cursor();
    }
}

fn render(f: &mut ratatui::Frame<'_>, view: &DashboardView<'_>) {
    let chunks = Layout::default()
        .constraints([Constraint::Length(5), Constraint::Min(0), Constraint::Length(1)])
        .split(f.size());

    f.render_widget(current_block_panel(view), chunks[0]);
    f.render_widget(blocks_table(view), chunks[1]);
    f.render_widget(status_line(view), chunks[2]);
}

fn current_block_panel(view: &DashboardView<'_>) -> Paragraph<'static> {
    let lines = match view
        .reports
        .current_block
        .as_ref()
        .filter(|b| b.tokens.total_tokens > 0)
    {
        Some(block) => vec![
            Line::from(vec![
                Span::styled(
                    format!("{} tokens", format_token_count(block.tokens.total_tokens)),
                    Style::default().add_modifier(Modifier::BOLD),
                ),
                Span::raw("   "),
                Span::styled(format_currency(block.total_cost), Style::default().fg(Color::Yellow)),
            ]),
            Line::from(format!("Models: {}", format_models_display(&block.models))),
            Line::from(format_time_remaining(block, view.now)),
        ],
        None => vec![Line::from(Span::styled(
            "No activity in current block",
            Style::default().fg(Color::DarkGray),
        ))],
    };
    Paragraph::new(lines).block(
        TuiBlock::default()
            .borders(Borders::ALL)
            .title(Span::raw("Current block")),
    )
}

fn blocks_table(view: &DashboardView<'_>) -> TuiTable<'static> {
    let header = ["Block start", "Input", "Output", "Total", "Cost", "Models"];
    let body: Vec<TuiRow> = view
        .reports
        .blocks
        .iter()
        .take(MAX_BLOCK_ROWS)
        .map(|b| {
            let style = if b.is_active {
                Style::default().fg(Color::Green)
            } else {
                Style::default()
            };
            TuiRow::new(vec![
                Cell::from(b.start_time.with_timezone(&view.timezone).format("%Y-%m-%d %H:%M").to_string()),
                Cell::from(format_tokens(b.tokens.input_tokens, &view.locale)),
                Cell::from(format_tokens(b.tokens.output_tokens, &view.locale)),
                Cell::from(format_tokens(b.tokens.total_tokens, &view.locale)),
                Cell::from(format_cost(b.total_cost)),
                Cell::from(format_models_display(&b.models)),
            ])
            .style(style)
        })
        .collect();

    TuiTable::new(
        body,
        [
            Constraint::Length(17),
            Constraint::Length(12),
            Constraint::Length(12),
            Constraint::Length(12),
            Constraint::Length(10),
            Constraint::Min(10),
        ],
    )
    .header(
        TuiRow::new(header.iter().map(|h| Cell::from(*h)))
            .style(Style::default().add_modifier(Modifier::BOLD)),
    )
    .block(
        TuiBlock::default()
            .borders(Borders::ALL)
            .title(Span::raw(format!("5-hour blocks ({})", view.timezone.name()))),
    )
}

fn status_line(view: &DashboardView<'_>) -> Paragraph<'static> {
    let updated = view
        .last_load
        .map(|t| t.with_timezone(&view.timezone).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "never".into());
    let line = match view.status {
        LoadStatus::Error(message) => Line::from(Span::styled(
            format!("Last update failed: {message} (showing data from {updated}) · q to quit"),
            Style::default().fg(Color::Red),
        )),
        LoadStatus::Loading => Line::from("Loading… · q to quit"),
        _ => Line::from(Span::styled(
            format!("Updated {updated} · q to quit"),
            Style::default().fg(Color::DarkGray),
        )),
    };
    Paragraph::new(line)
}

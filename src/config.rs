use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use chrono_tz::Tz;
use clap::ValueEnum;
use claudedeck::CostMode;
use directories::ProjectDirs;
use jsonschema::{Draft, JSONSchema};
use num_format::Locale;
use once_cell::sync::OnceCell;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

pub const DEFAULT_REFRESH_SECONDS: u64 = 300;
const CONFIG_FILE_NAME: &str = "claudedeck.json";

static CONFIG_SCHEMA: OnceCell<JSONSchema> = OnceCell::new();
static CONFIG_SCHEMA_JSON: OnceCell<Value> = OnceCell::new();

#[derive(Copy, Clone, Debug, ValueEnum, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    Asc,
    #[default]
    Desc,
}

/// Per-command settings; `defaults` uses the same shape.
#[derive(Debug, Default, Deserialize)]
pub struct CommandConfig {
    pub json: Option<bool>,
    pub csv: Option<bool>,
    pub compact: Option<bool>,
    pub cost_mode: Option<CostMode>,
    pub timezone: Option<String>,
    pub locale: Option<String>,
    pub order: Option<Order>,
    pub since: Option<String>,
    pub refresh_seconds: Option<u64>,
    pub tui: Option<bool>,
    pub pricing_file: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CommandConfigs {
    pub daily: Option<CommandConfig>,
    pub monthly: Option<CommandConfig>,
    pub sessions: Option<CommandConfig>,
    pub blocks: Option<CommandConfig>,
    pub current: Option<CommandConfig>,
    pub watch: Option<CommandConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub data_dirs: Option<Vec<PathBuf>>,
    pub defaults: Option<CommandConfig>,
    pub commands: Option<CommandConfigs>,
}

impl FileConfig {
    pub fn command(&self, name: &str) -> Option<&CommandConfig> {
        let commands = self.commands.as_ref()?;
        match name {
            "daily" => commands.daily.as_ref(),
            "monthly" => commands.monthly.as_ref(),
            "sessions" => commands.sessions.as_ref(),
            "blocks" => commands.blocks.as_ref(),
            "current" => commands.current.as_ref(),
            "watch" => commands.watch.as_ref(),
            _ => None,
        }
    }
}

pub fn load_config(path: Option<&PathBuf>) -> Result<FileConfig> {
    let candidate = match path {
        Some(p) => Some(p.clone()),
        None => default_config_path(),
    };
    let Some(path) = candidate else {
        return Ok(FileConfig::default());
    };
    debug!(path = %path.display(), "loading config");

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    validate_config(&value)?;
    let cfg: FileConfig = serde_json::from_value(value)
        .with_context(|| format!("Failed to deserialize config file {}", path.display()))?;
    Ok(cfg)
}

fn default_config_path() -> Option<PathBuf> {
    let cwd = PathBuf::from(CONFIG_FILE_NAME);
    if cwd.exists() {
        return Some(cwd);
    }
    let dirs = ProjectDirs::from("", "", "claudedeck")?;
    let path = dirs.config_dir().join("config.json");
    path.exists().then_some(path)
}

pub fn validate_config(value: &Value) -> Result<()> {
    let schema_value = CONFIG_SCHEMA_JSON.get_or_try_init(|| {
        let schema_str = include_str!("../config-schema.json");
        serde_json::from_str(schema_str).context("parsing config schema")
    })?;
    let schema = CONFIG_SCHEMA.get_or_try_init(|| {
        JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(schema_value)
            .map_err(|e| anyhow!("compiling config schema: {e}"))
    })?;

    if let Err(errors) = schema.validate(value) {
        let mut msg = String::from("Config validation failed:\n");
        for err in errors {
            msg.push_str(&format!(" - {} at {}\n", err, err.instance_path));
        }
        anyhow::bail!(msg.trim_end().to_string());
    }
    Ok(())
}

pub fn resolve_value<T>(cli: Option<T>, cmd: Option<T>, defaults: Option<T>, fallback: T) -> T {
    cli.or(cmd).or(defaults).unwrap_or(fallback)
}

pub fn resolve_string(
    cli: Option<&String>,
    cmd: Option<&String>,
    defaults: Option<&String>,
) -> Option<String> {
    cli.or(cmd).or(defaults).cloned()
}

pub fn resolve_locale(raw: Option<&str>) -> Locale {
    match raw {
        Some("en") | Some("en-US") | Some("en-GB") | None => Locale::en,
        Some("fr") | Some("fr-FR") => Locale::fr,
        Some("de") | Some("de-DE") => Locale::de,
        Some("es") | Some("es-ES") => Locale::es,
        Some("it") | Some("it-IT") => Locale::it,
        Some("ja") | Some("ja-JP") => Locale::ja,
        _ => Locale::en,
    }
}

pub fn parse_timezone(raw: Option<&str>) -> Result<Tz> {
    let tz_str = raw.unwrap_or("UTC");
    tz_str.parse::<Tz>().map_err(|e| {
        anyhow!("Invalid timezone '{tz_str}': {e}. Example: 'UTC' or 'America/Los_Angeles'")
    })
}

pub fn parse_date_opt(raw: Option<&str>) -> Result<Option<NaiveDate>> {
    raw.map(|s| {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("Invalid date '{s}', expected YYYY-MM-DD"))
    })
    .transpose()
}

pub fn resolve_data_dirs(cli_dirs: &[PathBuf], config_dirs: Option<&[PathBuf]>) -> Result<Vec<PathBuf>> {
    if !cli_dirs.is_empty() {
        return Ok(cli_dirs.iter().map(|d| expand_tilde(d)).collect());
    }
    if let Some(dirs) = config_dirs.filter(|d| !d.is_empty()) {
        return Ok(dirs.iter().map(|d| expand_tilde(d)).collect());
    }

    let mut dirs = Vec::new();
    if let Ok(env_paths) = std::env::var("CLAUDE_CONFIG_DIR") {
        for p in env_paths.split(',') {
            if !p.trim().is_empty() {
                dirs.push(expand_tilde(Path::new(p.trim())));
            }
        }
    }

    if dirs.is_empty() {
        let Some(home) = home_dir() else {
            anyhow::bail!("Could not determine home directory. Set --data-dir or CLAUDE_CONFIG_DIR.");
        };
        dirs.push(home.join(".config/claude"));
        dirs.push(home.join(".claude"));
    }
    Ok(dirs)
}

pub fn expand_tilde(path: &Path) -> PathBuf {
    if let Some(rest) = path.to_str().and_then(|s| s.strip_prefix("~/")) {
        if let Some(home) = home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

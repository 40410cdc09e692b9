//! Application configuration for citefill.
//!
//! User config lives at `~/.citefill/citefill.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CitefillError, Result};
use crate::types::SearchFilters;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "citefill.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".citefill";

/// Upper bound on concurrent collaborator calls in suggest mode.
pub const MAX_SUGGEST_CONCURRENCY: usize = 8;

// ---------------------------------------------------------------------------
// Config structs (matching citefill.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Citation key generation.
    #[serde(default)]
    pub citation_key: CitationKeyConfig,

    /// Scanner vocabulary and positional heuristics.
    #[serde(default)]
    pub scan: ScanConfig,

    /// Orchestrator limits.
    #[serde(default)]
    pub resolve: ResolveSettings,
}

/// How a candidate becomes a citation key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyFormat {
    /// The backend identifier, minus characters invalid in a key.
    #[default]
    RawIdentifier,
    /// First author's last name + year.
    AuthorYear,
    /// First author's last name + year + first significant title word.
    AuthorYearTitle,
}

impl std::str::FromStr for KeyFormat {
    type Err = CitefillError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "raw_identifier" | "raw" | "bibcode" => Ok(Self::RawIdentifier),
            "author_year" => Ok(Self::AuthorYear),
            "author_year_title" => Ok(Self::AuthorYearTitle),
            other => Err(CitefillError::config(format!(
                "unknown key format '{other}': expected raw_identifier, author_year, or author_year_title"
            ))),
        }
    }
}

/// `[citation_key]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitationKeyConfig {
    #[serde(default)]
    pub format: KeyFormat,

    #[serde(default = "default_true")]
    pub lowercase: bool,

    /// Keys are truncated to this many characters.
    #[serde(default = "default_key_max_length")]
    pub max_length: usize,
}

impl Default for CitationKeyConfig {
    fn default() -> Self {
        Self {
            format: KeyFormat::default(),
            lowercase: true,
            max_length: default_key_max_length(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_key_max_length() -> usize {
    30
}

/// `[scan]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Citation command names recognized by the scanner (without backslash).
    #[serde(default = "default_commands")]
    pub commands: Vec<String>,

    /// Characters of context taken on each side of a site.
    #[serde(default = "default_context_window")]
    pub context_window: usize,

    /// How far (in characters) the filler may look from the recorded column.
    #[serde(default = "default_position_tolerance")]
    pub position_tolerance: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            commands: default_commands(),
            context_window: default_context_window(),
            position_tolerance: default_position_tolerance(),
        }
    }
}

/// Default citation-command vocabulary.
pub fn default_commands() -> Vec<String> {
    [
        "cite",
        "citep",
        "citet",
        "citealt",
        "citealp",
        "citeauthor",
        "citeyear",
        "citeyearpar",
        "parencite",
        "textcite",
        "autocite",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_context_window() -> usize {
    200
}
fn default_position_tolerance() -> usize {
    5
}

/// `[resolve]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveSettings {
    /// Ranked candidates kept per site.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// The search fetches `top_k * search_multiplier` candidates for ranking.
    #[serde(default = "default_search_multiplier")]
    pub search_multiplier: usize,

    /// Sites resolved concurrently in suggest mode.
    #[serde(default = "default_suggest_concurrency")]
    pub suggest_concurrency: usize,
}

impl Default for ResolveSettings {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            search_multiplier: default_search_multiplier(),
            suggest_concurrency: default_suggest_concurrency(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_search_multiplier() -> usize {
    3
}
fn default_suggest_concurrency() -> usize {
    4
}

impl AppConfig {
    /// Reject values the scanner, filler, or key generator cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.citation_key.max_length == 0 {
            return Err(CitefillError::config("citation_key.max_length must be positive"));
        }
        if self.scan.commands.is_empty() {
            return Err(CitefillError::config("scan.commands must not be empty"));
        }
        if let Some(bad) = self
            .scan
            .commands
            .iter()
            .find(|c| c.is_empty() || !c.chars().all(|ch| ch.is_ascii_alphabetic()))
        {
            return Err(CitefillError::config(format!(
                "scan.commands entry '{bad}' must be a plain command name (letters only)"
            )));
        }
        if self.scan.context_window == 0 {
            return Err(CitefillError::config("scan.context_window must be positive"));
        }
        if self.resolve.top_k == 0 || self.resolve.search_multiplier == 0 {
            return Err(CitefillError::config(
                "resolve.top_k and resolve.search_multiplier must be positive",
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Resolve config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Whether a run mutates the manuscript.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Read-only: resolve every site, write nothing.
    #[default]
    Suggest,
    /// Fill each resolved site and write its bibliography entry.
    AutoFill,
}

/// Runtime resolution configuration, merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct ResolveConfig {
    pub mode: RunMode,
    pub key: CitationKeyConfig,
    pub scan: ScanConfig,
    pub top_k: usize,
    pub search_multiplier: usize,
    /// Clamped to `1..=MAX_SUGGEST_CONCURRENCY`.
    pub suggest_concurrency: usize,
    pub filters: SearchFilters,
    /// Explicit bibliography file, overriding detection.
    pub bib_file: Option<PathBuf>,
}

impl ResolveConfig {
    /// Number of candidates requested from the search collaborator per query.
    pub fn fetch_limit(&self) -> usize {
        self.top_k.saturating_mul(self.search_multiplier).max(1)
    }
}

impl From<&AppConfig> for ResolveConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            mode: RunMode::default(),
            key: config.citation_key.clone(),
            scan: config.scan.clone(),
            top_k: config.resolve.top_k,
            search_multiplier: config.resolve.search_multiplier,
            suggest_concurrency: config
                .resolve
                .suggest_concurrency
                .clamp(1, MAX_SUGGEST_CONCURRENCY),
            filters: SearchFilters::default(),
            bib_file: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.citefill/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| CitefillError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.citefill/citefill.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load and validate the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| CitefillError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        CitefillError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    config.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| CitefillError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| CitefillError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| CitefillError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use citefill_bibliography::writer::resolve_target;
use citefill_bibliography::{BibTarget, add_bibitem, append_bib_entry, rekey_entry};
use citefill_core::{
    Collaborators, ProgressReporter, ResolutionOutcome, RunReport, resolve_document,
};
use citefill_latex::{
    BibliographyMode, CitationFiller, CitationSite, Document, FillEdit, Scanner,
    detect_bibliography,
};
use citefill_shared::{
    AppConfig, KeyFormat, ResolveConfig, RunMode, YearRange, init_config, load_config,
};

use crate::catalog::CatalogSearch;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// citefill: find and fill incomplete LaTeX citations.
#[derive(Parser)]
#[command(
    name = "citefill",
    version,
    about = "Find empty LaTeX citations and fill them with keys and bibliography entries.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// List incomplete citation sites in a manuscript.
    Scan {
        /// LaTeX manuscript.
        tex: PathBuf,

        /// Print sites as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show how a manuscript manages its bibliography.
    Bib {
        /// LaTeX manuscript.
        tex: PathBuf,
    },

    /// Fill one citation site with known keys.
    Fill {
        /// LaTeX manuscript.
        #[arg(long)]
        tex: PathBuf,

        /// 1-based line of the citation command.
        #[arg(long)]
        line: usize,

        /// 1-based column of the citation command.
        #[arg(long)]
        column: usize,

        /// Key to add (repeat for several).
        #[arg(long = "key", required = true)]
        keys: Vec<String>,

        /// Bibliography file, overriding the one referenced by the manuscript.
        #[arg(long)]
        bib_file: Option<PathBuf>,

        /// BibTeX entry to append for the key.
        #[arg(long, conflicts_with = "bibitem")]
        entry_file: Option<PathBuf>,

        /// Text of a `\bibitem` entry to add for the key.
        #[arg(long)]
        bibitem: Option<String>,
    },

    /// Resolve every incomplete citation against a candidate catalog.
    Resolve {
        /// LaTeX manuscript.
        tex: PathBuf,

        /// JSON array of candidate works.
        #[arg(long)]
        catalog: PathBuf,

        /// Write keys and bibliography entries instead of only suggesting.
        #[arg(long)]
        auto_fill: bool,

        /// Only consider works with an author matching this substring.
        #[arg(long)]
        author: Option<String>,

        /// Only consider works published in this year or range (e.g. 2018-2022).
        #[arg(long)]
        year: Option<String>,

        /// Key format: raw_identifier, author_year, or author_year_title.
        #[arg(long)]
        key_format: Option<String>,

        /// Bibliography file, overriding the one referenced by the manuscript.
        #[arg(long)]
        bib_file: Option<PathBuf>,

        /// Print the run report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr so `--json` output stays clean.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = [
        "citefill_cli",
        "citefill_core",
        "citefill_latex",
        "citefill_bibliography",
        "citefill_shared",
    ]
    .map(|target| format!("{target}={level}"))
    .join(",");

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Scan { tex, json } => cmd_scan(&tex, json).await,
        Command::Bib { tex } => cmd_bib(&tex).await,
        Command::Fill {
            tex,
            line,
            column,
            keys,
            bib_file,
            entry_file,
            bibitem,
        } => {
            let entry = match (entry_file, bibitem) {
                (Some(path), _) => Some(EntryArg::BibTeX(path)),
                (None, Some(text)) => Some(EntryArg::BibItem(text)),
                (None, None) => None,
            };
            cmd_fill(&tex, line, column, &keys, bib_file.as_deref(), entry).await
        }
        Command::Resolve {
            tex,
            catalog,
            auto_fill,
            author,
            year,
            key_format,
            bib_file,
            json,
        } => {
            let args = ResolveArgs {
                catalog,
                auto_fill,
                author,
                year,
                key_format,
                bib_file,
                json,
            };
            cmd_resolve(&tex, args).await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_scan(tex: &Path, json: bool) -> Result<()> {
    let config = load_config()?;
    let doc = Document::open(tex)?;
    let sites = Scanner::from_config(&config.scan)?.scan(doc.text());

    info!(path = %tex.display(), sites = sites.len(), "scan complete");

    if json {
        println!("{}", serde_json::to_string_pretty(&sites)?);
        return Ok(());
    }

    if sites.is_empty() {
        println!("No incomplete citations in {}", tex.display());
        return Ok(());
    }

    println!();
    for site in &sites {
        print_site(site);
    }
    println!();
    println!("  {} incomplete citation(s)", sites.len());
    println!();
    Ok(())
}

fn print_site(site: &CitationSite) {
    let existing = if site.is_fully_empty() {
        String::from("-")
    } else {
        site.existing_keys.join(", ")
    };
    println!("  {}:{}  \\{}  keys: {existing}", site.line, site.column, site.command);
    println!("      {}", truncate(&site.context, 100));
}

async fn cmd_bib(tex: &Path) -> Result<()> {
    let doc = Document::open(tex)?;
    let mode = detect_bibliography(doc.text());
    println!("Bibliography: {mode}");

    if let BibliographyMode::ExternalFile { path } = &mode {
        match resolve_target(doc.path(), path) {
            Ok(resolved) => println!("Writes to:    {}", resolved.display()),
            Err(e) => println!("Unusable:     {e}"),
        }
    }
    Ok(())
}

/// Bibliography entry supplied to `fill`.
enum EntryArg {
    BibTeX(PathBuf),
    BibItem(String),
}

async fn cmd_fill(
    tex: &Path,
    line: usize,
    column: usize,
    keys: &[String],
    bib_file: Option<&Path>,
    entry: Option<EntryArg>,
) -> Result<()> {
    let config = load_config()?;
    let mut doc = Document::open(tex)?;

    if entry.is_some() && keys.len() != 1 {
        return Err(eyre!("a bibliography entry can only be written for exactly one --key"));
    }

    // Resolve the external target and prepare the entry before touching the manuscript.
    let entry = match entry {
        Some(EntryArg::BibTeX(entry_path)) => {
            let bib_path = match BibTarget::resolve(&doc, bib_file)? {
                BibTarget::External(path) => path,
                BibTarget::Inline => {
                    return Err(eyre!(
                        "{} has no external bibliography; pass --bib-file or use --bibitem",
                        tex.display()
                    ));
                }
            };
            let block = std::fs::read_to_string(&entry_path)
                .map_err(|e| eyre!("cannot read {}: {e}", entry_path.display()))?;
            let block = rekey_entry(&block, &keys[0])
                .ok_or_else(|| eyre!("{} is not a BibTeX entry", entry_path.display()))?;
            Some(PreparedEntry::BibTeX { bib_path, block })
        }
        Some(EntryArg::BibItem(text)) => Some(PreparedEntry::BibItem(text)),
        None => None,
    };

    let filler = CitationFiller::from_config(&config.scan)?;
    let edit = fill_site(&mut doc, &filler, line, column, keys, entry)?;
    println!("Filled {}:{} -> {}", line, edit.column, edit.new_span);
    Ok(())
}

/// A bibliography entry ready to be written alongside a fill.
enum PreparedEntry {
    BibTeX { bib_path: PathBuf, block: String },
    BibItem(String),
}

/// Fill one site and write its entry.
///
/// The manuscript is persisted before an external `.bib` is appended, so a
/// manuscript that changed on disk leaves the bibliography untouched.
fn fill_site(
    doc: &mut Document,
    filler: &CitationFiller,
    line: usize,
    column: usize,
    keys: &[String],
    entry: Option<PreparedEntry>,
) -> Result<FillEdit> {
    let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();
    let edit = filler.fill_at(doc, line, column, &key_refs)?;
    info!(line, column = edit.column, keys = ?edit.keys, "citation filled");

    match entry {
        Some(PreparedEntry::BibItem(text)) => {
            let (outcome, _) = add_bibitem(doc, &keys[0], &text)?;
            doc.persist()?;
            println!("Bibliography: {outcome:?} (inline)");
        }
        Some(PreparedEntry::BibTeX { bib_path, block }) => {
            doc.persist()?;
            let outcome = append_bib_entry(&bib_path, &keys[0], &block)?;
            println!("Bibliography: {outcome:?} ({})", bib_path.display());
        }
        None => doc.persist()?,
    }

    Ok(edit)
}

/// Flags for `resolve`, gathered to keep the handler signature short.
struct ResolveArgs {
    catalog: PathBuf,
    auto_fill: bool,
    author: Option<String>,
    year: Option<String>,
    key_format: Option<String>,
    bib_file: Option<PathBuf>,
    json: bool,
}

async fn cmd_resolve(tex: &Path, args: ResolveArgs) -> Result<()> {
    let app_config = load_config()?;
    let mut config = ResolveConfig::from(&app_config);
    config.mode = if args.auto_fill {
        RunMode::AutoFill
    } else {
        RunMode::Suggest
    };
    config.filters.author = args.author;
    config.filters.year_range = args.year.as_deref().map(str::parse::<YearRange>).transpose()?;
    if let Some(format) = args.key_format.as_deref() {
        config.key.format = format.parse::<KeyFormat>()?;
    }
    config.bib_file = args.bib_file;

    let catalog = CatalogSearch::load(&args.catalog)?;
    info!(
        path = %tex.display(),
        candidates = catalog.len(),
        mode = ?config.mode,
        "resolving citations"
    );
    let collaborators = Collaborators::new(Arc::new(catalog));

    // Ctrl-C stops the run between sites; completed fills are still saved.
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, finishing current site");
            on_interrupt.cancel();
        }
    });

    let reporter = CliProgress::new();
    let report = resolve_document(tex, &config, &collaborators, &reporter, &cancel).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    println!();
    for outcome in &report.outcomes {
        print_outcome(outcome);
    }
    println!();
    println!("  Run:       {}", report.run_id);
    println!("  Mode:      {:?}", report.mode);
    println!("  Sites:     {}", report.sites_found);
    println!("  Resolved:  {}", report.filled_count());
    println!("  Failed:    {}", report.failed_count());
    if report.cancelled {
        println!("  (cancelled before completion)");
    }
    println!();
}

fn print_outcome(outcome: &ResolutionOutcome) {
    let site = &outcome.site;
    match &outcome.failure {
        Some(failure) => {
            println!("  {}:{}  failed  {}", site.line, site.column, failure.reason);
        }
        None => {
            let verb = if outcome.applied { "filled" } else { "suggest" };
            println!(
                "  {}:{}  {verb}  {}",
                site.line,
                site.column,
                outcome.chosen_keys.join(", ")
            );
            for ranked in &outcome.suggestions {
                println!(
                    "      {:.2}  {:<14}  {}  {}",
                    ranked.relevance_score,
                    ranked.citation_kind.as_str(),
                    ranked.candidate.id,
                    truncate(&ranked.candidate.title, 70)
                );
            }
        }
    }
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{cut}…")
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn site_started(&self, site: &CitationSite, index: usize, total: usize) {
        self.spinner.set_message(format!(
            "Resolving [{index}/{total}] line {} \\{}",
            site.line, site.command
        ));
    }

    fn site_finished(&self, outcome: &ResolutionOutcome, index: usize, total: usize) {
        if let Some(failure) = &outcome.failure {
            self.spinner.set_message(format!(
                "Resolving [{index}/{total}] failed: {}",
                failure.reason
            ));
        }
    }

    fn done(&self, _report: &RunReport) {
        self.spinner.finish_and_clear();
    }
}

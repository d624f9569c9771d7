//! CLI command definitions, routing, and tracing setup.

use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use kbscan_core::{
    CsvRow, ExportRequest, SearchOptions, export_stream, search_match_row, search_stream,
    to_csv_document,
};
use kbscan_shared::{
    AppConfig, KbScanError, ProgressEvent, ScanConfig, SearchMatch, init_config, load_config,
    load_config_from,
};

use crate::server::{self, AppState};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// kbscan — search and export a hosted knowledge base.
#[derive(Parser)]
#[command(
    name = "kbscan",
    version,
    about = "Crawl a hosted knowledge base, search its articles, and export them as CSV.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.kbscan/kbscan.toml.
    #[arg(long, global = true, env = "KBSCAN_CONFIG")]
    pub config: Option<PathBuf>,

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
    /// Search every article of a knowledge base for a term.
    Search {
        /// Any URL on the knowledge base's host.
        url: String,

        /// Term to look for (case-insensitive, literal).
        term: String,

        /// Print raw progress events as newline-delimited JSON.
        #[arg(long)]
        ndjson: bool,

        /// Also write the matching articles to this CSV file.
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Add the match-context column to the CSV.
        #[arg(long, requires = "csv")]
        html: bool,

        /// Article fetches in flight (overrides fetch.concurrency).
        #[arg(short = 'j', long)]
        concurrency: Option<u32>,
    },

    /// Export the article list, or the articles matching a term, as CSV.
    Export {
        /// Any URL on the knowledge base's host.
        url: String,

        /// Only export articles matching this term.
        #[arg(short, long)]
        term: Option<String>,

        /// Add the match-context column (with --term).
        #[arg(long, requires = "term")]
        html: bool,

        /// Output file; `-` for stdout. Defaults to kb-export-YYYY-MM-DD.csv.
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Article fetches in flight (overrides fetch.concurrency).
        #[arg(short = 'j', long)]
        concurrency: Option<u32>,
    },

    /// Run the HTTP service.
    Serve {
        /// Address to listen on (overrides server.bind).
        #[arg(long)]
        bind: Option<String>,
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

/// Initialize tracing based on CLI flags. Logs go to stderr.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "kbscan=info,tower_http=info",
        1 => "kbscan=debug,tower_http=debug",
        _ => "kbscan=trace,tower_http=debug",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

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
    let config_path = cli.config.as_deref();

    match cli.command {
        Command::Search {
            url,
            term,
            ndjson,
            csv,
            html,
            concurrency,
        } => {
            let scan = scan_config(config_path, concurrency)?;
            cmd_search(&url, &term, &scan, ndjson, csv.as_deref(), html).await
        }
        Command::Export {
            url,
            term,
            html,
            out,
            concurrency,
        } => {
            let scan = scan_config(config_path, concurrency)?;
            cmd_export(url, term, html, out, &scan).await
        }
        Command::Serve { bind } => cmd_serve(config_path, bind).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path).await,
        },
    }
}

fn app_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

/// Config file values with CLI overrides applied.
fn scan_config(path: Option<&Path>, concurrency: Option<u32>) -> Result<ScanConfig> {
    let mut scan = ScanConfig::from(&app_config(path)?);
    if let Some(concurrency) = concurrency {
        scan.concurrency = concurrency;
    }
    scan.validate()?;
    Ok(scan)
}

/// Token cancelled on the first Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping");
            trigger.cancel();
        }
    });
    token
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_search(
    url: &str,
    term: &str,
    scan: &ScanConfig,
    ndjson: bool,
    csv_path: Option<&Path>,
    include_context: bool,
) -> Result<()> {
    let http = kbscan_crawler::build_http_client(scan.timeout_secs)?;
    let cancel = cancel_on_ctrl_c();

    info!(url, term, concurrency = scan.concurrency, "searching knowledge base");

    let mut events = search_stream(
        http,
        url.to_string(),
        term.to_string(),
        SearchOptions::from(scan),
        cancel,
    );

    let mut progress = SearchProgress::new(!ndjson);
    let mut results: Vec<SearchMatch> = Vec::new();
    let stdout = std::io::stdout();

    while let Some(item) = events.next().await {
        let event = match item {
            Ok(event) => event,
            Err(e) => {
                progress.abandon();
                return Err(search_error(e));
            }
        };

        if ndjson {
            let mut out = stdout.lock();
            serde_json::to_writer(&mut out, &event)?;
            writeln!(out)?;
            out.flush()?;
        } else {
            progress.on_event(&event);
        }

        if let ProgressEvent::Result(found) = event {
            results.push(found);
        }
    }

    if let Some(path) = csv_path {
        let rows: Vec<CsvRow> = results
            .iter()
            .map(|r| search_match_row(r, include_context))
            .collect();
        std::fs::write(path, to_csv_document(&rows, include_context))
            .map_err(|e| eyre!("failed to write {}: {e}", path.display()))?;
        info!(path = %path.display(), rows = rows.len(), "wrote search results");
    }

    Ok(())
}

async fn cmd_export(
    url: String,
    term: Option<String>,
    include_context: bool,
    out: Option<PathBuf>,
    scan: &ScanConfig,
) -> Result<()> {
    let http = kbscan_crawler::build_http_client(scan.timeout_secs)?;
    let cancel = cancel_on_ctrl_c();

    let target = out.unwrap_or_else(|| PathBuf::from(server::export_file_name()));
    let to_stdout = target.as_os_str() == "-";

    info!(
        url = %url,
        term = term.as_deref().unwrap_or(""),
        out = %target.display(),
        "exporting knowledge base"
    );

    let mut writer: Box<dyn Write> = if to_stdout {
        Box::new(std::io::stdout().lock())
    } else {
        let file = std::fs::File::create(&target)
            .map_err(|e| eyre!("failed to create {}: {e}", target.display()))?;
        Box::new(std::io::BufWriter::new(file))
    };

    let request = ExportRequest {
        url,
        term,
        include_context,
    };
    let mut lines = export_stream(http, request, SearchOptions::from(scan), cancel);

    let spinner = if to_stdout {
        ProgressBar::hidden()
    } else {
        spinner()?
    };

    let mut rows = 0usize;
    while let Some(line) = lines.next().await {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                spinner.abandon();
                return Err(search_error(e));
            }
        };
        writer.write_all(line.as_bytes())?;
        rows += 1;
        spinner.set_message(format!("{} rows written", rows.saturating_sub(1)));
    }
    writer.flush()?;
    spinner.finish_and_clear();

    if !to_stdout {
        println!(
            "Exported {} rows to {}",
            rows.saturating_sub(1),
            target.display()
        );
    }
    Ok(())
}

async fn cmd_serve(config_path: Option<&Path>, bind: Option<String>) -> Result<()> {
    let config = app_config(config_path)?;
    let scan = ScanConfig::from(&config);
    scan.validate()?;

    let bind = bind.unwrap_or(config.server.bind);
    let state = AppState {
        http: kbscan_crawler::build_http_client(scan.timeout_secs)?,
        opts: SearchOptions::from(&scan),
        shutdown: cancel_on_ctrl_c(),
    };

    server::serve(&bind, state).await
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = app_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

fn search_error(err: KbScanError) -> color_eyre::Report {
    match err {
        KbScanError::Cancelled => eyre!("cancelled"),
        other => other.into(),
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

fn spinner() -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")?
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    spinner.enable_steady_tick(std::time::Duration::from_millis(80));
    Ok(spinner)
}

/// Terminal rendering of search events: a bar plus one block per result.
struct SearchProgress {
    bar: Option<ProgressBar>,
    visible: bool,
}

impl SearchProgress {
    fn new(visible: bool) -> Self {
        Self { bar: None, visible }
    }

    fn on_event(&mut self, event: &ProgressEvent) {
        if !self.visible {
            return;
        }

        match event {
            ProgressEvent::Info { total_articles } => {
                let bar = ProgressBar::new(*total_articles as u64);
                if let Ok(style) =
                    ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}")
                {
                    bar.set_style(style);
                }
                bar.set_message("0 found");
                self.bar = Some(bar);
            }
            ProgressEvent::Result(found) => self.print_result(found),
            ProgressEvent::Progress {
                processed, found, ..
            } => {
                if let Some(bar) = &self.bar {
                    bar.set_position(*processed as u64);
                    bar.set_message(format!("{found} found"));
                }
            }
            ProgressEvent::Complete {
                total_found,
                total_processed,
            } => {
                if let Some(bar) = self.bar.take() {
                    bar.finish_and_clear();
                }
                println!();
                println!("  Articles searched: {total_processed}");
                println!("  Articles matched:  {total_found}");
                println!();
            }
        }
    }

    fn print_result(&self, found: &SearchMatch) {
        let mut block = format!(
            "\n{}\n  {}\n  {}",
            found.article_title,
            found.article_url,
            found.category_hierarchy.join(" > ")
        );
        for m in &found.matches {
            if m.heading.is_empty() {
                block.push_str(&format!("\n    - {}", m.context));
            } else {
                block.push_str(&format!("\n    - [{}] {}", m.heading, m.context));
            }
        }

        match &self.bar {
            Some(bar) => bar.println(block),
            None => println!("{block}"),
        }
    }

    fn abandon(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.abandon();
        }
    }
}

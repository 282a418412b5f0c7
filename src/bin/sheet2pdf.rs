//! CLI binary for edgequake-sheet2pdf.
//!
//! A thin shim over the library crate that layers CLI flags over the config
//! file, wires up the Google, LibreOffice and Ghostscript adapters, and prints
//! the batch report.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_sheet2pdf::google::{auth::Authenticator, GoogleSession};
use edgequake_sheet2pdf::pipeline::convert::LibreOfficeConverter;
use edgequake_sheet2pdf::pipeline::optimize::GhostscriptOptimizer;
use edgequake_sheet2pdf::{
    run_batch, BatchProgressCallback, BatchReport, Collaborators, ConfigLayer, ProgressCallback,
    RecordState, Sheet2PdfError, Stage,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Conventional exit status after SIGINT.
const EXIT_INTERRUPTED: i32 = 130;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar per stage, replaced as stages change.
struct CliProgressCallback {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            bar: Mutex::new(None),
        })
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Ok(guard) = self.bar.lock() {
            if let Some(bar) = guard.as_ref() {
                f(bar);
            }
        }
    }
}

fn stage_bar(stage: Stage, total: usize) -> ProgressBar {
    let bar = if total > 1 {
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>3}/{len}  \
                 ⏱ {elapsed_precise}  {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(TICKS),
        );
        bar
    } else {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar
    };
    bar.set_prefix(stage.title());
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: Stage, total: usize) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(old) = guard.take() {
                old.finish_and_clear();
            }
            *guard = Some(stage_bar(stage, total));
        }
    }

    fn on_record_complete(&self, _stage: Stage, _index: usize, filename: &str) {
        self.with_bar(|bar| {
            bar.set_message(filename.to_string());
            bar.inc(1);
        });
    }

    fn on_retry(&self, stage: Stage, filename: &str, attempt: u32, error: &str) {
        let first_line = error.lines().next().unwrap_or_default();
        let msg = if first_line.chars().count() > 80 {
            format!("{}\u{2026}", first_line.chars().take(79).collect::<String>())
        } else {
            first_line.to_string()
        };
        let subject = if filename.is_empty() {
            stage.title().to_string()
        } else {
            filename.to_string()
        };
        self.with_bar(|bar| {
            bar.println(format!(
                "  {} {}  {}  {}",
                yellow("↻"),
                subject,
                dim(&format!("attempt {attempt} failed:")),
                yellow(&msg),
            ))
        });
    }

    fn on_record_failed(&self, _stage: Stage, _index: usize, filename: &str, error: &str) {
        self.with_bar(|bar| {
            bar.println(format!("  {} {}  {}", red("✗"), filename, red(error)))
        });
    }

    fn on_stage_complete(&self, stage: Stage) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(bar) = guard.take() {
                bar.finish_and_clear();
            }
        }
        eprintln!("{} {}", green("✔"), stage.title());
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Local template, links written to the sheet's "file" column
  sheet2pdf --sheet 'https://docs.google.com/spreadsheets/d/SHEET_ID/edit#gid=0' \
            --template certificate.pptx \
            --output https://drive.google.com/drive/folders/FOLDER_ID

  # Google Slides template, custom tool paths (macOS)
  sheet2pdf --sheet '...' \
            --template https://docs.google.com/presentation/d/PRES_ID/edit \
            --output FOLDER_ID \
            --libreoffice /Applications/LibreOffice.app/Contents/MacOS/soffice \
            --gs /opt/homebrew/bin/gs

  # Everything from a config file, JSON report on stdout
  sheet2pdf --config batch.toml --json > report.json

SHEET LAYOUT:
  Row 1 holds headers. Required: "filename" (output base name, unique per
  row) and "file" (receives the published link). Every header of the form
  <token> is a placeholder: each occurrence of <token> in the template is
  replaced with that row's value. Other columns are ignored.

CONFIG FILE (sheet2pdf.toml in the current directory, or --config):
  sheet = "https://docs.google.com/spreadsheets/d/SHEET_ID/edit#gid=0"
  template = "certificate.pptx"
  output = "FOLDER_ID"
  resolution = 300
  libreoffice = "soffice"
  gs = "gs"
  work_dir = "."
  credentials = "credentials.json"
  retry_pause_ms = 1000
  share_output = false

ENVIRONMENT VARIABLES:
  SHEET2PDF_ACCESS_TOKEN  OAuth access token; skips the credentials file
  SHEET2PDF_<FLAG>        Any flag below, e.g. SHEET2PDF_SHEET, SHEET2PDF_GS
  RUST_LOG                Override log filtering (e.g. RUST_LOG=debug)

SCRATCH FILES:
  <work_dir>/_output and <work_dir>/results are wiped at start and removed
  when the run ends, including on Ctrl-C (exit status 130).
"#;

/// Merge spreadsheet rows into a slide template, render PDFs and publish them.
#[derive(Parser, Debug)]
#[command(
    name = "sheet2pdf",
    version,
    about = "Merge spreadsheet rows into a slide template, render PDFs and publish them",
    long_about = "Fill a PowerPoint or Google Slides template once per spreadsheet row, convert \
each result to PDF/A with LibreOffice and Ghostscript, upload the PDFs to a Google Drive folder, \
and write each link back into the row it came from.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Spreadsheet URL, including `#gid=` for a sheet other than the first.
    #[arg(long, env = "SHEET2PDF_SHEET")]
    sheet: Option<String>,

    /// Google Slides URL or path to a local .pptx template.
    #[arg(long, env = "SHEET2PDF_TEMPLATE")]
    template: Option<String>,

    /// Google Drive folder URL or folder id for the PDFs.
    #[arg(long, env = "SHEET2PDF_OUTPUT")]
    output: Option<String>,

    /// LibreOffice binary [default: soffice on macOS/Windows, libreoffice elsewhere].
    #[arg(long, env = "SHEET2PDF_LIBREOFFICE")]
    libreoffice: Option<PathBuf>,

    /// Ghostscript binary [default: gswin32c on Windows, gs elsewhere].
    #[arg(long, env = "SHEET2PDF_GS")]
    gs: Option<PathBuf>,

    /// Output PDF resolution in DPI [default: 300].
    #[arg(long, env = "SHEET2PDF_RESOLUTION")]
    resolution: Option<u32>,

    /// TOML config file [default: ./sheet2pdf.toml if present].
    #[arg(long, env = "SHEET2PDF_CONFIG")]
    config: Option<PathBuf>,

    /// Authorized-user OAuth credentials [default: credentials.json].
    #[arg(long, env = "SHEET2PDF_CREDENTIALS")]
    credentials: Option<PathBuf>,

    /// Directory for the _output/ and results/ scratch folders [default: .].
    #[arg(long, env = "SHEET2PDF_WORK_DIR")]
    work_dir: Option<PathBuf>,

    /// Make the output folder readable by anyone with the link.
    #[arg(long, env = "SHEET2PDF_SHARE_OUTPUT")]
    share_output: bool,

    /// Pause between retries of Drive/Sheets calls, in milliseconds [default: 1000].
    #[arg(long, env = "SHEET2PDF_RETRY_PAUSE_MS")]
    retry_pause_ms: Option<u64>,

    /// Print the batch report as JSON on stdout.
    #[arg(long, env = "SHEET2PDF_JSON")]
    json: bool,

    /// Disable progress bars.
    #[arg(long, env = "SHEET2PDF_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "SHEET2PDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "SHEET2PDF_QUIET")]
    quiet: bool,
}

impl Cli {
    /// The command-line layer; unset flags leave room for the config file.
    fn layer(&self) -> ConfigLayer {
        ConfigLayer {
            sheet: self.sheet.clone(),
            template: self.template.clone(),
            output: self.output.clone(),
            resolution: self.resolution,
            libreoffice: self.libreoffice.clone(),
            gs: self.gs.clone(),
            work_dir: self.work_dir.clone(),
            credentials: self.credentials.clone(),
            retry_pause_ms: self.retry_pause_ms,
            share_output: self.share_output.then_some(true),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when progress bars are active;
    // the bars provide all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let file_layer =
        ConfigLayer::discover(cli.config.as_deref()).context("Failed to load config file")?;
    let mut builder = cli.layer().or(file_layer).into_builder();
    if show_progress {
        let cb = CliProgressCallback::new();
        builder = builder.progress_callback(cb as ProgressCallback);
    }
    let config = builder.build().context("Invalid configuration")?;

    // ── Wire collaborators ───────────────────────────────────────────────
    let auth = Authenticator::from_env_or_file(&config.credentials)
        .context("Failed to set up Google credentials")?;
    let session = GoogleSession::new(auth).context("Failed to create HTTP client")?;
    let source = session.sheets(config.sheet.clone());
    let drive = session.drive();
    let publisher = session.publisher(config.output_folder.clone());
    let converter = LibreOfficeConverter::new(&config.libreoffice);
    let optimizer = GhostscriptOptimizer::new(&config.ghostscript);
    let services = Collaborators {
        source: &source,
        templates: &drive,
        converter: &converter,
        optimizer: &optimizer,
        publisher: &publisher,
    };

    // ── Run batch ────────────────────────────────────────────────────────
    // The batch future is dropped before we act on Ctrl-C, so its scratch
    // guard and kill-on-drop children are cleaned up first.
    let outcome = tokio::select! {
        result = run_batch(&config, &services) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };

    let report = match outcome {
        None | Some(Err(Sheet2PdfError::Cancelled)) => {
            eprintln!("\n{} {}", red("✘"), bold("Interrupted, scratch files removed"));
            std::process::exit(EXIT_INTERRUPTED);
        }
        Some(result) => result.context("Batch failed")?,
    };

    if cli.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
        println!("{json}");
    } else if !cli.quiet {
        print_summary(&report);
    }

    Ok(())
}

/// Per-record outcome lines plus a totals line, on stderr.
fn print_summary(report: &BatchReport) {
    for status in &report.records {
        match status.state {
            RecordState::Published => eprintln!(
                "  {} {:<24}  {}",
                green("✓"),
                status.filename,
                dim(status.reference.as_deref().unwrap_or_default()),
            ),
            _ => eprintln!(
                "  {} {:<24}  {}",
                red("✗"),
                status.filename,
                red(&status
                    .error
                    .as_ref()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| format!("{:?}", status.state))),
            ),
        }
    }

    let failed = report.failed();
    eprintln!(
        "{}  {}/{} published  {}ms{}",
        if failed == 0 { green("✔") } else { cyan("⚠") },
        bold(&report.published().to_string()),
        report.records.len(),
        report.timings.total_ms,
        report
            .written_at
            .as_deref()
            .map(|a| format!("  →  links from {}", bold(a)))
            .unwrap_or_default(),
    );
}

//! CLI binary for deck2notes.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `AnnotateConfig`, owns the logging setup, and turns the run's outcome into
//! an exit code.

use anyhow::{Context, Result};
use clap::Parser;
use deck2notes::{
    annotate_to_file, AnnotateConfig, PageSelection, ProgressCallback, ReportProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
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

// ── Logging context ──────────────────────────────────────────────────────────

/// Owns the process's log sinks: stderr plus an optional plain-text log file.
///
/// Created once at startup; [`LogContext::finish`] flushes the file before
/// the process exits.
struct LogContext {
    file: Option<Arc<File>>,
}

impl LogContext {
    fn init(stderr_filter: &str, file_filter: &str, log_file: Option<&Path>) -> Result<Self> {
        let file = match log_file {
            Some(path) => Some(Arc::new(
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .with_context(|| format!("Failed to open log file {}", path.display()))?,
            )),
            None => None,
        };

        let stderr_layer = fmt::layer().with_writer(io::stderr).with_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(stderr_filter)),
        );
        let file_layer = file.as_ref().map(|f| {
            fmt::layer()
                .with_ansi(false)
                .with_writer(Arc::clone(f))
                .with_filter(EnvFilter::new(file_filter))
        });

        tracing_subscriber::registry()
            .with(stderr_layer)
            .with(file_layer)
            .try_init()
            .context("Failed to initialise logging")?;

        Ok(Self { file })
    }

    fn finish(self) {
        if let Some(file) = self.file {
            let _ = file.sync_all();
        }
    }
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress bar with one log line per finished page.
struct CliProgressCallback {
    bar: ProgressBar,
    started: Mutex<Option<Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner until `on_run_start` reports the page count.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);

        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(spinner_style);
        bar.set_prefix("Rendering");
        bar.set_message("Opening deck…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            started: Mutex::new(None),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Annotating");
        self.bar.reset_eta();
    }

    fn page_elapsed(&self) -> f64 {
        self.started
            .lock()
            .ok()
            .and_then(|mut s| s.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ReportProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_pages: usize) {
        self.activate_bar(total_pages);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Annotating {total_pages} pages…"))
        ));
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        if let Ok(mut started) = self.started.lock() {
            *started = Some(Instant::now());
        }
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, section_len: usize) {
        let elapsed = self.page_elapsed();
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<8}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{section_len:>5} chars")),
            dim(&format!("{elapsed:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        let elapsed = self.page_elapsed();
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg),
            dim(&format!("{elapsed:.1}s")),
        ));
    }

    fn on_run_complete(&self, total_pages: usize, success_count: usize) {
        self.bar.finish_and_clear();
        if self.errors.load(Ordering::SeqCst) == 0 && success_count == total_pages {
            eprintln!(
                "{} {} pages annotated",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} stopped after {}/{} pages",
                red("✘"),
                bold(&success_count.to_string()),
                total_pages,
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Annotate a deck
  deck2notes lecture.pdf lecture.md

  # Specific pages with a different model
  deck2notes --pages 1-5 --model claude-3-5-haiku-20241022 lecture.pdf intro.md

  # Tighter retry budget and a per-attempt timeout
  deck2notes --max-attempts 3 --api-timeout 60 lecture.pdf lecture.md

  # Machine-readable run summary
  deck2notes --json lecture.pdf lecture.md

OUTPUT FORMAT (per page):
  ## Page N
  ### Extracted Content      slide text, verbatim, in a code fence
  ### Visual Description     model description of the rendered slide
  ### Content Explanation    model explanation of the slide's purpose
  ---

ENVIRONMENT VARIABLES:
  ANTHROPIC_API_KEY       Anthropic API key (preferred provider)
  OPENAI_API_KEY          OpenAI API key
  GEMINI_API_KEY          Google Gemini API key
  DECK2NOTES_PROVIDER     Override provider (anthropic, openai, gemini, ollama, …)
  DECK2NOTES_MODEL        Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium (otherwise the system library is used)
  RUST_LOG                Override the stderr log filter
"#;

/// Annotate slide decks with visual descriptions and explanations from an LLM.
#[derive(Parser, Debug)]
#[command(
    name = "deck2notes",
    version,
    about = "Annotate slide decks with visual descriptions and explanations from an LLM",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Input PDF file path.
    input: PathBuf,

    /// Output Markdown file path.
    output: PathBuf,

    /// LLM model ID.
    #[arg(long, env = "DECK2NOTES_MODEL", default_value = deck2notes::config::DEFAULT_MODEL)]
    model: String,

    /// LLM provider: anthropic, openai, gemini, ollama, azure.
    #[arg(long, env = "DECK2NOTES_PROVIDER")]
    provider: Option<String>,

    /// Max output tokens per model call.
    #[arg(long, env = "DECK2NOTES_MAX_TOKENS", default_value_t = deck2notes::config::DEFAULT_MAX_TOKENS)]
    max_tokens: usize,

    /// Attempts per model call before giving up (first try included).
    #[arg(long, env = "DECK2NOTES_MAX_ATTEMPTS", default_value_t = 5,
          value_parser = clap::value_parser!(u32).range(1..))]
    max_attempts: u32,

    /// Delay before the first retry, in milliseconds; doubles per attempt.
    #[arg(long, env = "DECK2NOTES_BASE_DELAY_MS", default_value_t = 1000)]
    base_delay_ms: u64,

    /// Per-attempt model call timeout in seconds (no timeout if unset).
    #[arg(long, env = "DECK2NOTES_API_TIMEOUT",
          value_parser = clap::value_parser!(u64).range(1..))]
    api_timeout: Option<u64>,

    /// Page selection: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, env = "DECK2NOTES_PAGES", default_value = "all")]
    pages: String,

    /// Maximum rendered image edge in pixels.
    #[arg(long, env = "DECK2NOTES_MAX_PIXELS", default_value_t = 2000)]
    max_pixels: u32,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "DECK2NOTES_PASSWORD")]
    password: Option<String>,

    /// Directory for the run's temporary page images (default: system temp dir).
    #[arg(long, env = "DECK2NOTES_SCRATCH_DIR")]
    scratch_dir: Option<PathBuf>,

    /// Log file path.
    #[arg(long, env = "DECK2NOTES_LOG_FILE", default_value = "deck2notes.log")]
    log_file: PathBuf,

    /// Do not write a log file.
    #[arg(long)]
    no_log_file: bool,

    /// Print the run summary as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "DECK2NOTES_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level logs.
    #[arg(short, long, env = "DECK2NOTES_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DECK2NOTES_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Suppress INFO-level logs on stderr while the progress bar is active;
    // the log file still records them.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let stderr_filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    let file_filter = if cli.verbose { "debug" } else { "info" };
    let log_file = (!cli.no_log_file).then_some(cli.log_file.as_path());

    let logs = match LogContext::init(stderr_filter, file_filter, log_file) {
        Ok(logs) => logs,
        Err(e) => {
            eprintln!("{} {e:#}", red("error:"));
            return ExitCode::FAILURE;
        }
    };

    let code = match run(&cli, show_progress).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // Every stderr filter level admits ERROR, so this reaches the user.
            error!("{e:#}");
            ExitCode::FAILURE
        }
    };

    logs.finish();
    code
}

async fn run(cli: &Cli, show_progress: bool) -> Result<()> {
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn ReportProgressCallback>)
    } else {
        None
    };

    let config = build_config(cli, progress_cb)?;
    info!("Annotating {} → {}", cli.input.display(), cli.output.display());

    let summary = annotate_to_file(&cli.input, &cli.output, &config)
        .await
        .context("Annotation failed")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?
        );
    } else if !cli.quiet {
        eprintln!(
            "{}  {}/{} pages  {}ms  →  {}",
            green("✔"),
            summary.annotated_pages,
            summary.total_pages,
            summary.total_duration_ms,
            bold(&cli.output.display().to_string()),
        );
        eprintln!(
            "   {} render  /  {} model calls  /  {} retries  /  {} tokens in, {} out",
            dim(&format!("{}ms", summary.render_duration_ms)),
            dim(&format!("{} in {}ms", summary.model_calls, summary.inference_duration_ms)),
            summary.retries,
            summary.input_tokens,
            summary.output_tokens,
        );
    }

    Ok(())
}

/// Map CLI args to `AnnotateConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<AnnotateConfig> {
    let pages = parse_pages(&cli.pages)?;

    let mut builder = AnnotateConfig::builder()
        .model(cli.model.clone())
        .max_tokens(cli.max_tokens)
        .max_attempts(cli.max_attempts)
        .base_delay(Duration::from_millis(cli.base_delay_ms))
        .max_rendered_pixels(cli.max_pixels)
        .pages(pages);

    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(secs) = cli.api_timeout {
        builder = builder.attempt_timeout(Duration::from_secs(secs));
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password.clone());
    }
    if let Some(ref dir) = cli.scratch_dir {
        builder = builder.scratch_root(dir.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Parse `--pages` string into `PageSelection`.
fn parse_pages(s: &str) -> Result<PageSelection> {
    let s = s.trim().to_lowercase();

    if s == "all" {
        return Ok(PageSelection::All);
    }

    // Range: "3-15"
    if let Some((start, end)) = s.split_once('-') {
        let start: usize = start
            .trim()
            .parse()
            .context("Invalid start page in range")?;
        let end: usize = end.trim().parse().context("Invalid end page in range")?;

        if start < 1 {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", start);
        }
        if start > end {
            anyhow::bail!(
                "Invalid page range '{}-{}': start must be <= end",
                start,
                end
            );
        }

        return Ok(PageSelection::Range(start, end));
    }

    // Set: "1,3,5,7"
    if s.contains(',') {
        let pages: Vec<usize> = s
            .split(',')
            .map(|p| {
                p.trim()
                    .parse::<usize>()
                    .with_context(|| format!("Invalid page number: '{}'", p.trim()))
            })
            .collect::<Result<Vec<_>>>()?;

        if let Some(&p) = pages.iter().find(|&&p| p < 1) {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", p);
        }

        return Ok(PageSelection::Set(pages));
    }

    // Single page: "5"
    let page: usize = s.parse().context("Invalid page number")?;
    if page < 1 {
        anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", page);
    }

    Ok(PageSelection::Single(page))
}

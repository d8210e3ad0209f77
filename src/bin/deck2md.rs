//! CLI binary for deck2md.
//!
//! Maps flags onto `PipelineConfig`, drives a spinner from the stage
//! callbacks and prints the report, the table or the page layout.

use anyhow::{Context, Result};
use clap::Parser;
use deck2md::{
    analyze, analyze_to_file, extract_table, inspect, CacheKeyPolicy, CharBoundsMode,
    PageNumbering, PipelineConfig, PipelineProgressCallback, ProgressCallback, RunOutcome, Stage,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
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

// ── Stage spinner ────────────────────────────────────────────────────────

/// One spinner line that follows the run stage by stage and leaves a
/// finished line per stage above it.
struct StageSpinner {
    bar: ProgressBar,
}

impl StageSpinner {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg} {elapsed:.dim}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("Starting");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl PipelineProgressCallback for StageSpinner {
    fn on_stage_start(&self, stage: Stage) {
        self.bar.set_prefix(stage.label().to_string());
        self.bar.set_message(match stage {
            Stage::Extract => "waiting for the extraction service…",
            Stage::Summarize => "waiting for the model…",
            _ => "",
        });
    }

    fn on_stage_complete(&self, stage: Stage, elapsed_ms: u64) {
        self.bar.println(format!(
            "{} {:<12} {}",
            green("✔"),
            stage.label(),
            dim(&format!("{elapsed_ms}ms"))
        ));
    }

    fn on_cache_hit(&self, path: &Path) {
        self.bar.println(format!(
            "{} cached extraction {}",
            green("✔"),
            dim(&path.display().to_string())
        ));
    }

    fn on_run_complete(&self, outcome: &RunOutcome) {
        self.bar.finish_and_clear();
        if let RunOutcome::NoData(reason) = outcome {
            eprintln!("{} {}", yellow("⚠"), reason);
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Assessment of the first 5 pages (stdout)
  deck2md decks/acme.pdf

  # Last 3 pages, report to a file
  deck2md --tail --max-pages 3 decks/acme.pdf -o reports/acme.md

  # Extracted table only (no model call)
  deck2md --table-only --json decks/acme.pdf > acme-table.json

  # Page sizes only (no service or model call)
  deck2md --inspect-only decks/acme.pdf

  # Ignore cached extractions; key new ones by content
  deck2md --no-cache --cache-key content-hash decks/acme.pdf

FILES (relative to --data-dir, default ./data):
  processed_documents/<base>.pdf                  page-limited PDF
  archives/<base>-output.zip                      extraction archive
  extraction_outputs/<base>-output_transformed.json  normalized document
  tmp/                                            per-run workspace

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  RUST_LOG                Override log filter
"#;

/// Assess PDF pitch decks with a document-extraction service and an LLM.
#[derive(Parser, Debug)]
#[command(
    name = "deck2md",
    version,
    about = "Assess PDF pitch decks: structured extraction + LLM summary as Markdown",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF pitch deck.
    input: PathBuf,

    /// Write the report to this file instead of stdout.
    #[arg(short, long, env = "DECK2MD_OUTPUT")]
    output: Option<PathBuf>,

    /// Number of pages sent to the extraction service.
    #[arg(long, env = "DECK2MD_MAX_PAGES", default_value_t = 5,
          value_parser = clap::value_parser!(u64).range(1..))]
    max_pages: u64,

    /// Take the last pages instead of the first.
    #[arg(long, env = "DECK2MD_TAIL")]
    tail: bool,

    /// Root of the output directories.
    #[arg(long, env = "DECK2MD_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    /// Service-account credentials JSON for the extraction service.
    #[arg(long, env = "DECK2MD_CREDENTIALS")]
    credentials: Option<PathBuf>,

    /// Extraction service base URL.
    #[arg(long, env = "DECK2MD_SERVICE_URL")]
    service_url: Option<String>,

    /// Skip the cache lookup (results are still stored).
    #[arg(long, env = "DECK2MD_NO_CACHE")]
    no_cache: bool,

    /// How cache entries are keyed.
    #[arg(long, env = "DECK2MD_CACHE_KEY", value_enum, default_value = "base-name")]
    cache_key: CacheKeyArg,

    /// How per-character boxes are normalized.
    #[arg(long, env = "DECK2MD_CHAR_BOUNDS", value_enum, default_value = "element-box")]
    char_bounds: CharBoundsArg,

    /// Levels of Kids to normalize below top-level elements ("all" for no limit).
    #[arg(long, env = "DECK2MD_KID_DEPTH", default_value = "1")]
    kid_depth: String,

    /// Treat element Page values as 0-based.
    #[arg(long, env = "DECK2MD_ZERO_BASED_PAGES")]
    zero_based_pages: bool,

    /// Extraction timeout in seconds (0 = wait indefinitely).
    #[arg(long, env = "DECK2MD_TIMEOUT", default_value_t = 300)]
    timeout: u64,

    /// Extra extraction attempts after a service-side failure (at most 10).
    #[arg(long, env = "DECK2MD_RETRIES", default_value_t = 0,
          value_parser = clap::value_parser!(u32).range(0..=10))]
    retries: u32,

    /// LLM model ID.
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Path to a text file replacing the reviewer instruction.
    #[arg(long, env = "DECK2MD_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Max LLM output tokens.
    #[arg(long, env = "DECK2MD_MAX_TOKENS", default_value_t = 2048)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "DECK2MD_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Stop after flattening and print the table.
    #[arg(long)]
    table_only: bool,

    /// Output JSON instead of Markdown / plain text.
    #[arg(long, env = "DECK2MD_JSON")]
    json: bool,

    /// Print page count and sizes only.
    #[arg(long)]
    inspect_only: bool,

    /// Disable the spinner.
    #[arg(long, env = "DECK2MD_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DECK2MD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DECK2MD_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum CacheKeyArg {
    BaseName,
    ContentHash,
}

impl From<CacheKeyArg> for CacheKeyPolicy {
    fn from(v: CacheKeyArg) -> Self {
        match v {
            CacheKeyArg::BaseName => CacheKeyPolicy::BaseName,
            CacheKeyArg::ContentHash => CacheKeyPolicy::ContentHash,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum CharBoundsArg {
    ElementBox,
    PerCharacter,
}

impl From<CharBoundsArg> for CharBoundsMode {
    fn from(v: CharBoundsArg) -> Self {
        match v {
            CharBoundsArg::ElementBox => CharBoundsMode::ElementBox,
            CharBoundsArg::PerCharacter => CharBoundsMode::PerCharacter,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner replaces INFO logs; -v brings them back at DEBUG.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.inspect_only;
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

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let info = inspect(&cli.input).await.context("Failed to inspect PDF")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&info).context("Failed to serialise page info")?
            );
        } else {
            println!("File:   {}", info.path.display());
            println!("Key:    {}", info.base_name);
            println!("Pages:  {}", info.page_count());
            for size in &info.page_sizes {
                println!(
                    "  [{:>3}] {} x {}",
                    size.page_index, size.width, size.height
                );
            }
        }
        return Ok(());
    }

    let progress: Option<ProgressCallback> = if show_progress {
        Some(StageSpinner::new() as Arc<dyn PipelineProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress).await?;

    // ── Table-only mode ──────────────────────────────────────────────────
    if cli.table_only {
        let output = extract_table(&cli.input, &config)
            .await
            .context("Extraction failed")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&output).context("Failed to serialise table")?
            );
        } else {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            for text in output.table.texts() {
                writeln!(handle, "{text}").context("Failed to write to stdout")?;
            }
        }
        if !cli.quiet {
            eprintln!(
                "   {} rows from {} elements{}",
                bold(&output.stats.row_count.to_string()),
                output.stats.element_count,
                if output.stats.cache_hit { dim("  (cached)") } else { String::new() }
            );
        }
        return Ok(());
    }

    // ── Full analysis ────────────────────────────────────────────────────
    let output = match cli.output {
        Some(ref path) => analyze_to_file(&cli.input, path, &config).await,
        None => analyze(&cli.input, &config).await,
    }
    .context("Analysis failed")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("Failed to serialise output")?
        );
    } else if cli.output.is_none() && output.has_report() {
        io::stdout()
            .lock()
            .write_all(output.report.as_bytes())
            .context("Failed to write to stdout")?;
    }

    if !cli.quiet && output.has_report() {
        let stats = &output.stats;
        let target = cli
            .output
            .as_ref()
            .map(|p| format!("  →  {}", bold(&p.display().to_string())))
            .unwrap_or_default();
        eprintln!(
            "{}  {} rows  {}ms{}",
            green("✔"),
            stats.row_count,
            stats.total_duration_ms,
            target
        );
        eprintln!(
            "   {} tokens in  /  {} tokens out{}",
            dim(&stats.input_tokens.to_string()),
            dim(&stats.output_tokens.to_string()),
            if stats.cache_hit { dim("  (cached extraction)") } else { String::new() }
        );
    }

    Ok(())
}

/// Map CLI args to `PipelineConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let system_prompt = match cli.system_prompt {
        Some(ref path) => Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read system prompt from {:?}", path))?,
        ),
        None => None,
    };

    let mut builder = PipelineConfig::builder()
        .max_pages(cli.max_pages as usize)
        .tail(cli.tail)
        .data_root(&cli.data_dir)
        .use_cache(!cli.no_cache)
        .cache_key(cli.cache_key.into())
        .char_bounds(cli.char_bounds.into())
        .kid_depth(parse_kid_depth(&cli.kid_depth)?)
        .page_numbering(if cli.zero_based_pages {
            PageNumbering::ZeroBased
        } else {
            PageNumbering::OneBased
        })
        .extraction_timeout_secs(cli.timeout)
        .extraction_retries(cli.retries)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature);

    if let Some(ref path) = cli.credentials {
        builder = builder.credentials_path(path);
    }
    if let Some(ref url) = cli.service_url {
        builder = builder.service_base_url(url);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(prompt) = system_prompt {
        builder = builder.system_prompt(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Parse `--kid-depth`: a level count or `all`.
fn parse_kid_depth(s: &str) -> Result<Option<usize>> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("all") {
        return Ok(None);
    }
    s.parse::<usize>()
        .map(Some)
        .with_context(|| format!("Invalid --kid-depth '{s}': expected a number or 'all'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kid_depth_accepts_numbers_and_all() {
        assert_eq!(parse_kid_depth("1").unwrap(), Some(1));
        assert_eq!(parse_kid_depth(" 3 ").unwrap(), Some(3));
        assert_eq!(parse_kid_depth("ALL").unwrap(), None);
    }

    #[test]
    fn kid_depth_rejects_garbage() {
        assert!(parse_kid_depth("deep").is_err());
        assert!(parse_kid_depth("-1").is_err());
    }
}

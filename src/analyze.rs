//! Run entry points: one deck in, one assessment (or table) out.
//!
//! The pipeline is linear. [`extract`] covers input validation through the
//! cached normalized document, [`extract_table`] adds flattening, and
//! [`analyze`] adds the model request. Stages inside one run never overlap.
//!
//! Page selection and archive staging share a per-run temporary workspace
//! under [`crate::config::OutputLayout::workspace_root`]. It is removed when
//! the extraction half finishes, whether it succeeded or not.

use crate::config::PipelineConfig;
use crate::error::DeckError;
use crate::model::Document;
use crate::output::{
    AnalysisOutput, Artifacts, DeckInfo, Extraction, NoDataReason, RunOutcome, RunStats,
    TableOutput,
};
use crate::pipeline::cache::{write_atomic, CacheKey, ExtractionCache};
use crate::pipeline::extract::{self, ExtractionPolicy};
use crate::pipeline::flatten::{self, Table};
use crate::pipeline::input::{self, DeckInput};
use crate::pipeline::normalize::{self, NormalizeOptions};
use crate::pipeline::select::{self, PageWindow};
use crate::pipeline::summarize;
use crate::pipeline::unpack;
use crate::progress::Stage;
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Default model when none is configured.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Analyse a pitch deck and return the Markdown assessment.
///
/// # Errors
/// Every failure is fatal to the run: input errors, service faults,
/// page/element mismatches, schema errors and model errors. A deck that
/// yields no usable text is not an error; the returned
/// [`AnalysisOutput::outcome`] is [`RunOutcome::NoData`] and the report is
/// empty.
pub async fn analyze(
    input_path: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<AnalysisOutput, DeckError> {
    let total_start = Instant::now();
    let input_path = input_path.as_ref();
    info!("Starting analysis: {}", input_path.display());

    // ── Step 1: Validate input ───────────────────────────────────────────
    let deck = input::resolve_input(input_path)?;

    // ── Step 2: Resolve the model provider ───────────────────────────────
    // Before any extraction-service call.
    let provider = resolve_provider(config).await?;

    // ── Step 3: Extract and flatten ──────────────────────────────────────
    let tabled = build_table(deck, config).await?;
    let mut stats = tabled.stats;

    if let RunOutcome::NoData(reason) = tabled.outcome {
        warn!("{}: {}", input_path.display(), reason);
        stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
        let output = AnalysisOutput {
            outcome: tabled.outcome,
            report: String::new(),
            artifacts: tabled.artifacts,
            stats,
        };
        notify_run_complete(config, &output.outcome);
        return Ok(output);
    }

    // ── Step 4: Summarize ────────────────────────────────────────────────
    let started = stage_start(config, Stage::Summarize);
    let summary = summarize::summarize(&provider, &tabled.table, config).await?;
    stats.summarize_duration_ms = stage_done(config, Stage::Summarize, started);
    stats.input_tokens = summary.input_tokens;
    stats.output_tokens = summary.output_tokens;
    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

    info!(
        "Analysis complete: {} rows, {} report chars, {}ms total",
        stats.row_count,
        summary.markdown.len(),
        stats.total_duration_ms
    );

    let output = AnalysisOutput {
        outcome: RunOutcome::Completed,
        report: summary.markdown,
        artifacts: tabled.artifacts,
        stats,
    };
    notify_run_complete(config, &output.outcome);
    Ok(output)
}

/// Analyse a deck and write the report to `output_path`.
///
/// The file is written through a temporary sibling and renamed into place.
/// Nothing is written when the run ends with [`RunOutcome::NoData`].
pub async fn analyze_to_file(
    input_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<AnalysisOutput, DeckError> {
    let output = analyze(input_path, config).await?;
    if output.has_report() {
        write_atomic(output_path.as_ref(), output.report.as_bytes()).await?;
        debug!("Report written to {}", output_path.as_ref().display());
    }
    Ok(output)
}

/// Synchronous wrapper around [`analyze`].
///
/// Creates a temporary tokio runtime internally.
pub fn analyze_sync(
    input_path: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<AnalysisOutput, DeckError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| DeckError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(analyze(input_path, config))
}

/// Run every stage except the model request and return the flattened table.
///
/// Needs extraction-service credentials (unless the cache hits) but no model
/// provider.
pub async fn extract_table(
    input_path: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<TableOutput, DeckError> {
    let total_start = Instant::now();
    let deck = input::resolve_input(input_path)?;
    let mut output = build_table(deck, config).await?;
    output.stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
    notify_run_complete(config, &output.outcome);
    Ok(output)
}

/// Produce the normalized document for a deck, from cache when possible.
///
/// On a cache miss this selects pages, calls the extraction service,
/// unpacks and normalizes the result and stores it. The returned
/// [`Extraction::document`] is `None` when the service archive held no
/// structured data.
pub async fn extract(
    input_path: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<Extraction, DeckError> {
    let deck = input::resolve_input(input_path)?;
    extract_deck(deck, config).await
}

/// Read the page count and page sizes of a PDF.
///
/// Does not call the extraction service or need any credentials.
pub async fn inspect(input_path: impl AsRef<Path>) -> Result<DeckInfo, DeckError> {
    let deck = input::resolve_input(input_path)?;
    let page_sizes = select::inspect_pages(&deck.path).await?;
    Ok(DeckInfo {
        path: deck.path,
        base_name: deck.base_name,
        page_sizes,
    })
}

// ── Internal helpers ─────────────────────────────────────────────────────

async fn extract_deck(deck: DeckInput, config: &PipelineConfig) -> Result<Extraction, DeckError> {
    let total_start = Instant::now();

    // ── Step 1: Page window ──────────────────────────────────────────────
    let window = PageWindow {
        max_pages: config.max_pages,
        tail: config.tail,
    };

    // ── Step 2: Cache lookup ─────────────────────────────────────────────
    let cache = ExtractionCache::new(config.layout.cache_dir.clone(), config.cache_key);
    let key = cache.key_for(&deck, window).await?;
    if config.use_cache {
        if let Some(hit) = cache.lookup(&key).await? {
            if let Some(ref cb) = config.progress_callback {
                cb.on_cache_hit(&hit.path);
            }
            let stats = RunStats {
                cache_hit: true,
                element_count: hit.document.elements.len(),
                total_duration_ms: total_start.elapsed().as_millis() as u64,
                ..Default::default()
            };
            return Ok(Extraction {
                document: Some(hit.document),
                page_sizes: Vec::new(),
                artifacts: Artifacts {
                    document: Some(hit.path),
                    ..Default::default()
                },
                stats,
            });
        }
    } else {
        debug!("Cache disabled; extracting {}", deck.base_name);
    }

    // ── Step 3: Extraction service ───────────────────────────────────────
    // Resolved before the workspace is created.
    let service = extract::resolve_service(config)?;

    // ── Step 4: Scoped workspace ─────────────────────────────────────────
    std::fs::create_dir_all(&config.layout.workspace_root).map_err(|e| {
        DeckError::OutputWriteFailed {
            path: config.layout.workspace_root.clone(),
            source: e,
        }
    })?;
    let workspace = tempfile::Builder::new()
        .prefix(&format!("{}-", deck.base_name))
        .tempdir_in(&config.layout.workspace_root)
        .map_err(|e| DeckError::OutputWriteFailed {
            path: config.layout.workspace_root.clone(),
            source: e,
        })?;
    debug!("Workspace: {}", workspace.path().display());

    let result = run_extraction(
        &deck,
        window,
        &key,
        &cache,
        service.as_ref(),
        workspace.path(),
        config,
    )
    .await;

    let workspace_path = workspace.path().to_path_buf();
    if let Err(e) = workspace.close() {
        warn!(
            "Failed to remove workspace {}: {}",
            workspace_path.display(),
            e
        );
    }

    let mut extraction = result?;
    extraction.stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
    Ok(extraction)
}

async fn build_table(deck: DeckInput, config: &PipelineConfig) -> Result<TableOutput, DeckError> {
    let extraction = extract_deck(deck, config).await?;
    let mut stats = extraction.stats;

    let Some(document) = extraction.document else {
        return Ok(TableOutput {
            outcome: RunOutcome::NoData(NoDataReason::NoStructuredData),
            table: Table::default(),
            artifacts: extraction.artifacts,
            stats,
        });
    };

    let started = stage_start(config, Stage::Flatten);
    let table = flatten::flatten(&document)?;
    stage_done(config, Stage::Flatten, started);
    stats.row_count = table.len();
    info!(
        "Flattened {} elements into {} rows",
        stats.element_count,
        table.len()
    );

    let outcome = if table.is_empty() {
        RunOutcome::NoData(NoDataReason::NoSubstantiveText)
    } else {
        RunOutcome::Completed
    };
    Ok(TableOutput {
        outcome,
        table,
        artifacts: extraction.artifacts,
        stats,
    })
}

async fn run_extraction(
    deck: &DeckInput,
    window: PageWindow,
    key: &CacheKey,
    cache: &ExtractionCache,
    service: &dyn extract::ExtractionService,
    workspace: &Path,
    config: &PipelineConfig,
) -> Result<Extraction, DeckError> {
    let layout = &config.layout;
    let mut stats = RunStats::default();
    let mut artifacts = Artifacts::default();

    // ── Select pages ─────────────────────────────────────────────────────
    let started = stage_start(config, Stage::SelectPages);
    let staged_pdf = workspace.join(format!("{}.pdf", deck.base_name));
    let selection = select::select_pages(&deck.path, &staged_pdf, window).await?;
    stats.select_duration_ms = stage_done(config, Stage::SelectPages, started);
    stats.selected_pages = selection.page_sizes.len();

    let limited_pdf = layout.processed_dir.join(format!("{}.pdf", deck.base_name));
    persist(&selection.output_path, &limited_pdf).await?;
    artifacts.page_limited_pdf = Some(limited_pdf);

    // ── Extract ──────────────────────────────────────────────────────────
    let started = stage_start(config, Stage::Extract);
    let (result, attempts) = extract::extract_with_policy(
        service,
        &selection.output_path,
        ExtractionPolicy::from_config(config),
    )
    .await?;
    stats.extraction_attempts = attempts;
    stats.extraction_duration_ms = stage_done(config, Stage::Extract, started);
    info!(
        "Extraction finished in {}ms ({} attempt(s))",
        stats.extraction_duration_ms, attempts
    );

    // ── Unpack ───────────────────────────────────────────────────────────
    let started = stage_start(config, Stage::Unpack);
    let staged_zip = unpack::archive_path(workspace, &deck.base_name);
    let unpacked = unpack::unpack(&result, &staged_zip).await?;
    let archive = unpack::archive_path(&layout.archive_dir, &deck.base_name);
    persist(&staged_zip, &archive).await?;
    artifacts.archive = Some(archive);
    stage_done(config, Stage::Unpack, started);

    let Some(document) = unpacked else {
        warn!("No structured data in the extraction result for {}", deck.base_name);
        return Ok(Extraction {
            document: None,
            page_sizes: selection.page_sizes,
            artifacts,
            stats,
        });
    };

    // ── Normalize ────────────────────────────────────────────────────────
    let started = stage_start(config, Stage::Normalize);
    let document: Document = normalize::normalize(
        document,
        &selection.page_sizes,
        &NormalizeOptions::from_config(config),
    )?;
    stats.normalize_duration_ms = stage_done(config, Stage::Normalize, started);
    stats.element_count = document.elements.len();

    // ── Store ────────────────────────────────────────────────────────────
    let started = stage_start(config, Stage::Store);
    artifacts.document = Some(cache.store(key, &document).await?);
    stage_done(config, Stage::Store, started);

    Ok(Extraction {
        document: Some(document),
        page_sizes: selection.page_sizes,
        artifacts,
        stats,
    })
}

/// Copy a staged file to its persisted location, replacing any previous file.
async fn persist(staged: &Path, dest: &Path) -> Result<(), DeckError> {
    let fail = |e: std::io::Error| DeckError::OutputWriteFailed {
        path: dest.to_path_buf(),
        source: e,
    };
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(fail)?;
    }
    if tokio::fs::try_exists(dest).await.unwrap_or(false) {
        tokio::fs::remove_file(dest).await.map_err(fail)?;
    }
    tokio::fs::copy(staged, dest).await.map_err(fail)?;
    Ok(())
}

fn stage_start(config: &PipelineConfig, stage: Stage) -> Instant {
    debug!("Stage started: {}", stage);
    if let Some(ref cb) = config.progress_callback {
        cb.on_stage_start(stage);
    }
    Instant::now()
}

fn stage_done(config: &PipelineConfig, stage: Stage, started: Instant) -> u64 {
    let elapsed_ms = started.elapsed().as_millis() as u64;
    debug!("Stage finished: {} ({}ms)", stage, elapsed_ms);
    if let Some(ref cb) = config.progress_callback {
        cb.on_stage_complete(stage, elapsed_ms);
    }
    elapsed_ms
}

fn notify_run_complete(config: &PipelineConfig, outcome: &RunOutcome) {
    if let Some(ref cb) = config.progress_callback {
        cb.on_run_complete(outcome);
    }
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, DeckError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        DeckError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the model provider, most specific first:
///
/// 1. `config.provider`, used as-is
/// 2. `config.provider_name` with `config.model` (or [`DEFAULT_MODEL`])
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, when both are set
/// 4. OpenAI when `OPENAI_API_KEY` is set
/// 5. [`ProviderFactory::from_env`] auto-detection
pub async fn resolve_provider(config: &PipelineConfig) -> Result<Arc<dyn LLMProvider>, DeckError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
    if let Some(ref name) = config.provider_name {
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return create_provider(&prov, &env_model);
        }
    }

    if std::env::var("OPENAI_API_KEY").is_ok_and(|k| !k.is_empty()) {
        return create_provider("openai", model);
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| DeckError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::select::tests::write_test_pdf;

    #[tokio::test]
    async fn inspect_reports_every_page() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deck.pdf");
        write_test_pdf(&path, 3);

        let info = inspect(&path).await.unwrap();
        assert_eq!(info.base_name, "deck");
        assert_eq!(info.page_count(), 3);
        assert_eq!(info.page_sizes[2].width, 602.0);
    }

    #[tokio::test]
    async fn missing_credentials_leave_no_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deck.pdf");
        write_test_pdf(&path, 2);
        let config = PipelineConfig::builder()
            .data_root(dir.path().join("data"))
            .credentials_path(dir.path().join("missing.json"))
            .build()
            .unwrap();

        let err = extract(&path, &config).await.unwrap_err();
        assert!(matches!(err, DeckError::Credentials { .. }));
        assert!(!config.layout.workspace_root.exists());
    }

    #[test]
    fn sync_wrapper_reports_input_errors() {
        let err = analyze_sync("/no/such/deck.pdf", &PipelineConfig::default()).unwrap_err();
        assert!(err.is_input_error());
    }
}

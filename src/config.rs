//! Configuration types for a single pipeline run.
//!
//! Every knob lives in [`PipelineConfig`], built via its
//! [`PipelineConfigBuilder`]. The config is passed explicitly to each entry
//! point, so two runs with different output roots or credentials can coexist
//! in one process.

use crate::error::DeckError;
use crate::pipeline::extract::{ExtractionService, MAX_EXTRACTION_RETRIES};
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default location of the service-account credentials file.
pub const DEFAULT_CREDENTIALS_PATH: &str = "credentials/pdfservices-api-credentials.json";

/// Default extraction service endpoint.
pub const DEFAULT_SERVICE_BASE_URL: &str = "https://pdf-services.adobe.io";

/// Configuration for one pitch-deck analysis.
///
/// # Example
/// ```rust
/// use deck2md::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .max_pages(8)
///     .tail(false)
///     .model("gpt-4.1-mini")
///     .build()
///     .unwrap();
/// assert_eq!(config.max_pages, 8);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Number of pages to keep from the deck. Default: 5.
    pub max_pages: usize,

    /// Take the last `max_pages` pages instead of the first. Default: false.
    pub tail: bool,

    /// Service-account credentials JSON for the extraction service.
    pub credentials_path: PathBuf,

    /// Base URL of the extraction service REST API.
    pub service_base_url: String,

    /// Where persisted and temporary artefacts go.
    pub layout: OutputLayout,

    /// Consult and populate the extraction cache. Default: true.
    pub use_cache: bool,

    /// How cache entries are keyed. Default: [`CacheKeyPolicy::BaseName`].
    pub cache_key: CacheKeyPolicy,

    /// How `CharBounds` are normalized. Default: [`CharBoundsMode::ElementBox`].
    pub char_bounds: CharBoundsMode,

    /// How many levels of `Kids` below each top-level element get their own
    /// percentile bounds. Default: `Some(1)`. `None` walks the whole tree.
    pub kid_depth: Option<usize>,

    /// How element `Page` values map onto the selected page list.
    /// Default: [`PageNumbering::OneBased`].
    pub page_numbering: PageNumbering,

    /// Upper bound on one extraction call, polling included. Default: 300.
    /// `0` waits indefinitely.
    pub extraction_timeout_secs: u64,

    /// Delay between job-status polls. Default: 2000.
    pub poll_interval_ms: u64,

    /// Extra extraction attempts after a service-side fault. Default: 0.
    ///
    /// The default is a single attempt: a failed call ends the run. Quota and
    /// client faults are never retried regardless of this value. Capped at
    /// [`MAX_EXTRACTION_RETRIES`].
    pub extraction_retries: u32,

    /// Base back-off before a retried extraction, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Pre-constructed extraction service. Takes precedence over `credentials_path`.
    pub extraction_service: Option<Arc<dyn ExtractionService>>,

    /// LLM model identifier. If None, uses the provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for the summary. Default: 0.0.
    pub temperature: f32,

    /// Maximum tokens in the generated report. Default: 2048.
    pub max_tokens: usize,

    /// Replacement for the built-in analyst instruction.
    pub system_prompt: Option<String>,

    /// Optional stage-level progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_pages: 5,
            tail: false,
            credentials_path: PathBuf::from(DEFAULT_CREDENTIALS_PATH),
            service_base_url: DEFAULT_SERVICE_BASE_URL.to_string(),
            layout: OutputLayout::default(),
            use_cache: true,
            cache_key: CacheKeyPolicy::default(),
            char_bounds: CharBoundsMode::default(),
            kid_depth: Some(1),
            page_numbering: PageNumbering::default(),
            extraction_timeout_secs: 300,
            poll_interval_ms: 2000,
            extraction_retries: 0,
            retry_backoff_ms: 500,
            extraction_service: None,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_tokens: 2048,
            system_prompt: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("max_pages", &self.max_pages)
            .field("tail", &self.tail)
            .field("credentials_path", &self.credentials_path)
            .field("service_base_url", &self.service_base_url)
            .field("layout", &self.layout)
            .field("use_cache", &self.use_cache)
            .field("cache_key", &self.cache_key)
            .field("char_bounds", &self.char_bounds)
            .field("kid_depth", &self.kid_depth)
            .field("page_numbering", &self.page_numbering)
            .field("extraction_timeout_secs", &self.extraction_timeout_secs)
            .field("extraction_retries", &self.extraction_retries)
            .field(
                "extraction_service",
                &self
                    .extraction_service
                    .as_ref()
                    .map(|_| "<dyn ExtractionService>"),
            )
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn max_pages(mut self, n: usize) -> Self {
        self.config.max_pages = n;
        self
    }

    pub fn tail(mut self, v: bool) -> Self {
        self.config.tail = v;
        self
    }

    pub fn credentials_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.credentials_path = path.into();
        self
    }

    pub fn service_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.service_base_url = url.into();
        self
    }

    pub fn layout(mut self, layout: OutputLayout) -> Self {
        self.config.layout = layout;
        self
    }

    /// Put every artefact directory under `root` (see [`OutputLayout::under`]).
    pub fn data_root(mut self, root: impl AsRef<Path>) -> Self {
        self.config.layout = OutputLayout::under(root);
        self
    }

    pub fn use_cache(mut self, v: bool) -> Self {
        self.config.use_cache = v;
        self
    }

    pub fn cache_key(mut self, policy: CacheKeyPolicy) -> Self {
        self.config.cache_key = policy;
        self
    }

    pub fn char_bounds(mut self, mode: CharBoundsMode) -> Self {
        self.config.char_bounds = mode;
        self
    }

    pub fn kid_depth(mut self, depth: Option<usize>) -> Self {
        self.config.kid_depth = depth;
        self
    }

    pub fn page_numbering(mut self, numbering: PageNumbering) -> Self {
        self.config.page_numbering = numbering;
        self
    }

    pub fn extraction_timeout_secs(mut self, secs: u64) -> Self {
        self.config.extraction_timeout_secs = secs;
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms.max(10);
        self
    }

    pub fn extraction_retries(mut self, n: u32) -> Self {
        self.config.extraction_retries = n.min(MAX_EXTRACTION_RETRIES);
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn extraction_service(mut self, service: Arc<dyn ExtractionService>) -> Self {
        self.config.extraction_service = Some(service);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, DeckError> {
        let c = &self.config;
        if c.max_pages == 0 {
            return Err(DeckError::InvalidConfig(
                "max_pages must be ≥ 1".into(),
            ));
        }
        if c.service_base_url.trim().is_empty() {
            return Err(DeckError::InvalidConfig(
                "service_base_url must not be empty".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(DeckError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        Ok(self.config)
    }
}

// ── Output layout ────────────────────────────────────────────────────────

/// Directories used by a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputLayout {
    /// Page-limited PDFs (`<base>.pdf`).
    pub processed_dir: PathBuf,
    /// Service archives (`<base>-output.zip`).
    pub archive_dir: PathBuf,
    /// Normalized documents (`<base>-output_transformed.json`).
    pub cache_dir: PathBuf,
    /// Parent of the per-run temporary workspace.
    pub workspace_root: PathBuf,
}

impl OutputLayout {
    /// The default directory names rooted at `root` instead of `data/`.
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            processed_dir: root.join("processed_documents"),
            archive_dir: root.join("archives"),
            cache_dir: root.join("extraction_outputs"),
            workspace_root: root.join("tmp"),
        }
    }
}

impl Default for OutputLayout {
    fn default() -> Self {
        Self::under("data")
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How extraction cache entries are keyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CacheKeyPolicy {
    /// Input file base name; any cached file starting with it is a hit. (default)
    ///
    /// Two different decks with the same file name share an entry.
    #[default]
    BaseName,
    /// SHA-256 of the input bytes plus the page-window parameters, recorded in
    /// an index file next to the entries.
    ContentHash,
}

/// How `CharBounds` entries are converted to `PercentileCharBounds`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CharBoundsMode {
    /// Every entry receives the element's own percentile box. (default)
    #[default]
    ElementBox,
    /// Every entry is transformed from its own character box.
    PerCharacter,
}

/// Interpretation of the `Page` attribute on extracted elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageNumbering {
    /// `Page = n` refers to `page_sizes[n - 1]`. (default)
    #[default]
    OneBased,
    /// `Page = n` refers to `page_sizes[n]`.
    ZeroBased,
}

impl PageNumbering {
    /// Map an element's `Page` value to an index into the page-size list.
    pub fn to_index(self, page: i64) -> Option<usize> {
        let idx = match self {
            PageNumbering::OneBased => page.checked_sub(1)?,
            PageNumbering::ZeroBased => page,
        };
        usize::try_from(idx).ok()
    }
}

//! # deck2md
//!
//! Turn a PDF pitch deck into a structured investment assessment in Markdown.
//!
//! A document-extraction service reads the first (or last) few pages of the
//! deck and returns a structured-content tree. This crate normalizes the
//! element geometry to page-relative coordinates, caches the result,
//! flattens it into a row-per-element table and hands the text to a language
//! model with a fixed assessment template.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input      validate the file, derive the base name
//!  ├─ 2. Cache      reuse a stored normalized document when present
//!  ├─ 3. Select     keep a head/tail window of pages, record page sizes
//!  ├─ 4. Extract    PDF Services job: text + tables, table/figure renditions
//!  ├─ 5. Unpack     structuredData.json from the result archive
//!  ├─ 6. Normalize  Bounds → PercentileBounds per element
//!  ├─ 7. Store      persist the normalized document
//!  ├─ 8. Flatten    one row per element with at least 3 chars of text
//!  └─ 9. Summarize  single model request, cleaned Markdown out
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use deck2md::{analyze, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Service credentials from credentials/pdfservices-api-credentials.json,
//!     // model provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY.
//!     let config = PipelineConfig::builder().max_pages(5).build()?;
//!     let output = analyze("decks/acme.pdf", &config).await?;
//!     if output.has_report() {
//!         println!("{}", output.report);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `deck2md` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod config;
pub mod error;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::{analyze, analyze_sync, analyze_to_file, extract, extract_table, inspect};
pub use config::{
    CacheKeyPolicy, CharBoundsMode, OutputLayout, PageNumbering, PipelineConfig,
    PipelineConfigBuilder,
};
pub use error::{DeckError, ServiceFault};
pub use model::{Document, Element, PageSize, PercentileBounds};
pub use output::{
    AnalysisOutput, Artifacts, DeckInfo, Extraction, NoDataReason, RunOutcome, RunStats,
    TableOutput,
};
pub use pipeline::extract::{ExtractionService, PdfServicesClient, ServiceResult};
pub use pipeline::flatten::Table;
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback, Stage};

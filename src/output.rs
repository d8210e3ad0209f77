//! Result types returned by the entry points in [`crate::analyze`].

use crate::model::{Document, PageSize};
use crate::pipeline::flatten::Table;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Why a run produced no report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoDataReason {
    /// The service archive held no `structuredData.json`.
    NoStructuredData,
    /// Structured data was found but no element carried at least three
    /// characters of text.
    NoSubstantiveText,
}

impl fmt::Display for NoDataReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoDataReason::NoStructuredData => f.write_str("no structured data extracted"),
            NoDataReason::NoSubstantiveText => f.write_str("no substantive text extracted"),
        }
    }
}

/// How a run ended, when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunOutcome {
    /// Every stage ran and produced output.
    Completed,
    /// The run finished cleanly but had nothing to analyse.
    NoData(NoDataReason),
}

/// Files written (or reused) by a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifacts {
    /// The page-limited PDF sent to the extraction service.
    pub page_limited_pdf: Option<PathBuf>,
    /// The persisted service archive.
    pub archive: Option<PathBuf>,
    /// The normalized document, freshly written or loaded from cache.
    pub document: Option<PathBuf>,
}

/// Timing and volume counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub cache_hit: bool,
    pub selected_pages: usize,
    pub element_count: usize,
    pub row_count: usize,
    pub extraction_attempts: u32,
    pub select_duration_ms: u64,
    pub extraction_duration_ms: u64,
    pub normalize_duration_ms: u64,
    pub summarize_duration_ms: u64,
    pub total_duration_ms: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// The normalized document produced by the extraction half of the pipeline.
#[derive(Debug, Clone)]
pub struct Extraction {
    /// `None` when the service returned no structured data.
    pub document: Option<Document>,
    /// Sizes of the selected pages; empty on a cache hit.
    pub page_sizes: Vec<PageSize>,
    pub artifacts: Artifacts,
    pub stats: RunStats,
}

/// Output of [`crate::analyze::extract_table`].
#[derive(Debug, Clone, Serialize)]
pub struct TableOutput {
    pub outcome: RunOutcome,
    pub table: Table,
    pub artifacts: Artifacts,
    pub stats: RunStats,
}

/// Output of [`crate::analyze::analyze`].
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisOutput {
    pub outcome: RunOutcome,
    /// The Markdown assessment; empty when `outcome` is `NoData`.
    pub report: String,
    pub artifacts: Artifacts,
    pub stats: RunStats,
}

impl AnalysisOutput {
    pub fn has_report(&self) -> bool {
        self.outcome == RunOutcome::Completed
    }
}

/// Page layout of a PDF, as reported by [`crate::analyze::inspect`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeckInfo {
    pub path: PathBuf,
    pub base_name: String,
    pub page_sizes: Vec<PageSize>,
}

impl DeckInfo {
    pub fn page_count(&self) -> usize {
        self.page_sizes.len()
    }
}

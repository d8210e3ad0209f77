//! Error types for the deck2md library.
//!
//! Every failure that aborts a run is a [`DeckError`]. The variants are
//! grouped the way the pipeline fails:
//!
//! * **Input**: the PDF cannot be opened or is not a PDF. Nothing has been
//!   written yet, so there is nothing to clean up.
//! * **Service**: the extraction service rejected or failed the job. The
//!   three [`ServiceFault`] categories are kept apart because only the caller
//!   decides what to do about each (wait for quota, fix credentials, try
//!   later).
//! * **Consistency**: [`DeckError::PageSizeNotFound`] means the extracted
//!   elements reference a page that was never selected. It is never skipped.
//! * **Schema**: the structured data does not have the expected shape.
//!
//! An extraction that succeeds but yields no structured data is *not* an
//! error; see [`crate::output::RunOutcome::NoData`].

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Which side of the extraction service contract failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ServiceFault {
    /// The service itself failed (5xx, failed job, dropped connection).
    Service,
    /// Usage or billing limit reached.
    Quota,
    /// The request was malformed or the credentials were rejected.
    Client,
}

impl fmt::Display for ServiceFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceFault::Service => "service error",
            ServiceFault::Quota => "quota exceeded",
            ServiceFault::Client => "client error",
        };
        f.write_str(s)
    }
}

/// All fatal errors returned by the deck2md library.
#[derive(Debug, Error)]
pub enum DeckError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// PDF structure could not be parsed or rewritten.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// A selected page has no usable MediaBox.
    #[error("Page {page} of '{path}' has an invalid page box: {detail}")]
    InvalidPageBox {
        path: PathBuf,
        page: usize,
        detail: String,
    },

    // ── Extraction service errors ─────────────────────────────────────────
    /// The extraction service call failed.
    #[error("Extraction {fault}: {detail}")]
    Service { fault: ServiceFault, detail: String },

    /// The extraction call did not finish within the configured limit.
    #[error("Extraction timed out after {secs}s\nIncrease --extraction-timeout or pass 0 to wait indefinitely.")]
    ExtractionTimeout { secs: u64 },

    /// The service-account credentials file is missing or malformed.
    #[error("Cannot load extraction credentials from '{path}': {detail}")]
    Credentials { path: PathBuf, detail: String },

    /// The returned archive could not be written or read as a zip container.
    #[error("Extraction archive '{path}' is unreadable: {detail}")]
    Archive { path: PathBuf, detail: String },

    // ── Consistency / schema errors ───────────────────────────────────────
    /// An element references a page that is not in the selected page sizes.
    #[error("Element references page {page} but only {available} page size(s) were selected")]
    PageSizeNotFound { page: i64, available: usize },

    /// The structured data lacks the expected top-level layout.
    #[error("Structured data schema mismatch: {0}")]
    Schema(String),

    // ── Cache errors ──────────────────────────────────────────────────────
    /// A cache entry could not be read or written.
    #[error("Extraction cache error at '{path}': {detail}")]
    Cache { path: PathBuf, detail: String },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The LLM API returned an error.
    #[error("LLM API error: {message}")]
    LlmApiError { message: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DeckError {
    /// Shorthand for a [`DeckError::Service`] error.
    pub fn service(fault: ServiceFault, detail: impl Into<String>) -> Self {
        DeckError::Service {
            fault,
            detail: detail.into(),
        }
    }

    /// The service fault category, if this error came from the extraction service.
    pub fn fault(&self) -> Option<ServiceFault> {
        match self {
            DeckError::Service { fault, .. } => Some(*fault),
            _ => None,
        }
    }

    /// True for every failure at the extraction-service boundary, timeouts included.
    pub fn is_service_error(&self) -> bool {
        matches!(
            self,
            DeckError::Service { .. } | DeckError::ExtractionTimeout { .. }
        )
    }

    /// True for failures caused by the input PDF itself.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            DeckError::FileNotFound { .. }
                | DeckError::PermissionDenied { .. }
                | DeckError::NotAPdf { .. }
                | DeckError::CorruptPdf { .. }
                | DeckError::InvalidPageBox { .. }
        )
    }
}

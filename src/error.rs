//! Error types for the deck2notes library.
//!
//! Four layers, from innermost to outermost:
//!
//! * [`AttemptFailure`]: one failed round-trip to the model service. Most
//!   variants are transient and are absorbed by the retry loop in
//!   [`crate::pipeline::inference`]; callers only ever see them wrapped.
//!
//! * [`InferenceError`]: a whole `ask` call gave up: either the attempt
//!   budget ran out or the service rejected the request outright.
//!
//! * [`PageProcessingError`]: one page could not be annotated. Always fatal
//!   for the run: the report never contains a gap or a placeholder section.
//!
//! * [`AnnotateError`]: everything the top-level run can fail with, including
//!   setup problems detected before the first page is touched.

use std::path::PathBuf;
use thiserror::Error;

/// A single failed attempt against the model service.
#[derive(Debug, Clone, Error, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AttemptFailure {
    /// Network error or 5xx-style service failure.
    #[error("service error: {detail}")]
    Service { detail: String },

    /// The service throttled the request (HTTP 429 and friends).
    #[error("rate limited: {detail}")]
    RateLimited { detail: String },

    /// The attempt exceeded the per-attempt timeout, or the provider gave up
    /// waiting on the service.
    #[error("attempt timed out: {detail}")]
    Timeout { detail: String },

    /// The service answered, but without the expected text segment.
    #[error("malformed response: {detail}")]
    Malformed { detail: String },

    /// The service refused the request (bad credentials, forbidden model).
    /// Retrying cannot help.
    #[error("request rejected: {detail}")]
    Rejected { detail: String },
}

impl AttemptFailure {
    /// Whether the retry loop should try again after this failure.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, AttemptFailure::Rejected { .. })
    }
}

/// A terminal failure of one `ask` call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InferenceError {
    /// Every allowed attempt failed with a retryable error.
    #[error("model call failed after {attempts} attempts; last error: {last_error}")]
    Exhausted {
        attempts: u32,
        last_error: AttemptFailure,
    },

    /// The service rejected the request; no further attempts were made.
    #[error("model call rejected on attempt {attempts}: {last_error}")]
    Rejected {
        attempts: u32,
        last_error: AttemptFailure,
    },
}

impl InferenceError {
    /// Number of attempts made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            InferenceError::Exhausted { attempts, .. } | InferenceError::Rejected { attempts, .. } => {
                *attempts
            }
        }
    }

    /// The failure observed on the final attempt.
    pub fn last_error(&self) -> &AttemptFailure {
        match self {
            InferenceError::Exhausted { last_error, .. }
            | InferenceError::Rejected { last_error, .. } => last_error,
        }
    }
}

/// Failure while producing the report section for one page.
#[derive(Debug, Error)]
pub enum PageProcessingError {
    /// The rendered page image could not be read back from the scratch directory.
    #[error("Page {page}: could not read rendered image '{path}': {source}")]
    ImageUnreadable {
        page: usize,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The visual-description call failed.
    #[error("Page {page}: visual description failed: {source}")]
    Description {
        page: usize,
        #[source]
        source: InferenceError,
    },

    /// The explanation call failed.
    #[error("Page {page}: content explanation failed: {source}")]
    Explanation {
        page: usize,
        #[source]
        source: InferenceError,
    },
}

impl PageProcessingError {
    /// 1-indexed page number the failure belongs to.
    pub fn page(&self) -> usize {
        match self {
            PageProcessingError::ImageUnreadable { page, .. }
            | PageProcessingError::Description { page, .. }
            | PageProcessingError::Explanation { page, .. } => *page,
        }
    }
}

/// All errors returned by the top-level annotation entry points.
#[derive(Debug, Error)]
pub enum AnnotateError {
    // ── Setup errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// The run's scratch directory could not be created.
    #[error("Could not create scratch directory under '{root}': {source}")]
    ScratchDirFailed {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Document errors ───────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// The page selection matched no page of the document.
    #[error("Page selection matches no page (document has {total} pages)")]
    EmptySelection { total: usize },

    /// pdfium failed to rasterise a page or extract its text.
    #[error("Rendering failed for page {page}: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Install libpdfium system-wide, or set PDFIUM_LIB_PATH=/path/to/libpdfium."
    )]
    PdfiumBindingFailed(String),

    // ── Page errors ───────────────────────────────────────────────────────
    /// A page could not be annotated; the run stops here.
    #[error(transparent)]
    Page(#[from] PageProcessingError),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output report.
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

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AnnotateError {
    /// True for failures detected before any page was processed.
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            AnnotateError::FileNotFound { .. }
                | AnnotateError::PermissionDenied { .. }
                | AnnotateError::NotAPdf { .. }
                | AnnotateError::ScratchDirFailed { .. }
                | AnnotateError::ProviderNotConfigured { .. }
                | AnnotateError::InvalidConfig(_)
        )
    }
}

//! # deck2notes
//!
//! Turn a slide deck (PDF) into an annotated Markdown report. For every page
//! the report carries the slide's own text, a description of what the slide
//! looks like, and an explanation of what it is trying to teach. The last two
//! come from a language model.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input     validate path and PDF magic bytes
//!  ├─ 2. Render    rasterise pages into a scratch dir, extract text (pdfium)
//!  ├─ 3. Describe  model call with the page image attached
//!  ├─ 4. Explain   model call with the page text and the description
//!  └─ 5. Output    one section per page, in page order, written atomically
//! ```
//!
//! Model calls go through [`pipeline::inference::InferenceClient`], which
//! retries transient failures with exponential backoff and jitter
//! ([`BackoffPolicy`]) and gives up with an [`InferenceError`] once the
//! attempt budget is spent. The first page that cannot be annotated stops the
//! run; the report is never written with a gap or a placeholder.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use deck2notes::{annotate_to_file, AnnotateConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from ANTHROPIC_API_KEY / OPENAI_API_KEY / …
//!     let config = AnnotateConfig::default();
//!     let summary = annotate_to_file("lecture.pdf", "lecture.md", &config).await?;
//!     eprintln!("{} pages annotated", summary.annotated_pages);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `deck2notes` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod annotate;
pub mod backoff;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use annotate::{annotate_document, annotate_to_file, annotate_with, write_report};
pub use backoff::BackoffPolicy;
pub use config::{AnnotateConfig, AnnotateConfigBuilder, PageSelection};
pub use error::{AnnotateError, AttemptFailure, InferenceError, PageProcessingError};
pub use output::{AnnotatedDocument, Page, ReportSection, RunSummary};
pub use pipeline::inference::{ClientStats, InferenceClient, InferenceRequest, ModelClient};
pub use pipeline::render::{PageSource, RenderedDocument};
pub use progress::{NoopProgressCallback, ProgressCallback, ReportProgressCallback};

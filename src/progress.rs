//! Progress-callback trait for per-page annotation events.
//!
//! Inject an [`Arc<dyn ReportProgressCallback>`] via
//! [`crate::config::AnnotateConfigBuilder::progress_callback`] to receive
//! events as the run works through the deck. The binary uses this to drive
//! its terminal progress bar; library callers can forward events anywhere.
//!
//! # Example
//!
//! ```rust
//! use deck2notes::{AnnotateConfig, ReportProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl ReportProgressCallback for CountingCallback {
//!     fn on_page_complete(&self, page_num: usize, total_pages: usize, section_len: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Page {}/{} done ({} bytes)", page_num, total_pages, section_len);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { completed: AtomicUsize::new(0) });
//!
//! let config = AnnotateConfig::builder()
//!     .progress_callback(counter as Arc<dyn ReportProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the document loop as it processes each page.
///
/// Pages are processed strictly in order, so events for one page never
/// interleave with another's. All methods default to no-ops.
pub trait ReportProgressCallback: Send + Sync {
    /// Called once after rendering, before the first page is annotated.
    fn on_run_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called before the first model call for a page.
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when a page's section has been appended to the report.
    ///
    /// `section_len` is the byte length of the rendered Markdown section.
    fn on_page_complete(&self, page_num: usize, total_pages: usize, section_len: usize) {
        let _ = (page_num, total_pages, section_len);
    }

    /// Called when a page fails. The run stops after this event.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once after the last page, whether or not every page succeeded.
    fn on_run_complete(&self, total_pages: usize, success_count: usize) {
        let _ = (total_pages, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ReportProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::AnnotateConfig`].
pub type ProgressCallback = Arc<dyn ReportProgressCallback>;

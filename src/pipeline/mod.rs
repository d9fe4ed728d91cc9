//! Pipeline stages for slide-deck annotation.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ page ─┬─▶ encode ──▶ inference (describe)
//! (path)    (pdfium)         └─▶ inference (explain) ──▶ postprocess
//! ```
//!
//! 1. [`input`]    : validate the user-supplied path
//! 2. [`scratch`]  : per-run scratch directory, removed on drop
//! 3. [`render`]   : rasterise pages into the scratch dir and extract text
//! 4. [`encode`]   : read a page PNG back as base64 `ImageData`
//! 5. [`inference`]: model calls with backoff; the only stage with network I/O
//! 6. [`page`]     : the two calls per page, assembled into a section
//! 7. [`postprocess`]: cleanup of model answers

pub mod encode;
pub mod inference;
pub mod input;
pub mod page;
pub mod postprocess;
pub mod render;
pub mod scratch;

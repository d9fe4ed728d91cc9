//! PDF rasterisation and text extraction via pdfium.
//!
//! Every selected page is rendered to `page_<N>.png` inside the run's scratch
//! directory and its native text layer is extracted alongside. Rendering
//! happens up front, before any model call; only the PNG path and text stay in
//! memory, so a long deck does not hold every bitmap at once.
//!
//! pdfium is a blocking C library, so the whole pass runs on
//! `tokio::task::spawn_blocking`.

use crate::config::{AnnotateConfig, PageSelection};
use crate::error::AnnotateError;
use crate::output::Page;
use async_trait::async_trait;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Pages rendered for one run.
#[derive(Debug, Clone)]
pub struct RenderedDocument {
    /// Page count of the whole document, selected or not.
    pub total_pages: usize,
    /// Selected pages in document order.
    pub pages: Vec<Page>,
}

/// Produces [`Page`]s for a document, writing page images into `scratch_dir`.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn render_pages(
        &self,
        pdf_path: &Path,
        scratch_dir: &Path,
        selection: &PageSelection,
    ) -> Result<RenderedDocument, AnnotateError>;
}

/// pdfium-backed page source.
#[derive(Debug, Clone)]
pub struct PdfiumSource {
    max_rendered_pixels: u32,
    password: Option<String>,
}

impl PdfiumSource {
    pub fn new(max_rendered_pixels: u32, password: Option<String>) -> Self {
        Self {
            max_rendered_pixels,
            password,
        }
    }

    pub fn from_config(config: &AnnotateConfig) -> Self {
        Self::new(config.max_rendered_pixels, config.password.clone())
    }
}

#[async_trait]
impl PageSource for PdfiumSource {
    async fn render_pages(
        &self,
        pdf_path: &Path,
        scratch_dir: &Path,
        selection: &PageSelection,
    ) -> Result<RenderedDocument, AnnotateError> {
        let path = pdf_path.to_path_buf();
        let scratch = scratch_dir.to_path_buf();
        let selection = selection.clone();
        let max_pixels = self.max_rendered_pixels;
        let password = self.password.clone();

        tokio::task::spawn_blocking(move || {
            render_pages_blocking(&path, &scratch, &selection, max_pixels, password.as_deref())
        })
        .await
        .map_err(|e| AnnotateError::Internal(format!("Render task panicked: {}", e)))?
    }
}

/// Bind to `PDFIUM_LIB_PATH` when set, else to the system library.
fn bind_pdfium() -> Result<Pdfium, AnnotateError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(lib) if !lib.is_empty() => Pdfium::bind_to_library(&lib),
        _ => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| AnnotateError::PdfiumBindingFailed(format!("{:?}", e)))?;
    Ok(Pdfium::new(bindings))
}

/// Blocking implementation of page rendering and text extraction.
fn render_pages_blocking(
    pdf_path: &Path,
    scratch_dir: &Path,
    selection: &PageSelection,
    max_pixels: u32,
    password: Option<&str>,
) -> Result<RenderedDocument, AnnotateError> {
    let pdfium = bind_pdfium()?;

    let document = pdfium.load_pdf_from_file(pdf_path, password).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            if password.is_some() {
                AnnotateError::WrongPassword {
                    path: pdf_path.to_path_buf(),
                }
            } else {
                AnnotateError::PasswordRequired {
                    path: pdf_path.to_path_buf(),
                }
            }
        } else {
            AnnotateError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: err_str,
            }
        }
    })?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF loaded: {} pages", total_pages);

    let indices = selection.to_indices(total_pages);
    if indices.is_empty() {
        return Err(AnnotateError::EmptySelection { total: total_pages });
    }

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut rendered = Vec::with_capacity(indices.len());

    for idx in indices {
        let number = idx + 1;
        let render_failed = |detail: String| AnnotateError::RenderFailed {
            page: number,
            detail,
        };

        let index = pdfium_page_index(idx).ok_or_else(|| {
            render_failed(format!("page index {} exceeds pdfium's 16-bit page range", idx))
        })?;
        let page = pages
            .get(index)
            .map_err(|e| render_failed(format!("{:?}", e)))?;

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| render_failed(format!("{:?}", e)))?;
        let image = bitmap.as_image();

        let image_path = page_image_path(scratch_dir, number);
        image
            .save(&image_path)
            .map_err(|e| render_failed(format!("could not write {}: {}", image_path.display(), e)))?;

        let text = page
            .text()
            .map_err(|e| render_failed(format!("text extraction: {:?}", e)))?
            .all();

        debug!(
            "Rendered page {} → {}x{} px, {} chars of text",
            number,
            image.width(),
            image.height(),
            text.len()
        );

        rendered.push(Page {
            number,
            image_path,
            text: text.trim().to_string(),
        });
    }

    Ok(RenderedDocument {
        total_pages,
        pages: rendered,
    })
}

/// pdfium addresses pages with a `u16`; larger indices are unreachable.
fn pdfium_page_index(idx: usize) -> Option<u16> {
    u16::try_from(idx).ok()
}

/// Where page `number` (1-indexed) is rendered inside the scratch directory.
pub fn page_image_path(scratch_dir: &Path, number: usize) -> PathBuf {
    scratch_dir.join(format!("page_{}.png", number))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_path_is_numbered_png() {
        let p = page_image_path(Path::new("/tmp/run"), 12);
        assert_eq!(p, PathBuf::from("/tmp/run/page_12.png"));
    }

    #[test]
    fn page_index_out_of_pdfium_range_is_refused() {
        assert_eq!(pdfium_page_index(0), Some(0));
        assert_eq!(pdfium_page_index(65_535), Some(u16::MAX));
        assert_eq!(pdfium_page_index(65_536), None);
        assert_eq!(pdfium_page_index(70_000), None);
    }

    #[test]
    fn source_takes_render_settings_from_config() {
        let config = AnnotateConfig::builder()
            .max_rendered_pixels(1200)
            .password("secret")
            .build()
            .unwrap();
        let source = PdfiumSource::from_config(&config);
        assert_eq!(source.max_rendered_pixels, 1200);
        assert_eq!(source.password.as_deref(), Some("secret"));
    }
}

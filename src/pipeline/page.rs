//! Per-page annotation: image + text in, one [`ReportSection`] out.
//!
//! The two model calls run strictly in sequence because the explanation
//! prompt embeds the visual description. Either call failing fails the page;
//! no placeholder text is ever substituted.

use crate::error::PageProcessingError;
use crate::output::{Page, ReportSection};
use crate::pipeline::encode::load_page_image;
use crate::pipeline::inference::{InferenceRequest, ModelClient};
use crate::pipeline::postprocess::clean_response;
use crate::prompts::{explanation_prompt, VISUAL_DESCRIPTION_PROMPT};
use tracing::{debug, info};

/// Drives the description and explanation calls for one page at a time.
pub struct PagePipeline<'a, C: ?Sized> {
    client: &'a C,
}

impl<'a, C: ModelClient + ?Sized> PagePipeline<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }

    /// Annotate one page.
    pub async fn process_page(&self, page: &Page) -> Result<ReportSection, PageProcessingError> {
        info!("Processing page {}", page.number);

        let image = load_page_image(&page.image_path).await.map_err(|source| {
            PageProcessingError::ImageUnreadable {
                page: page.number,
                path: page.image_path.clone(),
                source,
            }
        })?;

        let request = InferenceRequest::text(VISUAL_DESCRIPTION_PROMPT).with_image(image);
        let visual_description = self
            .client
            .ask(request)
            .await
            .map(|raw| clean_response(&raw))
            .map_err(|source| PageProcessingError::Description {
                page: page.number,
                source,
            })?;
        debug!(
            "Page {}: visual description {} chars",
            page.number,
            visual_description.len()
        );

        let request = InferenceRequest::text(explanation_prompt(&page.text, &visual_description));
        let explanation = self
            .client
            .ask(request)
            .await
            .map(|raw| clean_response(&raw))
            .map_err(|source| PageProcessingError::Explanation {
                page: page.number,
                source,
            })?;
        debug!("Page {}: explanation {} chars", page.number, explanation.len());

        Ok(ReportSection {
            page: page.number,
            extracted_text: page.text.clone(),
            visual_description,
            explanation,
        })
    }
}

//! Prompts sent to the model for each page.
//!
//! Every page costs two calls. The first sees the rendered slide and
//! describes it; the second sees only text (the slide's own words plus that
//! description) and explains what the slide is trying to teach.

/// Prompt for the visual-description call. The page image is attached.
pub const VISUAL_DESCRIPTION_PROMPT: &str = "Please describe the visual content of this slide objectively and in detail. \
Focus on visual elements, layout, graphics, diagrams, and overall structure.";

/// Build the prompt for the explanation call.
///
/// Both inputs are embedded verbatim; the description is the output of the
/// visual-description call for the same page.
pub fn explanation_prompt(extracted_text: &str, visual_description: &str) -> String {
    format!(
        "Based on the extracted text and visual description of the slide, \
explain the educational purpose and main message it tries to convey.\n\n\
Extracted text: {extracted_text}\n\n\
Visual description: {visual_description}"
    )
}

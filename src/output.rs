//! Data produced by an annotation run.

use crate::pipeline::postprocess::longest_backtick_run;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One rendered page of the input deck.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// 1-indexed page number in the source document.
    pub number: usize,
    /// PNG rendering of the page inside the run's scratch directory.
    pub image_path: PathBuf,
    /// Text extracted from the page's native PDF content.
    pub text: String,
}

/// The three-part annotation of one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSection {
    /// 1-indexed page number.
    pub page: usize,
    pub extracted_text: String,
    pub visual_description: String,
    pub explanation: String,
}

impl ReportSection {
    /// Render this section as a Markdown block.
    ///
    /// Block order: heading, extracted text (fenced, verbatim), visual
    /// description, explanation, separator. The fence is made longer than any
    /// backtick run in the extracted text so the block cannot be closed early.
    pub fn to_markdown(&self) -> String {
        let fence = "`".repeat(longest_backtick_run(&self.extracted_text).max(2) + 1);
        format!(
            "## Page {page}\n\n\
### Extracted Content\n\
{fence}\n{text}\n{fence}\n\n\
### Visual Description\n\
{description}\n\n\
### Content Explanation\n\
{explanation}\n\n\
---\n\n",
            page = self.page,
            text = self.extracted_text,
            description = self.visual_description,
            explanation = self.explanation,
        )
    }
}

/// Counters and timings for a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Pages in the source document.
    pub total_pages: usize,
    /// Pages annotated (the selected pages; a completed run annotates all of them).
    pub annotated_pages: usize,
    /// Model calls made, the two per page.
    pub model_calls: u64,
    /// Attempts beyond the first, summed over all model calls.
    pub retries: u64,
    /// Token counts as reported by the provider (zero when it reports none).
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Wall-clock time spent rasterising and extracting text.
    pub render_duration_ms: u64,
    /// Wall-clock time spent in model calls, retries included.
    pub inference_duration_ms: u64,
    /// Total wall-clock time of the run.
    pub total_duration_ms: u64,
}

/// An annotated document held in memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotatedDocument {
    /// Sections in page order.
    pub sections: Vec<ReportSection>,
    /// The assembled Markdown report.
    pub markdown: String,
    pub summary: RunSummary,
}

/// Concatenate sections, in the order given, into the report.
pub fn assemble_report(sections: &[ReportSection]) -> String {
    sections.iter().map(ReportSection::to_markdown).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(page: usize, text: &str) -> ReportSection {
        ReportSection {
            page,
            extracted_text: text.into(),
            visual_description: "A title with a bullet list.".into(),
            explanation: "Introduces the topic.".into(),
        }
    }

    #[test]
    fn block_order() {
        let md = section(3, "Agenda").to_markdown();
        let heading = md.find("## Page 3").unwrap();
        let extracted = md.find("### Extracted Content\n```\nAgenda\n```").unwrap();
        let visual = md.find("### Visual Description\nA title").unwrap();
        let explanation = md.find("### Content Explanation\nIntroduces").unwrap();
        let separator = md.find("\n---\n").unwrap();
        assert!(heading < extracted && extracted < visual);
        assert!(visual < explanation && explanation < separator);
        assert!(md.ends_with("---\n\n"));
    }

    #[test]
    fn fence_outgrows_backticks_in_text() {
        let md = section(1, "Example:\n```\ncode\n```").to_markdown();
        assert!(md.contains("\n````\nExample:"), "got:\n{md}");
        assert!(md.contains("```\n````\n"), "got:\n{md}");
    }

    #[test]
    fn assemble_keeps_given_order() {
        let md = assemble_report(&[section(1, "a"), section(2, "b")]);
        let one = md.find("## Page 1").unwrap();
        let two = md.find("## Page 2").unwrap();
        assert!(one < two);
        assert_eq!(md.matches("### Visual Description").count(), 2);
    }
}

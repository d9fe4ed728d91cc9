//! The document loop: validate input, render pages, annotate them in order,
//! write the report.
//!
//! Pages are annotated one at a time in document order. The first page that
//! fails stops the run, so the report never has a gap in its page sequence.
//! The scratch directory holding rendered pages is a scoped guard and is
//! removed on every exit path.

use crate::config::AnnotateConfig;
use crate::error::AnnotateError;
use crate::output::{assemble_report, AnnotatedDocument, RunSummary};
use crate::pipeline::inference::{InferenceClient, InferenceSettings, ModelClient, ProviderTransport};
use crate::pipeline::page::PagePipeline;
use crate::pipeline::render::{PageSource, PdfiumSource};
use crate::pipeline::input;
use crate::pipeline::scratch::ScratchDir;
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Annotate a deck and write the report to `output_path`.
///
/// This is the primary entry point: it resolves the LLM provider from
/// `config` (or the environment) and renders pages with pdfium.
///
/// # Errors
/// Any failure aborts the run: setup errors (missing file, no provider),
/// document errors (corrupt PDF), or the first page that cannot be annotated.
/// No report file is left behind on failure.
pub async fn annotate_to_file(
    input_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &AnnotateConfig,
) -> Result<RunSummary, AnnotateError> {
    // A bad path is reported before provider credentials are looked at.
    input::resolve_local(input_path.as_ref())?;
    let provider = resolve_provider(config)?;
    let client = InferenceClient::new(
        ProviderTransport::new(Arc::clone(&provider)),
        settings_for_provider(config, provider.as_ref()),
        config.backoff,
    );
    let source = PdfiumSource::from_config(config);

    annotate_with(input_path, output_path, &source, &client, config).await
}

/// Like [`annotate_to_file`], with caller-supplied page source and model client.
pub async fn annotate_with<S, C>(
    input_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    source: &S,
    client: &C,
    config: &AnnotateConfig,
) -> Result<RunSummary, AnnotateError>
where
    S: PageSource + ?Sized,
    C: ModelClient + ?Sized,
{
    let document = annotate_document(input_path, source, client, config).await?;
    write_report(output_path.as_ref(), &document.markdown).await?;
    info!("Report written to {}", output_path.as_ref().display());
    Ok(document.summary)
}

/// Annotate a deck in memory.
pub async fn annotate_document<S, C>(
    input_path: impl AsRef<Path>,
    source: &S,
    client: &C,
    config: &AnnotateConfig,
) -> Result<AnnotatedDocument, AnnotateError>
where
    S: PageSource + ?Sized,
    C: ModelClient + ?Sized,
{
    let total_start = Instant::now();
    let input_path = input_path.as_ref();
    info!("Starting annotation: {}", input_path.display());

    // ── Step 1: Validate input ───────────────────────────────────────────
    let pdf_path = input::resolve_local(input_path)?;

    // ── Step 2: Scratch directory (removed on every exit path) ───────────
    let scratch = ScratchDir::create(
        config.scratch_root.as_deref(),
        &input::document_stem(&pdf_path),
    )?;

    // ── Step 3: Render pages and extract text ────────────────────────────
    let render_start = Instant::now();
    let rendered = source
        .render_pages(&pdf_path, scratch.path(), &config.pages)
        .await?;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;
    let selected = rendered.pages.len();
    if selected == 0 {
        return Err(AnnotateError::EmptySelection {
            total: rendered.total_pages,
        });
    }
    info!(
        "Rendered {} of {} pages in {}ms",
        selected, rendered.total_pages, render_duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_run_start(selected);
    }

    // ── Step 4: Annotate pages in order ──────────────────────────────────
    let stats_before = client.stats();
    let pipeline = PagePipeline::new(client);
    let mut sections = Vec::with_capacity(selected);
    let llm_start = Instant::now();

    for page in &rendered.pages {
        if let Some(ref cb) = config.progress_callback {
            cb.on_page_start(page.number, selected);
        }

        match pipeline.process_page(page).await {
            Ok(section) => {
                if let Some(ref cb) = config.progress_callback {
                    cb.on_page_complete(page.number, selected, section.to_markdown().len());
                }
                sections.push(section);
            }
            Err(e) => {
                if let Some(ref cb) = config.progress_callback {
                    cb.on_page_error(page.number, selected, &e.to_string());
                    cb.on_run_complete(selected, sections.len());
                }
                return Err(e.into());
            }
        }
    }
    let inference_duration_ms = llm_start.elapsed().as_millis() as u64;

    scratch.close();

    // ── Step 5: Assemble ─────────────────────────────────────────────────
    let markdown = assemble_report(&sections);
    let usage = client.stats().since(&stats_before);
    let summary = RunSummary {
        total_pages: rendered.total_pages,
        annotated_pages: sections.len(),
        model_calls: usage.calls,
        retries: usage.retries,
        input_tokens: usage.input_tokens,
        output_tokens: usage.output_tokens,
        render_duration_ms,
        inference_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Annotation complete: {}/{} pages, {} model calls ({} retries), {}ms total",
        summary.annotated_pages,
        summary.total_pages,
        summary.model_calls,
        summary.retries,
        summary.total_duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_run_complete(selected, sections.len());
    }

    Ok(AnnotatedDocument {
        sections,
        markdown,
        summary,
    })
}

/// Write the report atomically: temp file next to the target, then rename.
pub async fn write_report(path: &Path, markdown: &str) -> Result<(), AnnotateError> {
    let write_failed = |source| AnnotateError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
    }

    let tmp_path = temp_sibling(path);
    if let Err(e) = tokio::fs::write(&tmp_path, markdown).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_failed(e));
    }

    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_failed(e));
    }

    debug!("Wrote {} bytes to {}", markdown.len(), path.display());
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

// ── Internal helpers ─────────────────────────────────────────────────────

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, AnnotateError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        AnnotateError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`): used as-is.
/// 2. **Named provider** (`config.provider_name`): built with `config.model`;
///    the factory reads the matching API key from the environment.
/// 3. **Anthropic key present**: `ANTHROPIC_API_KEY` selects the anthropic
///    provider with `config.model`.
/// 4. **Full auto-detection** (`ProviderFactory::from_env`): first provider
///    whose credentials are found. The provider picks its own model here.
fn resolve_provider(config: &AnnotateConfig) -> Result<Arc<dyn LLMProvider>, AnnotateError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        return create_provider(name, &config.model);
    }

    if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
        if !key.is_empty() {
            return create_provider("anthropic", &config.model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| AnnotateError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set ANTHROPIC_API_KEY, OPENAI_API_KEY, or pass --provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

/// Call settings for `provider`.
///
/// A provider is bound to one model when it is built. When the caller hands
/// over a ready provider, or one is auto-detected, its model wins over
/// `config.model`; the substitution is logged so the report's origin is never
/// silent.
fn settings_for_provider(config: &AnnotateConfig, provider: &dyn LLMProvider) -> InferenceSettings {
    let mut settings = InferenceSettings::from_config(config);
    if provider.model() != settings.model {
        warn!(
            "Provider '{}' is bound to model '{}'; configured model '{}' is not used",
            provider.name(),
            provider.model(),
            settings.model
        );
        settings.model = provider.model().to_string();
    }
    info!("Using model '{}' via provider '{}'", settings.model, provider.name());
    settings
}

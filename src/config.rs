//! Configuration types for slide-deck annotation.
//!
//! All run behaviour is controlled through [`AnnotateConfig`], built via its
//! [`AnnotateConfigBuilder`]. The retry budget and timing live in a nested
//! [`BackoffPolicy`] so the same policy value can be handed straight to the
//! inference client.

use crate::backoff::BackoffPolicy;
use crate::error::AnnotateError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Model used when the caller does not name one.
pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";

/// Default cap on generated tokens per model call.
pub const DEFAULT_MAX_TOKENS: usize = 1000;

/// Configuration for one annotation run.
///
/// # Example
/// ```rust
/// use deck2notes::AnnotateConfig;
///
/// let config = AnnotateConfig::builder()
///     .model("claude-3-5-haiku-20241022")
///     .max_tokens(800)
///     .max_attempts(3)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct AnnotateConfig {
    /// Model identifier sent with every request. Default: [`DEFAULT_MODEL`].
    pub model: String,

    /// LLM provider name (e.g. "anthropic", "openai", "gemini").
    /// If None along with `provider`, the provider is detected from the environment.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Maximum tokens the model may generate per call. Default: 1000.
    ///
    /// Descriptions and explanations are a few paragraphs each; 1000 tokens
    /// leaves ample room without letting a runaway answer run up cost.
    pub max_tokens: usize,

    /// Retry budget and delays for model calls.
    pub backoff: BackoffPolicy,

    /// Optional timeout for a single model attempt. Default: none.
    ///
    /// A timed-out attempt counts as a transient failure and is retried like
    /// any other; without a timeout an attempt waits for the service.
    pub attempt_timeout: Option<Duration>,

    /// Maximum rendered image dimension (width or height) in pixels. Default: 2000.
    pub max_rendered_pixels: u32,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Page selection. Default: all pages.
    pub pages: PageSelection,

    /// Directory under which the per-run scratch directory is created.
    /// Default: the system temp directory.
    pub scratch_root: Option<PathBuf>,

    /// Optional progress callback for per-page events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for AnnotateConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            provider_name: None,
            provider: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            backoff: BackoffPolicy::default(),
            attempt_timeout: None,
            max_rendered_pixels: 2000,
            password: None,
            pages: PageSelection::default(),
            scratch_root: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for AnnotateConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnnotateConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("max_tokens", &self.max_tokens)
            .field("backoff", &self.backoff)
            .field("attempt_timeout", &self.attempt_timeout)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("pages", &self.pages)
            .field("scratch_root", &self.scratch_root)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl AnnotateConfig {
    /// Create a new builder for `AnnotateConfig`.
    pub fn builder() -> AnnotateConfigBuilder {
        AnnotateConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`AnnotateConfig`].
#[derive(Debug)]
pub struct AnnotateConfigBuilder {
    config: AnnotateConfig,
}

impl AnnotateConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn backoff(mut self, policy: BackoffPolicy) -> Self {
        self.config.backoff = policy;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.backoff.max_attempts = n;
        self
    }

    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.config.backoff.base_delay = delay;
        self
    }

    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.config.attempt_timeout = Some(timeout);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn scratch_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.scratch_root = Some(dir.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnnotateConfig, AnnotateError> {
        let c = &self.config;
        if c.model.trim().is_empty() {
            return Err(AnnotateError::InvalidConfig(
                "Model identifier must not be empty".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(AnnotateError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.backoff.max_attempts == 0 {
            return Err(AnnotateError::InvalidConfig(
                "max_attempts must be ≥ 1".into(),
            ));
        }
        if c.backoff.base_delay > c.backoff.cap {
            return Err(AnnotateError::InvalidConfig(format!(
                "Backoff base delay {:?} exceeds cap {:?}",
                c.backoff.base_delay, c.backoff.cap
            )));
        }
        if c.attempt_timeout == Some(Duration::ZERO) {
            return Err(AnnotateError::InvalidConfig(
                "Attempt timeout must be greater than zero".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Specifies which pages of the deck to annotate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSelection {
    /// Annotate all pages (default).
    #[default]
    All,
    /// A single page (1-indexed).
    Single(usize),
    /// A contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 0-indexed page numbers.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) => {
                if *p >= 1 && *p <= total_pages {
                    vec![p - 1]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => {
                let s = (*start).max(1) - 1;
                let e = (*end).min(total_pages);
                (s..e).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .filter(|&&p| p >= 1 && p <= total_pages)
                .map(|p| p - 1)
                .collect(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = AnnotateConfig::default();
        assert_eq!(c.model, DEFAULT_MODEL);
        assert_eq!(c.max_tokens, 1000);
        assert_eq!(c.backoff.max_attempts, 5);
        assert!(c.attempt_timeout.is_none());
        assert_eq!(c.pages, PageSelection::All);
    }

    #[test]
    fn builder_rejects_zero_attempts() {
        let err = AnnotateConfig::builder().max_attempts(0).build().unwrap_err();
        assert!(err.to_string().contains("max_attempts"));
    }

    #[test]
    fn builder_rejects_empty_model() {
        assert!(AnnotateConfig::builder().model("  ").build().is_err());
    }

    #[test]
    fn builder_rejects_base_above_cap() {
        let err = AnnotateConfig::builder()
            .base_delay(Duration::from_secs(600))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("exceeds cap"));
    }

    #[test]
    fn builder_overrides_model_and_tokens() {
        let c = AnnotateConfig::builder()
            .model("claude-3-5-haiku-20241022")
            .max_tokens(500)
            .build()
            .unwrap();
        assert_eq!(c.model, "claude-3-5-haiku-20241022");
        assert_eq!(c.max_tokens, 500);
    }

    #[test]
    fn page_selection_to_indices() {
        assert_eq!(PageSelection::All.to_indices(5), vec![0, 1, 2, 3, 4]);
        assert_eq!(PageSelection::Single(3).to_indices(5), vec![2]);
        assert_eq!(PageSelection::Single(6).to_indices(5), Vec::<usize>::new());
        assert_eq!(PageSelection::Range(2, 4).to_indices(5), vec![1, 2, 3]);
        assert_eq!(PageSelection::Range(3, 10).to_indices(4), vec![2, 3]);
        assert_eq!(
            PageSelection::Set(vec![3, 1, 3]).to_indices(5),
            vec![0, 2] // deduplicated and sorted
        );
    }
}

//! Model interaction: one logical question in, one complete answer out.
//!
//! [`InferenceClient`] hides the flakiness of the remote service from the
//! page pipeline. Each call to [`ModelClient::ask`] runs a small state
//! machine:
//!
//! ```text
//!             ┌──────────── Retrying ◀──────────┐
//!             ▼        (sleep compute_delay)    │ retryable, budget left
//!        Attempting ──────────────────────────────┤
//!             │ success            terminal │     │ retryable, budget spent
//!             ▼                             ▼     ▼
//!          Success                   Rejected   Exhausted
//! ```
//!
//! Every attempt yields an [`AttemptOutcome`]; nothing is thrown, and the
//! attempt counter lives only inside one `ask` call. The remote service and
//! the clock are both traits ([`InferenceTransport`], [`Sleeper`]) so the
//! loop can be driven by fakes in tests.

use crate::backoff::BackoffPolicy;
use crate::config::AnnotateConfig;
use crate::error::{AttemptFailure, InferenceError};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, LlmError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Sampling temperature for every call. Zero keeps answers as reproducible
/// as the service allows.
pub const TEMPERATURE: f32 = 0.0;

// ── Request / response ───────────────────────────────────────────────────

/// A single prompt, optionally with images attached.
#[derive(Clone)]
pub struct InferenceRequest {
    pub prompt: String,
    pub images: Vec<ImageData>,
}

impl InferenceRequest {
    /// A text-only request.
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            images: Vec::new(),
        }
    }

    /// Attach an image to the request.
    pub fn with_image(mut self, image: ImageData) -> Self {
        self.images.push(image);
        self
    }
}

impl fmt::Debug for InferenceRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InferenceRequest")
            .field("prompt", &self.prompt)
            .field("images", &self.images.len())
            .finish()
    }
}

/// One segment of a model response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentSegment {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

/// Token accounting reported by the service, when it reports any.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

/// A response from the model service: a list of content segments, of which
/// the first carries the answer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceResponse {
    #[serde(default)]
    pub content: Vec<ContentSegment>,
    #[serde(default)]
    pub usage: TokenUsage,
}

impl InferenceResponse {
    /// A response holding a single text segment.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentSegment {
                kind: "text".into(),
                text: Some(text.into()),
            }],
            usage: TokenUsage::default(),
        }
    }

    /// The first segment's text, or a [`AttemptFailure::Malformed`] when the
    /// response has no segments or the first one carries no visible text.
    pub fn first_text(&self) -> Result<&str, AttemptFailure> {
        let segment = self.content.first().ok_or_else(|| AttemptFailure::Malformed {
            detail: "response has no content segments".into(),
        })?;
        let text = segment
            .text
            .as_deref()
            .ok_or_else(|| AttemptFailure::Malformed {
                detail: format!("first content segment ({:?}) has no text", segment.kind),
            })?;
        if text.trim().is_empty() {
            return Err(AttemptFailure::Malformed {
                detail: format!("first content segment ({:?}) is blank", segment.kind),
            });
        }
        Ok(text)
    }
}

/// Fixed per-call parameters sent with every request.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceSettings {
    /// Model identifier.
    pub model: String,
    /// Upper bound on generated tokens.
    pub max_tokens: usize,
    /// Optional limit on a single attempt.
    pub attempt_timeout: Option<Duration>,
}

impl InferenceSettings {
    pub fn from_config(config: &AnnotateConfig) -> Self {
        Self {
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            attempt_timeout: config.attempt_timeout,
        }
    }
}

// ── Seams ────────────────────────────────────────────────────────────────

/// One round-trip to the model service. No retries at this level.
#[async_trait]
pub trait InferenceTransport: Send + Sync {
    async fn send(
        &self,
        settings: &InferenceSettings,
        request: &InferenceRequest,
    ) -> Result<InferenceResponse, AttemptFailure>;
}

/// Waits between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real clock, backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// "Ask the model a question, get text back."
///
/// The page pipeline only depends on this trait; [`InferenceClient`] is the
/// production implementation.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn ask(&self, request: InferenceRequest) -> Result<String, InferenceError>;

    /// Running totals since the client was created. Clients that do not
    /// track usage report zeros.
    fn stats(&self) -> ClientStats {
        ClientStats::default()
    }
}

/// Cumulative usage of a [`ModelClient`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientStats {
    /// `ask` calls made.
    pub calls: u64,
    /// Attempts beyond the first, across all calls.
    pub retries: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl ClientStats {
    /// Usage accumulated between `earlier` and `self`.
    pub fn since(&self, earlier: &ClientStats) -> ClientStats {
        ClientStats {
            calls: self.calls.saturating_sub(earlier.calls),
            retries: self.retries.saturating_sub(earlier.retries),
            input_tokens: self.input_tokens.saturating_sub(earlier.input_tokens),
            output_tokens: self.output_tokens.saturating_sub(earlier.output_tokens),
        }
    }
}

#[derive(Debug, Default)]
struct StatsCounters {
    calls: AtomicU64,
    retries: AtomicU64,
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
}

impl StatsCounters {
    fn snapshot(&self) -> ClientStats {
        ClientStats {
            calls: self.calls.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            input_tokens: self.input_tokens.load(Ordering::Relaxed),
            output_tokens: self.output_tokens.load(Ordering::Relaxed),
        }
    }
}

// ── Provider-backed transport ────────────────────────────────────────────

/// Transport over an `edgequake-llm` provider.
///
/// The request becomes a single user message (prompt plus images). The
/// provider's flat text reply is surfaced as a one-segment response; an empty
/// reply becomes a response with no segments, which the client treats as
/// malformed.
pub struct ProviderTransport {
    provider: Arc<dyn LLMProvider>,
}

impl ProviderTransport {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self { provider }
    }

    /// Model the wrapped provider is bound to.
    pub fn model(&self) -> &str {
        self.provider.model()
    }
}

#[async_trait]
impl InferenceTransport for ProviderTransport {
    async fn send(
        &self,
        settings: &InferenceSettings,
        request: &InferenceRequest,
    ) -> Result<InferenceResponse, AttemptFailure> {
        // Providers are bound to one model at construction; refuse to send
        // under a different identifier than the caller asked for.
        if self.provider.model() != settings.model {
            return Err(AttemptFailure::Rejected {
                detail: format!(
                    "provider '{}' is bound to model '{}', not '{}'",
                    self.provider.name(),
                    self.provider.model(),
                    settings.model
                ),
            });
        }

        let messages = vec![ChatMessage::user_with_images(
            request.prompt.as_str(),
            request.images.clone(),
        )];
        let options = build_options(settings);

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| classify_provider_error(&e))?;

        let content = if response.content.is_empty() {
            Vec::new()
        } else {
            vec![ContentSegment {
                kind: "text".into(),
                text: Some(response.content),
            }]
        };

        Ok(InferenceResponse {
            content,
            usage: TokenUsage {
                input_tokens: response.prompt_tokens as u64,
                output_tokens: response.completion_tokens as u64,
            },
        })
    }
}

/// Build `CompletionOptions` from the fixed settings.
fn build_options(settings: &InferenceSettings) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(TEMPERATURE),
        max_tokens: Some(settings.max_tokens),
        ..Default::default()
    }
}

/// Map a provider error onto an [`AttemptFailure`].
///
/// Requests the service will never accept (credentials, unknown model,
/// malformed or oversized input, unsupported feature) are terminal.
/// Throttling and timeouts keep their own class; everything else is a
/// transient service failure.
pub fn classify_provider_error(error: &LlmError) -> AttemptFailure {
    let detail = error.to_string();
    match error {
        LlmError::AuthError(_)
        | LlmError::InvalidRequest(_)
        | LlmError::ModelNotFound(_)
        | LlmError::TokenLimitExceeded { .. }
        | LlmError::ConfigError(_)
        | LlmError::NotSupported(_) => AttemptFailure::Rejected { detail },
        LlmError::RateLimited(_) => AttemptFailure::RateLimited { detail },
        LlmError::Timeout => AttemptFailure::Timeout { detail },
        _ => AttemptFailure::Service { detail },
    }
}

// ── Retrying client ──────────────────────────────────────────────────────

/// Result of a single attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Success(String),
    Retryable(AttemptFailure),
    Terminal(AttemptFailure),
}

#[derive(Debug)]
enum RetryState {
    Attempting { attempt: u32 },
    Retrying { attempt: u32 },
    Exhausted { attempts: u32, last_error: AttemptFailure },
}

/// Retrying model client.
pub struct InferenceClient<T, S = TokioSleeper> {
    transport: T,
    settings: InferenceSettings,
    policy: BackoffPolicy,
    sleeper: S,
    counters: StatsCounters,
}

impl<T: InferenceTransport> InferenceClient<T, TokioSleeper> {
    pub fn new(transport: T, settings: InferenceSettings, policy: BackoffPolicy) -> Self {
        Self {
            transport,
            settings,
            policy,
            sleeper: TokioSleeper,
            counters: StatsCounters::default(),
        }
    }
}

impl<T: InferenceTransport, S: Sleeper> InferenceClient<T, S> {
    /// Replace the clock used between attempts.
    pub fn with_sleeper<S2: Sleeper>(self, sleeper: S2) -> InferenceClient<T, S2> {
        InferenceClient {
            transport: self.transport,
            settings: self.settings,
            policy: self.policy,
            sleeper,
            counters: self.counters,
        }
    }

    pub fn settings(&self) -> &InferenceSettings {
        &self.settings
    }

    /// Run one attempt and classify its result.
    pub async fn attempt_once(&self, request: &InferenceRequest) -> AttemptOutcome {
        let call = self.transport.send(&self.settings, request);
        let result = match self.settings.attempt_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => Err(AttemptFailure::Timeout {
                    detail: format!("no answer within {limit:?}"),
                }),
            },
            None => call.await,
        };

        let text = result.and_then(|response| {
            self.counters
                .input_tokens
                .fetch_add(response.usage.input_tokens, Ordering::Relaxed);
            self.counters
                .output_tokens
                .fetch_add(response.usage.output_tokens, Ordering::Relaxed);
            debug!(
                "{} input tokens, {} output tokens",
                response.usage.input_tokens, response.usage.output_tokens
            );
            response.first_text().map(str::to_owned)
        });

        match text {
            Ok(text) => AttemptOutcome::Success(text),
            Err(failure) if failure.is_retryable() => AttemptOutcome::Retryable(failure),
            Err(failure) => AttemptOutcome::Terminal(failure),
        }
    }
}

#[async_trait]
impl<T: InferenceTransport, S: Sleeper> ModelClient for InferenceClient<T, S> {
    async fn ask(&self, request: InferenceRequest) -> Result<String, InferenceError> {
        let start = Instant::now();
        let max_attempts = self.policy.max_attempts;
        self.counters.calls.fetch_add(1, Ordering::Relaxed);
        let mut state = RetryState::Attempting { attempt: 0 };

        loop {
            state = match state {
                RetryState::Attempting { attempt } => match self.attempt_once(&request).await {
                    AttemptOutcome::Success(text) => {
                        debug!(
                            "Model answered on attempt {} ({} chars, {:?})",
                            attempt + 1,
                            text.len(),
                            start.elapsed()
                        );
                        return Ok(text);
                    }
                    AttemptOutcome::Terminal(failure) => {
                        warn!("Attempt {} rejected: {}", attempt + 1, failure);
                        return Err(InferenceError::Rejected {
                            attempts: attempt + 1,
                            last_error: failure,
                        });
                    }
                    AttemptOutcome::Retryable(failure) => {
                        let made = attempt + 1;
                        warn!("Attempt {}/{} failed: {}", made, max_attempts, failure);
                        if BackoffPolicy::is_exhausted(made, max_attempts) {
                            RetryState::Exhausted {
                                attempts: made,
                                last_error: failure,
                            }
                        } else {
                            RetryState::Retrying { attempt }
                        }
                    }
                },
                RetryState::Retrying { attempt } => {
                    let delay = self.policy.compute_delay(attempt);
                    info!(
                        "Retrying in {:.2}s (attempt {}/{})",
                        delay.as_secs_f64(),
                        attempt + 2,
                        max_attempts
                    );
                    self.sleeper.sleep(delay).await;
                    self.counters.retries.fetch_add(1, Ordering::Relaxed);
                    RetryState::Attempting {
                        attempt: attempt + 1,
                    }
                }
                RetryState::Exhausted {
                    attempts,
                    last_error,
                } => {
                    return Err(InferenceError::Exhausted {
                        attempts,
                        last_error,
                    });
                }
            };
        }
    }

    fn stats(&self) -> ClientStats {
        self.counters.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Replays a fixed script of results, then repeats the last one.
    struct ScriptedTransport {
        script: Mutex<VecDeque<Result<InferenceResponse, AttemptFailure>>>,
        last: Mutex<Option<Result<InferenceResponse, AttemptFailure>>>,
        calls: AtomicU32,
        seen: Mutex<Vec<(InferenceSettings, String)>>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Result<InferenceResponse, AttemptFailure>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                last: Mutex::new(None),
                calls: AtomicU32::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl InferenceTransport for Arc<ScriptedTransport> {
        async fn send(
            &self,
            settings: &InferenceSettings,
            request: &InferenceRequest,
        ) -> Result<InferenceResponse, AttemptFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen
                .lock()
                .unwrap()
                .push((settings.clone(), request.prompt.clone()));
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(result) => {
                    *self.last.lock().unwrap() = Some(result.clone());
                    result
                }
                None => self
                    .last
                    .lock()
                    .unwrap()
                    .clone()
                    .expect("script must not be empty"),
            }
        }
    }

    #[derive(Default)]
    struct RecordingSleeper {
        slept: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for Arc<RecordingSleeper> {
        async fn sleep(&self, duration: Duration) {
            self.slept.lock().unwrap().push(duration);
        }
    }

    fn settings() -> InferenceSettings {
        InferenceSettings {
            model: "test-model".into(),
            max_tokens: 1000,
            attempt_timeout: None,
        }
    }

    fn service_error() -> Result<InferenceResponse, AttemptFailure> {
        Err(AttemptFailure::Service {
            detail: "503 Service Unavailable".into(),
        })
    }

    fn client(
        transport: &Arc<ScriptedTransport>,
        sleeper: &Arc<RecordingSleeper>,
        settings: InferenceSettings,
    ) -> InferenceClient<Arc<ScriptedTransport>, Arc<RecordingSleeper>> {
        InferenceClient::new(Arc::clone(transport), settings, BackoffPolicy::default())
            .with_sleeper(Arc::clone(sleeper))
    }

    #[tokio::test]
    async fn recovers_after_k_failures() {
        let policy = BackoffPolicy::default();
        for k in 0..policy.max_attempts {
            let mut script: Vec<_> = (0..k).map(|_| service_error()).collect();
            script.push(Ok(InferenceResponse::text("the answer")));
            let transport = Arc::new(ScriptedTransport::new(script));
            let sleeper = Arc::new(RecordingSleeper::default());

            let answer = client(&transport, &sleeper, settings())
                .ask(InferenceRequest::text("question"))
                .await
                .expect("should recover");

            assert_eq!(answer, "the answer");
            assert_eq!(transport.calls.load(Ordering::SeqCst), k + 1);

            let slept = sleeper.slept.lock().unwrap().clone();
            assert_eq!(slept.len(), k as usize, "k={k}");
            for (i, d) in slept.iter().enumerate() {
                let floor = policy.base_delay_for(i as u32);
                assert!(*d >= floor && *d <= floor + policy.jitter_max, "sleep {i}: {d:?}");
            }
        }
    }

    #[tokio::test]
    async fn stats_count_retries_and_tokens() {
        let mut answer = InferenceResponse::text("ok");
        answer.usage = TokenUsage {
            input_tokens: 120,
            output_tokens: 30,
        };
        let transport = Arc::new(ScriptedTransport::new(vec![
            service_error(),
            Ok(answer.clone()),
            Ok(answer),
        ]));
        let sleeper = Arc::new(RecordingSleeper::default());
        let client = client(&transport, &sleeper, settings());

        client.ask(InferenceRequest::text("one")).await.unwrap();
        let after_first = client.stats();
        client.ask(InferenceRequest::text("two")).await.unwrap();

        let stats = client.stats();
        assert_eq!(stats.calls, 2);
        assert_eq!(stats.retries, 1);
        assert_eq!(stats.input_tokens, 240);
        assert_eq!(stats.output_tokens, 60);
        assert_eq!(
            stats.since(&after_first),
            ClientStats {
                calls: 1,
                retries: 0,
                input_tokens: 120,
                output_tokens: 30,
            }
        );
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let transport = Arc::new(ScriptedTransport::new(vec![service_error()]));
        let sleeper = Arc::new(RecordingSleeper::default());

        let err = client(&transport, &sleeper, settings())
            .ask(InferenceRequest::text("question"))
            .await
            .unwrap_err();

        assert_eq!(transport.calls.load(Ordering::SeqCst), 5);
        assert_eq!(sleeper.slept.lock().unwrap().len(), 4);
        match err {
            InferenceError::Exhausted {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 5);
                assert!(matches!(last_error, AttemptFailure::Service { .. }));
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_response_is_retried_not_returned_empty() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(InferenceResponse::default()),
            Ok(InferenceResponse {
                content: vec![ContentSegment {
                    kind: "image".into(),
                    text: None,
                }],
                usage: TokenUsage::default(),
            }),
            Ok(InferenceResponse::text("finally")),
        ]));
        let sleeper = Arc::new(RecordingSleeper::default());

        let answer = client(&transport, &sleeper, settings())
            .ask(InferenceRequest::text("question"))
            .await
            .unwrap();

        assert_eq!(answer, "finally");
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
        assert_eq!(sleeper.slept.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn rejection_stops_immediately() {
        let transport = Arc::new(ScriptedTransport::new(vec![Err(AttemptFailure::Rejected {
            detail: "401 invalid api key".into(),
        })]));
        let sleeper = Arc::new(RecordingSleeper::default());

        let err = client(&transport, &sleeper, settings())
            .ask(InferenceRequest::text("question"))
            .await
            .unwrap_err();

        assert!(matches!(err, InferenceError::Rejected { attempts: 1, .. }));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        assert!(sleeper.slept.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn sends_fixed_settings_and_prompt() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(InferenceResponse::text("ok"))]));
        let sleeper = Arc::new(RecordingSleeper::default());

        client(&transport, &sleeper, settings())
            .ask(InferenceRequest::text("describe this"))
            .await
            .unwrap();

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0.model, "test-model");
        assert_eq!(seen[0].0.max_tokens, 1000);
        assert_eq!(seen[0].1, "describe this");
    }

    /// Never answers within the attempt timeout.
    struct StalledTransport {
        calls: AtomicU32,
    }

    #[async_trait]
    impl InferenceTransport for Arc<StalledTransport> {
        async fn send(
            &self,
            _settings: &InferenceSettings,
            _request: &InferenceRequest,
        ) -> Result<InferenceResponse, AttemptFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(InferenceResponse::text("too late"))
        }
    }

    #[tokio::test]
    async fn timed_out_attempts_count_as_retryable() {
        let transport = Arc::new(StalledTransport {
            calls: AtomicU32::new(0),
        });
        let sleeper = Arc::new(RecordingSleeper::default());
        let policy = BackoffPolicy {
            max_attempts: 2,
            ..BackoffPolicy::default()
        };
        let settings = InferenceSettings {
            attempt_timeout: Some(Duration::from_millis(20)),
            ..settings()
        };

        let err = InferenceClient::new(Arc::clone(&transport), settings, policy)
            .with_sleeper(Arc::clone(&sleeper))
            .ask(InferenceRequest::text("question"))
            .await
            .unwrap_err();

        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
        match err.last_error() {
            AttemptFailure::Timeout { detail } => assert!(detail.contains("20ms"), "got {detail}"),
            other => panic!("expected Timeout, got {other:?}"),
        }
    }

    #[test]
    fn first_text_reports_missing_fields() {
        assert!(matches!(
            InferenceResponse::default().first_text(),
            Err(AttemptFailure::Malformed { .. })
        ));
        assert_eq!(InferenceResponse::text("hi").first_text().unwrap(), "hi");
        assert!(matches!(
            InferenceResponse::text("  \n\t \n").first_text(),
            Err(AttemptFailure::Malformed { .. })
        ));
    }

    #[tokio::test]
    async fn blank_answer_is_retried() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(InferenceResponse::text("  \n\t \n")),
            Ok(InferenceResponse::text("A diagram of two boxes.")),
        ]));
        let sleeper = Arc::new(RecordingSleeper::default());

        let answer = client(&transport, &sleeper, settings())
            .ask(InferenceRequest::text("describe"))
            .await
            .unwrap();

        assert_eq!(answer, "A diagram of two boxes.");
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
        assert_eq!(sleeper.slept.lock().unwrap().len(), 1);
    }

    #[test]
    fn response_parses_segment_list() {
        let body = r#"{"content":[{"type":"text","text":"A slide"}],"usage":{"input_tokens":12,"output_tokens":3}}"#;
        let parsed: InferenceResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.first_text().unwrap(), "A slide");
        assert_eq!(parsed.usage.output_tokens, 3);

        let missing: InferenceResponse = serde_json::from_str(r#"{"id":"x"}"#).unwrap();
        assert!(missing.first_text().is_err());
    }

    #[test]
    fn classify_errors() {
        assert!(matches!(
            classify_provider_error(&LlmError::AuthError("invalid x-api-key".into())),
            AttemptFailure::Rejected { .. }
        ));
        assert!(matches!(
            classify_provider_error(&LlmError::ModelNotFound("claude-9".into())),
            AttemptFailure::Rejected { .. }
        ));
        assert!(matches!(
            classify_provider_error(&LlmError::RateLimited("429 Too Many Requests".into())),
            AttemptFailure::RateLimited { .. }
        ));
        assert!(matches!(
            classify_provider_error(&LlmError::Timeout),
            AttemptFailure::Timeout { .. }
        ));
        assert!(matches!(
            classify_provider_error(&LlmError::NetworkError("connection reset by peer".into())),
            AttemptFailure::Service { .. }
        ));
    }

    #[test]
    fn status_digits_in_message_do_not_make_an_error_terminal() {
        let failure = classify_provider_error(&LlmError::ApiError(
            "HTTP 503 Service Unavailable (request-id: req_40117)".into(),
        ));
        assert!(matches!(failure, AttemptFailure::Service { .. }));
        assert!(failure.is_retryable());

        let failure = classify_provider_error(&LlmError::ProviderError(
            "upstream 403 from cache node, retry later".into(),
        ));
        assert!(failure.is_retryable());
    }

    #[tokio::test]
    async fn provider_transport_sends_through_bound_model() {
        let mock = Arc::new(edgequake_llm::MockProvider::new());
        mock.add_response("A bar chart.").await;
        let transport = ProviderTransport::new(mock);
        let settings = InferenceSettings {
            model: "mock-model".into(),
            ..settings()
        };

        let response = transport
            .send(&settings, &InferenceRequest::text("describe"))
            .await
            .unwrap();
        assert_eq!(response.first_text().unwrap(), "A bar chart.");
    }

    #[tokio::test]
    async fn provider_transport_refuses_other_model() {
        let transport = ProviderTransport::new(Arc::new(edgequake_llm::MockProvider::new()));

        let err = transport
            .send(&settings(), &InferenceRequest::text("describe"))
            .await
            .unwrap_err();
        match err {
            AttemptFailure::Rejected { detail } => {
                assert!(detail.contains("mock-model") && detail.contains("test-model"), "{detail}")
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[test]
    fn build_options_is_deterministic() {
        let opts = build_options(&settings());
        assert_eq!(opts.temperature, Some(0.0));
        assert_eq!(opts.max_tokens, Some(1000));
    }
}

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::Rng;
use serde::de::DeserializeOwned;

use crate::cancel::CancellationToken;
use crate::config::LlmConfig;
use crate::errors::{ErrorKind, PipelineError, PipelineResult};
use crate::types::Validate;

/// Strict adapter over a structured-response LLM. Temperature is pinned to
/// zero, completion state is checked on every reply, and incomplete or
/// refused responses are raised to the caller, never tolerated.

/// Response schema identifiers passed to the provider.
pub mod schemas {
    pub const DOCUMENT_ANALYSIS: &str = "document_analysis";
    pub const EMAIL_ANALYSIS: &str = "email_analysis";
    pub const IMAGE_ANALYSIS: &str = "image_analysis";
    pub const LEGAL_PATTERN_ANALYSIS: &str = "legal_pattern_analysis";
    pub const EXECUTIVE_SUMMARY: &str = "executive_summary";
    pub const CHUNK_SUMMARY: &str = "chunk_summary";
    pub const ENTITY_MATCH: &str = "entity_match";
}

/// One structured request as handed to the provider.
#[derive(Debug, Clone)]
pub struct StructuredRequest {
    pub model: String,
    pub system_prompt: String,
    pub user_content: serde_json::Value,
    /// Names the response schema the provider must conform to
    pub schema: String,
    /// Always 0; callers cannot override
    pub temperature: f32,
    pub timeout: Duration,
}

/// Completion state of a provider reply.
#[derive(Debug, Clone)]
pub enum ProviderReply {
    /// Parsed, schema-conformant payload
    Completed(serde_json::Value),
    /// Response ended before the schema was satisfied
    Incomplete(String),
    /// Provider declined to answer
    Refused(String),
}

/// Transport-level failures, distinct from completion state.
#[derive(Debug, Clone)]
pub enum TransportError {
    /// Back off and retry
    RateLimited(String),
    /// Transient network failure, retryable
    Network(String),
    /// Per-call timeout elapsed
    Timeout(String),
    /// Non-transient provider failure, fail fast
    Fatal(String),
}

/// The structured-response service boundary. Implementations live outside
/// this crate; tests use [`ScriptedProvider`].
pub trait StructuredProvider: Send + Sync {
    fn complete(&self, request: &StructuredRequest) -> Result<ProviderReply, TransportError>;
}

/// Single entry point for every LLM call in the pipeline.
pub struct LlmClient {
    provider: Arc<dyn StructuredProvider>,
    model: String,
    model_revision: String,
    max_attempts: u32,
    timeout: Duration,
    calls: AtomicUsize,
}

impl LlmClient {
    pub fn new(provider: Arc<dyn StructuredProvider>, config: &LlmConfig) -> Self {
        LlmClient {
            provider,
            model: config.model.clone(),
            model_revision: config.model_revision.clone(),
            max_attempts: config.max_attempts,
            timeout: Duration::from_secs(config.timeout_secs),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn model_revision(&self) -> &str {
        &self.model_revision
    }

    /// Total provider calls issued by this client. Observable by tests for
    /// the chunked-summary path.
    pub fn calls_made(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Issue one structured call and deserialize the payload into `T`.
    ///
    /// Completion handling is strict: `Incomplete` and `Refused` raise
    /// immediately and are never retried. Rate-limit and network errors are
    /// retried with jittered exponential backoff up to the configured
    /// attempt bound.
    pub fn call_structured<T: DeserializeOwned + Validate>(
        &self,
        system_prompt: &str,
        user_content: serde_json::Value,
        schema: &str,
        cancel: &CancellationToken,
    ) -> PipelineResult<T> {
        cancel.check()?;

        let request = StructuredRequest {
            model: self.model.clone(),
            system_prompt: system_prompt.to_string(),
            user_content,
            schema: schema.to_string(),
            temperature: 0.0,
            timeout: self.timeout,
        };

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            cancel.check()?;
            self.calls.fetch_add(1, Ordering::SeqCst);

            match self.provider.complete(&request) {
                Ok(ProviderReply::Completed(value)) => {
                    let parsed: T = serde_json::from_value(value).map_err(|e| {
                        PipelineError::with_context(
                            ErrorKind::LlmFailed,
                            &format!("response does not conform to schema: {}", e),
                            schema,
                        )
                    })?;
                    parsed.validate().map_err(|e| {
                        PipelineError::with_context(ErrorKind::LlmFailed, &e, schema)
                    })?;
                    return Ok(parsed);
                }
                Ok(ProviderReply::Incomplete(details)) => {
                    return Err(PipelineError::with_context(
                        ErrorKind::LlmIncomplete,
                        &details,
                        schema,
                    ));
                }
                Ok(ProviderReply::Refused(reason)) => {
                    return Err(PipelineError::with_context(
                        ErrorKind::LlmRefused,
                        &reason,
                        schema,
                    ));
                }
                Err(TransportError::Timeout(details)) => {
                    return Err(PipelineError::with_context(
                        ErrorKind::LlmTimeout,
                        &details,
                        schema,
                    ));
                }
                Err(TransportError::Fatal(reason)) => {
                    return Err(PipelineError::with_context(
                        ErrorKind::LlmFailed,
                        &reason,
                        schema,
                    ));
                }
                Err(TransportError::RateLimited(details)) | Err(TransportError::Network(details)) => {
                    if attempt >= self.max_attempts {
                        return Err(PipelineError::with_context(
                            ErrorKind::LlmFailed,
                            &format!("transient failure after {} attempts: {}", attempt, details),
                            schema,
                        ));
                    }
                    std::thread::sleep(backoff_delay(attempt));
                }
            }
        }
    }
}

/// Exponential backoff with jitter: 500ms * 2^(attempt-1) plus up to 250ms.
fn backoff_delay(attempt: u32) -> Duration {
    let base = 500u64.saturating_mul(1u64 << (attempt - 1).min(6));
    let jitter = rand::thread_rng().gen_range(0..250);
    Duration::from_millis(base + jitter)
}

/// Deterministic scripted provider for tests and fixtures. Replies are
/// drained in FIFO order; requests are recorded for inspection.
pub struct ScriptedProvider {
    replies: Mutex<std::collections::VecDeque<Result<ProviderReply, TransportError>>>,
    requests: Mutex<Vec<StructuredRequest>>,
    /// Fallback when the script runs dry
    default_reply: Option<serde_json::Value>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        ScriptedProvider {
            replies: Mutex::new(std::collections::VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            default_reply: None,
        }
    }

    /// Provider that answers every request with the same payload.
    pub fn always(value: serde_json::Value) -> Self {
        ScriptedProvider {
            replies: Mutex::new(std::collections::VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            default_reply: Some(value),
        }
    }

    pub fn push_completed(&self, value: serde_json::Value) {
        self.replies
            .lock()
            .unwrap()
            .push_back(Ok(ProviderReply::Completed(value)));
    }

    pub fn push_incomplete(&self, details: &str) {
        self.replies
            .lock()
            .unwrap()
            .push_back(Ok(ProviderReply::Incomplete(details.to_string())));
    }

    pub fn push_refused(&self, reason: &str) {
        self.replies
            .lock()
            .unwrap()
            .push_back(Ok(ProviderReply::Refused(reason.to_string())));
    }

    pub fn push_transport_error(&self, error: TransportError) {
        self.replies.lock().unwrap().push_back(Err(error));
    }

    pub fn recorded_requests(&self) -> Vec<StructuredRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl StructuredProvider for ScriptedProvider {
    fn complete(&self, request: &StructuredRequest) -> Result<ProviderReply, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(reply) = self.replies.lock().unwrap().pop_front() {
            return reply;
        }
        match &self.default_reply {
            Some(value) => Ok(ProviderReply::Completed(value.clone())),
            None => Err(TransportError::Fatal("scripted provider exhausted".to_string())),
        }
    }
}

/// Provider backed by on-disk fixture files: one `<schema>.json` per
/// response schema. Deterministic; used for offline runs and rehearsals.
/// A missing fixture is a fatal provider error, never a silent default.
pub struct FixtureProvider {
    dir: std::path::PathBuf,
}

impl FixtureProvider {
    pub fn new(dir: &std::path::Path) -> Self {
        FixtureProvider {
            dir: dir.to_path_buf(),
        }
    }
}

impl StructuredProvider for FixtureProvider {
    fn complete(&self, request: &StructuredRequest) -> Result<ProviderReply, TransportError> {
        let path = self.dir.join(format!("{}.json", request.schema));
        let content = std::fs::read_to_string(&path).map_err(|e| {
            TransportError::Fatal(format!("no fixture for schema '{}': {}", request.schema, e))
        })?;
        let value: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
            TransportError::Fatal(format!("fixture {} is not valid JSON: {}", path.display(), e))
        })?;
        Ok(ProviderReply::Completed(value))
    }
}

/// Resolve the process-wide provider. The provider integration is a
/// deployment concern; without one configured, LLM-backed commands fail
/// fast with a configuration error.
pub fn provider_from_env() -> PipelineResult<Arc<dyn StructuredProvider>> {
    if let Ok(dir) = std::env::var("CASECORPUS_LLM_FIXTURES") {
        return Ok(Arc::new(FixtureProvider::new(std::path::Path::new(&dir))));
    }
    Err(PipelineError::config(
        "no structured-response provider configured (set CASECORPUS_LLM_FIXTURES or link a provider)",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis_types::{ExecutiveSummaryResponse, MatchDecision};
    use crate::config::LlmConfig;

    fn test_config() -> LlmConfig {
        LlmConfig {
            model: "test-model".to_string(),
            model_revision: "r1".to_string(),
            api_key: None,
            timeout_secs: 5,
            max_attempts: 3,
        }
    }

    fn summary_json() -> serde_json::Value {
        serde_json::json!({
            "narrative": "The record shows an escalating dispute.",
            "key_findings": ["finding one"],
            "legal_implications": ["implication"],
            "recommended_actions": ["action"]
        })
    }

    #[test]
    fn test_completed_reply_parses_and_validates() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_completed(summary_json());
        let client = LlmClient::new(provider.clone(), &test_config());

        let result: ExecutiveSummaryResponse = client
            .call_structured(
                "system",
                serde_json::json!({"case": "C1"}),
                schemas::EXECUTIVE_SUMMARY,
                &CancellationToken::new(),
            )
            .unwrap();
        assert!(result.narrative.contains("escalating"));
        assert_eq!(client.calls_made(), 1);

        let requests = provider.recorded_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].temperature, 0.0);
        assert_eq!(requests[0].schema, schemas::EXECUTIVE_SUMMARY);
    }

    #[test]
    fn test_incomplete_raises_without_retry() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_incomplete("ran out of tokens");
        // A completed reply is queued behind it and must never be consumed.
        provider.push_completed(summary_json());
        let client = LlmClient::new(provider.clone(), &test_config());

        let err = client
            .call_structured::<ExecutiveSummaryResponse>(
                "system",
                serde_json::Value::Null,
                schemas::EXECUTIVE_SUMMARY,
                &CancellationToken::new(),
            )
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::LlmIncomplete);
        assert_eq!(provider.request_count(), 1);
    }

    #[test]
    fn test_refused_raises() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_refused("cannot analyze this content");
        let client = LlmClient::new(provider, &test_config());

        let err = client
            .call_structured::<ExecutiveSummaryResponse>(
                "system",
                serde_json::Value::Null,
                schemas::EXECUTIVE_SUMMARY,
                &CancellationToken::new(),
            )
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::LlmRefused);
    }

    #[test]
    fn test_transient_errors_retry_then_succeed() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_transport_error(TransportError::RateLimited("429".to_string()));
        provider.push_transport_error(TransportError::Network("reset".to_string()));
        provider.push_completed(summary_json());
        let client = LlmClient::new(provider.clone(), &test_config());

        let result: ExecutiveSummaryResponse = client
            .call_structured(
                "system",
                serde_json::Value::Null,
                schemas::EXECUTIVE_SUMMARY,
                &CancellationToken::new(),
            )
            .unwrap();
        assert!(!result.narrative.is_empty());
        assert_eq!(provider.request_count(), 3);
    }

    #[test]
    fn test_transient_errors_exhaust_attempts() {
        let provider = Arc::new(ScriptedProvider::new());
        for _ in 0..3 {
            provider.push_transport_error(TransportError::Network("reset".to_string()));
        }
        let client = LlmClient::new(provider.clone(), &test_config());

        let err = client
            .call_structured::<ExecutiveSummaryResponse>(
                "system",
                serde_json::Value::Null,
                schemas::EXECUTIVE_SUMMARY,
                &CancellationToken::new(),
            )
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::LlmFailed);
        assert_eq!(provider.request_count(), 3);
    }

    #[test]
    fn test_timeout_fails_fast() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_transport_error(TransportError::Timeout("120s elapsed".to_string()));
        provider.push_completed(summary_json());
        let client = LlmClient::new(provider.clone(), &test_config());

        let err = client
            .call_structured::<ExecutiveSummaryResponse>(
                "system",
                serde_json::Value::Null,
                schemas::EXECUTIVE_SUMMARY,
                &CancellationToken::new(),
            )
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::LlmTimeout);
        assert_eq!(provider.request_count(), 1);
    }

    #[test]
    fn test_schema_mismatch_is_failure() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_completed(serde_json::json!({"wrong": "shape"}));
        let client = LlmClient::new(provider, &test_config());

        let err = client
            .call_structured::<ExecutiveSummaryResponse>(
                "system",
                serde_json::Value::Null,
                schemas::EXECUTIVE_SUMMARY,
                &CancellationToken::new(),
            )
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::LlmFailed);
    }

    #[test]
    fn test_validation_failure_is_failure() {
        let provider = Arc::new(ScriptedProvider::new());
        // Schema-shaped but semantically invalid: out-of-range confidence.
        provider.push_completed(serde_json::json!({
            "decision": "match",
            "confidence": 3.5
        }));
        let client = LlmClient::new(provider, &test_config());

        let err = client
            .call_structured::<crate::analysis_types::EntityMatchResponse>(
                "system",
                serde_json::Value::Null,
                schemas::ENTITY_MATCH,
                &CancellationToken::new(),
            )
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::LlmFailed);
    }

    #[test]
    fn test_cancellation_short_circuits() {
        let provider = Arc::new(ScriptedProvider::always(summary_json()));
        let client = LlmClient::new(provider.clone(), &test_config());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = client
            .call_structured::<ExecutiveSummaryResponse>(
                "system",
                serde_json::Value::Null,
                schemas::EXECUTIVE_SUMMARY,
                &cancel,
            )
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(provider.request_count(), 0);
    }

    #[test]
    fn test_fixture_provider_reads_by_schema() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("executive_summary.json"),
            serde_json::to_string(&summary_json()).unwrap(),
        )
        .unwrap();
        let provider = Arc::new(FixtureProvider::new(dir.path()));
        let client = LlmClient::new(provider, &test_config());

        let result: ExecutiveSummaryResponse = client
            .call_structured(
                "system",
                serde_json::Value::Null,
                schemas::EXECUTIVE_SUMMARY,
                &CancellationToken::new(),
            )
            .unwrap();
        assert!(result.narrative.contains("escalating"));

        // Missing fixture for another schema fails fast.
        let err = client
            .call_structured::<ExecutiveSummaryResponse>(
                "system",
                serde_json::Value::Null,
                schemas::CHUNK_SUMMARY,
                &CancellationToken::new(),
            )
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::LlmFailed);
    }

    #[test]
    fn test_match_decision_parses() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_completed(serde_json::json!({
            "decision": "no_match",
            "confidence": 0.8
        }));
        let client = LlmClient::new(provider, &test_config());

        let result: crate::analysis_types::EntityMatchResponse = client
            .call_structured(
                "system",
                serde_json::Value::Null,
                schemas::ENTITY_MATCH,
                &CancellationToken::new(),
            )
            .unwrap();
        assert_eq!(result.decision, MatchDecision::NoMatch);
    }
}

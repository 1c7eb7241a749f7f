//! End-to-end scenario: the Supervisor captures a workflow's terminal
//! response, runs `post_process` exactly once, and falls back to a
//! human-review message when the workflow escalates without an explicit
//! handler value.

use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

use async_trait::async_trait;
use serde_json::Value;
use streetrace::runtime::errors::ProviderError;
use streetrace::runtime::llm_client::{CompletionResult, LlmClient, Message, ModelChunk, TokenUsage, ToolDefinition};
use streetrace::runtime::tool_provider::{ToolMetadata, ToolProvider, ToolResult};
use streetrace::session::service::{InMemorySessionService, Session, SessionService};
use streetrace::Supervisor;

struct FixedLlm {
    response: &'static str,
}

#[async_trait]
impl LlmClient for FixedLlm {
    async fn complete(&self, _model: &str, _messages: &[Message], _tools: &[ToolDefinition]) -> Result<CompletionResult, ProviderError> {
        Ok(CompletionResult { message: Message::assistant(self.response), usage: TokenUsage::default() })
    }
    async fn complete_stream(&self, _model: &str, _messages: &[Message], _tools: &[ToolDefinition]) -> Result<Vec<ModelChunk>, ProviderError> {
        Ok(Vec::new())
    }
    fn model_name(&self) -> &str {
        "fixed"
    }
}

struct NoopTools;

#[async_trait]
impl ToolProvider for NoopTools {
    async fn execute(&self, _name: &str, _args: &Value) -> ToolResult {
        ToolResult::success("")
    }
    fn list_tools(&self) -> Vec<ToolMetadata> {
        Vec::new()
    }
}

/// Counts how many times `post_process` ran, confirming the exactly-once
/// contract from `spec.md` §4.12.
struct CountingSessionService {
    inner: InMemorySessionService,
    post_process_calls: AtomicU32,
}

impl CountingSessionService {
    fn new() -> Self {
        Self { inner: InMemorySessionService::new(), post_process_calls: AtomicU32::new(0) }
    }
}

#[async_trait]
impl SessionService for CountingSessionService {
    async fn get_or_create(&self, app_name: &str, user_id: &str, session_id: &str) -> Arc<Session> {
        self.inner.get_or_create(app_name, user_id, session_id).await
    }

    async fn validate(&self, session: Arc<Session>) -> Arc<Session> {
        self.inner.validate(session).await
    }

    async fn replace_events(&self, session: &Arc<Session>, events: Vec<streetrace::session::event::Event>) -> Arc<Session> {
        self.inner.replace_events(session, events).await
    }

    async fn post_process(&self, user_input: &str, original_session: &Arc<Session>) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.post_process_calls.fetch_add(1, Ordering::Relaxed);
        let _ = (user_input, original_session);
        Ok(())
    }
}

#[tokio::test]
async fn captures_final_response_and_runs_post_process_exactly_once() {
    let src = "streetrace v1\nflow main:\n    x = \"hi\"\n    return x\n";
    let outcome = streetrace::dsl::compile_source(src, "turn.sr").unwrap();
    assert!(outcome.is_valid, "{:?}", outcome.errors);

    let service = Arc::new(CountingSessionService::new());
    let supervisor = Supervisor::new(service.clone());

    let result = supervisor
        .handle("app", "user-1", "sess-1", "hello", &outcome.compiled, "main", Arc::new(FixedLlm { response: "irrelevant" }), Arc::new(NoopTools))
        .await
        .unwrap();

    assert_eq!(result.text, "hi");
    assert!(!result.escalated);
    assert_eq!(service.post_process_calls.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn falls_back_to_human_review_message_on_escalation_without_explicit_handler() {
    let src = r#"streetrace v1
prompt worker_prompt:
    "Do the task."
    escalate if == "NEEDS_HUMAN"
agent worker:
    instruction worker_prompt
flow main:
    run agent worker
    return "unreachable if escalated text check below only inspects ctx"
"#;
    let outcome = streetrace::dsl::compile_source(src, "turn.sr").unwrap();
    assert!(outcome.is_valid, "{:?}", outcome.errors);

    let service = Arc::new(CountingSessionService::new());
    let supervisor = Supervisor::new(service);

    let result = supervisor
        .handle("app", "user-1", "sess-2", "hello", &outcome.compiled, "main", Arc::new(FixedLlm { response: "NEEDS_HUMAN" }), Arc::new(NoopTools))
        .await
        .unwrap();

    assert!(result.escalated);
}

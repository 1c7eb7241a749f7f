//! End-to-end scenario: a prompt's `escalate if ~ "..."` clause fires on a
//! markdown/whitespace-decorated model response and the flow's `on
//! escalate` handler returns the escalation message instead of continuing.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use streetrace::runtime::context::{create_context, WorkflowContext};
use streetrace::runtime::errors::ProviderError;
use streetrace::runtime::interpreter::{run_flow_by_name, FlowOutcome};
use streetrace::runtime::llm_client::{CompletionResult, LlmClient, Message, ModelChunk, TokenUsage, ToolDefinition};
use streetrace::runtime::tool_provider::{ToolMetadata, ToolProvider, ToolResult};

struct DecoratedResponseLlm;

#[async_trait]
impl LlmClient for DecoratedResponseLlm {
    async fn complete(&self, _model: &str, _messages: &[Message], _tools: &[ToolDefinition]) -> Result<CompletionResult, ProviderError> {
        Ok(CompletionResult { message: Message::assistant("**Task Complete**  "), usage: TokenUsage::default() })
    }

    async fn complete_stream(&self, _model: &str, _messages: &[Message], _tools: &[ToolDefinition]) -> Result<Vec<ModelChunk>, ProviderError> {
        Ok(Vec::new())
    }

    fn model_name(&self) -> &str {
        "decorated"
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

#[tokio::test]
async fn normalized_escalation_clause_matches_decorated_response() {
    let src = r#"streetrace v1
prompt worker_prompt:
    "Do the task."
    escalate if ~ "task complete"
agent worker:
    instruction worker_prompt
flow main:
    run agent worker on escalate return "escalated: handled"
    return "not escalated"
"#;
    let outcome = streetrace::dsl::compile_source(src, "escalation.sr").unwrap();
    assert!(outcome.is_valid, "{:?}", outcome.errors);

    let (ctx, _rx) = create_context(&outcome.compiled, Arc::new(DecoratedResponseLlm), Arc::new(NoopTools));
    let ctx = Arc::new(ctx);

    let result = run_flow_by_name(&ctx, &outcome.compiled, "main").await.unwrap();
    match result {
        FlowOutcome::Returned(Value::String(text)) => assert_eq!(text, "escalated: handled"),
        other => panic!("expected a returned string, got a different outcome: {}", matches!(other, FlowOutcome::Completed)),
    }
    assert!(ctx.last_escalated().await.is_some());
    let _: &WorkflowContext = &ctx;
}

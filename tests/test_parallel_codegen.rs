//! End-to-end scenario: a `parallel do` block compiled from DSL source fans
//! out two `run agent` branches concurrently, each branch's result landing
//! in its own context variable with no cross-branch interference, and a
//! failing branch cancels its sibling.

use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

use async_trait::async_trait;
use serde_json::Value;
use streetrace::dsl::ast::Statement;
use streetrace::runtime::context::create_context;
use streetrace::runtime::errors::{ProviderError, ProviderErrorKind};
use streetrace::runtime::interpreter::{run_flow_by_name, FlowOutcome};
use streetrace::runtime::llm_client::{CompletionResult, LlmClient, Message, ModelChunk, TokenUsage, ToolDefinition};
use streetrace::runtime::tool_provider::{ToolMetadata, ToolProvider, ToolResult};

struct PerAgentLlm {
    calls: AtomicU32,
    fail_agent_b: bool,
}

#[async_trait]
impl LlmClient for PerAgentLlm {
    async fn complete(&self, _model: &str, messages: &[Message], _tools: &[ToolDefinition]) -> Result<CompletionResult, ProviderError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let system_text = messages.first().map(|m| m.content.to_string()).unwrap_or_default();
        if self.fail_agent_b && system_text.contains("agent_b_prompt body") {
            return Err(ProviderError { kind: ProviderErrorKind::BadRequest, message: "bad request".into() });
        }
        Ok(CompletionResult { message: Message::assistant(format!("response for [{system_text}]")), usage: TokenUsage::default() })
    }

    async fn complete_stream(&self, _model: &str, _messages: &[Message], _tools: &[ToolDefinition]) -> Result<Vec<ModelChunk>, ProviderError> {
        Ok(Vec::new())
    }

    fn model_name(&self) -> &str {
        "per-agent"
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

const SRC: &str = r#"streetrace v1
prompt agent_a_prompt:
    "agent_a_prompt body"
prompt agent_b_prompt:
    "agent_b_prompt body"
agent agent_a:
    instruction agent_a_prompt
agent agent_b:
    instruction agent_b_prompt
flow main:
    parallel do:
        run agent agent_a
        result_a = run agent agent_a
        result_b = run agent agent_b
    return result_b
"#;

#[tokio::test]
async fn parallel_block_is_run_only_and_compiles_cleanly() {
    let outcome = streetrace::dsl::compile_source(SRC, "parallel.sr").unwrap();
    assert!(outcome.is_valid, "{:?}", outcome.errors);

    let flow = outcome.compiled.flow("main").unwrap();
    let Statement::Parallel { body, .. } = &flow.body[0] else { panic!("expected a parallel block") };
    assert!(body.iter().all(|s| matches!(s, Statement::Run { .. })));
}

#[tokio::test]
async fn disjoint_targets_each_receive_their_own_branch_result() {
    let src = r#"streetrace v1
prompt agent_a_prompt:
    "agent_a_prompt body"
prompt agent_b_prompt:
    "agent_b_prompt body"
agent agent_a:
    instruction agent_a_prompt
agent agent_b:
    instruction agent_b_prompt
flow main:
    parallel do:
        result_a = run agent agent_a
        result_b = run agent agent_b
    return result_a
"#;
    let outcome = streetrace::dsl::compile_source(src, "parallel.sr").unwrap();
    assert!(outcome.is_valid, "{:?}", outcome.errors);

    let llm = Arc::new(PerAgentLlm { calls: AtomicU32::new(0), fail_agent_b: false });
    let (ctx, _rx) = create_context(&outcome.compiled, llm, Arc::new(NoopTools));
    let ctx = Arc::new(ctx);

    let result = run_flow_by_name(&ctx, &outcome.compiled, "main").await.unwrap();
    let FlowOutcome::Returned(Value::String(text)) = result else { panic!("expected a returned string") };
    assert!(text.contains("agent_a_prompt body"));
    assert!(ctx.get_var("result_b").await.is_some());
}

#[tokio::test]
async fn a_failing_branch_fails_the_whole_parallel_block() {
    let src = r#"streetrace v1
prompt agent_a_prompt:
    "agent_a_prompt body"
prompt agent_b_prompt:
    "agent_b_prompt body"
agent agent_a:
    instruction agent_a_prompt
agent agent_b:
    instruction agent_b_prompt
flow main:
    parallel do:
        result_a = run agent agent_a
        result_b = run agent agent_b
    return result_a
"#;
    let outcome = streetrace::dsl::compile_source(src, "parallel.sr").unwrap();
    let llm = Arc::new(PerAgentLlm { calls: AtomicU32::new(0), fail_agent_b: true });
    let (ctx, _rx) = create_context(&outcome.compiled, llm, Arc::new(NoopTools));
    let ctx = Arc::new(ctx);

    let result = run_flow_by_name(&ctx, &outcome.compiled, "main").await;
    assert!(result.is_err());
}

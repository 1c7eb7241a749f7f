//! Parallel executor (C8): fans a `parallel do` block's `run agent`
//! statements out concurrently, writes each branch's result into its own
//! context variable, and cancels siblings on the first non-retriable
//! failure.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::warn;
use serde_json::Value;

use crate::runtime::agent_runner::run_agent;
use crate::runtime::context::WorkflowContext;
use crate::runtime::errors::DslRuntimeError;

/// One branch of a `parallel do` block.
#[derive(Debug, Clone)]
pub struct ParallelSpec {
    pub target: Option<String>,
    pub agent: String,
    pub input: Option<Value>,
}

/// Run every spec concurrently via `tokio::spawn`. Targets are unique by
/// construction (the analyzer assigns a fresh local per `run` statement),
/// so branches never race on the same context variable.
///
/// On the first non-retriable branch failure, a shared flag is flipped;
/// every other branch observes it at its next agent-runner retry-loop
/// boundary (`spec.md` §5: cooperative cancellation, not `task.abort()`).
/// All branches are awaited to completion before the executor re-raises —
/// matching "fail-fast cancellation ... executor re-raises after all
/// settle".
pub async fn execute_parallel(ctx: Arc<WorkflowContext>, specs: Vec<ParallelSpec>) -> Result<(), DslRuntimeError> {
    let cancelled = Arc::new(AtomicBool::new(false));
    let mut handles = Vec::with_capacity(specs.len());

    for spec in specs {
        let ctx = ctx.clone();
        let cancelled = cancelled.clone();
        handles.push(tokio::spawn(async move {
            let flag = cancelled.clone();
            let result = run_agent(&ctx, &spec.agent, spec.input.as_ref(), &move || flag.load(Ordering::Relaxed)).await;
            (spec.target, result)
        }));
    }

    let mut first_error: Option<DslRuntimeError> = None;
    for handle in handles {
        match handle.await {
            Ok((target, Ok(text))) => {
                if let Some(target) = target {
                    ctx.set_var(target, Value::String(text)).await;
                }
            }
            Ok((_, Err(err))) => {
                warn!("parallel branch failed: {err}; cancelling siblings");
                cancelled.store(true, Ordering::Relaxed);
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
            Err(join_err) => {
                cancelled.store(true, Ordering::Relaxed);
                if first_error.is_none() {
                    first_error = Some(DslRuntimeError::Abort { message: format!("parallel branch panicked: {join_err}") });
                }
            }
        }
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::context::create_context;
    use crate::runtime::errors::{ProviderError, ProviderErrorKind};
    use crate::runtime::llm_client::{CompletionResult, LlmClient, Message, ModelChunk, TokenUsage, ToolDefinition};
    use crate::runtime::tool_provider::{ToolMetadata, ToolProvider, ToolResult};
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    struct ScriptedLlm {
        calls: Mutex<u32>,
        fail_on_second: bool,
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(
            &self,
            _model: &str,
            _messages: &[Message],
            _tools: &[ToolDefinition],
        ) -> Result<CompletionResult, ProviderError> {
            let mut calls = self.calls.lock().await;
            *calls += 1;
            if self.fail_on_second && *calls == 2 {
                return Err(ProviderError { kind: ProviderErrorKind::BadRequest, message: "nope".into() });
            }
            Ok(CompletionResult { message: Message::assistant(format!("ok-{calls}")), usage: TokenUsage::default() })
        }

        async fn complete_stream(
            &self,
            _model: &str,
            _messages: &[Message],
            _tools: &[ToolDefinition],
        ) -> Result<Vec<ModelChunk>, ProviderError> {
            Ok(Vec::new())
        }

        fn model_name(&self) -> &str {
            "scripted"
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

    fn two_agent_workflow() -> crate::dsl::codegen::CompiledWorkflow {
        let src = "streetrace v1\nprompt p:\n    \"do thing\"\nagent a:\n    instruction p\nagent b:\n    instruction p\nflow main:\n    return 1\n";
        let outcome = crate::dsl::parser::parse(src, "test.sr").unwrap();
        crate::dsl::codegen::generate(&outcome.file)
    }

    #[tokio::test]
    async fn writes_each_branch_result_into_its_own_target() {
        let compiled = two_agent_workflow();
        let llm = Arc::new(ScriptedLlm { calls: Mutex::new(0), fail_on_second: false });
        let (ctx, _rx) = create_context(&compiled, llm, Arc::new(NoopTools));
        let ctx = Arc::new(ctx);

        let specs = vec![
            ParallelSpec { target: Some("r1".into()), agent: "a".into(), input: None },
            ParallelSpec { target: Some("r2".into()), agent: "b".into(), input: None },
        ];
        execute_parallel(ctx.clone(), specs).await.unwrap();

        assert!(ctx.get_var("r1").await.is_some());
        assert!(ctx.get_var("r2").await.is_some());
    }

    #[tokio::test]
    async fn propagates_first_non_retriable_branch_error() {
        let compiled = two_agent_workflow();
        let llm = Arc::new(ScriptedLlm { calls: Mutex::new(0), fail_on_second: true });
        let (ctx, _rx) = create_context(&compiled, llm, Arc::new(NoopTools));
        let ctx = Arc::new(ctx);

        let specs = vec![
            ParallelSpec { target: Some("r1".into()), agent: "a".into(), input: None },
            ParallelSpec { target: Some("r2".into()), agent: "b".into(), input: None },
        ];
        let result = execute_parallel(ctx, specs).await;
        assert!(result.is_err());
    }
}

//! Supervisor (C12): the single entry point driving one user turn end to
//! end — resolve the workload, get or create the session, run the
//! workflow's entry flow, and capture its final response.

use std::sync::Arc;

use log::{error, info};
use tokio::sync::mpsc;

use crate::dsl::codegen::CompiledWorkflow;
use crate::runtime::context::create_context;
use crate::runtime::interpreter::run_flow_by_name;
use crate::runtime::llm_client::LlmClient;
use crate::runtime::tool_provider::ToolProvider;
use crate::session::event::{FlowEvent, Part};
use crate::session::service::SessionService;

/// The response produced by one Supervisor turn.
#[derive(Debug, Clone)]
pub struct TurnResult {
    pub text: String,
    pub escalated: bool,
}

pub struct Supervisor {
    session_service: Arc<dyn SessionService>,
}

impl Supervisor {
    pub fn new(session_service: Arc<dyn SessionService>) -> Self {
        Self { session_service }
    }

    /// Drive one turn: resolve (or create) the session, run `flow_name`
    /// against `compiled`, and return the captured final response text.
    ///
    /// Failures resolving the workload, session, or workflow are fail-fast
    /// (`spec.md` §4.12 Open Question resolution) and propagate directly.
    /// A `post_process` failure, by contrast, is dispatched to the caller as
    /// a UI error event but the underlying error is still returned from
    /// this call — both behaviors hold simultaneously, as `spec.md` itself
    /// resolves.
    pub async fn handle(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
        user_input: &str,
        compiled: &CompiledWorkflow,
        flow_name: &str,
        llm_client: Arc<dyn LlmClient>,
        tool_provider: Arc<dyn ToolProvider>,
    ) -> Result<TurnResult, Box<dyn std::error::Error + Send + Sync>> {
        let session = self.session_service.get_or_create(app_name, user_id, session_id).await;
        let session = self.session_service.validate(session).await;
        info!("supervisor: turn started for session {session_id}");

        let (ctx, mut events_rx) = create_context(compiled, llm_client, tool_provider);
        ctx.set_var("input", serde_json::Value::String(user_input.to_string())).await;
        let ctx = Arc::new(ctx);

        let ctx_for_run = ctx.clone();
        let compiled_owned = compiled.clone();
        let flow_name_owned = flow_name.to_string();
        let run_handle = tokio::spawn(async move { run_flow_by_name(&ctx_for_run, &compiled_owned, &flow_name_owned).await });

        // Drive the turn off the ADK-style event stream itself (`spec.md`
        // §4.12): once `actions.escalate` has been seen on any event, every
        // later `is_final` event (including the flow's own return, if the
        // flow kept running past an unhandled escalation) reports the
        // escalation message rather than its own text.
        let mut final_response: Option<String> = None;
        let mut final_event_seen = false;
        let mut escalated = false;

        while let Some(event) = events_rx.recv().await {
            self.dispatch_ui_event(&event);
            if let FlowEvent::Adk(adk_event) = &event {
                if adk_event.actions.escalate {
                    escalated = true;
                }
                if adk_event.is_final {
                    final_event_seen = true;
                    final_response = Some(if escalated {
                        format!("Agent escalated: {}", adk_event.error_message.clone().unwrap_or_else(|| "No specific message.".to_string()))
                    } else {
                        adk_event
                            .content
                            .parts
                            .iter()
                            .find_map(|p| match p {
                                Part::Text { text } => Some(text.clone()),
                                _ => None,
                            })
                            .unwrap_or_default()
                    });
                }
            }
        }

        run_handle.await.map_err(|e| Box::new(std::io::Error::other(e.to_string())) as Box<dyn std::error::Error + Send + Sync>)??;

        let text = final_response.unwrap_or_else(|| "Agent did not produce a final response.".to_string());
        let turn_result = TurnResult { text, escalated };

        if final_event_seen {
            if let Err(err) = self.session_service.post_process(user_input, &session).await {
                error!("supervisor: post_process failed for session {session_id}: {err}");
                self.dispatch_ui_event(&FlowEvent::AgentFailed { agent: "post_process".into(), error: err.to_string() });
                return Err(err);
            }
        }

        Ok(turn_result)
    }

    fn dispatch_ui_event(&self, event: &FlowEvent) {
        // A real UI front-end would render these; this crate's core only
        // guarantees the dispatch happens, matching "exposed event stream"
        // in `spec.md` §6.
        log::debug!("flow event: {event:?}");
    }
}

impl std::fmt::Debug for FlowEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlowEvent::RunStarted { flow } => write!(f, "RunStarted({flow})"),
            FlowEvent::RunCompleted { flow } => write!(f, "RunCompleted({flow})"),
            FlowEvent::AgentSelected { agent } => write!(f, "AgentSelected({agent})"),
            FlowEvent::AgentResponded { agent, .. } => write!(f, "AgentResponded({agent})"),
            FlowEvent::ToolCallStarted { tool } => write!(f, "ToolCallStarted({tool})"),
            FlowEvent::ToolCallCompleted { tool, success } => write!(f, "ToolCallCompleted({tool}, {success})"),
            FlowEvent::Escalated { agent, condition_op, .. } => write!(f, "Escalated({agent}, {condition_op:?})"),
            FlowEvent::CompactionPerformed { messages_removed } => write!(f, "CompactionPerformed({messages_removed})"),
            FlowEvent::Adk(event) => write!(f, "Adk(is_final={}, escalate={})", event.is_final, event.actions.escalate),
            FlowEvent::AgentFailed { agent, .. } => write!(f, "AgentFailed({agent})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::errors::ProviderError;
    use crate::runtime::llm_client::{CompletionResult, Message, ModelChunk, TokenUsage, ToolDefinition};
    use crate::runtime::tool_provider::{ToolMetadata, ToolResult};
    use crate::session::service::InMemorySessionService;
    use async_trait::async_trait;
    use serde_json::Value;

    struct StubLlm;

    #[async_trait]
    impl LlmClient for StubLlm {
        async fn complete(&self, _model: &str, _messages: &[Message], _tools: &[ToolDefinition]) -> Result<CompletionResult, ProviderError> {
            Ok(CompletionResult { message: Message::assistant("final answer"), usage: TokenUsage::default() })
        }
        async fn complete_stream(&self, _model: &str, _messages: &[Message], _tools: &[ToolDefinition]) -> Result<Vec<ModelChunk>, ProviderError> {
            Ok(Vec::new())
        }
        fn model_name(&self) -> &str {
            "stub"
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
    async fn captures_returned_value_as_final_response() {
        let src = "streetrace v1\nflow main:\n    x = 1\n    return x\n";
        let outcome = crate::dsl::compile_source(src, "test.sr").unwrap();
        assert!(outcome.is_valid);

        let supervisor = Supervisor::new(Arc::new(InMemorySessionService::new()));
        let result = supervisor
            .handle("app", "user1", "sess1", "hello", &outcome.compiled, "main", Arc::new(StubLlm), Arc::new(NoopTools))
            .await
            .unwrap();

        assert_eq!(result.text, "1");
        assert!(!result.escalated);
    }
}

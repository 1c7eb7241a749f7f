//! Workflow context (C5): the mutable state a compiled workflow's flows read
//! and write while they run — variables, the definitions a flow may
//! reference, and the last call's result/escalation status.

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use serde_json::Value;
use tokio::sync::{mpsc, RwLock};

use crate::dsl::ast::PolicyDef;
use crate::dsl::codegen::{CompiledAgent, CompiledPrompt, CompiledWorkflow};
use crate::runtime::compaction;
use crate::runtime::errors::DslRuntimeError;
use crate::runtime::escalation;
use crate::runtime::llm_client::{LlmClient, Message};
use crate::runtime::tool_provider::ToolProvider;
use crate::session::event::{Event, FlowEvent};

/// Shared, runtime-mutable view over a [`CompiledWorkflow`] plus the
/// collaborators (`LlmClient`, `ToolProvider`) it was bound to at
/// `create_context` time.
pub struct WorkflowContext {
    models: RwLock<HashMap<String, String>>,
    prompts: RwLock<HashMap<String, CompiledPrompt>>,
    agents: RwLock<HashMap<String, CompiledAgent>>,
    schemas: RwLock<HashMap<String, Value>>,
    vars: RwLock<HashMap<String, Value>>,
    /// `ctx._last_call_result` (`spec.md` §4.5): the concatenated final
    /// response text of the most recent `call llm`/`run agent`.
    last_call_result: RwLock<Option<String>>,
    /// `ctx._last_escalated` (`spec.md` §4.5): set when the most recent
    /// call's escalation clause matched.
    last_escalated: RwLock<Option<String>>,
    /// Per-agent message history (C9): accumulated across every `run agent`
    /// call so there is something for the history compactor to shrink.
    history: RwLock<HashMap<String, Vec<Message>>>,
    /// The workflow's `policy compaction` default, consulted only when an
    /// agent has no `history` override (`spec.md` §4.9).
    compaction_policy: Option<PolicyDef>,
    llm_client: Arc<dyn LlmClient>,
    tool_provider: Arc<dyn ToolProvider>,
    events: mpsc::UnboundedSender<FlowEvent>,
}

/// Construct a [`WorkflowContext`] seeded from a compiled workflow's
/// definitions, returning it alongside the receiving end of its event
/// channel (the Supervisor/agent runner drain this to drive a turn).
pub fn create_context(
    compiled: &CompiledWorkflow,
    llm_client: Arc<dyn LlmClient>,
    tool_provider: Arc<dyn ToolProvider>,
) -> (WorkflowContext, mpsc::UnboundedReceiver<FlowEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let ctx = WorkflowContext {
        models: RwLock::new(compiled.models.clone()),
        prompts: RwLock::new(compiled.prompts.clone()),
        agents: RwLock::new(compiled.agents.clone()),
        schemas: RwLock::new(HashMap::new()),
        vars: RwLock::new(HashMap::new()),
        last_call_result: RwLock::new(None),
        last_escalated: RwLock::new(None),
        history: RwLock::new(HashMap::new()),
        compaction_policy: compiled.compaction_policy.clone(),
        llm_client,
        tool_provider,
        events: tx,
    };
    (ctx, rx)
}

impl WorkflowContext {
    pub async fn set_models(&self, models: HashMap<String, String>) {
        *self.models.write().await = models;
    }

    pub async fn set_prompts(&self, prompts: HashMap<String, CompiledPrompt>) {
        *self.prompts.write().await = prompts;
    }

    pub async fn set_agents(&self, agents: HashMap<String, CompiledAgent>) {
        *self.agents.write().await = agents;
    }

    pub async fn set_schemas(&self, schemas: HashMap<String, Value>) {
        *self.schemas.write().await = schemas;
    }

    pub async fn get_var(&self, name: &str) -> Option<Value> {
        self.vars.read().await.get(name).cloned()
    }

    pub async fn set_var(&self, name: impl Into<String>, value: Value) {
        self.vars.write().await.insert(name.into(), value);
    }

    pub async fn last_call_result(&self) -> Option<String> {
        self.last_call_result.read().await.clone()
    }

    pub async fn last_escalated(&self) -> Option<String> {
        self.last_escalated.read().await.clone()
    }

    pub fn emit(&self, event: FlowEvent) {
        // A closed receiver just means nobody is watching this turn's
        // events anymore; dropping the notification is fine.
        let _ = self.events.send(event);
    }

    pub fn tool_provider(&self) -> &Arc<dyn ToolProvider> {
        &self.tool_provider
    }

    pub fn llm_client(&self) -> &Arc<dyn LlmClient> {
        &self.llm_client
    }

    pub async fn get_agent(&self, name: &str) -> Option<CompiledAgent> {
        self.agents.read().await.get(name).cloned()
    }

    pub async fn get_prompt(&self, name: &str) -> Option<CompiledPrompt> {
        self.prompts.read().await.get(name).cloned()
    }

    pub async fn render(&self, template: &str) -> String {
        self.render_template(template).await
    }

    /// Shared tail of `call_llm`/`run_agent`: record `_last_call_result`,
    /// evaluate the prompt's escalation clause if any, and record
    /// `_last_escalated`. A match emits the two-event escalation pair
    /// `spec.md` §4.7/§8 require: an `EscalationEvent` followed by a
    /// separate ADK-style event carrying `actions.escalate = true`.
    pub async fn record_call_result(&self, source_name: &str, raw_response: &str, escalation: Option<&crate::dsl::ast::EscalationSpec>) {
        *self.last_call_result.write().await = Some(raw_response.to_string());
        match escalation {
            Some(spec) if escalation::evaluate(spec.op, raw_response, &spec.value) => {
                *self.last_escalated.write().await = Some(raw_response.to_string());
                self.emit(FlowEvent::Escalated {
                    agent: source_name.to_string(),
                    result: raw_response.to_string(),
                    condition_op: spec.op,
                    condition_value: spec.value.clone(),
                });
                self.emit(FlowEvent::Adk(Event::escalate_action(source_name, None)));
            }
            _ => {
                *self.last_escalated.write().await = None;
            }
        }
    }

    /// Turn-boundary history compaction (`spec.md` §4.9): appends
    /// `new_messages` to `agent_name`'s running history, compacts it if the
    /// resolved strategy and `should_compact` both say to, and returns the
    /// message list the provider should actually see. `history_policy` is
    /// the agent's own `history` attribute, which overrides the workflow's
    /// `policy compaction` strategy when present; with neither set, no
    /// compaction is attempted.
    pub async fn prepare_turn_messages(
        &self,
        agent_name: &str,
        model: &str,
        history_policy: Option<&str>,
        new_messages: Vec<Message>,
    ) -> Vec<Message> {
        let mut messages = {
            let mut history = self.history.write().await;
            let entry = history.entry(agent_name.to_string()).or_default();
            entry.extend(new_messages);
            entry.clone()
        };

        let strategy = history_policy.map(str::to_string).or_else(|| {
            self.compaction_policy.as_ref().and_then(|p| p.properties.get("strategy").cloned())
        });

        if let Some(strategy) = strategy {
            if compaction::should_compact(compaction::count_tokens(&messages), model) {
                let result = match strategy.as_str() {
                    "summarize" => compaction::summarize(Some(self.llm_client.as_ref()), model, &messages).await,
                    _ => compaction::truncate(&messages),
                };
                if result.messages_removed > 0 {
                    self.emit(FlowEvent::CompactionPerformed { messages_removed: result.messages_removed });
                }
                messages = result.compacted_messages;
            }
        }

        self.history.write().await.insert(agent_name.to_string(), messages.clone());
        messages
    }

    /// Append the agent's own reply to its running history, so a later call
    /// compacts a genuine back-and-forth rather than re-sending the same
    /// single-turn prompt every time.
    pub async fn append_agent_history(&self, agent_name: &str, message: Message) {
        self.history.write().await.entry(agent_name.to_string()).or_default().push(message);
    }

    /// Render a value the way a flow's string interpolation does: a
    /// top-level string is used verbatim, a top-level bool/null follow
    /// Python's `str()` convention (`"True"`/`"False"`/`"None"`) since the
    /// original DSL runtime is Python-hosted, while any value nested inside
    /// a list or object is rendered through ordinary JSON encoding.
    pub fn stringify(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            Value::Bool(b) => if *b { "True" } else { "False" }.to_string(),
            Value::Null => "None".to_string(),
            Value::Number(n) => n.to_string(),
            Value::Array(_) | Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
        }
    }

    /// Substitute `{{name}}` placeholders in `template` with stringified
    /// context variables. Unknown placeholders are left verbatim.
    async fn render_template(&self, template: &str) -> String {
        let vars = self.vars.read().await;
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            rest = &rest[start + 2..];
            match rest.find("}}") {
                Some(end) => {
                    let name = rest[..end].trim();
                    match vars.get(name) {
                        Some(value) => out.push_str(&Self::stringify(value)),
                        None => out.push_str(&format!("{{{{{name}}}}}")),
                    }
                    rest = &rest[end + 2..];
                }
                None => {
                    out.push_str("{{");
                    break;
                }
            }
        }
        out.push_str(rest);
        out
    }

    /// `call_llm(prompt_name, input?)` (`spec.md` §4.5): render the named
    /// prompt, send it to the bound `LlmClient`, record
    /// `_last_call_result`/`_last_escalated`, and return the parsed response
    /// (a JSON value when the prompt declares `output schema`, otherwise a
    /// plain string value).
    pub async fn call_llm(&self, prompt_name: &str, input: Option<&Value>) -> Result<Value, DslRuntimeError> {
        let prompt = {
            let prompts = self.prompts.read().await;
            prompts.get(prompt_name).cloned().ok_or_else(|| DslRuntimeError::Abort {
                message: format!("call_llm: unknown prompt '{prompt_name}'"),
            })?
        };

        let model = prompt.model.clone().unwrap_or_else(|| "default".to_string());
        let rendered = self.render_template(&prompt.body).await;
        let mut messages = vec![Message::system(rendered)];
        if let Some(input) = input {
            messages.push(Message::user(Self::stringify(input)));
        }

        let result = self
            .llm_client
            .complete(&model, &messages, &[])
            .await
            .map_err(|e| DslRuntimeError::Abort { message: e.to_string() })?;
        let raw_response = result.message.content.to_string();

        self.record_call_result(prompt_name, &raw_response, prompt.escalation.as_ref()).await;

        if let Some(schema_name) = &prompt.schema {
            debug!("call_llm: parsing response against schema '{schema_name}'");
            return serde_json::from_str::<Value>(&raw_response).map_err(|e| DslRuntimeError::JsonParse {
                raw_response,
                parse_error: e.to_string(),
            });
        }

        Ok(Value::String(raw_response))
    }
}

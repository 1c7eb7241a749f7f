//! Event and flow-event types (`spec.md` §3 GLOSSARY: Event, Flow).
//!
//! `Event` is a durable session log entry — the same shape a session store
//! persists to disk (`spec.md` §6 session store JSON format). `FlowEvent` is
//! the ephemeral, UI-facing notification stream a workflow run emits while
//! it executes; it is never persisted directly, only summarized into
//! `Event`s by the agent runner.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dsl::ast::EscalationOp;

/// One piece of an [`Event`]'s content — text, a tool invocation, or a
/// tool's response to one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Part {
    Text { text: String },
    FunctionCall { id: String, name: String, args: Value },
    FunctionResponse { id: String, name: String, response: Value },
}

impl Part {
    pub fn call_id(&self) -> Option<&str> {
        match self {
            Part::FunctionCall { id, .. } | Part::FunctionResponse { id, .. } => Some(id),
            Part::Text { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

/// ADK-style action flags carried on an [`Event`] (`spec.md` §3 GLOSSARY).
/// `escalate` marks the event that follows an `EscalationEvent`: the turn is
/// ending without the flow itself producing a value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventActions {
    pub escalate: bool,
}

/// A durable, ordered entry in a [`crate::session::service::Session`]'s
/// event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub author: String,
    pub content: Content,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Set on the last event of a turn (`spec.md` §4.12): the Supervisor
    /// only captures `final_response` from an event where this is `true`.
    pub is_final: bool,
    pub partial: bool,
    pub actions: EventActions,
    /// Populated on an escalate-action event when the escalation carried an
    /// explicit message; `None` falls back to "No specific message.".
    pub error_message: Option<String>,
}

impl Event {
    pub fn text(author: impl Into<String>, role: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            author: author.into(),
            content: Content { role: role.into(), parts: vec![Part::Text { text: text.into() }] },
            timestamp: chrono::Utc::now(),
            is_final: false,
            partial: false,
            actions: EventActions::default(),
            error_message: None,
        }
    }

    /// The terminal event a flow's completed run yields (`spec.md` §4.12):
    /// `is_final`, carrying the stringified return value as its sole text
    /// part.
    pub fn final_response(author: impl Into<String>, text: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            author: author.into(),
            content: Content { role: "model".into(), parts: vec![Part::Text { text }] },
            timestamp: chrono::Utc::now(),
            is_final: true,
            partial: false,
            actions: EventActions::default(),
            error_message: None,
        }
    }

    /// The ADK-style event that follows an `EscalationEvent` (`spec.md`
    /// §4.7/§8): no text content, `actions.escalate = true`.
    pub fn escalate_action(author: impl Into<String>, error_message: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            author: author.into(),
            content: Content { role: "model".into(), parts: Vec::new() },
            timestamp: chrono::Utc::now(),
            is_final: true,
            partial: false,
            actions: EventActions { escalate: true },
            error_message,
        }
    }
}

/// Notifications dispatched while a compiled workflow runs (C6–C9). The
/// Supervisor (C12) consumes these to drive a turn and to build UI updates;
/// the parallel executor (C8) interleaves them non-deterministically across
/// branches but keeps them totally ordered within one branch.
#[derive(Clone)]
pub enum FlowEvent {
    RunStarted { flow: String },
    RunCompleted { flow: String },
    AgentSelected { agent: String },
    AgentResponded { agent: String, text: String },
    ToolCallStarted { tool: String },
    ToolCallCompleted { tool: String, success: bool },
    /// An escalation clause matched (`spec.md` §3 GLOSSARY: `EscalationEvent`).
    /// Always followed by an [`FlowEvent::Adk`] event with `actions.escalate`
    /// set, the same way the two events arrive as a pair in the original
    /// runtime.
    Escalated { agent: String, result: String, condition_op: EscalationOp, condition_value: String },
    CompactionPerformed { messages_removed: usize },
    /// An ADK-style [`Event`] carried onto the flow event stream verbatim —
    /// the escalate-action event following `Escalated`, and a flow's
    /// final-response event.
    Adk(Event),
    /// A non-retriable failure the caller must see; mirrors the teacher's
    /// newer structured `AgentFailed` event replacing bare `eprintln!`.
    AgentFailed { agent: String, error: String },
}

impl FlowEvent {
    pub fn is_final(&self) -> bool {
        matches!(self, FlowEvent::Adk(event) if event.is_final)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_event_has_single_text_part() {
        let event = Event::text("user", "user", "hello");
        assert_eq!(event.content.parts.len(), 1);
        assert!(matches!(event.content.parts[0], Part::Text { .. }));
    }

    #[test]
    fn final_response_event_is_final() {
        let event = Event::final_response("main", "done".into());
        assert!(FlowEvent::Adk(event).is_final());
        assert!(!FlowEvent::RunStarted { flow: "main".into() }.is_final());
    }

    #[test]
    fn escalate_action_event_carries_escalate_flag() {
        let event = Event::escalate_action("worker", None);
        assert!(event.actions.escalate);
        assert!(event.content.parts.is_empty());
    }
}

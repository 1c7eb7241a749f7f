//! Session service (C10): an append-only ordered event log plus the
//! validation, retrieval, and post-processing operations `spec.md` §4.10
//! defines over it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::session::event::{Event, Part};

#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub app_name: String,
    pub user_id: String,
    pub events: Vec<Event>,
    pub state: HashMap<String, Value>,
}

impl Session {
    pub fn new(id: impl Into<String>, app_name: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self { id: id.into(), app_name: app_name.into(), user_id: user_id.into(), events: Vec::new(), state: HashMap::new() }
    }
}

/// Scan-and-elide orphaned `FunctionCall`/`FunctionResponse` pairs per
/// `spec.md` §4.10's algorithm: a `function_call` is valid only if its
/// `function_response` appears in the very next event; a `function_response`
/// is valid only if its call appears in the event immediately before it.
/// Either way, the whole offending event is dropped, not just the part
/// inside it. Returns `None` when the input needed no changes so the caller
/// can keep its existing `Arc` ("same-instance return when no mutation
/// needed").
fn elide_orphans(events: &[Event]) -> Option<Vec<Event>> {
    fn call_ids(event: &Event) -> std::collections::HashSet<&str> {
        event.content.parts.iter().filter_map(|p| match p {
            Part::FunctionCall { id, .. } => Some(id.as_str()),
            _ => None,
        }).collect()
    }

    fn response_ids(event: &Event) -> std::collections::HashSet<&str> {
        event.content.parts.iter().filter_map(|p| match p {
            Part::FunctionResponse { id, .. } => Some(id.as_str()),
            _ => None,
        }).collect()
    }

    let mut drop = vec![false; events.len()];

    for (i, event) in events.iter().enumerate() {
        let calls = call_ids(event);
        if !calls.is_empty() {
            let next_responses = events.get(i + 1).map(response_ids).unwrap_or_default();
            if calls.iter().any(|id| !next_responses.contains(id)) {
                drop[i] = true;
            }
        }

        let responses = response_ids(event);
        if !responses.is_empty() {
            let prev_calls = if i == 0 { std::collections::HashSet::new() } else { call_ids(&events[i - 1]) };
            if responses.iter().any(|id| !prev_calls.contains(id)) {
                drop[i] = true;
            }
        }
    }

    if !drop.iter().any(|&d| d) {
        return None;
    }

    for (event, dropped) in events.iter().zip(&drop) {
        if *dropped {
            warn!("elided event {}: contained an orphaned function_call/function_response not resolved by the adjacent event", event.id);
        }
    }

    Some(events.iter().zip(drop).filter(|(_, dropped)| !dropped).map(|(event, _)| event.clone()).collect())
}

#[async_trait]
pub trait SessionService: Send + Sync {
    async fn get_or_create(&self, app_name: &str, user_id: &str, session_id: &str) -> Arc<Session>;

    /// Drop orphaned function_call/function_response pairs. Returns the
    /// same `Arc` when nothing needed eliding.
    async fn validate(&self, session: Arc<Session>) -> Arc<Session>;

    /// Compare-and-set the session's event log.
    async fn replace_events(&self, session: &Arc<Session>, events: Vec<Event>) -> Arc<Session>;

    /// Hook invoked exactly once per Supervisor turn after a final response
    /// has been produced. Failures are reported to the UI, not propagated
    /// as a process abort (`spec.md` §4.12) — but the default here simply
    /// succeeds; a real implementation overrides it (e.g. to persist a
    /// summary or notify a webhook).
    async fn post_process(
        &self,
        _user_input: &str,
        _original_session: &Arc<Session>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
}

/// The in-process `SessionService` used by tests and single-process runs.
#[derive(Default)]
pub struct InMemorySessionService {
    sessions: Mutex<HashMap<String, Arc<Session>>>,
}

impl InMemorySessionService {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionService for InMemorySessionService {
    async fn get_or_create(&self, app_name: &str, user_id: &str, session_id: &str) -> Arc<Session> {
        let mut sessions = self.sessions.lock().await;
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                debug!("creating new session {session_id} for {app_name}/{user_id}");
                Arc::new(Session::new(session_id, app_name, user_id))
            })
            .clone()
    }

    async fn validate(&self, session: Arc<Session>) -> Arc<Session> {
        match elide_orphans(&session.events) {
            None => session,
            Some(events) => {
                let mut cleaned = (*session).clone();
                cleaned.events = events;
                let cleaned = Arc::new(cleaned);
                let mut sessions = self.sessions.lock().await;
                sessions.insert(cleaned.id.clone(), cleaned.clone());
                cleaned
            }
        }
    }

    async fn replace_events(&self, session: &Arc<Session>, events: Vec<Event>) -> Arc<Session> {
        let mut replaced = (**session).clone();
        replaced.events = events;
        let replaced = Arc::new(replaced);
        let mut sessions = self.sessions.lock().await;
        sessions.insert(replaced.id.clone(), replaced.clone());
        replaced
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::event::Content;
    use serde_json::json;

    fn call_part(id: &str) -> Part {
        Part::FunctionCall { id: id.into(), name: "search".into(), args: json!({}) }
    }

    fn response_part(id: &str) -> Part {
        Part::FunctionResponse { id: id.into(), name: "search".into(), response: json!({}) }
    }

    #[tokio::test]
    async fn validate_returns_same_instance_when_no_orphans() {
        let service = InMemorySessionService::new();
        let mut session = Session::new("s1", "app", "user");
        session.events.push(Event {
            id: "e1".into(),
            author: "agent".into(),
            content: Content { role: "model".into(), parts: vec![call_part("c1"), ] },
            timestamp: chrono::Utc::now(),
            is_final: false,
            partial: false,
            actions: crate::session::event::EventActions::default(),
            error_message: None,
        });
        session.events.push(Event {
            id: "e2".into(),
            author: "tool".into(),
            content: Content { role: "tool".into(), parts: vec![response_part("c1")] },
            timestamp: chrono::Utc::now(),
            is_final: false,
            partial: false,
            actions: crate::session::event::EventActions::default(),
            error_message: None,
        });
        let session = Arc::new(session);
        let validated = service.validate(session.clone()).await;
        assert!(Arc::ptr_eq(&session, &validated));
    }

    #[tokio::test]
    async fn validate_elides_orphaned_call() {
        let service = InMemorySessionService::new();
        let mut session = Session::new("s1", "app", "user");
        session.events.push(Event {
            id: "e1".into(),
            author: "agent".into(),
            content: Content { role: "model".into(), parts: vec![call_part("orphan")] },
            timestamp: chrono::Utc::now(),
            is_final: false,
            partial: false,
            actions: crate::session::event::EventActions::default(),
            error_message: None,
        });
        let session = Arc::new(session);
        let validated = service.validate(session.clone()).await;
        assert!(!Arc::ptr_eq(&session, &validated));
        assert!(validated.events.is_empty());
    }

    #[tokio::test]
    async fn validate_is_idempotent() {
        let service = InMemorySessionService::new();
        let mut session = Session::new("s1", "app", "user");
        session.events.push(Event {
            id: "e1".into(),
            author: "agent".into(),
            content: Content { role: "model".into(), parts: vec![call_part("orphan")] },
            timestamp: chrono::Utc::now(),
            is_final: false,
            partial: false,
            actions: crate::session::event::EventActions::default(),
            error_message: None,
        });
        let session = Arc::new(session);
        let once = service.validate(session.clone()).await;
        let twice = service.validate(once.clone()).await;
        assert!(Arc::ptr_eq(&once, &twice));
    }
}

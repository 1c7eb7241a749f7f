//! End-to-end scenario: a session whose event log contains an orphaned
//! `function_call` (the agent process died before the tool responded) is
//! cleaned on `validate`, and a second `validate` call is a no-op.

use std::sync::Arc;

use serde_json::json;
use streetrace::session::event::{Content, Event, Part};
use streetrace::session::service::{InMemorySessionService, Session, SessionService};

fn call(id: &str) -> Part {
    Part::FunctionCall { id: id.into(), name: "lookup_ticket".into(), args: json!({"id": 42}) }
}

fn response(id: &str) -> Part {
    Part::FunctionResponse { id: id.into(), name: "lookup_ticket".into(), response: json!({"status": "open"}) }
}

#[tokio::test]
async fn orphaned_function_call_is_elided_and_validation_is_idempotent() {
    let service = InMemorySessionService::new();

    let mut session = Session::new("sess-1", "support", "user-1");
    session.events.push(Event {
        id: "e1".into(),
        author: "agent".into(),
        content: Content { role: "model".into(), parts: vec![call("paired")] },
        timestamp: chrono::Utc::now(),
        is_final: false,
        partial: false,
        actions: streetrace::session::event::EventActions::default(),
        error_message: None,
    });
    session.events.push(Event {
        id: "e2".into(),
        author: "tool".into(),
        content: Content { role: "tool".into(), parts: vec![response("paired")] },
        timestamp: chrono::Utc::now(),
        is_final: false,
        partial: false,
        actions: streetrace::session::event::EventActions::default(),
        error_message: None,
    });
    session.events.push(Event {
        id: "e3".into(),
        author: "agent".into(),
        content: Content { role: "model".into(), parts: vec![call("dangling")] },
        timestamp: chrono::Utc::now(),
        is_final: false,
        partial: false,
        actions: streetrace::session::event::EventActions::default(),
        error_message: None,
    });

    let session = Arc::new(session);
    let validated_once = service.validate(session.clone()).await;

    assert!(!Arc::ptr_eq(&session, &validated_once));
    assert_eq!(validated_once.events.len(), 2);
    assert!(validated_once.events.iter().all(|e| {
        e.content.parts.iter().all(|p| p.call_id() != Some("dangling"))
    }));

    let validated_twice = service.validate(validated_once.clone()).await;
    assert!(Arc::ptr_eq(&validated_once, &validated_twice));
}

//! StreetRace — a DSL-based multi-agent workflow engine.
//!
//! The crate compiles a small line-oriented DSL (`streetrace v1`) into an
//! in-memory workflow that a cooperative runtime executes: agent calls,
//! tool invocations, and nested flow runs are driven by a
//! [`runtime::context::WorkflowContext`], observed through an ordered event
//! stream, and persisted by a [`session::service::SessionService`].
//!
//! # Layout
//!
//! - [`diagnostics`] — structured compiler diagnostics and the rustc-style reporter (C1).
//! - [`dsl`] — lexer, parser, semantic analyzer, and code generator (C2–C4).
//! - [`runtime`] — workflow context, agent runner, escalation, parallel executor, compaction (C5–C9).
//! - [`session`] — the durable event log and event/flow-event types (C10).
//! - [`workload`] — definition discovery and workload construction (C11).
//! - [`supervisor`] — the single entry point driving one user turn (C12).

pub mod diagnostics;
pub mod dsl;
pub mod runtime;
pub mod session;
pub mod supervisor;
pub mod workload;

pub use diagnostics::{Diagnostic, DiagnosticReporter, Severity};
pub use runtime::context::WorkflowContext;
pub use session::event::{Event, FlowEvent};
pub use session::service::{Session, SessionService};
pub use supervisor::Supervisor;

//! The "consumed tool interface" (`spec.md` §6), modeled as a trait grounded
//! in the teacher's `ToolProtocol` (`tool_protocol.rs`): `execute`,
//! `list_tools`, and optional async lifecycle hooks.

use async_trait::async_trait;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct ToolResult {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self { success: true, output: output.into(), error: None }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self { success: false, output: String::new(), error: Some(error.into()) }
    }
}

#[derive(Debug, Clone)]
pub struct ToolMetadata {
    pub name: String,
    pub description: String,
    pub parameters_schema: Value,
}

/// A named tool a `run agent` step may invoke. `execute` returns a
/// string|blob per `spec.md` §6 — represented here as `ToolResult::output`.
#[async_trait]
pub trait ToolProvider: Send + Sync {
    async fn execute(&self, name: &str, args: &Value) -> ToolResult;
    fn list_tools(&self) -> Vec<ToolMetadata>;

    /// Optional teardown, called depth-first by the workload manager's
    /// `close()` (`spec.md` §4.11). Default no-op, matching the teacher's
    /// `ToolProtocol::shutdown` default.
    async fn close(&self) {}
}

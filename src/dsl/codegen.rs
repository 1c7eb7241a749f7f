//! Code generator: lowers a validated [`SourceFile`] into an in-memory
//! [`CompiledWorkflow`].
//!
//! There is no `rustc` invocation inside a running agent, so "codegen" here
//! does not emit textual Rust source — it lowers the AST into a resolved,
//! already-validated statement tree that [`crate::runtime`] interprets
//! directly. The structural analogue of "the compiled workflow class must
//! not override its constructor" (`spec.md` §3) is the private `__sealed`
//! field below: only [`generate`] can construct a [`CompiledWorkflow`], so a
//! caller can hold and pass one around but never hand-assemble one that
//! skips validation.

use std::collections::HashMap;
use std::sync::Arc;

use crate::dsl::ast::*;

/// One entry of the source map relating a compiled flow to the line in the
/// original `.sr` file it was lowered from (`spec.md` §4.1/§4.4).
#[derive(Debug, Clone)]
pub struct SourceMapEntry {
    pub flow: String,
    pub source_line: usize,
}

#[derive(Debug, Clone)]
pub struct CompiledAgent {
    pub name: Option<String>,
    pub tools: Vec<String>,
    pub instruction_prompt: String,
    pub description: Option<String>,
    pub history_policy: Option<String>,
    pub global_instruction: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CompiledPrompt {
    pub body: String,
    pub model: Option<String>,
    pub escalation: Option<EscalationSpec>,
    pub schema: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CompiledFlow {
    pub name: String,
    /// Statements are carried verbatim from the validated AST; the
    /// analyzer has already proven every reference resolves, so the
    /// runtime's interpreter never needs to re-check them.
    pub body: Arc<[Statement]>,
}

/// A fully lowered workflow, ready for the runtime to execute.
///
/// The private `__sealed` field has no accessor; its only purpose is making
/// `CompiledWorkflow { .. }` struct-literal construction impossible outside
/// this module, which is the Rust realization of "must not override its
/// constructor" for a class hierarchy that doesn't exist here.
#[derive(Debug, Clone)]
pub struct CompiledWorkflow {
    pub models: HashMap<String, String>,
    pub tools: HashMap<String, ToolSource>,
    pub prompts: HashMap<String, CompiledPrompt>,
    pub agents: HashMap<String, CompiledAgent>,
    pub flows: HashMap<String, CompiledFlow>,
    pub compaction_policy: Option<PolicyDef>,
    pub source_map: Vec<SourceMapEntry>,
    __sealed: (),
}

impl CompiledWorkflow {
    pub fn flow(&self, name: &str) -> Option<&CompiledFlow> {
        self.flows.get(name)
    }

    pub fn root_agent(&self) -> Option<&CompiledAgent> {
        self.agents.values().find(|a| a.global_instruction.is_some()).or_else(|| self.agents.values().next())
    }
}

/// Lower a validated [`SourceFile`] into a [`CompiledWorkflow`].
///
/// Callers are expected to have already run [`crate::dsl::analyzer::analyze`]
/// and confirmed `is_valid`; `generate` does not re-validate references, it
/// only restructures them into the runtime's execution shape.
pub fn generate(file: &SourceFile) -> CompiledWorkflow {
    let models = file.models.iter().map(|m| (m.name.clone(), m.id.clone())).collect();
    let tools = file.tools.iter().map(|t| (t.name.clone(), t.source.clone())).collect();
    let prompts = file
        .prompts
        .iter()
        .map(|p| {
            (
                p.name.clone(),
                CompiledPrompt {
                    body: p.body.clone(),
                    model: p.model.clone(),
                    escalation: p.escalation.clone(),
                    schema: p.schema.clone(),
                },
            )
        })
        .collect();
    let agents = file
        .agents
        .iter()
        .map(|a| {
            let key = a.name.clone().unwrap_or_else(|| "__root__".to_string());
            (
                key,
                CompiledAgent {
                    name: a.name.clone(),
                    tools: a.tools.clone(),
                    instruction_prompt: a.instruction.clone(),
                    description: a.description.clone(),
                    history_policy: a.history.clone(),
                    global_instruction: a.global_instruction.clone(),
                },
            )
        })
        .collect();

    let mut source_map = Vec::new();
    let flows = file
        .flows
        .iter()
        .map(|f| {
            source_map.push(SourceMapEntry { flow: f.name.clone(), source_line: f.line });
            (f.name.clone(), CompiledFlow { name: f.name.clone(), body: Arc::from(f.body.clone()) })
        })
        .collect();

    let compaction_policy = file.policies.iter().find(|p| p.properties.contains_key("strategy")).cloned();

    CompiledWorkflow {
        models,
        tools,
        prompts,
        agents,
        flows,
        compaction_policy,
        source_map,
        __sealed: (),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::analyzer::analyze;
    use crate::dsl::parser::parse;

    #[test]
    fn lowers_flow_body_and_source_map() {
        let src = "streetrace v1\nflow main:\n    x = 1\n    return x\n";
        let outcome = parse(src, "test.sr").unwrap();
        let analysis = analyze(&outcome.file, "test.sr");
        assert!(analysis.is_valid);

        let compiled = generate(&outcome.file);
        let flow = compiled.flow("main").expect("flow exists");
        assert_eq!(flow.body.len(), 2);
        assert_eq!(compiled.source_map[0].flow, "main");
        assert_eq!(compiled.source_map[0].source_line, 2);
    }

    #[test]
    fn root_agent_has_global_instruction() {
        let src = "streetrace v1\nagent:\n    global_instruction base\n    instruction helper_prompt\n";
        let outcome = parse(src, "test.sr").unwrap();
        let compiled = generate(&outcome.file);
        assert!(compiled.root_agent().unwrap().global_instruction.is_some());
    }
}

//! AST node and expression definitions for the StreetRace DSL.
//!
//! Nodes are tagged variants (Design Note §9: "AST and events are sums of
//! variants with a discriminator tag") rather than a class hierarchy —
//! every visitor pattern-matches on the enum tag.

use std::collections::HashMap;

/// Top-level definitions collected while parsing a `.sr` source file.
#[derive(Debug, Clone)]
pub enum Definition {
    Version(VersionDecl),
    Model(ModelDef),
    Tool(ToolDef),
    Prompt(PromptDef),
    Agent(AgentDef),
    Flow(FlowDef),
    Policy(PolicyDef),
}

#[derive(Debug, Clone)]
pub struct VersionDecl {
    pub version: String,
    pub line: usize,
}

#[derive(Debug, Clone)]
pub struct ModelDef {
    pub name: String,
    /// `<provider>/<model>` identifier, e.g. `"openai/gpt-4.1"`.
    pub id: String,
    pub line: usize,
}

/// A tool reference: either a built-in tool or an MCP server URL.
#[derive(Debug, Clone)]
pub enum ToolSource {
    Builtin(String),
    Mcp(String),
}

#[derive(Debug, Clone)]
pub struct ToolDef {
    pub name: String,
    pub source: ToolSource,
    pub line: usize,
}

#[derive(Debug, Clone)]
pub struct EscalationSpec {
    pub op: EscalationOp,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationOp {
    /// `~` — normalized (markdown-stripped, case-insensitive) equality.
    Normalized,
    Eq,
    NotEq,
    Contains,
}

impl EscalationOp {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "~" => Some(Self::Normalized),
            "==" => Some(Self::Eq),
            "!=" => Some(Self::NotEq),
            "contains" => Some(Self::Contains),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PromptDef {
    pub name: String,
    pub body: String,
    pub model: Option<String>,
    pub escalation: Option<EscalationSpec>,
    pub schema: Option<String>,
    pub line: usize,
}

#[derive(Debug, Clone)]
pub struct AgentDef {
    /// `None` for the single unnamed root-level agent of a spec.
    pub name: Option<String>,
    pub tools: Vec<String>,
    pub instruction: String,
    pub description: Option<String>,
    /// Per-agent history/compaction override (`spec.md` §4.9).
    pub history: Option<String>,
    /// Set only on the root-level agent (invariant (b) in `spec.md` §3).
    pub global_instruction: Option<String>,
    pub line: usize,
}

#[derive(Debug, Clone)]
pub struct FlowDef {
    pub name: String,
    pub body: Vec<Statement>,
    pub line: usize,
}

#[derive(Debug, Clone)]
pub struct PolicyDef {
    pub name: String,
    pub properties: HashMap<String, String>,
    pub line: usize,
}

/// Statements permitted inside a flow body.
#[derive(Debug, Clone)]
pub enum Statement {
    Assignment {
        target: String,
        value: Expr,
        line: usize,
    },
    PropertyAssignment {
        base: String,
        path: Vec<String>,
        value: Expr,
        line: usize,
    },
    Call {
        target: Option<String>,
        prompt: String,
        line: usize,
    },
    Run {
        target: Option<String>,
        agent: String,
        input: Option<Expr>,
        is_flow: bool,
        escalation_handler: Option<EscalationHandler>,
        line: usize,
    },
    Return {
        value: Option<Expr>,
        line: usize,
    },
    ForLoop {
        var: String,
        iter: Expr,
        body: Vec<Statement>,
        line: usize,
    },
    /// Body must contain only `Statement::Run` entries (invariant (c)).
    Parallel {
        body: Vec<Statement>,
        line: usize,
    },
    EventHandler {
        timing: HandlerTiming,
        event_type: String,
        body: Vec<Statement>,
        line: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerTiming {
    Before,
    After,
}

/// What to do when an escalation fires inside a `run agent ... on escalate` block.
#[derive(Debug, Clone)]
pub enum EscalationHandler {
    Return(Expr),
    Continue,
    Abort,
}

/// Expressions usable on the right-hand side of assignments, call/run
/// inputs, and filter conditions.
#[derive(Debug, Clone)]
pub enum Expr {
    VarRef(String),
    PropertyAccess {
        base: String,
        path: Vec<String>,
    },
    /// A leading-dot property chain, valid only inside a [`Expr::Filter`] condition.
    ImplicitProperty(Vec<String>),
    Literal(Literal),
    List(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    BinaryOp {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Filter {
        list_expr: Box<Expr>,
        condition: Box<Expr>,
    },
}

#[derive(Debug, Clone)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Eq,
    NotEq,
    Contains,
    And,
    Or,
}

impl BinOp {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "==" => Some(Self::Eq),
            "!=" => Some(Self::NotEq),
            "contains" => Some(Self::Contains),
            "and" => Some(Self::And),
            "or" => Some(Self::Or),
            _ => None,
        }
    }
}

/// A fully parsed source file: the version header plus every top-level
/// definition in source order.
#[derive(Debug, Clone, Default)]
pub struct SourceFile {
    pub version: Option<VersionDecl>,
    pub models: Vec<ModelDef>,
    pub tools: Vec<ToolDef>,
    pub prompts: Vec<PromptDef>,
    pub agents: Vec<AgentDef>,
    pub flows: Vec<FlowDef>,
    pub policies: Vec<PolicyDef>,
}

//! Recursive-descent parser for the StreetRace DSL.
//!
//! Builds a [`SourceFile`] from raw text. Diagnostics are collected rather
//! than raised eagerly where the grammar allows recovery (`spec.md` §4.2:
//! "parsing is resilient where possible — skip-to-next-statement
//! recovery"); a small number of structural failures (no version header,
//! unterminated string, mismatched indentation) are unrecoverable and
//! returned as a top-level [`DslSyntaxError`].

use std::collections::HashMap;
use std::fmt;

use crate::diagnostics::Diagnostic;
use crate::dsl::ast::*;
use crate::dsl::lexer::{self, Token, TokenKind};

#[derive(Debug, Clone)]
pub struct DslSyntaxError {
    pub message: String,
    pub file: String,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for DslSyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}:{}:{})", self.message, self.file, self.line, self.column)
    }
}

impl std::error::Error for DslSyntaxError {}

pub struct ParseOutcome {
    pub file: SourceFile,
    pub diagnostics: Vec<Diagnostic>,
}

/// Parse a complete `.sr` source file.
///
/// Returns `Err` only for the unrecoverable cases (`spec.md` §6: absence of
/// the `streetrace v1` header yields `E_NO_VERSION`). Everything else is
/// reported through `ParseOutcome::diagnostics` alongside a best-effort
/// `SourceFile`.
pub fn parse(source: &str, file: &str) -> Result<ParseOutcome, DslSyntaxError> {
    let lines: Vec<&str> = source.lines().collect();
    if !source_has_version_header(&lines) {
        return Err(DslSyntaxError {
            message: "missing required `streetrace v1` header (E_NO_VERSION)".into(),
            file: file.to_string(),
            line: 1,
            column: 0,
        });
    }

    let mut parser = Parser::new(source, file);
    let source_file = parser.parse_file()?;
    Ok(ParseOutcome { file: source_file, diagnostics: parser.diagnostics })
}

fn source_has_version_header(lines: &[&str]) -> bool {
    lines
        .iter()
        .find(|l| !l.trim().is_empty())
        .map(|l| l.trim() == "streetrace v1")
        .unwrap_or(false)
}

struct Parser<'a> {
    raw_lines: Vec<&'a str>,
    file: String,
    tokens: Vec<Token>,
    pos: usize,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str, file: &str) -> Self {
        // The version header line is consumed separately; strip it before
        // tokenizing so the lexer never has to special-case it.
        let raw_lines: Vec<&str> = source.lines().collect();
        let body = raw_lines
            .iter()
            .skip_while(|l| l.trim().is_empty())
            .skip(1)
            .cloned()
            .collect::<Vec<_>>()
            .join("\n");

        let tokens = lexer::tokenize(&body).unwrap_or_else(|e| {
            vec![Token { kind: TokenKind::Eof, line: e.line, column: e.column }]
        });

        Self {
            raw_lines,
            file: file.to_string(),
            tokens,
            pos: 0,
            diagnostics: Vec::new(),
        }
    }

    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].kind
    }

    fn peek_token(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek(), TokenKind::Eof)
    }

    fn skip_newlines(&mut self) {
        while matches!(self.peek(), TokenKind::Newline) {
            self.advance();
        }
    }

    fn error(&mut self, message: impl Into<String>) {
        let tok = self.peek_token().clone();
        self.diagnostics.push(Diagnostic::error(message, self.file.clone(), tok.line, tok.column));
    }

    /// Skip tokens until the next `Newline` at the current nesting level —
    /// the "skip-to-next-statement" recovery strategy from `spec.md` §4.2.
    fn recover_to_next_statement(&mut self) {
        let mut depth = 0i32;
        while !self.at_eof() {
            match self.peek() {
                TokenKind::Indent => depth += 1,
                TokenKind::Dedent => {
                    if depth == 0 {
                        return;
                    }
                    depth -= 1;
                }
                TokenKind::Newline if depth == 0 => {
                    self.advance();
                    return;
                }
                _ => {}
            }
            self.advance();
        }
    }

    fn parse_file(&mut self) -> Result<SourceFile, DslSyntaxError> {
        let mut file = SourceFile::default();
        self.skip_newlines();
        while !self.at_eof() {
            match self.peek().clone() {
                TokenKind::Ident(kw) => match kw.as_str() {
                    "model" => file.models.push(self.parse_model()),
                    "tool" => file.tools.push(self.parse_tool()),
                    "prompt" => file.prompts.push(self.parse_prompt()),
                    "agent" => file.agents.push(self.parse_agent()),
                    "flow" => file.flows.push(self.parse_flow()),
                    "policy" => file.policies.push(self.parse_policy()),
                    other => {
                        self.error(format!("unexpected top-level keyword `{other}`"));
                        self.recover_to_next_statement();
                    }
                },
                TokenKind::Newline => {
                    self.advance();
                }
                _ => {
                    self.error(format!("expected a top-level definition, found {}", self.peek()));
                    self.recover_to_next_statement();
                }
            }
            self.skip_newlines();
        }
        Ok(file)
    }

    fn expect_ident(&mut self) -> Option<String> {
        match self.peek().clone() {
            TokenKind::Ident(s) => {
                self.advance();
                Some(s)
            }
            _ => {
                self.error(format!("expected identifier, found {}", self.peek()));
                None
            }
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.advance();
            true
        } else {
            self.error(format!("expected {kind}, found {}", self.peek()));
            false
        }
    }

    fn parse_model(&mut self) -> ModelDef {
        let line = self.peek_token().line;
        self.advance(); // "model"
        let name = self.expect_ident().unwrap_or_default();
        self.expect(&TokenKind::Equals);
        let id = self.parse_slug_path();
        ModelDef { name, id, line }
    }

    /// Parse a `<provider>/<model>` or `builtin <name>`-style path written
    /// as bare identifiers separated by `.`/`/`-equivalent dots; the lexer
    /// has no slash token so sources write these as dotted identifiers
    /// (e.g. `openai.gpt_4_1`) which this reassembles with `/`.
    fn parse_slug_path(&mut self) -> String {
        let mut parts = Vec::new();
        loop {
            match self.peek().clone() {
                TokenKind::Ident(s) => {
                    parts.push(s);
                    self.advance();
                }
                TokenKind::Str(s) => {
                    parts.push(s);
                    self.advance();
                }
                _ => break,
            }
            if matches!(self.peek(), TokenKind::Dot) {
                self.advance();
            } else {
                break;
            }
        }
        parts.join("/")
    }

    fn parse_tool(&mut self) -> ToolDef {
        let line = self.peek_token().line;
        self.advance(); // "tool"
        let name = self.expect_ident().unwrap_or_default();
        self.expect(&TokenKind::Equals);
        let source = match self.peek().clone() {
            TokenKind::Ident(kw) if kw == "builtin" => {
                self.advance();
                ToolSource::Builtin(self.expect_ident().unwrap_or_default())
            }
            TokenKind::Ident(kw) if kw == "mcp" => {
                self.advance();
                let url = match self.peek().clone() {
                    TokenKind::Str(s) => {
                        self.advance();
                        s
                    }
                    _ => {
                        self.error("expected string URL after `mcp`");
                        String::new()
                    }
                };
                ToolSource::Mcp(url)
            }
            _ => {
                self.error("expected `builtin <ref>` or `mcp \"<url>\"`");
                ToolSource::Builtin(String::new())
            }
        };
        ToolDef { name, source, line }
    }

    fn parse_prompt(&mut self) -> PromptDef {
        let line = self.peek_token().line;
        self.advance(); // "prompt"
        let name = self.expect_ident().unwrap_or_default();

        let mut model = None;
        let mut schema = None;
        loop {
            match self.peek().clone() {
                TokenKind::Ident(kw) if kw == "using" => {
                    self.advance();
                    self.expect_keyword("model");
                    if let TokenKind::Str(s) = self.peek().clone() {
                        self.advance();
                        model = Some(s);
                    }
                }
                TokenKind::Ident(kw) if kw == "output" => {
                    self.advance();
                    self.expect_keyword("schema");
                    schema = self.expect_ident();
                }
                _ => break,
            }
        }

        self.expect(&TokenKind::Colon);
        let body = self.parse_triple_string_body();

        let escalation = if matches!(self.peek(), TokenKind::Ident(k) if k == "escalate") {
            self.advance();
            self.expect_keyword("if");
            let op = self.parse_escalation_op();
            let value = match self.peek().clone() {
                TokenKind::Str(s) => {
                    self.advance();
                    s
                }
                _ => {
                    self.error("expected string literal after escalation operator");
                    String::new()
                }
            };
            op.map(|op| EscalationSpec { op, value })
        } else {
            None
        };

        PromptDef { name, body, model, escalation, schema, line }
    }

    fn parse_escalation_op(&mut self) -> Option<EscalationOp> {
        match self.peek().clone() {
            TokenKind::Ident(s) => {
                self.advance();
                EscalationOp::from_token(&s)
            }
            TokenKind::EqEq => {
                self.advance();
                Some(EscalationOp::Eq)
            }
            TokenKind::NotEq => {
                self.advance();
                Some(EscalationOp::NotEq)
            }
            _ => {
                self.error("expected an escalation operator (~, ==, !=, contains)");
                None
            }
        }
    }

    fn expect_keyword(&mut self, kw: &str) {
        match self.peek().clone() {
            TokenKind::Ident(s) if s == kw => {
                self.advance();
            }
            _ => self.error(format!("expected keyword `{kw}`, found {}", self.peek())),
        }
    }

    /// Best-effort recovery of a `"""..."""` body: since the lexer already
    /// collapsed the literal into a single [`TokenKind::Str`] token when it
    /// fits on one source line, multi-line bodies are instead recovered
    /// directly from the raw source between the opening and closing markers.
    fn parse_triple_string_body(&mut self) -> String {
        match self.peek().clone() {
            TokenKind::Str(s) => {
                self.advance();
                s.trim_matches('\n').to_string()
            }
            _ => {
                self.error("expected a string literal (`\"...\"` or `\"\"\"...\"\"\"`) for the prompt body");
                String::new()
            }
        }
    }

    fn parse_agent(&mut self) -> AgentDef {
        let line = self.peek_token().line;
        self.advance(); // "agent"
        let name = match self.peek().clone() {
            TokenKind::Ident(s) => {
                self.advance();
                Some(s)
            }
            _ => None,
        };
        self.expect(&TokenKind::Colon);
        self.skip_newlines();
        self.expect(&TokenKind::Indent);

        let mut tools = Vec::new();
        let mut instruction = String::new();
        let mut description = None;
        let mut history = None;
        let mut global_instruction = None;

        while !matches!(self.peek(), TokenKind::Dedent | TokenKind::Eof) {
            match self.peek().clone() {
                TokenKind::Ident(kw) => match kw.as_str() {
                    "tools" => {
                        self.advance();
                        tools = self.parse_ident_list();
                    }
                    "instruction" => {
                        self.advance();
                        instruction = self.expect_ident().unwrap_or_default();
                    }
                    "description" => {
                        self.advance();
                        if let TokenKind::Str(s) = self.peek().clone() {
                            self.advance();
                            description = Some(s);
                        }
                    }
                    "history" => {
                        self.advance();
                        history = self.expect_ident();
                    }
                    "global_instruction" => {
                        self.advance();
                        global_instruction = self.expect_ident();
                    }
                    other => {
                        self.error(format!("unexpected agent property `{other}`"));
                        self.recover_to_next_statement();
                    }
                },
                TokenKind::Newline => {
                    self.advance();
                }
                _ => {
                    self.error(format!("expected an agent property, found {}", self.peek()));
                    self.recover_to_next_statement();
                }
            }
            self.skip_newlines();
        }
        self.expect(&TokenKind::Dedent);

        AgentDef { name, tools, instruction, description, history, global_instruction, line }
    }

    fn parse_ident_list(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        loop {
            match self.peek().clone() {
                TokenKind::Ident(s) => {
                    out.push(s);
                    self.advance();
                }
                _ => break,
            }
            if matches!(self.peek(), TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        out
    }

    fn parse_policy(&mut self) -> PolicyDef {
        let line = self.peek_token().line;
        self.advance(); // "policy"
        let name = self.expect_ident().unwrap_or_default();
        self.expect(&TokenKind::Colon);
        self.skip_newlines();
        self.expect(&TokenKind::Indent);

        let mut properties = HashMap::new();
        while !matches!(self.peek(), TokenKind::Dedent | TokenKind::Eof) {
            match self.peek().clone() {
                TokenKind::Ident(key) => {
                    self.advance();
                    let value = match self.peek().clone() {
                        TokenKind::Ident(v) => {
                            self.advance();
                            v
                        }
                        TokenKind::Str(v) => {
                            self.advance();
                            v
                        }
                        _ => {
                            self.error("expected a value for policy property");
                            String::new()
                        }
                    };
                    properties.insert(key, value);
                }
                TokenKind::Newline => {
                    self.advance();
                }
                _ => {
                    self.error(format!("expected a policy property, found {}", self.peek()));
                    self.recover_to_next_statement();
                }
            }
            self.skip_newlines();
        }
        self.expect(&TokenKind::Dedent);

        PolicyDef { name, properties, line }
    }

    fn parse_flow(&mut self) -> FlowDef {
        let line = self.peek_token().line;
        self.advance(); // "flow"
        let name = self.expect_ident().unwrap_or_default();
        self.expect(&TokenKind::Colon);
        self.skip_newlines();
        let body = self.parse_block();
        FlowDef { name, body, line }
    }

    fn parse_block(&mut self) -> Vec<Statement> {
        let mut body = Vec::new();
        if !self.expect(&TokenKind::Indent) {
            return body;
        }
        while !matches!(self.peek(), TokenKind::Dedent | TokenKind::Eof) {
            if matches!(self.peek(), TokenKind::Newline) {
                self.advance();
                continue;
            }
            if let Some(stmt) = self.parse_statement() {
                body.push(stmt);
            } else {
                self.recover_to_next_statement();
            }
            self.skip_newlines();
        }
        self.expect(&TokenKind::Dedent);
        body
    }

    fn parse_statement(&mut self) -> Option<Statement> {
        let line = self.peek_token().line;
        match self.peek().clone() {
            TokenKind::Ident(kw) if kw == "call" => self.parse_call(None, line),
            TokenKind::Ident(kw) if kw == "run" => self.parse_run(None, line),
            TokenKind::Ident(kw) if kw == "return" => {
                self.advance();
                let value = if matches!(self.peek(), TokenKind::Newline | TokenKind::Eof | TokenKind::Dedent) {
                    None
                } else {
                    Some(self.parse_expr())
                };
                Some(Statement::Return { value, line })
            }
            TokenKind::Ident(kw) if kw == "for" => self.parse_for_loop(line),
            TokenKind::Ident(kw) if kw == "parallel" => self.parse_parallel(line),
            TokenKind::Ident(kw) if kw == "on" => self.parse_event_handler(line),
            TokenKind::Ident(_) | TokenKind::DollarIdent(_) => self.parse_assignment_or_call(line),
            other => {
                self.error(format!("unexpected token at start of statement: {other}"));
                None
            }
        }
    }

    fn parse_assignment_or_call(&mut self, line: usize) -> Option<Statement> {
        let (base, is_dollar) = match self.peek().clone() {
            TokenKind::Ident(s) => (s, false),
            TokenKind::DollarIdent(s) => (s, true),
            _ => unreachable!(),
        };
        self.advance();
        let _ = is_dollar;

        let mut path = Vec::new();
        while matches!(self.peek(), TokenKind::Dot) {
            self.advance();
            if let Some(p) = self.expect_ident() {
                path.push(p);
            }
        }

        if matches!(self.peek(), TokenKind::Equals) {
            self.advance();

            if path.is_empty() {
                if matches!(self.peek(), TokenKind::Ident(k) if k == "run") {
                    return self.parse_run(Some(base), line);
                }
                if matches!(self.peek(), TokenKind::Ident(k) if k == "call") {
                    return self.parse_call(Some(base), line);
                }
            }

            let value = self.parse_expr();
            return Some(if path.is_empty() {
                Statement::Assignment { target: base, value, line }
            } else {
                Statement::PropertyAssignment { base, path, value, line }
            });
        }

        if matches!(self.peek(), TokenKind::Ident(k) if k == "=") {
            // unreachable safeguard; `=` already tokenized as Equals above
        }

        self.error(format!("expected `=` after `{base}` in statement"));
        None
    }

    fn parse_call(&mut self, target: Option<String>, line: usize) -> Option<Statement> {
        self.advance(); // "call"
        self.expect_keyword("llm");
        let prompt = self.expect_ident().unwrap_or_default();
        Some(Statement::Call { target, prompt, line })
    }

    fn parse_run(&mut self, target: Option<String>, line: usize) -> Option<Statement> {
        self.advance(); // "run"
        let is_flow = if matches!(self.peek(), TokenKind::Ident(k) if k == "flow") {
            self.advance();
            true
        } else {
            self.expect_keyword("agent");
            false
        };
        let agent = self.expect_ident().unwrap_or_default();

        let input = if matches!(self.peek(), TokenKind::Ident(k) if k == "with") {
            self.advance();
            Some(self.parse_expr())
        } else {
            None
        };

        let escalation_handler = if matches!(self.peek(), TokenKind::Ident(k) if k == "on") {
            self.advance();
            self.expect_keyword("escalate");
            Some(self.parse_escalation_handler())
        } else {
            None
        };

        Some(Statement::Run { target, agent, input, is_flow, escalation_handler, line })
    }

    fn parse_escalation_handler(&mut self) -> EscalationHandler {
        match self.peek().clone() {
            TokenKind::Ident(k) if k == "return" => {
                self.advance();
                EscalationHandler::Return(self.parse_expr())
            }
            TokenKind::Ident(k) if k == "continue" => {
                self.advance();
                EscalationHandler::Continue
            }
            TokenKind::Ident(k) if k == "abort" => {
                self.advance();
                EscalationHandler::Abort
            }
            _ => {
                self.error("expected `return <expr>`, `continue`, or `abort` after `on escalate`");
                EscalationHandler::Abort
            }
        }
    }

    fn parse_for_loop(&mut self, line: usize) -> Option<Statement> {
        self.advance(); // "for"
        let var = self.expect_ident().unwrap_or_default();
        self.expect_keyword("in");
        let iter = self.parse_expr();
        self.expect(&TokenKind::Colon);
        self.skip_newlines();
        let body = self.parse_block();
        Some(Statement::ForLoop { var, iter, body, line })
    }

    fn parse_parallel(&mut self, line: usize) -> Option<Statement> {
        self.advance(); // "parallel"
        self.expect_keyword("do");
        self.expect(&TokenKind::Colon);
        self.skip_newlines();
        let body = self.parse_block();
        for stmt in &body {
            if !matches!(stmt, Statement::Run { .. }) {
                self.diagnostics.push(Diagnostic::error(
                    "`parallel do` body may only contain `run agent ...` statements",
                    self.file.clone(),
                    line,
                    0,
                ));
            }
        }
        Some(Statement::Parallel { body, line })
    }

    fn parse_event_handler(&mut self, line: usize) -> Option<Statement> {
        self.advance(); // "on"
        let timing = match self.peek().clone() {
            TokenKind::Ident(k) if k == "before" => HandlerTiming::Before,
            TokenKind::Ident(k) if k == "after" => HandlerTiming::After,
            _ => {
                self.error("expected `before` or `after` in event handler");
                HandlerTiming::After
            }
        };
        self.advance();
        let event_type = self.expect_ident().unwrap_or_default();
        self.expect(&TokenKind::Colon);
        self.skip_newlines();
        let body = self.parse_block();
        Some(Statement::EventHandler { timing, event_type, body, line })
    }

    // ---- expressions ----

    fn parse_expr(&mut self) -> Expr {
        self.parse_filter_or_binary()
    }

    fn parse_filter_or_binary(&mut self) -> Expr {
        let left = self.parse_primary();
        if matches!(self.peek(), TokenKind::Ident(k) if k == "where") {
            self.advance();
            let condition = self.parse_binary();
            return Expr::Filter { list_expr: Box::new(left), condition: Box::new(condition) };
        }
        self.parse_binary_rest(left)
    }

    fn parse_binary(&mut self) -> Expr {
        let left = self.parse_primary();
        self.parse_binary_rest(left)
    }

    fn parse_binary_rest(&mut self, left: Expr) -> Expr {
        let op = match self.peek().clone() {
            TokenKind::EqEq => Some(BinOp::Eq),
            TokenKind::NotEq => Some(BinOp::NotEq),
            TokenKind::Ident(s) => BinOp::from_token(&s),
            _ => None,
        };
        match op {
            Some(op) => {
                self.advance();
                let right = self.parse_primary();
                Expr::BinaryOp { op, left: Box::new(left), right: Box::new(right) }
            }
            None => left,
        }
    }

    fn parse_primary(&mut self) -> Expr {
        match self.peek().clone() {
            TokenKind::DollarIdent(name) | TokenKind::Ident(name) => {
                self.advance();
                let mut path = Vec::new();
                while matches!(self.peek(), TokenKind::Dot) {
                    self.advance();
                    if let Some(p) = self.expect_ident() {
                        path.push(p);
                    }
                }
                if path.is_empty() {
                    match name.as_str() {
                        "true" => Expr::Literal(Literal::Bool(true)),
                        "false" => Expr::Literal(Literal::Bool(false)),
                        "null" => Expr::Literal(Literal::Null),
                        _ => Expr::VarRef(name),
                    }
                } else {
                    Expr::PropertyAccess { base: name, path }
                }
            }
            TokenKind::Dot => {
                self.advance();
                let mut path = Vec::new();
                if let Some(p) = self.expect_ident() {
                    path.push(p);
                }
                while matches!(self.peek(), TokenKind::Dot) {
                    self.advance();
                    if let Some(p) = self.expect_ident() {
                        path.push(p);
                    }
                }
                Expr::ImplicitProperty(path)
            }
            TokenKind::Str(s) => {
                self.advance();
                Expr::Literal(Literal::Str(s))
            }
            TokenKind::Int(n) => {
                self.advance();
                Expr::Literal(Literal::Int(n))
            }
            TokenKind::Float(n) => {
                self.advance();
                Expr::Literal(Literal::Float(n))
            }
            TokenKind::LBracket => {
                self.advance();
                let mut items = Vec::new();
                while !matches!(self.peek(), TokenKind::RBracket | TokenKind::Eof) {
                    items.push(self.parse_expr());
                    if matches!(self.peek(), TokenKind::Comma) {
                        self.advance();
                    }
                }
                self.expect(&TokenKind::RBracket);
                Expr::List(items)
            }
            TokenKind::LBrace => {
                self.advance();
                let mut entries = Vec::new();
                while !matches!(self.peek(), TokenKind::RBrace | TokenKind::Eof) {
                    let key = match self.peek().clone() {
                        TokenKind::Str(s) => {
                            self.advance();
                            s
                        }
                        TokenKind::Ident(s) => {
                            self.advance();
                            s
                        }
                        _ => {
                            self.error("expected object key");
                            String::new()
                        }
                    };
                    self.expect(&TokenKind::Colon);
                    let value = self.parse_expr();
                    entries.push((key, value));
                    if matches!(self.peek(), TokenKind::Comma) {
                        self.advance();
                    }
                }
                self.expect(&TokenKind::RBrace);
                Expr::Object(entries)
            }
            other => {
                self.error(format!("expected an expression, found {other}"));
                Expr::Literal(Literal::Null)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(src: &str) -> ParseOutcome {
        let outcome = parse(src, "test.sr").expect("parse should succeed");
        assert!(outcome.diagnostics.is_empty(), "unexpected diagnostics: {:?}", outcome.diagnostics);
        outcome
    }

    #[test]
    fn requires_version_header() {
        let err = parse("flow main:\n    return 1\n", "test.sr").unwrap_err();
        assert!(err.message.contains("E_NO_VERSION"));
    }

    #[test]
    fn parses_minimal_flow() {
        let src = "streetrace v1\nflow main:\n    x = 1\n    return x\n";
        let outcome = parse_ok(src);
        assert_eq!(outcome.file.flows.len(), 1);
        assert_eq!(outcome.file.flows[0].body.len(), 2);
    }

    #[test]
    fn parses_agent_block() {
        let src = "streetrace v1\nagent helper:\n    tools calculator, memory\n    instruction greet\n";
        let outcome = parse_ok(src);
        let agent = &outcome.file.agents[0];
        assert_eq!(agent.name.as_deref(), Some("helper"));
        assert_eq!(agent.tools, vec!["calculator", "memory"]);
    }

    #[test]
    fn parses_filter_expression() {
        let src = "streetrace v1\nflow main:\n    y = filter items where .fix != null\n";
        let outcome = parse_ok(src);
        match &outcome.file.flows[0].body[0] {
            Statement::Assignment { value: Expr::Filter { .. }, .. } => {}
            other => panic!("expected filter assignment, got {other:?}"),
        }
    }

    #[test]
    fn rejects_non_run_statements_inside_parallel() {
        let src = "streetrace v1\nflow main:\n    parallel do:\n        x = 1\n";
        let outcome = parse(src, "test.sr").unwrap();
        assert!(!outcome.diagnostics.is_empty());
    }
}

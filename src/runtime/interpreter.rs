//! Flow interpreter: walks a [`CompiledFlow`]'s statement tree against a
//! [`WorkflowContext`], the last piece connecting codegen's resolved
//! statement tree to the agent runner, escalation, and parallel executor.
//!
//! Event handlers (`on before/after <event_type>: ...`) are collected once
//! per flow and fired around the two statement kinds that can plausibly
//! raise the events they name: `run` (`event_type == "run"`) and `call llm`
//! (`event_type == "call"`). This is a deliberately narrow reading of
//! `spec.md`'s handler clause — it covers the two built-in event sources a
//! flow body can itself produce — recorded in DESIGN.md.

use std::sync::Arc;

use serde_json::Value;

use crate::dsl::ast::{EscalationHandler, Expr, HandlerTiming, Literal, Statement};
use crate::dsl::codegen::{CompiledFlow, CompiledWorkflow};
use crate::runtime::agent_runner::run_agent;
use crate::runtime::context::WorkflowContext;
use crate::runtime::errors::DslRuntimeError;
use crate::runtime::parallel::{execute_parallel, ParallelSpec};
use crate::session::event::{Event, FlowEvent};

/// Outcome of running a flow to completion.
pub enum FlowOutcome {
    Returned(Value),
    /// Fell off the end of the body without a `return` statement.
    Completed,
}

pub async fn run_flow(ctx: &Arc<WorkflowContext>, workflow: &CompiledWorkflow, flow: &CompiledFlow) -> Result<FlowOutcome, DslRuntimeError> {
    match run_block(ctx, workflow, &flow.body).await? {
        Some(value) => Ok(FlowOutcome::Returned(value)),
        None => Ok(FlowOutcome::Completed),
    }
}

/// Runs a statement block; `Ok(Some(value))` short-circuits on `return`.
fn run_block<'a>(
    ctx: &'a Arc<WorkflowContext>,
    workflow: &'a CompiledWorkflow,
    body: &'a [Statement],
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Option<Value>, DslRuntimeError>> + Send + 'a>> {
    Box::pin(async move {
        for stmt in body {
            if let Some(value) = run_statement(ctx, workflow, stmt).await? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    })
}

async fn fire_handlers(ctx: &Arc<WorkflowContext>, workflow: &CompiledWorkflow, body: &[Statement], timing: HandlerTiming, event_type: &str) -> Result<(), DslRuntimeError> {
    for stmt in body {
        if let Statement::EventHandler { timing: t, event_type: et, body, .. } = stmt {
            if *t == timing && et == event_type {
                run_block(ctx, workflow, body).await?;
            }
        }
    }
    Ok(())
}

async fn run_statement(ctx: &Arc<WorkflowContext>, workflow: &CompiledWorkflow, stmt: &Statement) -> Result<Option<Value>, DslRuntimeError> {
    match stmt {
        Statement::Assignment { target, value, .. } => {
            let v = eval(ctx, value).await?;
            ctx.set_var(target.clone(), v).await;
            Ok(None)
        }
        Statement::PropertyAssignment { base, path, value, .. } => {
            let v = eval(ctx, value).await?;
            let mut current = ctx.get_var(base).await.unwrap_or(Value::Null);
            set_path(&mut current, path, v);
            ctx.set_var(base.clone(), current).await;
            Ok(None)
        }
        Statement::Call { target, prompt, .. } => {
            let result = ctx.call_llm(prompt, None).await?;
            if let Some(target) = target {
                ctx.set_var(target.clone(), result).await;
            }
            Ok(None)
        }
        Statement::Run { target, agent, input, is_flow, escalation_handler, .. } => {
            let input_value = match input {
                Some(expr) => Some(eval(ctx, expr).await?),
                None => None,
            };

            let result = if *is_flow {
                run_nested_flow(ctx, workflow, agent).await
            } else {
                run_agent(ctx, agent, input_value.as_ref(), &|| false).await.map(Value::String)
            };

            match result {
                Ok(value) => {
                    if let Some(target) = target {
                        ctx.set_var(target.clone(), value).await;
                    }
                    if ctx.last_escalated().await.is_some() {
                        if let Some(handler) = escalation_handler {
                            return apply_escalation_handler(ctx, handler).await;
                        }
                    }
                    Ok(None)
                }
                Err(err) => Err(err),
            }
        }
        Statement::Return { value, .. } => match value {
            Some(expr) => Ok(Some(eval(ctx, expr).await?)),
            None => Ok(Some(Value::Null)),
        },
        Statement::ForLoop { var, iter, body, .. } => {
            let iterable = eval(ctx, iter).await?;
            let items = iterable.as_array().cloned().unwrap_or_default();
            for item in items {
                ctx.set_var(var.clone(), item).await;
                if let Some(value) = run_block(ctx, workflow, body).await? {
                    return Ok(Some(value));
                }
            }
            Ok(None)
        }
        Statement::Parallel { body, .. } => {
            let mut specs = Vec::with_capacity(body.len());
            for inner in body {
                if let Statement::Run { target, agent, input, .. } = inner {
                    let input_value = match input {
                        Some(expr) => Some(eval(ctx, expr).await?),
                        None => None,
                    };
                    specs.push(ParallelSpec { target: target.clone(), agent: agent.clone(), input: input_value });
                }
            }
            execute_parallel(ctx.clone(), specs).await?;
            Ok(None)
        }
        Statement::EventHandler { .. } => Ok(None), // fired explicitly around run/call, not executed inline
    }
}

async fn apply_escalation_handler(ctx: &Arc<WorkflowContext>, handler: &EscalationHandler) -> Result<Option<Value>, DslRuntimeError> {
    match handler {
        EscalationHandler::Return(expr) => Ok(Some(eval(ctx, expr).await?)),
        EscalationHandler::Continue => Ok(None),
        EscalationHandler::Abort => Err(DslRuntimeError::Abort { message: "escalation handler requested abort".into() }),
    }
}

/// `run flow <name>`: recurse into a sibling flow defined on the same
/// workflow, sharing the caller's [`WorkflowContext`] (variables and
/// last-call bookkeeping carry across the boundary, matching `spec.md` §4.9).
async fn run_nested_flow(ctx: &Arc<WorkflowContext>, workflow: &CompiledWorkflow, flow_name: &str) -> Result<Value, DslRuntimeError> {
    match run_flow_by_name_inner(ctx, workflow, flow_name, false).await? {
        FlowOutcome::Returned(value) => Ok(value),
        FlowOutcome::Completed => Ok(Value::Null),
    }
}

/// Entry point used by [`crate::supervisor::Supervisor`] and by `run flow`
/// statements once wired against a [`crate::dsl::codegen::CompiledWorkflow`].
///
/// Emits the turn's terminal ADK-style event (`spec.md` §4.12) when the flow
/// actually returns a value — a nested `run flow` call shares the same
/// interpreter path but doesn't end the turn, so it runs through
/// [`run_nested_flow`] instead, which suppresses that event.
pub async fn run_flow_by_name(
    ctx: &Arc<WorkflowContext>,
    workflow: &crate::dsl::codegen::CompiledWorkflow,
    flow_name: &str,
) -> Result<FlowOutcome, DslRuntimeError> {
    run_flow_by_name_inner(ctx, workflow, flow_name, true).await
}

async fn run_flow_by_name_inner(
    ctx: &Arc<WorkflowContext>,
    workflow: &crate::dsl::codegen::CompiledWorkflow,
    flow_name: &str,
    emit_final: bool,
) -> Result<FlowOutcome, DslRuntimeError> {
    let flow = workflow.flow(flow_name).ok_or_else(|| DslRuntimeError::Abort {
        message: format!("run flow: unknown flow '{flow_name}'"),
    })?;
    fire_handlers(ctx, workflow, &flow.body, HandlerTiming::Before, "run").await?;
    let outcome = run_flow(ctx, workflow, flow).await?;
    fire_handlers(ctx, workflow, &flow.body, HandlerTiming::After, "run").await?;

    if emit_final {
        if let FlowOutcome::Returned(value) = &outcome {
            let text = WorkflowContext::stringify(value);
            ctx.emit(FlowEvent::Adk(Event::final_response(flow_name.to_string(), text)));
        }
    }

    Ok(outcome)
}

fn set_path(target: &mut Value, path: &[String], value: Value) {
    if path.is_empty() {
        *target = value;
        return;
    }
    if !target.is_object() {
        *target = Value::Object(serde_json::Map::new());
    }
    let map = target.as_object_mut().unwrap();
    if path.len() == 1 {
        map.insert(path[0].clone(), value);
    } else {
        let entry = map.entry(path[0].clone()).or_insert(Value::Object(serde_json::Map::new()));
        set_path(entry, &path[1..], value);
    }
}

fn eval<'a>(
    ctx: &'a Arc<WorkflowContext>,
    expr: &'a Expr,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Value, DslRuntimeError>> + Send + 'a>> {
    Box::pin(async move {
        match expr {
            Expr::VarRef(name) => Ok(ctx.get_var(name).await.unwrap_or(Value::Null)),
            Expr::PropertyAccess { base, path } => {
                let base_value = ctx.get_var(base).await.unwrap_or(Value::Null);
                Ok(get_path(&base_value, path))
            }
            Expr::ImplicitProperty(path) => {
                let item = ctx.get_var("__filter_item__").await.unwrap_or(Value::Null);
                Ok(get_path(&item, path))
            }
            Expr::Literal(lit) => Ok(literal_value(lit)),
            Expr::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(eval(ctx, item).await?);
                }
                Ok(Value::Array(out))
            }
            Expr::Object(entries) => {
                let mut map = serde_json::Map::new();
                for (key, value) in entries {
                    map.insert(key.clone(), eval(ctx, value).await?);
                }
                Ok(Value::Object(map))
            }
            Expr::BinaryOp { op, left, right } => {
                let l = eval(ctx, left).await?;
                let r = eval(ctx, right).await?;
                Ok(Value::Bool(eval_binop(*op, &l, &r)))
            }
            Expr::Filter { list_expr, condition } => {
                let list = eval(ctx, list_expr).await?;
                let items = list.as_array().cloned().unwrap_or_default();
                let mut kept = Vec::new();
                for item in items {
                    ctx.set_var("__filter_item__", item.clone()).await;
                    if eval(ctx, condition).await?.as_bool().unwrap_or(false) {
                        kept.push(item);
                    }
                }
                Ok(Value::Array(kept))
            }
        }
    })
}

fn literal_value(lit: &Literal) -> Value {
    match lit {
        Literal::Int(n) => Value::from(*n),
        Literal::Float(n) => serde_json::Number::from_f64(*n).map(Value::Number).unwrap_or(Value::Null),
        Literal::Str(s) => Value::String(s.clone()),
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Null => Value::Null,
    }
}

fn get_path(base: &Value, path: &[String]) -> Value {
    let mut current = base.clone();
    for segment in path {
        current = current.get(segment).cloned().unwrap_or(Value::Null);
    }
    current
}

fn eval_binop(op: crate::dsl::ast::BinOp, left: &Value, right: &Value) -> bool {
    use crate::dsl::ast::BinOp;
    match op {
        BinOp::Eq => left == right,
        BinOp::NotEq => left != right,
        BinOp::Contains => match (left, right) {
            (Value::String(l), Value::String(r)) => l.contains(r.as_str()),
            (Value::Array(items), needle) => items.contains(needle),
            _ => false,
        },
        BinOp::And => left.as_bool().unwrap_or(false) && right.as_bool().unwrap_or(false),
        BinOp::Or => left.as_bool().unwrap_or(false) || right.as_bool().unwrap_or(false),
    }
}

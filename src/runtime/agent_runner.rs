//! Agent runner (C6): drives one `run agent` call through the retry/backoff
//! state machine and the runner's `idle -> running ->
//! (final_response|escalate|error)` lifecycle, emitting [`FlowEvent`]s as it
//! goes.

use log::{debug, warn};

use crate::runtime::context::WorkflowContext;
use crate::runtime::errors::{DslRuntimeError, ProviderError, ProviderErrorKind};
use crate::runtime::llm_client::Message;
use crate::session::event::FlowEvent;
use serde_json::Value;

/// Maximum retry attempts before a retriable provider error is surfaced
/// (`spec.md` §4.6).
pub const MAX_ATTEMPTS: u32 = 7;
const BACKOFF_START_SECS: u64 = 30;
const BACKOFF_INCREMENT_SECS: u64 = 30;
const BACKOFF_CAP_SECS: u64 = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { delay_secs: u64 },
    Fail,
}

/// Pure function `(attempt, last_error) -> {retry(delay)|fail}` (Design
/// Note §9): unit-testable without real sleeps, driving the agent runner's
/// outer loop.
pub fn decide_retry(attempt: u32, error: &ProviderError) -> RetryDecision {
    if !error.kind.is_retriable() {
        return RetryDecision::Fail;
    }
    if attempt >= MAX_ATTEMPTS {
        return RetryDecision::Fail;
    }
    let delay = BACKOFF_START_SECS + BACKOFF_INCREMENT_SECS * (attempt.saturating_sub(1) as u64);
    RetryDecision::Retry { delay_secs: delay.min(BACKOFF_CAP_SECS) }
}

/// Run the named agent against `input`, retrying transient provider errors
/// per [`decide_retry`]. Returns the agent's final response text, or the
/// terminal error (surfaced, not retried further).
///
/// Cooperative cancellation: `cancelled` is checked at each retry-loop
/// boundary (`spec.md` §5) so a `parallel do` branch can be told to stop
/// between attempts without forcibly aborting a call in flight.
pub async fn run_agent(
    ctx: &WorkflowContext,
    agent_name: &str,
    input: Option<&Value>,
    cancelled: &(dyn Fn() -> bool + Sync),
) -> Result<String, DslRuntimeError> {
    let agent = ctx.get_agent(agent_name).await.ok_or_else(|| DslRuntimeError::Abort {
        message: format!("run_agent: unknown agent '{agent_name}'"),
    })?;

    let prompt = ctx.get_prompt(&agent.instruction_prompt).await.ok_or_else(|| DslRuntimeError::Abort {
        message: format!("run_agent: agent '{agent_name}' references unknown instruction prompt '{}'", agent.instruction_prompt),
    })?;

    let model = prompt.model.clone().unwrap_or_else(|| "default".to_string());
    let rendered = ctx.render(&prompt.body).await;
    let mut new_messages = vec![Message::system(rendered)];
    if let Some(global) = &agent.global_instruction {
        new_messages.insert(0, Message::system(ctx.render(global).await));
    }
    if let Some(input) = input {
        new_messages.push(Message::user(WorkflowContext::stringify(input)));
    }

    ctx.emit(FlowEvent::AgentSelected { agent: agent_name.to_string() });

    // Turn-boundary history compaction (`spec.md` §4.9): merge this call's
    // messages into the agent's running history and compact it first if the
    // resolved strategy says to.
    let messages = ctx.prepare_turn_messages(agent_name, &model, agent.history_policy.as_deref(), new_messages).await;

    let mut attempt = 1u32;
    loop {
        if cancelled() {
            return Err(DslRuntimeError::Abort { message: format!("run_agent: '{agent_name}' cancelled by sibling failure") });
        }

        debug!("run_agent: '{agent_name}' attempt {attempt}");
        match ctx.llm_client().complete(&model, &messages, &[]).await {
            Ok(result) => {
                let text = result.message.content.to_string();
                ctx.record_call_result(agent_name, &text, prompt.escalation.as_ref()).await;
                ctx.append_agent_history(agent_name, Message::assistant(text.clone())).await;
                ctx.emit(FlowEvent::AgentResponded { agent: agent_name.to_string(), text: text.clone() });
                return Ok(text);
            }
            Err(error) => match decide_retry(attempt, &error) {
                RetryDecision::Retry { delay_secs } => {
                    warn!("run_agent: '{agent_name}' attempt {attempt} failed ({error}), retrying in {delay_secs}s");
                    tokio::time::sleep(std::time::Duration::from_secs(delay_secs)).await;
                    attempt += 1;
                }
                RetryDecision::Fail => {
                    ctx.emit(FlowEvent::AgentFailed { agent: agent_name.to_string(), error: error.to_string() });
                    return Err(DslRuntimeError::Abort { message: error.to_string() });
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider_error(kind: ProviderErrorKind) -> ProviderError {
        ProviderError { kind, message: "boom".into() }
    }

    #[test]
    fn retries_rate_limit_with_increasing_backoff() {
        assert_eq!(decide_retry(1, &provider_error(ProviderErrorKind::RateLimit)), RetryDecision::Retry { delay_secs: 30 });
        assert_eq!(decide_retry(2, &provider_error(ProviderErrorKind::RateLimit)), RetryDecision::Retry { delay_secs: 60 });
        assert_eq!(decide_retry(3, &provider_error(ProviderErrorKind::RateLimit)), RetryDecision::Retry { delay_secs: 90 });
    }

    #[test]
    fn caps_backoff_at_ten_minutes() {
        assert_eq!(decide_retry(6, &provider_error(ProviderErrorKind::Server)), RetryDecision::Retry { delay_secs: 600 });
    }

    #[test]
    fn gives_up_after_max_attempts() {
        assert_eq!(decide_retry(MAX_ATTEMPTS, &provider_error(ProviderErrorKind::RateLimit)), RetryDecision::Fail);
    }

    #[test]
    fn never_retries_non_retriable_kinds() {
        assert_eq!(decide_retry(1, &provider_error(ProviderErrorKind::BadRequest)), RetryDecision::Fail);
        assert_eq!(decide_retry(1, &provider_error(ProviderErrorKind::Auth)), RetryDecision::Fail);
    }
}

//! Runtime error types (ambient stack — A2).
//!
//! Every subsystem gets its own enum with a hand-rolled [`std::fmt::Display`]
//! impl and a blanket [`std::error::Error`] impl, matching the teacher's
//! `OrchestrationError` style rather than a `thiserror` derive. Functions
//! that cross the crate boundary box these as
//! `Box<dyn std::error::Error + Send + Sync>`.

use std::fmt;

/// The `DslRuntimeError` family (`original_source/dsl/runtime/errors.py`),
/// raised while a compiled workflow executes.
#[derive(Debug, Clone)]
pub enum DslRuntimeError {
    /// A `run agent` call's input was rejected before the agent ran.
    BlockedInput { message: String },
    /// The same input should be retried, optionally with a replacement value.
    RetryInput { message: String },
    /// The enclosing step should be retried from scratch.
    RetryStep { message: String },
    /// The workflow should stop immediately; no further steps run.
    Abort { message: String },
    /// A model response could not be parsed as JSON.
    JsonParse { raw_response: String, parse_error: String },
    /// A model response parsed as JSON but failed schema validation.
    SchemaValidation { schema_name: String, errors: Vec<String>, raw_response: String },
}

impl fmt::Display for DslRuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DslRuntimeError::BlockedInput { message } => write!(f, "blocked input: {message}"),
            DslRuntimeError::RetryInput { message } => write!(f, "retry input: {message}"),
            DslRuntimeError::RetryStep { message } => write!(f, "retry step: {message}"),
            DslRuntimeError::Abort { message } => write!(f, "aborted: {message}"),
            DslRuntimeError::JsonParse { parse_error, .. } => write!(f, "failed to parse model response as JSON: {parse_error}"),
            DslRuntimeError::SchemaValidation { schema_name, errors, .. } => {
                write!(f, "response failed schema '{schema_name}' validation: {}", errors.join("; "))
            }
        }
    }
}

impl std::error::Error for DslRuntimeError {}

/// Structural classification of a transport-level LLM provider failure, so
/// [`crate::runtime::agent_runner`]'s retry state machine can match on a
/// typed kind instead of sniffing a rendered error message (contrast with
/// `zavora-ai-zavora-cli`'s `categorize_error`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    RateLimit,
    Server,
    Timeout,
    BadRequest,
    Auth,
}

impl ProviderErrorKind {
    /// Retriable kinds per `spec.md` §4.6: rate-limit and 5xx-class server
    /// errors. Timeouts are also treated as retriable; bad request and auth
    /// failures are not since retrying cannot change the outcome.
    pub fn is_retriable(self) -> bool {
        matches!(self, ProviderErrorKind::RateLimit | ProviderErrorKind::Server | ProviderErrorKind::Timeout)
    }
}

#[derive(Debug, Clone)]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "provider error ({:?}): {}", self.kind, self.message)
    }
}

impl std::error::Error for ProviderError {}

/// Raised by the workload manager when two discovered definitions claim the
/// same agent name (`spec.md` §4.11).
#[derive(Debug, Clone)]
pub struct AgentDuplicateNameError {
    pub name: String,
    pub first_source: String,
    pub second_source: String,
}

impl fmt::Display for AgentDuplicateNameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "duplicate agent name '{}' defined in both {} and {}",
            self.name, self.first_source, self.second_source
        )
    }
}

impl std::error::Error for AgentDuplicateNameError {}

#[derive(Debug, Clone)]
pub struct AgentValidationError {
    pub message: String,
}

impl fmt::Display for AgentValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "agent validation failed: {}", self.message)
    }
}

impl std::error::Error for AgentValidationError {}

#[derive(Debug, Clone)]
pub struct AgentCycleError {
    pub cycle: Vec<String>,
}

impl fmt::Display for AgentCycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "agent reference cycle detected: {}", self.cycle.join(" -> "))
    }
}

impl std::error::Error for AgentCycleError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retriable_kinds() {
        assert!(ProviderErrorKind::RateLimit.is_retriable());
        assert!(ProviderErrorKind::Server.is_retriable());
        assert!(ProviderErrorKind::Timeout.is_retriable());
        assert!(!ProviderErrorKind::BadRequest.is_retriable());
        assert!(!ProviderErrorKind::Auth.is_retriable());
    }

    #[test]
    fn schema_validation_display_lists_errors() {
        let err = DslRuntimeError::SchemaValidation {
            schema_name: "TicketPlan".into(),
            errors: vec!["missing field 'title'".into()],
            raw_response: "{}".into(),
        };
        assert!(err.to_string().contains("TicketPlan"));
        assert!(err.to_string().contains("missing field 'title'"));
    }
}

//! The "consumed LLM interface" (`spec.md` §6), modeled as a trait directly
//! descended from the teacher's `ClientWrapper` (`client_wrapper.rs`): same
//! `Message`/`Role`/`ToolDefinition`/`TokenUsage` shape, same
//! `send_message`/`send_message_stream` split, renamed to this crate's
//! vocabulary.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::runtime::errors::ProviderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone)]
pub struct Message {
    pub role: Role,
    pub content: Arc<str>,
    pub tool_calls: Vec<ToolCall>,
    /// Set only on `Role::Tool` messages: the id of the call being answered.
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn user(content: impl Into<Arc<str>>) -> Self {
        Self { role: Role::User, content: content.into(), tool_calls: Vec::new(), tool_call_id: None }
    }

    pub fn system(content: impl Into<Arc<str>>) -> Self {
        Self { role: Role::System, content: content.into(), tool_calls: Vec::new(), tool_call_id: None }
    }

    pub fn assistant(content: impl Into<Arc<str>>) -> Self {
        Self { role: Role::Assistant, content: content.into(), tool_calls: Vec::new(), tool_call_id: None }
    }
}

#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters_schema: Value,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone)]
pub struct ModelChunk {
    pub content: String,
    pub finish_reason: Option<String>,
}

/// A completed model response: the assistant's final message plus any tool
/// calls it emitted and the usage reported for the turn.
#[derive(Debug, Clone)]
pub struct CompletionResult {
    pub message: Message,
    pub usage: TokenUsage,
}

/// The provider-agnostic interface the agent runner drives. Concrete
/// implementations wrap a specific HTTP client (e.g. `openai-rust2`).
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(
        &self,
        model: &str,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<CompletionResult, ProviderError>;

    /// Streaming completion. Default implementation is a no-op empty
    /// stream, matching the teacher's `send_message_stream` default — most
    /// providers in this crate are driven through `complete` only.
    async fn complete_stream(
        &self,
        _model: &str,
        _messages: &[Message],
        _tools: &[ToolDefinition],
    ) -> Result<Vec<ModelChunk>, ProviderError> {
        Ok(Vec::new())
    }

    fn model_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoClient;

    #[async_trait]
    impl LlmClient for EchoClient {
        async fn complete(
            &self,
            _model: &str,
            messages: &[Message],
            _tools: &[ToolDefinition],
        ) -> Result<CompletionResult, ProviderError> {
            let last = messages.last().map(|m| m.content.clone()).unwrap_or_else(|| "".into());
            Ok(CompletionResult {
                message: Message::assistant(last),
                usage: TokenUsage { input_tokens: 1, output_tokens: 1, total_tokens: 2 },
            })
        }

        fn model_name(&self) -> &str {
            "echo"
        }
    }

    #[tokio::test]
    async fn echo_client_round_trips_content() {
        let client = EchoClient;
        let messages = vec![Message::user("hello")];
        let result = client.complete("echo", &messages, &[]).await.unwrap();
        assert_eq!(&*result.message.content, "hello");
    }
}

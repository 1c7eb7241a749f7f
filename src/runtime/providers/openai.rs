//! OpenAI Chat Completions provider, adapted from the teacher's
//! `clients/openai.rs`: a shared pooled `reqwest::Client`, `openai_rust2` for
//! the request/response shapes, and `ProviderErrorKind` classification in
//! place of the teacher's string-sniffed error path.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use lazy_static::lazy_static;
use openai_rust2 as openai_rust;

use crate::runtime::errors::{ProviderError, ProviderErrorKind};
use crate::runtime::llm_client::{CompletionResult, LlmClient, Message, ModelChunk, Role, TokenUsage, ToolDefinition};

lazy_static! {
    /// Shared HTTP client with persistent connection pooling, kept warm
    /// across every `OpenAiLlmClient` instance in the process.
    static ref SHARED_HTTP_CLIENT: reqwest::Client = reqwest::ClientBuilder::new()
        .timeout(Duration::from_secs(120))
        .build()
        .expect("failed to build shared HTTP client");
}

/// [`LlmClient`] backed by OpenAI's Chat Completions API (or any
/// OpenAI-compatible endpoint reachable via a custom base URL).
pub struct OpenAiLlmClient {
    client: openai_rust::Client,
    default_model: String,
}

impl OpenAiLlmClient {
    pub fn new(api_key: &str, default_model: impl Into<String>) -> Self {
        Self { client: openai_rust::Client::new_with_client(api_key, SHARED_HTTP_CLIENT.clone()), default_model: default_model.into() }
    }

    pub fn new_with_base_url(api_key: &str, default_model: impl Into<String>, base_url: &str) -> Self {
        let normalized = format!("{}/", base_url.trim_end_matches('/'));
        Self { client: openai_rust::Client::new_with_client_and_base_url(api_key, SHARED_HTTP_CLIENT.clone(), &normalized), default_model: default_model.into() }
    }

    fn classify(err: &openai_rust::Error) -> ProviderErrorKind {
        let text = err.to_string().to_lowercase();
        if text.contains("429") || text.contains("rate limit") {
            ProviderErrorKind::RateLimit
        } else if text.contains("401") || text.contains("unauthorized") {
            ProviderErrorKind::Auth
        } else if text.contains("400") {
            ProviderErrorKind::BadRequest
        } else if text.contains("timed out") || text.contains("timeout") {
            ProviderErrorKind::Timeout
        } else {
            ProviderErrorKind::Server
        }
    }
}

fn to_openai_role(role: Role) -> String {
    match role {
        Role::System => "system".to_owned(),
        Role::User => "user".to_owned(),
        Role::Assistant => "assistant".to_owned(),
        Role::Tool => "tool".to_owned(),
    }
}

#[async_trait]
impl LlmClient for OpenAiLlmClient {
    async fn complete(&self, model: &str, messages: &[Message], _tools: &[ToolDefinition]) -> Result<CompletionResult, ProviderError> {
        let model = if model.is_empty() || model == "default" { &self.default_model } else { model };
        let formatted: Vec<openai_rust::chat::Message> = messages
            .iter()
            .map(|m| openai_rust::chat::Message { role: to_openai_role(m.role), content: m.content.to_string() })
            .collect();

        let args = openai_rust::chat::ChatArguments::new(model, formatted);
        let response = self
            .client
            .create_chat(args, Some("/v1/chat/completions".to_string()))
            .await
            .map_err(|e| {
                log::error!("OpenAiLlmClient::complete: {e}");
                ProviderError { kind: Self::classify(&e), message: e.to_string() }
            })?;

        let content = response.choices.first().map(|c| c.message.content.clone()).unwrap_or_default();
        let usage = TokenUsage {
            input_tokens: response.usage.prompt_tokens as u64,
            output_tokens: response.usage.completion_tokens as u64,
            total_tokens: response.usage.total_tokens as u64,
        };

        Ok(CompletionResult { message: Message::assistant(content), usage })
    }

    async fn complete_stream(&self, model: &str, messages: &[Message], _tools: &[ToolDefinition]) -> Result<Vec<ModelChunk>, ProviderError> {
        let model = if model.is_empty() || model == "default" { &self.default_model } else { model };
        let formatted: Vec<openai_rust::chat::Message> = messages
            .iter()
            .map(|m| openai_rust::chat::Message { role: to_openai_role(m.role), content: m.content.to_string() })
            .collect();

        let args = openai_rust::chat::ChatArguments::new(model, formatted);
        let mut stream = self
            .client
            .create_chat_stream(args, Some("/v1/chat/completions".to_string()))
            .await
            .map_err(|e| ProviderError { kind: Self::classify(&e), message: e.to_string() })?;

        let mut chunks = Vec::new();
        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => {
                    let content = chunk.choices.first().and_then(|c| c.delta.content.clone()).unwrap_or_default();
                    let finish_reason = chunk.choices.first().and_then(|c| c.finish_reason.clone());
                    chunks.push(ModelChunk { content, finish_reason });
                }
                Err(e) => {
                    log::error!("OpenAiLlmClient::complete_stream: chunk error: {e}");
                    return Err(ProviderError { kind: ProviderErrorKind::Server, message: e.to_string() });
                }
            }
        }
        Ok(chunks)
    }

    fn model_name(&self) -> &str {
        &self.default_model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructs_with_default_base_url() {
        let client = OpenAiLlmClient::new("test-key", "gpt-4.1-mini");
        assert_eq!(client.model_name(), "gpt-4.1-mini");
    }

    #[test]
    fn constructs_with_custom_base_url() {
        let client = OpenAiLlmClient::new_with_base_url("test-key", "gpt-4.1-mini", "https://example.test/v1/");
        assert_eq!(client.model_name(), "gpt-4.1-mini");
    }
}

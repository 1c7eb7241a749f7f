//! Concrete [`crate::runtime::llm_client::LlmClient`] implementations.

pub mod openai;

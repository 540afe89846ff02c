//! Model invocation seam.
//!
//! The engine never interprets model output beyond its envelope: a
//! completion is text plus an optional tool call plus token usage. The
//! [`CompletionClient`] trait keeps providers pluggable; [`ChatApiClient`]
//! talks to any OpenAI-compatible chat-completions endpoint.

mod api;

pub use api::ChatApiClient;

use async_trait::async_trait;
use miette::Diagnostic;
use serde_json::Value;
use thiserror::Error;

use crate::message::Message;

/// A request for one model completion.
#[derive(Clone, Debug)]
pub struct ChatRequest {
    /// Model identifier (provider-prefixed, e.g. `anthropic:claude-sonnet-4-0`).
    pub model: String,
    /// Conversation so far.
    pub messages: Vec<Message>,
    /// Tool schemas offered to the model, empty when tools are unavailable.
    pub tools: Vec<Value>,
}

/// A tool invocation proposed by the model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolCallRequest {
    pub name: String,
    pub args: Value,
}

/// Token usage reported by the provider for one completion.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// One model completion.
#[derive(Clone, Debug)]
pub struct ChatResponse {
    /// Assistant text, possibly empty when only a tool call was produced.
    pub content: String,
    /// Tool call proposed by the model, if any.
    pub tool_call: Option<ToolCallRequest>,
    /// Usage accounting for the invocation.
    pub usage: TokenUsage,
}

/// Errors from model invocation.
#[derive(Debug, Error, Diagnostic)]
pub enum LlmError {
    #[error("model request failed: {0}")]
    #[diagnostic(code(codeloom::llm::request))]
    Request(#[from] reqwest::Error),

    #[error("model API returned status {status}: {message}")]
    #[diagnostic(code(codeloom::llm::api))]
    Api { status: u16, message: String },

    #[error("malformed model response: {0}")]
    #[diagnostic(code(codeloom::llm::malformed))]
    Malformed(String),
}

/// Provider-agnostic completion interface.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, LlmError>;
}

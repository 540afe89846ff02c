//! OpenAI-compatible chat-completions client.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{ChatRequest, ChatResponse, CompletionClient, LlmError, TokenUsage, ToolCallRequest};

/// HTTP client for any OpenAI-compatible `/chat/completions` endpoint
/// (OpenRouter, vLLM, provider gateways).
#[derive(Clone)]
pub struct ChatApiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ChatApiClient {
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    /// Strip a `provider:` prefix; gateway-style APIs expect `provider/model`.
    fn wire_model(model: &str) -> String {
        match model.split_once(':') {
            Some((provider, name)) => format!("{provider}/{name}"),
            None => model.to_string(),
        }
    }
}

impl std::fmt::Debug for ChatApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatApiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CompletionClient for ChatApiClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        let messages: Vec<Value> = request
            .messages
            .iter()
            .map(|m| json!({"role": m.role, "content": m.content}))
            .collect();

        let mut body = json!({
            "model": Self::wire_model(&request.model),
            "messages": messages,
        });
        if !request.tools.is_empty() {
            body["tools"] = Value::Array(
                request
                    .tools
                    .iter()
                    .map(|schema| json!({"type": "function", "function": schema}))
                    .collect(),
            );
        }

        let response = self
            .client
            .post(format!(
                "{}/chat/completions",
                self.base_url.trim_end_matches('/')
            ))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let payload: Value = response.json().await?;
        let message = payload["choices"]
            .get(0)
            .map(|choice| &choice["message"])
            .ok_or_else(|| LlmError::Malformed("response has no choices".into()))?;

        let content = message["content"].as_str().unwrap_or_default().to_string();

        let tool_call = message["tool_calls"].get(0).and_then(|call| {
            let function = &call["function"];
            let name = function["name"].as_str()?.to_string();
            let args = function["arguments"]
                .as_str()
                .and_then(|raw| serde_json::from_str(raw).ok())
                .unwrap_or(Value::Null);
            Some(ToolCallRequest { name, args })
        });

        let usage = TokenUsage {
            prompt_tokens: payload["usage"]["prompt_tokens"].as_u64().unwrap_or(0),
            completion_tokens: payload["usage"]["completion_tokens"].as_u64().unwrap_or(0),
        };

        Ok(ChatResponse {
            content,
            tool_call,
            usage,
        })
    }
}

// src/provider/openai_compat.rs — Generic OpenAI-compatible chat provider
//
// Works with OpenAI, Ollama (`/v1`), vLLM, OpenRouter and anything else that
// speaks `POST {base_url}/chat/completions`.

use async_trait::async_trait;
use std::time::Duration;

use super::{ChatRequest, ChatResponse, ModelProvider, TokenUsage};
use crate::infra::errors::PluginError;

pub struct OpenAICompatProvider {
    id_str: String,
    name_str: String,
    api_key: Option<String>,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAICompatProvider {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        api_key: Option<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, PluginError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(format!("switchboard/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PluginError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            id_str: id.into(),
            name_str: name.into(),
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn request_body(request: &ChatRequest) -> serde_json::Value {
        let msgs: Vec<serde_json::Value> = request
            .messages
            .iter()
            .map(|m| {
                serde_json::json!({
                    "role": m.role.as_str(),
                    "content": m.content,
                })
            })
            .collect();

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": msgs,
        });
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        if let Some(temp) = request.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        body
    }

    fn error(&self, message: impl std::fmt::Display) -> PluginError {
        PluginError::ClassifierError(format!("{}: {}", self.id_str, message))
    }
}

#[async_trait]
impl ModelProvider for OpenAICompatProvider {
    fn id(&self) -> &str {
        &self.id_str
    }

    fn name(&self) -> &str {
        &self.name_str
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, PluginError> {
        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&Self::request_body(&request));
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }

        let response = builder.send().await.map_err(|e| self.error(e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response.text().await.unwrap_or_default();
            return Err(self.error(format!("HTTP {status}: {error_body}")));
        }

        let resp: serde_json::Value = response.json().await.map_err(|e| self.error(e))?;
        parse_chat_response(&resp).ok_or_else(|| self.error("response has no message content"))
    }
}

fn parse_chat_response(resp: &serde_json::Value) -> Option<ChatResponse> {
    let content = resp["choices"][0]["message"]["content"].as_str()?.to_string();
    let usage = TokenUsage {
        input_tokens: resp["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
        output_tokens: resp["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
    };
    Some(ChatResponse { content, usage })
}

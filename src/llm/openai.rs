//! OpenAI-compatible `/chat/completions` client.
//! Works against OpenAI, OpenRouter, Ollama, and vLLM.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use super::{AssistantTurn, ChatMessage, LanguageModel, Role, ToolCall, ToolDefinition};
use crate::config::LlmConfig;

pub struct OpenAiChatModel {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: Option<f64>,
    max_tokens: u32,
}

impl OpenAiChatModel {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: std::env::var(&config.api_key_env).ok(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    fn format_messages(system_prompt: &str, history: &[ChatMessage]) -> Vec<Value> {
        let mut out = Vec::with_capacity(history.len() + 1);
        out.push(json!({"role": "system", "content": system_prompt}));

        for msg in history {
            let mut m = json!({
                "role": msg.role.as_str(),
                "content": msg.content,
            });
            if msg.role == Role::Assistant && !msg.tool_calls.is_empty() {
                let calls: Vec<Value> = msg
                    .tool_calls
                    .iter()
                    .map(|tc| {
                        json!({
                            "id": tc.id,
                            "type": "function",
                            "function": {
                                "name": tc.name,
                                "arguments": tc.arguments.to_string(),
                            }
                        })
                    })
                    .collect();
                m["tool_calls"] = json!(calls);
            }
            if let Some(id) = &msg.tool_call_id {
                m["tool_call_id"] = json!(id);
            }
            out.push(m);
        }
        out
    }

    fn format_tools(tools: &[ToolDefinition]) -> Vec<Value> {
        tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect()
    }

    fn parse_response(v: &Value) -> Result<AssistantTurn> {
        let message = v["choices"]
            .get(0)
            .map(|c| &c["message"])
            .context("completion response had no choices")?;

        let content = message["content"].as_str().unwrap_or_default().to_string();

        let tool_calls = message["tool_calls"]
            .as_array()
            .map(|calls| {
                calls
                    .iter()
                    .filter_map(|tc| {
                        // A missing id is filled in by the agent loop
                        let id = tc["id"].as_str().unwrap_or_default().to_string();
                        let name = tc["function"]["name"].as_str()?.to_string();
                        // Arguments arrive as a JSON string; keep it raw if the model broke it
                        let arguments = match &tc["function"]["arguments"] {
                            Value::String(raw) => serde_json::from_str(raw)
                                .unwrap_or_else(|_| Value::String(raw.clone())),
                            Value::Null => json!({}),
                            other => other.clone(),
                        };
                        Some(ToolCall {
                            id,
                            name,
                            arguments,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(AssistantTurn {
            content,
            tool_calls,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiChatModel {
    async fn generate(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<AssistantTurn> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut body = json!({
            "model": self.model,
            "messages": Self::format_messages(system_prompt, history),
            "max_tokens": self.max_tokens,
        });
        if let Some(t) = self.temperature {
            body["temperature"] = json!(t);
        }
        if !tools.is_empty() {
            body["tools"] = json!(Self::format_tools(tools));
            body["tool_choice"] = json!("auto");
        }

        tracing::debug!(model = %self.model, messages = history.len() + 1, tools = tools.len(), "chat completion request");

        let mut req = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req
            .send()
            .await
            .with_context(|| format!("HTTP request failed for {url}"))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("chat completion failed with HTTP {status}: {text}");
        }

        let v: Value = response
            .json()
            .await
            .context("failed to decode chat completion")?;
        Self::parse_response(&v)
    }
}

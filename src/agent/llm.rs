use crate::agent::types::{ChatMessage, LLMResponse, TokenUsage, ToolCallRequest};
use crate::config::schema::AIConfig;
use crate::error::{DuetError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// LLM Provider trait
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Send a chat completion request offering `tools` (OpenAI function schemas)
    async fn chat(&self, messages: &[ChatMessage], tools: &[Value]) -> Result<LLMResponse>;

    /// Get provider name
    fn name(&self) -> &str;

    /// Get model name
    fn model(&self) -> &str;
}

/// OpenAI-compatible provider (OpenAI, Azure, local gateways)
pub struct OpenAIProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAIProvider {
    /// Build a provider from config. Fails when no API key is configured, so
    /// a missing `OPENAI_API_KEY` is reported before the browser is launched.
    pub fn new(config: &AIConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                DuetError::Config(
                    "OPENAI_API_KEY is not set. Export it or add ai.api_key to the config file."
                        .to_string(),
                )
            })?
            .to_string();

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| DuetError::Llm(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    fn build_messages(&self, messages: &[ChatMessage]) -> Vec<Value> {
        messages
            .iter()
            .map(|msg| {
                let mut wire = json!({ "role": msg.role });
                // Assistant turns that only call tools carry an explicit null
                wire["content"] = msg
                    .content
                    .as_ref()
                    .map(|c| Value::String(c.clone()))
                    .unwrap_or(Value::Null);

                if !msg.tool_calls.is_empty() {
                    wire["tool_calls"] = msg
                        .tool_calls
                        .iter()
                        .map(|call| {
                            json!({
                                "id": call.id,
                                "type": "function",
                                "function": {
                                    "name": call.name,
                                    "arguments": match &call.arguments {
                                        Value::String(raw) => raw.clone(),
                                        other => other.to_string(),
                                    }
                                }
                            })
                        })
                        .collect();
                }

                if let Some(id) = &msg.tool_call_id {
                    wire["tool_call_id"] = Value::String(id.clone());
                }

                wire
            })
            .collect()
    }

    fn build_body(&self, messages: &[ChatMessage], tools: &[Value]) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": self.build_messages(messages),
            "max_tokens": self.max_tokens,
            "temperature": self.temperature
        });

        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.to_vec());
            body["tool_choice"] = Value::String("auto".to_string());
        }

        body
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Default, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

/// Convert a raw chat-completions body into an `LLMResponse`
fn parse_chat_response(raw: &str, model: &str) -> Result<LLMResponse> {
    let response: ChatResponse = serde_json::from_str(raw).map_err(|e| {
        let preview: String = raw.chars().take(500).collect();
        DuetError::Llm(format!("Failed to parse response: {}. Body: {}", e, preview))
    })?;

    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| DuetError::Llm("No choices in response".to_string()))?;

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| {
            let arguments = if tc.function.arguments.trim().is_empty() {
                json!({})
            } else {
                serde_json::from_str(&tc.function.arguments)
                    .unwrap_or(Value::String(tc.function.arguments))
            };
            ToolCallRequest {
                id: tc.id,
                name: tc.function.name,
                arguments,
            }
        })
        .collect();

    let usage = response.usage.unwrap_or_default();

    Ok(LLMResponse {
        content: choice.message.content.filter(|c| !c.is_empty()),
        tool_calls,
        finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
        model: model.to_string(),
        usage: TokenUsage {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        },
    })
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    async fn chat(&self, messages: &[ChatMessage], tools: &[Value]) -> Result<LLMResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_body(messages, tools);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| DuetError::Llm(format!("Request failed: {}", e)))?;

        let status = response.status();
        let raw = response
            .text()
            .await
            .map_err(|e| DuetError::Llm(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            tracing::error!(%status, "OpenAI API error");
            return Err(DuetError::Llm(format!("OpenAI API error {}: {}", status, raw)));
        }

        let parsed = parse_chat_response(&raw, &self.model)?;
        tracing::debug!(
            tool_calls = parsed.tool_calls.len(),
            total_tokens = parsed.usage.total_tokens,
            "LLM response received"
        );
        Ok(parsed)
    }

    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Build the configured provider
pub fn create_provider(config: &AIConfig) -> Result<Arc<dyn LLMProvider>> {
    Ok(Arc::new(OpenAIProvider::new(config)?))
}

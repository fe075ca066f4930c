use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::agent_api::{ChatMessage, StreamChunk, ToolDefinition};
use shared::settings::ProviderAuth;
use std::collections::BTreeMap;
use std::env;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::sse::SseEvent;
use crate::{relay_events, tool_input, SHARED_HTTP};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

// ── Request types ────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: Vec<Value>,
    stream: bool,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OpenAITool<'a>>,
}

/// OpenAI function-calling tool definition.
#[derive(Debug, Serialize)]
struct OpenAITool<'a> {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: OpenAIFunction<'a>,
}

#[derive(Debug, Serialize)]
struct OpenAIFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

impl<'a> From<&'a ToolDefinition> for OpenAITool<'a> {
    fn from(def: &'a ToolDefinition) -> Self {
        Self {
            tool_type: "function",
            function: OpenAIFunction {
                name: &def.name,
                description: &def.description,
                parameters: &def.input_schema,
            },
        }
    }
}

// ── Streaming response types ─────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct OpenAIStreamResponse {
    #[serde(default)]
    choices: Vec<OpenAIStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChoice {
    #[serde(default)]
    delta: OpenAIStreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAIStreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OpenAIStreamToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamToolCall {
    #[serde(default)]
    index: usize,
    /// Present on the first chunk for this tool call.
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<OpenAIStreamToolCallFunction>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamToolCallFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

// ── Conversion ───────────────────────────────────────────────────────

fn part_type(part: &Value) -> Option<&str> {
    part.get("type").and_then(|t| t.as_str())
}

/// Convert ChatMessages to OpenAI message format.
///
/// - tool_result blocks become one `{role: "tool"}` message each; failures
///   are prefixed so the model can tell them apart
/// - tool_use blocks become an assistant message with `tool_calls`
fn to_openai_messages(messages: &[ChatMessage]) -> Vec<Value> {
    let mut out = Vec::with_capacity(messages.len());

    for m in messages {
        let Some(parts) = &m.content_parts else {
            out.push(serde_json::json!({ "role": m.role, "content": m.content }));
            continue;
        };

        if parts.iter().any(|p| part_type(p) == Some("tool_result")) {
            for part in parts.iter().filter(|p| part_type(p) == Some("tool_result")) {
                let content = part["content"].as_str().unwrap_or("");
                let content = if part["is_error"].as_bool().unwrap_or(false) {
                    format!("Error: {}", content)
                } else {
                    content.to_string()
                };
                out.push(serde_json::json!({
                    "role": "tool",
                    "tool_call_id": part["tool_use_id"].as_str().unwrap_or(""),
                    "content": content,
                }));
            }
            continue;
        }

        let text: String = parts
            .iter()
            .filter(|p| part_type(p) == Some("text"))
            .filter_map(|p| p["text"].as_str())
            .collect();
        let tool_calls: Vec<Value> = parts
            .iter()
            .filter(|p| part_type(p) == Some("tool_use"))
            .map(|p| {
                serde_json::json!({
                    "id": p["id"].as_str().unwrap_or(""),
                    "type": "function",
                    "function": {
                        "name": p["name"].as_str().unwrap_or(""),
                        "arguments": p["input"].to_string(),
                    }
                })
            })
            .collect();

        let mut msg = serde_json::json!({ "role": m.role });
        if !text.is_empty() || tool_calls.is_empty() {
            msg["content"] = Value::String(if text.is_empty() { m.content.clone() } else { text });
        }
        if !tool_calls.is_empty() {
            msg["tool_calls"] = Value::Array(tool_calls);
        }
        out.push(msg);
    }

    out
}

/// Tool calls being assembled from deltas, keyed by their stream index
#[derive(Debug, Default)]
struct ToolCallAccumulator {
    calls: BTreeMap<usize, PartialCall>,
}

#[derive(Debug, Default)]
struct PartialCall {
    id: String,
    name: String,
    arguments: String,
}

impl ToolCallAccumulator {
    fn apply(&mut self, delta: &OpenAIStreamToolCall) -> Vec<StreamChunk> {
        let mut chunks = Vec::new();
        let slot = self.calls.entry(delta.index).or_default();

        if let Some(id) = &delta.id {
            slot.id = id.clone();
        }
        if let Some(func) = &delta.function {
            if let Some(name) = &func.name {
                slot.name = name.clone();
                chunks.push(StreamChunk::ToolUseStart {
                    id: slot.id.clone(),
                    name: name.clone(),
                });
            }
            if let Some(args) = &func.arguments {
                slot.arguments.push_str(args);
                if !args.is_empty() {
                    chunks.push(StreamChunk::ToolInputDelta(args.clone()));
                }
            }
        }
        chunks
    }

    /// Completed calls in index order, clearing the buffer
    fn flush(&mut self) -> Vec<StreamChunk> {
        std::mem::take(&mut self.calls)
            .into_values()
            .filter(|call| !call.name.is_empty())
            .map(|call| StreamChunk::ToolUseComplete {
                input: tool_input(&call.name, &call.arguments),
                id: call.id,
                name: call.name,
            })
            .collect()
    }
}

/// Turns Chat Completions stream events into chunks
#[derive(Debug, Default)]
struct StreamDecoder {
    tools: ToolCallAccumulator,
}

impl StreamDecoder {
    fn decode_event(&mut self, event: &SseEvent) -> Vec<StreamChunk> {
        if event.data == "[DONE]" {
            return self.finish(None);
        }
        let Ok(resp) = serde_json::from_str::<OpenAIStreamResponse>(&event.data) else {
            debug!(data = %event.data, "skipping unparseable openai event");
            return Vec::new();
        };
        let Some(choice) = resp.choices.first() else {
            return Vec::new();
        };

        let mut chunks = Vec::new();
        if let Some(content) = &choice.delta.content {
            if !content.is_empty() {
                chunks.push(StreamChunk::Text(content.clone()));
            }
        }
        for tc in choice.delta.tool_calls.iter().flatten() {
            chunks.extend(self.tools.apply(tc));
        }
        if let Some(reason) = &choice.finish_reason {
            chunks.extend(self.finish(Some(reason.clone())));
        }
        chunks
    }

    /// Pending tool calls followed by `Done`
    fn finish(&mut self, stop_reason: Option<String>) -> Vec<StreamChunk> {
        let mut chunks = self.tools.flush();
        chunks.push(StreamChunk::Done { stop_reason });
        chunks
    }
}

// ── Client ───────────────────────────────────────────────────────────

pub struct OpenAIClient {
    http: Client,
    auth_token: String,
    model: String,
    base_url: String,
    max_tokens: u32,
}

impl OpenAIClient {
    pub fn from_auth(
        model: &str,
        auth: &ProviderAuth,
        base_url: Option<&str>,
        max_tokens: u32,
    ) -> Result<Self> {
        let auth_token = match &auth.api_key {
            Some(key) if !key.trim().is_empty() => key.clone(),
            _ => env::var("OPENAI_API_KEY")
                .map_err(|_| anyhow!("No OpenAI authentication configured"))?,
        };

        Ok(Self {
            http: SHARED_HTTP.clone(),
            auth_token,
            model: model.to_string(),
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            max_tokens,
        })
    }

    /// Same contract as the Anthropic client: `Err` only before streaming.
    pub async fn generate_stream_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        tx: &UnboundedSender<StreamChunk>,
    ) -> Result<()> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let req = OpenAIRequest {
            model: &self.model,
            messages: to_openai_messages(messages),
            stream: true,
            max_tokens: self.max_tokens,
            tools: tools.iter().map(OpenAITool::from).collect(),
        };
        let resp = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.auth_token))
            .header("Content-Type", "application/json")
            .json(&req)
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            let detail: String = body.chars().take(800).collect();
            if detail.trim().is_empty() {
                return Err(anyhow!("openai error: {}", status));
            }
            return Err(anyhow!("openai error: {}\n{}", status, detail));
        }

        let mut decoder = StreamDecoder::default();
        if relay_events(resp.bytes_stream(), tx, |event| decoder.decode_event(event)).await {
            return Ok(());
        }

        for out in decoder.finish(None) {
            let _ = tx.send(out);
        }
        Ok(())
    }
}

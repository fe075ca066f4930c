//! Anthropic Messages API client with streamed text and native tool use.

use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use shared::agent_api::{ChatMessage, StreamChunk, ToolDefinition};
use shared::settings::ProviderAuth;
use std::collections::HashMap;
use std::env;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::sse::SseEvent;
use crate::{relay_events, tool_input, SHARED_HTTP};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Value>,
    stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<AnthropicTool<'a>>,
}

/// Anthropic tool declaration
#[derive(Debug, Serialize)]
struct AnthropicTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a Value,
}

impl<'a> From<&'a ToolDefinition> for AnthropicTool<'a> {
    fn from(def: &'a ToolDefinition) -> Self {
        Self {
            name: &def.name,
            description: &def.description,
            input_schema: &def.input_schema,
        }
    }
}

/// Split out the system prompt and convert the rest to Anthropic messages.
///
/// Messages carrying `content_parts` are sent as block arrays; everything
/// else as plain text.
fn to_anthropic_messages(messages: &[ChatMessage]) -> (Option<String>, Vec<Value>) {
    let mut system_prompt = String::new();
    let mut out = Vec::with_capacity(messages.len());

    for m in messages {
        if m.role == "system" {
            if !system_prompt.is_empty() {
                system_prompt.push_str("\n\n");
            }
            system_prompt.push_str(&m.content);
            continue;
        }
        let content = match &m.content_parts {
            Some(parts) => Value::Array(parts.clone()),
            None => Value::String(m.content.clone()),
        };
        out.push(serde_json::json!({ "role": m.role, "content": content }));
    }

    let system = if system_prompt.trim().is_empty() {
        None
    } else {
        Some(system_prompt)
    };
    (system, out)
}

#[derive(Debug)]
struct PartialToolUse {
    id: String,
    name: String,
    input_json: String,
}

/// Stream decoder: assembles tool_use blocks by content index.
#[derive(Debug, Default)]
struct StreamDecoder {
    tool_blocks: HashMap<usize, PartialToolUse>,
    stop_reason: Option<String>,
}

impl StreamDecoder {
    /// Translate one `data:` payload. Returns the chunks it produced.
    fn decode_event(&mut self, event: &SseEvent) -> Vec<StreamChunk> {
        match serde_json::from_str::<Value>(&event.data) {
            Ok(payload) => self.decode(&payload),
            Err(_) => {
                debug!(data = %event.data, "skipping unparseable anthropic event");
                Vec::new()
            }
        }
    }

    fn decode(&mut self, event: &Value) -> Vec<StreamChunk> {
        let mut chunks = Vec::new();
        let index = event["index"].as_u64().unwrap_or(0) as usize;

        match event["type"].as_str().unwrap_or("") {
            "content_block_start" => {
                let block = &event["content_block"];
                if block["type"] == "tool_use" {
                    let id = block["id"].as_str().unwrap_or("").to_string();
                    let name = block["name"].as_str().unwrap_or("").to_string();
                    chunks.push(StreamChunk::ToolUseStart {
                        id: id.clone(),
                        name: name.clone(),
                    });
                    self.tool_blocks.insert(
                        index,
                        PartialToolUse {
                            id,
                            name,
                            input_json: String::new(),
                        },
                    );
                }
            }
            "content_block_delta" => {
                let delta = &event["delta"];
                match delta["type"].as_str().unwrap_or("") {
                    "text_delta" => {
                        if let Some(text) = delta["text"].as_str() {
                            if !text.is_empty() {
                                chunks.push(StreamChunk::Text(text.to_string()));
                            }
                        }
                    }
                    "input_json_delta" => {
                        if let (Some(partial), Some(block)) = (
                            delta["partial_json"].as_str(),
                            self.tool_blocks.get_mut(&index),
                        ) {
                            block.input_json.push_str(partial);
                            chunks.push(StreamChunk::ToolInputDelta(partial.to_string()));
                        }
                    }
                    _ => {}
                }
            }
            "content_block_stop" => {
                if let Some(block) = self.tool_blocks.remove(&index) {
                    let input = tool_input(&block.name, &block.input_json);
                    chunks.push(StreamChunk::ToolUseComplete {
                        id: block.id,
                        name: block.name,
                        input,
                    });
                }
            }
            "message_delta" => {
                if let Some(reason) = event["delta"]["stop_reason"].as_str() {
                    self.stop_reason = Some(reason.to_string());
                }
            }
            "message_stop" => {
                chunks.push(StreamChunk::Done {
                    stop_reason: self.stop_reason.take(),
                });
            }
            "error" => {
                let message = event["error"]["message"]
                    .as_str()
                    .unwrap_or("unknown streaming error");
                chunks.push(StreamChunk::Error(format!("anthropic error: {}", message)));
            }
            // message_start and ping carry nothing we display
            _ => {}
        }

        chunks
    }
}

pub struct AnthropicClient {
    http: Client,
    auth_token: String,
    model: String,
    base_url: String,
    max_tokens: u32,
}

impl AnthropicClient {
    pub fn from_auth(
        model: &str,
        auth: &ProviderAuth,
        base_url: Option<&str>,
        max_tokens: u32,
    ) -> Result<Self> {
        let auth_token = match &auth.api_key {
            Some(key) if !key.trim().is_empty() => key.clone(),
            _ => env::var("ANTHROPIC_API_KEY")
                .map_err(|_| anyhow!("No Anthropic authentication configured"))?,
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

    /// Stream a reply, offering `tools` to the model.
    ///
    /// Contract: if the request fails before any chunk is sent, returns
    /// `Err(...)` so the router may fall back. Once streaming has started,
    /// failures arrive as `StreamChunk::Error` and the method returns `Ok(())`.
    pub async fn generate_stream_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        tx: &UnboundedSender<StreamChunk>,
    ) -> Result<()> {
        let url = format!("{}/v1/messages", self.base_url);
        let (system, anthropic_messages) = to_anthropic_messages(messages);
        let req = AnthropicRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system,
            messages: anthropic_messages,
            stream: true,
            tools: tools.iter().map(AnthropicTool::from).collect(),
        };

        let resp = self
            .http
            .post(&url)
            .header("x-api-key", &self.auth_token)
            .header("anthropic-version", API_VERSION)
            .header("Content-Type", "application/json")
            .json(&req)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            let detail: String = body.chars().take(800).collect();
            if detail.trim().is_empty() {
                return Err(anyhow!("anthropic error: {}", status));
            }
            return Err(anyhow!("anthropic error: {}\n{}", status, detail));
        }

        let mut decoder = StreamDecoder::default();
        if relay_events(resp.bytes_stream(), tx, |event| decoder.decode_event(event)).await {
            return Ok(());
        }

        // Connection closed without message_stop
        let _ = tx.send(StreamChunk::Done {
            stop_reason: decoder.stop_reason.take(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared::tool::{ToolCall, ToolResult};

    fn decode_all(decoder: &mut StreamDecoder, events: &[Value]) -> Vec<StreamChunk> {
        events.iter().flat_map(|e| decoder.decode(e)).collect()
    }

    #[test]
    fn test_text_stream() {
        let mut decoder = StreamDecoder::default();
        let chunks = decode_all(
            &mut decoder,
            &[
                json!({"type": "message_start", "message": {}}),
                json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
                json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Hel"}}),
                json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "lo"}}),
                json!({"type": "content_block_stop", "index": 0}),
                json!({"type": "message_delta", "delta": {"stop_reason": "end_turn"}}),
                json!({"type": "message_stop"}),
            ],
        );
        assert_eq!(
            chunks,
            vec![
                StreamChunk::Text("Hel".into()),
                StreamChunk::Text("lo".into()),
                StreamChunk::Done {
                    stop_reason: Some("end_turn".into())
                },
            ]
        );
    }

    #[test]
    fn test_tool_use_stream() {
        let mut decoder = StreamDecoder::default();
        let chunks = decode_all(
            &mut decoder,
            &[
                json!({"type": "content_block_start", "index": 1, "content_block": {"type": "tool_use", "id": "toolu_1", "name": "plot_density", "input": {}}}),
                json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": "{\"x\": "}}),
                json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": "\"mpg\"}"}}),
                json!({"type": "content_block_stop", "index": 1}),
            ],
        );
        assert_eq!(chunks.len(), 4);
        assert_eq!(
            chunks[3],
            StreamChunk::ToolUseComplete {
                id: "toolu_1".into(),
                name: "plot_density".into(),
                input: json!({"x": "mpg"}),
            }
        );
    }

    #[test]
    fn test_tool_use_without_input() {
        let mut decoder = StreamDecoder::default();
        let chunks = decode_all(
            &mut decoder,
            &[
                json!({"type": "content_block_start", "index": 0, "content_block": {"type": "tool_use", "id": "t", "name": "plot_scatter"}}),
                json!({"type": "content_block_stop", "index": 0}),
            ],
        );
        assert!(matches!(
            &chunks[1],
            StreamChunk::ToolUseComplete { input, .. } if input == &json!({})
        ));
    }

    #[test]
    fn test_error_event() {
        let mut decoder = StreamDecoder::default();
        let chunks = decoder.decode(&json!({"type": "error", "error": {"type": "overloaded_error", "message": "Overloaded"}}));
        assert_eq!(
            chunks,
            vec![StreamChunk::Error("anthropic error: Overloaded".into())]
        );
    }

    #[test]
    fn test_message_conversion() {
        let call = ToolCall {
            id: "toolu_1".into(),
            name: "plot_density".into(),
            input: json!({"x": "mpg"}),
        };
        let messages = vec![
            ChatMessage::system("You plot charts."),
            ChatMessage::user("density of mpg please"),
            ChatMessage::assistant_tool_use("", &[call]),
            ChatMessage::tool_results(&[ToolResult::success("toolu_1", "Rendered.")]),
        ];
        let (system, out) = to_anthropic_messages(&messages);
        assert_eq!(system.as_deref(), Some("You plot charts."));
        assert_eq!(out.len(), 3);
        assert_eq!(out[0]["content"], "density of mpg please");
        assert_eq!(out[1]["content"][0]["type"], "tool_use");
        assert_eq!(out[2]["role"], "user");
        assert_eq!(out[2]["content"][0]["tool_use_id"], "toolu_1");
    }

    #[test]
    fn test_request_serializes_tools() {
        let def = ToolDefinition {
            name: "plot_density".into(),
            description: "Density".into(),
            input_schema: json!({"type": "object"}),
        };
        let req = AnthropicRequest {
            model: "m",
            max_tokens: 10,
            system: None,
            messages: vec![],
            stream: true,
            tools: vec![AnthropicTool::from(&def)],
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["tools"][0]["name"], "plot_density");
        assert_eq!(value["tools"][0]["input_schema"]["type"], "object");
        assert!(value.get("system").is_none());
    }

    #[test]
    fn test_truncated_tool_input_is_kept_as_text() {
        let mut decoder = StreamDecoder::default();
        let chunks = decode_all(
            &mut decoder,
            &[
                json!({"type": "content_block_start", "index": 0, "content_block": {"type": "tool_use", "id": "t", "name": "plot_scatter"}}),
                json!({"type": "content_block_delta", "index": 0, "delta": {"type": "input_json_delta", "partial_json": "{\"x\": \"mpg\", \"y\": \"h"}}),
                json!({"type": "content_block_stop", "index": 0}),
            ],
        );
        assert_eq!(
            chunks.last(),
            Some(&StreamChunk::ToolUseComplete {
                id: "t".into(),
                name: "plot_scatter".into(),
                input: Value::String("{\"x\": \"mpg\", \"y\": \"h".into()),
            })
        );
    }

    #[tokio::test]
    async fn test_stream_without_final_blank_line() {
        let body = concat!(
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hi\"}}\n\n",
            "event: message_stop\n",
            "data: {\"type\":\"message_stop\"}",
        );
        let parts: Vec<Result<Vec<u8>, String>> = vec![Ok(body.as_bytes().to_vec())];
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut decoder = StreamDecoder::default();

        let ended =
            relay_events(futures::stream::iter(parts), &tx, |e| decoder.decode_event(e)).await;
        assert!(ended);
        assert_eq!(rx.try_recv().unwrap(), StreamChunk::Text("Hi".into()));
        assert_eq!(rx.try_recv().unwrap(), StreamChunk::Done { stop_reason: None });
    }
}

pub mod anthropic;
pub mod openai;
pub mod router;
pub mod sse;

use anyhow::Result;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde_json::Value;
use shared::agent_api::{ChatMessage, StreamChunk, ToolDefinition};
use std::fmt::Display;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

use crate::sse::{SseEvent, SseParser};

pub use router::ProviderRouter;

static SHARED_HTTP: LazyLock<Client> = LazyLock::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(120))
        .pool_max_idle_per_host(2)
        .build()
        .unwrap_or_else(|e| {
            warn!(error = %e, "HTTP client setup failed, using defaults without a timeout");
            Client::new()
        })
});

/// A model that streams replies and may ask for tools.
///
/// Contract: return `Err` only when nothing was streamed yet. Once chunks
/// have been sent, failures travel as `StreamChunk::Error` and the call
/// returns `Ok(())`. Every successful stream ends with `StreamChunk::Done`.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
        tools: Vec<ToolDefinition>,
        tx: UnboundedSender<StreamChunk>,
    ) -> Result<()>;
}

/// Parse accumulated tool arguments. Text that is not valid JSON is passed on
/// as a string so the tool can report it instead of seeing empty input.
pub(crate) fn tool_input(tool: &str, raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Default::default());
    }
    match serde_json::from_str(raw) {
        Ok(input) => input,
        Err(e) => {
            warn!(tool, error = %e, "tool arguments are not valid JSON");
            Value::String(raw.to_string())
        }
    }
}

/// Send chunks in order, stopping after `Done` or `Error`.
/// Returns whether the stream was ended.
fn forward(tx: &UnboundedSender<StreamChunk>, chunks: Vec<StreamChunk>) -> bool {
    for chunk in chunks {
        let terminal = matches!(chunk, StreamChunk::Done { .. } | StreamChunk::Error(_));
        let _ = tx.send(chunk);
        if terminal {
            return true;
        }
    }
    false
}

/// Feed an SSE response body through `decode` until it ends the stream or
/// the body runs out. A trailing event without a blank line is still decoded.
/// Returns whether `Done` or `Error` was sent.
pub(crate) async fn relay_events<S, B, E>(
    mut body: S,
    tx: &UnboundedSender<StreamChunk>,
    mut decode: impl FnMut(&SseEvent) -> Vec<StreamChunk>,
) -> bool
where
    S: Stream<Item = std::result::Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Display,
{
    let mut parser = SseParser::new();

    while let Some(chunk) = body.next().await {
        let bytes = match chunk {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = tx.send(StreamChunk::Error(format!("stream read error: {}", e)));
                return true;
            }
        };
        for event in parser.feed(bytes.as_ref()) {
            if forward(tx, decode(&event)) {
                return true;
            }
        }
    }

    match parser.finish() {
        Some(event) => forward(tx, decode(&event)),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn body(parts: &[&str]) -> impl Stream<Item = std::result::Result<Vec<u8>, String>> + Unpin {
        futures::stream::iter(
            parts
                .iter()
                .map(|p| Ok(p.as_bytes().to_vec()))
                .collect::<Vec<_>>(),
        )
    }

    fn echo(event: &SseEvent) -> Vec<StreamChunk> {
        if event.data == "end" {
            vec![StreamChunk::Done { stop_reason: None }]
        } else {
            vec![StreamChunk::Text(event.data.clone())]
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<StreamChunk>) -> Vec<StreamChunk> {
        let mut out = Vec::new();
        while let Ok(chunk) = rx.try_recv() {
            out.push(chunk);
        }
        out
    }

    #[tokio::test]
    async fn test_relay_decodes_trailing_event() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ended = relay_events(body(&["data: a\n\nda", "ta: b"]), &tx, echo).await;
        assert!(!ended);
        assert_eq!(
            drain(&mut rx),
            vec![StreamChunk::Text("a".into()), StreamChunk::Text("b".into())]
        );

        let ended = relay_events(body(&["data: a\n\n", "data: end"]), &tx, echo).await;
        assert!(ended);
        assert_eq!(
            drain(&mut rx),
            vec![
                StreamChunk::Text("a".into()),
                StreamChunk::Done { stop_reason: None }
            ]
        );
    }

    #[tokio::test]
    async fn test_relay_stops_at_terminal_chunk() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ended = relay_events(body(&["data: end\n\ndata: late\n\n"]), &tx, echo).await;
        assert!(ended);
        assert_eq!(drain(&mut rx), vec![StreamChunk::Done { stop_reason: None }]);
    }

    #[tokio::test]
    async fn test_relay_reports_read_error() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let parts: Vec<std::result::Result<Vec<u8>, String>> =
            vec![Ok(b"data: a\n\n".to_vec()), Err("reset by peer".into())];
        let ended = relay_events(futures::stream::iter(parts), &tx, echo).await;
        assert!(ended);
        let chunks = drain(&mut rx);
        assert_eq!(chunks[0], StreamChunk::Text("a".into()));
        assert!(matches!(&chunks[1], StreamChunk::Error(e) if e.contains("reset by peer")));
    }

    #[test]
    fn test_tool_input_keeps_malformed_text() {
        assert_eq!(tool_input("t", "  "), serde_json::json!({}));
        assert_eq!(tool_input("t", r#"{"x":"mpg"}"#), serde_json::json!({"x": "mpg"}));
        assert_eq!(
            tool_input("t", r#"{"x": "mpg", "y": "h"#),
            Value::String(r#"{"x": "mpg", "y": "h"#.into())
        );
    }
}

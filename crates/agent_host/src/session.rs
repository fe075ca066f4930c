//! Chat session: conversation history, the tool loop, and the live chart.
//!
//! A turn streams the model reply, runs any tools it asks for, feeds the
//! results back, and repeats until the model answers without tools or the
//! round limit is reached. The session decides nothing about charts itself.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use providers::ChatBackend;
use shared::agent_api::{ChatMessage, StreamChunk, ToolDefinition};
use shared::chart::{ChartDisplay, ChartRenderer};
use shared::dataset::Dataset;
use shared::events::SessionEvent;
use shared::settings::AppSettings;
use shared::tool::{ToolCall, ToolContext, ToolResult};
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, info, warn};

use crate::prompts::PromptDocuments;
use crate::tools::ToolRegistry;

/// What one streamed reply contained
#[derive(Debug, Default)]
struct Reply {
    text: String,
    calls: Vec<ToolCall>,
    stop_reason: Option<String>,
    error: Option<String>,
}

pub struct ChatSession {
    backend: Arc<dyn ChatBackend>,
    prompts: PromptDocuments,
    dataset: Dataset,
    renderer: Box<dyn ChartRenderer>,
    registry: ToolRegistry,
    display: ChartDisplay,
    history: Vec<ChatMessage>,
    max_tool_rounds: usize,
}

impl ChatSession {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        prompts: PromptDocuments,
        dataset: Dataset,
        renderer: Box<dyn ChartRenderer>,
        settings: &AppSettings,
    ) -> Self {
        let registry = ToolRegistry::with_chart_tools();
        info!(tools = ?registry.names(), rows = dataset.row_count(), "chat session ready");
        Self {
            backend,
            prompts,
            dataset,
            renderer,
            registry,
            display: ChartDisplay::new(),
            history: Vec::new(),
            max_tool_rounds: settings.max_tool_rounds.max(1),
        }
    }

    /// Opening message for the UI; never sent to the model
    pub fn greeting(&self) -> &str {
        &self.prompts.greeting
    }

    pub fn display(&self) -> &ChartDisplay {
        &self.display
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// Conversation so far, without the system prompt
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Forget the conversation; the live chart stays
    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Run one user turn.
    ///
    /// Events are sent in order and end with `TurnComplete`. The turn's
    /// messages join the history only once it succeeds, so an error or a
    /// dropped future leaves the conversation as it was.
    pub async fn send(
        &mut self,
        user_text: &str,
        events: &UnboundedSender<SessionEvent>,
    ) -> Result<()> {
        let mut turn = vec![ChatMessage::user(user_text)];
        info!(chars = user_text.len(), "user turn started");

        match self.run_turn(&mut turn, events).await {
            Ok(()) => {
                self.history.append(&mut turn);
                let _ = events.send(SessionEvent::TurnComplete);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "turn failed, history left unchanged");
                Err(e)
            }
        }
    }

    async fn run_turn(
        &mut self,
        turn: &mut Vec<ChatMessage>,
        events: &UnboundedSender<SessionEvent>,
    ) -> Result<()> {
        let tools = self.registry.definitions(&self.dataset);

        for round in 1..=self.max_tool_rounds {
            let reply = self.stream_reply(turn, tools.clone(), events).await?;
            debug!(
                round,
                calls = reply.calls.len(),
                stop_reason = ?reply.stop_reason,
                "reply finished"
            );

            if reply.calls.is_empty() {
                turn.push(ChatMessage::assistant(reply.text));
                return Ok(());
            }

            turn.push(ChatMessage::assistant_tool_use(&reply.text, &reply.calls));
            let results = self.run_tools(&reply.calls, events);
            turn.push(ChatMessage::tool_results(&results));
        }

        // The model still wants tools; answer without running them
        let reply = self.stream_reply(turn, tools, events).await?;
        if reply.calls.is_empty() {
            turn.push(ChatMessage::assistant(reply.text));
            return Ok(());
        }

        warn!(limit = self.max_tool_rounds, "tool round limit reached");
        let _ = events.send(SessionEvent::Diagnostic(format!(
            "⚠ stopped after {} rounds of tool calls",
            self.max_tool_rounds
        )));
        let skipped: Vec<ToolResult> = reply
            .calls
            .iter()
            .map(|call| {
                ToolResult::failure(&call.id, "Not run: tool call limit for this turn reached.")
            })
            .collect();
        turn.push(ChatMessage::assistant_tool_use(&reply.text, &reply.calls));
        turn.push(ChatMessage::tool_results(&skipped));
        Ok(())
    }

    /// Stream one model reply, forwarding text as it arrives.
    async fn stream_reply(
        &self,
        turn: &[ChatMessage],
        tools: Vec<ToolDefinition>,
        events: &UnboundedSender<SessionEvent>,
    ) -> Result<Reply> {
        let mut messages = Vec::with_capacity(self.history.len() + turn.len() + 1);
        messages.push(ChatMessage::system(&self.prompts.system_prompt));
        messages.extend(self.history.iter().chain(turn).cloned());

        let (tx, mut rx) = mpsc::unbounded_channel();
        let producer = self.backend.stream_chat(messages, tools, tx);
        let consumer = async {
            let mut reply = Reply::default();
            while let Some(chunk) = rx.recv().await {
                match chunk {
                    StreamChunk::Text(text) => {
                        reply.text.push_str(&text);
                        let _ = events.send(SessionEvent::Text(text));
                    }
                    StreamChunk::ToolUseComplete { id, name, input } => {
                        reply.calls.push(ToolCall { id, name, input });
                    }
                    StreamChunk::Done { stop_reason } => reply.stop_reason = stop_reason,
                    StreamChunk::Error(e) => {
                        reply.error.get_or_insert(e);
                    }
                    StreamChunk::ToolUseStart { .. } | StreamChunk::ToolInputDelta(_) => {}
                }
            }
            reply
        };

        let (result, reply) = tokio::join!(producer, consumer);
        result?;
        if let Some(e) = reply.error {
            return Err(anyhow!(e));
        }
        Ok(reply)
    }

    /// Run calls in request order. Failures become error results.
    fn run_tools(
        &mut self,
        calls: &[ToolCall],
        events: &UnboundedSender<SessionEvent>,
    ) -> Vec<ToolResult> {
        let mut results = Vec::with_capacity(calls.len());

        for call in calls {
            let _ = events.send(SessionEvent::ToolStarted {
                call_id: call.id.clone(),
                name: call.name.clone(),
            });

            let mut ctx = ToolContext {
                dataset: &self.dataset,
                renderer: self.renderer.as_ref(),
                display: &mut self.display,
            };
            let execution = self.registry.invoke(call, &mut ctx);

            let _ = events.send(SessionEvent::ToolFinished {
                call_id: call.id.clone(),
                name: call.name.clone(),
                success: execution.succeeded(),
                duration_ms: execution.duration_ms,
            });
            match &execution.outcome {
                Ok(_) => {
                    if let Some(live) = self.display.live() {
                        let _ = events.send(SessionEvent::ChartUpdated(live.clone()));
                    }
                }
                Err(e) => {
                    let _ = events.send(SessionEvent::tool_failure(&call.name, e));
                }
            }
            results.push(execution.to_result());
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::VecDeque;

    use crate::render::VegaLiteRenderer;

    /// One scripted step of a backend
    enum Step {
        Chunks(Vec<StreamChunk>),
        Fail(&'static str),
    }

    /// Backend replaying canned replies and recording requests
    struct ScriptedBackend {
        steps: Mutex<VecDeque<Step>>,
        requests: Mutex<Vec<(Vec<ChatMessage>, Vec<ToolDefinition>)>>,
    }

    impl ScriptedBackend {
        fn new(steps: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                steps: Mutex::new(steps.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<(Vec<ChatMessage>, Vec<ToolDefinition>)> {
            self.requests.lock().clone()
        }
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        async fn stream_chat(
            &self,
            messages: Vec<ChatMessage>,
            tools: Vec<ToolDefinition>,
            tx: UnboundedSender<StreamChunk>,
        ) -> Result<()> {
            self.requests.lock().push((messages, tools));
            let step = self.steps.lock().pop_front();
            match step {
                Some(Step::Chunks(chunks)) => {
                    for chunk in chunks {
                        let _ = tx.send(chunk);
                        tokio::task::yield_now().await;
                    }
                    Ok(())
                }
                Some(Step::Fail(msg)) => Err(anyhow!(msg)),
                None => Err(anyhow!("script exhausted")),
            }
        }
    }

    fn text(s: &str) -> StreamChunk {
        StreamChunk::Text(s.to_string())
    }

    fn done() -> StreamChunk {
        StreamChunk::Done {
            stop_reason: Some("end_turn".into()),
        }
    }

    fn tool(id: &str, name: &str, input: serde_json::Value) -> StreamChunk {
        StreamChunk::ToolUseComplete {
            id: id.into(),
            name: name.into(),
            input,
        }
    }

    fn session(backend: Arc<ScriptedBackend>, max_tool_rounds: usize) -> ChatSession {
        let dataset = Dataset::mtcars().unwrap();
        let prompts = PromptDocuments::builtin(&dataset);
        let settings = AppSettings {
            max_tool_rounds,
            ..AppSettings::default()
        };
        ChatSession::new(
            backend,
            prompts,
            dataset,
            Box::new(VegaLiteRenderer::new()),
            &settings,
        )
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    #[tokio::test]
    async fn test_text_reply_streams_in_order() {
        let backend = ScriptedBackend::new(vec![Step::Chunks(vec![
            text("The mtcars "),
            text("table has "),
            text("11 columns."),
            done(),
        ])]);
        let mut session = session(backend.clone(), 5);
        let (tx, mut rx) = mpsc::unbounded_channel();

        session.send("What can you plot?", &tx).await.unwrap();

        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![
                SessionEvent::Text("The mtcars ".into()),
                SessionEvent::Text("table has ".into()),
                SessionEvent::Text("11 columns.".into()),
                SessionEvent::TurnComplete,
            ]
        );
        assert_eq!(session.history().len(), 2);
        assert_eq!(session.history()[1].content, "The mtcars table has 11 columns.");

        // System prompt first, greeting never sent, both tools offered
        let requests = backend.requests();
        let (messages, tools) = &requests[0];
        assert_eq!(messages[0].role, "system");
        assert!(messages[0].content.contains("plot_scatter"));
        assert!(!messages
            .iter()
            .any(|m| m.content.contains(session.greeting())));
        assert_eq!(tools.len(), 2);
    }

    #[tokio::test]
    async fn test_tool_call_updates_chart_and_feeds_result_back() {
        let backend = ScriptedBackend::new(vec![
            Step::Chunks(vec![
                text("Plotting."),
                tool(
                    "toolu_1",
                    "plot_scatter",
                    json!({"x": "mpg", "y": "hp", "color": "gear"}),
                ),
                done(),
            ]),
            Step::Chunks(vec![text("Cars with more gears..."), done()]),
        ]);
        let mut session = session(backend.clone(), 5);
        let (tx, mut rx) = mpsc::unbounded_channel();

        session.send("hp vs mpg by gear", &tx).await.unwrap();

        let live = session.display().live().unwrap();
        assert_eq!(live.revision, 1);
        assert_eq!(live.spec.group_count(), 3);

        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::ToolFinished { success: true, name, .. } if name == "plot_scatter"
        )));
        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::ChartUpdated(chart) if chart.revision == 1)));
        assert_eq!(events.last(), Some(&SessionEvent::TurnComplete));

        // Second request carries the tool result
        let requests = backend.requests();
        assert_eq!(requests.len(), 2);
        let last = requests[1].0.last().unwrap();
        let part = &last.content_parts.as_ref().unwrap()[0];
        assert_eq!(part["tool_use_id"], "toolu_1");
        assert_eq!(part["is_error"], false);
        assert!(part["content"].as_str().unwrap().contains("3 color groups"));

        // user, assistant(tool_use), user(tool_result), assistant
        assert_eq!(session.history().len(), 4);
    }

    #[tokio::test]
    async fn test_failed_tool_reports_and_keeps_display() {
        let backend = ScriptedBackend::new(vec![
            Step::Chunks(vec![tool("t1", "plot_density", json!({"x": "mpg"})), done()]),
            Step::Chunks(vec![text("Here is mpg."), done()]),
            Step::Chunks(vec![
                tool("t2", "plot_scatter", json!({"x": "nonexistent", "y": "hp"})),
                done(),
            ]),
            Step::Chunks(vec![text("That column does not exist."), done()]),
        ]);
        let mut session = session(backend.clone(), 5);
        let (tx, mut rx) = mpsc::unbounded_channel();

        session.send("density of mpg", &tx).await.unwrap();
        drain(&mut rx);
        session.send("scatter nonexistent vs hp", &tx).await.unwrap();

        let live = session.display().live().unwrap();
        assert_eq!(live.revision, 1);
        assert_eq!(live.spec.x, "mpg");

        let events = drain(&mut rx);
        assert!(events.contains(&SessionEvent::Diagnostic(
            "⚠ plot_scatter failed: unknown column 'nonexistent'".into()
        )));
        assert!(!events
            .iter()
            .any(|e| matches!(e, SessionEvent::ChartUpdated(_))));

        let requests = backend.requests();
        let part = &requests[3].0.last().unwrap().content_parts.as_ref().unwrap()[0];
        assert_eq!(part["tool_use_id"], "t2");
        assert_eq!(part["is_error"], true);
    }

    #[tokio::test]
    async fn test_several_calls_run_in_order() {
        let backend = ScriptedBackend::new(vec![
            Step::Chunks(vec![
                tool("a", "plot_density", json!({"x": "wt"})),
                tool("b", "plot_density", json!({"x": "qsec", "facet": "gear"})),
                done(),
            ]),
            Step::Chunks(vec![done()]),
        ]);
        let mut session = session(backend, 5);
        let (tx, mut rx) = mpsc::unbounded_channel();
        session.send("two densities", &tx).await.unwrap();

        let live = session.display().live().unwrap();
        assert_eq!(live.revision, 2);
        assert_eq!(live.spec.x, "qsec");
        assert_eq!(live.spec.panel_count(), 3);

        let started: Vec<String> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                SessionEvent::ToolStarted { call_id, .. } => Some(call_id),
                _ => None,
            })
            .collect();
        assert_eq!(started, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_backend_error_discards_turn() {
        let backend = ScriptedBackend::new(vec![
            Step::Chunks(vec![text("Hello."), done()]),
            Step::Fail("anthropic error: 529 Overloaded"),
        ]);
        let mut session = session(backend, 5);
        let (tx, _rx) = mpsc::unbounded_channel();

        session.send("hi", &tx).await.unwrap();
        let err = session.send("plot mpg", &tx).await.unwrap_err();
        assert!(err.to_string().contains("Overloaded"));
        assert_eq!(session.history().len(), 2);
    }

    #[tokio::test]
    async fn test_stream_error_fails_turn() {
        let backend = ScriptedBackend::new(vec![Step::Chunks(vec![
            text("Partial"),
            StreamChunk::Error("stream read error: reset".into()),
        ])]);
        let mut session = session(backend, 5);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let err = session.send("hi", &tx).await.unwrap_err();
        assert!(err.to_string().contains("reset"));
        assert!(session.history().is_empty());
        assert!(!drain(&mut rx).contains(&SessionEvent::TurnComplete));
    }

    #[tokio::test]
    async fn test_error_midway_through_tool_loop_keeps_history() {
        let backend = ScriptedBackend::new(vec![
            Step::Chunks(vec![tool("t1", "plot_density", json!({"x": "mpg"})), done()]),
            Step::Fail("connection reset"),
        ]);
        let mut session = session(backend, 5);
        let (tx, _rx) = mpsc::unbounded_channel();

        assert!(session.send("density", &tx).await.is_err());
        assert!(session.history().is_empty());
        // The chart drawn before the failure stays on display
        assert_eq!(session.display().revision(), 1);
    }

    #[tokio::test]
    async fn test_tool_round_limit() {
        let call = || {
            Step::Chunks(vec![tool("again", "plot_density", json!({"x": "mpg"})), done()])
        };
        let backend = ScriptedBackend::new(vec![call(), call(), call()]);
        let mut session = session(backend.clone(), 2);
        let (tx, mut rx) = mpsc::unbounded_channel();

        session.send("loop forever", &tx).await.unwrap();

        assert_eq!(backend.requests().len(), 3);
        assert_eq!(session.display().revision(), 2);
        let events = drain(&mut rx);
        assert!(events.contains(&SessionEvent::Diagnostic(
            "⚠ stopped after 2 rounds of tool calls".into()
        )));
        let last = session.history().last().unwrap();
        assert_eq!(last.content_parts.as_ref().unwrap()[0]["is_error"], true);
    }
}

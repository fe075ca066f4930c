//! State management for the Chart Chat app
//!
//! AppState owns the chat session and the side panels. Turns run on a
//! background runtime; the UI thread drains their events every frame.

use std::sync::mpsc::{self as std_mpsc, Receiver};
use std::sync::Arc;
use std::time::Instant;

use agent_host::{ChatSession, PromptDocuments, VegaLiteRenderer};
use anyhow::{Context, Result};
use futures::future::{AbortHandle, Abortable};
use providers::{ChatBackend, ProviderRouter};
use shared::chart::ChartRenderer;
use shared::dataset::Dataset;
use shared::events::SessionEvent;
use shared::settings::AppSettings;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{info, warn};
use viewers::{ChartViewer, DatasetViewer, PanelTab};

use crate::types::*;
use crate::utils::*;

pub struct AppState {
    pub settings: AppSettings,
    runtime: tokio::runtime::Runtime,
    session: Arc<tokio::sync::Mutex<ChatSession>>,
    pub entries: Vec<ChatEntry>,
    pub input_text: String,
    pub is_thinking: bool,
    pub thinking_started_at: Option<Instant>,
    /// One-line progress note (running tool, last tool time)
    pub status: Option<String>,
    events_rx: Option<UnboundedReceiver<SessionEvent>>,
    result_rx: Option<Receiver<TurnOutcome>>,
    abort_handle: Option<AbortHandle>,
    /// Assistant entry currently receiving streamed text
    streaming_entry: Option<usize>,
    pub chart_viewer: ChartViewer,
    pub dataset_viewer: DatasetViewer,
    pub panel_tab: PanelTab,
}

impl AppState {
    /// Build the app around the configured providers
    pub fn new(settings: AppSettings) -> Result<Self> {
        let dataset = Dataset::mtcars()?;
        let prompts = PromptDocuments::load(&settings.prompts, &dataset)?;
        let renderer = match settings.charts.output_dir.clone().or_else(default_chart_dir) {
            Some(dir) => VegaLiteRenderer::with_output_dir(dir),
            None => VegaLiteRenderer::new(),
        };
        match renderer.output_dir() {
            Some(dir) => info!(dir = %dir.display(), "chart pages will be written"),
            None => info!("chart pages kept in memory"),
        }

        let router = ProviderRouter::new(settings.model.clone());
        info!(provider = router.active_provider().unwrap_or("none"), "preferred provider");
        let backend: Arc<dyn ChatBackend> = Arc::new(router);
        Self::with_backend(settings, backend, dataset, prompts, Box::new(renderer))
    }

    pub fn with_backend(
        settings: AppSettings,
        backend: Arc<dyn ChatBackend>,
        dataset: Dataset,
        prompts: PromptDocuments,
        renderer: Box<dyn ChartRenderer>,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .context("Failed to start async runtime")?;

        let dataset_viewer = DatasetViewer::new(&dataset);
        let session = ChatSession::new(backend, prompts, dataset, renderer, &settings);
        let entries = vec![ChatEntry::new(Role::Assistant, session.greeting())];

        Ok(Self {
            settings,
            runtime,
            session: Arc::new(tokio::sync::Mutex::new(session)),
            entries,
            input_text: String::new(),
            is_thinking: false,
            thinking_started_at: None,
            status: None,
            events_rx: None,
            result_rx: None,
            abort_handle: None,
            streaming_entry: None,
            chart_viewer: ChartViewer::new(),
            dataset_viewer,
            panel_tab: PanelTab::Chart,
        })
    }

    /// Send the input box as a new user turn
    pub fn send_message(&mut self) {
        let text = self.input_text.trim().to_string();
        if text.is_empty() || self.is_thinking {
            return;
        }
        self.input_text.clear();
        self.entries.push(ChatEntry::new(Role::User, text.clone()));

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (result_tx, result_rx) = std_mpsc::channel();
        let (abort_handle, abort_reg) = AbortHandle::new_pair();
        let session = Arc::clone(&self.session);

        self.runtime.spawn(async move {
            let turn = Abortable::new(
                async move {
                    let mut session = session.lock().await;
                    session.send(&text, &events_tx).await
                },
                abort_reg,
            );
            let outcome = match turn.await {
                Ok(Ok(())) => TurnOutcome::Completed,
                Ok(Err(e)) => TurnOutcome::Failed(format!("{:#}", e)),
                Err(_) => TurnOutcome::Cancelled,
            };
            let _ = result_tx.send(outcome);
        });

        self.events_rx = Some(events_rx);
        self.result_rx = Some(result_rx);
        self.abort_handle = Some(abort_handle);
        self.streaming_entry = None;
        self.is_thinking = true;
        self.thinking_started_at = Some(Instant::now());
        self.status = None;
    }

    /// Stop the running turn; the conversation keeps what it had before it
    pub fn cancel(&mut self) {
        if let Some(handle) = self.abort_handle.take() {
            info!("turn cancelled by user");
            handle.abort();
        }
    }

    /// Drain session events and pick up the turn result (non-blocking)
    pub fn poll_session(&mut self) {
        self.drain_events();

        let outcome = match &self.result_rx {
            Some(rx) => match rx.try_recv() {
                Ok(outcome) => outcome,
                Err(std_mpsc::TryRecvError::Empty) => return,
                Err(std_mpsc::TryRecvError::Disconnected) => {
                    TurnOutcome::Failed("background task ended without a result".into())
                }
            },
            None => return,
        };

        // Events sent just before the result
        self.drain_events();
        self.finish_turn(outcome);
    }

    fn drain_events(&mut self) {
        let Some(rx) = self.events_rx.as_mut() else {
            return;
        };
        let mut pending = Vec::new();
        while let Ok(event) = rx.try_recv() {
            pending.push(event);
        }
        for event in pending {
            self.apply_event(event);
        }
    }

    fn apply_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Text(fragment) => match self.streaming_entry {
                Some(i) if i < self.entries.len() => self.entries[i].content.push_str(&fragment),
                _ => {
                    self.entries.push(ChatEntry::new(Role::Assistant, fragment));
                    self.streaming_entry = Some(self.entries.len() - 1);
                }
            },
            SessionEvent::ToolStarted { name, .. } => {
                self.streaming_entry = None;
                self.status = Some(format!("Running {}...", name));
            }
            SessionEvent::ToolFinished {
                name,
                success,
                duration_ms,
                ..
            } => {
                let verb = if success { "finished" } else { "failed" };
                self.status = Some(format!("{} {} in {} ms", name, verb, duration_ms));
            }
            SessionEvent::ChartUpdated(chart) => {
                let page = chart.rendered.html_path.clone();
                self.chart_viewer.set_chart(chart);
                self.panel_tab = PanelTab::Chart;
                if self.settings.charts.auto_open {
                    if let Some(path) = page {
                        if let Err(e) = open::that(&path) {
                            warn!(error = %e, path = %path.display(), "could not open chart page");
                        }
                    }
                }
            }
            SessionEvent::Diagnostic(note) => {
                self.streaming_entry = None;
                self.entries.push(ChatEntry::new(Role::Diagnostic, note));
            }
            SessionEvent::TurnComplete => {
                self.streaming_entry = None;
            }
        }
    }

    fn finish_turn(&mut self, outcome: TurnOutcome) {
        match outcome {
            TurnOutcome::Completed => {}
            TurnOutcome::Failed(error) => {
                warn!(error = %error, "turn failed");
                self.entries.push(
                    ChatEntry::new(Role::Assistant, format_error_message(&error))
                        .with_details(error),
                );
            }
            TurnOutcome::Cancelled => {
                self.entries
                    .push(ChatEntry::new(Role::Diagnostic, "Stopped. Nothing from that turn was kept."));
            }
        }
        self.events_rx = None;
        self.result_rx = None;
        self.abort_handle = None;
        self.streaming_entry = None;
        self.is_thinking = false;
        self.thinking_started_at = None;
        self.status = None;
    }

    /// Start over: forget the conversation, keep the chart
    pub fn clear_chat(&mut self) {
        if self.is_thinking {
            return;
        }
        let session = Arc::clone(&self.session);
        let greeting = self.runtime.block_on(async move {
            let mut session = session.lock().await;
            session.clear_history();
            session.greeting().to_string()
        });
        self.entries = vec![ChatEntry::new(Role::Assistant, greeting)];
        self.status = None;
    }

    /// Seconds since the running turn started
    pub fn thinking_secs(&self) -> u64 {
        self.thinking_started_at
            .map_or(0, |started| started.elapsed().as_secs())
    }
}

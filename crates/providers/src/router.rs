use crate::anthropic::AnthropicClient;
use crate::openai::OpenAIClient;
use crate::ChatBackend;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::agent_api::{ChatMessage, StreamChunk, ToolDefinition};
use shared::settings::ModelProvider;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

pub struct ProviderRouter {
    config: ModelProvider,
}

impl ProviderRouter {
    pub fn new(config: ModelProvider) -> Self {
        Self { config }
    }

    /// Returns the name of the first preferred provider.
    pub fn active_provider(&self) -> Option<&str> {
        self.config.provider_preference.first().map(|s| s.as_str())
    }

    async fn stream_with(
        &self,
        provider: &str,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        tx: &UnboundedSender<StreamChunk>,
    ) -> Result<()> {
        match provider {
            "anthropic" => {
                let client = AnthropicClient::from_auth(
                    &self.config.anthropic_model,
                    &self.config.anthropic_auth,
                    self.config.anthropic_base_url.as_deref(),
                    self.config.max_tokens,
                )?;
                client.generate_stream_with_tools(messages, tools, tx).await
            }
            "openai" => {
                let client = OpenAIClient::from_auth(
                    &self.config.openai_model,
                    &self.config.openai_auth,
                    self.config.openai_base_url.as_deref(),
                    self.config.max_tokens,
                )?;
                client.generate_stream_with_tools(messages, tools, tx).await
            }
            other => Err(anyhow!("Unknown provider: {}", other)),
        }
    }
}

#[async_trait]
impl ChatBackend for ProviderRouter {
    /// Streaming generation with provider fallback.
    ///
    /// A provider that fails before streaming starts is skipped in favour of
    /// the next one in `provider_preference`.
    async fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
        tools: Vec<ToolDefinition>,
        tx: UnboundedSender<StreamChunk>,
    ) -> Result<()> {
        let mut last_error = None;

        for provider in self.config.provider_preference.iter() {
            match self.stream_with(provider, &messages, &tools, &tx).await {
                Ok(()) => {
                    info!(provider = %provider, "chat stream finished");
                    return Ok(());
                }
                Err(e) => {
                    warn!(provider = %provider, error = %e, "provider failed, trying next");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow!("No providers configured")))
    }
}

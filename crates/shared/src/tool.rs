//! Tool contract between the chat agent and the host-side chart functions.
//!
//! The agent only ever sees tool names and JSON schemas. Each call arrives as
//! a [`ToolCall`], is consumed once by the matching [`Tool`], and is answered
//! with a [`ToolResult`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::agent_api::ToolDefinition;
use crate::chart::{ChartDisplay, ChartRenderer, ChartSpec, RenderError};
use crate::dataset::{Dataset, DatasetError};

pub const PLOT_SCATTER: &str = "plot_scatter";
pub const PLOT_DENSITY: &str = "plot_density";

/// A structured, agent-initiated invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned id, echoed back in the result
    pub id: String,
    pub name: String,
    pub input: Value,
}

/// What the agent is told about a call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    pub fn failure(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: content.into(),
            is_error: true,
        }
    }

    /// Anthropic-style `tool_result` content block
    pub fn to_content_part(&self) -> Value {
        serde_json::json!({
            "type": "tool_result",
            "tool_use_id": self.call_id,
            "content": self.content,
            "is_error": self.is_error,
        })
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("invalid parameters for {tool}: {message}")]
    InvalidParameters { tool: String, message: String },

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error("invalid smoothing method '{method}' (expected \"lm\", \"loess\" or \"auto\")")]
    InvalidSmoothingMethod { method: String },

    #[error("rendering failed: {0}")]
    Render(#[from] RenderError),
}

/// What a tool may touch while it runs
pub struct ToolContext<'a> {
    pub dataset: &'a Dataset,
    pub renderer: &'a dyn ChartRenderer,
    pub display: &'a mut ChartDisplay,
}

/// A host-side chart function the agent can call
pub trait Tool: Send + Sync {
    /// Name the agent calls the tool by
    fn name(&self) -> &'static str;

    /// Free-text description for model consumption
    fn description(&self) -> &'static str;

    /// JSON schema of the parameters
    fn input_schema(&self, dataset: &Dataset) -> Value;

    /// Validate parameters and derive the chart they describe
    fn build_spec(&self, input: &Value, dataset: &Dataset) -> Result<ChartSpec, ToolError>;

    fn definition(&self, dataset: &Dataset) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(dataset),
        }
    }

    /// Build, render, then replace the displayed chart.
    ///
    /// The display is only written once rendering has succeeded.
    fn execute(&self, input: &Value, ctx: &mut ToolContext<'_>) -> Result<String, ToolError> {
        let spec = self.build_spec(input, ctx.dataset)?;
        let rendered = ctx.renderer.render(&spec, ctx.dataset)?;
        let live = ctx.display.replace(spec, rendered);
        Ok(format!("Rendered {}.", live.spec.describe()))
    }
}

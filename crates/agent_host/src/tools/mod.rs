//! Tool registry for agent tool calls.
//!
//! The registry owns the chart tools, hands their definitions to the
//! provider, and runs calls. Every failure is caught here and turned into a
//! [`ToolExecution`] the session can report; nothing escapes as a panic or
//! an early return.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use shared::agent_api::ToolDefinition;
use shared::dataset::Dataset;
use shared::tool::{Tool, ToolCall, ToolContext, ToolError, ToolResult};
use tracing::{info, warn};

pub mod density;
pub mod scatter;

pub use density::PlotDensity;
pub use scatter::PlotScatter;

/// Outcome of one tool call
#[derive(Debug)]
pub struct ToolExecution {
    pub call_id: String,
    pub tool: String,
    pub duration_ms: u64,
    /// Success text for the agent, or the error that stopped the call
    pub outcome: Result<String, ToolError>,
}

impl ToolExecution {
    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Result block fed back to the agent
    pub fn to_result(&self) -> ToolResult {
        match &self.outcome {
            Ok(text) => ToolResult::success(&self.call_id, text),
            Err(e) => ToolResult::failure(&self.call_id, e.to_string()),
        }
    }
}

/// Registry of the tools the agent may call
pub struct ToolRegistry {
    tools: HashMap<&'static str, Arc<dyn Tool>>,
    /// Registration order, so definitions are stable across requests
    order: Vec<&'static str>,
}

impl ToolRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Registry holding `plot_scatter` and `plot_density`
    pub fn with_chart_tools() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(PlotScatter));
        registry.register(Arc::new(PlotDensity));
        registry
    }

    /// Register a tool, replacing any tool of the same name
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name();
        if self.tools.insert(name, tool).is_none() {
            self.order.push(name);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn names(&self) -> &[&'static str] {
        &self.order
    }

    /// Definitions to offer the agent, in registration order
    pub fn definitions(&self, dataset: &Dataset) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.definition(dataset))
            .collect()
    }

    /// Run one call. The display in `ctx` is only touched on success.
    pub fn invoke(&self, call: &ToolCall, ctx: &mut ToolContext<'_>) -> ToolExecution {
        let start = Instant::now();

        let outcome = match self.tools.get(call.name.as_str()) {
            Some(tool) => tool.execute(&call.input, ctx),
            None => Err(ToolError::UnknownTool {
                name: call.name.clone(),
            }),
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        match &outcome {
            Ok(summary) => info!(
                tool = %call.name,
                call_id = %call.id,
                duration_ms,
                "{}",
                summary
            ),
            Err(e) => warn!(
                tool = %call.name,
                call_id = %call.id,
                input = %call.input,
                error = %e,
                "tool call failed"
            ),
        }

        ToolExecution {
            call_id: call.id.clone(),
            tool: call.name.clone(),
            duration_ms,
            outcome,
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::with_chart_tools()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared::chart::{ChartDisplay, ChartRenderer, ChartSpec, RenderError, RenderedChart};

    /// Renderer that records nothing and never touches the filesystem
    struct StubRenderer {
        fail: bool,
    }

    impl ChartRenderer for StubRenderer {
        fn render(&self, spec: &ChartSpec, _dataset: &Dataset) -> Result<RenderedChart, RenderError> {
            if self.fail {
                return Err(RenderError::MissingColumn(spec.x.clone()));
            }
            Ok(RenderedChart {
                vega_lite: json!({"mark": "point"}),
                html_path: None,
            })
        }
    }

    fn call(name: &str, input: serde_json::Value) -> ToolCall {
        ToolCall {
            id: "toolu_1".into(),
            name: name.into(),
            input,
        }
    }

    #[test]
    fn test_registry_lists_both_tools() {
        let registry = ToolRegistry::with_chart_tools();
        assert_eq!(registry.names(), &["plot_scatter", "plot_density"]);

        let dataset = Dataset::mtcars().unwrap();
        let defs = registry.definitions(&dataset);
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].name, "plot_scatter");
        assert_eq!(defs[1].input_schema["required"], json!(["x"]));
        assert!(registry.get("plot_density").is_some());
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut registry = ToolRegistry::with_chart_tools();
        registry.register(Arc::new(PlotScatter));
        assert_eq!(registry.names().len(), 2);
    }

    #[test]
    fn test_successful_call_updates_display() {
        let registry = ToolRegistry::with_chart_tools();
        let dataset = Dataset::mtcars().unwrap();
        let renderer = StubRenderer { fail: false };
        let mut display = ChartDisplay::new();
        let mut ctx = ToolContext {
            dataset: &dataset,
            renderer: &renderer,
            display: &mut display,
        };

        let exec = registry.invoke(
            &call("plot_scatter", json!({"x": "mpg", "y": "hp", "color": "gear"})),
            &mut ctx,
        );
        assert!(exec.succeeded());
        let result = exec.to_result();
        assert!(!result.is_error);
        assert_eq!(
            result.content,
            "Rendered scatter plot of hp vs mpg (3 color groups by gear)."
        );
        assert_eq!(display.revision(), 1);
        assert_eq!(display.live().unwrap().spec.group_count(), 3);
    }

    #[test]
    fn test_failures_leave_display_unchanged() {
        let registry = ToolRegistry::with_chart_tools();
        let dataset = Dataset::mtcars().unwrap();
        let ok = StubRenderer { fail: false };
        let mut display = ChartDisplay::new();
        {
            let mut ctx = ToolContext {
                dataset: &dataset,
                renderer: &ok,
                display: &mut display,
            };
            assert!(registry
                .invoke(&call("plot_density", json!({"x": "mpg"})), &mut ctx)
                .succeeded());
        }

        let broken = StubRenderer { fail: true };
        let cases = [
            (call("plot_scatter", json!({"x": "nonexistent", "y": "hp"})), &ok),
            (call("plot_pie", json!({"x": "mpg"})), &ok),
            (call("plot_density", json!({"x": "wt"})), &broken),
        ];
        for (c, renderer) in cases {
            let mut ctx = ToolContext {
                dataset: &dataset,
                renderer,
                display: &mut display,
            };
            let exec = registry.invoke(&c, &mut ctx);
            assert!(!exec.succeeded());
            assert!(exec.to_result().is_error);
        }

        // Still the first density chart
        assert_eq!(display.revision(), 1);
        assert_eq!(display.live().unwrap().spec.x, "mpg");
    }

    #[test]
    fn test_unknown_tool_message() {
        let registry = ToolRegistry::with_chart_tools();
        let dataset = Dataset::mtcars().unwrap();
        let renderer = StubRenderer { fail: false };
        let mut display = ChartDisplay::new();
        let mut ctx = ToolContext {
            dataset: &dataset,
            renderer: &renderer,
            display: &mut display,
        };
        let exec = registry.invoke(&call("plot_pie", json!({})), &mut ctx);
        assert_eq!(exec.tool, "plot_pie");
        assert_eq!(exec.to_result().content, "unknown tool: plot_pie");
    }
}

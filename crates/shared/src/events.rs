//! Events a chat session emits towards the display surface.

use serde::{Deserialize, Serialize};

use crate::chart::LiveChart;

/// Ordered stream of updates for one user turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SessionEvent {
    /// Next fragment of assistant text, append-only
    Text(String),
    /// The agent asked for a tool
    ToolStarted { call_id: String, name: String },
    /// A tool call finished (either way)
    ToolFinished {
        call_id: String,
        name: String,
        success: bool,
        duration_ms: u64,
    },
    /// A tool call replaced the displayed chart
    ChartUpdated(LiveChart),
    /// Short failure note for the visible conversation
    Diagnostic(String),
    /// The turn is over; no more events until the next message
    TurnComplete,
}

impl SessionEvent {
    /// Diagnostic line for a failed tool call
    pub fn tool_failure(tool: &str, error: &impl std::fmt::Display) -> Self {
        SessionEvent::Diagnostic(format!("⚠ {} failed: {}", tool, error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_failure_diagnostic() {
        let event = SessionEvent::tool_failure("plot_scatter", &"unknown column 'nonexistent'");
        assert_eq!(
            event,
            SessionEvent::Diagnostic(
                "⚠ plot_scatter failed: unknown column 'nonexistent'".to_string()
            )
        );
    }
}

pub mod chart;
pub mod dataset;
pub mod events;
pub mod tool;

pub mod settings {
    use serde::{Deserialize, Serialize};
    use std::path::PathBuf;

    fn default_max_tokens() -> u32 {
        2048
    }

    fn default_max_tool_rounds() -> usize {
        5
    }

    #[derive(Debug, Clone, Serialize, Deserialize, Default)]
    pub struct ProviderAuth {
        pub api_key: Option<String>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ModelProvider {
        pub provider_preference: Vec<String>, // e.g., ["anthropic", "openai"]
        pub anthropic_model: String,          // e.g., "claude-3-5-sonnet-20241022"
        pub openai_model: String,             // e.g., "gpt-4o-mini"

        #[serde(default)]
        pub anthropic_auth: ProviderAuth,
        #[serde(default)]
        pub openai_auth: ProviderAuth,

        /// Override for proxies and compatible servers
        #[serde(default)]
        pub anthropic_base_url: Option<String>,
        #[serde(default)]
        pub openai_base_url: Option<String>,

        #[serde(default = "default_max_tokens")]
        pub max_tokens: u32,
    }

    impl Default for ModelProvider {
        fn default() -> Self {
            Self {
                provider_preference: vec!["anthropic".into(), "openai".into()],
                anthropic_model: "claude-3-5-sonnet-20241022".into(),
                openai_model: "gpt-4o-mini".into(),
                anthropic_auth: ProviderAuth::default(),
                openai_auth: ProviderAuth::default(),
                anthropic_base_url: None,
                openai_base_url: None,
                max_tokens: default_max_tokens(),
            }
        }
    }

    /// Optional replacements for the built-in prompt documents
    #[derive(Debug, Clone, Serialize, Deserialize, Default)]
    pub struct PromptSettings {
        pub system_prompt_path: Option<PathBuf>,
        pub greeting_path: Option<PathBuf>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize, Default)]
    pub struct ChartSettings {
        /// Where standalone chart pages are written; unset means the app's cache directory
        pub output_dir: Option<PathBuf>,
        /// Open every new chart in the browser
        #[serde(default)]
        pub auto_open: bool,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct AppSettings {
        pub model: ModelProvider,
        #[serde(default)]
        pub prompts: PromptSettings,
        #[serde(default)]
        pub charts: ChartSettings,
        /// Upper bound on model/tool round trips per user message
        #[serde(default = "default_max_tool_rounds")]
        pub max_tool_rounds: usize,
        #[serde(default)]
        pub dark_mode: bool,
    }

    impl Default for AppSettings {
        fn default() -> Self {
            Self {
                model: ModelProvider::default(),
                prompts: PromptSettings::default(),
                charts: ChartSettings::default(),
                max_tool_rounds: default_max_tool_rounds(),
                dark_mode: false,
            }
        }
    }
}

pub mod agent_api {
    use serde::{Deserialize, Serialize};

    use crate::tool::{ToolCall, ToolResult};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct ChatMessage {
        pub role: String, // "system" | "user" | "assistant"
        pub content: String,
        /// Structured blocks (text / tool_use / tool_result) in Anthropic form
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub content_parts: Option<Vec<serde_json::Value>>,
    }

    impl ChatMessage {
        pub fn system(content: impl Into<String>) -> Self {
            Self {
                role: "system".to_string(),
                content: content.into(),
                content_parts: None,
            }
        }

        pub fn user(content: impl Into<String>) -> Self {
            Self {
                role: "user".to_string(),
                content: content.into(),
                content_parts: None,
            }
        }

        pub fn assistant(content: impl Into<String>) -> Self {
            Self {
                role: "assistant".to_string(),
                content: content.into(),
                content_parts: None,
            }
        }

        /// Assistant turn that requested tools
        pub fn assistant_tool_use(text: impl Into<String>, calls: &[ToolCall]) -> Self {
            let text = text.into();
            let mut parts = Vec::with_capacity(calls.len() + 1);
            if !text.is_empty() {
                parts.push(serde_json::json!({ "type": "text", "text": text }));
            }
            for call in calls {
                parts.push(serde_json::json!({
                    "type": "tool_use",
                    "id": call.id,
                    "name": call.name,
                    "input": call.input,
                }));
            }
            Self {
                role: "assistant".to_string(),
                content: text,
                content_parts: Some(parts),
            }
        }

        /// User turn carrying tool results back to the model
        pub fn tool_results(results: &[ToolResult]) -> Self {
            Self {
                role: "user".to_string(),
                content: String::new(),
                content_parts: Some(results.iter().map(ToolResult::to_content_part).collect()),
            }
        }
    }

    /// Provider-neutral tool declaration
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct ToolDefinition {
        pub name: String,
        pub description: String,
        pub input_schema: serde_json::Value,
    }

    /// Incremental output of a streaming provider call
    #[derive(Debug, Clone, PartialEq)]
    pub enum StreamChunk {
        Text(String),
        ToolUseStart {
            id: String,
            name: String,
        },
        ToolInputDelta(String),
        ToolUseComplete {
            id: String,
            name: String,
            input: serde_json::Value,
        },
        Done {
            stop_reason: Option<String>,
        },
        Error(String),
    }
}

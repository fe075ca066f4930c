//! Agent Host - chart tools and the chat session that drives them
//!
//! This crate provides:
//! - The system prompt and greeting documents
//! - `plot_scatter` and `plot_density`, behind a tool registry
//! - A Vega-Lite renderer for chart specifications
//! - The chat session running the model/tool loop

pub mod charting;
pub mod prompts;
pub mod render;
pub mod session;
pub mod tools;

pub use prompts::PromptDocuments;
pub use render::VegaLiteRenderer;
pub use session::ChatSession;
pub use tools::{ToolExecution, ToolRegistry};

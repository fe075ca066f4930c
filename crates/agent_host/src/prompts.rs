//! System prompt and greeting documents.
//!
//! Both ship embedded in the binary and can be replaced by files named in
//! [`PromptSettings`]. They are read once, when the session starts.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use shared::dataset::Dataset;
use shared::settings::PromptSettings;
use tracing::info;

const SYSTEM_PROMPT: &str = include_str!("../prompts/system_prompt.md");
const GREETING: &str = include_str!("../prompts/greeting.md");

/// The two static documents of a session
#[derive(Debug, Clone, PartialEq)]
pub struct PromptDocuments {
    /// Sent to the model as the system message of every request
    pub system_prompt: String,
    /// Shown to the user as the first assistant message
    pub greeting: String,
}

impl PromptDocuments {
    /// Embedded documents, with the dataset catalog filled in
    pub fn builtin(dataset: &Dataset) -> Self {
        Self {
            system_prompt: fill_placeholders(SYSTEM_PROMPT, dataset),
            greeting: GREETING.trim().to_string(),
        }
    }

    /// Embedded documents unless the settings point at replacements
    pub fn load(settings: &PromptSettings, dataset: &Dataset) -> Result<Self> {
        let system_template = match &settings.system_prompt_path {
            Some(path) => read_document(path, "system prompt")?,
            None => SYSTEM_PROMPT.to_string(),
        };
        let greeting = match &settings.greeting_path {
            Some(path) => read_document(path, "greeting")?,
            None => GREETING.to_string(),
        };

        Ok(Self {
            system_prompt: fill_placeholders(&system_template, dataset),
            greeting: greeting.trim().to_string(),
        })
    }
}

fn read_document(path: &Path, what: &str) -> Result<String> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {} from {}", what, path.display()))?;
    info!(path = %path.display(), "loaded {} override", what);
    Ok(text)
}

/// Replace `{{dataset}}`, `{{rows}}` and `{{columns}}`
fn fill_placeholders(template: &str, dataset: &Dataset) -> String {
    template
        .replace("{{dataset}}", dataset.name())
        .replace("{{rows}}", &dataset.row_count().to_string())
        .replace("{{columns}}", dataset.catalog_markdown().trim_end())
}

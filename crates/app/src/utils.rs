//! Settings persistence and message helpers

use anyhow::{Context, Result};
use directories::ProjectDirs;
use shared::settings::AppSettings;
use std::path::{Path, PathBuf};
use tracing::warn;

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "chart-chat")
}

/// Get the config file path
pub fn config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("settings.json"))
}

/// Where chart pages go when settings do not say
pub fn default_chart_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.cache_dir().join("charts"))
}

/// Read settings from `path`
pub fn load_settings_from(path: &Path) -> Result<AppSettings> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("invalid settings in {}", path.display()))
}

/// Write settings to `path`, creating parent directories
pub fn save_settings_to(path: &Path, settings: &AppSettings) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
}

/// Load settings from disk or return defaults. The flag says whether a file was found.
pub fn load_settings_or_default() -> (AppSettings, bool) {
    let Some(path) = config_path() else {
        return (AppSettings::default(), false);
    };
    if !path.exists() {
        let settings = AppSettings::default();
        // First run: leave a file behind to edit
        save_settings(&settings);
        return (settings, false);
    }
    match load_settings_from(&path) {
        Ok(settings) => (settings, true),
        Err(e) => {
            warn!(error = %format!("{:#}", e), "using default settings");
            (AppSettings::default(), false)
        }
    }
}

/// Save settings to disk
pub fn save_settings(settings: &AppSettings) {
    if let Some(path) = config_path() {
        if let Err(e) = save_settings_to(&path, settings) {
            warn!(error = %format!("{:#}", e), "could not save settings");
        }
    }
}

/// Friendly text for a failed turn
pub fn format_error_message(error: &str) -> String {
    let lower = error.to_lowercase();

    if lower.contains("no anthropic authentication")
        || lower.contains("no openai authentication")
        || lower.contains("unauthorized")
        || lower.contains("401")
        || lower.contains("invalid api key")
    {
        return "I couldn't connect to the AI service. Set ANTHROPIC_API_KEY or OPENAI_API_KEY, \
                or add a key to the settings file, then try again."
            .to_string();
    }

    if lower.contains("rate limit")
        || lower.contains("429")
        || lower.contains("overloaded")
        || lower.contains("too many requests")
    {
        return "The AI service is temporarily busy. Please wait a moment and try again."
            .to_string();
    }

    if lower.contains("connection")
        || lower.contains("network")
        || lower.contains("timeout")
        || lower.contains("timed out")
        || lower.contains("dns")
    {
        return "I'm having trouble reaching the AI service. Please check your network connection."
            .to_string();
    }

    "Sorry, I ran into an issue and could not finish that reply. Please try again.".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_error_message_categories() {
        assert!(format_error_message("No Anthropic authentication configured")
            .contains("ANTHROPIC_API_KEY"));
        assert!(format_error_message("anthropic error: 529 Overloaded").contains("busy"));
        assert!(format_error_message("error sending request: connection refused")
            .contains("network"));
        assert!(format_error_message("something odd").starts_with("Sorry"));
    }

    #[test]
    fn test_settings_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let mut settings = AppSettings::default();
        settings.max_tool_rounds = 3;
        settings.charts.auto_open = true;
        save_settings_to(&path, &settings).unwrap();

        let loaded = load_settings_from(&path).unwrap();
        assert_eq!(loaded.max_tool_rounds, 3);
        assert!(loaded.charts.auto_open);
    }

    #[test]
    fn test_invalid_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = load_settings_from(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("invalid settings"));
    }
}

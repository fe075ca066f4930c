//! Core types for the Chart Chat app

use chrono::{DateTime, Local};

/// Who a chat bubble belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    /// Tool failures and other notes from the app itself
    Diagnostic,
}

/// A chat message as shown in the UI
#[derive(Clone, Debug)]
pub struct ChatEntry {
    pub role: Role,
    pub content: String,
    /// Optional low-level details (e.g. provider errors). Kept out of the main message UI.
    pub details: Option<String>,
    pub timestamp: DateTime<Local>,
}

impl ChatEntry {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            details: None,
            timestamp: Local::now(),
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// How a background turn ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed,
    Failed(String),
    Cancelled,
}

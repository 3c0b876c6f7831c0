use serde::{Deserialize, Serialize};

/// One completed exchange, as carried in `conversation_history`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    /// What the user said.
    pub user: String,
    /// What the assistant answered.
    pub assistant: String,
}

impl HistoryEntry {
    /// Create a new history entry.
    pub fn new(user: impl Into<String>, assistant: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            assistant: assistant.into(),
        }
    }
}

/// Body of a fallback chat request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatRequest {
    /// The user's message.
    pub message: String,

    /// Prior exchanges, oldest first.
    pub conversation_history: Vec<HistoryEntry>,
}

impl ChatRequest {
    /// Create a new request carrying the given history.
    pub fn new(message: impl Into<String>, conversation_history: Vec<HistoryEntry>) -> Self {
        Self {
            message: message.into(),
            conversation_history,
        }
    }
}

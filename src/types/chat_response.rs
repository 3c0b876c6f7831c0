use serde::{Deserialize, Serialize};

use crate::types::Action;

/// Body of a fallback chat response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatResponse {
    /// The assistant's reply.
    pub response: String,

    /// Server-side creation time, as reported by the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,

    /// Names of the backend tools consulted for this reply.
    ///
    /// The backend sends `null` when no tool was used.
    #[serde(default, deserialize_with = "null_as_empty")]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools_used: Vec<String>,

    /// Page actions suggested alongside the reply.
    #[serde(default, deserialize_with = "null_as_empty")]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<Action>,
}

impl ChatResponse {
    /// Create a response with only reply text.
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            timestamp: None,
            tools_used: Vec::new(),
            actions: Vec::new(),
        }
    }

    /// Attach suggested actions.
    pub fn with_actions(mut self, actions: Vec<Action>) -> Self {
        self.actions = actions;
        self
    }

    /// Attach the names of the tools used.
    pub fn with_tools_used(mut self, tools_used: Vec<String>) -> Self {
        self.tools_used = tools_used;
        self
    }
}

pub(crate) fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

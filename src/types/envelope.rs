use serde::{Deserialize, Serialize};

use crate::types::Action;
use crate::types::chat_response::null_as_empty;

/// An envelope received over the live channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
#[serde(rename_all = "lowercase")]
pub enum InboundEnvelope {
    /// Handshake greeting sent once the channel is open.
    Welcome {
        /// Greeting text.
        message: String,
    },

    /// An assistant reply.
    Message {
        /// Reply text.
        response: String,

        /// Names of the backend tools consulted for this reply.
        #[serde(default, deserialize_with = "null_as_empty")]
        #[serde(skip_serializing_if = "Vec::is_empty")]
        tools_used: Vec<String>,

        /// Page actions suggested alongside the reply.
        #[serde(default, deserialize_with = "null_as_empty")]
        #[serde(skip_serializing_if = "Vec::is_empty")]
        actions: Vec<Action>,
    },

    /// A backend-side failure.
    Error {
        /// Failure description.
        message: String,
    },
}

impl InboundEnvelope {
    /// Returns the wire name of the envelope kind.
    pub fn kind(&self) -> &'static str {
        match self {
            InboundEnvelope::Welcome { .. } => "welcome",
            InboundEnvelope::Message { .. } => "message",
            InboundEnvelope::Error { .. } => "error",
        }
    }
}

/// An envelope sent over the live channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutboundEnvelope {
    /// The user's message.
    pub message: String,
}

impl OutboundEnvelope {
    /// Create a new outbound envelope.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

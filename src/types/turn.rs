use std::fmt;

use serde::Serialize;
use time::OffsetDateTime;

use crate::render::SafeHtml;

/// The author of a transcript turn.
#[derive(Debug, Copy, Clone, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Text the user typed.
    User,
    /// A reply from the assistant backend.
    Assistant,
    /// A greeting or notice produced by the widget itself.
    System,
    /// A failure shown to the user.
    Error,
}

impl Role {
    /// Returns the lowercase wire name of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Error => "error",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One exchanged message.
///
/// Turns are immutable.  The rendered form is always produced by a
/// [`MessageRenderer`](crate::render::MessageRenderer), so a turn never
/// carries display content that bypassed escaping.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Turn {
    role: Role,
    content: String,
    rendered: SafeHtml,
    #[serde(with = "crate::utils::time")]
    timestamp: OffsetDateTime,
}

impl Turn {
    pub(crate) fn new(role: Role, content: impl Into<String>, rendered: SafeHtml) -> Self {
        Self {
            role,
            content: content.into(),
            rendered,
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    /// Who produced this turn.
    pub fn role(&self) -> Role {
        self.role
    }

    /// The raw text as submitted or received.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// The display-safe rendering of the content.
    pub fn rendered(&self) -> &SafeHtml {
        &self.rendered
    }

    /// When the turn was created.
    pub fn timestamp(&self) -> OffsetDateTime {
        self.timestamp
    }
}

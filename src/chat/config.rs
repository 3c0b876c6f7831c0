//! Configuration types for the chat session.
//!
//! This module provides CLI argument parsing via `arrrg` and the resolved
//! [`SessionConfig`] that drives a [`ChatSession`](super::ChatSession).

use std::time::Duration;

use arrrg_derive::CommandLine;

use crate::endpoint::EndpointConfig;
use crate::error::{Error, Result};
use crate::transcript::{DEFAULT_HISTORY_LIMIT, DEFAULT_TRANSCRIPT_LIMIT};

/// Default bound on waiting for a reply.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(60);

/// Command-line arguments for the chatlink tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Base URL of the fallback API.
    #[arrrg(optional, "Fallback API base URL (default: from CHATLINK_API_URL or host)", "URL")]
    pub api_url: Option<String>,

    /// Base URL of the live channel.
    #[arrrg(optional, "Live channel base URL (default: from CHATLINK_WS_URL or host)", "URL")]
    pub ws_url: Option<String>,

    /// Hostname used to pick development or production defaults.
    #[arrrg(optional, "Hostname for environment detection (default: localhost)", "HOST")]
    pub host: Option<String>,

    /// Live connect timeout in milliseconds.
    #[arrrg(optional, "Live connect timeout in milliseconds (default: 5000)", "MS")]
    pub connect_timeout_ms: Option<u32>,

    /// Number of exchanges sent with fallback requests.
    #[arrrg(optional, "Exchanges sent as fallback history (default: 20)", "N")]
    pub history_limit: Option<u32>,

    /// Escape replies instead of rendering markdown.
    #[arrrg(flag, "Render replies as escaped text instead of markdown")]
    pub plain: bool,

    /// Print rendered HTML instead of raw text.
    #[arrrg(flag, "Print rendered HTML instead of raw text")]
    pub html: bool,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,

    /// Run against in-memory transports.
    #[arrrg(flag, "Run without a backend, echoing messages locally")]
    pub offline: bool,
}

/// Configuration for a chat session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Where the backend lives.
    pub endpoints: EndpointConfig,

    /// Bound on waiting for one reply.
    pub reply_timeout: Duration,

    /// Turns kept in the transcript.
    pub transcript_limit: usize,

    /// Exchanges sent with fallback requests.
    pub history_limit: usize,

    /// Render replies as markdown rather than escaped text.
    pub markdown: bool,
}

impl SessionConfig {
    /// Creates a configuration with default limits for `endpoints`.
    ///
    /// Defaults:
    /// - Reply timeout: 60 s
    /// - Transcript: 200 turns
    /// - History: 20 exchanges
    /// - Markdown: enabled
    pub fn new(endpoints: EndpointConfig) -> Self {
        Self {
            endpoints,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            transcript_limit: DEFAULT_TRANSCRIPT_LIMIT,
            history_limit: DEFAULT_HISTORY_LIMIT,
            markdown: true,
        }
    }

    /// Creates a configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(EndpointConfig::from_env()?))
    }

    /// Sets the reply timeout.
    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    /// Sets the transcript limit.
    pub fn with_transcript_limit(mut self, limit: usize) -> Self {
        self.transcript_limit = limit;
        self
    }

    /// Sets the history limit.  Zero disables history.
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Sets whether replies are rendered as markdown.
    pub fn with_markdown(mut self, markdown: bool) -> Self {
        self.markdown = markdown;
        self
    }

    /// Check the configuration before use.
    pub fn validate(&self) -> Result<()> {
        self.endpoints.validate()?;
        if self.reply_timeout.is_zero() {
            return Err(Error::config(
                "reply timeout must be positive",
                Some("reply_timeout".to_string()),
            ));
        }
        Ok(())
    }
}

impl TryFrom<ChatArgs> for SessionConfig {
    type Error = Error;

    fn try_from(args: ChatArgs) -> Result<Self> {
        let mut endpoints = EndpointConfig::resolve(
            args.host.as_deref(),
            args.ws_url.as_deref(),
            args.api_url.as_deref(),
        )?;
        if let Some(ms) = args.connect_timeout_ms {
            endpoints = endpoints.with_connect_timeout(Duration::from_millis(ms.into()));
        }
        let mut config = SessionConfig::new(endpoints).with_markdown(!args.plain);
        if let Some(limit) = args.history_limit {
            config = config.with_history_limit(limit as usize);
        }
        config.validate()?;
        Ok(config)
    }
}

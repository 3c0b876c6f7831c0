//! Backend endpoint configuration.
//!
//! The widget talks to one backend over two transports: a WebSocket live
//! channel and an HTTP fallback.  Both addresses are resolved here, either
//! explicitly or from the hosting environment, and validated before any
//! connection is attempted.

use std::env;
use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};

const DEVELOPMENT_API_URL: &str = "http://127.0.0.1:8000";
const DEVELOPMENT_WS_URL: &str = "ws://127.0.0.1:8000";
const PRODUCTION_API_URL: &str = "https://portfolio-frontend-otua.onrender.com";
const PRODUCTION_WS_URL: &str = "wss://portfolio-frontend-otua.onrender.com";

/// Path of the live chat channel below the WebSocket base URL.
pub const LIVE_CHAT_PATH: &str = "ws/chat";
/// Path of the fallback chat endpoint below the API base URL.
pub const FALLBACK_CHAT_PATH: &str = "api/chat";
/// Path of the fallback health probe below the API base URL.
pub const HEALTH_PATH: &str = "health";

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Greeting shown when the live channel is unavailable.
pub const DEFAULT_GREETING: &str = "Hi! I'm Sriharsha's AI assistant. 👋\n\n\
I can help you learn about:\n\
• Professional experience & skills\n\
• Projects & achievements\n\
• Education & certifications\n\
• Technical expertise\n\n\
Feel free to ask me anything!";

/// Deployment environment of the hosting page.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Environment {
    /// Local or private-network development server.
    Development,
    /// Public deployment.
    Production,
}

impl Environment {
    /// Classify a page hostname.
    ///
    /// Loopback names and private `192.168.*` / `10.*` addresses are treated
    /// as development; everything else is production.
    pub fn detect(hostname: &str) -> Self {
        if hostname == "localhost"
            || hostname == "127.0.0.1"
            || hostname.starts_with("192.168.")
            || hostname.starts_with("10.")
        {
            Environment::Development
        } else {
            Environment::Production
        }
    }

    /// Returns the environment name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }

    fn api_url(&self) -> &'static str {
        match self {
            Environment::Development => DEVELOPMENT_API_URL,
            Environment::Production => PRODUCTION_API_URL,
        }
    }

    fn ws_url(&self) -> &'static str {
        match self {
            Environment::Development => DEVELOPMENT_WS_URL,
            Environment::Production => PRODUCTION_WS_URL,
        }
    }
}

/// Where and how to reach the assistant backend.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointConfig {
    /// Full URL of the live channel (`ws` or `wss`).
    pub live_url: Url,

    /// Base URL of the fallback API (`http` or `https`).
    pub fallback_base_url: Url,

    /// Bound on establishing the live channel, handshake included.
    pub connect_timeout: Duration,

    /// Bound on a single fallback request.
    pub request_timeout: Duration,

    /// Greeting delivered locally when the live channel is unavailable.
    pub greeting: String,
}

impl EndpointConfig {
    /// Build a configuration from base URLs.
    ///
    /// `ws_base` gets the live chat path appended; `api_base` is used as-is
    /// as the fallback base.
    pub fn new(ws_base: &str, api_base: &str) -> Result<Self> {
        let live_url = join(&parse_base(ws_base, "live_url")?, LIVE_CHAT_PATH)?;
        let fallback_base_url = parse_base(api_base, "fallback_base_url")?;
        let config = Self {
            live_url,
            fallback_base_url,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            greeting: DEFAULT_GREETING.to_string(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Build the default configuration for an environment.
    pub fn for_environment(environment: Environment) -> Result<Self> {
        Self::new(environment.ws_url(), environment.api_url())
    }

    /// Build the configuration for a page served from `hostname`.
    pub fn for_hostname(hostname: &str) -> Result<Self> {
        Self::for_environment(Environment::detect(hostname))
    }

    /// Build a configuration from the process environment.
    ///
    /// `CHATLINK_HOST` selects the environment (default `localhost`), and
    /// `CHATLINK_WS_URL` / `CHATLINK_API_URL` override the base URLs.
    pub fn from_env() -> Result<Self> {
        Self::resolve(None, None, None)
    }

    /// Build a configuration from explicit values, falling back to the
    /// process environment and then to the detected environment's defaults.
    pub fn resolve(
        hostname: Option<&str>,
        ws_base: Option<&str>,
        api_base: Option<&str>,
    ) -> Result<Self> {
        let hostname = hostname
            .map(str::to_string)
            .or_else(|| env::var("CHATLINK_HOST").ok())
            .unwrap_or_else(|| "localhost".to_string());
        let environment = Environment::detect(&hostname);
        let ws_base = ws_base
            .map(str::to_string)
            .or_else(|| env::var("CHATLINK_WS_URL").ok())
            .unwrap_or_else(|| environment.ws_url().into());
        let api_base = api_base
            .map(str::to_string)
            .or_else(|| env::var("CHATLINK_API_URL").ok())
            .unwrap_or_else(|| environment.api_url().into());
        Self::new(&ws_base, &api_base)
    }

    /// Sets the live connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the fallback request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the locally synthesized greeting.
    pub fn with_greeting(mut self, greeting: impl Into<String>) -> Self {
        self.greeting = greeting.into();
        self
    }

    /// URL of the fallback chat endpoint.
    pub fn chat_url(&self) -> Result<Url> {
        join(&self.fallback_base_url, FALLBACK_CHAT_PATH)
    }

    /// URL of the fallback health probe.
    pub fn health_url(&self) -> Result<Url> {
        join(&self.fallback_base_url, HEALTH_PATH)
    }

    /// Check that both URLs use the expected schemes.
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.live_url.scheme(), "ws" | "wss") {
            return Err(Error::config(
                format!("live channel URL must use ws or wss, got {}", self.live_url),
                Some("live_url".to_string()),
            ));
        }
        if !matches!(self.fallback_base_url.scheme(), "http" | "https") {
            return Err(Error::config(
                format!(
                    "fallback base URL must use http or https, got {}",
                    self.fallback_base_url
                ),
                Some("fallback_base_url".to_string()),
            ));
        }
        if self.connect_timeout.is_zero() {
            return Err(Error::config(
                "connect timeout must be positive",
                Some("connect_timeout".to_string()),
            ));
        }
        Ok(())
    }
}

fn parse_base(raw: &str, key: &str) -> Result<Url> {
    let mut url = Url::parse(raw.trim()).map_err(|err| {
        Error::config(
            format!("{key} is not a well-formed URL: {err}"),
            Some(key.to_string()),
        )
    })?;
    if url.cannot_be_a_base() {
        return Err(Error::config(
            format!("{key} cannot be used as a base URL"),
            Some(key.to_string()),
        ));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn join(base: &Url, path: &str) -> Result<Url> {
    Ok(base.join(path)?)
}

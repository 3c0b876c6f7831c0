//! Error types for chatlink.
//!
//! Every failure the widget core can observe maps onto one of these variants.
//! Only a handful are ever shown to the user; the rest are recovered locally
//! (a failed live connect downgrades to the fallback, for example).

use std::error;
use std::fmt;
use std::io;
use std::sync::Arc;

/// The main error type for chatlink.
#[derive(Clone, Debug)]
pub enum Error {
    /// The submitted text was empty after trimming.
    InvalidInput {
        /// Human-readable error message.
        message: String,
    },

    /// The live channel could not be established.
    ConnectFailure {
        /// Human-readable error message.
        message: String,
        /// Underlying cause.
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },

    /// A send attempt could not reach the backend.
    BackendUnreachable {
        /// Human-readable error message.
        message: String,
        /// HTTP status code, when the backend answered with a failure.
        status_code: Option<u16>,
        /// Underlying cause.
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },

    /// The backend answered, but reported a failure of its own.
    Backend {
        /// Failure description provided by the backend.
        message: String,
    },

    /// The live channel produced a malformed or unexpected envelope.
    Protocol {
        /// Human-readable error message.
        message: String,
    },

    /// A submission arrived while another one is still outstanding.
    Busy {
        /// Human-readable error message.
        message: String,
    },

    /// The operation is not valid in the current state.
    InvalidState {
        /// Human-readable error message.
        message: String,
        /// Name of the state the operation was attempted in.
        state: String,
    },

    /// The endpoint configuration is malformed.
    Config {
        /// Human-readable error message.
        message: String,
        /// Configuration key that failed validation.
        key: Option<String>,
    },

    /// An operation exceeded its deadline.
    Timeout {
        /// Human-readable error message.
        message: String,
        /// Duration of the timeout in seconds.
        duration: Option<f64>,
    },

    /// Error during JSON serialization or deserialization.
    Serialization {
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },

    /// I/O error.
    Io {
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        source: Arc<io::Error>,
    },

    /// HTTP client error.
    HttpClient {
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },

    /// A URL parsing or manipulation error.
    Url {
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        source: Option<url::ParseError>,
    },
}

impl Error {
    /// Creates a new invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Error::InvalidInput {
            message: message.into(),
        }
    }

    /// Creates a new connect failure.
    pub fn connect_failure(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::ConnectFailure {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Creates a new backend unreachable error.
    pub fn backend_unreachable(
        message: impl Into<String>,
        status_code: Option<u16>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::BackendUnreachable {
            message: message.into(),
            status_code,
            source: source.map(Arc::from),
        }
    }

    /// Creates a new backend-reported error.
    pub fn backend(message: impl Into<String>) -> Self {
        Error::Backend {
            message: message.into(),
        }
    }

    /// Creates a new protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Error::Protocol {
            message: message.into(),
        }
    }

    /// Creates a new busy error.
    pub fn busy(message: impl Into<String>) -> Self {
        Error::Busy {
            message: message.into(),
        }
    }

    /// Creates a new invalid state error.
    pub fn invalid_state(message: impl Into<String>, state: impl Into<String>) -> Self {
        Error::InvalidState {
            message: message.into(),
            state: state.into(),
        }
    }

    /// Creates a new configuration error.
    pub fn config(message: impl Into<String>, key: Option<String>) -> Self {
        Error::Config {
            message: message.into(),
            key,
        }
    }

    /// Creates a new timeout error.
    pub fn timeout(message: impl Into<String>, duration: Option<f64>) -> Self {
        Error::Timeout {
            message: message.into(),
            duration,
        }
    }

    /// Creates a new serialization error.
    pub fn serialization(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::Serialization {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Creates a new I/O error.
    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        Error::Io {
            message: message.into(),
            source: Arc::new(source),
        }
    }

    /// Creates a new HTTP client error.
    pub fn http_client(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::HttpClient {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Creates a new URL error.
    pub fn url(message: impl Into<String>, source: Option<url::ParseError>) -> Self {
        Error::Url {
            message: message.into(),
            source,
        }
    }

    /// Returns true if this error is an invalid input error.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Error::InvalidInput { .. })
    }

    /// Returns true if this error is a connect failure.
    pub fn is_connect_failure(&self) -> bool {
        matches!(self, Error::ConnectFailure { .. })
    }

    /// Returns true if this error means the backend could not be reached.
    pub fn is_backend_unreachable(&self) -> bool {
        matches!(self, Error::BackendUnreachable { .. })
    }

    /// Returns true if the backend reported the failure itself.
    pub fn is_backend(&self) -> bool {
        matches!(self, Error::Backend { .. })
    }

    /// Returns true if this error is a protocol error.
    pub fn is_protocol(&self) -> bool {
        matches!(self, Error::Protocol { .. })
    }

    /// Returns true if this error is a busy rejection.
    pub fn is_busy(&self) -> bool {
        matches!(self, Error::Busy { .. })
    }

    /// Returns true if this error is an invalid state error.
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Error::InvalidState { .. })
    }

    /// Returns true if this error is a configuration error.
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config { .. })
    }

    /// Returns true if this error is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }

    /// Returns true if the error should be shown to the user as an error turn.
    ///
    /// Invalid input and busy rejections are silent: the widget simply does
    /// not act on them.
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            Error::BackendUnreachable { .. } | Error::Backend { .. } | Error::Protocol { .. }
        )
    }

    /// Returns the status code associated with this error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::BackendUnreachable { status_code, .. } => *status_code,
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidInput { message } => {
                write!(f, "Invalid input: {message}")
            }
            Error::ConnectFailure { message, .. } => {
                write!(f, "Connect failure: {message}")
            }
            Error::BackendUnreachable {
                message,
                status_code,
                ..
            } => {
                if let Some(status_code) = status_code {
                    write!(f, "Backend unreachable: {message} (status {status_code})")
                } else {
                    write!(f, "Backend unreachable: {message}")
                }
            }
            Error::Backend { message } => {
                write!(f, "Backend error: {message}")
            }
            Error::Protocol { message } => {
                write!(f, "Protocol error: {message}")
            }
            Error::Busy { message } => {
                write!(f, "Busy: {message}")
            }
            Error::InvalidState { message, state } => {
                write!(f, "Invalid state: {message} (state: {state})")
            }
            Error::Config { message, key } => {
                if let Some(key) = key {
                    write!(f, "Configuration error: {message} (key: {key})")
                } else {
                    write!(f, "Configuration error: {message}")
                }
            }
            Error::Timeout { message, duration } => {
                if let Some(duration) = duration {
                    write!(f, "Timeout error: {message} ({duration} seconds)")
                } else {
                    write!(f, "Timeout error: {message}")
                }
            }
            Error::Serialization { message, .. } => {
                write!(f, "Serialization error: {message}")
            }
            Error::Io { message, .. } => {
                write!(f, "I/O error: {message}")
            }
            Error::HttpClient { message, .. } => {
                write!(f, "HTTP client error: {message}")
            }
            Error::Url { message, .. } => {
                write!(f, "URL error: {message}")
            }
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::ConnectFailure { source, .. } => source
                .as_ref()
                .map(|e| e.as_ref() as &(dyn error::Error + 'static)),
            Error::BackendUnreachable { source, .. } => source
                .as_ref()
                .map(|e| e.as_ref() as &(dyn error::Error + 'static)),
            Error::Serialization { source, .. } => source
                .as_ref()
                .map(|e| e.as_ref() as &(dyn error::Error + 'static)),
            Error::Io { source, .. } => Some(source),
            Error::HttpClient { source, .. } => source
                .as_ref()
                .map(|e| e.as_ref() as &(dyn error::Error + 'static)),
            Error::Url { source, .. } => {
                source.as_ref().map(|e| e as &(dyn error::Error + 'static))
            }
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::io(err.to_string(), err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::serialization(format!("JSON error: {err}"), Some(Box::new(err)))
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::url(format!("URL parse error: {err}"), Some(err))
    }
}

/// A specialized Result type for chatlink operations.
pub type Result<T> = std::result::Result<T, Error>;

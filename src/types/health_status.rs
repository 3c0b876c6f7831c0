use serde::{Deserialize, Serialize};

/// Result of probing the fallback backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthStatus {
    /// Whether the backend answered with a success status.
    pub healthy: bool,

    /// The HTTP status the backend answered with.
    pub status_code: u16,

    /// Raw body of the probe response, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl HealthStatus {
    /// Create a status from an HTTP status code.
    pub fn from_status(status_code: u16) -> Self {
        Self {
            healthy: (200..300).contains(&status_code),
            status_code,
            body: None,
        }
    }

    /// Attach the response body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }
}

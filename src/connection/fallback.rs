use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response};
use serde::Deserialize;
use url::Url;

use crate::error::{Error, Result};
use crate::types::{ChatRequest, ChatResponse, HealthStatus};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Stateless request/response transport used when no live channel exists.
#[async_trait]
pub trait FallbackTransport: Send + Sync {
    /// Post one chat request and wait for its reply.
    async fn chat(&self, url: Url, request: ChatRequest) -> Result<ChatResponse>;

    /// Probe backend health.
    async fn health(&self, url: Url) -> Result<HealthStatus>;
}

/// [`FallbackTransport`] over HTTP with JSON bodies.
#[derive(Debug, Clone)]
pub struct HttpFallback {
    client: ReqwestClient,
    timeout: Duration,
}

impl HttpFallback {
    /// Create a transport with the default request timeout.
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Create a transport whose requests give up after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = ReqwestClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {}", e),
                    Some(Box::new(e)),
                )
            })?;
        Ok(Self { client, timeout })
    }

    fn default_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers
    }

    fn map_send_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::timeout(
                format!("Request timed out: {}", e),
                Some(self.timeout.as_secs_f64()),
            )
        } else if e.is_connect() {
            Error::backend_unreachable(
                format!("Connection error: {}", e),
                None,
                Some(Box::new(e)),
            )
        } else {
            Error::http_client(format!("Request failed: {}", e), Some(Box::new(e)))
        }
    }

    async fn process_error_response(response: Response) -> Error {
        let status_code = response.status().as_u16();

        // FastAPI reports failures as {"detail": ...}
        #[derive(Deserialize)]
        struct ErrorResponse {
            detail: Option<serde_json::Value>,
        }

        let error_body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Error::backend_unreachable(
                    format!("Failed to read error response: {}", e),
                    Some(status_code),
                    Some(Box::new(e)),
                );
            }
        };

        let detail = serde_json::from_str::<ErrorResponse>(&error_body)
            .ok()
            .and_then(|e| e.detail)
            .map(|detail| match detail {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            })
            .unwrap_or(error_body);

        Error::backend_unreachable(
            format!("backend answered {status_code}: {detail}"),
            Some(status_code),
            None,
        )
    }
}

#[async_trait]
impl FallbackTransport for HttpFallback {
    async fn chat(&self, url: Url, request: ChatRequest) -> Result<ChatResponse> {
        tracing::debug!(%url, history = request.conversation_history.len(), "posting chat request");
        let response = self
            .client
            .post(url)
            .headers(self.default_headers())
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !response.status().is_success() {
            return Err(Self::process_error_response(response).await);
        }

        response.json::<ChatResponse>().await.map_err(|e| {
            Error::serialization(
                format!("Failed to parse response: {}", e),
                Some(Box::new(e)),
            )
        })
    }

    async fn health(&self, url: Url) -> Result<HealthStatus> {
        let response = self
            .client
            .get(url)
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        let status = HealthStatus::from_status(response.status().as_u16());
        match response.text().await {
            Ok(body) if !body.is_empty() => Ok(status.with_body(body)),
            Ok(_) => Ok(status),
            Err(e) => {
                tracing::debug!(error = %e, "could not read health body");
                Ok(status)
            }
        }
    }
}

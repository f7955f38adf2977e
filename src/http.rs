//! HTTP transport used by the source fetchers
//!
//! Fetchers never talk to reqwest directly: they go through [`HttpTransport`]
//! so that tests and dry runs can serve canned responses keyed by URL.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

use crate::error::FetchError;

/// Outgoing GET request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: BTreeMap<String, String>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: BTreeMap::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }
}

/// Response as seen by the fetchers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl HttpResponse {
    pub fn json(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            content_type: Some(String::from("application/json")),
            body: body.into(),
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            content_type: None,
            body: String::new(),
        }
    }

    pub const fn is_not_found(&self) -> bool {
        self.status == 404
    }

    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| ct.contains("json"))
            .unwrap_or(false)
    }

    /// Decode the body, treating anything that is not JSON of the expected
    /// shape as a protocol violation.
    pub fn decode<T: DeserializeOwned>(&self, source: &str) -> Result<T, FetchError> {
        if !self.is_json() {
            return Err(FetchError::unexpected_protocol(
                source,
                format!(
                    "unexpected content type: {}",
                    self.content_type.as_deref().unwrap_or("<none>")
                ),
            ));
        }
        serde_json::from_str(&self.body).map_err(|e| {
            FetchError::unexpected_protocol(source, format!("invalid response body: {}", e))
        })
    }
}

/// Transport-level failure: no response was obtained
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HttpError {
    pub message: String,
}

impl HttpError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
}

/// Issue a GET through `http`, mapping transport failures to [`FetchError`].
pub async fn fetch(
    http: &dyn HttpTransport,
    source: &str,
    request: HttpRequest,
) -> Result<HttpResponse, FetchError> {
    tracing::trace!(source = %source, url = %request.url, "GET");
    http.get(request)
        .await
        .map_err(|e| FetchError::transport(source, e.message))
}

/// Production transport backed by reqwest
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("oracle-feeder/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| HttpError::new(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let mut builder = self.client.get(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                HttpError::new(format!("request timeout: {}", e))
            } else if e.is_connect() {
                HttpError::new(format!("connection failed: {}", e))
            } else {
                HttpError::new(format!("request failed: {}", e))
            }
        })?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .text()
            .await
            .map_err(|e| HttpError::new(format!("failed to read response body: {}", e)))?;

        Ok(HttpResponse {
            status,
            content_type,
            body,
        })
    }
}

/// Transport serving canned responses keyed by exact URL.
///
/// Unknown URLs fail at the transport level. Every requested URL is recorded
/// in issue order, before any configured delay elapses.
#[derive(Debug, Default)]
pub struct StaticTransport {
    routes: HashMap<String, HttpResponse>,
    delays: HashMap<String, Duration>,
    requests: Mutex<Vec<String>>,
}

impl StaticTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(mut self, url: impl Into<String>, response: HttpResponse) -> Self {
        self.routes.insert(url.into(), response);
        self
    }

    pub fn with_json(self, url: impl Into<String>, body: &serde_json::Value) -> Self {
        self.with_response(url, HttpResponse::json(body.to_string()))
    }

    pub fn with_status(self, url: impl Into<String>, status: u16) -> Self {
        self.with_response(url, HttpResponse::status(status))
    }

    /// Hold responses for `url` back by `delay`.
    pub fn with_delay(mut self, url: impl Into<String>, delay: Duration) -> Self {
        self.delays.insert(url.into(), delay);
        self
    }

    /// URLs requested so far.
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl HttpTransport for StaticTransport {
    async fn get(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.url.clone());
        }
        if let Some(delay) = self.delays.get(&request.url) {
            tokio::time::sleep(*delay).await;
        }
        self.routes
            .get(&request.url)
            .cloned()
            .ok_or_else(|| HttpError::new(format!("connection refused: {}", request.url)))
    }
}

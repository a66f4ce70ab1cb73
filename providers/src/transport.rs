//! The HTTP seam between request shaping and the network.

use crate::{Error, USE_CASE_NAME};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, Url};
use serde_json::Value;
use std::time::Duration;

/// A fully shaped HTTP request, ready to send.
#[derive(Debug, Clone)]
pub struct WireRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    /// JSON body. `Null` sends no body.
    pub body: Value,
}

impl WireRequest {
    /// A bodiless request.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
            query: Vec::new(),
            body: Value::Null,
        }
    }

    /// A POST to `url` carrying `body` as JSON.
    pub fn post(url: Url, body: Value) -> Self {
        Self::new(Method::POST, url).with_body(body)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Look up a header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Headers every provider call carries regardless of provider.
    pub(crate) fn apply_common_headers(&mut self, correlation_id: Option<&str>) {
        self.headers
            .push((CONTENT_TYPE.as_str().to_string(), "application/json".to_string()));
        self.headers
            .push(("xProxy-UseCase-Name".to_string(), USE_CASE_NAME.to_string()));
        if let Some(id) = correlation_id.filter(|id| !id.is_empty()) {
            self.headers
                .push(("xProxy-UseCase-ID".to_string(), id.to_string()));
        }
    }
}

/// What came back from the provider, before any interpretation.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpReply {
    /// A reply with no headers.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Look up a header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Sends shaped requests. Implemented over `reqwest` and by test doubles.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &WireRequest) -> Result<HttpReply, Error>;
}

/// `reqwest`-backed transport with bounded per-call timeouts.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, Error> {
        Self::with_verify_ssl(timeout, true)
    }

    /// Like [`HttpTransport::new`], optionally accepting invalid certificates.
    pub fn with_verify_ssl(timeout: Duration, verify_ssl: bool) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(30))
            .danger_accept_invalid_certs(!verify_ssl)
            .build()
            .map_err(|e| Error::InvalidConfig(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &WireRequest) -> Result<HttpReply, Error> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .query(&request.query);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.body.is_null() {
            let body =
                serde_json::to_vec(&request.body).map_err(|e| Error::Decode(e.to_string()))?;
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| {
            log::error!("Error making request to {}: {e}", request.url);
            Error::Network(e.to_string())
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        Ok(HttpReply {
            status,
            headers,
            body,
        })
    }
}

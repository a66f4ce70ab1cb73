//! Usage metering.
//!
//! The dialogue reports a session-start event and per-turn properties to a
//! metering service. None of these calls may interrupt a dialogue: every
//! [`UsageMeter`] method swallows its own failures after logging them.

use crate::config::MeteringConfig;
use crate::role::RoleType;
use async_trait::async_trait;
use providers::json::deep_string;
use providers::{HttpTransport, Provider, Transport, WireRequest, USE_CASE_NAME};
use reqwest::{Method, Url};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

/// Metering category the session sentinel is filed under.
pub const CATEGORY: &str = "adverstorial";

/// Resource ingested once per session to mark its start.
pub const SENTINEL_RESOURCE: &str = "sentinel";

/// Everything recorded about a session when it starts.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStart {
    pub game_id: String,
    /// `provider.model` of the protagonist.
    pub protagonist: String,
    /// `provider.model` of the antagonist.
    pub antagonist: String,
    pub rounds: u32,
    pub seed_prompt: String,
    pub order: [RoleType; 2],
}

impl SessionStart {
    /// Session properties as sent to the metering service.
    pub fn properties(&self) -> Value {
        json!({
            "antagonist": self.antagonist,
            "protagonist": self.protagonist,
            "rounds": self.rounds.to_string(),
            "seed_prompt": self.seed_prompt,
            "order": format!("{},{}", self.order[0], self.order[1]),
        })
    }
}

/// Sink for usage events. Fire-and-forget from the caller's view.
#[async_trait]
pub trait UsageMeter: Send + Sync {
    async fn start_session(&self, start: &SessionStart);

    /// Map a provider's response id to the metering service's request id.
    async fn resolve_request_id(&self, provider: Provider, response_id: &str) -> Option<String>;

    async fn set_request_property(&self, request_id: &str, key: &str, value: &str);

    async fn set_session_property(&self, game_id: &str, key: &str, value: &str);
}

/// Discards everything. Used when no metering key is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMeter;

#[async_trait]
impl UsageMeter for NoopMeter {
    async fn start_session(&self, _start: &SessionStart) {}

    async fn resolve_request_id(&self, _provider: Provider, _response_id: &str) -> Option<String> {
        None
    }

    async fn set_request_property(&self, _request_id: &str, _key: &str, _value: &str) {}

    async fn set_session_property(&self, _game_id: &str, _key: &str, _value: &str) {}
}

/// Errors from the metering HTTP API. Never escape a [`UsageMeter`] call.
#[derive(Debug, Error)]
pub enum MeterError {
    #[error("metering request failed: {0}")]
    Transport(#[from] providers::Error),

    #[error("metering API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid metering URL: {0}")]
    Url(String),
}

/// Client for the Pay-i metering API.
pub struct PayiMeter<T = HttpTransport> {
    transport: T,
    api_url: Url,
    api_key: String,
}

impl PayiMeter<HttpTransport> {
    pub fn new(
        api_url: Url,
        api_key: impl Into<String>,
        verify_ssl: bool,
        timeout: Duration,
    ) -> Result<Self, MeterError> {
        let transport = HttpTransport::with_verify_ssl(timeout, verify_ssl)?;
        Ok(Self::with_transport(api_url, api_key, transport))
    }
}

impl<T: Transport> PayiMeter<T> {
    /// Create a meter that sends through a custom transport.
    pub fn with_transport(api_url: Url, api_key: impl Into<String>, transport: T) -> Self {
        Self {
            transport,
            api_url,
            api_key: api_key.into(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> Result<Value, MeterError> {
        let url = self
            .api_url
            .join(path)
            .map_err(|e| MeterError::Url(format!("{path}: {e}")))?;

        let mut request = WireRequest::new(method.clone(), url)
            .with_header("accept", "application/json")
            .with_header("xProxy-api-key", self.api_key.as_str());
        for (name, value) in headers {
            request = request.with_header(*name, *value);
        }
        if let Some(body) = body {
            request = request
                .with_header("Content-Type", "application/json")
                .with_body(body);
        }

        let reply = self.transport.send(&request).await?;
        log::debug!("{method} {path}: {}", reply.status);

        if !reply.is_success() {
            return Err(MeterError::Status {
                status: reply.status,
                body: reply.body,
            });
        }

        Ok(serde_json::from_str(&reply.body).unwrap_or(Value::Null))
    }

    async fn ensure_sentinel(&self) -> Result<(), MeterError> {
        let path = format!("api/v1/categories/{CATEGORY}/resources/{SENTINEL_RESOURCE}");
        let existing = self.call(Method::GET, &path, None, &[]).await.ok();
        if existing.is_some_and(|v| !deep_string(&v, "resource", 1).is_empty()) {
            return Ok(());
        }

        let resource = json!({
            "max_input_units": 0,
            "max_output_units": 0,
            "units": {"text": {"input_price": 0, "output_price": 0}}
        });
        self.call(Method::POST, &path, Some(resource), &[]).await?;
        Ok(())
    }

    async fn put_properties(&self, path: &str, key: &str, value: &str) {
        let body = json!({ "properties": { key: value } });
        if let Err(e) = self.call(Method::PUT, path, Some(body), &[]).await {
            log::warn!("Failed to set property {key} at {path}: {e}");
        }
    }
}

#[async_trait]
impl<T: Transport> UsageMeter for PayiMeter<T> {
    async fn start_session(&self, start: &SessionStart) {
        if let Err(e) = self.ensure_sentinel().await {
            log::warn!("Failed to create metering sentinel: {e}");
        }

        let event = json!({
            "category": CATEGORY,
            "resource": SENTINEL_RESOURCE,
            "units": {"text": {"input": 1, "output": 1}},
            "use_case_properties": start.properties(),
        });
        let headers = [
            ("xProxy-UseCase-Name", USE_CASE_NAME),
            ("xProxy-UseCase-ID", start.game_id.as_str()),
        ];
        if let Err(e) = self
            .call(Method::POST, "api/v1/ingest", Some(event), &headers)
            .await
        {
            log::warn!("Failed to record session start for {}: {e}", start.game_id);
        }
    }

    async fn resolve_request_id(&self, provider: Provider, response_id: &str) -> Option<String> {
        let path = format!(
            "api/v1/requests/provider/{}/{response_id}/result",
            provider.category()
        );
        match self.call(Method::GET, &path, None, &[]).await {
            Ok(value) => Some(deep_string(&value, "request_id", 1)).filter(|id| !id.is_empty()),
            Err(e) => {
                log::warn!("Failed to resolve request id for {response_id}: {e}");
                None
            }
        }
    }

    async fn set_request_property(&self, request_id: &str, key: &str, value: &str) {
        self.put_properties(&format!("api/v1/requests/{request_id}/properties"), key, value)
            .await;
    }

    async fn set_session_property(&self, game_id: &str, key: &str, value: &str) {
        self.put_properties(
            &format!("api/v1/use_cases/instances/{game_id}/properties"),
            key,
            value,
        )
        .await;
    }
}

/// The meter a configuration calls for: Pay-i with a key, otherwise none.
pub fn meter_for(
    config: &MeteringConfig,
    timeout: Duration,
) -> Result<Box<dyn UsageMeter>, MeterError> {
    match config.api_key.as_deref().filter(|key| !key.is_empty()) {
        Some(key) => Ok(Box::new(PayiMeter::new(
            config.api_url.clone(),
            key,
            config.verify_ssl,
            timeout,
        )?)),
        None => {
            log::info!("PAYI_API_KEY not set, usage metering disabled");
            Ok(Box::new(NoopMeter))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_properties() {
        let start = SessionStart {
            game_id: "g1".to_string(),
            protagonist: "openai.gpt-5".to_string(),
            antagonist: "anthropic.claude-3-opus".to_string(),
            rounds: 2,
            seed_prompt: "A lighthouse keeper finds a bottle".to_string(),
            order: [RoleType::Antagonist, RoleType::Protagonist],
        };

        assert_eq!(
            start.properties(),
            json!({
                "antagonist": "anthropic.claude-3-opus",
                "protagonist": "openai.gpt-5",
                "rounds": "2",
                "seed_prompt": "A lighthouse keeper finds a bottle",
                "order": "antagonist,protagonist"
            })
        );
    }

    #[tokio::test]
    async fn test_noop_meter_resolves_nothing() {
        assert_eq!(NoopMeter.resolve_request_id(Provider::OpenAi, "resp_1").await, None);
    }

    #[test]
    fn test_meter_for_without_key() {
        let config = MeteringConfig {
            api_url: Url::parse("https://api.example.com/").unwrap(),
            api_key: None,
            verify_ssl: true,
        };
        assert!(meter_for(&config, Duration::from_secs(5)).is_ok());
    }
}

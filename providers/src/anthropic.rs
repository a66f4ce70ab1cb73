//! Anthropic Messages API adapter.

use crate::config::require;
use crate::{Error, GenerationRequest, Provider, ProviderAdapter, ProviderConfig, WireRequest};
use serde::Serialize;

/// API version header value.
const API_VERSION: &str = "2023-06-01";

/// Anthropic Messages API (`anthropic/v1/messages`).
///
/// Always samples with a temperature; the instructions travel in the
/// top-level `system` field rather than as a message.
pub struct AnthropicMessages;

impl ProviderAdapter for AnthropicMessages {
    fn build_request(
        &self,
        request: &GenerationRequest,
        config: &ProviderConfig,
    ) -> Result<WireRequest, Error> {
        let key = require(&config.credentials.anthropic_api_key, "ANTHROPIC_API_KEY")?;
        let url = config.endpoint(Provider::Anthropic, "v1/messages")?;

        let body = MessagesRequest {
            model: &request.model,
            max_tokens: config.max_output_tokens,
            temperature: request.temperature,
            system: &request.instructions,
            messages: vec![ApiMessage {
                role: "user",
                content: &request.message,
            }],
        };
        let body = serde_json::to_value(body).map_err(|e| Error::InvalidConfig(e.to_string()))?;

        Ok(WireRequest::post(url, body)
            .with_header("anthropic-version", API_VERSION)
            .with_header(
                "x-api-key",
                format!("Bearer {}", config.credentials.with_proxy_key(key)),
            ))
    }

    fn organization_header(&self) -> Option<&'static str> {
        Some("Anthropic-Organization-ID")
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    system: &'a str,
    messages: Vec<ApiMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ApiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

//! OpenAI and Azure OpenAI adapters.
//!
//! Both speak the Responses API and share one body format; they differ only
//! in endpoint, authentication and the Azure pricing headers.

use crate::config::require;
use crate::json;
use crate::{Error, GenerationRequest, Provider, ProviderAdapter, ProviderConfig, WireRequest};
use serde::Serialize;
use serde_json::Value;

/// Model name prefixes that take a reasoning effort instead of a temperature.
const REASONING_PREFIXES: &[&str] = &["gpt-5", "o"];

/// Whether `model` belongs to a reasoning family.
pub fn is_reasoning_model(model: &str) -> bool {
    REASONING_PREFIXES.iter().any(|p| model.starts_with(p))
}

/// OpenAI Responses API (`openai/v1/responses`).
pub struct OpenAiResponses;

/// Azure OpenAI Responses API (`azure.openai/openai/v1/responses`).
pub struct AzureResponses;

impl ProviderAdapter for OpenAiResponses {
    fn build_request(
        &self,
        request: &GenerationRequest,
        config: &ProviderConfig,
    ) -> Result<WireRequest, Error> {
        let key = require(&config.credentials.openai_api_key, "OPENAI_API_KEY")?;
        let url = config.endpoint(Provider::OpenAi, "v1/responses")?;

        Ok(WireRequest::post(url, responses_body(request, config)?).with_header(
            "Authorization",
            format!("Bearer {}", config.credentials.with_proxy_key(key)),
        ))
    }

    fn organization_header(&self) -> Option<&'static str> {
        Some("OpenAI-Organization")
    }

    fn end_user(&self, body: &Value) -> Option<String> {
        Some(json::deep_string(body, "user", 1)).filter(|u| !u.is_empty())
    }
}

impl ProviderAdapter for AzureResponses {
    fn build_request(
        &self,
        request: &GenerationRequest,
        config: &ProviderConfig,
    ) -> Result<WireRequest, Error> {
        let creds = &config.credentials;
        let key = require(&creds.azure_openai_api_key, "AZURE_OPENAI_API_KEY")?;
        let base_uri = require(&creds.azure_openai_base_uri, "AZURE_OPENAI_BASE_URI")?;
        let url = config.endpoint(Provider::AzureOpenAi, "openai/v1/responses")?;

        let mut wire = WireRequest::post(url, responses_body(request, config)?)
            .with_query("ingest", "true")
            .with_header("api-key", creds.with_proxy_key(key))
            .with_header("xProxy-Provider-BaseUri", base_uri);

        if let Some(resource) = request.resource.as_deref().filter(|r| !r.is_empty()) {
            wire = wire.with_header("xProxy-PriceAs-Resource", resource);
        }

        Ok(wire)
    }
}

#[derive(Debug, Serialize)]
struct ResponsesRequest<'a> {
    input: &'a str,
    instructions: &'a str,
    model: &'a str,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning: Option<Reasoning<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Serialize)]
struct Reasoning<'a> {
    effort: &'a str,
}

fn responses_body(request: &GenerationRequest, config: &ProviderConfig) -> Result<Value, Error> {
    let reasoning = is_reasoning_model(&request.model);
    let body = ResponsesRequest {
        input: &request.message,
        instructions: &request.instructions,
        model: &request.model,
        max_output_tokens: config.max_output_tokens,
        reasoning: reasoning.then(|| Reasoning {
            effort: &config.reasoning_effort,
        }),
        temperature: (!reasoning).then_some(request.temperature),
    };

    serde_json::to_value(body).map_err(|e| Error::InvalidConfig(e.to_string()))
}

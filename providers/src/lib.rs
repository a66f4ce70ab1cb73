//! Provider adapters for adversarial story generation.
//!
//! This crate turns "ask provider X for text" into a concrete HTTP call:
//! - Request shaping for the OpenAI and Azure OpenAI Responses APIs
//! - Request shaping for the Anthropic Messages API
//! - Tolerant text extraction from whatever JSON shape comes back
//!
//! Every call is routed through the metering proxy configured in
//! [`ProviderConfig`]. The HTTP layer sits behind the [`Transport`] trait so
//! request shaping can be exercised without a network.

mod anthropic;
mod config;
pub mod json;
mod openai;
mod transport;

pub use anthropic::AnthropicMessages;
pub use config::{Credentials, ProviderConfig, Temperature};
pub use openai::{is_reasoning_model, AzureResponses, OpenAiResponses};
pub use transport::{HttpReply, HttpTransport, Transport, WireRequest};

use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Value of the `xProxy-UseCase-Name` header sent with every provider call.
pub const USE_CASE_NAME: &str = "Story";

/// Errors that can occur while talking to a provider.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),

    #[error("Missing credential: {0} is not set")]
    MissingCredential(&'static str),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Response contained no generated text")]
    MissingText,
}

impl Error {
    /// Short label used when reporting the failure to the metering service.
    pub fn failure_kind(&self) -> String {
        match self {
            Error::UnsupportedProvider(_) => "unsupported_provider".to_string(),
            Error::MissingCredential(_) => "missing_credential".to_string(),
            Error::InvalidConfig(_) => "invalid_config".to_string(),
            Error::Network(_) => "network".to_string(),
            Error::Api { status, .. } => format!("http_{status}"),
            Error::Decode(_) => "decode".to_string(),
            Error::MissingText => "missing_text".to_string(),
        }
    }

    /// Transport and decode failures are worth another attempt; configuration
    /// problems are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Network(_) | Error::Api { .. } | Error::Decode(_) | Error::MissingText
        )
    }
}

/// The closed set of providers a role can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    OpenAi,
    AzureOpenAi,
    Anthropic,
}

impl Provider {
    /// Every supported provider, in the order role prefixes are tried.
    pub const ALL: [Provider; 3] = [Provider::OpenAi, Provider::AzureOpenAi, Provider::Anthropic];

    /// The prefix used in `provider.model` strings and in proxy URL paths.
    pub fn prefix(self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::AzureOpenAi => "azure.openai",
            Provider::Anthropic => "anthropic",
        }
    }

    /// The metering category requests for this provider are filed under.
    pub fn category(self) -> &'static str {
        match self {
            Provider::OpenAi => "system.openai",
            Provider::AzureOpenAi => "system.azureopenai",
            Provider::Anthropic => "system.anthropic",
        }
    }

    /// The adapter that shapes requests and reads responses for this provider.
    pub fn adapter(self) -> &'static dyn ProviderAdapter {
        match self {
            Provider::OpenAi => &OpenAiResponses,
            Provider::AzureOpenAi => &AzureResponses,
            Provider::Anthropic => &AnthropicMessages,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

impl FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Provider::ALL
            .into_iter()
            .find(|p| p.prefix().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnsupportedProvider(s.to_string()))
    }
}

/// Per-provider request building and response reading.
///
/// Adding a provider means adding a [`Provider`] variant and one
/// implementation of this trait.
pub trait ProviderAdapter: Send + Sync {
    /// Shape the provider-specific request for one generation.
    fn build_request(
        &self,
        request: &GenerationRequest,
        config: &ProviderConfig,
    ) -> Result<WireRequest, Error>;

    /// Response header carrying the account or organization name, if any.
    fn organization_header(&self) -> Option<&'static str> {
        None
    }

    /// End-user identifier echoed back in the response body, if any.
    fn end_user(&self, _body: &Value) -> Option<String> {
        None
    }

    /// Pull the generated text and identifiers out of a decoded response.
    fn extract(&self, reply: &HttpReply, body: &Value) -> Result<Generation, Error> {
        let text = json::deep_string(body, "text", 1);
        if text.is_empty() {
            return Err(Error::MissingText);
        }

        Ok(Generation {
            text,
            response_id: non_empty(json::deep_string(body, "id", 1)),
            end_user: self.end_user(body),
            organization: self
                .organization_header()
                .and_then(|name| reply.header(name))
                .map(str::to_string)
                .filter(|s| !s.is_empty()),
        })
    }
}

/// One generation call: who to ask, what to send, and how to sample.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub provider: Provider,
    pub model: String,
    /// Reference resource used for pricing Azure deployments.
    pub resource: Option<String>,
    pub message: String,
    pub instructions: String,
    /// Session id forwarded in the `xProxy-UseCase-ID` header.
    pub correlation_id: Option<String>,
    pub temperature: f64,
}

impl GenerationRequest {
    /// Create a request for the given provider, model and user message.
    pub fn new(provider: Provider, model: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            resource: None,
            message: message.into(),
            instructions: String::new(),
            correlation_id: None,
            temperature: Temperature::DEFAULT_BASE,
        }
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Text produced by a provider plus the identifiers needed for metering.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    /// The provider's own id for the response.
    pub response_id: Option<String>,
    pub end_user: Option<String>,
    pub organization: Option<String>,
}

impl Generation {
    /// A generation carrying only text.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            response_id: None,
            end_user: None,
            organization: None,
        }
    }
}

/// Provider client: shapes requests, sends them, and extracts text.
pub struct Client<'a, T = HttpTransport> {
    config: &'a ProviderConfig,
    transport: T,
}

impl<'a> Client<'a, HttpTransport> {
    /// Create a client backed by a real HTTP transport.
    pub fn new(config: &'a ProviderConfig) -> Result<Self, Error> {
        Ok(Self {
            config,
            transport: HttpTransport::new(config.timeout)?,
        })
    }
}

impl<'a, T: Transport> Client<'a, T> {
    /// Create a client with a custom transport.
    pub fn with_transport(config: &'a ProviderConfig, transport: T) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &ProviderConfig {
        self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Run one generation against the request's provider.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<Generation, Error> {
        let adapter = request.provider.adapter();
        let mut wire = adapter.build_request(request, self.config)?;
        wire.apply_common_headers(request.correlation_id.as_deref());

        log::debug!("POST {} ({} {})", wire.url, request.provider, request.model);
        let reply = self.transport.send(&wire).await?;
        log::info!("Response status code: {}", reply.status);
        log::debug!("Response body: {}", reply.body);

        if !reply.is_success() {
            return Err(Error::Api {
                status: reply.status,
                message: reply.body,
            });
        }

        let body: Value =
            serde_json::from_str(&reply.body).map_err(|e| Error::Decode(e.to_string()))?;

        adapter.extract(&reply, &body)
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}
